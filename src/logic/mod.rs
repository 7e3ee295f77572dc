//! Core inference logic: validation, model backends, request orchestration

pub mod model;
pub mod sequence;
pub mod service;
