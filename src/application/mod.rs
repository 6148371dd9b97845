// src/application/mod.rs
pub mod queue;
pub mod service;
pub mod usecase;
