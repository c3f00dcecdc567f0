//! Core business logic for fastvote-rs.

pub mod services;

pub use services::*;
