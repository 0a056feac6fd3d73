//! STRATA Core Library
//!
//! Core types, errors and configuration shared by every STRATA crate.
//! This crate has no storage or runtime dependencies.

pub mod types;
pub mod error;
pub mod config;

pub use types::*;
pub use error::*;
pub use config::*;
