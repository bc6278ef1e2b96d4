//! Shared types for Warden

pub mod error;

pub use error::{Result, WardenError};
