//! # Error Handling
//!
//! Error handling for the configurator. Hard failures use
//! [`ConfiguratorError`]; resource-scoped diagnostics are collected as
//! warnings instead and never abort a compile.

pub mod types;

pub use types::{ConfiguratorError, Result};

/// Shorthand used across the crate
pub type Error = ConfiguratorError;
