//! # Configuration Management
//!
//! Startup configuration for the configurator: controller settings and
//! observability settings, loaded from an optional file layered with
//! environment variables.

pub mod settings;

pub use settings::{read_template, AppConfig, ControllerConfig, ObservabilityConfig};
