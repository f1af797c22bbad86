//! # Error Types
//!
//! Error types for the configurator using `thiserror`.
//!
//! Value errors, coupled-group errors, reference errors and structural
//! conflicts never surface here: they are reported through
//! [`crate::warnings::Warnings`]. This enum covers failures that must reach
//! the caller (apply, render, I/O, startup configuration).

/// Custom result type for configurator operations
pub type Result<T> = std::result::Result<T, ConfiguratorError>;

/// Main error type for the configurator
#[derive(thiserror::Error, Debug)]
pub enum ConfiguratorError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// A value in an input resource could not be parsed
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Rendering the compiled model failed
    #[error("Render error for {resource}: {message}")]
    Render { resource: String, message: String },

    /// The proxy manager failed to reload
    #[error("Error reloading NGINX{context}: {message}")]
    Reload { context: String, message: String },

    /// Pushing servers to a live upstream failed
    #[error("Couldn't update the endpoints via the API: {message}")]
    EndpointsUpdate { upstream: String, message: String },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization { context: String, message: String },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ConfiguratorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a new configuration error with a source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a new validation error bound to a field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn render<R: Into<String>, S: Into<String>>(resource: R, message: S) -> Self {
        Self::Render { resource: resource.into(), message: message.into() }
    }

    /// Create a reload error. `context` is appended to the leading phrase,
    /// e.g. " when updating endpoints".
    pub fn reload<C: Into<String>, S: Into<String>>(context: C, message: S) -> Self {
        Self::Reload { context: context.into(), message: message.into() }
    }

    pub fn endpoints_update<U: Into<String>, S: Into<String>>(upstream: U, message: S) -> Self {
        Self::EndpointsUpdate { upstream: upstream.into(), message: message.into() }
    }

    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    pub fn serialization<C: Into<String>, S: Into<String>>(context: C, message: S) -> Self {
        Self::Serialization { context: context.into(), message: message.into() }
    }

    /// Create a new not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the caller may retry the failed operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Reload { .. } | Self::EndpointsUpdate { .. } | Self::Io { .. })
    }
}

impl From<std::io::Error> for ConfiguratorError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for ConfiguratorError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            context: "JSON serialization failed".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfiguratorError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "YAML deserialization failed".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfiguratorError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for ConfiguratorError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();
        fields.sort();

        Self::validation(format!("Validation failed: {}", fields.join("; ")))
    }
}
