// Error types for the Switchyard dispatch core

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an operation failure for the named operation.
    pub fn operation(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Operation {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a hook failure, tagging the stage that raised it.
    pub fn hook(stage: HookStage, source: Error) -> Self {
        Error::Hook {
            stage,
            source: Box::new(source),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => 404,
            Error::Binding(_) | Error::Conversion(_) | Error::Deserialization(_) => 400,
            Error::BadRequest(_) => 400,
            Error::Hook { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Lifecycle stage a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreInvoke,
    PostInvoke,
    Error,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreInvoke => f.write_str("pre-invoke"),
            HookStage::PostInvoke => f.write_str("post-invoke"),
            HookStage::Error => f.write_str("error"),
        }
    }
}

/// Failure to resolve an operation parameter to a call argument.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("No value supplied for required parameter '{parameter}' of operation '{operation}'")]
    MissingParameter { parameter: String, operation: String },

    #[error(
        "Cannot bind value '{value}' to parameter '{parameter}' of operation '{operation}' as {target}: {reason}"
    )]
    InvalidValue {
        parameter: String,
        operation: String,
        value: String,
        target: String,
        reason: String,
    },
}

impl BindingError {
    /// Name of the parameter that failed to bind.
    pub fn parameter(&self) -> &str {
        match self {
            BindingError::MissingParameter { parameter, .. }
            | BindingError::InvalidValue { parameter, .. } => parameter,
        }
    }

    /// Name of the operation whose parameter failed to bind.
    pub fn operation(&self) -> &str {
        match self {
            BindingError::MissingParameter { operation, .. }
            | BindingError::InvalidValue { operation, .. } => operation,
        }
    }
}

/// Failure of the scalar type converter.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot convert '{value}' to {target}: {cause}")]
pub struct ConversionError {
    /// The offending source value, rendered as text
    pub value: String,
    /// Label of the attempted target type
    pub target: String,
    /// Underlying reason
    pub cause: String,
}

impl ConversionError {
    pub fn new(value: impl Into<String>, target: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            target: target.into(),
            cause: cause.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Serialization(err.to_string())
        } else {
            Error::Deserialization(err.to_string())
        }
    }
}
