use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC code reported for unknown or disallowed methods.
pub const METHOD_NOT_FOUND_CODE: i32 = -32601;
/// JSON-RPC code reported for everything that is not the flavor's own error.
pub const INTERNAL_ERROR_CODE: i32 = -32603;

/// Error value produced by a flavor while handling a request.
///
/// The core never inspects or rewrites it; it reaches the caller exactly as the
/// connector returned it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ConnectorError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ConnectorError {
    pub fn new<S: Into<String>>(code: i32, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Server-defined error in the JSON-RPC `-32000` range
    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::new(-32000, message)
    }

    /// Invalid params (`-32602`)
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::new(-32602, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Unified error type for the chainsim core
#[derive(Debug, Error)]
pub enum ChainsimError {
    /// The method is not part of the connected flavor's method table
    #[error("The method {method} does not exist/is not available")]
    MethodNotFound { method: String },

    /// The method exists but the flavor forbids calling it
    #[error("The method {method} is not allowed")]
    MethodNotAllowed { method: String },

    /// The request coordinator was stopped
    #[error("Request coordinator is stopped: cannot {operation}")]
    CoordinatorStopped { operation: String },

    /// The connector failed to become ready
    #[error("Connector failed to start: {message}")]
    StartupFailed { message: String },

    /// No installed plugin provides the requested flavor
    #[error("Could not find flavor \"{flavor}\" (package {package})")]
    FlavorNotInstalled { flavor: String, package: String },

    /// A plugin was found but does not export a connector
    #[error("Flavor \"{flavor}\" is malformed: {message}")]
    FlavorMalformed { flavor: String, message: String },

    /// The loader already produced a connector for this process
    #[error("A connector for flavor \"{flavor}\" has already been loaded")]
    AlreadyLoaded { flavor: String },

    /// Options rejected by the flavor's option schema
    #[error("Invalid options for flavor \"{flavor}\": {}", .errors.join("; "))]
    InvalidOptions { flavor: String, errors: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Error returned by the connector itself
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ChainsimError {
    pub fn method_not_found<S: Into<String>>(method: S) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn method_not_allowed<S: Into<String>>(method: S) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    pub fn stopped<S: Into<String>>(operation: S) -> Self {
        Self::CoordinatorStopped {
            operation: operation.into(),
        }
    }

    pub fn startup_failed<S: Into<String>>(message: S) -> Self {
        Self::StartupFailed {
            message: message.into(),
        }
    }

    pub fn flavor_not_installed<F: Into<String>, P: Into<String>>(flavor: F, package: P) -> Self {
        Self::FlavorNotInstalled {
            flavor: flavor.into(),
            package: package.into(),
        }
    }

    pub fn flavor_malformed<F: Into<String>, M: Into<String>>(flavor: F, message: M) -> Self {
        Self::FlavorMalformed {
            flavor: flavor.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the process should terminate instead of handing the error to a caller.
    ///
    /// Only a missing flavor qualifies: it is a deployment problem, not something
    /// a running caller can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FlavorNotInstalled { .. })
    }

    /// JSON-RPC error code used when the error is sent back over the wire
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MethodNotFound { .. } | Self::MethodNotAllowed { .. } => METHOD_NOT_FOUND_CODE,
            Self::Connector(err) => err.code,
            _ => INTERNAL_ERROR_CODE,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::MethodNotFound { .. } | Self::MethodNotAllowed { .. } => "method",
            Self::CoordinatorStopped { .. } => "stopped",
            Self::StartupFailed { .. } => "startup",
            Self::FlavorNotInstalled { .. }
            | Self::FlavorMalformed { .. }
            | Self::AlreadyLoaded { .. } => "flavor",
            Self::InvalidOptions { .. } | Self::Configuration { .. } => "configuration",
            Self::Connector(_) => "connector",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ChainsimError>;

impl From<std::io::Error> for ChainsimError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for ChainsimError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for ChainsimError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<anyhow::Error> for ChainsimError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
