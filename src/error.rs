use crate::constants;
use crate::pipeline::message::RawResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed failure produced by exception mappers and header compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid operation '{operation}': {reason}")]
    InvalidOperation { operation: String, reason: String },
    #[error("No value for URI template variable '{variable}' in operation '{operation}'")]
    MissingPathValue { operation: String, variable: String },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Remote invocation failed with HTTP {status}")]
    RemoteInvocation {
        status: u16,
        response: Box<RawResponse>,
    },
    #[error("{failure_type} (HTTP {status}): {source}")]
    Mapped {
        failure_type: String,
        status: u16,
        source: BoxError,
    },
    #[error("Codec error for '{media_type}': {reason}")]
    Codec { media_type: String, reason: String },
    #[error("Failed to compute client header '{header}': {source}")]
    HeaderCompute { header: String, source: BoxError },
    #[error("Invalid base URI '{uri}': {reason}")]
    InvalidBaseUri { uri: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Client handle is closed")]
    ClientClosed,
    #[error("Asynchronous invocation was dropped before completion")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures raised by a [`Transport`](crate::pipeline::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Exchange aborted: {0}")]
    Aborted(String),
}

/// JSON representation of an error for structured output
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub error_type: String,
    pub message: String,
    pub context: Option<String>,
}

impl Error {
    #[must_use]
    pub fn invalid_operation(operation: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn missing_path_value(operation: &str, variable: &str) -> Self {
        Self::MissingPathValue {
            operation: operation.to_string(),
            variable: variable.to_string(),
        }
    }

    #[must_use]
    pub fn codec(media_type: &str, reason: impl Into<String>) -> Self {
        Self::Codec {
            media_type: media_type.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status carried by remote and mapped failures.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteInvocation { status, .. } | Self::Mapped { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The translated failure raised by an exception mapper, if any.
    #[must_use]
    pub fn mapped_failure(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Mapped { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Raw response carried by a generic remote failure.
    #[must_use]
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::RemoteInvocation { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Binding and assembly failures; raised before any network call.
    #[must_use]
    pub const fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation { .. } | Self::MissingPathValue { .. }
        )
    }

    /// Convert error to JSON representation for structured output
    #[must_use]
    pub fn to_json(&self) -> JsonError {
        let (error_type, context) = match self {
            Self::InvalidOperation { .. } => ("InvalidOperation", Some(constants::ERR_OPERATION_SHAPE)),
            Self::MissingPathValue { .. } => ("MissingPathValue", Some(constants::ERR_PATH_VALUE)),
            Self::Transport(err) => ("Transport", transport_context(err)),
            Self::RemoteInvocation { status, .. } => ("RemoteInvocation", status_context(*status)),
            Self::Mapped { status, .. } => ("MappedFailure", status_context(*status)),
            Self::Codec { .. } => ("Codec", None),
            Self::HeaderCompute { .. } => ("HeaderCompute", None),
            Self::InvalidBaseUri { .. } => ("InvalidBaseUri", None),
            Self::Config(_) => ("Configuration", None),
            Self::ClientClosed => ("ClientClosed", None),
            Self::Cancelled => ("Cancelled", None),
            Self::Io(_) => ("FileSystem", None),
            Self::Json(_) => ("JSONParsing", Some(constants::ERR_JSON_SYNTAX)),
            Self::Toml(_) => ("TOMLParsing", Some(constants::ERR_TOML_SYNTAX)),
        };

        JsonError {
            error_type: error_type.to_string(),
            message: self.to_string(),
            context: context.map(str::to_string),
        }
    }
}

const fn status_context(status: u16) -> Option<&'static str> {
    match status {
        401 => Some(constants::ERR_API_CREDENTIALS),
        403 => Some(constants::ERR_PERMISSION_DENIED),
        404 => Some(constants::ERR_ENDPOINT_NOT_FOUND),
        429 => Some(constants::ERR_RATE_LIMITED),
        500..=599 => Some(constants::ERR_SERVER_ERROR),
        _ => None,
    }
}

fn transport_context(err: &TransportError) -> Option<&'static str> {
    match err {
        TransportError::Connect(_) => Some(constants::ERR_CONNECTION),
        TransportError::Timeout(_) => Some(constants::ERR_TIMEOUT),
        TransportError::Http(e) if e.is_connect() => Some(constants::ERR_CONNECTION),
        TransportError::Http(e) if e.is_timeout() => Some(constants::ERR_TIMEOUT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_includes_status_context() {
        let err = Error::RemoteInvocation {
            status: 404,
            response: Box::new(RawResponse::new(404)),
        };
        let json = err.to_json();
        assert_eq!(json.error_type, "RemoteInvocation");
        assert_eq!(json.context.as_deref(), Some(constants::ERR_ENDPOINT_NOT_FOUND));
        assert!(json.message.contains("404"));
    }

    #[test]
    fn test_fail_fast_classification() {
        assert!(Error::invalid_operation("op", "two bodies").is_fail_fast());
        assert!(Error::missing_path_value("op", "id").is_fail_fast());
        assert!(!Error::Cancelled.is_fail_fast());
    }

    #[test]
    fn test_status_accessor() {
        let err = Error::Mapped {
            failure_type: "NotFound".to_string(),
            status: 404,
            source: "gone".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.mapped_failure().is_some());
        assert_eq!(Error::ClientClosed.status(), None);
    }
}
