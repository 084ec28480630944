//! Error Types
//!
//! Every failure the client can surface. Nothing here is retried internally;
//! errors go straight back to the caller.

use std::path::PathBuf;

use crate::api::response::ApiErrorBody;

/// Longest slice of a response body kept inside a decode error
const MAX_BODY_IN_ERROR: usize = 500;

/// Main error type for Responses API operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network unreachable, TLS failure or timeout
    #[error("Connection error: {0}")]
    Connection(String),

    /// The API answered with a non-2xx status
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        error: Option<ApiErrorBody>,
    },

    /// The body was not valid JSON or did not match the expected shape
    #[error("Failed to decode response: {message}. Body: {body}")]
    Decode { message: String, body: String },

    /// Structured output did not match the schema it was requested with
    #[error("Schema mismatch at {path}: {message}")]
    SchemaMismatch { path: String, message: String },

    /// A local image could not be read or is not an image
    #[error("Failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported type tag while building a schema
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// The request could not be built (e.g. empty model)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The model refused to produce structured output
    #[error("Model refused: {0}")]
    Refusal(String),

    /// Malformed event framing mid-stream, or the stream ended early
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a decode error, keeping a bounded prefix of the offending body
    pub fn decode(message: impl Into<String>, body: &str) -> Self {
        let mut end = body.len().min(MAX_BODY_IN_ERROR);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        Error::Decode {
            message: message.into(),
            body: body[..end].to_string(),
        }
    }

    /// Build an API error from a status code and raw body
    pub fn from_status(status: u16, body: &str) -> Self {
        let error = ApiErrorBody::parse(body);
        let message = match &error {
            Some(e) => e.message.clone(),
            None if body.trim().is_empty() => "no error body".to_string(),
            None => {
                let mut end = body.len().min(MAX_BODY_IN_ERROR);
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body[..end].to_string()
            }
        };
        Error::Api {
            status,
            message,
            error,
        }
    }

    /// HTTP status for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // without_url keeps query strings and hosts out of messages
        let err = err.without_url();
        if err.is_timeout() {
            Error::Connection(format!("request timed out: {}", err))
        } else if err.is_connect() {
            Error::Connection(format!("connection failed: {}", err))
        } else if err.is_decode() {
            Error::decode(err.to_string(), "")
        } else if let Some(status) = err.status() {
            Error::from_status(status.as_u16(), "")
        } else {
            Error::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::decode(format!("JSON error: {}", err), "")
    }
}

/// Result type alias for Responses API operations
pub type Result<T> = std::result::Result<T, Error>;
