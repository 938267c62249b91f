//! Error types for the labelgate proxy.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::Response;
use thiserror::Error;

/// Errors that can occur while proxying and filtering responses.
#[derive(Error, Debug)]
pub enum GateError {
    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// I/O error during connection handling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid upstream URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Connection or streaming error on either leg
    #[error("Connection error: {0}")]
    Connection(String),

    /// Buffered response body exceeded the configured cap
    #[error("response body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured buffer limit in bytes
        limit: usize,
    },

    /// The outer response envelope is not valid JSON
    #[error("can't decode API response: {0}")]
    DecodeEnvelope(#[source] serde_json::Error),

    /// The envelope parsed but its status field is not "success"
    #[error("can't decode API response: unexpected response status {0:?}")]
    UnexpectedApiStatus(String),

    /// The rules payload is malformed or contains an unknown rule kind
    #[error("can't decode rules data: {0}")]
    DecodeRules(#[source] serde_json::Error),

    /// The alerts payload is malformed
    #[error("can't decode alerts data: {0}")]
    DecodeAlerts(#[source] serde_json::Error),

    /// The filtered payload could not be serialized back into the envelope
    #[error("can't set data: {0}")]
    SetPayload(#[source] serde_json::Error),

    /// The rewritten envelope could not be serialized
    #[error("can't encode API response: {0}")]
    EncodeEnvelope(#[source] serde_json::Error),

    /// The tenant header is absent, empty, or not valid UTF-8.
    /// Filtering cannot run without a tenant identity.
    #[error("missing tenant value: header {0:?} absent or empty")]
    MissingTenant(String),
}

/// Result type alias for proxy operations.
pub type GateResult<T> = Result<T, GateError>;

impl From<std::convert::Infallible> for GateError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl GateError {
    /// HTTP status code this error maps to at the proxy boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::MissingTenant(_) => StatusCode::BAD_REQUEST,
            GateError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Convert this error into an HTTP response for the caller.
    ///
    /// Every post-gate failure is terminal for its response: the upstream
    /// body has already been consumed, so the only safe outcome is an error
    /// status, never a partially filtered body.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let body = Full::new(Bytes::from(format!("{}\n", self)));
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .unwrap_or_else(|_| {
                let mut resp = Response::new(Full::new(Bytes::new()));
                *resp.status_mut() = status;
                resp
            })
    }
}
