use crate::gate::Rejection;
use crate::inference::InputRole;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission rejected: {0}")]
    Rejected(Rejection),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Session initialization timed out after {timeout_ms}ms")]
    SessionTimeout { timeout_ms: u64 },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Upload of {role} image timed out after {timeout_ms}ms")]
    UploadTimeout { role: InputRole, timeout_ms: u64 },

    #[error("Prediction timed out after {timeout_ms}ms")]
    RemoteTimeout { timeout_ms: u64 },

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Could not extract image data from result")]
    UnrecognizedResultShape,

    #[error("Invalid base64 data received from model")]
    InvalidResultEncoding,

    #[error("Failed to download {url} after {attempts} attempts: {last_error}")]
    DownloadExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to process images after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last_error: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_upload(msg: impl Into<String>) -> Self {
        Self::InvalidUpload(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteCall(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The remote call succeeded but its payload cannot be used. Never retried.
    pub fn is_result_shape(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedResultShape | Self::InvalidResultEncoding
        )
    }

    /// Errors that would repeat identically on another attempt.
    pub fn is_terminal(&self) -> bool {
        self.is_result_shape() || matches!(self, Self::InvalidUpload(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            Self::SessionTimeout { .. }
            | Self::Session(_)
            | Self::UploadTimeout { .. }
            | Self::RemoteTimeout { .. }
            | Self::RemoteCall(_)
            | Self::UnrecognizedResultShape
            | Self::InvalidResultEncoding
            | Self::DownloadExhausted { .. }
            | Self::ExhaustedRetries { .. }
            | Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::Serialization(_)
            | Self::Yaml(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        let mut response = (status, body).into_response();
        if let Self::Rejected(rejection) = &self {
            // Rounded up so a client honouring the header is not rejected again.
            let secs = rejection.retry_after().as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejection_maps_to_too_many_requests() {
        let err = Error::Rejected(Rejection::DuplicateInFlight {
            retry_after: Duration::from_millis(2500),
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "3"
        );
    }

    #[test]
    fn test_retry_after_covers_the_remaining_window() {
        let retry_after = |millis: u64| {
            Error::Rejected(Rejection::ResubmittedTooSoon {
                retry_after: Duration::from_millis(millis),
            })
            .into_response()
            .headers()
            .get(header::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
        };

        assert_eq!(retry_after(4900), "5");
        assert_eq!(retry_after(5000), "5");
        assert_eq!(retry_after(5001), "6");
        assert_eq!(retry_after(0), "1");
    }

    #[test]
    fn test_upload_timeout_names_the_upload() {
        let err = Error::UploadTimeout {
            role: InputRole::Garment,
            timeout_ms: 60000,
        };

        assert_eq!(err.to_string(), "Upload of garment image timed out after 60000ms");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_exhausted_retries_keeps_last_error() {
        let err = Error::ExhaustedRetries {
            attempts: 3,
            last_error: Box::new(Error::remote("connection reset")),
        };

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_result_shape_errors_are_terminal() {
        assert!(Error::UnrecognizedResultShape.is_result_shape());
        assert!(Error::InvalidResultEncoding.is_result_shape());
        assert!(!Error::remote("boom").is_result_shape());
        assert!(!Error::SessionTimeout { timeout_ms: 10 }.is_result_shape());
        assert!(Error::UnrecognizedResultShape.is_terminal());
        assert!(Error::invalid_upload("Invalid MIME type").is_terminal());
        assert!(!Error::remote("boom").is_terminal());
    }

    #[test]
    fn test_invalid_upload_is_bad_request() {
        let response = Error::invalid_upload("front.gif must be a JPEG or PNG image").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
