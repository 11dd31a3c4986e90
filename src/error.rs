use serde_json::Value;
use thiserror::Error;

/// Failure of a call to the Helix backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response (unreachable host, DNS, reset, ...)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("API error: {status} {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
        /// JSON error payload, when the backend sent one
        body: Option<Value>,
    },

    /// The backend answered 2xx but the body is missing required fields
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured error payload for display; `{}` when there is none
    pub fn details(&self) -> Value {
        match self {
            ApiError::HttpStatus { body: Some(body), .. } => body.clone(),
            _ => Value::Object(Default::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_status_message() {
        let err = ApiError::HttpStatus {
            status: 500,
            reason: "Internal Server Error".to_string(),
            body: Some(json!({"error": "boom", "status": "error"})),
        };
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.details()["error"], "boom");
    }

    #[test]
    fn test_malformed_has_no_details() {
        let err = ApiError::MalformedResponse("`sequence` is not an array".to_string());
        assert_eq!(err.status(), None);
        assert_eq!(err.details(), json!({}));
    }
}
