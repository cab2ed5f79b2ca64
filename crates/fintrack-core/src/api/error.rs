use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("FinTrack refused the request: {0}")]
    AccessDenied(String),

    #[error("Not logged in, or the session has expired")]
    Unauthorized,

    #[error("Not found on the FinTrack backend: {0}")]
    NotFound(String),

    /// 400 from the backend, carrying the field or form errors it reported
    #[error("Rejected by FinTrack: {0}")]
    Validation(String),

    #[error("Too many requests to FinTrack - please wait before retrying")]
    RateLimited,

    #[error("FinTrack backend error: {0}")]
    ServerError(String),

    #[error("Could not reach the FinTrack backend: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unexpected response from FinTrack: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull a readable message out of a backend error body.
    ///
    /// The backend answers with `{"error": ..}`, `{"detail": ..}` or a map of
    /// field name to a list of messages. Field messages are joined as
    /// `field: message`, `non_field_errors` without the prefix.
    fn backend_message(body: &str) -> Option<String> {
        let Value::Object(map) = serde_json::from_str::<Value>(body).ok()? else {
            return None;
        };
        for key in ["error", "detail", "message"] {
            if let Some(Value::String(message)) = map.get(key) {
                return Some(message.clone());
            }
        }

        let mut parts = Vec::new();
        for (field, value) in &map {
            let messages: Vec<&str> = match value {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };
            for message in messages {
                if field == "non_field_errors" {
                    parts.push(message.to_string());
                } else {
                    parts.push(format!("{}: {}", field, message));
                }
            }
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::backend_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 => ApiError::Validation(message),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// True when the backend rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
