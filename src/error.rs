use serde_json::Value;
use thiserror::Error;

/// Failure reported by the dashboard server or the transport in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
    pub suggestions: Vec<String>,
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            suggestions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::transport(message)
        }
    }

    /// Builds an error from a non-2xx response body. JSON bodies may carry
    /// `error` or `message`, plus optional `suggestions` and `errors` arrays;
    /// anything else is used verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        let fallback = || {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("request failed with status {status}")
            } else {
                trimmed.to_owned()
            }
        };

        let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(body) else {
            return Self::with_status(status, fallback());
        };

        let message = ["error", "message"]
            .iter()
            .filter_map(|key| payload.get(*key))
            .find_map(|value| value.as_str().map(str::to_owned))
            .unwrap_or_else(fallback);

        Self {
            status: Some(status),
            message,
            suggestions: string_list(payload.get("suggestions")),
            errors: string_list(payload.get("errors")),
        }
    }

    /// Message plus any server suggestions and field errors, for
    /// notifications.
    pub fn display_message(&self) -> String {
        let mut text = self.message.clone();
        if !self.suggestions.is_empty() {
            text.push_str(&format!(" ({})", self.suggestions.join("; ")));
        }
        if !self.errors.is_empty() {
            text.push_str(&format!(": {}", self.errors.join("; ")));
        }
        text
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| item.to_string()),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(text)) => vec![text.clone()],
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashError {
    #[error("fetch failed: {0}")]
    TransientFetch(#[source] ApiError),
    #[error("job {job_id} failed: {message}")]
    JobFailure { job_id: String, message: String },
    #[error("lost track of job {job_id}: {source}")]
    JobPoll {
        job_id: String,
        #[source]
        source: ApiError,
    },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<ApiError> for DashError {
    fn from(error: ApiError) -> Self {
        Self::TransientFetch(error)
    }
}
