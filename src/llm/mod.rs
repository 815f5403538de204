pub mod chat;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-pro";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

/// Coarse failure category the service layer maps to user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidApiKey,
    QuotaExceeded,
    Other,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key rejected by the remote endpoint: {0}")]
    InvalidApiKey(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("HTTP {status}: {message}")] Http {
        status: u16,
        message: String,
    },
    #[error("request failed: {0}")] Request(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")] Decode(#[from] serde_json::Error),
    #[error("an API key is required for the chat client")]
    MissingApiKey,
    #[error("response contained no text")]
    EmptyResponse,
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::InvalidApiKey(_) => FailureKind::InvalidApiKey,
            LlmError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            _ => FailureKind::Other,
        }
    }

    /// Builds a typed error from a non-success reply. Key problems win over
    /// quota problems when both signals are present.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok().map(|e| e.error);

        let (message, api_status, reasons) = match &parsed {
            Some(err) =>
                (
                    err.message.clone().unwrap_or_else(|| body.trim().to_string()),
                    err.status.clone().unwrap_or_default(),
                    err.details
                        .iter()
                        .filter_map(|d| d.reason.clone())
                        .collect::<Vec<_>>(),
                ),
            None => (body.trim().to_string(), String::new(), Vec::new()),
        };

        let key_signal =
            reasons.iter().any(|r| r.contains("API_KEY")) ||
            matches!(api_status.as_str(), "UNAUTHENTICATED" | "PERMISSION_DENIED") ||
            status == StatusCode::UNAUTHORIZED ||
            status == StatusCode::FORBIDDEN ||
            (parsed.is_none() && body.contains("API_KEY"));
        if key_signal {
            return LlmError::InvalidApiKey(message);
        }

        let quota_signal =
            status == StatusCode::TOO_MANY_REQUESTS ||
            api_status == "RESOURCE_EXHAUSTED" ||
            reasons.iter().any(|r| r.contains("QUOTA")) ||
            (parsed.is_none() && (body.contains("QUOTA") || body.contains("RESOURCE_EXHAUSTED")));
        if quota_signal {
            return LlmError::QuotaExceeded(message);
        }

        LlmError::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Recognizes an error object delivered inside an already accepted
    /// stream. Its `code` stands in for the HTTP status.
    pub fn from_stream_event(data: &str) -> Option<Self> {
        let envelope = serde_json::from_str::<ApiErrorEnvelope>(data).ok()?;
        let status = envelope.error.code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Some(Self::from_response(status, data))
    }
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}
