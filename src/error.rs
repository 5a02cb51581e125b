use std::fmt;

use serde_json::{json, Value};

/// Classified tool error: tells the host *why* an operation failed so it can
/// pick the right recovery strategy. Always surfaced in-band as a structured
/// result payload; transport faults are reserved for the process dying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Discord session not ready; the caller may retry after reconnecting.
    NotConnected(String),
    /// Guild allowlist violation or a Discord permission denial.
    Forbidden(String),
    /// Unknown campaign, channel, message, or user.
    NotFound(String),
    /// Campaign uniqueness collision on (channel, message, emoji).
    /// Carries the id of the campaign already tracking that triple.
    Duplicate { existing_id: i64 },
    /// Operation against a deleted campaign, or an illegal status transition.
    InvalidState(String),
    /// Discord told us to slow down; check `retry_after_secs`.
    RateLimited { retry_after_secs: Option<u64> },
    /// Retryable network fault.
    Transient(String),
    /// Malformed tool arguments.
    InvalidArguments(String),
    /// Anything else. Terminal for the handler.
    Internal(String),
}

impl ToolError {
    /// Stable machine-readable discriminant used in result payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotConnected(_) => "not_connected",
            ToolError::Forbidden(_) => "forbidden",
            ToolError::NotFound(_) => "not_found",
            ToolError::Duplicate { .. } => "duplicate",
            ToolError::InvalidState(_) => "invalid_state",
            ToolError::RateLimited { .. } => "rate_limited",
            ToolError::Transient(_) => "transient",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Internal(_) => "internal",
        }
    }

    /// Structured payload for the tool-result envelope.
    pub fn to_json(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            ToolError::Duplicate { existing_id } => {
                error["existing_campaign_id"] = json!(existing_id);
            }
            ToolError::RateLimited { retry_after_secs } => {
                error["retry_after_secs"] = json!(retry_after_secs);
            }
            _ => {}
        }
        json!({ "success": false, "error": error })
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotConnected(msg) => write!(f, "Discord session not connected: {}", msg),
            ToolError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            ToolError::NotFound(msg) => write!(f, "not found: {}", msg),
            ToolError::Duplicate { existing_id } => {
                write!(f, "campaign already exists with id {}", existing_id)
            }
            ToolError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            ToolError::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "rate limited, retry after {}s", secs),
                None => write!(f, "rate limited"),
            },
            ToolError::Transient(msg) => write!(f, "transient failure: {}", msg),
            ToolError::InvalidArguments(msg) => write!(f, "invalid arguments: {}", msg),
            ToolError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<sqlx::Error> for ToolError {
    fn from(e: sqlx::Error) -> Self {
        ToolError::Internal(format!("database error: {}", e))
    }
}
