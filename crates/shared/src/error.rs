use serde::{Deserialize, Serialize};

/// Client-visible failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidState,
    AuthFailure,
    QuotaExhausted,
    ServiceUnavailable,
    ServerError,
    Timeout,
    Cancelled,
    Storage,
}

impl ErrorKind {
    /// Quota exhaustion is the only failure that forces a navigation change.
    pub fn forces_plan_selection(self) -> bool {
        self == Self::QuotaExhausted
    }
}

/// Body every backend function returns alongside a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_subscription: Option<bool>,
}

impl ApiErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            need_subscription: None,
        }
    }

    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            need_subscription: Some(true),
        }
    }

    pub fn needs_subscription(&self) -> bool {
        self.need_subscription.unwrap_or(false)
    }
}
