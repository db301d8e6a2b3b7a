use shared::error::ErrorKind;
use thiserror::Error;

/// Raw outcome of a failed service call, before the controller classifies it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service unreachable: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        need_subscription: bool,
    },
    #[error("malformed service response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
            need_subscription: false,
        }
    }

    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: 403,
            message: message.into(),
            need_subscription: true,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Error surfaced at an operation boundary. Never fatal to the controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    AuthFailure(String),
    #[error("{0}")]
    QuotaExhausted(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("{message}")]
    Server { status: Option<u16>, message: String },
    #[error("network timeout")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("session storage failure: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
            Self::QuotaExhausted(_) => ErrorKind::QuotaExhausted,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    /// Auth endpoint rejections are reported verbatim as auth failures.
    pub(crate) fn from_auth(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected { message, .. } => Self::AuthFailure(message),
            other => Self::from_service(other),
        }
    }

    /// Inference rejections carrying the subscription flag become quota exhaustion.
    pub(crate) fn from_inference(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected {
                message,
                need_subscription: true,
                ..
            } => Self::QuotaExhausted(message),
            other => Self::from_service(other),
        }
    }

    pub(crate) fn from_service(err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(message) => Self::ServiceUnavailable(message),
            ServiceError::Timeout => Self::Timeout,
            ServiceError::Rejected {
                status, message, ..
            } => Self::Server {
                status: Some(status),
                message,
            },
            ServiceError::Decode(message) => Self::Server {
                status: None,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_flagged_inference_rejections_exhaust_quota() {
        let flagged = ClientError::from_inference(ServiceError::quota_exhausted("No requests left"));
        assert_eq!(flagged, ClientError::QuotaExhausted("No requests left".into()));

        let plain_403 = ClientError::from_inference(ServiceError::rejected(403, "forbidden"));
        assert_eq!(plain_403.kind(), ErrorKind::ServerError);
    }

    #[test]
    fn auth_rejections_keep_server_message_verbatim() {
        let err = ClientError::from_auth(ServiceError::rejected(400, "Invalid code"));
        assert_eq!(err.to_string(), "Invalid code");
        assert_eq!(err.kind(), ErrorKind::AuthFailure);

        let transport = ClientError::from_auth(ServiceError::Transport("connection refused".into()));
        assert_eq!(transport.kind(), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn timeouts_map_to_timeout_kind() {
        assert_eq!(
            ClientError::from_service(ServiceError::Timeout).kind(),
            ErrorKind::Timeout
        );
    }
}
