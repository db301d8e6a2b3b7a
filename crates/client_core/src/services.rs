//! Contracts the controller expects from the four backend capabilities.

use async_trait::async_trait;
use shared::{
    domain::{PlanKind, ProfileSnapshot, UserId},
    protocol::{AskResponse, RequestCodeResponse, VerifyCodeResponse},
};

use crate::error::ServiceError;

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn request_code(&self, phone: &str) -> Result<RequestCodeResponse, ServiceError>;
    async fn verify_code(&self, phone: &str, code: &str)
        -> Result<VerifyCodeResponse, ServiceError>;
}

#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn ask(&self, user_id: UserId, question: &str) -> Result<AskResponse, ServiceError>;
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Returns the external checkout URL for `plan`.
    async fn create_payment(&self, user_id: UserId, plan: PlanKind)
        -> Result<String, ServiceError>;
}

#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_profile(&self, user_id: UserId) -> Result<ProfileSnapshot, ServiceError>;
}
