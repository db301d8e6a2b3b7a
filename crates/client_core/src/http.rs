//! reqwest-backed implementation of every service contract.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{PlanKind, ProfileSnapshot, UserId},
    error::ApiErrorBody,
    protocol::{
        AskRequest, AskResponse, ProfileQuery, ProfileResponse, PurchaseRequest,
        PurchaseResponse, RequestCodeRequest, RequestCodeResponse, VerifyCodeRequest,
        VerifyCodeResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::ServiceError,
    services::{AuthService, InferenceService, PaymentService, ProfileService},
};

/// One endpoint per backend function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: Url,
    pub ai: Url,
    pub payment: Url,
    pub profile: Url,
}

#[derive(Clone)]
pub struct HttpServices {
    http: Client,
    endpoints: Endpoints,
}

impl HttpServices {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            http: Client::new(),
            endpoints,
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| ServiceError::Decode(err.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "service call rejected");
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(api_error) => Err(ServiceError::Rejected {
            status: status.as_u16(),
            need_subscription: api_error.needs_subscription(),
            message: api_error.error,
        }),
        Err(_) => Err(ServiceError::rejected(
            status.as_u16(),
            format!("request failed with status {status}"),
        )),
    }
}

#[async_trait]
impl AuthService for HttpServices {
    async fn request_code(&self, phone: &str) -> Result<RequestCodeResponse, ServiceError> {
        let res = self
            .http
            .post(self.endpoints.auth.clone())
            .json(&RequestCodeRequest {
                phone: phone.to_string(),
            })
            .send()
            .await?;
        decode(res).await
    }

    async fn verify_code(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<VerifyCodeResponse, ServiceError> {
        let res = self
            .http
            .post(self.endpoints.auth.clone())
            .json(&VerifyCodeRequest {
                phone: phone.to_string(),
                code: code.to_string(),
            })
            .send()
            .await?;
        decode(res).await
    }
}

#[async_trait]
impl InferenceService for HttpServices {
    async fn ask(&self, user_id: UserId, question: &str) -> Result<AskResponse, ServiceError> {
        let res = self
            .http
            .post(self.endpoints.ai.clone())
            .json(&AskRequest {
                user_id,
                question: question.to_string(),
            })
            .send()
            .await?;
        decode(res).await
    }
}

#[async_trait]
impl PaymentService for HttpServices {
    async fn create_payment(
        &self,
        user_id: UserId,
        plan: PlanKind,
    ) -> Result<String, ServiceError> {
        let res = self
            .http
            .post(self.endpoints.payment.clone())
            .json(&PurchaseRequest {
                user_id,
                plan_type: plan,
            })
            .send()
            .await?;
        let body: PurchaseResponse = decode(res).await?;
        if body.payment_url.trim().is_empty() {
            return Err(ServiceError::Decode("payment response has an empty paymentUrl".into()));
        }
        Ok(body.payment_url)
    }
}

#[async_trait]
impl ProfileService for HttpServices {
    async fn fetch_profile(&self, user_id: UserId) -> Result<ProfileSnapshot, ServiceError> {
        let res = self
            .http
            .get(self.endpoints.profile.clone())
            .query(&ProfileQuery { user_id })
            .send()
            .await?;
        let body: ProfileResponse = decode(res).await?;
        Ok(body.into())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
