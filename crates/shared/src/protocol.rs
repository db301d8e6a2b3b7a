use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{PlanKind, ProfileSnapshot, SubscriptionRecord, UsageStats, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCodeRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCodeResponse {
    #[serde(default)]
    pub message: Option<String>,
    /// Demo-only echo of the one-time code.
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    #[serde(default)]
    pub success: bool,
    pub user_id: UserId,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub user_id: UserId,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: String,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    pub requests_left: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub user_id: UserId,
    pub plan_type: PlanKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub payment_url: String,
    #[serde(default)]
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    /// Major currency units as a decimal.
    pub total_spent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub plan_type: String,
    #[serde(default)]
    pub requests_total: Option<u64>,
    #[serde(default)]
    pub requests_used: u64,
    pub is_unlimited: bool,
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub phone: String,
    pub free_requests_used: u64,
    pub free_requests_left: u64,
    pub member_since: NaiveDateTime,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionPayload>,
    pub stats: ProfileStats,
}

impl From<SubscriptionPayload> for SubscriptionRecord {
    fn from(value: SubscriptionPayload) -> Self {
        Self {
            plan_type: value.plan_type,
            is_unlimited: value.is_unlimited,
            requests_used: value.requests_used,
            requests_total: value.requests_total,
            expires_at: value.expires_at,
            is_active: value.is_active,
        }
    }
}

impl From<ProfileResponse> for ProfileSnapshot {
    fn from(value: ProfileResponse) -> Self {
        Self {
            phone: value.phone,
            free_requests_used: value.free_requests_used,
            free_requests_left: value.free_requests_left,
            member_since: value.member_since,
            stats: UsageStats {
                total_requests: value.stats.total_requests,
                total_tokens: value.stats.total_tokens,
                total_spent_minor_units: to_minor_units(value.stats.total_spent),
            },
            subscriptions: value.subscriptions.into_iter().map(Into::into).collect(),
        }
    }
}

fn to_minor_units(major: f64) -> u64 {
    if !major.is_finite() || major <= 0.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let minor = (major * 100.0).round() as u64;
    minor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_payload_folds_into_snapshot() {
        let raw = r#"{
            "phone": "+79991234567",
            "freeRequestsUsed": 4,
            "freeRequestsLeft": 6,
            "memberSince": "2024-03-01T10:15:30.123456",
            "subscriptions": [
                {"planType": "unlimited", "requestsTotal": null, "requestsUsed": 0,
                 "isUnlimited": true, "expiresAt": "2024-04-01T10:15:30", "isActive": true},
                {"planType": "starter", "requestsTotal": 20, "requestsUsed": 20,
                 "isUnlimited": false, "expiresAt": null, "isActive": true}
            ],
            "stats": {"totalRequests": 24, "totalTokens": 5120, "totalSpent": 798.0}
        }"#;

        let response: ProfileResponse = serde_json::from_str(raw).expect("profile json");
        let snapshot = ProfileSnapshot::from(response);

        assert_eq!(snapshot.free_requests_left, 6);
        assert_eq!(snapshot.stats.total_spent_minor_units, 79_800);
        assert_eq!(snapshot.subscriptions.len(), 2);
        assert_eq!(snapshot.subscriptions[0].plan_kind(), Some(PlanKind::Unlimited));
        assert_eq!(snapshot.subscriptions[1].requests_remaining(), Some(0));
    }

    #[test]
    fn purchase_request_uses_wire_plan_names() {
        let body = serde_json::to_value(PurchaseRequest {
            user_id: UserId(7),
            plan_type: PlanKind::Pro,
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"userId": 7, "planType": "pro"}));
    }

    #[test]
    fn negative_or_nan_spend_folds_to_zero() {
        assert_eq!(to_minor_units(-3.0), 0);
        assert_eq!(to_minor_units(f64::NAN), 0);
        assert_eq!(to_minor_units(299.99), 29_999);
    }
}
