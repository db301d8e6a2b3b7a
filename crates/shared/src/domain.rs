use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);

/// Requests every new identity may make before a plan is required.
pub const FREE_REQUEST_ALLOWANCE: u64 = 10;

/// Length of the unlimited plan's entitlement period.
pub const UNLIMITED_PERIOD_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Starter,
    Pro,
    Unlimited,
}

/// A purchasable tier. `request_allowance: None` means unlimited for the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub kind: PlanKind,
    pub display_name: &'static str,
    pub request_allowance: Option<u32>,
    pub price_minor_units: u64,
    pub is_featured: bool,
}

pub const PLAN_CATALOG: [Plan; 3] = [
    Plan {
        kind: PlanKind::Starter,
        display_name: "Starter",
        request_allowance: Some(20),
        price_minor_units: 29_900,
        is_featured: false,
    },
    Plan {
        kind: PlanKind::Pro,
        display_name: "Pro",
        request_allowance: Some(30),
        price_minor_units: 39_900,
        is_featured: true,
    },
    Plan {
        kind: PlanKind::Unlimited,
        display_name: "Unlimited",
        request_allowance: None,
        price_minor_units: 49_900,
        is_featured: false,
    },
];

impl PlanKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }

    pub fn plan(self) -> &'static Plan {
        match self {
            Self::Starter => &PLAN_CATALOG[0],
            Self::Pro => &PLAN_CATALOG[1],
            Self::Unlimited => &PLAN_CATALOG[2],
        }
    }

    pub fn is_unlimited(self) -> bool {
        self.plan().request_allowance.is_none()
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan '{0}' (expected starter, pro or unlimited)")]
pub struct UnknownPlan(pub String);

impl FromStr for PlanKind {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "unlimited" => Ok(Self::Unlimited),
            _ => Err(UnknownPlan(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    CodeRequested,
    Authenticated,
}

/// Client authentication state. `phase == Authenticated` exactly when `identity` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    identity: Option<UserId>,
    phase: SessionPhase,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            phase: SessionPhase::Unauthenticated,
        }
    }
}

impl Session {
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn mark_code_requested(&mut self) {
        if self.identity.is_none() {
            self.phase = SessionPhase::CodeRequested;
        }
    }

    pub fn authenticate(&mut self, user_id: UserId) {
        self.identity = Some(user_id);
        self.phase = SessionPhase::Authenticated;
    }

    /// Abandons a pending code request. Has no effect once authenticated.
    pub fn abandon_code_request(&mut self) {
        if self.phase == SessionPhase::CodeRequested {
            self.phase = SessionPhase::Unauthenticated;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Last server-observed request allowance. Never decremented locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub free_remaining: u64,
    pub active_plan: Option<PlanKind>,
    /// Set after a purchase redirect until the server reports a fresh value.
    pub awaiting_reconciliation: bool,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            free_remaining: FREE_REQUEST_ALLOWANCE,
            active_plan: None,
            awaiting_reconciliation: false,
        }
    }
}

impl Quota {
    /// Overwrites the remaining count with the value the server reported.
    pub fn apply_server_remaining(&mut self, remaining: u64) {
        self.free_remaining = remaining;
        self.awaiting_reconciliation = false;
    }

    /// True only when the server told us there is nothing left and no purchase is pending.
    pub fn is_known_exhausted(&self) -> bool {
        self.free_remaining == 0 && self.active_plan.is_none() && !self.awaiting_reconciliation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExchange {
    pub id: u64,
    pub question: String,
    pub answer: Option<String>,
    pub status: ExchangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ErrorKind>,
}

impl QueryExchange {
    pub fn pending(id: u64, question: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: None,
            status: ExchangeStatus::Pending,
            failure: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ExchangeStatus::Pending
    }

    pub fn succeed(&mut self, answer: impl Into<String>) {
        self.answer = Some(answer.into());
        self.status = ExchangeStatus::Succeeded;
    }

    pub fn fail(&mut self, kind: ErrorKind) {
        self.status = ExchangeStatus::Failed;
        self.failure = Some(kind);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_spent_minor_units: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub plan_type: String,
    pub is_unlimited: bool,
    pub requests_used: u64,
    pub requests_total: Option<u64>,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

impl SubscriptionRecord {
    pub fn plan_kind(&self) -> Option<PlanKind> {
        self.plan_type.parse().ok()
    }

    /// Remaining requests under this record. Unlimited records only gate on `expires_at`.
    pub fn requests_remaining(&self) -> Option<u64> {
        if self.is_unlimited {
            return None;
        }
        Some(
            self.requests_total
                .unwrap_or_default()
                .saturating_sub(self.requests_used),
        )
    }

    pub fn is_usable_at(&self, now: NaiveDateTime) -> bool {
        if !self.is_active {
            return false;
        }
        if self.is_unlimited {
            return self.expires_at.is_some_and(|expires| now < expires);
        }
        self.requests_remaining().is_some_and(|left| left > 0)
    }
}

/// Server-reported account summary. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub phone: String,
    pub free_requests_used: u64,
    pub free_requests_left: u64,
    pub member_since: NaiveDateTime,
    pub stats: UsageStats,
    pub subscriptions: Vec<SubscriptionRecord>,
}

impl ProfileSnapshot {
    /// Newest active subscription usable at `now`; the server lists newest first.
    pub fn active_subscription(&self, now: NaiveDateTime) -> Option<&SubscriptionRecord> {
        self.subscriptions.iter().find(|sub| sub.is_usable_at(now))
    }
}
