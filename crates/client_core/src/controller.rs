//! Session and quota orchestration.
//!
//! The controller owns the client-observable state (session identity, current
//! view, cached quota, the current question exchange, the last profile
//! snapshot) and mediates every call to the backend services. The state lock is
//! never held across a service call; each operation snapshots what it needs,
//! suspends on the call, then re-checks that the world it started in still
//! exists before folding the result.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Local;
use shared::{
    domain::{
        PlanKind, ProfileSnapshot, QueryExchange, Quota, Session, SessionPhase, UserId,
    },
    error::ErrorKind,
};
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::{
    config::{RestorePolicy, Settings},
    error::{ClientError, ServiceError},
    services::{AuthService, InferenceService, PaymentService, ProfileService},
    session_store::SessionStore,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

/// The four backend capabilities the controller depends on.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub inference: Arc<dyn InferenceService>,
    pub payment: Arc<dyn PaymentService>,
    pub profile: Arc<dyn ProfileService>,
}

impl Services {
    /// Uses one backend object for every capability.
    pub fn single<T>(backend: Arc<T>) -> Self
    where
        T: AuthService + InferenceService + PaymentService + ProfileService + 'static,
    {
        Self {
            auth: backend.clone(),
            inference: backend.clone(),
            payment: backend.clone(),
            profile: backend,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub request_timeout: Duration,
    pub restore_policy: RestorePolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            restore_policy: RestorePolicy::Trust,
        }
    }
}

impl ControllerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            request_timeout: settings.request_timeout(),
            restore_policy: settings.restore_policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Landing,
    AuthPending,
    Authenticated,
    Profile,
}

/// What the presentation layer may render right now.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Plan selection.
    Landing,
    AuthPending {
        code_sent: bool,
        /// Locked phone number while a code is outstanding.
        phone: Option<String>,
    },
    Authenticated {
        quota: Quota,
        exchange: Option<QueryExchange>,
    },
    Profile {
        snapshot: Option<ProfileSnapshot>,
        loading: bool,
    },
}

impl View {
    pub fn kind(&self) -> ViewKind {
        match self {
            Self::Landing => ViewKind::Landing,
            Self::AuthPending { .. } => ViewKind::AuthPending,
            Self::Authenticated { .. } => ViewKind::Authenticated,
            Self::Profile { .. } => ViewKind::Profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Proceed,
    RequestCode { phone: String },
    VerifyCode { phone: String, code: String },
    AskQuestion { question: String },
    PurchasePlan { plan: PlanKind },
    OpenProfile,
    Back,
    Logout,
    RestoreSession,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::RequestCode { .. } => "request_code",
            Self::VerifyCode { .. } => "verify_code",
            Self::AskQuestion { .. } => "ask_question",
            Self::PurchasePlan { .. } => "purchase_plan",
            Self::OpenProfile => "open_profile",
            Self::Back => "back",
            Self::Logout => "logout",
            Self::RestoreSession => "restore_session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Open this checkout URL in a new browsing context; completion is not awaited.
    Redirect { plan: PlanKind, url: String },
    SignInRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CodeIssued(Option<String>),
    SignedIn(UserId),
    Answered(String),
    OpenUrl(String),
    SignInRequired,
    ProfileLoaded,
    Restored(Option<UserId>),
    LoggedOut,
}

/// Result of one dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    pub before: ViewKind,
    pub after: ViewKind,
    pub effect: Option<Effect>,
    pub error: Option<ClientError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ViewChanged { from: ViewKind, to: ViewKind },
    CodeIssued { code: String },
    Answered { exchange_id: u64, answer: String },
    PaymentRedirect { plan: PlanKind, url: String },
    Notice { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Landing,
    AuthPending { code_sent: bool },
    Authenticated,
    Profile { loading: bool },
}

impl Screen {
    fn kind(self) -> ViewKind {
        match self {
            Self::Landing => ViewKind::Landing,
            Self::AuthPending { .. } => ViewKind::AuthPending,
            Self::Authenticated => ViewKind::Authenticated,
            Self::Profile { .. } => ViewKind::Profile,
        }
    }
}

type ViewChange = Option<(ViewKind, ViewKind)>;

struct ControllerState {
    session: Session,
    screen: Screen,
    pending_phone: Option<String>,
    issued_code: Option<String>,
    quota: Quota,
    exchange: Option<QueryExchange>,
    profile: Option<ProfileSnapshot>,
    auth_in_flight: bool,
    /// Bumped on every navigation; results from an older epoch are discarded.
    epoch: u64,
    next_exchange_id: u64,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            session: Session::default(),
            screen: Screen::Landing,
            pending_phone: None,
            issued_code: None,
            quota: Quota::default(),
            exchange: None,
            profile: None,
            auth_in_flight: false,
            epoch: 0,
            next_exchange_id: 1,
        }
    }

    fn navigate(&mut self, screen: Screen) -> ViewChange {
        let from = self.screen.kind();
        self.screen = screen;
        self.epoch += 1;
        let to = screen.kind();
        (from != to).then_some((from, to))
    }

    fn view(&self) -> View {
        match self.screen {
            Screen::Landing => View::Landing,
            Screen::AuthPending { code_sent } => View::AuthPending {
                code_sent,
                phone: self.pending_phone.clone(),
            },
            Screen::Authenticated => View::Authenticated {
                quota: self.quota,
                exchange: self.exchange.clone(),
            },
            Screen::Profile { loading } => View::Profile {
                snapshot: self.profile.clone(),
                loading,
            },
        }
    }

    fn require_identity(&self, action: &str) -> Result<UserId, ClientError> {
        match self.session.identity() {
            Some(user_id) if self.session.is_authenticated() => Ok(user_id),
            _ => Err(ClientError::InvalidState(format!("sign in to {action}"))),
        }
    }

    /// Marks the in-flight exchange as cancelled. Returns whether one was pending.
    fn cancel_pending_exchange(&mut self) -> bool {
        match self.exchange.as_mut() {
            Some(exchange) if exchange.is_pending() => {
                exchange.fail(ErrorKind::Cancelled);
                true
            }
            _ => false,
        }
    }

    fn fold_profile(&mut self, snapshot: ProfileSnapshot) {
        let now = Local::now().naive_local();
        self.quota.apply_server_remaining(snapshot.free_requests_left);
        self.quota.active_plan = snapshot
            .active_subscription(now)
            .and_then(|sub| sub.plan_kind());
        self.profile = Some(snapshot);
    }

    fn reset(&mut self) -> ViewChange {
        self.session.clear();
        self.pending_phone = None;
        self.issued_code = None;
        self.quota = Quota::default();
        self.exchange = None;
        self.profile = None;
        self.auth_in_flight = false;
        self.navigate(Screen::Landing)
    }
}

pub struct SessionController {
    services: Services,
    store: Arc<dyn SessionStore>,
    options: ControllerOptions,
    inner: Mutex<ControllerState>,
    exchange_cancelled: Notify,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(services: Services, store: Arc<dyn SessionStore>) -> Self {
        Self::new_with_options(services, store, ControllerOptions::default())
    }

    pub fn new_with_options(
        services: Services,
        store: Arc<dyn SessionStore>,
        options: ControllerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            services,
            store,
            options,
            inner: Mutex::new(ControllerState::new()),
            exchange_cancelled: Notify::new(),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> View {
        self.inner.lock().await.view()
    }

    pub async fn view_kind(&self) -> ViewKind {
        self.inner.lock().await.screen.kind()
    }

    pub async fn session(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    pub async fn quota(&self) -> Quota {
        self.inner.lock().await.quota
    }

    pub async fn exchange(&self) -> Option<QueryExchange> {
        self.inner.lock().await.exchange.clone()
    }

    pub async fn profile(&self) -> Option<ProfileSnapshot> {
        self.inner.lock().await.profile.clone()
    }

    /// One-time code echoed by the auth service, if any. Demo mode only.
    pub async fn issued_code(&self) -> Option<String> {
        self.inner.lock().await.issued_code.clone()
    }

    pub async fn dispatch(&self, command: Command) -> StateDelta {
        let before = self.view_kind().await;
        debug!(command = command.name(), "dispatching session command");

        let result = match command {
            Command::Proceed => self.proceed().await.map(|_| None),
            Command::RequestCode { phone } => self
                .request_code(&phone)
                .await
                .map(|code| Some(Effect::CodeIssued(code))),
            Command::VerifyCode { phone, code } => self
                .verify_code(&phone, &code)
                .await
                .map(|user_id| Some(Effect::SignedIn(user_id))),
            Command::AskQuestion { question } => self
                .ask_question(&question)
                .await
                .map(|answer| Some(Effect::Answered(answer))),
            Command::PurchasePlan { plan } => {
                self.purchase_plan(plan).await.map(|outcome| match outcome {
                    PurchaseOutcome::Redirect { url, .. } => Some(Effect::OpenUrl(url)),
                    PurchaseOutcome::SignInRequired => Some(Effect::SignInRequired),
                })
            }
            Command::OpenProfile => self.load_profile().await.map(|_| Some(Effect::ProfileLoaded)),
            Command::Back => self.back().await.map(|_| None),
            Command::Logout => self.logout().await.map(|()| Some(Effect::LoggedOut)),
            Command::RestoreSession => self
                .restore_session()
                .await
                .map(|restored| Some(Effect::Restored(restored))),
        };

        let after = self.view_kind().await;
        match result {
            Ok(effect) => StateDelta {
                before,
                after,
                effect,
                error: None,
            },
            Err(err) => StateDelta {
                before,
                after,
                effect: None,
                error: Some(err),
            },
        }
    }

    /// Leaves plan selection: straight to the assistant when signed in, else to phone entry.
    pub async fn proceed(&self) -> Result<ViewKind, ClientError> {
        let (change, after) = {
            let mut guard = self.inner.lock().await;
            let next = match guard.screen {
                Screen::Landing if guard.session.is_authenticated() => Screen::Authenticated,
                Screen::Landing => Screen::AuthPending {
                    code_sent: guard.session.phase() == SessionPhase::CodeRequested,
                },
                current => current,
            };
            let change = if next == guard.screen {
                None
            } else {
                guard.navigate(next)
            };
            (change, guard.screen.kind())
        };
        self.publish_view(change);
        Ok(after)
    }

    pub async fn request_code(&self, phone: &str) -> Result<Option<String>, ClientError> {
        let result = self.request_code_inner(phone).await;
        self.report(result)
    }

    async fn request_code_inner(&self, phone: &str) -> Result<Option<String>, ClientError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ClientError::Validation("phone number is required".into()));
        }

        let epoch = {
            let mut guard = self.inner.lock().await;
            match guard.session.phase() {
                SessionPhase::Unauthenticated => {}
                SessionPhase::CodeRequested => {
                    return Err(ClientError::InvalidState(
                        "a code was already sent; go back to change the phone number".into(),
                    ))
                }
                SessionPhase::Authenticated => {
                    return Err(ClientError::InvalidState("already signed in".into()))
                }
            }
            if guard.auth_in_flight {
                return Err(ClientError::InvalidState(
                    "a sign-in request is already in progress".into(),
                ));
            }
            guard.auth_in_flight = true;
            guard.epoch
        };

        let outcome = self.call(self.services.auth.request_code(phone)).await;

        let (change, code) = {
            let mut guard = self.inner.lock().await;
            guard.auth_in_flight = false;
            if guard.epoch != epoch {
                debug!("discarding code request result after navigation");
                return Err(ClientError::Cancelled);
            }
            let response = outcome.map_err(ClientError::from_auth)?;

            guard.session.mark_code_requested();
            guard.pending_phone = Some(phone.to_string());
            guard.issued_code = response.code.clone();
            let change = guard.navigate(Screen::AuthPending { code_sent: true });
            (change, response.code)
        };

        info!(phone = %mask_phone(phone), "verification code requested");
        self.publish_view(change);
        if let Some(code) = &code {
            warn!("auth service echoed the one-time code to the client; demo mode only");
            self.publish(SessionEvent::CodeIssued { code: code.clone() });
        }
        Ok(code)
    }

    pub async fn verify_code(&self, phone: &str, code: &str) -> Result<UserId, ClientError> {
        let result = self.verify_code_inner(phone, code).await;
        self.report(result)
    }

    async fn verify_code_inner(&self, phone: &str, code: &str) -> Result<UserId, ClientError> {
        let phone = phone.trim();
        let code = code.trim();

        let epoch = {
            let mut guard = self.inner.lock().await;
            if guard.session.is_authenticated() {
                return Err(ClientError::InvalidState("already signed in".into()));
            }
            if guard.screen != (Screen::AuthPending { code_sent: true }) {
                return Err(ClientError::InvalidState(
                    "request a verification code first".into(),
                ));
            }
            if guard.pending_phone.as_deref() != Some(phone) {
                return Err(ClientError::Validation(
                    "the phone number cannot change while a code is pending; go back to edit it"
                        .into(),
                ));
            }
            if code.is_empty() {
                return Err(ClientError::Validation("verification code is required".into()));
            }
            if guard.auth_in_flight {
                return Err(ClientError::InvalidState(
                    "a sign-in request is already in progress".into(),
                ));
            }
            guard.auth_in_flight = true;
            guard.epoch
        };

        let outcome = self.call(self.services.auth.verify_code(phone, code)).await;

        let user_id = {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                guard.auth_in_flight = false;
                debug!("discarding verification result after navigation");
                return Err(ClientError::Cancelled);
            }
            match outcome {
                Ok(response) => response.user_id,
                Err(err) => {
                    guard.auth_in_flight = false;
                    return Err(ClientError::from_auth(err));
                }
            }
        };

        if let Err(err) = self.store.save(user_id).await {
            warn!(user_id = user_id.0, "failed to persist identity: {err:#}");
        }

        let change = {
            let mut guard = self.inner.lock().await;
            guard.auth_in_flight = false;
            // a logout or back while persisting wins over the sign-in
            if guard.epoch != epoch {
                drop(guard);
                debug!(user_id = user_id.0, "sign-in abandoned while persisting identity");
                if let Err(err) = self.store.clear().await {
                    warn!(user_id = user_id.0, "failed to drop abandoned identity: {err:#}");
                }
                return Err(ClientError::Cancelled);
            }
            guard.session.authenticate(user_id);
            guard.pending_phone = None;
            guard.issued_code = None;
            guard.quota = Quota::default();
            guard.exchange = None;
            guard.profile = None;
            guard.navigate(Screen::Authenticated)
        };

        info!(user_id = user_id.0, "signed in");
        self.publish_view(change);
        Ok(user_id)
    }

    pub async fn ask_question(&self, question: &str) -> Result<String, ClientError> {
        let result = self.ask_question_inner(question).await;
        self.report(result)
    }

    async fn ask_question_inner(&self, question: &str) -> Result<String, ClientError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ClientError::Validation("question must not be empty".into()));
        }

        let mut guard = self.inner.lock().await;
        let user_id = guard.require_identity("ask questions")?;
        if guard.screen != Screen::Authenticated {
            return Err(ClientError::InvalidState(
                "questions can only be asked from the assistant view".into(),
            ));
        }
        if guard.exchange.as_ref().is_some_and(QueryExchange::is_pending) {
            return Err(ClientError::InvalidState(
                "a question is already being answered".into(),
            ));
        }
        if guard.quota.is_known_exhausted() {
            let change = guard.navigate(Screen::Landing);
            drop(guard);
            self.publish_view(change);
            return Err(ClientError::QuotaExhausted(
                "no requests left; choose a plan to continue".into(),
            ));
        }

        let exchange_id = guard.next_exchange_id;
        guard.next_exchange_id += 1;
        guard.exchange = Some(QueryExchange::pending(exchange_id, question));
        let cancelled = self.exchange_cancelled.notified();
        tokio::pin!(cancelled);
        drop(guard);

        let outcome = tokio::select! {
            outcome = self.call(self.services.inference.ask(user_id, question)) => outcome,
            () = &mut cancelled => {
                debug!(exchange_id, "in-flight question cancelled");
                return Err(ClientError::Cancelled);
            }
        };

        let mut guard = self.inner.lock().await;
        let still_pending = guard
            .exchange
            .as_ref()
            .is_some_and(|exchange| exchange.id == exchange_id && exchange.is_pending());
        if !still_pending {
            debug!(exchange_id, "discarding answer for abandoned exchange");
            return Err(ClientError::Cancelled);
        }

        match outcome {
            Ok(response) => {
                if let Some(exchange) = guard.exchange.as_mut() {
                    exchange.succeed(response.answer.clone());
                }
                guard.quota.apply_server_remaining(response.requests_left);
                let remaining = guard.quota.free_remaining;
                drop(guard);

                info!(exchange_id, remaining, "question answered");
                self.publish(SessionEvent::Answered {
                    exchange_id,
                    answer: response.answer.clone(),
                });
                Ok(response.answer)
            }
            Err(err) => {
                let err = ClientError::from_inference(err);
                if let Some(exchange) = guard.exchange.as_mut() {
                    exchange.fail(err.kind());
                }
                let change = if err.kind().forces_plan_selection() {
                    guard.quota.apply_server_remaining(0);
                    guard.quota.active_plan = None;
                    guard.navigate(Screen::Landing)
                } else {
                    None
                };
                drop(guard);
                self.publish_view(change);
                Err(err)
            }
        }
    }

    pub async fn purchase_plan(&self, plan: PlanKind) -> Result<PurchaseOutcome, ClientError> {
        let result = self.purchase_plan_inner(plan).await;
        self.report(result)
    }

    async fn purchase_plan_inner(&self, plan: PlanKind) -> Result<PurchaseOutcome, ClientError> {
        let user_id = {
            let mut guard = self.inner.lock().await;
            if let Ok(user_id) = guard.require_identity("purchase a plan") {
                user_id
            } else {
                let code_sent = guard.session.phase() == SessionPhase::CodeRequested;
                let change = guard.navigate(Screen::AuthPending { code_sent });
                drop(guard);
                info!(%plan, "purchase requires sign-in");
                self.publish_view(change);
                return Ok(PurchaseOutcome::SignInRequired);
            }
        };

        let url = self
            .call(self.services.payment.create_payment(user_id, plan))
            .await
            .map_err(ClientError::from_service)?;

        {
            let mut guard = self.inner.lock().await;
            if guard.session.identity() != Some(user_id) {
                debug!("discarding payment redirect after logout");
                return Err(ClientError::Cancelled);
            }
            guard.quota.awaiting_reconciliation = true;
        }

        info!(%plan, user_id = user_id.0, "payment created; handing off to checkout");
        self.publish(SessionEvent::PaymentRedirect {
            plan,
            url: url.clone(),
        });
        Ok(PurchaseOutcome::Redirect { plan, url })
    }

    /// Enters the profile view (loading affordance first) and folds a fresh snapshot.
    pub async fn load_profile(&self) -> Result<ProfileSnapshot, ClientError> {
        let result = self.load_profile_inner().await;
        self.report(result)
    }

    async fn load_profile_inner(&self) -> Result<ProfileSnapshot, ClientError> {
        let (user_id, previous, epoch, change) = {
            let mut guard = self.inner.lock().await;
            let user_id = guard.require_identity("view the profile")?;
            if guard.cancel_pending_exchange() {
                self.exchange_cancelled.notify_waiters();
            }
            let previous = guard.screen;
            let change = guard.navigate(Screen::Profile { loading: true });
            (user_id, previous, guard.epoch, change)
        };
        self.publish_view(change);

        let outcome = self
            .call(self.services.profile.fetch_profile(user_id))
            .await;

        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch {
            debug!("discarding profile after navigation");
            return Err(ClientError::Cancelled);
        }

        match outcome {
            Ok(snapshot) => {
                guard.fold_profile(snapshot.clone());
                guard.screen = Screen::Profile { loading: false };
                drop(guard);
                info!(user_id = user_id.0, "profile loaded");
                Ok(snapshot)
            }
            Err(err) => {
                let fallback = if guard.profile.is_some() {
                    Screen::Profile { loading: false }
                } else if matches!(previous, Screen::Profile { .. }) {
                    Screen::Authenticated
                } else {
                    previous
                };
                let change = guard.navigate(fallback);
                drop(guard);
                self.publish_view(change);
                Err(ClientError::from_service(err))
            }
        }
    }

    pub async fn back(&self) -> Result<ViewKind, ClientError> {
        let (change, after) = {
            let mut guard = self.inner.lock().await;
            let next = match guard.screen {
                Screen::Landing => None,
                Screen::AuthPending { .. } => {
                    guard.session.abandon_code_request();
                    guard.pending_phone = None;
                    guard.issued_code = None;
                    Some(Screen::Landing)
                }
                Screen::Profile { .. } => Some(Screen::Authenticated),
                Screen::Authenticated => {
                    if guard.cancel_pending_exchange() {
                        self.exchange_cancelled.notify_waiters();
                    }
                    Some(Screen::Landing)
                }
            };
            let change = next.and_then(|screen| guard.navigate(screen));
            (change, guard.screen.kind())
        };
        self.publish_view(change);
        Ok(after)
    }

    /// Clears the durable identity and returns to plan selection.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.logout_inner().await;
        self.report(result)
    }

    async fn logout_inner(&self) -> Result<(), ClientError> {
        let stored = self.store.clear().await;

        let change = {
            let mut guard = self.inner.lock().await;
            if guard.cancel_pending_exchange() {
                self.exchange_cancelled.notify_waiters();
            }
            guard.reset()
        };
        self.publish_view(change);
        info!("signed out");

        stored.map_err(ClientError::storage)
    }

    /// Runs once at start-up: adopts a durable identity if one exists.
    pub async fn restore_session(&self) -> Result<Option<UserId>, ClientError> {
        let result = self.restore_session_inner().await;
        self.report(result)
    }

    async fn restore_session_inner(&self) -> Result<Option<UserId>, ClientError> {
        if let Some(user_id) = self.inner.lock().await.session.identity() {
            return Ok(Some(user_id));
        }

        let Some(user_id) = self.store.load().await.map_err(ClientError::storage)? else {
            debug!("no stored identity to restore");
            return Ok(None);
        };

        let verified = match self.options.restore_policy {
            RestorePolicy::Trust => None,
            RestorePolicy::Verify => {
                match self.call(self.services.profile.fetch_profile(user_id)).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(ServiceError::Rejected { status, message, .. }) => {
                        warn!(user_id = user_id.0, status, "stored identity rejected: {message}");
                        self.store.clear().await.map_err(ClientError::storage)?;
                        return Err(ClientError::AuthFailure(
                            "stored session is no longer valid; sign in again".into(),
                        ));
                    }
                    Err(err) => {
                        warn!(user_id = user_id.0, "could not verify stored identity, trusting it: {err}");
                        None
                    }
                }
            }
        };

        let change = {
            let mut guard = self.inner.lock().await;
            guard.session.authenticate(user_id);
            guard.quota = Quota::default();
            match verified {
                Some(snapshot) => guard.fold_profile(snapshot),
                // nothing server-confirmed yet, so the local gate stays open
                None => guard.quota.awaiting_reconciliation = true,
            }
            guard.navigate(Screen::Authenticated)
        };

        info!(user_id = user_id.0, "session restored");
        self.publish_view(change);
        Ok(Some(user_id))
    }

    async fn call<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        tokio::time::timeout(self.options.request_timeout, call)
            .await
            .unwrap_or(Err(ServiceError::Timeout))
    }

    fn report<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(err) = &result {
            warn!(kind = ?err.kind(), "session operation failed: {err}");
            self.publish(SessionEvent::Notice {
                kind: err.kind(),
                message: err.to_string(),
            });
        }
        result
    }

    fn publish_view(&self, change: ViewChange) {
        if let Some((from, to)) = change {
            debug!(?from, ?to, "view changed");
            self.publish(SessionEvent::ViewChanged { from, to });
        }
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Keeps only the last four digits for logs.
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits
        .iter()
        .skip(digits.len().saturating_sub(4))
        .collect();
    format!("***{tail}")
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
