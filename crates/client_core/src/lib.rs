//! Client-side session controller for the PulseAI query service.

pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod services;
mod session_store;

pub use config::{load_settings, normalize_database_url, RestorePolicy, Settings};
pub use controller::{
    Command, ControllerOptions, Effect, PurchaseOutcome, Services, SessionController,
    SessionEvent, StateDelta, View, ViewKind,
};
pub use error::{ClientError, ServiceError};
pub use http::{Endpoints, HttpServices};
pub use session_store::{DurableSessionStore, InMemorySessionStore, SessionStore};
