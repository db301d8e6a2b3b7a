use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::UserId;
use storage::Storage;
use tokio::sync::Mutex;

/// Durable home of the authenticated identity. Injected so tests can swap it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<UserId>>;
    async fn save(&self, user_id: UserId) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    identity: Mutex<Option<UserId>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(user_id: UserId) -> Self {
        Self {
            identity: Mutex::new(Some(user_id)),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self) -> Result<Option<UserId>> {
        Ok(*self.identity.lock().await)
    }

    async fn save(&self, user_id: UserId) -> Result<()> {
        *self.identity.lock().await = Some(user_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.identity.lock().await = None;
        Ok(())
    }
}

/// sqlite-backed store that survives process restarts.
pub struct DurableSessionStore {
    store: Storage,
}

impl DurableSessionStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        let store = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to initialize session storage at '{database_url}'"))?;
        store.health_check().await?;
        Ok(Self { store })
    }
}

#[async_trait]
impl SessionStore for DurableSessionStore {
    async fn load(&self) -> Result<Option<UserId>> {
        self.store.load_identity().await
    }

    async fn save(&self, user_id: UserId) -> Result<()> {
        self.store.save_identity(user_id).await
    }

    async fn clear(&self) -> Result<()> {
        self.store.clear_identity().await?;
        Ok(())
    }
}
