use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{jwt::TokenIssuer, password::PasswordHasher, services::SessionManager};
use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::users::{
    media::MediaStore,
    repo::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: SessionManager,
}

impl AppState {
    /// Connects to Postgres and object storage; returns the pool for migrations.
    pub async fn init() -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;

        Ok((Self::from_parts(config, users, storage)?, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
    ) -> anyhow::Result<Self> {
        let sessions = SessionManager::new(
            users,
            TokenIssuer::new(&config.jwt),
            PasswordHasher::new(&config.password)?,
            MediaStore::new(storage, config.storage.timeout()),
            config.session.revoke_sessions_on_password_change,
        );
        Ok(Self { config, sessions })
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
