use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{
    ChannelProfile, MediaSlot, NewUser, User, WatchedVideo, WatchedVideoRow,
};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Conflict(&'static str),

    #[error("user store unavailable")]
    Unavailable,

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                match db.constraint() {
                    Some("users_username_key") => StoreError::Conflict("username"),
                    _ => StoreError::Conflict("email"),
                }
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => AppError::Conflict(format!("{field} already exists")),
            StoreError::Unavailable => AppError::Unavailable("user store".into()),
            StoreError::Database(msg) => AppError::Internal(msg),
        }
    }
}

/// Persistence of user credential records.
///
/// Writes that guard session state (`rotate_refresh_token`,
/// `replace_password_hash`) are single conditional updates so concurrent
/// callers racing on the same stale value cannot both win.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn username_or_email_taken(&self, username: &str, email: &str)
        -> Result<bool, StoreError>;

    /// Unconditionally overwrite (or clear) the stored refresh token.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError>;

    /// Swap `current` for `next`; `false` if `current` is no longer stored.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError>;

    /// Swap the password hash if it still equals `current_hash`.
    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        next_hash: &str,
        revoke_sessions: bool,
    ) -> Result<bool, StoreError>;

    async fn set_media(
        &self,
        id: Uuid,
        slot: MediaSlot,
        url: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn channel_profile(
        &self,
        username: &str,
        viewer: Uuid,
    ) -> Result<Option<ChannelProfile>, StoreError>;

    async fn watch_history(&self, id: Uuid) -> Result<Vec<WatchedVideo>, StoreError>;
}

const USER_COLUMNS: &str = "id, username, email, fullname, avatar_url, cover_image_url, \
     password_hash, refresh_token, watch_history, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, fullname, avatar_url, cover_image_url, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.fullname)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                 WHERE lower(username) = lower($1) OR lower(email) = lower($2)
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        next_hash: &str,
        revoke_sessions: bool,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $3,
                   refresh_token = CASE WHEN $4 THEN NULL ELSE refresh_token END,
                   updated_at = now()
             WHERE id = $1 AND password_hash = $2
            "#,
        )
        .bind(id)
        .bind(current_hash)
        .bind(next_hash)
        .bind(revoke_sessions)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_media(
        &self,
        id: Uuid,
        slot: MediaSlot,
        url: &str,
    ) -> Result<Option<User>, StoreError> {
        let column = match slot {
            MediaSlot::Avatar => "avatar_url",
            MediaSlot::CoverImage => "cover_image_url",
        };
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET {column} = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn channel_profile(
        &self,
        username: &str,
        viewer: Uuid,
    ) -> Result<Option<ChannelProfile>, StoreError> {
        let profile = sqlx::query_as::<_, ChannelProfile>(
            r#"
            SELECT u.id, u.fullname, u.username, u.email, u.avatar_url, u.cover_image_url,
                   (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id)
                       AS subscriber_count,
                   (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id)
                       AS channel_subscribed_to_count,
                   EXISTS (
                       SELECT 1 FROM subscriptions s
                        WHERE s.channel_id = u.id AND s.subscriber_id = $2
                   ) AS is_subscribed,
                   u.created_at
              FROM users u
             WHERE lower(u.username) = lower($1)
            "#,
        )
        .bind(username)
        .bind(viewer)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn watch_history(&self, id: Uuid) -> Result<Vec<WatchedVideo>, StoreError> {
        let rows = sqlx::query_as::<_, WatchedVideoRow>(
            r#"
            SELECT v.id, v.title, v.description, v.video_url, v.thumbnail_url,
                   v.duration_secs, v.views, v.created_at,
                   o.id AS owner_id, o.username AS owner_username,
                   o.fullname AS owner_fullname, o.email AS owner_email,
                   o.avatar_url AS owner_avatar_url
              FROM users u
             CROSS JOIN LATERAL unnest(u.watch_history) WITH ORDINALITY AS h(video_id, position)
              JOIN videos v ON v.id = h.video_id
              JOIN users o ON o.id = v.owner_id
             WHERE u.id = $1
             ORDER BY h.position
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(WatchedVideo::from).collect())
    }
}
