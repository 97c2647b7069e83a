use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Never serialized; responses use [`PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,                 // lower-cased, unique
    pub email: String,                    // lower-cased, unique
    pub fullname: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub password_hash: String,            // Argon2 PHC string, never exposed
    pub refresh_token: Option<String>,    // the single live refresh token
    pub watch_history: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields for a new user record; identifiers are already normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSlot {
    Avatar,
    CoverImage,
}

impl MediaSlot {
    pub fn folder(self) -> &'static str {
        match self {
            MediaSlot::Avatar => "avatars",
            MediaSlot::CoverImage => "covers",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaSlot::Avatar => "avatar",
            MediaSlot::CoverImage => "cover image",
        }
    }
}

/// User projection safe to return to any caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            fullname: u.fullname,
            avatar_url: u.avatar_url,
            cover_image_url: u.cover_image_url,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub subscriber_count: i64,
    pub channel_subscribed_to_count: i64,
    pub is_subscribed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOwner {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedVideo {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration_secs: f64,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub owner: VideoOwner,
}

/// Flat row of the watch-history join.
#[derive(Debug, FromRow)]
pub struct WatchedVideoRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration_secs: f64,
    pub views: i64,
    pub created_at: OffsetDateTime,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub owner_fullname: String,
    pub owner_email: String,
    pub owner_avatar_url: String,
}

impl From<WatchedVideoRow> for WatchedVideo {
    fn from(r: WatchedVideoRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            video_url: r.video_url,
            thumbnail_url: r.thumbnail_url,
            duration_secs: r.duration_secs,
            views: r.views,
            created_at: r.created_at,
            owner: VideoOwner {
                id: r.owner_id,
                username: r.owner_username,
                fullname: r.owner_fullname,
                email: r.owner_email,
                avatar_url: r.owner_avatar_url,
            },
        }
    }
}
