//! In-process `UserStore` for tests. A single mutex makes every
//! conditional update atomic, like the row-level check in Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{ChannelProfile, MediaSlot, NewUser, User, WatchedVideo};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    subscriptions: HashSet<(Uuid, Uuid)>, // (subscriber, channel)
    videos: HashMap<Uuid, WatchedVideo>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert` and `set_media` fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<User> {
        self.inner.lock().unwrap().users.get(&id).cloned()
    }

    pub fn subscribe(&self, subscriber: Uuid, channel: Uuid) {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert((subscriber, channel));
    }

    pub fn watch(&self, viewer: Uuid, video: WatchedVideo) {
        let mut inner = self.inner.lock().unwrap();
        let id = video.id;
        inner.videos.insert(id, video);
        if let Some(user) = inner.users.get_mut(&viewer) {
            user.watch_history.push(id);
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        for existing in inner.users.values() {
            if existing.username.eq_ignore_ascii_case(&user.username) {
                return Err(StoreError::Conflict("username"));
            }
            if existing.email.eq_ignore_ascii_case(&user.email) {
                return Err(StoreError::Conflict("email"));
            }
        }
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: user.id,
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            avatar_url: user.avatar_url,
            cover_image_url: user.cover_image_url,
            password_hash: user.password_hash,
            refresh_token: None,
            watch_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(username) || u.email.eq_ignore_ascii_case(email)
        }))
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&id) {
            user.refresh_token = token.map(str::to_string);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(current) => {
                user.refresh_token = Some(next.to_string());
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        next_hash: &str,
        revoke_sessions: bool,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(user) if user.password_hash == current_hash => {
                user.password_hash = next_hash.to_string();
                if revoke_sessions {
                    user.refresh_token = None;
                }
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_media(
        &self,
        id: Uuid,
        slot: MediaSlot,
        url: &str,
    ) -> Result<Option<User>, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.users.get_mut(&id).map(|user| {
            match slot {
                MediaSlot::Avatar => user.avatar_url = url.to_string(),
                MediaSlot::CoverImage => user.cover_image_url = Some(url.to_string()),
            }
            user.updated_at = OffsetDateTime::now_utc();
            user.clone()
        }))
    }

    async fn channel_profile(
        &self,
        username: &str,
        viewer: Uuid,
    ) -> Result<Option<ChannelProfile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(user) = inner
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
        else {
            return Ok(None);
        };
        let subscribers = inner.subscriptions.iter().filter(|(_, c)| *c == user.id).count();
        let subscribed_to = inner.subscriptions.iter().filter(|(s, _)| *s == user.id).count();
        Ok(Some(ChannelProfile {
            id: user.id,
            fullname: user.fullname.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            cover_image_url: user.cover_image_url.clone(),
            subscriber_count: subscribers as i64,
            channel_subscribed_to_count: subscribed_to as i64,
            is_subscribed: inner.subscriptions.contains(&(viewer, user.id)),
            created_at: user.created_at,
        }))
    }

    async fn watch_history(&self, id: Uuid) -> Result<Vec<WatchedVideo>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(user) = inner.users.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(user
            .watch_history
            .iter()
            .filter_map(|v| inner.videos.get(v).cloned())
            .collect())
    }
}
