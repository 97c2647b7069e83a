use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    claims::RefreshSubject,
    dto::{LoginResponse, TokenPair},
    jwt::{TokenError, TokenIssuer},
    password::PasswordHasher,
};
use crate::{
    error::AppError,
    users::{
        media::{validate_image, MediaStore, StoredMedia, Upload},
        repo::UserStore,
        repo_types::{MediaSlot, NewUser, PublicUser, User},
    },
};

const MIN_PASSWORD_LEN: usize = 8;

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => AppError::Internal(msg),
            _ => AppError::unauthorized("Invalid or expired token"),
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Input to [`SessionManager::register`].
#[derive(Debug, Default)]
pub struct Registration {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<Upload>,
    pub cover_image: Option<Upload>,
}

/// Login, refresh, logout and password change over the credential store.
///
/// Each user has at most one live refresh token: the one stored on the
/// record. Issuing a new one overwrites it, so older tokens stop working.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    hasher: PasswordHasher,
    media: MediaStore,
    revoke_on_password_change: bool,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenIssuer,
        hasher: PasswordHasher,
        media: MediaStore,
        revoke_on_password_change: bool,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            media,
            revoke_on_password_change,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    async fn hash(&self, plain: &str) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let plain = plain.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain)).await??;
        Ok(hash)
    }

    async fn verify(&self, plain: &str, hash: &str) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let (plain, hash) = (plain.to_string(), hash.to_string());
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await?)
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = self.tokens.issue_access(user.id)?;
        let refresh_token = self.tokens.issue_refresh(RefreshSubject {
            id: user.id,
            username: &user.username,
            email: &user.email,
            fullname: &user.fullname,
        })?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub async fn register(&self, reg: Registration) -> Result<PublicUser, AppError> {
        let fullname = reg.fullname.trim().to_string();
        let username = normalize_identifier(&reg.username);
        let email = normalize_identifier(&reg.email);

        if [&fullname, &username, &email].iter().any(|f| f.is_empty())
            || reg.password.trim().is_empty()
        {
            return Err(AppError::validation("All fields are required"));
        }
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AppError::validation("Invalid email"));
        }
        if reg.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation("Password too short"));
        }
        let avatar = reg
            .avatar
            .ok_or_else(|| AppError::validation("Avatar is missing"))?;
        validate_image(MediaSlot::Avatar, &avatar)?;
        let cover_image = reg.cover_image;
        if let Some(cover) = &cover_image {
            validate_image(MediaSlot::CoverImage, cover)?;
        }

        if self.users.username_or_email_taken(&username, &email).await? {
            warn!(%username, %email, "username or email already registered");
            return Err(AppError::Conflict("Username or email already exists".into()));
        }

        let password_hash = self.hash(&reg.password).await?;

        // Upload, then create the record; any failure after the first
        // upload removes what was stored.
        let mut uploaded: Vec<StoredMedia> = Vec::with_capacity(2);
        let created = async {
            let avatar = self.media.upload(MediaSlot::Avatar, avatar).await?;
            uploaded.push(avatar.clone());
            let cover = match cover_image {
                Some(cover) => {
                    let stored = self.media.upload(MediaSlot::CoverImage, cover).await?;
                    uploaded.push(stored.clone());
                    Some(stored)
                }
                None => None,
            };
            let user = self
                .users
                .insert(NewUser {
                    id: Uuid::new_v4(),
                    username,
                    email,
                    fullname,
                    avatar_url: avatar.url,
                    cover_image_url: cover.map(|c| c.url),
                    password_hash,
                })
                .await?;
            Ok::<_, AppError>(user)
        }
        .await;

        match created {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "user registered");
                Ok(user.into())
            }
            Err(e) => {
                warn!(error = %e, uploads = uploaded.len(), "registration failed; rolling back media");
                for media in &uploaded {
                    self.media.discard(media).await;
                }
                Err(e)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AppError> {
        let email = normalize_identifier(email);
        if email.is_empty() || password.trim().is_empty() {
            return Err(AppError::validation("Email and password are required"));
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            // same argon2 cost as a real mismatch
            let dummy = self.hasher.dummy_hash().to_string();
            self.verify(password, &dummy).await?;
            warn!(%email, "login unknown email");
            return Err(AppError::unauthorized("Invalid email or password"));
        };
        if !self.verify(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::unauthorized("Invalid email or password"));
        }

        let tokens = self.issue_pair(&user)?;
        self.users
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            user: user.into(),
            tokens,
        })
    }

    /// Rotate the pair. The incoming token must be the one currently stored;
    /// the swap is a compare-and-set so a token is redeemable at most once.
    pub async fn refresh(&self, incoming: Option<&str>) -> Result<TokenPair, AppError> {
        let incoming = incoming
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("Refresh token is required"))?;

        let claims = self.tokens.verify_refresh(incoming).map_err(|e| {
            warn!(reason = %e, "refresh token rejected");
            AppError::unauthorized("Invalid refresh token")
        })?;

        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            warn!(user_id = %claims.sub, "refresh for missing user");
            return Err(AppError::unauthorized("Invalid refresh token"));
        };
        if user.refresh_token.as_deref() != Some(incoming) {
            warn!(user_id = %user.id, "refresh token superseded or revoked");
            return Err(AppError::unauthorized("Invalid refresh token"));
        }

        let tokens = self.issue_pair(&user)?;
        let rotated = self
            .users
            .rotate_refresh_token(user.id, incoming, &tokens.refresh_token)
            .await?;
        if !rotated {
            warn!(user_id = %user.id, "refresh token lost rotation race");
            return Err(AppError::unauthorized("Invalid refresh token"));
        }

        info!(user_id = %user.id, "tokens refreshed");
        Ok(tokens)
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.users.set_refresh_token(user_id, None).await?;
        info!(%user_id, "user logged out");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if old_password.is_empty() || new_password.trim().is_empty() {
            return Err(AppError::validation("Old and new passwords are required"));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        if !self.verify(old_password, &user.password_hash).await? {
            warn!(%user_id, "change password with wrong old password");
            return Err(AppError::unauthorized("Old password is incorrect"));
        }
        if new_password == old_password {
            return Err(AppError::validation(
                "New password cannot be the same as old password",
            ));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation("Password too short"));
        }

        let next_hash = self.hash(new_password).await?;
        let replaced = self
            .users
            .replace_password_hash(
                user_id,
                &user.password_hash,
                &next_hash,
                self.revoke_on_password_change,
            )
            .await?;
        if !replaced {
            warn!(%user_id, "password changed concurrently");
            return Err(AppError::unauthorized("Old password is incorrect"));
        }

        info!(
            %user_id,
            sessions_revoked = self.revoke_on_password_change,
            "password changed"
        );
        Ok(())
    }
}
