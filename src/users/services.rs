use tracing::{info, warn};
use uuid::Uuid;

use super::{
    media::Upload,
    repo_types::{ChannelProfile, MediaSlot, PublicUser, WatchedVideo},
};
use crate::{auth::services::SessionManager, error::AppError};

/// Upload a new avatar or cover image and point the record at it.
/// The upload is removed again if the record cannot be updated.
pub async fn replace_media(
    sessions: &SessionManager,
    user_id: Uuid,
    slot: MediaSlot,
    upload: Option<Upload>,
) -> Result<PublicUser, AppError> {
    let upload =
        upload.ok_or_else(|| AppError::validation(format!("{} is required", slot.label())))?;
    let stored = sessions.media().upload(slot, upload).await?;

    let updated = sessions.users().set_media(user_id, slot, &stored.url).await;
    match updated {
        Ok(Some(user)) => {
            info!(%user_id, slot = slot.label(), "profile media updated");
            Ok(user.into())
        }
        Ok(None) => {
            sessions.media().discard(&stored).await;
            Err(AppError::not_found("User not found"))
        }
        Err(e) => {
            warn!(error = %e, %user_id, "profile media update failed; rolling back upload");
            sessions.media().discard(&stored).await;
            Err(e.into())
        }
    }
}

pub async fn channel_profile(
    sessions: &SessionManager,
    username: &str,
    viewer: Uuid,
) -> Result<ChannelProfile, AppError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    sessions
        .users()
        .channel_profile(&username, viewer)
        .await?
        .ok_or_else(|| AppError::not_found("Channel not found"))
}

pub async fn watch_history(
    sessions: &SessionManager,
    user_id: Uuid,
) -> Result<Vec<WatchedVideo>, AppError> {
    Ok(sessions.users().watch_history(user_id).await?)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::auth::services::Registration;
    use crate::state::testing::{fake_parts, png, FakeParts};
    use crate::users::repo_types::VideoOwner;

    async fn with_user(username: &str) -> (FakeParts, PublicUser) {
        let parts = fake_parts();
        let user = register(&parts, username).await;
        (parts, user)
    }

    async fn register(parts: &FakeParts, username: &str) -> PublicUser {
        parts
            .state
            .sessions
            .register(Registration {
                fullname: format!("{username} full"),
                username: username.into(),
                email: format!("{username}@x.com"),
                password: "Secret123".into(),
                avatar: Some(png()),
                cover_image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn avatar_replacement_points_at_new_upload() {
        let (parts, user) = with_user("ana").await;
        let updated = replace_media(&parts.state.sessions, user.id, MediaSlot::Avatar, Some(png()))
            .await
            .unwrap();
        assert_ne!(updated.avatar_url, user.avatar_url);
        assert!(updated.avatar_url.contains("/avatars/"));

        let cover = replace_media(&parts.state.sessions, user.id, MediaSlot::CoverImage, Some(png()))
            .await
            .unwrap();
        assert!(cover.cover_image_url.unwrap().contains("/covers/"));
    }

    #[tokio::test]
    async fn failed_record_update_discards_upload() {
        let (parts, user) = with_user("ana").await;
        parts.users.fail_writes(true);
        let err = replace_media(&parts.state.sessions, user.id, MediaSlot::Avatar, Some(png()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(parts.storage.deleted_keys().len(), 1);
        assert_eq!(parts.storage.live_keys().len(), 1); // first avatar
    }

    #[tokio::test]
    async fn missing_or_non_image_upload_is_rejected() {
        let (parts, user) = with_user("ana").await;
        let sessions = &parts.state.sessions;
        assert!(matches!(
            replace_media(sessions, user.id, MediaSlot::Avatar, None).await,
            Err(AppError::Validation(_))
        ));
        let text = Upload {
            content_type: "text/plain".into(),
            ..png()
        };
        assert!(matches!(
            replace_media(sessions, user.id, MediaSlot::CoverImage, Some(text)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn channel_profile_counts_subscriptions() {
        let (parts, ana) = with_user("ana").await;
        let bob = register(&parts, "bob").await;
        let cy = register(&parts, "cy").await;
        parts.users.subscribe(bob.id, ana.id);
        parts.users.subscribe(cy.id, ana.id);
        parts.users.subscribe(ana.id, bob.id);

        let sessions = &parts.state.sessions;
        let seen_by_bob = channel_profile(sessions, " ANA ", bob.id).await.unwrap();
        assert_eq!(seen_by_bob.id, ana.id);
        assert_eq!(seen_by_bob.subscriber_count, 2);
        assert_eq!(seen_by_bob.channel_subscribed_to_count, 1);
        assert!(seen_by_bob.is_subscribed);

        let seen_by_self = channel_profile(sessions, "ana", ana.id).await.unwrap();
        assert!(!seen_by_self.is_subscribed);

        assert!(matches!(
            channel_profile(sessions, "ghost", ana.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            channel_profile(sessions, "  ", ana.id).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn watch_history_keeps_watch_order() {
        let (parts, ana) = with_user("ana").await;
        let owner = VideoOwner {
            id: ana.id,
            username: ana.username.clone(),
            fullname: ana.fullname.clone(),
            email: ana.email.clone(),
            avatar_url: ana.avatar_url.clone(),
        };
        let video = |title: &str| WatchedVideo {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            video_url: "https://fake.local/v.mp4".into(),
            thumbnail_url: "https://fake.local/t.png".into(),
            duration_secs: 12.5,
            views: 3,
            created_at: OffsetDateTime::now_utc(),
            owner: owner.clone(),
        };
        parts.users.watch(ana.id, video("first"));
        parts.users.watch(ana.id, video("second"));

        let history = watch_history(&parts.state.sessions, ana.id).await.unwrap();
        let titles: Vec<_> = history.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["first", "second"]);
        assert_eq!(history[0].owner, owner);
    }
}
