use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::MediaSlot;
use crate::error::AppError;
use crate::storage::StorageClient;

/// An image received from the client, fully buffered.
#[derive(Debug, Clone)]
pub struct Upload {
    pub body: Bytes,
    pub content_type: String,
}

/// An object written to storage, kept so a failed write can be undone.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub key: String,
    pub url: String,
}

/// Object-store access bounded by a timeout.
#[derive(Clone)]
pub struct MediaStore {
    storage: Arc<dyn StorageClient>,
    timeout: Duration,
}

impl MediaStore {
    pub fn new(storage: Arc<dyn StorageClient>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    pub async fn upload(&self, slot: MediaSlot, upload: Upload) -> Result<StoredMedia, AppError> {
        validate_image(slot, &upload)?;
        let ext = ext_from_mime(&upload.content_type).unwrap_or("bin");
        let key = format!(
            "{}/{}-{}.{}",
            slot.folder(),
            OffsetDateTime::now_utc().unix_timestamp(),
            Uuid::new_v4(),
            ext
        );
        let put = self
            .storage
            .put_object(&key, upload.body, &upload.content_type);
        let url = match tokio::time::timeout(self.timeout, put).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                warn!(error = %e, %key, "media upload failed");
                return Err(AppError::internal(format!("failed to upload {}", slot.label())));
            }
            Err(_) => {
                warn!(%key, "media upload timed out");
                return Err(AppError::Unavailable("object storage".into()));
            }
        };
        info!(%key, "media uploaded");
        Ok(StoredMedia { key, url })
    }

    /// Best-effort removal of an upload whose owning write failed.
    pub async fn discard(&self, media: &StoredMedia) {
        let delete = self.storage.delete_object(&media.key);
        match tokio::time::timeout(self.timeout, delete).await {
            Ok(Ok(())) => info!(key = %media.key, "orphaned media removed"),
            Ok(Err(e)) => warn!(error = %e, key = %media.key, "failed to remove orphaned media"),
            Err(_) => warn!(key = %media.key, "timed out removing orphaned media"),
        }
    }
}

pub fn validate_image(slot: MediaSlot, upload: &Upload) -> Result<(), AppError> {
    if upload.body.is_empty() {
        return Err(AppError::validation(format!("{} is required", slot.label())));
    }
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::validation("Only image files are allowed"));
    }
    Ok(())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::FakeStorage;

    fn png() -> Upload {
        Upload {
            body: Bytes::from_static(b"\x89PNG...."),
            content_type: "image/png".into(),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn only_non_empty_images_are_accepted() {
        assert!(validate_image(MediaSlot::Avatar, &png()).is_ok());
        let pdf = Upload {
            content_type: "application/pdf".into(),
            ..png()
        };
        assert!(matches!(
            validate_image(MediaSlot::Avatar, &pdf),
            Err(AppError::Validation(_))
        ));
        let empty = Upload {
            body: Bytes::new(),
            ..png()
        };
        assert!(matches!(
            validate_image(MediaSlot::CoverImage, &empty),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn upload_keys_live_under_slot_folder() {
        let storage = Arc::new(FakeStorage::default());
        let media = MediaStore::new(storage.clone(), Duration::from_secs(1));
        let stored = media.upload(MediaSlot::CoverImage, png()).await.unwrap();
        assert!(stored.key.starts_with("covers/"));
        assert!(stored.key.ends_with(".png"));
        assert!(stored.url.ends_with(&stored.key));
        assert_eq!(storage.live_keys(), vec![stored.key.clone()]);

        media.discard(&stored).await;
        assert!(storage.live_keys().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_is_internal() {
        let storage = Arc::new(FakeStorage::default());
        storage.fail_puts(true);
        let media = MediaStore::new(storage, Duration::from_secs(1));
        let err = media.upload(MediaSlot::Avatar, png()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storage_is_unavailable() {
        let storage = Arc::new(FakeStorage::default());
        storage.delay_puts(Duration::from_secs(30));
        let media = MediaStore::new(storage.clone(), Duration::from_secs(1));
        let err = media.upload(MediaSlot::Avatar, png()).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
