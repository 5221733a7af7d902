use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// 10 MiB limit for uploaded photos
pub const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;

/// URL prefix under which stored photos are served.
pub const MEDIA_PREFIX: &str = "/media/";

/// Flat directory of uploaded photos, each stored as `{dir}/{uuid}.{ext}` and
/// referenced from the store as `/media/{uuid}.{ext}`.
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub async fn new(dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Write an uploaded photo and return its stable reference.
    pub async fn save(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<String, ApiError> {
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("empty upload".into()));
        }
        if bytes.len() > MAX_PHOTO_SIZE {
            return Err(ApiError::PayloadTooLarge(MAX_PHOTO_SIZE));
        }
        let ext = extension_for(content_type)?;

        let name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.dir.join(&name);
        let mut file = fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create {}: {}", path.display(), e);
            ApiError::Internal(format!("cannot store upload: {}", e))
        })?;
        file.write_all(bytes).await.map_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
            ApiError::Internal(format!("cannot store upload: {}", e))
        })?;
        file.flush().await.map_err(|e| ApiError::Internal(e.to_string()))?;

        info!("Stored photo {} ({} bytes)", name, bytes.len());
        Ok(format!("{}{}", MEDIA_PREFIX, name))
    }

    /// Delete a stored photo by reference. A missing file is only worth a warning.
    pub async fn remove(&self, reference: &str) {
        let Some(name) = reference.strip_prefix(MEDIA_PREFIX) else {
            return;
        };
        // Names are generated here; anything with a separator is not ours.
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return;
        }
        let path = self.dir.join(name);
        match fs::remove_file(&path).await {
            Ok(()) => info!("Deleted photo {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Photo {} already gone", name)
            }
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }
}

fn extension_for(content_type: Option<&str>) -> Result<&'static str, ApiError> {
    let mime = content_type
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    match mime {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(ApiError::BadRequest(format!(
            "unsupported image type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("media")).await.unwrap();

        let reference = store.save(Some("image/png"), b"\x89PNG fake").await.unwrap();
        assert!(reference.starts_with(MEDIA_PREFIX));
        assert!(reference.ends_with(".png"));

        let name = reference.trim_start_matches(MEDIA_PREFIX);
        let on_disk = store.dir().join(name);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"\x89PNG fake");

        store.remove(&reference).await;
        assert!(!on_disk.exists());
        store.remove(&reference).await;
    }

    #[tokio::test]
    async fn rejects_empty_oversized_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).await.unwrap();

        assert!(matches!(
            store.save(Some("image/png"), b"").await,
            Err(ApiError::BadRequest(_))
        ));
        let big = vec![0u8; MAX_PHOTO_SIZE + 1];
        assert!(matches!(
            store.save(Some("image/png"), &big).await,
            Err(ApiError::PayloadTooLarge(_))
        ));
        assert!(matches!(
            store.save(Some("text/plain"), b"hi").await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(store.save(Some("image/jpeg; charset=binary"), b"jpg").await.is_ok());
    }
}
