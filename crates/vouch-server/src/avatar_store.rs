//! Avatar file storage.
//!
//! Avatars live in a flat directory as `<recordId>.<ext>`.  Images fetched
//! from the metadata service before the owning record exists are staged as
//! `temp-<token>.<ext>` and claimed (renamed) at record-creation time.
//! Staged files that are never claimed are removed by a periodic TTL sweep.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;

/// Accepted upload MIME types.
pub const ALLOWED_AVATAR_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Maximum avatar size (5 MiB).
pub const MAX_AVATAR_SIZE_BYTES: usize = 5 * 1024 * 1024;

fn temp_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^temp-[a-f0-9-]+\.(jpg|jpeg|png)$").expect("static pattern")
    })
}

#[derive(Debug, Clone)]
pub struct AvatarStore {
    base_path: PathBuf,
}

impl AvatarStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ApiError::Storage(format!(
                "Failed to create avatars directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Avatar store initialized");

        Ok(Self { base_path })
    }

    /// Validate an uploaded image against the accepted types and size cap.
    pub fn validate_upload(mime: &str, size: usize) -> Result<(), ApiError> {
        if !ALLOWED_AVATAR_TYPES.contains(&mime) {
            return Err(ApiError::InvalidArgument(format!(
                "Unsupported avatar type '{mime}', expected image/jpeg or image/png"
            )));
        }
        if size == 0 {
            return Err(ApiError::InvalidArgument("Empty avatar upload".to_string()));
        }
        if size > MAX_AVATAR_SIZE_BYTES {
            return Err(ApiError::InvalidArgument(format!(
                "Avatar too large: {size} bytes (max {MAX_AVATAR_SIZE_BYTES})"
            )));
        }
        Ok(())
    }

    /// Extension for a stored file, taken from the uploaded file name when it
    /// is one we recognize, `.jpg` otherwise.
    pub fn extension_for(original_name: &str) -> &'static str {
        match Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("png") => ".png",
            Some("jpeg") => ".jpeg",
            Some("jpg") => ".jpg",
            _ => ".jpg",
        }
    }

    /// Store an uploaded avatar under its record's final name.
    ///
    /// Returns the stored file name (`<recordId>.<ext>`).
    pub async fn save_upload(
        &self,
        record_id: Uuid,
        original_name: &str,
        mime: &str,
        data: &[u8],
    ) -> Result<String, ApiError> {
        Self::validate_upload(mime, data.len())?;

        let file_name = format!("{record_id}{}", Self::extension_for(original_name));
        let path = self.safe_path(&file_name)?;

        fs::write(&path, data)
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to write avatar {file_name}: {e}")))?;

        debug!(file = %file_name, size = data.len(), "Stored avatar");
        Ok(file_name)
    }

    /// Stage a fetched image under a temporary token name before the owning
    /// record exists.  Returns the token file name (`temp-<uuid>.<ext>`).
    pub async fn stage(&self, data: &[u8], ext: &str) -> Result<String, ApiError> {
        if data.is_empty() {
            return Err(ApiError::InvalidArgument("Empty avatar image".to_string()));
        }
        if data.len() > MAX_AVATAR_SIZE_BYTES {
            return Err(ApiError::InvalidArgument(format!(
                "Avatar too large: {} bytes (max {MAX_AVATAR_SIZE_BYTES})",
                data.len()
            )));
        }

        let token = format!("temp-{}{ext}", Uuid::new_v4());
        let path = self.safe_path(&token)?;

        fs::write(&path, data)
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to stage avatar: {e}")))?;

        debug!(token = %token, size = data.len(), "Staged fetched avatar");
        Ok(token)
    }

    /// Claim a staged avatar for a newly created record, renaming
    /// `temp-<token>.<ext>` to `<recordId>.<ext>`.
    pub async fn claim(&self, token: &str, record_id: Uuid) -> Result<String, ApiError> {
        if !temp_token_re().is_match(token) {
            return Err(ApiError::InvalidArgument(
                "Invalid fetched avatar token".to_string(),
            ));
        }

        let temp_path = self.safe_path(token)?;
        if !temp_path.exists() {
            return Err(ApiError::InvalidArgument(
                "Fetched avatar expired. Please fetch again or upload an image.".to_string(),
            ));
        }

        let ext = Path::new(token)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_lowercase();
        let file_name = format!("{record_id}.{ext}");
        let dest_path = self.safe_path(&file_name)?;

        fs::rename(&temp_path, &dest_path)
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to claim staged avatar: {e}")))?;

        debug!(token = %token, file = %file_name, "Claimed staged avatar");
        Ok(file_name)
    }

    /// Read a stored avatar for serving to the admin UI.
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.safe_path(file_name)?;

        if !path.exists() {
            return Err(ApiError::NotFound(format!("No such avatar: {file_name}")));
        }

        fs::read(&path)
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to read avatar {file_name}: {e}")))
    }

    /// Full path of a stored avatar, or `None` when the file is missing.
    /// The export packager skips missing files rather than failing.
    pub fn existing_path(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.safe_path(file_name).ok()?;
        path.exists().then_some(path)
    }

    /// Remove staged `temp-*` files older than `max_age`.  Returns how many
    /// were deleted.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize, ApiError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to list avatars: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApiError::Storage(format!("Failed to read directory entry: {e}")))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("temp-") {
                continue;
            }

            let age = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|m| m.elapsed().ok());
            if let Some(age) = age {
                if age > max_age {
                    if fs::remove_file(entry.path()).await.is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            info!(removed, "Swept stale staged avatars");
        }
        Ok(removed)
    }

    /// Resolve a file name inside the avatars directory, rejecting anything
    /// that could traverse out of it.
    fn safe_path(&self, file_name: &str) -> Result<PathBuf, ApiError> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(ApiError::InvalidArgument(
                "Invalid avatar file name".to_string(),
            ));
        }
        Ok(self.base_path.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (AvatarStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = AvatarStore::new(dir.path().to_path_buf()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upload_constraints() {
        let (store, _dir) = test_store().await;
        let id = Uuid::new_v4();

        // 6 MiB PNG: too large.
        let big = vec![0u8; 6 * 1024 * 1024];
        assert!(matches!(
            store.save_upload(id, "avatar.png", "image/png", &big).await,
            Err(ApiError::InvalidArgument(_))
        ));

        // GIF: wrong type.
        assert!(matches!(
            store
                .save_upload(id, "avatar.gif", "image/gif", &[0u8; 1024])
                .await,
            Err(ApiError::InvalidArgument(_))
        ));

        // Small JPEG: accepted.
        let name = store
            .save_upload(id, "avatar.jpg", "image/jpeg", &[0u8; 1024])
            .await
            .unwrap();
        assert_eq!(name, format!("{id}.jpg"));
        assert!(store.existing_path(&name).is_some());
    }

    #[tokio::test]
    async fn unknown_extension_defaults_to_jpg() {
        let (store, _dir) = test_store().await;
        let id = Uuid::new_v4();
        let name = store
            .save_upload(id, "avatar", "image/jpeg", &[0u8; 16])
            .await
            .unwrap();
        assert_eq!(name, format!("{id}.jpg"));
    }

    #[tokio::test]
    async fn stage_then_claim_renames() {
        let (store, _dir) = test_store().await;

        let token = store.stage(b"image-bytes", ".png").await.unwrap();
        assert!(token.starts_with("temp-"));
        assert!(token.ends_with(".png"));

        let id = Uuid::new_v4();
        let name = store.claim(&token, id).await.unwrap();
        assert_eq!(name, format!("{id}.png"));

        // The temp file is gone, the claimed file exists.
        assert!(store.existing_path(&token).is_none());
        let data = store.read(&name).await.unwrap();
        assert_eq!(data, b"image-bytes");
    }

    #[tokio::test]
    async fn claim_of_missing_or_bad_token_fails() {
        let (store, _dir) = test_store().await;
        let id = Uuid::new_v4();

        assert!(matches!(
            store.claim("temp-deadbeef.png", id).await,
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.claim("../../etc/passwd", id).await,
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.claim("not-a-token.jpg", id).await,
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_temp_files() {
        let (store, dir) = test_store().await;

        let token = store.stage(b"stale", ".jpg").await.unwrap();
        let keeper = Uuid::new_v4();
        store
            .save_upload(keeper, "a.jpg", "image/jpeg", b"keep")
            .await
            .unwrap();

        // Nothing is older than an hour yet.
        assert_eq!(store.sweep_stale(Duration::from_secs(3600)).await.unwrap(), 0);

        // With a zero TTL the staged file goes, the claimed one stays.
        assert_eq!(store.sweep_stale(Duration::ZERO).await.unwrap(), 1);
        assert!(store.existing_path(&token).is_none());
        assert!(store.existing_path(&format!("{keeper}.jpg")).is_some());

        drop(dir);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.read("nope.jpg").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
