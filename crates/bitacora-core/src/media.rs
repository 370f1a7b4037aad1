//! Photo attachments
//!
//! Photos live in `<data_dir>/uploads/`; entries reference them by a path
//! relative to the data directory (`uploads/<file>`). Removing a photo moves
//! it to `uploads/deleted/` rather than erasing it.
//!
//! Replacing a photo is two-phase: the new file is staged first, the entry
//! is rewritten to point at it, and only then is the old file moved aside.
//! If the entry write fails the staged file is discarded and the old
//! reference stays valid.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::DataPaths;
use crate::storage::{StorageError, StorageResult};

/// Accepted photo extensions (compared lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Prefix of every stored media path
const UPLOADS_PREFIX: &str = "uploads";

/// A file received from the client
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// Name supplied by the client; only its extension is kept
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A photo written to the uploads directory but not yet committed to an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    relative_path: String,
}

impl StagedMedia {
    /// Path to store in the entry
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
}

/// Manages the uploads directory
#[derive(Debug, Clone)]
pub struct MediaStore {
    paths: DataPaths,
}

impl MediaStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    /// Absolute location of a stored media path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.paths.data_dir().join(relative)
    }

    /// Write an upload under a fresh name
    ///
    /// Returns `Ok(None)` when the file type is not accepted; such uploads
    /// are ignored rather than rejected.
    pub fn stage(&self, upload: &MediaUpload) -> StorageResult<Option<StagedMedia>> {
        let Some(ext) = accepted_extension(&upload.file_name) else {
            tracing::debug!(file_name = %upload.file_name, "Ignoring upload with unsupported type");
            return Ok(None);
        };

        if upload.bytes.is_empty() {
            return Ok(None);
        }

        let uploads = self.paths.uploads_dir();
        std::fs::create_dir_all(&uploads).map_err(|source| StorageError::CreateDirectory {
            path: uploads.clone(),
            source,
        })?;

        let file_name = unique_file_name(&ext);
        let target = uploads.join(&file_name);
        std::fs::write(&target, &upload.bytes)
            .map_err(|e| StorageError::from_io(e, target.clone()))?;

        tracing::debug!(path = %target.display(), "Stored upload");
        Ok(Some(StagedMedia {
            relative_path: format!("{}/{}", UPLOADS_PREFIX, file_name),
        }))
    }

    /// Remove a staged file that never got committed
    pub fn discard(&self, staged: StagedMedia) {
        let path = self.resolve(&staged.relative_path);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to discard staged upload");
        }
    }

    /// Move a stored photo into `uploads/deleted/`
    ///
    /// A reference to a file that is already gone is not an error.
    pub fn soft_delete(&self, relative: &str) -> StorageResult<Option<PathBuf>> {
        let source = self.resolve(relative);
        if !source.exists() {
            return Ok(None);
        }

        let deleted = self.paths.deleted_dir();
        std::fs::create_dir_all(&deleted).map_err(|e| StorageError::CreateDirectory {
            path: deleted.clone(),
            source: e,
        })?;

        let name = source
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| StorageError::NotFound {
                path: source.clone(),
            })?;
        let target = deleted.join(name);

        std::fs::rename(&source, &target).map_err(|e| StorageError::MoveFailed {
            from: source.clone(),
            to: target.clone(),
            source: e,
        })?;

        tracing::info!(from = %source.display(), to = %target.display(), "Moved photo aside");
        Ok(Some(target))
    }

    /// Soft-delete, logging instead of failing
    pub fn soft_delete_logged(&self, relative: &str) {
        if let Err(e) = self.soft_delete(relative) {
            tracing::warn!(media_path = relative, error = %e, "Failed to move photo aside");
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.paths.uploads_dir()
    }

    pub fn data_dir(&self) -> &Path {
        self.paths.data_dir()
    }
}

/// Lowercased extension if it is an accepted photo type
fn accepted_extension(file_name: &str) -> Option<String> {
    let name = Path::new(file_name).file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// `YYYYmmdd_HHMMSS_<6 hex>.<ext>`
fn unique_file_name(ext: &str) -> String {
    let suffix: [u8; 3] = rand::random();
    format!(
        "{}_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        hex::encode(suffix),
        ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn media_store() -> (TempDir, MediaStore) {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(DataPaths::new(dir.path()));
        (dir, store)
    }

    fn upload(name: &str) -> MediaUpload {
        MediaUpload {
            file_name: name.to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
        }
    }

    #[test]
    fn test_accepted_extension() {
        assert_eq!(accepted_extension("boat.JPG").as_deref(), Some("jpg"));
        assert_eq!(accepted_extension("harbour.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(accepted_extension("../../chart.png").as_deref(), Some("png"));
        assert_eq!(accepted_extension("notes.pdf"), None);
        assert_eq!(accepted_extension("no-extension"), None);
    }

    #[test]
    fn test_unique_file_name_shape() {
        let name = unique_file_name("png");
        // 20250601_081500_a1b2c3.png
        assert_eq!(name.len(), 26);
        assert!(name.ends_with(".png"));
        assert_ne!(unique_file_name("png"), unique_file_name("png"));
    }

    #[test]
    fn test_stage_writes_under_uploads() {
        let (_dir, store) = media_store();

        let staged = store.stage(&upload("Sunset.JPG")).unwrap().unwrap();
        assert!(staged.relative_path().starts_with("uploads/"));
        assert!(staged.relative_path().ends_with(".jpg"));
        assert!(!staged.relative_path().contains("Sunset"));

        let on_disk = store.resolve(staged.relative_path());
        assert_eq!(std::fs::read(on_disk).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[test]
    fn test_stage_ignores_other_types() {
        let (_dir, store) = media_store();
        assert!(store.stage(&upload("log.txt")).unwrap().is_none());
        assert!(!store.uploads_dir().exists());
    }

    #[test]
    fn test_stage_ignores_empty_file() {
        let (_dir, store) = media_store();
        let empty = MediaUpload {
            file_name: "x.png".to_string(),
            bytes: Vec::new(),
        };
        assert!(store.stage(&empty).unwrap().is_none());
    }

    #[test]
    fn test_soft_delete_moves_file() {
        let (dir, store) = media_store();
        let staged = store.stage(&upload("a.png")).unwrap().unwrap();
        let original = store.resolve(staged.relative_path());

        let moved = store.soft_delete(staged.relative_path()).unwrap().unwrap();

        assert!(!original.exists());
        assert!(moved.exists());
        assert!(moved.starts_with(dir.path().join("uploads").join("deleted")));
    }

    #[test]
    fn test_soft_delete_missing_is_noop() {
        let (_dir, store) = media_store();
        assert!(store.soft_delete("uploads/gone.jpg").unwrap().is_none());
    }

    #[test]
    fn test_discard_removes_staged_file() {
        let (_dir, store) = media_store();
        let staged = store.stage(&upload("a.png")).unwrap().unwrap();
        let path = store.resolve(staged.relative_path());

        store.discard(staged);
        assert!(!path.exists());
    }
}
