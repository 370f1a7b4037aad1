//! Backup archives
//!
//! A backup is a zip file holding the database, the configuration and every
//! photo directly under `uploads/`. Photos moved aside to `uploads/deleted/`
//! are not included.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{Config, DataPaths};

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backups are not enabled")]
    NotEnabled,

    #[error("Backup destination {path} does not exist or is not writable")]
    InvalidDestination { path: PathBuf },

    #[error("Failed to write backup: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to build backup archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl BackupError {
    /// Whether the failure is a configuration problem rather than an I/O one
    pub fn is_user_error(&self) -> bool {
        matches!(self, BackupError::NotEnabled | BackupError::InvalidDestination { .. })
    }
}

/// Write a backup archive into the configured destination
///
/// Returns the path of the new archive.
pub fn create_backup(config: &Config, paths: &DataPaths) -> Result<PathBuf, BackupError> {
    if !config.backup_enabled {
        return Err(BackupError::NotEnabled);
    }

    let destination = expand_tilde(&config.backup_path);
    if !is_writable_dir(&destination) {
        return Err(BackupError::InvalidDestination { path: destination });
    }

    let archive_path = destination.join(archive_name());
    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_file(&mut zip, &paths.database_path(), "logbook.db", options)?;
    add_file(&mut zip, &paths.config_path(), "config.json", options)?;

    let uploads = paths.uploads_dir();
    if uploads.is_dir() {
        let mut photos: Vec<PathBuf> = std::fs::read_dir(&uploads)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        photos.sort();

        for photo in photos {
            if let Some(name) = photo.file_name().and_then(|n| n.to_str()) {
                add_file(&mut zip, &photo, &format!("uploads/{}", name), options)?;
            }
        }
    }

    zip.finish()?;
    info!(path = %archive_path.display(), "Backup written");
    Ok(archive_path)
}

/// `logbook_backup_<YYYYmmdd_HHMM>.zip`, in local time
fn archive_name() -> String {
    format!("logbook_backup_{}.zip", Local::now().format("%Y%m%d_%H%M"))
}

fn add_file(
    zip: &mut ZipWriter<File>,
    source: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<(), BackupError> {
    if !source.is_file() {
        debug!(path = %source.display(), "Skipping missing backup source");
        return Ok(());
    }

    zip.start_file(name, options)?;
    let mut file = File::open(source)?;
    io::copy(&mut file, zip)?;
    Ok(())
}

fn expand_tilde(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn is_writable_dir(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn populated_data_dir() -> (TempDir, DataPaths) {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        paths.ensure().unwrap();
        std::fs::write(paths.database_path(), b"sqlite").unwrap();
        std::fs::write(paths.config_path(), b"{}").unwrap();
        std::fs::create_dir_all(paths.deleted_dir()).unwrap();
        std::fs::write(paths.uploads_dir().join("a.jpg"), b"photo").unwrap();
        std::fs::write(paths.deleted_dir().join("old.jpg"), b"gone").unwrap();
        (dir, paths)
    }

    fn enabled(dest: &Path) -> Config {
        Config {
            backup_enabled: true,
            backup_path: dest.display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_backup_disabled() {
        let (_dir, paths) = populated_data_dir();
        let err = create_backup(&Config::default(), &paths).unwrap_err();
        assert!(matches!(err, BackupError::NotEnabled));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_backup_missing_destination() {
        let (dir, paths) = populated_data_dir();
        let config = enabled(&dir.path().join("nowhere"));

        let err = create_backup(&config, &paths).unwrap_err();
        assert!(matches!(err, BackupError::InvalidDestination { .. }));
    }

    #[test]
    fn test_backup_archive_contents() {
        let (_dir, paths) = populated_data_dir();
        let dest = TempDir::new().unwrap();

        let archive = create_backup(&enabled(dest.path()), &paths).unwrap();

        let name = archive.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("logbook_backup_"));
        assert!(name.ends_with(".zip"));

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["config.json", "logbook.db", "uploads/a.jpg"]);

        let mut contents = String::new();
        zip.by_name("uploads/a.jpg")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "photo");
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/srv/backups"), PathBuf::from("/srv/backups"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/b"), home.join("b"));
        }
    }
}
