// src/file_manager.rs - Print file directory
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;

use crate::config::FilesConfig;

const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const WRITE_PROBE: &str = ".test_write_permission";

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File type not allowed: {0}")]
    NotAllowed(String),
    #[error("Invalid filename: {0}")]
    InvalidName(String),
    #[error("File {name} is {size} bytes, limit is {max}")]
    TooLarge { name: String, size: u64, max: u64 },
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Path is not a file: {0}")]
    NotAFile(String),
    #[error("File save verification failed: {0}")]
    EmptyAfterWrite(String),
    #[error("Storage directory unusable: {0}")]
    Directory(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub size_mb: f64,
    pub modified: String,
    pub path: String,
    pub extension: String,
    #[serde(skip)]
    pub modified_at: DateTime<Local>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExtensionStats {
    pub count: usize,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_file_size: u64,
    pub extensions: BTreeMap<String, ExtensionStats>,
    pub average_file_size: f64,
}

/// Print files kept in one flat directory (the USB share the board reads from).
#[derive(Debug, Clone)]
pub struct FileManager {
    directory: PathBuf,
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl FileManager {
    pub fn new(config: &FilesConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Create the directory if it is missing.
    pub async fn ensure_directory(&self) -> Result<(), FileManagerError> {
        fs::create_dir_all(&self.directory).await?;
        tracing::info!("File manager using directory: {}", self.directory.display());
        Ok(())
    }

    pub fn is_allowed_file(&self, filename: &str) -> bool {
        extension_of(filename).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Allowed regular files, newest first.
    pub async fn list_files(&self) -> Result<Vec<FileInfo>, FileManagerError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Print file directory does not exist: {}", self.directory.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.is_allowed_file(&name) {
                continue;
            }
            match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => {
                    files.push(describe(&entry.path(), &name, &metadata));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Error reading file info for {}: {}", name, e),
            }
        }
        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(files)
    }

    pub async fn file_exists(&self, filename: &str) -> bool {
        match self.resolve(filename) {
            Some(path) => fs::metadata(path).await.is_ok_and(|m| m.is_file()),
            None => {
                tracing::warn!("file_exists called with invalid filename: {:?}", filename);
                false
            }
        }
    }

    pub async fn file_info(&self, filename: &str) -> Result<Option<FileInfo>, FileManagerError> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| FileManagerError::InvalidName(filename.to_string()))?;
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(describe(&path, filename, &metadata))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store an upload. Returns the name it was saved under, which gains a
    /// `_N` suffix when the sanitized name is already taken.
    pub async fn save_file(&self, filename: &str, contents: &[u8]) -> Result<String, FileManagerError> {
        if filename.is_empty() {
            return Err(FileManagerError::InvalidName("No filename provided".to_string()));
        }
        if !self.is_allowed_file(filename) {
            return Err(FileManagerError::NotAllowed(filename.to_string()));
        }
        let size = contents.len() as u64;
        if size > self.max_file_size {
            return Err(FileManagerError::TooLarge {
                name: filename.to_string(),
                size,
                max: self.max_file_size,
            });
        }
        let secured = secure_filename(filename);
        if secured.is_empty() || !self.is_allowed_file(&secured) {
            return Err(FileManagerError::InvalidName(filename.to_string()));
        }

        let name = self.unused_name(&secured).await;
        if name != secured {
            tracing::info!("File renamed to avoid conflict: {}", name);
        }
        let path = self.directory.join(&name);
        fs::write(&path, contents).await?;

        let written = fs::metadata(&path).await?.len();
        if written == 0 {
            return Err(FileManagerError::EmptyAfterWrite(name));
        }
        tracing::info!("File saved successfully: {} ({} bytes)", name, written);
        Ok(name)
    }

    pub async fn delete_file(&self, filename: &str) -> Result<(), FileManagerError> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| FileManagerError::InvalidName(filename.to_string()))?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileManagerError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(FileManagerError::NotAFile(filename.to_string()));
        }
        fs::remove_file(&path).await?;
        tracing::info!("File deleted successfully: {}", filename);
        Ok(())
    }

    pub async fn storage_stats(&self) -> Result<StorageStats, FileManagerError> {
        let files = self.list_files().await?;
        let mut stats = StorageStats {
            total_files: files.len(),
            ..StorageStats::default()
        };
        for file in &files {
            stats.total_file_size += file.size;
            let entry = stats.extensions.entry(file.extension.clone()).or_default();
            entry.count += 1;
            entry.size += file.size;
        }
        if stats.total_files > 0 {
            stats.average_file_size = stats.total_file_size as f64 / stats.total_files as f64;
        }
        Ok(stats)
    }

    /// Delete files older than `max_age_days`, then the oldest files beyond
    /// `max_files`. Returns how many were deleted.
    pub async fn cleanup_old_files(
        &self,
        max_files: usize,
        max_age_days: i64,
    ) -> Result<usize, FileManagerError> {
        let now = Local::now();
        let mut deleted = 0;

        for file in self.list_files().await? {
            let age_days = (now - file.modified_at).num_days();
            if age_days > max_age_days {
                match self.delete_file(&file.name).await {
                    Ok(()) => {
                        deleted += 1;
                        tracing::info!("Deleted old file: {} (age: {} days)", file.name, age_days);
                    }
                    Err(e) => tracing::warn!("Could not delete {}: {}", file.name, e),
                }
            }
        }

        let remaining = self.list_files().await?;
        if remaining.len() > max_files {
            // list_files is newest first, so the tail is the oldest.
            for file in &remaining[max_files..] {
                match self.delete_file(&file.name).await {
                    Ok(()) => {
                        deleted += 1;
                        tracing::info!("Deleted excess file: {}", file.name);
                    }
                    Err(e) => tracing::warn!("Could not delete {}: {}", file.name, e),
                }
            }
        }

        tracing::info!("Cleanup completed. Deleted {} files.", deleted);
        Ok(deleted)
    }

    /// Check that the directory exists, is a directory and is writable.
    pub async fn validate_directory(&self) -> Result<(), FileManagerError> {
        let metadata = fs::metadata(&self.directory)
            .await
            .map_err(|_| FileManagerError::Directory("Mount point does not exist".to_string()))?;
        if !metadata.is_dir() {
            return Err(FileManagerError::Directory("Mount point is not a directory".to_string()));
        }
        let probe = self.directory.join(WRITE_PROBE);
        fs::write(&probe, b"test")
            .await
            .map_err(|e| FileManagerError::Directory(format!("Write test failed: {e}")))?;
        fs::remove_file(&probe).await?;
        Ok(())
    }

    /// Path for a bare filename; anything that could leave the directory is refused.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\'])
        {
            return None;
        }
        Some(self.directory.join(filename))
    }

    async fn unused_name(&self, name: &str) -> String {
        if fs::metadata(self.directory.join(name)).await.is_err() {
            return name.to_string();
        }
        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let mut counter = 1;
        loop {
            let candidate = format!("{stem}_{counter}{extension}");
            if fs::metadata(self.directory.join(&candidate)).await.is_err() {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn describe(path: &Path, name: &str, metadata: &std::fs::Metadata) -> FileInfo {
    let modified_at: DateTime<Local> = match metadata.modified() {
        Ok(modified) => modified.into(),
        Err(e) => {
            tracing::warn!("Failed to get modified time for '{}': {}", name, e);
            SystemTime::UNIX_EPOCH.into()
        }
    };
    let size = metadata.len();
    FileInfo {
        name: name.to_string(),
        size,
        size_mb: (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        modified: modified_at.format(MODIFIED_FORMAT).to_string(),
        path: path.to_string_lossy().to_string(),
        extension: extension_of(name).unwrap_or_default(),
        modified_at,
    }
}

/// Lower-cased extension including the dot.
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// Reduce an uploaded name to `[A-Za-z0-9._-]`, with separators and
/// whitespace turned into underscores and no leading or trailing dots.
pub fn secure_filename(filename: &str) -> String {
    let spaced = filename.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}
