//! On-disk storage for task attachments.
//!
//! Files are written under a random name `<uuid>[.<ext>]` and referenced from
//! tasks as `/uploads/<name>`. Names coming back from clients are parsed
//! strictly, so a lookup can never leave the base directory.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// URL prefix under which stored files are served.
pub const PUBLIC_PREFIX: &str = "/uploads/";

const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    base_path: PathBuf,
    max_size: usize,
}

impl AttachmentStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Storage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Attachment store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Reject a file before anything is written.
    pub fn check_size(&self, size: usize) -> Result<(), ServerError> {
        if size == 0 {
            return Err(ServerError::BadRequest("Empty file".to_string()));
        }
        if size > self.max_size {
            return Err(ServerError::PayloadTooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Write `data` under a fresh name and return its public reference.
    pub async fn store(&self, original_name: Option<&str>, data: &[u8]) -> Result<String, ServerError> {
        self.check_size(data.len())?;

        let name = match original_name.and_then(extension_of) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.base_path.join(&name);

        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to write {name}: {e}")))?;

        debug!(name = %name, size = data.len(), "Stored attachment");
        Ok(format!("{PUBLIC_PREFIX}{name}"))
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.resolve(name)?;

        if !path.exists() {
            return Err(ServerError::NotFound("File not found".to_string()));
        }

        fs::read(&path)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to read {name}: {e}")))
    }

    /// Remove a stored file given its public reference.
    pub async fn remove(&self, reference: &str) -> Result<(), ServerError> {
        let name = reference.strip_prefix(PUBLIC_PREFIX).unwrap_or(reference);
        let path = self.resolve(name)?;

        fs::remove_file(&path)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to delete {name}: {e}")))?;

        debug!(name = %name, "Removed attachment");
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, ServerError> {
        if !is_stored_name(name) {
            return Err(ServerError::NotFound("File not found".to_string()));
        }
        Ok(self.base_path.join(name))
    }
}

/// Lowercased extension of a client file name, if it is short and plain.
fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Only names this store generates are accepted.
fn is_stored_name(name: &str) -> bool {
    let (stem, ext) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };
    Uuid::parse_str(stem).is_ok()
        && ext.map_or(true, |e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// Content type for a stored name, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
