//! Content-addressed upload storage.
//!
//! Stored objects are named by the SHA-1 of their bytes, `{hash}.{ext}`, so
//! identical uploads collapse to one file and re-storing is detected by name.

use std::path::PathBuf;

use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FileStoreConfig;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub hash: String,
    pub size: u64,
    pub extension: String,
}

impl StoredFile {
    /// Canonical name on the backing store.
    pub fn stored_name(&self) -> String {
        format!("{}.{}", self.hash, self.extension)
    }
}

/// Result of a store call. Re-uploading identical bytes is an expected
/// outcome, not a fault, so it is a variant rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored(StoredFile),
    /// The target name already existed; the staged copy was discarded and
    /// the first-stored bytes are untouched.
    AlreadyStored(StoredFile),
}

impl StoreOutcome {
    pub fn file(&self) -> &StoredFile {
        match self {
            StoreOutcome::Stored(f) | StoreOutcome::AlreadyStored(f) => f,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StoreOutcome::Stored(_))
    }
}

pub struct FileStore {
    config: FileStoreConfig,
}

impl FileStore {
    pub fn new(config: FileStoreConfig) -> Self {
        Self { config }
    }

    /// Stream an upload to disk and move it to its content-addressed name.
    ///
    /// The stream is written to a staging file while hashing, then renamed
    /// to `{hash}.{ext}`; no partial file is ever visible under the final
    /// name. Performs disk I/O only, never store writes.
    pub async fn store<R>(
        &self,
        reader: R,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoreOutcome, FileStoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !self
            .config
            .allowed_media_types
            .iter()
            .any(|m| m == content_type)
        {
            warn!(content_type, file_name, "rejected upload");
            return Err(FileStoreError::InvalidMediaType(content_type.to_string()));
        }

        fs::create_dir_all(&self.config.upload_dir).await?;
        let staging = self
            .config
            .upload_dir
            .join(format!(".staging-{}", Uuid::new_v4().simple()));

        let staged = self.write_staged(reader, &staging).await;
        let (hash, size) = match staged {
            Ok(done) => done,
            Err(e) => {
                // best effort, the staging file may not exist
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
        };

        let extension = extension_of(file_name).to_string();
        let file = StoredFile {
            hash,
            size,
            extension,
        };
        let target = self.config.upload_dir.join(file.stored_name());

        if fs::try_exists(&target).await? {
            fs::remove_file(&staging).await?;
            debug!(name = %file.stored_name(), "content already stored");
            return Ok(StoreOutcome::AlreadyStored(file));
        }
        fs::rename(&staging, &target).await?;
        info!(name = %file.stored_name(), size, "stored upload");
        Ok(StoreOutcome::Stored(file))
    }

    /// Path of a stored file for download, `NotFound` when absent.
    pub async fn open(&self, stored_name: &str) -> Result<PathBuf, FileStoreError> {
        let path = self.config.upload_dir.join(stored_name);
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(FileStoreError::NotFound(stored_name.to_string()))
        }
    }

    pub async fn delete(&self, stored_name: &str) -> Result<(), FileStoreError> {
        let path = self.config.upload_dir.join(stored_name);
        if !fs::try_exists(&path).await? {
            return Err(FileStoreError::NotFound(stored_name.to_string()));
        }
        fs::remove_file(&path).await?;
        info!(stored_name, "deleted stored file");
        Ok(())
    }

    async fn write_staged<R>(
        &self,
        mut reader: R,
        staging: &PathBuf,
    ) -> std::io::Result<(String, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut out = fs::File::create(staging).await?;
        let mut hasher = Sha1::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        out.flush().await?;
        Ok((hex::encode(hasher.finalize()), size))
    }
}

/// Extension as declared by the uploaded file name: everything after the
/// last dot, or the whole name when there is none.
fn extension_of(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
