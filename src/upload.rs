//! Attachment upload boundary
//!
//! The hub only ever sees the resulting `Attachment` descriptors. Bytes go to
//! a `BlobStore`, which hands back the URL the file is served from.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use chrono::Utc;
use tokio::fs;
use tracing::info;

use crate::error::UploadError;
use crate::store::Attachment;

/// Files accepted per upload request
pub const MAX_FILES: usize = 4;

/// Largest accepted file (10 MiB)
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// URL prefix stored files are served under
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Somewhere to put attachment bytes
pub trait BlobStore: Send + Sync + 'static {
    /// Persist one file and return its public URL
    fn store(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<String, UploadError>> + Send;
}

/// One file taken from an upload request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Check limits, then store every file
///
/// Nothing is stored unless the whole batch is acceptable.
pub async fn store_all<S: BlobStore>(
    store: &S,
    files: Vec<UploadedFile>,
) -> Result<Vec<Attachment>, UploadError> {
    if files.is_empty() {
        return Err(UploadError::NoFiles);
    }
    if files.len() > MAX_FILES {
        return Err(UploadError::TooManyFiles { max: MAX_FILES });
    }
    if let Some(big) = files.iter().find(|f| f.data.len() > MAX_FILE_SIZE) {
        return Err(UploadError::TooLarge {
            name: big.original_name.clone(),
            max: MAX_FILE_SIZE,
        });
    }

    let mut attachments = Vec::with_capacity(files.len());
    for file in files {
        let url = store.store(&file.original_name, &file.data).await?;
        attachments.push(Attachment {
            original_name: file.original_name,
            mime_type: file.mime_type,
            size: file.data.len() as u64,
            url,
        });
    }
    Ok(attachments)
}

/// Blob store writing into a local directory
#[derive(Debug)]
pub struct DiskBlobStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl DiskBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }
}

impl BlobStore for DiskBlobStore {
    async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, UploadError> {
        fs::create_dir_all(&self.dir).await?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let file_name = format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            seq,
            safe_file_name(original_name)
        );
        fs::write(self.dir.join(&file_name), data).await?;

        info!(file = %file_name, size_bytes = data.len(), "Attachment stored");
        Ok(format!("{}/{}", UPLOADS_PREFIX, file_name))
    }
}

/// Reduce a client-supplied name to something safe to put on disk
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
