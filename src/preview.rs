//! Entry previews.
//!
//! Opening an entry downloads its bytes into a `LocalRef`, a scoped local copy
//! that is deleted when revoked or dropped. Text entries are also decoded for
//! editing; saving re-uploads the whole text under the same name.

use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::entry::{FileKind, DEFAULT_MIME};
use crate::path::RemotePath;
use crate::providers::{ProviderError, StorageBackend};
use crate::transfer_pool::ParallelTransferConfig;
use crate::tree_ops::validate_name;
use crate::upload::{ChunkUploader, UploadFile, UploadReport};

/// Transient local copy of a downloaded entry. Removed from disk on
/// `revoke` or drop.
#[derive(Debug)]
pub struct LocalRef {
    path: tempfile::TempPath,
}

impl LocalRef {
    async fn create(name: &str, bytes: Vec<u8>) -> Result<Self, ProviderError> {
        let suffix = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let path = tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("folio-preview-")
                .suffix(&suffix)
                .tempfile()?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok::<_, std::io::Error>(file.into_temp_path())
        })
        .await
        .map_err(|e| ProviderError::IoError(std::io::Error::other(e)))??;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the local copy now, reporting any error.
    pub fn revoke(self) -> Result<(), ProviderError> {
        let path: PathBuf = self.path.to_path_buf();
        self.path.close()?;
        debug!("revoked preview {}", path.display());
        Ok(())
    }
}

/// An opened entry
#[derive(Debug)]
pub struct PreviewEntry {
    pub parent: RemotePath,
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub kind: FileKind,
    pub local: LocalRef,
    /// Decoded content, for text entries only
    pub text: Option<String>,
}

impl PreviewEntry {
    pub fn is_text(&self) -> bool {
        self.kind == FileKind::Text
    }
}

/// Download `parent/name` and wrap it for display.
pub async fn open_entry(
    backend: &dyn StorageBackend,
    parent: &RemotePath,
    name: &str,
) -> Result<PreviewEntry, ProviderError> {
    validate_name(name)?;
    let downloaded = backend.download_file(parent, name).await?;
    let kind = FileKind::infer(downloaded.mime.as_deref(), name);
    let mime = downloaded.mime.unwrap_or_else(|| DEFAULT_MIME.to_string());
    let size = downloaded.bytes.len() as u64;
    let text = (kind == FileKind::Text).then(|| String::from_utf8_lossy(&downloaded.bytes).into_owned());
    let local = LocalRef::create(name, downloaded.bytes).await?;

    debug!("opened {} ({} bytes, {})", parent.to_body_path(Some(name)), size, kind);
    Ok(PreviewEntry {
        parent: parent.clone(),
        name: name.to_string(),
        size,
        mime,
        kind,
        local,
        text,
    })
}

/// Text content of `parent/name`; `NotText` for any other kind.
pub async fn text_content(
    backend: &dyn StorageBackend,
    parent: &RemotePath,
    name: &str,
) -> Result<String, ProviderError> {
    let entry = open_entry(backend, parent, name).await?;
    let PreviewEntry { text, local, .. } = entry;
    local.revoke()?;
    text.ok_or_else(|| ProviderError::NotText(parent.to_body_path(Some(name))))
}

/// Overwrite `parent/name` with `content`.
pub async fn save_text(
    backend: &dyn StorageBackend,
    config: &ParallelTransferConfig,
    parent: &RemotePath,
    name: &str,
    content: &str,
    cancel: Option<&CancellationToken>,
) -> Result<UploadReport, ProviderError> {
    let file = UploadFile::text(name, content);
    let report = ChunkUploader::new(backend, config)
        .upload(&file, parent, None, cancel)
        .await?;
    info!("Saved {} ({} bytes)", parent.to_body_path(Some(name)), report.bytes_uploaded);
    Ok(report)
}

/// Write the raw bytes of `parent/name` to `local_path`.
pub async fn download_to(
    backend: &dyn StorageBackend,
    parent: &RemotePath,
    name: &str,
    local_path: &Path,
) -> Result<u64, ProviderError> {
    validate_name(name)?;
    let downloaded = backend.download_file(parent, name).await?;
    tokio::fs::write(local_path, &downloaded.bytes).await?;
    info!("Downloaded {} -> {}", parent.to_body_path(Some(name)), local_path.display());
    Ok(downloaded.bytes.len() as u64)
}

/// The entry currently on display. Showing another entry or closing the
/// session releases the previous local copy.
#[derive(Debug, Default)]
pub struct PreviewSession {
    current: Option<PreviewEntry>,
}

impl PreviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, entry: PreviewEntry) -> &mut PreviewEntry {
        self.close();
        self.current.insert(entry)
    }

    pub fn current(&self) -> Option<&PreviewEntry> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut PreviewEntry> {
        self.current.as_mut()
    }

    /// Take the current entry out, leaving the session empty
    pub fn take(&mut self) -> Option<PreviewEntry> {
        self.current.take()
    }

    pub fn close(&mut self) {
        if let Some(entry) = self.current.take() {
            if let Err(e) = entry.local.revoke() {
                tracing::warn!("Failed to remove preview copy of {}: {}", entry.name, e);
            }
        }
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.close();
    }
}
