//! `StorageClient`: every storage operation behind one object.
//!
//! The backend is injected, so the same client drives the HTTP API in
//! production and an in-memory backend in tests.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::entry::{normalize_listing, DirectoryEntry};
use crate::folder_upload::{FolderUploadReport, FolderUploader, RelativeFile};
use crate::path::RemotePath;
use crate::preview::{self, PreviewEntry, PreviewSession};
use crate::providers::http::{HttpBackend, HttpBackendConfig};
use crate::providers::{ProviderError, StorageBackend};
use crate::transfer_pool::ParallelTransferConfig;
use crate::tree::EntryArena;
use crate::tree_ops::{self, validate_name, EntryType};
use crate::upload::{ChunkUploader, ProgressFn, UploadFile, UploadReport};

#[derive(Clone)]
pub struct StorageClient {
    backend: Arc<dyn StorageBackend>,
    transfer: ParallelTransferConfig,
}

impl StorageClient {
    pub fn new(backend: Arc<dyn StorageBackend>, transfer: ParallelTransferConfig) -> Self {
        Self { backend, transfer }
    }

    /// HTTP client from configuration
    pub fn from_config(mut config: ClientConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        let mut http = HttpBackendConfig::new(&config.base_url)?;
        if let Some(token) = config.api_token {
            http = http.with_token(token);
        }
        Ok(Self::new(Arc::new(HttpBackend::new(http)?), config.transfer))
    }

    pub fn transfer_config(&self) -> &ParallelTransferConfig {
        &self.transfer
    }

    /// Folders first, then files, each by name
    pub async fn list_directory(&self, path: &RemotePath) -> Result<Vec<DirectoryEntry>, ProviderError> {
        Ok(normalize_listing(self.backend.list_folder(path).await?))
    }

    /// Find `name` in the listing of `parent`.
    pub async fn lookup(&self, parent: &RemotePath, name: &str) -> Result<DirectoryEntry, ProviderError> {
        self.list_directory(parent)
            .await?
            .into_iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| ProviderError::NotFound(parent.to_body_path(Some(name))))
    }

    pub async fn create_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        tree_ops::create_folder(self.backend.as_ref(), parent, name).await
    }

    /// Upload a zero-byte file named `name`.
    pub async fn create_empty_file(&self, parent: &RemotePath, name: &str) -> Result<UploadReport, ProviderError> {
        let name = name.trim();
        validate_name(name)?;
        self.upload_file(&UploadFile::empty(name), parent, None, None).await
    }

    pub async fn upload_file(
        &self,
        file: &UploadFile,
        dest: &RemotePath,
        progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadReport, ProviderError> {
        ChunkUploader::new(self.backend.as_ref(), &self.transfer)
            .upload(file, dest, progress, cancel)
            .await
    }

    pub async fn upload_folder(
        &self,
        dest: &RemotePath,
        files: &[RelativeFile],
        progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<FolderUploadReport, ProviderError> {
        FolderUploader::new(self.backend.as_ref(), &self.transfer)
            .upload(dest, files, progress, cancel)
            .await
    }

    pub async fn rename(
        &self,
        entry_type: EntryType,
        parent: &RemotePath,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), ProviderError> {
        tree_ops::rename(self.backend.as_ref(), entry_type, parent, old_name, new_name).await
    }

    pub async fn move_entry(
        &self,
        entry_type: EntryType,
        from: &RemotePath,
        name: &str,
        to: &RemotePath,
    ) -> Result<(), ProviderError> {
        tree_ops::move_entry(self.backend.as_ref(), entry_type, from, name, to).await
    }

    pub async fn delete(&self, entry_type: EntryType, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        tree_ops::delete(self.backend.as_ref(), entry_type, parent, name).await
    }

    pub async fn open_entry(&self, parent: &RemotePath, name: &str) -> Result<PreviewEntry, ProviderError> {
        preview::open_entry(self.backend.as_ref(), parent, name).await
    }

    pub async fn text_content(&self, parent: &RemotePath, name: &str) -> Result<String, ProviderError> {
        preview::text_content(self.backend.as_ref(), parent, name).await
    }

    pub async fn save_text(
        &self,
        parent: &RemotePath,
        name: &str,
        content: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadReport, ProviderError> {
        preview::save_text(self.backend.as_ref(), &self.transfer, parent, name, content, cancel).await
    }

    /// Save the edited text of the entry on display, then show the freshly
    /// downloaded version in its place.
    pub async fn save_preview(&self, session: &mut PreviewSession) -> Result<UploadReport, ProviderError> {
        let (parent, name, text) = match session.current() {
            Some(entry) => match &entry.text {
                Some(text) => (entry.parent.clone(), entry.name.clone(), text.clone()),
                None => return Err(ProviderError::NotText(entry.parent.to_body_path(Some(&entry.name)))),
            },
            None => return Err(ProviderError::InvalidPath("no entry is open".to_string())),
        };
        let report = self.save_text(&parent, &name, &text, None).await?;
        let fresh = self.open_entry(&parent, &name).await?;
        session.show(fresh);
        Ok(report)
    }

    pub async fn download(&self, parent: &RemotePath, name: &str, local_path: &Path) -> Result<u64, ProviderError> {
        preview::download_to(self.backend.as_ref(), parent, name, local_path).await
    }

    pub async fn walk(&self, root: &RemotePath, max_depth: Option<usize>) -> Result<EntryArena, ProviderError> {
        EntryArena::build(self.backend.as_ref(), root, max_depth).await
    }
}
