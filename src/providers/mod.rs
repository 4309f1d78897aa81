//! Storage Backend Module
//!
//! Every request the client makes goes through the `StorageBackend` trait, one
//! method per endpoint of the storage REST API. The client layer (uploads,
//! tree operations, previews) never builds HTTP requests itself.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   StorageClient / ChunkUploader / TreeOps   │
//! └─────────────────────────────────────────────┘
//!                      │
//!           ┌──────────▼──────────┐
//!           │ StorageBackend trait│
//!           └──────────┬──────────┘
//!              ┌───────┴────────┐
//!              ▼                ▼
//!        ┌───────────┐   ┌─────────────┐
//!        │HttpBackend│   │ MockBackend │ (tests)
//!        └───────────┘   └─────────────┘
//! ```

pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use http::{HttpBackend, HttpBackendConfig};
pub use types::*;

use async_trait::async_trait;

use crate::path::RemotePath;

/// Storage REST API, one call per endpoint.
///
/// Paths are passed as `(parent, name)`; implementations encode them in
/// URL-segment form. Move targets are body-literal paths. All methods take
/// `&self` so several chunk uploads of one file can be in flight together.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Raw listing of a folder
    async fn list_folder(&self, path: &RemotePath) -> Result<Vec<RawEntry>, ProviderError>;

    /// Create `name` inside `parent`. An existing folder is `AlreadyExists`.
    async fn create_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError>;

    /// Move or rename a folder to the body-literal `target`
    async fn move_folder(
        &self,
        parent: &RemotePath,
        name: &str,
        target: &str,
    ) -> Result<(), ProviderError>;

    async fn delete_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError>;

    /// Send one chunk of a file. The server assembles the file once the chunk
    /// at `total_chunks - 1` arrives.
    async fn upload_chunk(
        &self,
        parent: &RemotePath,
        chunk: ChunkPayload,
    ) -> Result<(), ProviderError>;

    /// Move or rename a file to the body-literal `target`
    async fn move_file(
        &self,
        parent: &RemotePath,
        name: &str,
        target: &str,
    ) -> Result<(), ProviderError>;

    async fn delete_file(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError>;

    /// Raw bytes of a file
    async fn download_file(
        &self,
        parent: &RemotePath,
        name: &str,
    ) -> Result<DownloadedFile, ProviderError>;
}
