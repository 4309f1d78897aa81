//! Folio Storage: client for a folder/file storage REST API.
//!
//! Browse folders, upload files in adaptively parallel chunks, recreate local
//! directory trees remotely, rename/move/delete entries, and preview or edit
//! downloaded files. All network access goes through the `StorageBackend`
//! trait; `StorageClient` is the entry point most callers want.

pub mod client;
pub mod config;
pub mod entry;
pub mod folder_upload;
pub mod path;
pub mod preview;
pub mod providers;
pub mod transfer_pool;
pub mod tree;
pub mod tree_ops;
pub mod upload;

pub use client::StorageClient;
pub use config::ClientConfig;
pub use entry::{DirectoryEntry, FileKind};
pub use path::RemotePath;
pub use providers::{ProviderError, StorageBackend};
pub use transfer_pool::ParallelTransferConfig;
pub use tree_ops::EntryType;
