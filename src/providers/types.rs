//! Shared types for storage backends
//!
//! This module contains the types exchanged between the client layer and a
//! backend implementation: the error type, raw listing records, chunk payloads
//! and downloaded file bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw directory-listing record as returned by the folder endpoint.
///
/// Only `name` is required. Anything not flagged `is_dir: false` is a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub name: String,
    #[serde(default)]
    pub is_dir: Option<bool>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime: Option<String>,
}

impl RawEntry {
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: Some(true),
            size: None,
            mime: None,
        }
    }

    pub fn file(name: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: Some(false),
            size: Some(size),
            mime: Some(mime.into()),
        }
    }
}

/// One chunk of a logical upload, sent as a single multipart request.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    /// Correlation token shared by every chunk of the same upload
    pub file_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// File name used for the `chunk_data` part
    pub file_name: String,
    /// MIME type of the whole file
    pub mime: String,
    pub data: Vec<u8>,
}

/// Raw bytes of a downloaded file plus the server-declared content type.
#[derive(Debug, Clone, Default)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

/// Storage client error types
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Cannot move '{from}' into itself or one of its subfolders ('{to}')")]
    MoveIntoSelf { from: String, to: String },

    #[error("Not a text file: {0}")]
    NotText(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    /// Map a non-2xx HTTP status to an error for the addressed path.
    pub fn from_status(status: u16, path: &str, body: &str) -> Self {
        match status {
            404 => ProviderError::NotFound(path.to_string()),
            409 => ProviderError::AlreadyExists(path.to_string()),
            _ => ProviderError::ServerError {
                status,
                message: sanitize_api_error(body),
            },
        }
    }

    /// Errors raised locally before any request was made
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidName(_)
                | ProviderError::InvalidPath(_)
                | ProviderError::MoveIntoSelf { .. }
                | ProviderError::NotText(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }

    /// HTTP status behind this error, if it came from a server response
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::NotFound(_) => Some(404),
            ProviderError::AlreadyExists(_) => Some(409),
            ProviderError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Trim a server error body down to something safe to show in one line.
pub fn sanitize_api_error(body: &str) -> String {
    let flat: String = body
        .trim()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() > MAX_ERROR_BODY_CHARS {
        let cut: String = flat.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", cut)
    } else if flat.is_empty() {
        "(empty response)".to_string()
    } else {
        flat
    }
}
