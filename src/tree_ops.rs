//! Tree operations: create, rename, move and delete for files and folders.
//!
//! Rename and move are the same PATCH request with a different body-literal
//! target. Moving a folder into itself or one of its descendants is rejected
//! locally, before anything is sent.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::path::RemotePath;
use crate::providers::{ProviderError, StorageBackend};

/// File or folder, for operations that hit different endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::File => write!(f, "file"),
            EntryType::Folder => write!(f, "folder"),
        }
    }
}

/// Reject names the server must never see: empty, `.`/`..`, path separators
/// or control characters.
pub fn validate_name(name: &str) -> Result<(), ProviderError> {
    if name.trim().is_empty() {
        return Err(ProviderError::InvalidName("name must not be empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(ProviderError::InvalidName(format!("'{}' is reserved", name)));
    }
    if name.contains(['/', '\\']) {
        return Err(ProviderError::InvalidName(format!(
            "'{}' must not contain / or \\",
            name
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ProviderError::InvalidName(format!(
            "'{}' contains control characters",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// True when `a` equals `b` or lies below it.
///
/// `is_sub_path(/x/y, /x)` is true, `is_sub_path(/x, /x/y)` is false.
pub fn is_sub_path(a: &RemotePath, b: &RemotePath) -> bool {
    a.starts_with(b)
}

/// Create folder `name` in `parent`. An existing folder surfaces as
/// `AlreadyExists`.
pub async fn create_folder(
    backend: &dyn StorageBackend,
    parent: &RemotePath,
    name: &str,
) -> Result<(), ProviderError> {
    let name = name.trim();
    validate_name(name)?;
    backend.create_folder(parent, name).await?;
    info!("Created folder {}", parent.to_body_path(Some(name)));
    Ok(())
}

/// Rename `old_name` in `parent` to `new_name`. Renaming to the same name
/// sends nothing.
pub async fn rename(
    backend: &dyn StorageBackend,
    entry_type: EntryType,
    parent: &RemotePath,
    old_name: &str,
    new_name: &str,
) -> Result<(), ProviderError> {
    validate_name(old_name)?;
    validate_name(new_name)?;
    if old_name == new_name {
        return Ok(());
    }
    let target = parent.to_body_path(Some(new_name));
    patch(backend, entry_type, parent, old_name, &target).await?;
    info!("Renamed {} {} -> {}", entry_type, parent.to_body_path(Some(old_name)), target);
    Ok(())
}

/// Move `name` from `from` into the folder `to`.
pub async fn move_entry(
    backend: &dyn StorageBackend,
    entry_type: EntryType,
    from: &RemotePath,
    name: &str,
    to: &RemotePath,
) -> Result<(), ProviderError> {
    validate_name(name)?;
    if entry_type == EntryType::Folder {
        let source = from.join(name);
        if is_sub_path(to, &source) {
            return Err(ProviderError::MoveIntoSelf {
                from: source.to_body_path(None),
                to: to.to_body_path(None),
            });
        }
    }
    let target = to.to_body_path(Some(name));
    patch(backend, entry_type, from, name, &target).await?;
    info!("Moved {} {} -> {}", entry_type, from.to_body_path(Some(name)), target);
    Ok(())
}

pub async fn delete(
    backend: &dyn StorageBackend,
    entry_type: EntryType,
    parent: &RemotePath,
    name: &str,
) -> Result<(), ProviderError> {
    validate_name(name)?;
    match entry_type {
        EntryType::File => backend.delete_file(parent, name).await?,
        EntryType::Folder => backend.delete_folder(parent, name).await?,
    }
    info!("Deleted {} {}", entry_type, parent.to_body_path(Some(name)));
    Ok(())
}

async fn patch(
    backend: &dyn StorageBackend,
    entry_type: EntryType,
    parent: &RemotePath,
    name: &str,
    target: &str,
) -> Result<(), ProviderError> {
    match entry_type {
        EntryType::File => backend.move_file(parent, name, target).await,
        EntryType::Folder => backend.move_folder(parent, name, target).await,
    }
}
