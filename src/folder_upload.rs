//! Folder upload: recreate a local directory selection under a remote folder.
//!
//! Every ancestor directory of every file is created first, shallowest first,
//! then the files are uploaded one after another into their directories.

use std::collections::BTreeSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::path::RemotePath;
use crate::providers::{ProviderError, StorageBackend};
use crate::transfer_pool::ParallelTransferConfig;
use crate::tree_ops::validate_name;
use crate::upload::{ChunkUploader, ProgressFn, UploadFile};

/// A file together with its path relative to the selection root
/// (`dir/sub/file.txt`, `/`-separated).
#[derive(Debug, Clone)]
pub struct RelativeFile {
    pub relative_path: String,
    pub file: UploadFile,
}

impl RelativeFile {
    /// Directory segments of the relative path (file name dropped)
    pub fn dir_segments(&self) -> Vec<String> {
        let mut parts: Vec<String> = self
            .relative_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        parts.pop();
        parts
    }
}

/// Collect a local directory as relative files. Paths start with the
/// directory's own name, the way a browser directory picker reports them.
pub async fn collect_local_dir(root: &Path) -> Result<Vec<RelativeFile>, ProviderError> {
    let base = root.parent().unwrap_or(root).to_path_buf();
    let root = root.to_path_buf();
    let paths = tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| ProviderError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| ProviderError::InvalidPath(e.to_string()))?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((entry.path().to_path_buf(), rel));
        }
        Ok::<_, ProviderError>(out)
    })
    .await
    .map_err(|e| ProviderError::IoError(std::io::Error::other(e)))??;

    let mut files = Vec::with_capacity(paths.len());
    for (path, relative_path) in paths {
        files.push(RelativeFile {
            relative_path,
            file: UploadFile::from_path(path).await?,
        });
    }
    Ok(files)
}

/// Every distinct directory prefix of every file, shallowest first. Siblings
/// keep lexicographic order.
pub fn plan_directories(files: &[RelativeFile]) -> Result<Vec<Vec<String>>, ProviderError> {
    let mut dirs: BTreeSet<Vec<String>> = BTreeSet::new();
    for f in files {
        let segments = f.dir_segments();
        for segment in &segments {
            validate_name(segment).map_err(|_| {
                ProviderError::InvalidPath(format!("'{}' in {}", segment, f.relative_path))
            })?;
        }
        for depth in 1..=segments.len() {
            dirs.insert(segments[..depth].to_vec());
        }
    }
    let mut dirs: Vec<Vec<String>> = dirs.into_iter().collect();
    dirs.sort_by_key(Vec::len);
    Ok(dirs)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUploadReport {
    pub folders_created: usize,
    pub folders_existing: usize,
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
}

pub struct FolderUploader<'a> {
    backend: &'a dyn StorageBackend,
    config: &'a ParallelTransferConfig,
}

impl<'a> FolderUploader<'a> {
    pub fn new(backend: &'a dyn StorageBackend, config: &'a ParallelTransferConfig) -> Self {
        Self { backend, config }
    }

    /// Create the directory tree under `dest`, then upload every file.
    ///
    /// An existing directory (409) is fine; any other error aborts the batch
    /// before a single file is sent.
    pub async fn upload(
        &self,
        dest: &RemotePath,
        files: &[RelativeFile],
        progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<FolderUploadReport, ProviderError> {
        let mut report = FolderUploadReport::default();
        if files.is_empty() {
            return Ok(report);
        }

        for dir in plan_directories(files)? {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ProviderError::Cancelled);
            }
            let (name, parent) = match dir.split_last() {
                Some((name, parent)) => (name, dest.join_all(parent)),
                None => continue,
            };
            match self.backend.create_folder(&parent, name).await {
                Ok(()) => report.folders_created += 1,
                Err(ProviderError::AlreadyExists(path)) => {
                    debug!("folder {} already exists", path);
                    report.folders_existing += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let uploader = ChunkUploader::new(self.backend, self.config);
        for f in files {
            let target = dest.join_all(f.dir_segments());
            let sent = uploader.upload(&f.file, &target, progress, cancel).await?;
            report.files_uploaded += 1;
            report.bytes_uploaded += sent.bytes_uploaded;
        }

        info!(
            "Folder upload into {}: {} files, {} folders created, {} existing",
            dest, report.files_uploaded, report.folders_created, report.folders_existing
        );
        Ok(report)
    }
}
