//! In-memory backend for tests.
//!
//! Records every call with a global sequence number, stores folders and
//! assembled files, and can delay or fail individual chunk requests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use super::{ChunkPayload, DownloadedFile, ProviderError, RawEntry, StorageBackend};
use crate::path::RemotePath;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    CreateFolder(String),
    MoveFolder { from: String, to: String },
    DeleteFolder(String),
    ChunkStart { path: String, index: u32, seq: u64 },
    ChunkEnd { path: String, index: u32, seq: u64 },
    MoveFile { from: String, to: String },
    DeleteFile(String),
    Download(String),
}

#[derive(Default)]
struct State {
    seq: u64,
    calls: Vec<Call>,
    folders: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, String)>,
    pending: HashMap<String, BTreeMap<u32, Vec<u8>>>,
    /// Extra records appended verbatim to a folder's listing
    raw_listings: HashMap<String, Vec<RawEntry>>,
}

type DelayFn = Box<dyn Fn(u32) -> Duration + Send + Sync>;

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
    chunk_delay: Option<DelayFn>,
    fail_chunk: Option<u32>,
    fail_create: Option<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_delay(mut self, f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.chunk_delay = Some(Box::new(f));
        self
    }

    pub fn with_failing_chunk(mut self, index: u32) -> Self {
        self.fail_chunk = Some(index);
        self
    }

    /// Make creating this folder fail with a 500
    pub fn with_failing_create(mut self, path: &str) -> Self {
        self.fail_create = Some(path.to_string());
        self
    }

    pub fn with_folder(self, path: &str) -> Self {
        self.state.lock().unwrap().folders.insert(path.to_string());
        self
    }

    pub fn with_file(self, path: &str, bytes: &[u8], mime: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), (bytes.to_vec(), mime.to_string()));
        self
    }

    /// Append records to the listing of `path` as-is, without validation
    pub fn with_raw_entries(self, path: &str, entries: Vec<RawEntry>) -> Self {
        self.state
            .lock()
            .unwrap()
            .raw_listings
            .entry(path.to_string())
            .or_default()
            .extend(entries);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).map(|(b, _)| b.clone())
    }

    pub fn created_folders(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateFolder(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_starts(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ChunkStart { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_seq(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        state.seq
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn list_folder(&self, path: &RemotePath) -> Result<Vec<RawEntry>, ProviderError> {
        let key = path.to_body_path(None);
        self.record(Call::List(key.clone()));
        let state = self.state.lock().unwrap();
        if !path.is_root() && !state.folders.contains(&key) {
            return Err(ProviderError::NotFound(key));
        }
        let mut out = Vec::new();
        for folder in &state.folders {
            let p = RemotePath::parse_body_path(folder);
            if p.parent().as_ref() == Some(path) {
                out.push(RawEntry::folder(p.name().unwrap_or_default()));
            }
        }
        for (file, (bytes, mime)) in &state.files {
            let p = RemotePath::parse_body_path(file);
            if p.parent().as_ref() == Some(path) {
                out.push(RawEntry::file(p.name().unwrap_or_default(), bytes.len() as u64, mime.clone()));
            }
        }
        if let Some(extra) = state.raw_listings.get(&key) {
            out.extend(extra.iter().cloned());
        }
        Ok(out)
    }

    async fn create_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        let key = parent.to_body_path(Some(name));
        self.record(Call::CreateFolder(key.clone()));
        if self.fail_create.as_deref() == Some(key.as_str()) {
            return Err(ProviderError::ServerError { status: 500, message: "boom".into() });
        }
        let mut state = self.state.lock().unwrap();
        let parent_key = parent.to_body_path(None);
        if !parent.is_root() && !state.folders.contains(&parent_key) {
            return Err(ProviderError::NotFound(parent_key));
        }
        if !state.folders.insert(key.clone()) {
            return Err(ProviderError::AlreadyExists(key));
        }
        Ok(())
    }

    async fn move_folder(&self, parent: &RemotePath, name: &str, target: &str) -> Result<(), ProviderError> {
        let from = parent.to_body_path(Some(name));
        self.record(Call::MoveFolder { from: from.clone(), to: target.to_string() });
        let mut state = self.state.lock().unwrap();
        if !state.folders.remove(&from) {
            return Err(ProviderError::NotFound(from));
        }
        state.folders.insert(target.to_string());
        Ok(())
    }

    async fn delete_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        let key = parent.to_body_path(Some(name));
        self.record(Call::DeleteFolder(key.clone()));
        if !self.state.lock().unwrap().folders.remove(&key) {
            return Err(ProviderError::NotFound(key));
        }
        Ok(())
    }

    async fn upload_chunk(&self, parent: &RemotePath, chunk: ChunkPayload) -> Result<(), ProviderError> {
        let path = parent.to_body_path(Some(&chunk.file_name));
        let seq = self.next_seq();
        self.record(Call::ChunkStart { path: path.clone(), index: chunk.chunk_index, seq });

        if let Some(delay) = &self.chunk_delay {
            tokio::time::sleep(delay(chunk.chunk_index)).await;
        }
        if self.fail_chunk == Some(chunk.chunk_index) {
            return Err(ProviderError::ServerError { status: 500, message: "chunk rejected".into() });
        }

        let seq = self.next_seq();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ChunkEnd { path: path.clone(), index: chunk.chunk_index, seq });
        let parts = state.pending.entry(chunk.file_id.clone()).or_default();
        parts.insert(chunk.chunk_index, chunk.data);

        if chunk.chunk_index + 1 == chunk.total_chunks {
            let parts = state.pending.remove(&chunk.file_id).unwrap_or_default();
            if parts.len() as u32 != chunk.total_chunks {
                return Err(ProviderError::ServerError { status: 400, message: "incomplete upload".into() });
            }
            let bytes: Vec<u8> = parts.into_values().flatten().collect();
            state.files.insert(path, (bytes, chunk.mime));
        }
        Ok(())
    }

    async fn move_file(&self, parent: &RemotePath, name: &str, target: &str) -> Result<(), ProviderError> {
        let from = parent.to_body_path(Some(name));
        self.record(Call::MoveFile { from: from.clone(), to: target.to_string() });
        let mut state = self.state.lock().unwrap();
        let Some(file) = state.files.remove(&from) else {
            return Err(ProviderError::NotFound(from));
        };
        state.files.insert(target.to_string(), file);
        Ok(())
    }

    async fn delete_file(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        let key = parent.to_body_path(Some(name));
        self.record(Call::DeleteFile(key.clone()));
        if self.state.lock().unwrap().files.remove(&key).is_none() {
            return Err(ProviderError::NotFound(key));
        }
        Ok(())
    }

    async fn download_file(&self, parent: &RemotePath, name: &str) -> Result<DownloadedFile, ProviderError> {
        let key = parent.to_body_path(Some(name));
        self.record(Call::Download(key.clone()));
        let state = self.state.lock().unwrap();
        let (bytes, mime) = state.files.get(&key).ok_or(ProviderError::NotFound(key))?;
        Ok(DownloadedFile {
            bytes: bytes.clone(),
            mime: Some(mime.clone()).filter(|m| !m.is_empty()),
        })
    }
}
