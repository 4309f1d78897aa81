//! Chunked upload engine.
//!
//! A file is cut into fixed-size chunks that share one random `file_id`. All
//! chunks except the last are sent in rounds whose width is picked by
//! `ConcurrencyRamp`; each round is awaited in full before the next one is
//! sized. The last chunk goes out alone once every other chunk has been
//! acknowledged, because the server assembles the file when it sees the final
//! index.
//!
//! Cancellation is cooperative through a `CancellationToken`: it is checked
//! before every round, and every in-flight chunk request races against it.
//!
//! Memory: every chunk of a round is read into its own buffer and held until
//! acknowledged, so one upload holds at most `chunk_size * max_parallel` bytes
//! (`ParallelTransferConfig::peak_buffer_bytes`, 500 MiB with the defaults).
//! Lower `max_parallel` or `chunk_size` to bound it further.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::path::RemotePath;
use crate::providers::{ChunkPayload, ProviderError, StorageBackend};
use crate::transfer_pool::{total_chunks, ConcurrencyRamp, ParallelTransferConfig};
use crate::tree_ops::validate_name;

/// Progress callback: `(chunk_bytes, bytes_uploaded, total_bytes)`.
///
/// Called once per acknowledged chunk, never concurrently.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64, u64) + Send + Sync);

/// Where the bytes of an upload come from
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Arc<[u8]>),
    /// Read lazily, chunk by chunk
    Path(PathBuf),
}

/// A file to upload: name, size and content
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub source: FileSource,
}

impl UploadFile {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let bytes: Vec<u8> = bytes.into();
        let mime = guess_mime(&name);
        Self {
            size: bytes.len() as u64,
            source: FileSource::Memory(Arc::from(bytes)),
            name,
            mime,
        }
    }

    /// Zero-byte file with no content type
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mime: String::new(),
            source: FileSource::Memory(Arc::from(Vec::new())),
        }
    }

    /// Text content, uploaded as `text/plain`
    pub fn text(name: impl Into<String>, content: &str) -> Self {
        let mut file = Self::from_bytes(name, content.as_bytes().to_vec());
        file.mime = "text/plain".to_string();
        file
    }

    /// Local file; the size is read from its metadata.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(ProviderError::InvalidPath(format!("{} is not a file", path.display())));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidName(path.display().to_string()))?;
        Ok(Self {
            mime: guess_mime(&name),
            name,
            size: metadata.len(),
            source: FileSource::Path(path),
        })
    }

    /// Read `len` bytes starting at `offset`.
    pub async fn read_chunk(&self, offset: u64, len: u64) -> Result<Vec<u8>, ProviderError> {
        match &self.source {
            FileSource::Memory(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = (offset.saturating_add(len) as usize).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut buf = Vec::with_capacity(len as usize);
                file.take(len).read_to_end(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().to_string()
}

/// State of one file transfer. Dropped when the upload finishes, fails or is
/// cancelled; an interrupted upload restarts with a fresh `file_id`.
#[derive(Debug)]
pub struct UploadSession {
    pub file_id: String,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub total_bytes: u64,
    bytes_uploaded: u64,
}

impl UploadSession {
    pub fn new(total_bytes: u64, chunk_size: u64) -> Result<Self, ProviderError> {
        Ok(Self {
            file_id: uuid::Uuid::new_v4().simple().to_string(),
            chunk_size,
            total_chunks: total_chunks(total_bytes, chunk_size)?,
            total_bytes,
            bytes_uploaded: 0,
        })
    }

    /// Byte range `(offset, len)` of a chunk
    pub fn chunk_range(&self, index: u32) -> (u64, u64) {
        let offset = index as u64 * self.chunk_size;
        let len = self.chunk_size.min(self.total_bytes.saturating_sub(offset));
        (offset, len)
    }

    fn chunk(&self, index: u32) -> ChunkSpec {
        let (offset, len) = self.chunk_range(index);
        ChunkSpec {
            index,
            total: self.total_chunks,
            offset,
            len,
        }
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    fn record(&mut self, chunk_bytes: u64) -> u64 {
        self.bytes_uploaded += chunk_bytes;
        self.bytes_uploaded
    }
}

/// Summary of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub file_id: String,
    pub total_chunks: u32,
    pub bytes_uploaded: u64,
    /// Width of each concurrent round; the final chunk is not included
    pub rounds: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ChunkSpec {
    index: u32,
    total: u32,
    offset: u64,
    len: u64,
}

struct SentChunk {
    len: u64,
    elapsed: Duration,
}

pub struct ChunkUploader<'a> {
    backend: &'a dyn StorageBackend,
    config: &'a ParallelTransferConfig,
}

impl<'a> ChunkUploader<'a> {
    pub fn new(backend: &'a dyn StorageBackend, config: &'a ParallelTransferConfig) -> Self {
        Self { backend, config }
    }

    /// Upload `file` into the folder `dest`.
    ///
    /// Returns `Cancelled` if `cancel` fires, even when the request that was
    /// interrupted reported a different error.
    pub async fn upload(
        &self,
        file: &UploadFile,
        dest: &RemotePath,
        progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadReport, ProviderError> {
        validate_name(&file.name)?;
        let cancel = cancel.cloned().unwrap_or_else(CancellationToken::new);

        match self.run(file, dest, progress, &cancel).await {
            Err(_) if cancel.is_cancelled() => {
                debug!("upload of {} cancelled", dest.to_body_path(Some(&file.name)));
                Err(ProviderError::Cancelled)
            }
            other => other,
        }
    }

    async fn run(
        &self,
        file: &UploadFile,
        dest: &RemotePath,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, ProviderError> {
        let mut session = UploadSession::new(file.size, self.config.chunk_size.max(1))?;
        let file_id = session.file_id.clone();
        let last = session.total_chunks - 1;
        let mut rounds = Vec::new();

        debug!(
            "upload {} -> {}: {} bytes, {} chunks, file_id={}",
            file.name, dest, file.size, session.total_chunks, session.file_id
        );

        if last > 0 {
            let mut ramp = ConcurrencyRamp::new(self.config);
            let mut next = 0u32;

            while next < last {
                if cancel.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                let width = ramp.next_round((last - next) as usize) as u32;
                let batch = next..next + width;
                debug!("round {}: chunks {:?} (avg {:.0} ms)", rounds.len(), batch, ramp.avg_dt_ms());

                let mut in_flight: FuturesUnordered<_> = batch
                    .map(|index| self.send_chunk(file, dest, &file_id, session.chunk(index), cancel))
                    .collect();
                let mut elapsed = Vec::with_capacity(width as usize);
                while let Some(sent) = in_flight.next().await {
                    let sent = sent?;
                    let uploaded = session.record(sent.len);
                    if let Some(cb) = progress {
                        cb(sent.len, uploaded, session.total_bytes);
                    }
                    elapsed.push(sent.elapsed);
                }

                ramp.record_round(&elapsed);
                rounds.push(width as usize);
                next += width;
            }
        }

        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let sent = self
            .send_chunk(file, dest, &file_id, session.chunk(last), cancel)
            .await?;
        let uploaded = session.record(sent.len);
        if let Some(cb) = progress {
            cb(sent.len, uploaded, session.total_bytes);
        }

        info!(
            "Uploaded {} ({} bytes, {} chunks)",
            dest.to_body_path(Some(&file.name)),
            uploaded,
            session.total_chunks
        );

        Ok(UploadReport {
            file_id: session.file_id,
            total_chunks: session.total_chunks,
            bytes_uploaded: uploaded,
            rounds,
        })
    }

    async fn send_chunk(
        &self,
        file: &UploadFile,
        dest: &RemotePath,
        file_id: &str,
        spec: ChunkSpec,
        cancel: &CancellationToken,
    ) -> Result<SentChunk, ProviderError> {
        let data = file.read_chunk(spec.offset, spec.len).await?;
        let len = data.len() as u64;
        let payload = ChunkPayload {
            file_id: file_id.to_string(),
            chunk_index: spec.index,
            total_chunks: spec.total,
            file_name: file.name.clone(),
            mime: if file.mime.is_empty() {
                crate::entry::DEFAULT_MIME.to_string()
            } else {
                file.mime.clone()
            },
            data,
        };

        let started = Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = self.backend.upload_chunk(dest, payload) => {
                result?;
                Ok(SentChunk { len, elapsed: started.elapsed() })
            }
        }
    }
}
