//! Resumable, chunked video uploads.
//!
//! An [`UploadJob`] moves through `Pending → InProgress → {Completed | Failed}`. The
//! [`ResumableUploader`] drives it: it opens an upload session, streams the source file
//! window by window, and after a transient failure asks the server how much it actually
//! received before continuing from there. The whole file is never held in memory.

use crate::config::UploadConfig;
use crate::error::{CallError, UploadError};
use crate::retry::retry_transient;
use crate::youtube_api::types::PrivacyStatus;
use crate::youtube_api::videos::{Video, VideoInsert, VideoSnippet, VideoStatus};
use std::fmt;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

/// Uploads land in "People & Blogs" unless another category is given.
pub const DEFAULT_CATEGORY_ID: &str = "22";

/// User-supplied description of the video being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category_id: DEFAULT_CATEGORY_ID.to_string(),
            privacy_status: PrivacyStatus::Private,
        }
    }

    pub fn to_insert(&self) -> VideoInsert {
        VideoInsert {
            snippet: VideoSnippet {
                title: self.title.clone(),
                description: self.description.clone(),
                category_id: self.category_id.clone(),
            },
            status: VideoStatus {
                privacy_status: self.privacy_status,
            },
        }
    }
}

/// The ID YouTube assigned to an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn can_become(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A snapshot of how far an upload has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes the server has acknowledged.
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub state: UploadState,
}

impl Progress {
    /// Fraction in `0.0..=1.0`; exactly `1.0` only once the upload has completed.
    pub fn fraction(&self) -> f64 {
        if self.state == UploadState::Completed {
            return 1.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 / self.total_bytes as f64).min(1.0 - f64::EPSILON)
    }
}

/// Receives progress events, in order, for one upload.
pub trait ProgressSink {
    fn progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressSink for F {
    fn progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// A server-side resumable upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Where chunks and status queries are sent.
    pub uri: String,
}

/// The bytes `offset..offset + len` of a source of `total` bytes.
#[derive(Debug)]
pub struct Chunk {
    pub offset: u64,
    pub len: u64,
    pub total: u64,
    pub body: ChunkBody,
}

/// A streaming reader over a chunk's bytes.
pub struct ChunkBody(Pin<Box<dyn AsyncRead + Send + Sync>>);

impl ChunkBody {
    pub fn new(reader: impl AsyncRead + Send + Sync + 'static) -> Self {
        Self(Box::pin(reader))
    }

    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send + Sync>> {
        self.0
    }

    /// Reads the whole chunk into memory.
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        let mut reader = self.0;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl fmt::Debug for ChunkBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkBody")
    }
}

/// What the server said after a chunk or a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResponse {
    /// More bytes are expected; the server holds `acknowledged` bytes from the start.
    Incomplete { acknowledged: u64 },
    /// The upload finished and the video resource was created.
    Complete(Video),
}

/// The wire protocol behind a resumable upload.
pub trait ResumableTransport {
    /// Opens an upload session for a video described by `metadata`.
    fn begin(
        &self,
        metadata: &VideoInsert,
        total_bytes: u64,
        mime_type: &str,
    ) -> impl Future<Output = Result<UploadSession, CallError>> + Send;

    /// Sends one chunk of the source.
    fn send_chunk(
        &self,
        session: &UploadSession,
        chunk: Chunk,
    ) -> impl Future<Output = Result<ChunkResponse, CallError>> + Send;

    /// Asks how many bytes the server has received so far.
    fn query_status(
        &self,
        session: &UploadSession,
        total_bytes: u64,
    ) -> impl Future<Output = Result<ChunkResponse, CallError>> + Send;
}

/// One upload of one local file.
#[derive(Debug)]
pub struct UploadJob {
    source: PathBuf,
    metadata: VideoMetadata,
    total_bytes: u64,
    bytes_sent: u64,
    state: UploadState,
}

impl UploadJob {
    /// Creates a pending job for the file at `source`.
    pub async fn new(
        source: impl Into<PathBuf>,
        metadata: VideoMetadata,
    ) -> Result<Self, UploadError> {
        let source = source.into();
        let total_bytes = tokio::fs::metadata(&source)
            .await
            .map_err(|e| UploadError::Source {
                path: source.clone(),
                source: e,
            })?
            .len();
        Ok(Self {
            source,
            metadata,
            total_bytes,
            bytes_sent: 0,
            state: UploadState::Pending,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn progress(&self) -> Progress {
        Progress {
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
            state: self.state,
        }
    }

    fn transition(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_become(next),
            "illegal upload transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, bytes_sent = self.bytes_sent, "upload state change");
        self.state = next;
    }

    /// Records that the server holds the first `offset` bytes.
    fn acknowledge(&mut self, offset: u64) -> Result<(), String> {
        if offset < self.bytes_sent {
            return Err(format!(
                "server acknowledged {offset} bytes after already acknowledging {}",
                self.bytes_sent
            ));
        }
        if offset >= self.total_bytes {
            return Err(format!(
                "server holds {offset} of {} bytes but did not finish the upload",
                self.total_bytes
            ));
        }
        self.bytes_sent = offset;
        Ok(())
    }

    fn fail(&mut self, error: UploadError) -> UploadError {
        tracing::warn!(error = %error, "upload failed");
        self.transition(UploadState::Failed);
        error
    }

    async fn open_chunk(&self, len: u64) -> std::io::Result<Chunk> {
        let mut file = tokio::fs::File::open(&self.source).await?;
        file.seek(SeekFrom::Start(self.bytes_sent)).await?;
        Ok(Chunk {
            offset: self.bytes_sent,
            len,
            total: self.total_bytes,
            body: ChunkBody::new(file.take(len)),
        })
    }
}

/// Drives [`UploadJob`]s over a [`ResumableTransport`].
#[derive(Debug, Clone)]
pub struct ResumableUploader<T> {
    transport: T,
    config: UploadConfig,
}

impl<T: ResumableTransport> ResumableUploader<T> {
    pub fn new(transport: T, config: UploadConfig) -> Self {
        Self { transport, config }
    }

    /// Uploads the file at `source`, reporting progress to `sink`.
    pub async fn upload(
        &self,
        source: &Path,
        metadata: VideoMetadata,
        sink: impl ProgressSink,
    ) -> Result<VideoId, UploadError> {
        let mut job = UploadJob::new(source, metadata).await?;
        self.run(&mut job, sink).await
    }

    /// Runs a pending job until it completes or fails.
    #[tracing::instrument(skip_all, fields(source = %job.source.display(), total_bytes = job.total_bytes))]
    pub async fn run(
        &self,
        job: &mut UploadJob,
        mut sink: impl ProgressSink,
    ) -> Result<VideoId, UploadError> {
        if job.state != UploadState::Pending {
            return Err(UploadError::Protocol {
                bytes_sent: job.bytes_sent,
                reason: format!("job is already {}", job.state),
            });
        }
        if job.total_bytes == 0 {
            let path = job.source.clone();
            return Err(job.fail(UploadError::EmptySource { path }));
        }

        let policy = &self.config.retry;
        let session = {
            let transport = &self.transport;
            let insert = &job.metadata.to_insert();
            let mime_type = self.config.mime_type.as_str();
            let total = job.total_bytes;
            retry_transient(policy, move |_| transport.begin(insert, total, mime_type)).await
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                let error = terminal_error(e, job.bytes_sent, policy.max_retries + 1);
                return Err(job.fail(error));
            }
        };
        tracing::debug!("opened resumable upload session");

        let mut consecutive_failures = 0;
        let mut resync = false;
        loop {
            let queried = resync;
            let response = if resync {
                self.transport.query_status(&session, job.total_bytes).await
            } else {
                let len = self
                    .config
                    .chunk_size
                    .window(job.total_bytes - job.bytes_sent);
                let chunk = match job.open_chunk(len).await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let path = job.source.clone();
                        return Err(job.fail(UploadError::Source { path, source: e }));
                    }
                };
                if job.state == UploadState::Pending {
                    job.transition(UploadState::InProgress);
                    sink.progress(job.progress());
                }
                tracing::trace!(offset = chunk.offset, len, "sending chunk");
                self.transport.send_chunk(&session, chunk).await
            };

            match response {
                Ok(ChunkResponse::Complete(video)) => {
                    job.bytes_sent = job.total_bytes;
                    job.transition(UploadState::Completed);
                    sink.progress(job.progress());
                    tracing::info!(video_id = %video.id, "upload complete");
                    return Ok(VideoId(video.id));
                }
                Ok(ChunkResponse::Incomplete { acknowledged }) => {
                    let advanced = acknowledged > job.bytes_sent;
                    if let Err(reason) = job.acknowledge(acknowledged) {
                        let bytes_sent = job.bytes_sent;
                        return Err(job.fail(UploadError::Protocol { bytes_sent, reason }));
                    }
                    resync = false;
                    sink.progress(job.progress());
                    if advanced {
                        consecutive_failures = 0;
                        continue;
                    }
                    // a status query that shows no new bytes does not refill the budget
                    if queried {
                        continue;
                    }
                    // the server took the chunk but kept none of it
                    if consecutive_failures >= policy.max_retries {
                        let bytes_sent = job.bytes_sent;
                        let reason = format!(
                            "server acknowledged none of {} consecutive chunks",
                            consecutive_failures + 1
                        );
                        return Err(job.fail(UploadError::Protocol { bytes_sent, reason }));
                    }
                    let delay = policy.delay_for_attempt(consecutive_failures);
                    consecutive_failures += 1;
                    tracing::warn!(
                        attempt = consecutive_failures,
                        max = policy.max_retries,
                        bytes_sent = job.bytes_sent,
                        delay_ms = delay.as_millis() as u64,
                        "chunk was not kept, resending after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() && consecutive_failures < policy.max_retries => {
                    let delay = policy.delay_for_attempt(consecutive_failures);
                    consecutive_failures += 1;
                    tracing::warn!(
                        attempt = consecutive_failures,
                        max = policy.max_retries,
                        bytes_sent = job.bytes_sent,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upload interrupted, resuming after delay"
                    );
                    tokio::time::sleep(delay).await;
                    resync = true;
                }
                Err(e) => {
                    let error = terminal_error(e, job.bytes_sent, consecutive_failures + 1);
                    return Err(job.fail(error));
                }
            }
        }
    }
}

fn terminal_error(error: CallError, bytes_sent: u64, attempts: u32) -> UploadError {
    match error {
        CallError::Transport(source) => UploadError::RetriesExhausted {
            attempts,
            bytes_sent,
            source,
        },
        CallError::Api(source) => UploadError::Rejected { bytes_sent, source },
        e @ CallError::Decode { .. } => UploadError::Protocol {
            bytes_sent,
            reason: match std::error::Error::source(&e) {
                Some(inner) => format!("{e}: {inner}"),
                None => e.to_string(),
            },
        },
        CallError::Protocol(reason) => UploadError::Protocol { bytes_sent, reason },
    }
}
