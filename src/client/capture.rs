// Microphone abstraction and utterance recording

use super::ClientError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// An open capture stream. Segments arrive in recording order.
#[async_trait]
pub trait AudioStream: Send {
    /// Next recorded segment, `None` once the source is exhausted.
    async fn next_segment(&mut self) -> Option<Result<Vec<u8>, ClientError>>;

    /// Releases the device. Called exactly once on every exit path.
    fn close(&mut self);
}

/// A capture device that can be opened by one recording at a time.
pub trait Microphone: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioStream>, ClientError>;
}

/// Records until `stop` fires, `limit` elapses, or the stream runs out, and
/// returns the concatenated segments. The stream is closed on every path.
pub async fn record_utterance(
    microphone: &dyn Microphone,
    stop: &CancellationToken,
    limit: Duration,
) -> Result<Vec<u8>, ClientError> {
    let mut stream = microphone.open()?;
    let result = collect_segments(stream.as_mut(), stop, limit).await;
    stream.close();

    if let Ok(audio) = &result {
        tracing::debug!(audio_bytes = audio.len(), "utterance recorded");
    }
    result
}

async fn collect_segments(
    stream: &mut dyn AudioStream,
    stop: &CancellationToken,
    limit: Duration,
) -> Result<Vec<u8>, ClientError> {
    let cap = tokio::time::sleep(limit);
    tokio::pin!(cap);

    let mut audio = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = &mut cap => {
                tracing::info!(limit_secs = limit.as_secs(), "recording limit reached");
                break;
            }
            segment = stream.next_segment() => match segment {
                Some(Ok(bytes)) => audio.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(e),
                None => break,
            },
        }
    }
    Ok(audio)
}

/// Replays a prerecorded file in fixed-size segments at a fixed interval,
/// the way a live recorder hands over data every timeslice.
pub struct FileMicrophone {
    path: PathBuf,
    segment_bytes: usize,
    interval: Duration,
    in_use: Arc<AtomicBool>,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>, segment_bytes: usize, interval: Duration) -> Self {
        Self {
            path: path.into(),
            segment_bytes: segment_bytes.max(1),
            interval,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }
}

impl Microphone for FileMicrophone {
    fn open(&self) -> Result<Box<dyn AudioStream>, ClientError> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Busy);
        }

        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                self.in_use.store(false, Ordering::SeqCst);
                return Err(ClientError::Capture(format!("{}: {}", self.path.display(), e)));
            }
        };

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "capture source opened");
        Ok(Box::new(FileStream {
            data,
            position: 0,
            segment_bytes: self.segment_bytes,
            interval: self.interval,
            in_use: self.in_use.clone(),
        }))
    }
}

struct FileStream {
    data: Vec<u8>,
    position: usize,
    segment_bytes: usize,
    interval: Duration,
    in_use: Arc<AtomicBool>,
}

#[async_trait]
impl AudioStream for FileStream {
    async fn next_segment(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        if self.position >= self.data.len() {
            return None;
        }
        tokio::time::sleep(self.interval).await;

        let end = (self.position + self.segment_bytes).min(self.data.len());
        let segment = self.data[self.position..end].to_vec();
        self.position = end;
        Some(Ok(segment))
    }

    fn close(&mut self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}
