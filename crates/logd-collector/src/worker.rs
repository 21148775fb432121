//! Stream worker
//!
//! A [`StreamWorker`] tails one source (a FIFO or a regular file) and appends
//! each newline-delimited line to its log. Lines longer than the maximum
//! message size keep their first `max_message_size` bytes; the remainder of
//! the line is read and discarded.
//!
//! Regular files are read to end-of-stream. FIFOs are opened through the
//! runtime's pipe receiver; on Linux they are opened read-write, so a FIFO
//! never reads as end-of-stream and the worker runs until cancelled.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use logd_storage::LogStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{CollectorError, CollectorResult};

type Source = Box<dyn AsyncRead + Send + Unpin>;

/// One line read from a source
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Line {
    pub bytes: Vec<u8>,
    /// Bytes past the maximum message size were discarded
    pub truncated: bool,
}

/// Reads lines from a source into a log
pub struct StreamWorker {
    log: LogStore,
    source: PathBuf,
    max_message_size: usize,
}

impl StreamWorker {
    pub fn new(log: LogStore, source: impl Into<PathBuf>, max_message_size: usize) -> Self {
        Self {
            log,
            source: source.into(),
            max_message_size: max_message_size.max(1),
        }
    }

    /// Read until end-of-stream or cancellation
    ///
    /// An append in flight when `cancel` fires completes before this returns.
    #[instrument(skip(self, cancel), fields(log = %self.log.name(), source = %self.source.display()))]
    pub async fn run(self, cancel: CancellationToken) -> CollectorResult<()> {
        debug!("Opening source");
        let source = open_source(&self.source)
            .await
            .map_err(|e| CollectorError::worker(self.log.name(), format!("opening source: {}", e)))?;
        let mut reader = BufReader::with_capacity(self.max_message_size, source);

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Closing source");
                    return Ok(());
                }
                line = read_line(&mut reader, self.max_message_size) => line
                    .map_err(|e| CollectorError::worker(self.log.name(), format!("reading line: {}", e)))?,
            };

            let Some(line) = line else {
                debug!("End of stream");
                return Ok(());
            };
            if line.truncated {
                debug!(kept = line.bytes.len(), "Skipped remainder of oversized line");
            }

            let timestamp = Utc::now();
            let log = self.log.clone();
            tokio::task::spawn_blocking(move || log.add_event(timestamp, &line.bytes))
                .await
                .map_err(|e| CollectorError::worker(self.log.name(), e))??;
        }
    }
}

async fn open_source(path: &Path) -> io::Result<Source> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if tokio::fs::metadata(path).await?.file_type().is_fifo() {
            return Ok(Box::new(open_fifo(path)?));
        }
    }
    Ok(Box::new(tokio::fs::File::open(path).await?))
}

#[cfg(unix)]
fn open_fifo(path: &Path) -> io::Result<tokio::net::unix::pipe::Receiver> {
    let mut options = tokio::net::unix::pipe::OpenOptions::new();
    #[cfg(target_os = "linux")]
    options.read_write(true);
    options.open_receiver(path)
}

/// Read the next line, keeping at most `max` bytes of it
///
/// The newline and a `\r` before it are not part of the line. Returns
/// `None` at end-of-stream when nothing is buffered; a final line without
/// a newline is still returned.
pub(crate) async fn read_line<R>(reader: &mut R, max: usize) -> io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut read_any = false;

    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if !read_any {
                    return Ok(None);
                }
                break;
            }
            read_any = true;

            let (chunk, consumed, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };
            let room = max.saturating_sub(bytes.len());
            if chunk.len() > room {
                truncated = true;
            }
            bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
            (consumed, done)
        };
        reader.consume(consumed);
        if done {
            break;
        }
    }

    if !truncated && bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    Ok(Some(Line { bytes, truncated }))
}
