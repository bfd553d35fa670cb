//! Line sources: a growing file followed by polling, or a fixed in-memory list.

use crate::config::{SourceConfig, StartPosition};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open event stream '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read event stream: {0}")]
    Read(#[from] std::io::Error),

    #[error("no new events for {}s", .0.as_secs_f64())]
    Idle(Duration),

    #[error("interrupted")]
    Interrupted,
}

/// Yields one complete line at a time.
///
/// `Ok(None)` means the source is exhausted and will never produce more.
pub trait LineSource {
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

impl<S: LineSource + ?Sized> LineSource for &mut S {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        (**self).next_line()
    }
}

// ============ File Tail ============

/// Follows a file that another process appends to.
///
/// A line without its terminating newline is held back until the writer
/// finishes it.
pub struct FileTail {
    path: PathBuf,
    reader: BufReader<File>,
    partial: String,
    follow: bool,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl FileTail {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let path = config.events_path.clone();
        let mut file = File::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        if config.start == StartPosition::End {
            let offset = file.seek(SeekFrom::End(0))?;
            debug!(path = %path.display(), offset, "tailing event stream from end");
        } else {
            debug!(path = %path.display(), "reading event stream from start");
        }

        Ok(Self {
            path,
            reader: BufReader::new(file),
            partial: String::new(),
            follow: config.follow,
            poll_interval: config.poll_interval,
            idle_timeout: config.idle_timeout,
            cancel: None,
        })
    }

    /// Stop waiting as soon as `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn take_line(&mut self) -> String {
        let line = std::mem::take(&mut self.partial);
        line.trim_end_matches(['\n', '\r']).to_string()
    }
}

impl LineSource for FileTail {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut last_activity = Instant::now();
        loop {
            if self.cancelled() {
                return Err(SourceError::Interrupted);
            }

            let n = self.reader.read_line(&mut self.partial)?;
            if self.partial.ends_with('\n') {
                return Ok(Some(self.take_line()));
            }
            if n > 0 {
                last_activity = Instant::now();
                continue;
            }

            // At end of file.
            if !self.follow {
                if self.partial.trim().is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }
            if let Some(timeout) = self.idle_timeout {
                if last_activity.elapsed() >= timeout {
                    return Err(SourceError::Idle(timeout));
                }
            }
            trace!(path = %self.path.display(), "waiting for new events");
            thread::sleep(self.poll_interval);
        }
    }
}

// ============ Memory Source ============

/// A fixed list of lines, exhausted once drained.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    lines: VecDeque<String>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for MemorySource {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.lines.pop_front())
    }
}
