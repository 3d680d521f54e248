//! Polling file follower.
//!
//! A [`Tailer`] is a blocking iterator over the lines appended to a file.
//! It polls the file for new data, detects truncation (the file became
//! shorter than what was already read) and rotation (the path now names a
//! different file, or no file at all), and optionally reopens the path after
//! rotation.

use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LogpipeError;

/// Default delay between polls when no new data is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How a file is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOptions {
    /// Start at the first byte instead of the current end of file.
    pub from_beginning: bool,
    /// Reopen the path when the file is rotated instead of ending.
    pub reopen: bool,
    /// Delay between polls when no new data is available.
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            from_beginning: false,
            reopen: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Cloneable flag that ends a [`Tailer`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Device + inode pair identifying a file across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    // Without a stable identity only disappearance and truncation are seen.
    #[cfg(not(unix))]
    fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// What the watched path looks like relative to the open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Unchanged,
    Truncated,
    Replaced,
    Missing,
}

/// Blocking iterator over trimmed lines appended to a file.
///
/// Only newline-terminated lines are yielded while following; a trailing
/// partial line is held back until it is completed, or flushed when the
/// file is rotated away. The iterator ends when [`StopHandle::stop`] is
/// called, when the file is rotated without [`TailOptions::reopen`], or on a
/// read error.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    options: TailOptions,
    reader: BufReader<File>,
    id: Option<FileId>,
    offset: u64,
    partial: Vec<u8>,
    stop: StopHandle,
    finished: bool,
}

impl Tailer {
    /// Open `path` and position at its start or end.
    ///
    /// Fails with [`LogpipeError::SourceOpen`]; opening is not retried.
    pub fn open(path: impl AsRef<Path>, options: TailOptions) -> Result<Self, LogpipeError> {
        Self::open_with_stop(path, options, StopHandle::new())
    }

    /// Like [`open`](Self::open), ending when `stop` is triggered.
    pub fn open_with_stop(
        path: impl AsRef<Path>,
        options: TailOptions,
        stop: StopHandle,
    ) -> Result<Self, LogpipeError> {
        let path = path.as_ref().to_path_buf();
        let source_open = |source| LogpipeError::SourceOpen {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(source_open)?;
        let id = file
            .metadata()
            .ok()
            .and_then(|m| FileId::from_metadata(&m));
        let mut reader = BufReader::new(file);
        let offset = if options.from_beginning {
            0
        } else {
            reader.seek(SeekFrom::End(0)).map_err(source_open)?
        };

        info!(
            path = %path.display(),
            offset,
            from_beginning = options.from_beginning,
            reopen = options.reopen,
            "tailing file"
        );

        Ok(Self {
            path,
            options,
            reader,
            id,
            offset,
            partial: Vec::new(),
            stop,
            finished: false,
        })
    }

    /// Handle that ends this tailer from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Bytes consumed from the current file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read one complete line, or `None` at end of available data.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.partial)?;
        self.offset += read as u64;
        if self.partial.last() == Some(&b'\n') {
            Ok(self.take_partial())
        } else {
            Ok(None)
        }
    }

    /// Consume the buffered bytes as one trimmed line.
    fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.partial);
        Some(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    fn path_state(&self) -> PathState {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(_) => return PathState::Missing,
        };
        let current = FileId::from_metadata(&metadata);
        if current.is_some() && self.id.is_some() && current != self.id {
            return PathState::Replaced;
        }
        if metadata.len() < self.offset {
            return PathState::Truncated;
        }
        PathState::Unchanged
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        self.partial.clear();
        Ok(())
    }

    /// Switch to whatever file now lives at the path.
    fn reopen(&mut self) -> io::Result<()> {
        let file = File::open(&self.path)?;
        self.id = file
            .metadata()
            .ok()
            .and_then(|m| FileId::from_metadata(&m));
        self.reader = BufReader::new(file);
        self.offset = 0;
        info!(path = %self.path.display(), "reopened rotated file");
        Ok(())
    }

    fn finish(&mut self, reason: &str) -> Option<String> {
        info!(path = %self.path.display(), reason, "tailing ended");
        self.finished = true;
        self.take_partial()
    }
}

impl Iterator for Tailer {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.finished {
                return None;
            }
            if self.stop.is_stopped() {
                return self.finish("stopped");
            }

            match self.read_line() {
                Ok(Some(line)) => return Some(line),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "read failed");
                    return self.finish("read error");
                }
            }

            match self.path_state() {
                PathState::Unchanged => {}
                PathState::Truncated => {
                    warn!(
                        path = %self.path.display(),
                        offset = self.offset,
                        "file truncated; reading from start"
                    );
                    if let Err(e) = self.rewind() {
                        warn!(path = %self.path.display(), error = %e, "rewind failed");
                        return self.finish("read error");
                    }
                    continue;
                }
                state @ (PathState::Replaced | PathState::Missing) => {
                    // Drain anything written to the old file before it moved.
                    match self.read_line() {
                        Ok(Some(line)) => return Some(line),
                        Ok(None) => {}
                        Err(e) => {
                            warn!(path = %self.path.display(), error = %e, "read failed");
                            return self.finish("read error");
                        }
                    }

                    if !self.options.reopen {
                        return self.finish("file rotated");
                    }
                    if state == PathState::Replaced {
                        match self.reopen() {
                            Ok(()) => {
                                // A partial last line of the old file is flushed as is.
                                if let Some(line) = self.take_partial() {
                                    return Some(line);
                                }
                                continue;
                            }
                            Err(e) => {
                                debug!(path = %self.path.display(), error = %e, "reopen failed; retrying");
                            }
                        }
                    }
                }
            }

            thread::sleep(self.options.poll_interval);
        }
    }
}
