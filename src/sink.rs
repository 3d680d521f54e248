//! The consumer half of the pipeline.
//!
//! A [`SinkWorker`] drains the shared event queue on its own thread and
//! hands each [`Event`] to a [`Sink`]. The only sink shipped here is
//! [`FileSink`], which appends newline-delimited JSON to a file whose path
//! may change while the worker runs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Selector, Sender};
use tracing::{debug, error, info, warn};

use crate::config::OutputPath;
use crate::error::LogpipeError;
use crate::event::Event;

/// Durable destination for events.
pub trait Sink: Send {
    /// Record one event.
    ///
    /// Fails with [`LogpipeError::Serialize`] or [`LogpipeError::Write`];
    /// either way the event is lost but the sink stays usable.
    fn append(&mut self, event: &Event) -> Result<(), LogpipeError>;

    /// Release any held resources.
    fn close(&mut self) {}
}

/// Appends one JSON object per line to the file named by an [`OutputPath`].
#[derive(Debug)]
pub struct FileSink {
    output: OutputPath,
    current: Option<(PathBuf, File)>,
}

impl FileSink {
    pub fn new(output: OutputPath) -> Self {
        Self {
            output,
            current: None,
        }
    }

    /// The open handle, reopened first if the configured path changed.
    fn handle(&mut self) -> Result<&mut (PathBuf, File), LogpipeError> {
        let wanted = self.output.get();
        let current = match self.current.take() {
            Some((path, file)) if path == wanted => (path, file),
            previous => {
                if let Some((old, _)) = previous {
                    info!(from = %old.display(), to = %wanted.display(), "output path changed");
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&wanted)
                    .map_err(|source| LogpipeError::Write {
                        path: wanted.clone(),
                        source,
                    })?;
                debug!(path = %wanted.display(), "opened output file");
                (wanted, file)
            }
        };
        Ok(self.current.insert(current))
    }
}

impl Sink for FileSink {
    fn append(&mut self, event: &Event) -> Result<(), LogpipeError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let (path, file) = self.handle()?;
        file.write_all(&line).map_err(|source| LogpipeError::Write {
            path: path.clone(),
            source,
        })
    }

    fn close(&mut self) {
        if let Some((path, _)) = self.current.take() {
            debug!(path = %path.display(), "closed output file");
        }
    }
}

/// Counters describing what the sink did with the events it received.
#[derive(Debug, Default)]
pub struct SinkStats {
    events_written: AtomicU64,
    events_failed: AtomicU64,
}

/// Point-in-time copy of [`SinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSnapshot {
    pub events_written: u64,
    /// Events dropped because they could not be serialized or written.
    pub events_failed: u64,
}

impl SinkStats {
    pub fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            events_written: self.events_written.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
        }
    }
}

enum Step {
    Event(Event),
    Quit,
    Drained,
}

/// Consumes the event queue until told to quit.
pub struct SinkWorker<S> {
    sink: S,
    events: Receiver<Event>,
    stats: Arc<SinkStats>,
}

impl<S: Sink + 'static> SinkWorker<S> {
    pub fn new(sink: S, events: Receiver<Event>) -> Self {
        Self {
            sink,
            events,
            stats: Arc::new(SinkStats::default()),
        }
    }

    /// Spawn the consume loop.
    pub fn start(self) -> Result<SinkHandle, LogpipeError> {
        let (quit, quit_rx) = flume::bounded(1);
        let stats = Arc::clone(&self.stats);
        let join = thread::Builder::new()
            .name("logpipe-sink".to_string())
            .spawn(move || self.work(&quit_rx))?;
        Ok(SinkHandle { quit, join, stats })
    }

    fn work(mut self, quit: &Receiver<()>) {
        info!("sink worker started");
        loop {
            let step = Selector::new()
                .recv(&self.events, |event| event.map_or(Step::Drained, Step::Event))
                .recv(quit, |_| Step::Quit)
                .wait();

            match step {
                Step::Event(event) => self.write(&event),
                Step::Quit => {
                    info!("sink worker received quit");
                    break;
                }
                Step::Drained => {
                    info!("event queue closed and drained");
                    break;
                }
            }
        }
        self.sink.close();
        info!(stats = ?self.stats.snapshot(), "sink worker stopped");
    }

    fn write(&mut self, event: &Event) {
        match self.sink.append(event) {
            Ok(()) => {
                self.stats.events_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.events_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping event");
            }
        }
    }
}

/// Control for a started [`SinkWorker`].
///
/// Dropping the handle without calling [`stop`](Self::stop) or
/// [`join`](Self::join) also ends the worker.
#[derive(Debug)]
pub struct SinkHandle {
    quit: Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<SinkStats>,
}

impl SinkHandle {
    pub fn stats(&self) -> SinkSnapshot {
        self.stats.snapshot()
    }

    /// Signal quit and wait for the worker to close its output.
    ///
    /// Events still queued are not guaranteed to be written.
    pub fn stop(self) -> SinkSnapshot {
        // A full or closed quit channel means the worker is already leaving.
        let _ = self.quit.try_send(());
        Self::wait(self.join, &self.stats)
    }

    /// Wait for the worker to finish on its own, which happens once every
    /// queue sender is dropped and the queue is drained.
    pub fn join(self) -> SinkSnapshot {
        let Self { quit, join, stats } = self;
        let snapshot = Self::wait(join, &stats);
        drop(quit);
        snapshot
    }

    fn wait(join: JoinHandle<()>, stats: &SinkStats) -> SinkSnapshot {
        if join.join().is_err() {
            error!("sink worker panicked");
        }
        stats.snapshot()
    }
}
