//! The producer half of the pipeline.
//!
//! A [`PipelineWorker`] tails one input file, parses each line with a
//! [`LineParser`], and publishes every resulting [`Event`] onto the bounded
//! queue shared with the sink.
//!
//! Events are sent synchronously from the read loop, so the sink receives
//! them in file order. When the queue is full the worker blocks
//! (backpressure) and re-checks its stop flag every poll interval.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use flume::{SendTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::LogpipeError;
use crate::event::Event;
use crate::parser::{FieldRules, LineParser};
use crate::query::ExpandOutcome;
use crate::tail::{StopHandle, TailOptions, Tailer};

/// Counters describing what happened to the lines read so far.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    events_published: AtomicU64,
    lines_unmatched: AtomicU64,
    lines_dropped: AtomicU64,
    malformed_uris: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    /// Lines handed over by the tailer.
    pub lines_read: u64,
    /// Events accepted by the queue.
    pub events_published: u64,
    /// Lines the pattern did not match.
    pub lines_unmatched: u64,
    /// Lines lost for any other reason (no usable pattern, queue closed, stopped while blocked).
    pub lines_dropped: u64,
    /// `uri` fields that could not be parsed.
    pub malformed_uris: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            lines_unmatched: self.lines_unmatched.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            malformed_uris: self.malformed_uris.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Lifecycle of a [`PipelineWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

/// Cross-thread control for a running [`PipelineWorker`].
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    stop: StopHandle,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    /// Ask the worker to stop. Its read loop ends within one poll interval.
    ///
    /// Does not stop the sink.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.stats.snapshot()
    }
}

/// Tails a file and publishes parsed events onto the shared queue.
pub struct PipelineWorker {
    input: PathBuf,
    pattern: String,
    rules: FieldRules,
    tail: TailOptions,
    queue: Sender<Event>,
    parser: Option<LineParser>,
    initialized: bool,
    state: WorkerState,
    stop: StopHandle,
    stats: Arc<PipelineStats>,
    queue_closed: bool,
}

impl PipelineWorker {
    pub fn new(input: impl Into<PathBuf>, config: &Config, queue: Sender<Event>) -> Self {
        Self {
            input: input.into(),
            pattern: config.pattern.clone(),
            rules: config.field_rules(),
            tail: config.tail,
            queue,
            parser: None,
            initialized: false,
            state: WorkerState::Idle,
            stop: StopHandle::new(),
            stats: Arc::new(PipelineStats::default()),
            queue_closed: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            stop: self.stop.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Compile the line pattern.
    ///
    /// On failure the error is logged once and returned; the worker stays
    /// usable but drops every line it reads.
    pub fn init(&mut self) -> Result<(), LogpipeError> {
        self.initialized = true;
        match LineParser::with_rules(&self.pattern, self.rules.clone()) {
            Ok(parser) => {
                self.parser = Some(parser);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not compile line pattern; no line will match");
                self.parser = None;
                Err(e)
            }
        }
    }

    /// Tail the input until it ends or [`PipelineHandle::stop`] is called.
    ///
    /// Runs on the calling thread. Calls [`init`](Self::init) first if it
    /// has not been called. A worker runs at most once.
    pub fn run(&mut self) -> Result<(), LogpipeError> {
        if self.state != WorkerState::Idle {
            return Err(LogpipeError::AlreadyStopped);
        }
        if !self.initialized {
            // A bad pattern is already logged; the worker still drains the input.
            let _ = self.init();
        }

        let tailer = match Tailer::open_with_stop(&self.input, self.tail, self.stop.clone()) {
            Ok(tailer) => tailer,
            Err(e) => {
                warn!(error = %e, "input file could not be opened");
                self.state = WorkerState::Stopped;
                return Err(e);
            }
        };

        self.state = WorkerState::Running;
        info!(input = %self.input.display(), "pipeline worker started");

        for line in tailer {
            PipelineStats::bump(&self.stats.lines_read);
            if !self.process(&line) {
                self.stop.stop();
            }
        }

        self.state = WorkerState::Stopped;
        info!(
            input = %self.input.display(),
            stats = ?self.stats.snapshot(),
            "pipeline worker stopped"
        );
        Ok(())
    }

    /// Run on a dedicated thread.
    pub fn spawn(mut self) -> Result<JoinHandle<Result<(), LogpipeError>>, LogpipeError> {
        let handle = thread::Builder::new()
            .name("logpipe-pipeline".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Parse and publish one line. Returns `false` when the worker was
    /// stopped while waiting for queue space.
    fn process(&mut self, line: &str) -> bool {
        let Some(ref parser) = self.parser else {
            debug!(line, "no usable pattern; dropping line");
            PipelineStats::bump(&self.stats.lines_dropped);
            return true;
        };

        match parser.parse_detailed(line) {
            Ok(parsed) => {
                if parsed.uri == Some(ExpandOutcome::Malformed) {
                    debug!(line, "uri field could not be parsed");
                    PipelineStats::bump(&self.stats.malformed_uris);
                }
                self.publish(parsed.event)
            }
            Err(_) => {
                PipelineStats::bump(&self.stats.lines_unmatched);
                true
            }
        }
    }

    /// Blocking send that still honors the stop flag.
    ///
    /// A closed queue does not end the worker: it keeps tailing and counts
    /// every further event as dropped.
    fn publish(&mut self, mut event: Event) -> bool {
        loop {
            match self.queue.send_timeout(event, self.tail.poll_interval) {
                Ok(()) => {
                    PipelineStats::bump(&self.stats.events_published);
                    return true;
                }
                Err(SendTimeoutError::Timeout(pending)) => {
                    if self.stop.is_stopped() {
                        debug!("stopped while the queue was full; dropping event");
                        PipelineStats::bump(&self.stats.lines_dropped);
                        return false;
                    }
                    event = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    if !self.queue_closed {
                        self.queue_closed = true;
                        warn!("event queue closed; dropping events until stopped");
                    }
                    PipelineStats::bump(&self.stats.lines_dropped);
                    return true;
                }
            }
        }
    }
}
