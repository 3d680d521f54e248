use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing::{info, warn};

use logpipe::cli::Cli;
use logpipe::config::Config;
use logpipe::logging;
use logpipe::pipeline::{PipelineHandle, PipelineWorker};
use logpipe::sink::{FileSink, SinkWorker};

/// Set from the signal handler; polled by the shutdown watcher.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "logpipe", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    logging::init_tracing(&cli.log_level);

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logpipe: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let Some(input) = cli.input else {
        eprintln!("logpipe: no input file given");
        return ExitCode::from(1);
    };

    let (tx, rx) = flume::bounded(config.queue_capacity);
    let mut worker = PipelineWorker::new(input, &config, tx);
    if let Err(e) = worker.init() {
        eprintln!("logpipe: {e}");
        return ExitCode::from(e.exit_code());
    }

    let sink = match SinkWorker::new(FileSink::new(config.output.clone()), rx).start() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("logpipe: cannot start writer: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    install_signal_handlers();
    watch_for_shutdown(worker.handle());

    let pipeline = worker.handle();
    let result = worker.run();
    // Dropping the worker closes the queue; the sink drains it and exits.
    drop(worker);
    let written = sink.join();

    info!(
        pipeline = ?pipeline.stats(),
        sink = ?written,
        "finished"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("logpipe: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Stop the pipeline once a termination signal has been received.
fn watch_for_shutdown(pipeline: PipelineHandle) {
    let spawned = thread::Builder::new()
        .name("logpipe-signals".to_string())
        .spawn(move || {
            while !SHUTDOWN.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            info!("shutdown requested");
            pipeline.stop();
        });
    if let Err(e) = spawned {
        warn!(error = %e, "cannot watch for shutdown signals");
    }
}

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to a graceful stop instead of killing the
/// process with events still queued.
#[cfg(unix)]
fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}
