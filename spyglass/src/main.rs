//! # spyglass - Main Entry Point
//!
//! Attaches to one instrumented target, runs the session loop on a dedicated
//! thread, and drains decoded records on the main thread — optionally into a
//! JSON Lines export file.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::info;
use std::thread;
use std::time::{Duration, Instant};

use spyglass::cli::{Args, SamplerMode};
use spyglass::client::{ClientConfig, ProfilerClient, SessionSummary, ShutdownHandle};
use spyglass::domain::{SessionError, SessionId};
use spyglass::sink::{ChannelSink, JsonlSink, Record};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_WRONG_TARGET: i32 = 3;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    // "Wrong target" (handshake mismatch) is actionable differently from the
    // target being unreachable or gone, so it gets its own code
    match err.downcast_ref::<SessionError>() {
        Some(e) if e.is_handshake_mismatch() => EXIT_WRONG_TARGET,
        _ => EXIT_ERROR,
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let expected_session_id = args
        .session_id
        .as_deref()
        .map(|s| {
            SessionId::from_hex(s).context("--session-id must be 32 hexadecimal characters")
        })
        .transpose()?;

    let config = ClientConfig {
        host: args.host.clone(),
        port: args.port,
        expected_session_id,
        ..ClientConfig::default()
    };

    // Bounded channel: a bursty target slows the session loop down rather
    // than ballooning memory while the writer catches up
    let (tx, rx) = bounded::<Record>(1024);
    let mut client = ProfilerClient::connect(&config, ChannelSink::new(tx))?;

    if args.suspend_on_attach {
        client.suspend_target()?;
        info!("Target suspended on attach");
    }
    if let Some(mode) = args.sampler {
        client.set_sampler_active(mode == SamplerMode::On)?;
    }

    let shutdown = client.shutdown_handle()?;
    let worker = thread::spawn(move || {
        let SessionSummary { sink, outcome, stats } = client.run();
        // Dropping the channel sink here disconnects the drain loop
        drop(sink);
        (outcome, stats)
    });

    let mut export = match &args.export {
        Some(path) => Some(JsonlSink::create(path)?),
        None => None,
    };

    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    let drained = drain_records(&rx, export.as_mut(), deadline, &shutdown);
    if drained.is_err() {
        // Export trouble: detach and drop the receiver so a session loop
        // blocked on a full channel unblocks before we join it
        shutdown.shutdown();
        drop(rx);
    }

    let (outcome, stats) = worker.join().map_err(|_| anyhow::anyhow!("Session thread panicked"))?;
    drained?;

    if let Some(export) = export.as_mut() {
        export.flush()?;
    }
    if !args.quiet {
        println!("session {outcome:?}: {stats}");
    }
    Ok(())
}

/// Consume records until the session thread hangs up, closing the transport
/// once the requested duration elapses.
fn drain_records(
    rx: &Receiver<Record>,
    mut export: Option<&mut JsonlSink<impl std::io::Write>>,
    mut deadline: Option<Instant>,
    shutdown: &ShutdownHandle,
) -> Result<()> {
    loop {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()).min(Duration::from_millis(500)),
            None => Duration::from_millis(500),
        };
        match rx.recv_timeout(wait) {
            Ok(record) => {
                if let Some(sink) = export.as_mut() {
                    sink.append(&record)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    info!("Duration elapsed; detaching");
                    shutdown.shutdown();
                    // Keep draining whatever the loop already decoded
                    deadline = None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}
