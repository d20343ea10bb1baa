//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::client::DEFAULT_PORT;

#[derive(Parser)]
#[command(
    name = "spyglass",
    about = "Attach to an instrumented process and record its event stream",
    after_help = "\
EXAMPLES:
    spyglass --host 10.0.0.5 --port 7100 --export facts.jsonl
    spyglass --duration 30 --export facts.jsonl      Detach after 30 seconds
    spyglass --session-id <HEX> --export facts.jsonl Reattach, verifying identity"
)]
pub struct Args {
    /// Target host to attach to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Target event-stream port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Write decoded records to FILE as JSON Lines
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Detach after N seconds (0 = stay until the target closes the stream)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Session identifier (32 hex chars) persisted by a previous attach;
    /// the target must present exactly this identifier
    #[arg(long, value_name = "HEX")]
    pub session_id: Option<String>,

    /// Suspend the target immediately after attaching
    #[arg(long)]
    pub suspend_on_attach: bool,

    /// Switch the target's stack sampler on attach
    #[arg(long, value_enum, value_name = "MODE")]
    pub sampler: Option<SamplerMode>,

    /// Suppress the end-of-session summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SamplerMode {
    On,
    Off,
}
