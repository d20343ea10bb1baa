//! Persistence collaborator boundary
//!
//! The session core never talks to storage directly: everything it learns is
//! handed to a [`Sink`] as one atomic notification per wire event. Three
//! implementations cover the shipping and testing needs:
//!
//! - [`MemorySink`]: in-memory recording, used by tests and as a seedable stub
//! - [`JsonlSink`]: one JSON object per record, for offline analysis
//! - [`ChannelSink`]: hands records to another thread over a bounded channel

pub mod channel;
pub mod jsonl;
pub mod memory;

pub use channel::ChannelSink;
pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AllocationFact, ClassInfo, Counter, CounterFact, FunctionInfo, GcFact, SampleFact, ThreadId,
    TimingFact,
};

/// Entities already known from a previous session with the same target.
///
/// Threads are intentionally absent: liveness must be rediscovered from the
/// stream, never assumed from stale storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownEntities {
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub counters: Vec<Counter>,
}

/// One atomic notification out of the session core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Property { key: String, value: String },
    Function(FunctionInfo),
    Class(ClassInfo),
    Counter(Counter),
    Thread { thread_id: ThreadId, name: String, alive: bool },
    Timing(TimingFact),
    Sample(SampleFact),
    CounterValue(CounterFact),
    Allocation(AllocationFact),
    Gc(GcFact),
}

/// Storage capability injected into the session core.
///
/// Each method is one logical "mapping observed" or "fact observed"
/// notification; the core never splits a single wire event across calls.
pub trait Sink {
    /// Load everything known from prior sessions, once, at session start.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn load_known(&mut self) -> Result<KnownEntities>;

    /// Persist an arbitrary session property (host, port, session id).
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn put_property(&mut self, key: &str, value: &str) -> Result<()>;

    /// A newly mapped function. Called at most once per function id.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_function(&mut self, info: &FunctionInfo) -> Result<()>;

    /// A newly mapped class. Called at most once per class id.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_class(&mut self, info: &ClassInfo) -> Result<()>;

    /// A counter whose name was created or updated.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_counter(&mut self, counter: &Counter) -> Result<()>;

    /// Thread identity, name, and liveness — recorded on every change.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_thread(&mut self, id: ThreadId, name: &str, alive: bool) -> Result<()>;

    /// A completed function call with its elapsed time.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_timing(&mut self, fact: &TimingFact) -> Result<()>;

    /// A sampled call stack.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_sample(&mut self, fact: &SampleFact) -> Result<()>;

    /// A performance counter observation.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_counter_value(&mut self, fact: &CounterFact) -> Result<()>;

    /// An object allocation.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_allocation(&mut self, fact: &AllocationFact) -> Result<()>;

    /// A garbage collection.
    ///
    /// # Errors
    /// Returns an error if the record cannot be persisted.
    fn record_gc(&mut self, fact: &GcFact) -> Result<()>;
}
