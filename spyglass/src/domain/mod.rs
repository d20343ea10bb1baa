//! Domain model for spyglass
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    AllocationFact, ClassId, ClassInfo, Counter, CounterFact, CounterId, FunctionId, FunctionInfo,
    GcFact, SampleFact, SessionId, ThreadId, Timestamp, TimingFact,
};

pub use errors::SessionError;
