//! # Shared Wire Protocol Definitions (target ↔ client)
//!
//! Defines the message tags, message/request sum types, and the binary codec
//! shared between the profiling client and any peer that speaks the target's
//! event protocol (the stub peers used by tests live on this crate too).
//!
//! ## Stream layout
//!
//! Every connection opens with a raw 16-byte session identifier, followed by
//! a sequence of framed messages. Each frame is a 1-byte tag and a
//! self-delimited payload:
//!
//! - identifiers are `u32`, timestamps `u64` (nanoseconds), counter values
//!   `i64`, allocation sizes `u64` — all little-endian
//! - strings are a `u16` length prefix followed by UTF-8 bytes
//! - sampled call stacks are a `u16` frame count followed by that many `u32`
//!   function identifiers, outermost frame last
//! - per-generation size arrays are a `u16` count followed by `u64` sizes
//!
//! There is no resynchronization marker: an unrecognized tag means the stream
//! is desynchronized and every subsequent byte is meaningless. The codec
//! reports it as [`WireError::UnknownTag`] and callers must stop reading.
//!
//! ## Direction
//!
//! - [`Message`] — target → client event stream (the bulk of the traffic)
//! - [`Request`] — client → target mapping requests and control commands;
//!   fire-and-forget, replies (if any) arrive as ordinary [`Message`]s

pub mod codec;

pub use codec::{
    read_message, read_request, read_session_id, write_message, write_request, write_session_id,
};

use thiserror::Error;

/// Length of the raw session identifier exchanged at connection start
pub const SESSION_ID_LEN: usize = 16;

// ============================================================================
// Message Tags (target → client)
// ============================================================================

/// Function identifier → (class, name, signature, native flag)
pub const MSG_MAP_FUNCTION: u8 = 0x01;
/// Class identifier → (name, value-type flag)
pub const MSG_MAP_CLASS: u8 = 0x02;
/// Thread identifier → (name, liveness)
pub const MSG_MAP_THREAD: u8 = 0x03;
/// A thread entered a function
pub const MSG_ENTER_FUNCTION: u8 = 0x04;
/// A thread left a function
pub const MSG_LEAVE_FUNCTION: u8 = 0x05;
/// A thread left a function via tail call (timed like a leave)
pub const MSG_TAIL_CALL: u8 = 0x06;
/// A thread came into existence
pub const MSG_CREATE_THREAD: u8 = 0x07;
/// A thread died (its context is retained for late leave events)
pub const MSG_DESTROY_THREAD: u8 = 0x08;
/// A live thread was (re)named
pub const MSG_NAME_THREAD: u8 = 0x09;
/// Sampled call stack for one thread
pub const MSG_SAMPLE: u8 = 0x0A;
/// Performance counter value at a point in time
pub const MSG_PERF_COUNTER: u8 = 0x0B;
/// Counter identifier → display name
pub const MSG_COUNTER_NAME: u8 = 0x0C;
/// An object was allocated
pub const MSG_OBJECT_ALLOCATED: u8 = 0x0D;
/// A garbage collection ran
pub const MSG_GARBAGE_COLLECTED: u8 = 0x0E;
/// Heap generation sizes snapshot (informational)
pub const MSG_GENERATION_SIZES: u8 = 0x0F;
/// Liveness proof; carries nothing
pub const MSG_KEEP_ALIVE: u8 = 0x10;

// ============================================================================
// Request Tags (client → target)
// ============================================================================

pub const REQ_GET_FUNCTION_MAPPING: u8 = 0x40;
pub const REQ_GET_CLASS_MAPPING: u8 = 0x41;
pub const REQ_GET_THREAD_MAPPING: u8 = 0x42;
pub const REQ_GET_COUNTER_NAME: u8 = 0x43;
pub const REQ_SUSPEND_TARGET: u8 = 0x50;
pub const REQ_RESUME_TARGET: u8 = 0x51;
pub const REQ_SET_SAMPLER_ACTIVE: u8 = 0x52;

/// One framed event from the target.
///
/// A closed sum type: every tag the protocol defines has exactly one variant
/// here, carrying exactly the fields that tag's payload encodes. Identifiers
/// are raw integers at this layer; the client wraps them in domain newtypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    MapFunction {
        function_id: u32,
        class_id: u32,
        name: String,
        signature: String,
        is_native: bool,
    },
    MapClass {
        class_id: u32,
        name: String,
        is_value_type: bool,
    },
    MapThread {
        thread_id: u32,
        name: String,
        is_alive: bool,
    },
    EnterFunction {
        thread_id: u32,
        function_id: u32,
        timestamp_ns: u64,
    },
    LeaveFunction {
        thread_id: u32,
        function_id: u32,
        timestamp_ns: u64,
    },
    TailCall {
        thread_id: u32,
        function_id: u32,
        timestamp_ns: u64,
    },
    CreateThread {
        thread_id: u32,
    },
    DestroyThread {
        thread_id: u32,
    },
    NameThread {
        thread_id: u32,
        name: String,
    },
    Sample {
        thread_id: u32,
        timestamp_ns: u64,
        frames: Vec<u32>,
    },
    PerfCounter {
        counter_id: u32,
        timestamp_ns: u64,
        value: i64,
    },
    CounterName {
        counter_id: u32,
        name: String,
    },
    ObjectAllocated {
        class_id: u32,
        size: u64,
        function_id: u32,
        timestamp_ns: u64,
    },
    GarbageCollected {
        generation: u32,
        function_id: u32,
        timestamp_ns: u64,
    },
    GenerationSizes {
        sizes: Vec<u64>,
    },
    KeepAlive,
}

impl Message {
    /// Wire tag for this message kind
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Message::MapFunction { .. } => MSG_MAP_FUNCTION,
            Message::MapClass { .. } => MSG_MAP_CLASS,
            Message::MapThread { .. } => MSG_MAP_THREAD,
            Message::EnterFunction { .. } => MSG_ENTER_FUNCTION,
            Message::LeaveFunction { .. } => MSG_LEAVE_FUNCTION,
            Message::TailCall { .. } => MSG_TAIL_CALL,
            Message::CreateThread { .. } => MSG_CREATE_THREAD,
            Message::DestroyThread { .. } => MSG_DESTROY_THREAD,
            Message::NameThread { .. } => MSG_NAME_THREAD,
            Message::Sample { .. } => MSG_SAMPLE,
            Message::PerfCounter { .. } => MSG_PERF_COUNTER,
            Message::CounterName { .. } => MSG_COUNTER_NAME,
            Message::ObjectAllocated { .. } => MSG_OBJECT_ALLOCATED,
            Message::GarbageCollected { .. } => MSG_GARBAGE_COLLECTED,
            Message::GenerationSizes { .. } => MSG_GENERATION_SIZES,
            Message::KeepAlive => MSG_KEEP_ALIVE,
        }
    }
}

/// One client → target request.
///
/// Mapping requests ask the target to emit the corresponding `Map*` /
/// `CounterName` message; control commands are imperative with no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GetFunctionMapping(u32),
    GetClassMapping(u32),
    GetThreadMapping(u32),
    GetCounterName(u32),
    SuspendTarget,
    ResumeTarget,
    SetSamplerActive(bool),
}

impl Request {
    /// Wire tag for this request kind
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Request::GetFunctionMapping(_) => REQ_GET_FUNCTION_MAPPING,
            Request::GetClassMapping(_) => REQ_GET_CLASS_MAPPING,
            Request::GetThreadMapping(_) => REQ_GET_THREAD_MAPPING,
            Request::GetCounterName(_) => REQ_GET_COUNTER_NAME,
            Request::SuspendTarget => REQ_SUSPEND_TARGET,
            Request::ResumeTarget => REQ_RESUME_TARGET,
            Request::SetSamplerActive(_) => REQ_SET_SAMPLER_ACTIVE,
        }
    }
}

/// Codec-level failures.
///
/// `UnknownTag` is the desynchronization signal: the stream cannot be trusted
/// past it. Everything else is either transport trouble (`Io`) or a corrupt
/// length-prefixed string.
#[derive(Error, Debug)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Unknown message tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("String field is not valid UTF-8: {0}")]
    BadString(#[from] std::string::FromUtf8Error),

    #[error("String field of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),

    #[error("Array of {0} elements exceeds the u16 count prefix")]
    ArrayTooLong(usize),
}
