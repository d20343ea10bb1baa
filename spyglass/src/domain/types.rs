//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a class identifier
//! where a function identifier is expected, and make signatures expressive.
//! Identifiers are assigned by the target process; they are opaque to us.

use serde::{Deserialize, Serialize};
use spyglass_wire::SESSION_ID_LEN;
use std::fmt;

/// Function identifier assigned by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Class identifier assigned by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Thread identifier assigned by the target
///
/// Unique among live *and* historically-seen threads: the target never reuses
/// an identifier within a session, so a dead thread's context stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Performance counter identifier assigned by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterId(pub u32);

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "counter#{}", self.0)
    }
}

/// Timestamp in nanoseconds on the target's monotonic clock
///
/// Not wall-clock time; only differences between two timestamps on the same
/// stream are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Elapsed nanoseconds since `earlier`, saturating at zero if the stream
    /// delivered timestamps out of order.
    #[must_use]
    pub fn elapsed_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Opaque 16-byte session identifier, fixed once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(pub [u8; SESSION_ID_LEN]);

impl SessionId {
    /// Lowercase hex rendering, used for persistence and log output
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the hex rendering produced by [`SessionId::to_hex`]
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != SESSION_ID_LEN * 2 {
            return None;
        }
        let mut id = [0u8; SESSION_ID_LEN];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(SessionId(id))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ============================================================================
// Mapped entities
// ============================================================================

/// A function the target has named for us. Immutable once mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub id: FunctionId,
    pub class_id: ClassId,
    pub name: String,
    pub signature: String,
    pub is_native: bool,
}

/// A class the target has named for us. Immutable once mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub is_value_type: bool,
}

/// A performance counter. The name may start empty and be filled in (or
/// updated) when a `CounterName` message arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: CounterId,
    pub name: String,
}

// ============================================================================
// Facts derived from the event stream
// ============================================================================

/// One completed function call: elapsed time from paired enter/leave events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingFact {
    pub thread_id: ThreadId,
    pub function_id: FunctionId,
    pub elapsed_ns: u64,
}

/// One sampled call stack, outermost frame last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFact {
    pub thread_id: ThreadId,
    pub timestamp: Timestamp,
    pub frames: Vec<FunctionId>,
}

/// One performance counter observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterFact {
    pub counter_id: CounterId,
    pub timestamp: Timestamp,
    pub value: i64,
}

/// One object allocation, forwarded verbatim (no cache gating)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFact {
    pub class_id: ClassId,
    pub size: u64,
    pub function_id: FunctionId,
    pub timestamp: Timestamp,
}

/// One garbage collection, forwarded verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcFact {
    pub generation: u32,
    pub function_id: FunctionId,
    pub timestamp: Timestamp,
}
