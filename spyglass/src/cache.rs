//! Metadata cache with the lazy mapping-request sub-protocol
//!
//! The event stream references functions, classes, and counters by integer
//! identifier, and the target only names an identifier when asked. This cache
//! is a read-through front over the [`Sink`](crate::sink::Sink): seeded once
//! at session start, written through on every new mapping, and responsible
//! for emitting exactly one outstanding mapping request per unknown
//! identifier per session.
//!
//! ## The unknown/request rule
//!
//! `note_*_ref` is called for every identifier embedded in an event. The
//! first sighting of an unknown identifier yields the request to send;
//! repeat sightings while the request is outstanding yield nothing. When the
//! corresponding `Map*`/`CounterName` message arrives, `map_*` completes the
//! entity exactly once (the peer may re-send mappings; repeats are no-ops).
//!
//! Class-of-function resolution is recursive: completing a function whose
//! owning class is unknown immediately falls under the same rule via
//! `note_class_ref` on the owner.

use std::collections::{HashMap, HashSet};

use spyglass_wire::Request;

use crate::domain::{ClassId, ClassInfo, Counter, CounterId, FunctionId, FunctionInfo};
use crate::sink::KnownEntities;

#[derive(Debug, Default)]
pub struct MetadataCache {
    functions: HashMap<FunctionId, FunctionInfo>,
    classes: HashMap<ClassId, ClassInfo>,
    counters: HashMap<CounterId, Counter>,

    // Identifiers with an outstanding mapping request
    requested_functions: HashSet<FunctionId>,
    requested_classes: HashSet<ClassId>,
    requested_counters: HashSet<CounterId>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from entities persisted by a previous session.
    #[must_use]
    pub fn seeded_with(known: KnownEntities) -> Self {
        let mut cache = Self::new();
        for info in known.functions {
            cache.functions.insert(info.id, info);
        }
        for info in known.classes {
            cache.classes.insert(info.id, info);
        }
        for counter in known.counters {
            cache.counters.insert(counter.id, counter);
        }
        cache
    }

    // ========================================================================
    // Reference notes (event side)
    // ========================================================================

    /// Note a function reference; returns the mapping request to send if this
    /// is the first sighting of an unknown id.
    pub fn note_function_ref(&mut self, id: FunctionId) -> Option<Request> {
        if self.functions.contains_key(&id) || !self.requested_functions.insert(id) {
            return None;
        }
        Some(Request::GetFunctionMapping(id.0))
    }

    /// Note a class reference; same rule as [`Self::note_function_ref`].
    pub fn note_class_ref(&mut self, id: ClassId) -> Option<Request> {
        if self.classes.contains_key(&id) || !self.requested_classes.insert(id) {
            return None;
        }
        Some(Request::GetClassMapping(id.0))
    }

    /// Note a counter reference. An unknown counter gets an empty-named
    /// placeholder (so its facts are attributable immediately) and one
    /// name request.
    pub fn note_counter_ref(&mut self, id: CounterId) -> Option<Request> {
        if self.counters.contains_key(&id) {
            return None;
        }
        self.counters.insert(id, Counter { id, name: String::new() });
        if !self.requested_counters.insert(id) {
            return None;
        }
        Some(Request::GetCounterName(id.0))
    }

    // ========================================================================
    // Mapping completions (reply side)
    // ========================================================================

    /// Complete a function mapping. Returns the stored entry on first sight,
    /// `None` for a re-send of an already-known id.
    pub fn map_function(&mut self, info: FunctionInfo) -> Option<&FunctionInfo> {
        self.requested_functions.remove(&info.id);
        if self.functions.contains_key(&info.id) {
            return None;
        }
        let id = info.id;
        self.functions.insert(id, info);
        self.functions.get(&id)
    }

    /// Complete a class mapping; same idempotency as [`Self::map_function`].
    pub fn map_class(&mut self, info: ClassInfo) -> Option<&ClassInfo> {
        self.requested_classes.remove(&info.id);
        if self.classes.contains_key(&info.id) {
            return None;
        }
        let id = info.id;
        self.classes.insert(id, info);
        self.classes.get(&id)
    }

    /// Create or update a counter's name in place. Returns the counter if
    /// anything changed, `None` for a redundant re-send.
    pub fn name_counter(&mut self, id: CounterId, name: &str) -> Option<&Counter> {
        self.requested_counters.remove(&id);
        let counter = self.counters.entry(id).or_insert_with(|| Counter { id, name: String::new() });
        if counter.name == name {
            return None;
        }
        counter.name = name.to_string();
        self.counters.get(&id)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    #[must_use]
    pub fn is_function_known(&self, id: FunctionId) -> bool {
        self.functions.contains_key(&id)
    }

    #[must_use]
    pub fn is_class_known(&self, id: ClassId) -> bool {
        self.classes.contains_key(&id)
    }

    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<&FunctionInfo> {
        self.functions.get(&id)
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(&id)
    }

    #[must_use]
    pub fn counter(&self, id: CounterId) -> Option<&Counter> {
        self.counters.get(&id)
    }

    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
