//! # Event Dispatching
//!
//! The message loop's single externally-visible operation: read one framed
//! message, decode by tag, route it to the metadata cache or the shadow
//! stacks, and forward resulting facts to the sink.
//!
//! ## Outcomes
//!
//! `process_next` is tri-state ([`LoopOutcome`]): one message handled, the
//! session ended (peer closed, or a fatal protocol condition terminated it),
//! or the transport failed (I/O error including read timeout). Callers poll
//! it in a loop until something other than `Progressed` comes back.
//!
//! ## Outbound requests
//!
//! Mapping requests are written synchronously from inside inbound handling —
//! a single sample can fan out into several — and are fire-and-forget: the
//! reply, if any, arrives later as an ordinary mapping message and lands in
//! the cache like any other.

use std::fmt;
use std::io::{Read, Write};

use anyhow::Result;
use log::{debug, error, info, warn};
use spyglass_wire::{read_message, write_request, Message, Request, WireError};

use crate::cache::MetadataCache;
use crate::domain::{
    AllocationFact, ClassId, ClassInfo, CounterFact, CounterId, FunctionId, FunctionInfo, GcFact,
    SampleFact, SessionError, SessionId, ThreadId, Timestamp,
};
use crate::session::Session;
use crate::shadow_stack::PopOutcome;
use crate::sink::Sink;

/// Result of one `process_next` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// One message was handled; call again
    Progressed,
    /// Peer closed the stream, or a fatal protocol condition ended the session
    Ended,
    /// I/O failure, including read timeout; the session is dead
    TransportFailed,
}

/// Per-session diagnostics counters, reported once at session end
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: u64,
    pub timing_facts: u64,
    pub samples: u64,
    pub counter_facts: u64,
    pub allocations: u64,
    pub gcs: u64,
    pub keep_alives: u64,
    pub generation_snapshots: u64,
    /// Leave events that found an empty stack (mid-call attach; expected)
    pub empty_stack_drops: u64,
    /// Pops whose function disagreed with the leave event (data quality)
    pub mismatched_pops: u64,
    pub mapping_requests: u64,
    pub sink_errors: u64,
}

impl SessionStats {
    /// Sink trouble is diagnosed, counted, and absorbed — the stream decoding
    /// must outlive a hiccup in the collaborator.
    fn absorb_sink_error(&mut self, err: Option<anyhow::Error>) {
        if let Some(e) = err {
            warn!("Sink rejected a record: {e}");
            self.sink_errors += 1;
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages, {} timings ({} empty-stack drops, {} mismatched pops), \
             {} samples, {} counter values, {} allocations, {} GCs, \
             {} mapping requests, {} sink errors",
            self.messages,
            self.timing_facts,
            self.empty_stack_drops,
            self.mismatched_pops,
            self.samples,
            self.counter_facts,
            self.allocations,
            self.gcs,
            self.mapping_requests,
            self.sink_errors
        )
    }
}

/// Owns the per-session state machine: session identity and thread contexts,
/// the metadata cache, the sink, and the diagnostics counters.
#[derive(Debug)]
pub struct Dispatcher<S: Sink> {
    session: Session,
    cache: MetadataCache,
    sink: S,
    pub stats: SessionStats,
}

impl<S: Sink> Dispatcher<S> {
    /// Build a dispatcher around an already-handshaken (or about-to-be)
    /// session, seeding the cache from the sink's persisted entities.
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if the sink cannot load its state.
    pub fn new(session: Session, mut sink: S) -> Result<Self, SessionError> {
        let known = sink.load_known().map_err(SessionError::Storage)?;
        info!(
            "Seeded cache with {} functions, {} classes, {} counters",
            known.functions.len(),
            known.classes.len(),
            known.counters.len()
        );
        Ok(Self { session, cache: MetadataCache::seeded_with(known), sink, stats: SessionStats::default() })
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Tear the dispatcher apart for post-session inspection.
    #[must_use]
    pub fn into_parts(self) -> (S, SessionStats) {
        (self.sink, self.stats)
    }

    /// Run the connection's one handshake (see [`Session::handshake`]).
    ///
    /// # Errors
    /// Propagates the session's handshake errors unchanged.
    pub fn handshake<R: Read>(&mut self, reader: &mut R) -> Result<SessionId, SessionError> {
        self.session.handshake(reader, &mut self.sink)
    }

    /// Read, decode, and handle exactly one message.
    ///
    /// Blocks until a full frame is buffered, the peer closes, or the read
    /// times out. A terminated session returns `Ended` without touching the
    /// stream.
    pub fn process_next<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> LoopOutcome {
        if !self.session.is_active() {
            return LoopOutcome::Ended;
        }

        let msg = match read_message(reader) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                info!("Peer closed the stream");
                self.session.terminate();
                return LoopOutcome::Ended;
            }
            Err(WireError::UnknownTag(tag)) => {
                // Desynchronized: every byte after this one is meaningless
                error!("{}", SessionError::ProtocolDesync(tag));
                self.session.terminate();
                return LoopOutcome::Ended;
            }
            Err(WireError::Io(e)) => {
                warn!("Transport failed: {e}");
                self.session.terminate();
                return LoopOutcome::TransportFailed;
            }
            Err(e) => {
                // Corrupt payload (bad UTF-8 and friends) — same poison as an
                // unknown tag: stop reading immediately
                error!("Protocol error, abandoning stream: {e}");
                self.session.terminate();
                return LoopOutcome::Ended;
            }
        };

        self.stats.messages += 1;
        self.handle(msg, writer);
        LoopOutcome::Progressed
    }

    // ========================================================================
    // Dispatch table
    // ========================================================================

    fn handle<W: Write>(&mut self, msg: Message, writer: &mut W) {
        match msg {
            Message::MapFunction { function_id, class_id, name, signature, is_native } => {
                self.on_map_function(
                    FunctionInfo {
                        id: FunctionId(function_id),
                        class_id: ClassId(class_id),
                        name,
                        signature,
                        is_native,
                    },
                    writer,
                );
            }
            Message::MapClass { class_id, name, is_value_type } => {
                let info = ClassInfo { id: ClassId(class_id), name, is_value_type };
                if let Some(info) = self.cache.map_class(info) {
                    let info = info.clone();
                    self.stats.absorb_sink_error(self.sink.record_class(&info).err());
                }
            }
            Message::MapThread { thread_id, name, is_alive } => {
                let id = ThreadId(thread_id);
                self.session.threads_mut().observe_mapping(id, &name, is_alive);
                self.stats.absorb_sink_error(self.sink.record_thread(id, &name, is_alive).err());
            }
            Message::CreateThread { thread_id } => {
                let id = ThreadId(thread_id);
                self.touch_thread(id, writer);
                self.session.threads_mut().set_alive(id, true);
                self.forward_thread(id);
            }
            Message::DestroyThread { thread_id } => {
                let id = ThreadId(thread_id);
                self.touch_thread(id, writer);
                self.session.threads_mut().set_alive(id, false);
                self.forward_thread(id);
            }
            Message::NameThread { thread_id, name } => {
                let id = ThreadId(thread_id);
                self.touch_thread(id, writer);
                // Only name changes here: renaming a dead thread can't happen,
                // so liveness is left alone
                self.session.threads_mut().set_name(id, &name);
                self.forward_thread(id);
            }
            Message::EnterFunction { thread_id, function_id, timestamp_ns } => {
                let (thread, function) = (ThreadId(thread_id), FunctionId(function_id));
                self.touch_thread(thread, writer);
                self.request_function(function, writer);
                // Push even while unmapped: timing needs only the id
                self.session.threads_mut().push(thread, function, Timestamp(timestamp_ns));
            }
            Message::LeaveFunction { thread_id, function_id, timestamp_ns }
            | Message::TailCall { thread_id, function_id, timestamp_ns } => {
                let (thread, function) = (ThreadId(thread_id), FunctionId(function_id));
                self.touch_thread(thread, writer);
                self.request_function(function, writer);
                self.on_leave(thread, function, Timestamp(timestamp_ns));
            }
            Message::Sample { thread_id, timestamp_ns, frames } => {
                let thread = ThreadId(thread_id);
                self.touch_thread(thread, writer);
                let frames: Vec<FunctionId> = frames.into_iter().map(FunctionId).collect();
                for &frame in &frames {
                    self.request_function(frame, writer);
                }
                let fact = SampleFact { thread_id: thread, timestamp: Timestamp(timestamp_ns), frames };
                self.stats.samples += 1;
                self.stats.absorb_sink_error(self.sink.record_sample(&fact).err());
            }
            Message::PerfCounter { counter_id, timestamp_ns, value } => {
                let counter = CounterId(counter_id);
                if let Some(req) = self.cache.note_counter_ref(counter) {
                    self.send_request(req, writer);
                }
                let fact =
                    CounterFact { counter_id: counter, timestamp: Timestamp(timestamp_ns), value };
                self.stats.counter_facts += 1;
                self.stats.absorb_sink_error(self.sink.record_counter_value(&fact).err());
            }
            Message::CounterName { counter_id, name } => {
                if let Some(counter) = self.cache.name_counter(CounterId(counter_id), &name) {
                    let counter = counter.clone();
                    self.stats.absorb_sink_error(self.sink.record_counter(&counter).err());
                }
            }
            Message::ObjectAllocated { class_id, size, function_id, timestamp_ns } => {
                // Forwarded verbatim: allocations are not gated on mappings
                let fact = AllocationFact {
                    class_id: ClassId(class_id),
                    size,
                    function_id: FunctionId(function_id),
                    timestamp: Timestamp(timestamp_ns),
                };
                self.stats.allocations += 1;
                self.stats.absorb_sink_error(self.sink.record_allocation(&fact).err());
            }
            Message::GarbageCollected { generation, function_id, timestamp_ns } => {
                let fact = GcFact {
                    generation,
                    function_id: FunctionId(function_id),
                    timestamp: Timestamp(timestamp_ns),
                };
                self.stats.gcs += 1;
                self.stats.absorb_sink_error(self.sink.record_gc(&fact).err());
            }
            Message::GenerationSizes { sizes } => {
                // Observational only; never persisted
                self.stats.generation_snapshots += 1;
                debug!("Generation sizes snapshot: {sizes:?}");
            }
            Message::KeepAlive => {
                self.stats.keep_alives += 1;
            }
        }
    }

    // ========================================================================
    // Handlers with enough logic to name
    // ========================================================================

    fn on_map_function<W: Write>(&mut self, info: FunctionInfo, writer: &mut W) {
        let Some(info) = self.cache.map_function(info) else {
            return; // Re-sent mapping; the sink already knows
        };
        let info = info.clone();
        self.stats.absorb_sink_error(self.sink.record_function(&info).err());

        // Recursive rule: a freshly mapped function may name a class we have
        // never heard of
        if let Some(req) = self.cache.note_class_ref(info.class_id) {
            self.send_request(req, writer);
        }
    }

    fn on_leave(&mut self, thread: ThreadId, function: FunctionId, left_at: Timestamp) {
        match self.session.threads_mut().pop(thread, function, left_at) {
            PopOutcome::Timed(fact) => {
                self.stats.timing_facts += 1;
                self.stats.absorb_sink_error(self.sink.record_timing(&fact).err());
            }
            PopOutcome::Mismatched { fact, popped } => {
                // Stream desynchronized or frames were dropped. Report it and
                // keep decoding; one bad frame must not stop the session.
                warn!(
                    "Shadow stack mismatch on {thread}: left {function} but {popped} was on top"
                );
                self.stats.mismatched_pops += 1;
                self.stats.timing_facts += 1;
                self.stats.absorb_sink_error(self.sink.record_timing(&fact).err());
            }
            PopOutcome::EmptyStack => {
                // Attached mid-call; the entry predates this session
                self.stats.empty_stack_drops += 1;
                debug!("Dropped leave of {function} on {thread}: empty shadow stack");
            }
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Ensure a thread context exists; first sight owes a mapping request.
    fn touch_thread<W: Write>(&mut self, id: ThreadId, writer: &mut W) {
        if self.session.threads_mut().touch(id) {
            self.send_request(Request::GetThreadMapping(id.0), writer);
        }
    }

    fn request_function<W: Write>(&mut self, id: FunctionId, writer: &mut W) {
        if let Some(req) = self.cache.note_function_ref(id) {
            self.send_request(req, writer);
        }
    }

    fn send_request<W: Write>(&mut self, req: Request, writer: &mut W) {
        match write_request(writer, &req) {
            Ok(()) => self.stats.mapping_requests += 1,
            // Fire-and-forget: a dead writer will surface on the next read
            Err(e) => warn!("Failed to send {req:?}: {e}"),
        }
    }

    /// Record a thread's current identity after a lifecycle or name change.
    fn forward_thread(&mut self, id: ThreadId) {
        let Some(ctx) = self.session.threads().get(id) else {
            return;
        };
        let (name, alive) = (ctx.name.clone(), ctx.alive);
        self.stats.absorb_sink_error(self.sink.record_thread(id, &name, alive).err());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::sink::{KnownEntities, MemorySink, Record};
    use spyglass_wire::{read_request, write_message};
    use std::io::Cursor;

    /// Dispatcher with a completed handshake and an empty MemorySink
    /// (apart from the persisted `session_id` property).
    fn active_dispatcher() -> Dispatcher<MemorySink> {
        let mut dispatcher = Dispatcher::new(Session::new(), MemorySink::new()).unwrap();
        dispatcher.handshake(&mut Cursor::new([7u8; 16])).unwrap();
        dispatcher
    }

    /// Feed a scripted message sequence through the dispatcher, returning the
    /// requests it wrote and the outcome that ended the loop.
    fn run_script<S: Sink>(
        dispatcher: &mut Dispatcher<S>,
        messages: &[Message],
    ) -> (Vec<Request>, LoopOutcome) {
        let mut stream = Vec::new();
        for msg in messages {
            write_message(&mut stream, msg).unwrap();
        }
        let mut reader = Cursor::new(stream);
        let mut writer = Vec::new();

        let outcome = loop {
            match dispatcher.process_next(&mut reader, &mut writer) {
                LoopOutcome::Progressed => {}
                done => break done,
            }
        };

        let mut requests = Vec::new();
        let mut req_reader = Cursor::new(writer);
        while let Some(req) = read_request(&mut req_reader).unwrap() {
            requests.push(req);
        }
        (requests, outcome)
    }

    fn enter(thread: u32, function: u32, ts: u64) -> Message {
        Message::EnterFunction { thread_id: thread, function_id: function, timestamp_ns: ts }
    }

    fn leave(thread: u32, function: u32, ts: u64) -> Message {
        Message::LeaveFunction { thread_id: thread, function_id: function, timestamp_ns: ts }
    }

    #[test]
    fn test_paired_enter_leave_emits_one_timing_fact() {
        let mut dispatcher = active_dispatcher();
        let (_, outcome) = run_script(&mut dispatcher, &[enter(1, 7, 100), leave(1, 7, 450)]);

        assert_eq!(outcome, LoopOutcome::Ended);
        let facts: Vec<_> = dispatcher.sink().timing_facts().collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].function_id, FunctionId(7));
        assert_eq!(facts[0].elapsed_ns, 350);
    }

    #[test]
    fn test_nested_calls_emit_inner_then_outer() {
        let mut dispatcher = active_dispatcher();
        run_script(
            &mut dispatcher,
            &[enter(1, 1, 0), enter(1, 2, 5), leave(1, 2, 9), leave(1, 1, 12)],
        );

        let facts: Vec<_> = dispatcher.sink().timing_facts().collect();
        assert_eq!(facts.len(), 2);
        assert_eq!((facts[0].function_id, facts[0].elapsed_ns), (FunctionId(2), 4));
        assert_eq!((facts[1].function_id, facts[1].elapsed_ns), (FunctionId(1), 12));
    }

    #[test]
    fn test_leave_on_empty_stack_is_dropped_silently() {
        let mut dispatcher = active_dispatcher();
        let (_, outcome) = run_script(&mut dispatcher, &[leave(1, 3, 50)]);

        assert_eq!(outcome, LoopOutcome::Ended);
        assert_eq!(dispatcher.sink().timing_facts().count(), 0);
        assert_eq!(dispatcher.stats.empty_stack_drops, 1);
    }

    #[test]
    fn test_mismatched_pop_is_counted_but_still_timed() {
        let mut dispatcher = active_dispatcher();
        run_script(&mut dispatcher, &[enter(1, 1, 10), leave(1, 2, 30)]);

        assert_eq!(dispatcher.stats.mismatched_pops, 1);
        let facts: Vec<_> = dispatcher.sink().timing_facts().collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].function_id, FunctionId(2));
    }

    #[test]
    fn test_tail_call_times_like_a_leave() {
        let mut dispatcher = active_dispatcher();
        run_script(
            &mut dispatcher,
            &[enter(1, 4, 100), Message::TailCall { thread_id: 1, function_id: 4, timestamp_ns: 160 }],
        );
        let facts: Vec<_> = dispatcher.sink().timing_facts().collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].elapsed_ns, 60);
    }

    #[test]
    fn test_map_function_is_idempotent_at_the_sink() {
        let mut dispatcher = active_dispatcher();
        let mapping = Message::MapFunction {
            function_id: 5,
            class_id: 2,
            name: "Tick".to_string(),
            signature: "void Tick()".to_string(),
            is_native: false,
        };
        run_script(&mut dispatcher, &[mapping.clone(), mapping]);

        assert_eq!(dispatcher.sink().mapped_functions().count(), 1);
    }

    #[test]
    fn test_map_function_cascades_unknown_class_request_once() {
        let mut dispatcher = active_dispatcher();
        let mapping = Message::MapFunction {
            function_id: 5,
            class_id: 9,
            name: "Tick".to_string(),
            signature: String::new(),
            is_native: false,
        };
        let (requests, _) = run_script(&mut dispatcher, &[mapping.clone(), mapping]);

        let class_requests: Vec<_> =
            requests.iter().filter(|r| **r == Request::GetClassMapping(9)).collect();
        assert_eq!(class_requests.len(), 1);
    }

    #[test]
    fn test_sample_requests_each_unknown_function_exactly_once() {
        let mut dispatcher = active_dispatcher();
        let (requests, _) = run_script(
            &mut dispatcher,
            &[
                Message::Sample { thread_id: 1, timestamp_ns: 10, frames: vec![5, 6] },
                Message::Sample { thread_id: 1, timestamp_ns: 20, frames: vec![5, 7] },
            ],
        );

        let for_five =
            requests.iter().filter(|r| **r == Request::GetFunctionMapping(5)).count();
        assert_eq!(for_five, 1);
        // 5, 6, 7 requested once each, plus one thread mapping
        assert_eq!(requests.len(), 4);
        assert_eq!(dispatcher.stats.samples, 2);
    }

    #[test]
    fn test_keep_alive_and_generation_sizes_never_write_to_the_sink() {
        let mut dispatcher = active_dispatcher();
        run_script(
            &mut dispatcher,
            &[Message::KeepAlive, Message::GenerationSizes { sizes: vec![100, 200, 300] }],
        );

        // Only the handshake's session_id property is in the sink
        assert_eq!(dispatcher.sink().records.len(), 1);
        assert!(matches!(dispatcher.sink().records[0], Record::Property { .. }));
        assert_eq!(dispatcher.stats.keep_alives, 1);
        assert_eq!(dispatcher.stats.generation_snapshots, 1);
    }

    #[test]
    fn test_create_then_destroy_transitions_liveness() {
        let mut dispatcher = active_dispatcher();
        run_script(
            &mut dispatcher,
            &[
                Message::CreateThread { thread_id: 42 },
                Message::NameThread { thread_id: 42, name: "worker-0".to_string() },
                Message::DestroyThread { thread_id: 42 },
            ],
        );

        let threads: Vec<_> = dispatcher.sink().thread_records().collect();
        assert_eq!(threads.len(), 3);
        assert_eq!(threads[0], (ThreadId(42), "", true));
        assert_eq!(threads[1], (ThreadId(42), "worker-0", true));
        // Name set before death is retained
        assert_eq!(threads[2], (ThreadId(42), "worker-0", false));
    }

    #[test]
    fn test_unknown_tag_terminates_without_reading_further() {
        let mut dispatcher = active_dispatcher();
        let mut stream = Vec::new();
        write_message(&mut stream, &Message::KeepAlive).unwrap();
        stream.push(0xEE); // poison
        write_message(&mut stream, &enter(1, 1, 0)).unwrap();

        let mut reader = Cursor::new(stream);
        let mut writer = Vec::new();
        assert_eq!(dispatcher.process_next(&mut reader, &mut writer), LoopOutcome::Progressed);
        assert_eq!(dispatcher.process_next(&mut reader, &mut writer), LoopOutcome::Ended);
        assert_eq!(dispatcher.session().state(), SessionState::Terminated);
        // Terminated sessions never touch the stream again
        assert_eq!(dispatcher.process_next(&mut reader, &mut writer), LoopOutcome::Ended);
        assert_eq!(dispatcher.stats.messages, 1);
    }

    #[test]
    fn test_mid_frame_eof_is_a_transport_failure() {
        let mut dispatcher = active_dispatcher();
        let mut stream = Vec::new();
        write_message(&mut stream, &enter(1, 1, 0)).unwrap();
        stream.truncate(stream.len() - 3);

        let mut reader = Cursor::new(stream);
        let mut writer = Vec::new();
        assert_eq!(
            dispatcher.process_next(&mut reader, &mut writer),
            LoopOutcome::TransportFailed
        );
    }

    #[test]
    fn test_allocation_and_gc_forward_without_cache_gating() {
        let mut dispatcher = active_dispatcher();
        run_script(
            &mut dispatcher,
            &[
                Message::ObjectAllocated { class_id: 3, size: 128, function_id: 9, timestamp_ns: 7 },
                Message::GarbageCollected { generation: 1, function_id: 9, timestamp_ns: 8 },
            ],
        );

        assert_eq!(dispatcher.stats.allocations, 1);
        assert_eq!(dispatcher.stats.gcs, 1);
        // No mapping requests for the unresolved class/function ids in them
        assert_eq!(dispatcher.stats.mapping_requests, 0);
        assert_eq!(dispatcher.sink().fact_count(), 2);
    }

    /// Sink that refuses every write, simulating a dead store.
    struct RejectingSink;

    impl Sink for RejectingSink {
        fn load_known(&mut self) -> Result<KnownEntities> {
            Ok(KnownEntities::default())
        }
        fn put_property(&mut self, _: &str, _: &str) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_function(&mut self, _: &FunctionInfo) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_class(&mut self, _: &ClassInfo) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_counter(&mut self, _: &crate::domain::Counter) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_thread(&mut self, _: ThreadId, _: &str, _: bool) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_timing(&mut self, _: &crate::domain::TimingFact) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_sample(&mut self, _: &SampleFact) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_counter_value(&mut self, _: &CounterFact) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_allocation(&mut self, _: &AllocationFact) -> Result<()> {
            anyhow::bail!("storage offline")
        }
        fn record_gc(&mut self, _: &GcFact) -> Result<()> {
            anyhow::bail!("storage offline")
        }
    }

    #[test]
    fn test_sink_rejections_are_counted_not_fatal() {
        let mut dispatcher = Dispatcher::new(Session::new(), RejectingSink).unwrap();
        dispatcher.handshake(&mut Cursor::new([7u8; 16])).unwrap();

        let (_, outcome) = run_script(
            &mut dispatcher,
            &[
                enter(1, 7, 100),
                leave(1, 7, 450),
                Message::ObjectAllocated { class_id: 1, size: 64, function_id: 7, timestamp_ns: 500 },
            ],
        );

        // Decoding rode out every rejection and still reached a clean end
        assert_eq!(outcome, LoopOutcome::Ended);
        assert_eq!(dispatcher.stats.timing_facts, 1);
        assert_eq!(dispatcher.stats.allocations, 1);
        assert_eq!(dispatcher.stats.sink_errors, 2);
    }

    #[test]
    fn test_perf_counter_creates_placeholder_and_requests_name() {
        let mut dispatcher = active_dispatcher();
        let (requests, _) = run_script(
            &mut dispatcher,
            &[
                Message::PerfCounter { counter_id: 4, timestamp_ns: 1, value: -3 },
                Message::PerfCounter { counter_id: 4, timestamp_ns: 2, value: 5 },
                Message::CounterName { counter_id: 4, name: "gc/pauses".to_string() },
            ],
        );

        assert_eq!(requests, vec![Request::GetCounterName(4)]);
        assert_eq!(dispatcher.stats.counter_facts, 2);
        let named: Vec<_> = dispatcher
            .sink()
            .records
            .iter()
            .filter(|r| matches!(r, Record::Counter(c) if c.name == "gc/pauses"))
            .collect();
        assert_eq!(named.len(), 1);
    }
}
