//! Per-thread call-timing reconstruction (shadow stacks)
//!
//! The wire protocol cannot express call durations: it only reports when a
//! thread enters or leaves a function. Each thread therefore carries a shadow
//! stack of `(function, entry timestamp)` pairs, ordered by call nesting with
//! the most recent unmatched entry on top. A leave (or tail call) pops the
//! top and yields the elapsed time.
//!
//! Contexts live in an arena keyed by thread identifier. A context is created
//! on first reference from *any* event and survives the thread's death, so a
//! late-arriving leave still finds its stack; nothing is destroyed before
//! session teardown.
//!
//! ## Policy corners
//!
//! - A leave on an empty stack is expected when the session attached
//!   mid-call: it is dropped, no fact, no error.
//! - A popped entry whose function disagrees with the leave event means the
//!   stream desynchronized or dropped frames. The fact is still emitted
//!   (attributed to the event's function — the wire event is authoritative)
//!   and the mismatch is surfaced to the caller for diagnostics.

use std::collections::HashMap;

use crate::domain::{FunctionId, ThreadId, Timestamp, TimingFact};

/// One unmatched function entry on a thread's shadow stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    pub function: FunctionId,
    pub entered_at: Timestamp,
}

/// Everything known about one thread of the target
#[derive(Debug)]
pub struct ThreadContext {
    pub id: ThreadId,
    pub name: String,
    pub alive: bool,
    stack: Vec<StackEntry>,
}

impl ThreadContext {
    fn new(id: ThreadId) -> Self {
        Self { id, name: String::new(), alive: true, stack: Vec::new() }
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }
}

/// Result of matching a leave/tail-call event against the shadow stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome {
    /// Clean pop: entry and leave agreed on the function
    Timed(TimingFact),
    /// The fact was emitted, but the popped entry named a different function
    Mismatched { fact: TimingFact, popped: FunctionId },
    /// Nothing to pop — we attached mid-call; no fact
    EmptyStack,
}

/// Arena of thread contexts, owned exclusively by the session
#[derive(Debug, Default)]
pub struct ThreadArena {
    threads: HashMap<ThreadId, ThreadContext>,
}

impl ThreadArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a context exists for `id`. Returns `true` if this was the
    /// thread's first reference — the caller then owes the target a
    /// `GetThreadMapping` request so name and liveness get backfilled.
    pub fn touch(&mut self, id: ThreadId) -> bool {
        let mut created = false;
        self.threads.entry(id).or_insert_with(|| {
            created = true;
            ThreadContext::new(id)
        });
        created
    }

    /// Record a function entry. Mapping is not required: timing needs only
    /// the identifier, resolution can catch up later.
    pub fn push(&mut self, id: ThreadId, function: FunctionId, entered_at: Timestamp) {
        self.ctx_mut(id).stack.push(StackEntry { function, entered_at });
    }

    /// Match a leave/tail-call event against the top of the stack.
    pub fn pop(&mut self, id: ThreadId, function: FunctionId, left_at: Timestamp) -> PopOutcome {
        let ctx = self.ctx_mut(id);
        let Some(entry) = ctx.stack.pop() else {
            return PopOutcome::EmptyStack;
        };
        let fact = TimingFact {
            thread_id: id,
            function_id: function,
            elapsed_ns: left_at.elapsed_since(entry.entered_at),
        };
        if entry.function == function {
            PopOutcome::Timed(fact)
        } else {
            PopOutcome::Mismatched { fact, popped: entry.function }
        }
    }

    /// Flip the alive flag; the name stays as currently known.
    pub fn set_alive(&mut self, id: ThreadId, alive: bool) {
        self.ctx_mut(id).alive = alive;
    }

    /// Rename a thread. Liveness is untouched: only live threads get renamed.
    pub fn set_name(&mut self, id: ThreadId, name: &str) {
        self.ctx_mut(id).name = name.to_string();
    }

    /// Apply a full thread mapping (name and liveness together).
    pub fn observe_mapping(&mut self, id: ThreadId, name: &str, alive: bool) {
        let ctx = self.ctx_mut(id);
        ctx.name = name.to_string();
        ctx.alive = alive;
    }

    #[must_use]
    pub fn get(&self, id: ThreadId) -> Option<&ThreadContext> {
        self.threads.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    fn ctx_mut(&mut self, id: ThreadId) -> &mut ThreadContext {
        self.threads.entry(id).or_insert_with(|| ThreadContext::new(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: ThreadId = ThreadId(1);

    #[test]
    fn test_paired_enter_leave_times_the_call() {
        let mut arena = ThreadArena::new();
        arena.push(T1, FunctionId(7), Timestamp(100));
        let outcome = arena.pop(T1, FunctionId(7), Timestamp(350));
        assert_eq!(
            outcome,
            PopOutcome::Timed(TimingFact {
                thread_id: T1,
                function_id: FunctionId(7),
                elapsed_ns: 250,
            })
        );
    }

    #[test]
    fn test_nested_calls_unwind_inner_first() {
        let mut arena = ThreadArena::new();
        arena.push(T1, FunctionId(1), Timestamp(0));
        arena.push(T1, FunctionId(2), Timestamp(5));

        let inner = arena.pop(T1, FunctionId(2), Timestamp(9));
        let outer = arena.pop(T1, FunctionId(1), Timestamp(12));

        assert_eq!(
            inner,
            PopOutcome::Timed(TimingFact {
                thread_id: T1,
                function_id: FunctionId(2),
                elapsed_ns: 4,
            })
        );
        assert_eq!(
            outer,
            PopOutcome::Timed(TimingFact {
                thread_id: T1,
                function_id: FunctionId(1),
                elapsed_ns: 12,
            })
        );
    }

    #[test]
    fn test_leave_on_empty_stack_is_dropped() {
        let mut arena = ThreadArena::new();
        assert_eq!(arena.pop(T1, FunctionId(3), Timestamp(50)), PopOutcome::EmptyStack);
    }

    #[test]
    fn test_mismatched_pop_is_surfaced_not_swallowed() {
        let mut arena = ThreadArena::new();
        arena.push(T1, FunctionId(1), Timestamp(10));
        let outcome = arena.pop(T1, FunctionId(2), Timestamp(30));
        match outcome {
            PopOutcome::Mismatched { fact, popped } => {
                assert_eq!(popped, FunctionId(1));
                // The event's function wins attribution
                assert_eq!(fact.function_id, FunctionId(2));
                assert_eq!(fact.elapsed_ns, 20);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_stacks_are_per_thread() {
        let mut arena = ThreadArena::new();
        arena.push(ThreadId(1), FunctionId(1), Timestamp(0));
        arena.push(ThreadId(2), FunctionId(2), Timestamp(0));
        assert_eq!(arena.get(ThreadId(1)).unwrap().stack_depth(), 1);
        assert_eq!(arena.get(ThreadId(2)).unwrap().stack_depth(), 1);
        // Popping thread 2 leaves thread 1's stack alone
        arena.pop(ThreadId(2), FunctionId(2), Timestamp(5));
        assert_eq!(arena.get(ThreadId(1)).unwrap().stack_depth(), 1);
    }

    #[test]
    fn test_touch_reports_first_reference_only() {
        let mut arena = ThreadArena::new();
        assert!(arena.touch(T1));
        assert!(!arena.touch(T1));
    }

    #[test]
    fn test_dead_thread_retains_name_and_context() {
        let mut arena = ThreadArena::new();
        arena.touch(T1);
        arena.set_name(T1, "worker-0");
        arena.set_alive(T1, false);
        let ctx = arena.get(T1).unwrap();
        assert_eq!(ctx.name, "worker-0");
        assert!(!ctx.alive);
    }

    #[test]
    fn test_new_context_starts_alive_and_unnamed() {
        let mut arena = ThreadArena::new();
        arena.touch(T1);
        let ctx = arena.get(T1).unwrap();
        assert!(ctx.alive);
        assert_eq!(ctx.name, "");
    }
}
