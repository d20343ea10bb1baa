//! # Spyglass - Remote Profiling-Session Client
//!
//! Spyglass attaches over TCP to a live, instrumented process (the target)
//! and decodes its proprietary binary event stream: function entry/exit,
//! thread lifecycle, sampled call stacks, allocations, garbage collections,
//! and named performance counters. From that stream it reconstructs facts the
//! wire protocol cannot express directly — chiefly elapsed time per function
//! call — and forwards structured records to a persistence collaborator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Instrumented Target Process                 │
//! └───────────────────────┬──────────────▲───────────────────────┘
//!                         │ event stream │ mapping requests,
//!                         ▼              │ control commands
//! ┌──────────────────────────────────────┴───────────────────────┐
//! │                     Spyglass (This Crate)                    │
//! │                                                              │
//! │  ┌────────────┐    ┌──────────────┐    ┌─────────────────┐   │
//! │  │ Wire Codec │───▶│   Event      │───▶│      Sink       │   │
//! │  │ (spyglass- │    │  Dispatcher  │    │ (jsonl/channel/ │   │
//! │  │   wire)    │    └──┬────────┬──┘    │     memory)     │   │
//! │  └────────────┘       │        │       └─────────────────┘   │
//! │                       ▼        ▼                             │
//! │            ┌───────────────┐ ┌────────────────┐              │
//! │            │ Metadata      │ │ Shadow Stacks  │              │
//! │            │ Cache         │ │ (call timing)  │              │
//! │            └───────────────┘ └────────────────┘              │
//! │                                                              │
//! │  Session Manager gates everything until the 16-byte          │
//! │  handshake identifier checks out.                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`client`]: TCP attach, handshake, the blocking poll-until-ended loop,
//!   and the fire-and-forget target control commands
//! - [`dispatcher`]: decode one message, route it, forward resulting facts
//! - [`session`]: handshake state machine and thread-context ownership
//! - [`cache`]: read-through metadata cache with the lazy mapping-request
//!   sub-protocol (one outstanding request per unknown identifier)
//! - [`shadow_stack`]: per-thread stacks of unmatched function entries,
//!   turning paired enter/leave events into elapsed-time facts
//! - [`sink`]: the persistence boundary and its memory/JSONL/channel
//!   implementations
//! - [`domain`]: newtype identifiers, mapped entities, fact types, errors
//! - [`cli`]: command-line argument parsing
//!
//! ## Key Concepts
//!
//! - **Shadow stack**: per-thread LIFO of `(function, entry timestamp)`;
//!   a leave event pops it to compute the call's duration
//! - **Lazy mapping**: events reference entities by bare integer id; names
//!   arrive only after the client asks, so unknown ids trigger exactly one
//!   request each and timing never waits on resolution
//! - **Session identity**: a 16-byte identifier fixed at first contact;
//!   every later connection to the same target must present it unchanged

pub mod cache;
pub mod cli;
pub mod client;
pub mod dispatcher;
pub mod domain;
pub mod session;
pub mod shadow_stack;
pub mod sink;
