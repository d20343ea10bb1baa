//! Channel-backed sink for running the session loop on its own thread
//!
//! The session loop blocks on the socket; whatever consumes its records
//! (export writer, UI) usually lives on another thread. This sink sends each
//! [`Record`] over a bounded crossbeam channel, giving the consumer natural
//! backpressure against a bursty target.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use super::{KnownEntities, Record, Sink};
use crate::domain::{
    AllocationFact, ClassInfo, Counter, CounterFact, FunctionInfo, GcFact, SampleFact, ThreadId,
    TimingFact,
};

pub struct ChannelSink {
    tx: Sender<Record>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: Sender<Record>) -> Self {
        Self { tx }
    }

    fn send(&self, record: Record) -> Result<()> {
        // Blocking send: a full channel slows the session loop down rather
        // than dropping facts. A disconnected receiver is a real error.
        self.tx.send(record).context("Record consumer hung up")
    }
}

impl Sink for ChannelSink {
    fn load_known(&mut self) -> Result<KnownEntities> {
        // The consumer side has no store to reload from
        Ok(KnownEntities::default())
    }

    fn put_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.send(Record::Property { key: key.to_string(), value: value.to_string() })
    }

    fn record_function(&mut self, info: &FunctionInfo) -> Result<()> {
        self.send(Record::Function(info.clone()))
    }

    fn record_class(&mut self, info: &ClassInfo) -> Result<()> {
        self.send(Record::Class(info.clone()))
    }

    fn record_counter(&mut self, counter: &Counter) -> Result<()> {
        self.send(Record::Counter(counter.clone()))
    }

    fn record_thread(&mut self, id: ThreadId, name: &str, alive: bool) -> Result<()> {
        self.send(Record::Thread { thread_id: id, name: name.to_string(), alive })
    }

    fn record_timing(&mut self, fact: &TimingFact) -> Result<()> {
        self.send(Record::Timing(*fact))
    }

    fn record_sample(&mut self, fact: &SampleFact) -> Result<()> {
        self.send(Record::Sample(fact.clone()))
    }

    fn record_counter_value(&mut self, fact: &CounterFact) -> Result<()> {
        self.send(Record::CounterValue(*fact))
    }

    fn record_allocation(&mut self, fact: &AllocationFact) -> Result<()> {
        self.send(Record::Allocation(*fact))
    }

    fn record_gc(&mut self, fact: &GcFact) -> Result<()> {
        self.send(Record::Gc(*fact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionId, ThreadId};
    use crossbeam_channel::bounded;

    #[test]
    fn test_records_arrive_in_order() {
        let (tx, rx) = bounded(8);
        let mut sink = ChannelSink::new(tx);
        sink.put_property("port", "9000").unwrap();
        sink.record_timing(&TimingFact {
            thread_id: ThreadId(1),
            function_id: FunctionId(7),
            elapsed_ns: 42,
        })
        .unwrap();
        drop(sink);

        let records: Vec<Record> = rx.iter().collect();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Record::Property { .. }));
        assert!(matches!(records[1], Record::Timing(_)));
    }

    #[test]
    fn test_disconnected_receiver_is_an_error() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        assert!(sink.record_thread(ThreadId(1), "main", true).is_err());
    }
}
