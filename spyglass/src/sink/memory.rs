//! In-memory sink for tests and seeding experiments

use anyhow::Result;

use super::{KnownEntities, Record, Sink};
use crate::domain::{
    AllocationFact, ClassInfo, Counter, CounterFact, FunctionInfo, GcFact, SampleFact, ThreadId,
    TimingFact,
};

/// Records every notification in arrival order and serves a pre-seeded set of
/// known entities. The accessors exist for test assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    seeded: KnownEntities,
    pub records: Vec<Record>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `load_known` serves the given entities, simulating a
    /// store populated by a previous session.
    #[must_use]
    pub fn seeded_with(seeded: KnownEntities) -> Self {
        Self { seeded, records: Vec::new() }
    }

    pub fn timing_facts(&self) -> impl Iterator<Item = &TimingFact> {
        self.records.iter().filter_map(|r| match r {
            Record::Timing(fact) => Some(fact),
            _ => None,
        })
    }

    pub fn mapped_functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.records.iter().filter_map(|r| match r {
            Record::Function(info) => Some(info),
            _ => None,
        })
    }

    pub fn thread_records(&self) -> impl Iterator<Item = (ThreadId, &str, bool)> {
        self.records.iter().filter_map(|r| match r {
            Record::Thread { thread_id, name, alive } => Some((*thread_id, name.as_str(), *alive)),
            _ => None,
        })
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records.iter().filter_map(|r| match r {
            Record::Property { key, value } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
    }

    /// Count of fact records only (mappings, threads, and properties excluded)
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Record::Timing(_)
                        | Record::Sample(_)
                        | Record::CounterValue(_)
                        | Record::Allocation(_)
                        | Record::Gc(_)
                )
            })
            .count()
    }
}

impl Sink for MemorySink {
    fn load_known(&mut self) -> Result<KnownEntities> {
        Ok(self.seeded.clone())
    }

    fn put_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.records.push(Record::Property { key: key.to_string(), value: value.to_string() });
        Ok(())
    }

    fn record_function(&mut self, info: &FunctionInfo) -> Result<()> {
        self.records.push(Record::Function(info.clone()));
        Ok(())
    }

    fn record_class(&mut self, info: &ClassInfo) -> Result<()> {
        self.records.push(Record::Class(info.clone()));
        Ok(())
    }

    fn record_counter(&mut self, counter: &Counter) -> Result<()> {
        self.records.push(Record::Counter(counter.clone()));
        Ok(())
    }

    fn record_thread(&mut self, id: ThreadId, name: &str, alive: bool) -> Result<()> {
        self.records.push(Record::Thread { thread_id: id, name: name.to_string(), alive });
        Ok(())
    }

    fn record_timing(&mut self, fact: &TimingFact) -> Result<()> {
        self.records.push(Record::Timing(*fact));
        Ok(())
    }

    fn record_sample(&mut self, fact: &SampleFact) -> Result<()> {
        self.records.push(Record::Sample(fact.clone()));
        Ok(())
    }

    fn record_counter_value(&mut self, fact: &CounterFact) -> Result<()> {
        self.records.push(Record::CounterValue(*fact));
        Ok(())
    }

    fn record_allocation(&mut self, fact: &AllocationFact) -> Result<()> {
        self.records.push(Record::Allocation(*fact));
        Ok(())
    }

    fn record_gc(&mut self, fact: &GcFact) -> Result<()> {
        self.records.push(Record::Gc(*fact));
        Ok(())
    }
}
