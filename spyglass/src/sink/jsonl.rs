//! JSON Lines export sink
//!
//! Writes one serde-serialized object per record, in arrival order. The
//! output is meant for offline analysis (jq, pandas, a later import step),
//! so each line is self-describing via its `kind` field.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{KnownEntities, Record, Sink};
use crate::domain::{
    AllocationFact, ClassInfo, Counter, CounterFact, FunctionInfo, GcFact, SampleFact, ThreadId,
    TimingFact,
};

pub struct JsonlSink<W: Write> {
    writer: W,
}

impl JsonlSink<BufWriter<File>> {
    /// Create (or truncate) the output file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create export file {}", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one record as a JSON line.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).context("Failed to serialize record")?;
        self.writer.write_all(b"\n").context("Failed to write export record")?;
        Ok(())
    }

    /// Flush buffered lines to the underlying writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush export file")?;
        Ok(())
    }
}

impl<W: Write> Sink for JsonlSink<W> {
    fn load_known(&mut self) -> Result<KnownEntities> {
        // Export-only sink: nothing to reload, every session starts cold
        Ok(KnownEntities::default())
    }

    fn put_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.append(&Record::Property { key: key.to_string(), value: value.to_string() })
    }

    fn record_function(&mut self, info: &FunctionInfo) -> Result<()> {
        self.append(&Record::Function(info.clone()))
    }

    fn record_class(&mut self, info: &ClassInfo) -> Result<()> {
        self.append(&Record::Class(info.clone()))
    }

    fn record_counter(&mut self, counter: &Counter) -> Result<()> {
        self.append(&Record::Counter(counter.clone()))
    }

    fn record_thread(&mut self, id: ThreadId, name: &str, alive: bool) -> Result<()> {
        self.append(&Record::Thread { thread_id: id, name: name.to_string(), alive })
    }

    fn record_timing(&mut self, fact: &TimingFact) -> Result<()> {
        self.append(&Record::Timing(*fact))
    }

    fn record_sample(&mut self, fact: &SampleFact) -> Result<()> {
        self.append(&Record::Sample(fact.clone()))
    }

    fn record_counter_value(&mut self, fact: &CounterFact) -> Result<()> {
        self.append(&Record::CounterValue(*fact))
    }

    fn record_allocation(&mut self, fact: &AllocationFact) -> Result<()> {
        self.append(&Record::Allocation(*fact))
    }

    fn record_gc(&mut self, fact: &GcFact) -> Result<()> {
        self.append(&Record::Gc(*fact))
    }
}
