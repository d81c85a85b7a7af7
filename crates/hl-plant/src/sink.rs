//! Where published plant states go.

use std::io::Write;

use crate::error::PlantResult;
use crate::state::PlantState;

/// Consumer of the once-per-cycle published state.
pub trait DataSink {
    fn publish(&mut self, state: &PlantState) -> PlantResult<()>;
}

/// Keeps every published state in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub states: Vec<PlantState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&PlantState> {
        self.states.last()
    }
}

impl DataSink for MemorySink {
    fn publish(&mut self, state: &PlantState) -> PlantResult<()> {
        self.states.push(state.clone());
        Ok(())
    }
}

/// Writes each state's flat record as one JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DataSink for JsonLinesSink<W> {
    fn publish(&mut self, state: &PlantState) -> PlantResult<()> {
        let line = serde_json::to_string(&state.to_record())?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}
