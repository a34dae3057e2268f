use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use crate::error::AgentError;

/// One handler-level log line. Finer grained than the run history:
/// retries, routing decisions and approval outcomes all land here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub iteration: usize,
    pub state:     String,
    pub event:     String,
    pub data:      String,
    pub timestamp: DateTime<Utc>,
}

/// In-memory execution log of one run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self { Self::default() }

    pub fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_state(&self, state: &str) -> Vec<&TraceEntry> {
        self.entries.iter().filter(|e| e.state == state).collect()
    }

    /// Most recent entry with the given event name, e.g. `"ORACLE_EXHAUSTED"`.
    pub fn last_event(&self, event: &str) -> Option<&TraceEntry> {
        self.entries.iter().rev().find(|e| e.event == event)
    }

    /// Number of entries logged by each handler.
    pub fn state_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.state.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Milliseconds between the first and last entry.
    pub fn elapsed_ms(&self) -> i64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Write the JSON trace to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), AgentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::Persistence(e.to_string()))?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| AgentError::Persistence(e.to_string()))
    }

    /// Table of entries with the offset of each from the start of the run.
    pub fn print(&self) {
        let Some(start) = self.entries.first().map(|e| e.timestamp) else {
            println!("(empty trace)");
            return;
        };
        println!("\n{:>8} {:<5} {:<12} {:<20} {}", "+ms", "iter", "state", "event", "data");
        println!("{}", "─".repeat(80));
        for e in &self.entries {
            let offset = (e.timestamp - start).num_milliseconds();
            let data: String = e.data.chars().take(32).collect();
            println!("{:>8} {:<5} {:<12} {:<20} {}", offset, e.iteration, e.state, e.event, data);
        }
    }
}
