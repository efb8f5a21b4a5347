//! Append-only event log

use crate::types::{LoggedEvent, SettlementEvent};

/// In-memory tail of the committed event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LoggedEvent>,
}

impl EventLog {
    /// Rebuild from events loaded from storage (ordered by sequence)
    pub fn from_events(events: Vec<LoggedEvent>) -> Self {
        Self { events }
    }

    /// Sequence number the next event will receive
    pub fn next_seq(&self) -> u64 {
        self.events.last().map(|e| e.seq + 1).unwrap_or(1)
    }

    /// Assign sequence numbers without appending
    pub fn stage(&self, events: Vec<SettlementEvent>, at: u64) -> Vec<LoggedEvent> {
        let first = self.next_seq();
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| LoggedEvent {
                seq: first + i as u64,
                at,
                event,
            })
            .collect()
    }

    /// Append staged events; they must continue the sequence
    pub fn append(&mut self, staged: Vec<LoggedEvent>) {
        debug_assert!(staged
            .first()
            .map(|e| e.seq == self.next_seq())
            .unwrap_or(true));
        self.events.extend(staged);
    }

    /// Events with `seq > after`
    pub fn since(&self, after: u64) -> &[LoggedEvent] {
        let start = self.events.partition_point(|e| e.seq <= after);
        &self.events[start..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
