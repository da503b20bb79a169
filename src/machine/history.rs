//! Bounded record of applied transitions.

use crate::core::Transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single transition that changed the active path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord<S, T> {
    /// The transition that fired
    pub transition: Transition<S, T>,
    /// States exited, leaf first
    pub exited: Vec<S>,
    /// States entered, outermost first
    pub entered: Vec<S>,
    /// When the switch completed
    pub timestamp: DateTime<Utc>,
}

/// Most recent transitions of a machine, oldest first.
///
/// Holds at most `limit` records; recording beyond the limit drops the
/// oldest record. A limit of zero disables recording.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use hierarch::core::Transition;
/// use hierarch::machine::{TransitionHistory, TransitionRecord};
///
/// let mut history = TransitionHistory::new(1);
/// for (from, to) in [("idle", "busy"), ("busy", "idle")] {
///     history.record(TransitionRecord {
///         transition: Transition::new(from, "toggle", to),
///         exited: vec![from],
///         entered: vec![to],
///         timestamp: Utc::now(),
///     });
/// }
///
/// assert_eq!(history.len(), 1);
/// assert_eq!(history.get_path(), vec![&"busy", &"idle"]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionHistory<S, T> {
    limit: usize,
    records: VecDeque<TransitionRecord<S, T>>,
}

impl<S, T> TransitionHistory<S, T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            records: VecDeque::new(),
        }
    }

    pub fn record(&mut self, record: TransitionRecord<S, T>) {
        if self.limit == 0 {
            return;
        }
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &TransitionRecord<S, T>> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord<S, T>> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Source of the oldest record followed by the target of every record.
    pub fn get_path(&self) -> Vec<&S> {
        let mut path = Vec::new();
        if let Some(first) = self.records.front() {
            path.push(&first.transition.from);
        }
        for record in &self.records {
            path.push(&record.transition.to);
        }
        path
    }

    /// Time between the oldest and the newest record.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }
}
