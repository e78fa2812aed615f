//! Stress helpers for writebehind.
//!
//! These drive a buffer from many producer threads at once so tests can
//! check that nothing is lost or duplicated under contention.

use crate::fixtures::Event;
use std::collections::HashSet;
use std::thread;
use writebehind_core::WriteBuffer;

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of producer threads.
    pub producers: usize,
    /// Records each producer appends.
    pub records_per_producer: usize,
    /// Records per `add_list` call; 1 means plain `add`.
    pub list_size: usize,
}

impl StressConfig {
    /// Total records a run appends.
    pub fn total(&self) -> usize {
        self.producers * self.records_per_producer
    }
}

/// Appends `config.total()` events from `config.producers` threads.
///
/// Producer `p` appends ids `p * records_per_producer ..` in order, so every
/// id in the run is unique. Returns the number of records appended.
pub fn run_producers(buffer: &WriteBuffer<Event>, config: &StressConfig) -> usize {
    let per = config.records_per_producer;
    let list_size = config.list_size.max(1);

    thread::scope(|scope| {
        for producer in 0..config.producers {
            scope.spawn(move || {
                let first = (producer * per) as u64;
                let ids: Vec<u64> = (first..first + per as u64).collect();
                for chunk in ids.chunks(list_size) {
                    if list_size == 1 {
                        buffer.add(Event::new(chunk[0], format!("p{producer}")));
                    } else {
                        buffer.add_list(
                            chunk
                                .iter()
                                .map(|id| Event::new(*id, format!("p{producer}")))
                                .collect(),
                        );
                    }
                }
            });
        }
    });

    config.total()
}

/// Outcome of comparing delivered ids against the expected range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAudit {
    /// Ids in `0..expected` never delivered.
    pub missing: Vec<u64>,
    /// Ids delivered more than once.
    pub duplicated: Vec<u64>,
}

impl DeliveryAudit {
    /// Checks that `delivered` holds every id in `0..expected` exactly once.
    pub fn check(expected: usize, delivered: impl IntoIterator<Item = u64>) -> Self {
        let mut seen = HashSet::with_capacity(expected);
        let mut duplicated = Vec::new();
        for id in delivered {
            if !seen.insert(id) {
                duplicated.push(id);
            }
        }
        let missing = (0..expected as u64).filter(|id| !seen.contains(id)).collect();
        Self {
            missing,
            duplicated,
        }
    }

    /// Returns true if nothing is missing or duplicated.
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.duplicated.is_empty()
    }
}
