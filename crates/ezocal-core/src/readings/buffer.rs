//! Fixed-capacity reading history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ReadingSample;
use crate::devices::ProbeType;

/// Samples kept per probe type unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 100;

/// Summary over a probe's buffered history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub current: f64,
    pub count: usize,
}

/// Per-probe ring of recent samples, oldest evicted first.
///
/// Shared between the polling task (writer) and display code (reader).
pub struct ReadingBuffer {
    capacity: usize,
    samples: Mutex<HashMap<ProbeType, VecDeque<ReadingSample>>>,
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReadingBuffer {
    /// Create a buffer holding at most `capacity` samples per probe type
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProbeType, VecDeque<ReadingSample>>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a sample, evicting the oldest beyond capacity
    pub fn append(&self, probe_type: ProbeType, value: f64, timestamp: DateTime<Utc>) {
        self.push(ReadingSample::new(probe_type, value, timestamp));
    }

    pub fn push(&self, sample: ReadingSample) {
        let mut samples = self.lock();
        let ring = samples
            .entry(sample.probe_type)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        ring.push_back(sample);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Most recent sample
    pub fn latest(&self, probe_type: ProbeType) -> Option<ReadingSample> {
        self.lock().get(&probe_type).and_then(|r| r.back().cloned())
    }

    /// All buffered samples, oldest first
    pub fn history(&self, probe_type: ProbeType) -> Vec<ReadingSample> {
        self.lock()
            .get(&probe_type)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, probe_type: ProbeType) -> usize {
        self.lock().get(&probe_type).map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, probe_type: ProbeType) -> bool {
        self.len(probe_type) == 0
    }

    pub fn clear(&self, probe_type: ProbeType) {
        self.lock().remove(&probe_type);
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// Min/max/mean/current over the buffered history
    pub fn stats(&self, probe_type: ProbeType) -> Option<ReadingStats> {
        let samples = self.lock();
        let ring = samples.get(&probe_type)?;
        let current = ring.back()?.value;

        let (min, max, sum) = ring.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), s| (min.min(s.value), max.max(s.value), sum + s.value),
        );
        Some(ReadingStats {
            min,
            max,
            mean: sum / ring.len() as f64,
            current,
            count: ring.len(),
        })
    }
}
