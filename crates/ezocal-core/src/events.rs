//! Observer hooks
//!
//! Calibration actions and readings are published to subscribers as they
//! happen. Export and persistence layers hang off these hooks; nothing in
//! this crate reads the events back.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::calibration::CalibrationEvent;
use crate::readings::ReadingSample;

/// Receives session events. Both hooks default to doing nothing.
pub trait SessionObserver: Send + Sync {
    fn on_calibration_event(&self, _event: &CalibrationEvent) {}

    fn on_reading(&self, _sample: &ReadingSample) {}
}

/// Fan-out to every subscribed observer
#[derive(Clone, Default)]
pub struct EventHub {
    observers: Arc<RwLock<Vec<Arc<dyn SessionObserver>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn calibration(&self, event: &CalibrationEvent) {
        for observer in self.observers.read().unwrap_or_else(PoisonError::into_inner).iter() {
            observer.on_calibration_event(event);
        }
    }

    pub(crate) fn reading(&self, sample: &ReadingSample) {
        for observer in self.observers.read().unwrap_or_else(PoisonError::into_inner).iter() {
            observer.on_reading(sample);
        }
    }
}

/// In-memory observer keeping everything it is told, in order
#[derive(Default)]
pub struct EventLog {
    calibrations: Mutex<Vec<CalibrationEvent>>,
    readings: Mutex<Vec<ReadingSample>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calibrations(&self) -> Vec<CalibrationEvent> {
        self.calibrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn readings(&self) -> Vec<ReadingSample> {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionObserver for EventLog {
    fn on_calibration_event(&self, event: &CalibrationEvent) {
        self.calibrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn on_reading(&self, sample: &ReadingSample) {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample.clone());
    }
}
