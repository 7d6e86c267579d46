//! Test doubles for the scheduler's collaborators and for strategy code.

mod strategies;

pub use strategies::{Gate, GateOpener, Script, Scripted};

use std::{
    convert::Infallible,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    sinks::{ActuationSink, Actuation},
    telemetry::{TelemetryEntry, TelemetryError, TelemetrySink},
    IgnoreMutexErr,
};

/// Keeps every batch it receives. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<Actuation>>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<Actuation>> {
        self.batches.lock().unwrap_ignore_poison().clone()
    }

    pub fn last_batch(&self) -> Option<Vec<Actuation>> {
        self.batches.lock().unwrap_ignore_poison().last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ActuationSink<Infallible> for RecordingSink {
    fn actuate(&mut self, batch: Vec<Actuation>) -> impl Future<Output = Result<(), Infallible>> + Send {
        self.batches.lock().unwrap_ignore_poison().push(batch);
        async { Ok(()) }
    }

    async fn close(self) -> Result<(), Infallible> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    entries: Mutex<Vec<TelemetryEntry>>,
}

impl RecordingTelemetry {
    pub fn entries(&self) -> Vec<TelemetryEntry> {
        self.entries.lock().unwrap_ignore_poison().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, entry: TelemetryEntry) -> Result<(), TelemetryError> {
        self.entries.lock().unwrap_ignore_poison().push(entry);
        Ok(())
    }
}
