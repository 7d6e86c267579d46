//! Telemetry channel for strategy code.
//!
//! Each slot gets its own [`Telemetry`] handle when its strategy is loaded. The
//! sink behind it is optional and may fail; neither ever fails a tick.

use serde::Serialize;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::slot::SlotId;

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TelemetryLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TelemetryEntry {
    pub slot: SlotId,
    /// label of the strategy source the slot was loaded from
    pub source: String,
    pub level: TelemetryLevel,
    pub message: String,
}

#[derive(Error, Debug)]
#[error("telemetry sink unavailable: {0}")]
pub struct TelemetryError(pub String);

pub trait TelemetrySink: Send + Sync {
    fn record(&self, entry: TelemetryEntry) -> Result<(), TelemetryError>;
}

/// Slot-scoped handle given to strategy code.
#[derive(Clone)]
pub struct Telemetry {
    slot: SlotId,
    source: String,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("slot", &self.slot)
            .field("source", &self.source)
            .field("connected", &self.sink.is_some())
            .finish()
    }
}

impl Telemetry {
    pub fn new(slot: SlotId, source: impl Into<String>, sink: Option<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            slot,
            source: source.into(),
            sink,
        }
    }

    /// A handle that drops everything.
    pub fn disconnected(slot: SlotId) -> Self {
        Self::new(slot, "", None)
    }

    pub fn log(&self, level: TelemetryLevel, message: impl Into<String>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let entry = TelemetryEntry {
            slot: self.slot,
            source: self.source.clone(),
            level,
            message: message.into(),
        };
        if let Err(e) = sink.record(entry) {
            debug!(slot = %self.slot, "dropped telemetry entry: {}", e);
        }
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(TelemetryLevel::Trace, message)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(TelemetryLevel::Info, message)
    }
}

/// Re-emits strategy telemetry as `tracing` events.
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, entry: TelemetryEntry) -> Result<(), TelemetryError> {
        let TelemetryEntry {
            slot,
            source,
            level,
            message,
        } = entry;
        match level {
            TelemetryLevel::Trace => trace!(target: "crabe_arena::telemetry", %slot, %source, "{}", message),
            TelemetryLevel::Debug => debug!(target: "crabe_arena::telemetry", %slot, %source, "{}", message),
            TelemetryLevel::Info => info!(target: "crabe_arena::telemetry", %slot, %source, "{}", message),
            TelemetryLevel::Warn => warn!(target: "crabe_arena::telemetry", %slot, %source, "{}", message),
            TelemetryLevel::Error => error!(target: "crabe_arena::telemetry", %slot, %source, "{}", message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTelemetry;

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn record(&self, _entry: TelemetryEntry) -> Result<(), TelemetryError> {
            Err(TelemetryError("viewer not running".to_owned()))
        }
    }

    #[test]
    fn entries_are_tagged_with_the_slot() {
        let recorder = Arc::new(RecordingTelemetry::default());
        let telemetry = Telemetry::new(SlotId(3), "go_to_center", Some(recorder.clone()));
        telemetry.trace("hello");
        assert_eq!(
            recorder.entries(),
            vec![TelemetryEntry {
                slot: SlotId(3),
                source: "go_to_center".to_owned(),
                level: TelemetryLevel::Trace,
                message: "hello".to_owned(),
            }]
        );
    }

    #[test]
    fn failing_or_missing_sinks_are_ignored() {
        Telemetry::new(SlotId(0), "x", Some(Arc::new(BrokenSink))).info("lost");
        Telemetry::disconnected(SlotId(0)).info("lost too");
    }
}
