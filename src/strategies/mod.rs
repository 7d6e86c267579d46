//! The contract team code implements, and the built-in sample strategies.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    math::Point2,
    slot::SlotId,
    telemetry::Telemetry,
    world::SnapshotVersion,
};

mod ball_chaser;
mod center;

pub use ball_chaser::{BallChaser, LazyKicker, LoggingChaser};
pub use center::GoToCenter;

/// A fault raised by strategy code, the equivalent of an uncaught exception.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn missing_key(key: &str) -> Self {
        Self(format!("KeyError: '{}'", key))
    }
}

/// One team's decision function.
///
/// `update` receives the strategy data built from a [`crate::world::WorldSnapshot`]
/// and returns a raw command mapping. The host never trusts that mapping: it
/// goes through [`crate::command::validate`] before reaching a robot.
pub trait Strategy: Send {
    fn team_name(&self) -> &str;

    fn snapshot_version(&self) -> SnapshotVersion {
        SnapshotVersion::Oriented
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError>;
}

/// What a strategy gets when it is loaded into a slot.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub slot: SlotId,
    /// owned by the slot, dropped with it
    pub telemetry: Telemetry,
}

/// Something a slot can (re)load a strategy from.
pub trait StrategySource: Send + Sync {
    fn label(&self) -> &str;

    fn load(&self, ctx: LoadContext) -> Result<Box<dyn Strategy>, StrategyError>;
}

/// A [`StrategySource`] backed by a closure.
pub struct FnSource<F> {
    label: String,
    load: F,
}

impl<F> StrategySource for FnSource<F>
where
    F: Fn(LoadContext) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&self, ctx: LoadContext) -> Result<Box<dyn Strategy>, StrategyError> {
        (self.load)(ctx)
    }
}

pub fn from_fn<F>(label: impl Into<String>, load: F) -> Arc<dyn StrategySource>
where
    F: Fn(LoadContext) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync + 'static,
{
    Arc::new(FnSource {
        label: label.into(),
        load,
    })
}

pub fn boxed<S: Strategy + 'static>(strategy: S) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(strategy))
}

pub const BUILTIN_NAMES: [&str; 4] = ["go_to_center", "ball_chaser", "logging_chaser", "lazy_kicker"];

/// Looks up one of the sample strategies by name.
pub fn builtin(name: &str) -> Option<Arc<dyn StrategySource>> {
    let source = match name {
        "go_to_center" => from_fn(name, |ctx| boxed(GoToCenter::new(ctx.telemetry))),
        "ball_chaser" => from_fn(name, |_| boxed(BallChaser)),
        "logging_chaser" => from_fn(name, |ctx| boxed(LoggingChaser::new(ctx.telemetry))),
        "lazy_kicker" => from_fn(name, |_| boxed(LazyKicker)),
        _ => return None,
    };
    Some(source)
}

/// Reads an `(x, y)` pair out of strategy data.
pub fn read_point(data: &Value, key: &str) -> Result<Point2, StrategyError> {
    let pair = data
        .get(key)
        .ok_or_else(|| StrategyError::missing_key(key))?;
    match pair.as_array().map(|a| a.as_slice()) {
        Some([x, y]) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok(Point2::new(x, y)),
            _ => Err(StrategyError::new(format!("TypeError: '{}' is not a pair of numbers", key))),
        },
        _ => Err(StrategyError::new(format!("TypeError: '{}' is not a pair of numbers", key))),
    }
}

pub fn read_number(data: &Value, key: &str) -> Result<f64, StrategyError> {
    data.get(key)
        .ok_or_else(|| StrategyError::missing_key(key))?
        .as_f64()
        .ok_or_else(|| StrategyError::new(format!("TypeError: '{}' is not a number", key)))
}
