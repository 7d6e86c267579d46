//! Strategy slots.
//!
//! A slot owns one loaded strategy and the robot-independent bookkeeping around
//! it. Strategy code only ever runs on blocking threads, under a deadline, with
//! panics caught; whatever it does is turned into a typed result here.

use serde::Serialize;
use serde_json::Value;
use std::{
    any::Any,
    fmt::{self, Debug},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    command::{validate, ControlCommand, ValidationError},
    strategies::{LoadContext, Strategy, StrategyError, StrategySource},
    telemetry::{Telemetry, TelemetrySink},
    world::{SnapshotVersion, WorldSnapshot},
    DEFAULT_LOAD_TIMEOUT,
};

/// Identity of a slot inside a match. Team names may repeat, slot ids don't.
#[derive(Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// `Loaded -> Active <-> Faulted`, `Disabled` is terminal.
#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotState {
    Loaded,
    Active,
    Faulted,
    Disabled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("loading took longer than {0:?}")]
    Timeout(Duration),
    #[error("strategy panicked while loading: {0}")]
    Panicked(String),
    #[error("strategy failed to load: {0}")]
    Failed(StrategyError),
    #[error("strategy has no team name")]
    MissingTeamName,
    #[error("loading task was aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error("no command within {0:?}")]
    Timeout(Duration),
    #[error("strategy fault: {0}")]
    StrategyFault(String),
    #[error("invalid command: {0}")]
    InvalidCommand(ValidationError),
    #[error("slot is {0:?}, not invoked")]
    NotActive(SlotState),
    #[error("a previous invocation is still running")]
    StillRunning,
}

impl InvocationError {
    /// Whether this error takes the slot out of the match.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InvocationError::Timeout(_) | InvocationError::StrategyFault(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResetError {
    #[error("only faulted slots can be reset, slot is {0:?}")]
    NotFaulted(SlotState),
    #[error("the timed out invocation is still running")]
    StillRunning,
    #[error("couldn't reload the strategy: {0}")]
    Reload(LoadError),
    #[error("no such slot: {0}")]
    UnknownSlot(SlotId),
}

#[derive(Clone)]
pub struct SlotOptions {
    pub load_timeout: Duration,
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            telemetry: None,
        }
    }
}

type Invocation = (
    Box<dyn Strategy>,
    std::thread::Result<Result<Value, StrategyError>>,
);

struct Loaded {
    strategy: Box<dyn Strategy>,
    team_name: String,
    version: SnapshotVersion,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "strategy panicked".to_owned()
    }
}

/// Runs `source.load` off the runtime, bounded by `options.load_timeout`.
/// Anything the strategy does while loading, including reading its own team
/// name, happens on the blocking thread.
async fn load_strategy(
    id: SlotId,
    source: &Arc<dyn StrategySource>,
    options: &SlotOptions,
) -> Result<Loaded, LoadError> {
    let ctx = LoadContext {
        slot: id,
        telemetry: Telemetry::new(id, source.label(), options.telemetry.clone()),
    };
    let source = source.clone();
    let handle = tokio::task::spawn_blocking(move || {
        panic::catch_unwind(AssertUnwindSafe(|| {
            source.load(ctx).map(|strategy| Loaded {
                team_name: strategy.team_name().to_owned(),
                version: strategy.snapshot_version(),
                strategy,
            })
        }))
    });

    let loaded = match timeout(options.load_timeout, handle).await {
        Err(_) => return Err(LoadError::Timeout(options.load_timeout)),
        Ok(Err(e)) => return Err(LoadError::Aborted(e.to_string())),
        Ok(Ok(Err(payload))) => return Err(LoadError::Panicked(panic_message(payload))),
        Ok(Ok(Ok(Err(e)))) => return Err(LoadError::Failed(e)),
        Ok(Ok(Ok(Ok(loaded)))) => loaded,
    };
    if loaded.team_name.trim().is_empty() {
        return Err(LoadError::MissingTeamName);
    }
    Ok(loaded)
}

pub struct StrategySlot {
    id: SlotId,
    team_name: String,
    source: Arc<dyn StrategySource>,
    options: SlotOptions,
    state: SlotState,
    version: SnapshotVersion,
    /// `None` while an invocation holds it
    strategy: Option<Box<dyn Strategy>>,
    /// an invocation we stopped waiting for
    pending: Option<JoinHandle<Invocation>>,
    last_fault: Option<String>,
}

impl Debug for StrategySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySlot")
            .field("id", &self.id)
            .field("team_name", &self.team_name)
            .field("source", &self.source.label())
            .field("state", &self.state)
            .field("in_flight", &self.pending.is_some())
            .finish()
    }
}

impl StrategySlot {
    pub async fn load(
        id: SlotId,
        source: Arc<dyn StrategySource>,
        options: SlotOptions,
    ) -> Result<Self, LoadError> {
        let loaded = load_strategy(id, &source, &options).await?;
        info!(
            %id,
            team = %loaded.team_name,
            source = source.label(),
            "strategy loaded"
        );
        Ok(Self {
            id,
            team_name: loaded.team_name,
            source,
            options,
            state: SlotState::Loaded,
            version: loaded.version,
            strategy: Some(loaded.strategy),
            pending: None,
            last_fault: None,
        })
    }

    /// A slot whose strategy could not be loaded. It keeps its place in the
    /// match but is never invoked.
    pub fn disabled(
        id: SlotId,
        source: Arc<dyn StrategySource>,
        options: SlotOptions,
        error: &LoadError,
    ) -> Self {
        warn!(%id, source = source.label(), "slot disabled: {}", error);
        Self {
            id,
            team_name: source.label().to_owned(),
            source,
            options,
            state: SlotState::Disabled,
            version: SnapshotVersion::default(),
            strategy: None,
            pending: None,
            last_fault: Some(error.to_string()),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// The name the strategy declared, or its source label if it never loaded.
    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn source_label(&self) -> &str {
        self.source.label()
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Why the slot was last faulted or disabled.
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    /// `Loaded -> Active`. Returns whether the slot is now active.
    pub fn warm(&mut self) -> bool {
        if self.state == SlotState::Loaded {
            debug!(id = %self.id, team = %self.team_name, "slot active");
            self.state = SlotState::Active;
        }
        self.state == SlotState::Active
    }

    fn fault(&mut self, error: InvocationError) -> InvocationError {
        warn!(id = %self.id, team = %self.team_name, "slot faulted: {}", error);
        self.state = SlotState::Faulted;
        self.last_fault = Some(error.to_string());
        error
    }

    /// Takes back the strategy from an abandoned invocation once it is done.
    /// Its result is discarded.
    async fn reclaim_finished(&mut self) {
        if !self.pending.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        if let Some(handle) = self.pending.take() {
            match handle.await {
                Ok((strategy, _)) => {
                    debug!(id = %self.id, "reclaimed strategy from abandoned invocation");
                    self.strategy = Some(strategy);
                }
                Err(e) => warn!(id = %self.id, "abandoned invocation was lost: {}", e),
            }
        }
    }

    /// Calls the strategy with `snapshot`, waiting at most `deadline`.
    ///
    /// Timeouts and faults move the slot to `Faulted`. An invalid command is
    /// reported but leaves the slot `Active`. A slot that isn't `Active` is not
    /// called at all.
    pub async fn invoke(
        &mut self,
        snapshot: &WorldSnapshot,
        deadline: Duration,
    ) -> Result<ControlCommand, InvocationError> {
        if self.state != SlotState::Active {
            return Err(InvocationError::NotActive(self.state));
        }
        self.reclaim_finished().await;
        let Some(mut strategy) = self.strategy.take() else {
            return Err(InvocationError::StillRunning);
        };

        let data = snapshot.to_strategy_data(self.version);
        let handle = self.pending.insert(tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.update(&data)));
            (strategy, outcome)
        }));

        let waited = timeout(deadline, handle).await;
        let joined = match waited {
            // the thread keeps running, `pending` keeps its handle
            Err(_) => return Err(self.fault(InvocationError::Timeout(deadline))),
            Ok(joined) => joined,
        };
        self.pending = None;

        let (strategy, outcome) = match joined {
            Ok(invocation) => invocation,
            Err(e) => {
                return Err(self.fault(InvocationError::StrategyFault(format!(
                    "invocation aborted: {}",
                    e
                ))))
            }
        };
        self.strategy = Some(strategy);

        match outcome {
            Err(payload) => Err(self.fault(InvocationError::StrategyFault(panic_message(
                payload,
            )))),
            Ok(Err(e)) => Err(self.fault(InvocationError::StrategyFault(e.0))),
            Ok(Ok(raw)) => validate(&raw).map_err(|e| {
                warn!(id = %self.id, team = %self.team_name, "invalid command: {}", e);
                InvocationError::InvalidCommand(e)
            }),
        }
    }

    /// `Faulted -> Active`. A strategy lost to an aborted invocation is loaded
    /// again from its source.
    pub async fn reset(&mut self) -> Result<(), ResetError> {
        if self.state != SlotState::Faulted {
            return Err(ResetError::NotFaulted(self.state));
        }
        self.reclaim_finished().await;
        if self.pending.is_some() {
            return Err(ResetError::StillRunning);
        }
        if self.strategy.is_none() {
            let loaded = load_strategy(self.id, &self.source, &self.options)
                .await
                .map_err(ResetError::Reload)?;
            self.team_name = loaded.team_name;
            self.version = loaded.version;
            self.strategy = Some(loaded.strategy);
        }
        info!(id = %self.id, team = %self.team_name, "slot reset");
        self.state = SlotState::Active;
        self.last_fault = None;
        Ok(())
    }

    /// Drops the strategy and whatever it owns. An invocation still running is
    /// left to finish on its own and its result is discarded.
    pub fn unload(self) {
        debug!(
            id = %self.id,
            team = %self.team_name,
            in_flight = self.pending.is_some(),
            "slot unloaded"
        );
    }
}
