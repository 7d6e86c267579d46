//! Tick scheduler.
//!
//! Each tick: one snapshot per slot from the world source, every active slot
//! invoked concurrently under the slot deadline, then exactly one actuation per
//! slot handed to the sink in registration order.

use futures_util::future::join_all;
use serde::Serialize;
use std::{fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    command::ControlCommand,
    config::MatchConfig,
    math::Point2,
    sinks::{ActuationSink, Actuation},
    slot::{InvocationError, LoadError, ResetError, SlotId, SlotOptions, SlotState, StrategySlot},
    strategies::StrategySource,
    telemetry::TelemetrySink,
    world::{RobotId, WorldSnapshot, WorldSource},
};

/// A registered team: its slot and the robot it drives.
#[derive(Debug)]
pub struct TeamEntry {
    robot: RobotId,
    slot: StrategySlot,
    /// where the robot was last seen, used to hold it in place
    last_position: Point2,
    last_orientation: Option<f64>,
}

impl TeamEntry {
    pub fn id(&self) -> SlotId {
        self.slot.id()
    }

    pub fn name(&self) -> &str {
        self.slot.team_name()
    }

    pub fn robot(&self) -> RobotId {
        self.robot
    }

    pub fn slot(&self) -> &StrategySlot {
        &self.slot
    }

    fn no_op(&self) -> ControlCommand {
        ControlCommand::no_op(self.last_position, self.last_orientation)
    }

    fn actuation(&self, command: ControlCommand) -> Actuation {
        Actuation {
            slot: self.id(),
            robot: self.robot,
            command,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegisterError {
    #[error("{slot} registered but disabled: {error}")]
    Disabled { slot: SlotId, error: LoadError },
    #[error("robot {robot} is already driven by {slot}")]
    RobotTaken { robot: RobotId, slot: SlotId },
}

/// What happened to one slot during a tick.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum Outcome {
    /// the strategy's command went to the sink
    Forwarded,
    /// the strategy was called but its answer was replaced by a no-op
    Substituted(String),
    /// the slot was not called
    Skipped(SlotState),
    /// the world source had nothing for this robot
    NoSnapshot(String),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EntryReport {
    pub slot: SlotId,
    pub team: String,
    pub robot: RobotId,
    pub command: ControlCommand,
    pub outcome: Outcome,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// in registration order
    pub entries: Vec<EntryReport>,
}

impl TickReport {
    pub fn entry(&self, slot: SlotId) -> Option<&EntryReport> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    pub fn forwarded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == Outcome::Forwarded)
            .count()
    }
}

pub struct Scheduler {
    entries: Vec<TeamEntry>,
    slot_deadline: Duration,
    options: SlotOptions,
    tick: u64,
}

impl Scheduler {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            entries: Vec::new(),
            slot_deadline: config.slot_deadline(),
            options: SlotOptions {
                load_timeout: config.load_timeout(),
                telemetry: None,
            },
            tick: 0,
        }
    }

    /// Telemetry sink handed to strategies loaded from now on.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.options.telemetry = Some(sink);
        self
    }

    /// Loads `source` into a new slot driving `robot`.
    ///
    /// A strategy that fails to load still takes a slot, disabled, so its robot
    /// keeps receiving no-ops; the load error is returned alongside its id.
    pub async fn register(
        &mut self,
        source: Arc<dyn StrategySource>,
        robot: RobotId,
    ) -> Result<SlotId, RegisterError> {
        if let Some(entry) = self.entries.iter().find(|e| e.robot == robot) {
            return Err(RegisterError::RobotTaken {
                robot,
                slot: entry.id(),
            });
        }
        let id = SlotId(self.entries.len());
        let (slot, error) = match StrategySlot::load(id, source.clone(), self.options.clone()).await {
            Ok(slot) => (slot, None),
            Err(error) => {
                let slot = StrategySlot::disabled(id, source, self.options.clone(), &error);
                (slot, Some(error))
            }
        };
        self.entries.push(TeamEntry {
            robot,
            slot,
            last_position: Point2::zero(),
            last_orientation: None,
        });
        match error {
            None => Ok(id),
            Some(error) => Err(RegisterError::Disabled { slot: id, error }),
        }
    }

    pub fn entries(&self) -> &[TeamEntry] {
        &self.entries
    }

    pub fn slot(&self, id: SlotId) -> Option<&StrategySlot> {
        self.entries.get(id.0).map(|e| &e.slot)
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Moves every freshly loaded slot to `Active`.
    pub fn warm_all(&mut self) {
        for entry in &mut self.entries {
            entry.slot.warm();
        }
    }

    /// Operator reset of a faulted slot. It takes part again from the next tick.
    pub async fn reset_slot(&mut self, id: SlotId) -> Result<(), ResetError> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(ResetError::UnknownSlot(id))?;
        entry.slot.reset().await
    }

    /// Runs one tick.
    ///
    /// A slot that times out or faults never holds up the others: each one is
    /// waited on for at most the slot deadline, all of them at the same time.
    /// Only a sink error fails the tick.
    pub async fn run_tick<WE: Debug, SE: Debug>(
        &mut self,
        world: &mut impl WorldSource<WE>,
        sink: &mut impl ActuationSink<SE>,
    ) -> Result<TickReport, SE> {
        self.tick += 1;
        let tick = self.tick;

        let mut snapshots: Vec<Result<WorldSnapshot, String>> = Vec::with_capacity(self.entries.len());
        for entry in &mut self.entries {
            entry.slot.warm();
            let snapshot = match world.snapshot_for(entry.robot).await {
                Ok(snapshot) => {
                    entry.last_position = snapshot.my_position;
                    entry.last_orientation = snapshot.my_orientation;
                    Ok(snapshot)
                }
                Err(e) => {
                    warn!(tick, robot = %entry.robot, "no snapshot: {:?}", e);
                    Err(format!("{:?}", e))
                }
            };
            snapshots.push(snapshot);
        }

        let deadline = self.slot_deadline;
        let results = join_all(self.entries.iter_mut().zip(snapshots.iter()).map(
            |(entry, snapshot)| async move {
                match snapshot {
                    Ok(snapshot) if entry.slot.state() == SlotState::Active => {
                        Some(entry.slot.invoke(snapshot, deadline).await)
                    }
                    _ => None,
                }
            },
        ))
        .await;

        let mut batch = Vec::with_capacity(self.entries.len());
        let mut reports = Vec::with_capacity(self.entries.len());
        for ((entry, snapshot), result) in self.entries.iter().zip(snapshots).zip(results) {
            let (command, outcome) = match (snapshot, result) {
                (Err(e), _) => (entry.no_op(), Outcome::NoSnapshot(e)),
                (Ok(_), None) => (entry.no_op(), Outcome::Skipped(entry.slot.state())),
                (Ok(_), Some(Ok(command))) => (command, Outcome::Forwarded),
                (Ok(_), Some(Err(e))) => {
                    if let InvocationError::NotActive(state) = e {
                        (entry.no_op(), Outcome::Skipped(state))
                    } else {
                        (entry.no_op(), Outcome::Substituted(e.to_string()))
                    }
                }
            };
            batch.push(entry.actuation(command));
            reports.push(EntryReport {
                slot: entry.id(),
                team: entry.name().to_owned(),
                robot: entry.robot,
                command,
                outcome,
            });
        }

        let report = TickReport {
            tick,
            entries: reports,
        };
        debug!(
            tick,
            slots = report.entries.len(),
            forwarded = report.forwarded(),
            "tick done"
        );
        sink.actuate(batch).await?;
        Ok(report)
    }

    /// Stops every robot, closes the sink and unloads every slot.
    pub async fn shutdown<SE: Debug>(self, mut sink: impl ActuationSink<SE>) -> Result<(), SE> {
        let batch = self
            .entries
            .iter()
            .map(|e| e.actuation(e.no_op()))
            .collect();
        let stopped = sink.actuate(batch).await;
        let closed = sink.close().await;
        for entry in self.entries {
            entry.slot.unload();
        }
        info!(ticks = self.tick, "match shut down");
        stopped.and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        strategies::{boxed, from_fn},
        testing::{Gate, RecordingSink, Script, Scripted},
        world::{FieldState, TeamColor},
    };
    use serde_json::{json, Value};
    use std::{sync::atomic::Ordering, time::Instant};

    fn config() -> MatchConfig {
        MatchConfig {
            tick_period_ms: 200,
            slot_deadline_ms: 50,
            ..Default::default()
        }
    }

    fn command(x: f64) -> Value {
        json!({
            "target_position": [x, 0.0],
            "power": 100,
            "target_orientation": 0,
        })
    }

    fn source(strategy: Scripted) -> Arc<dyn StrategySource> {
        from_fn("scripted", move |_| boxed(strategy.clone()))
    }

    fn blue(n: u8) -> RobotId {
        RobotId::new(TeamColor::Blue, n)
    }

    fn yellow(n: u8) -> RobotId {
        RobotId::new(TeamColor::Yellow, n)
    }

    #[tokio::test]
    async fn slow_slot_does_not_delay_or_reorder_the_others() {
        let mut scheduler = Scheduler::new(&config());
        let slow = Scripted::new("slow", Script::Sleep(Duration::from_millis(30), command(1.)));
        let fast = Scripted::new("fast", Script::Reply(command(2.)));
        scheduler
            .register(source(slow), blue(1))
            .await
            .expect("loads");
        scheduler
            .register(source(fast), yellow(1))
            .await
            .expect("loads");

        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");

        let batch = sink.last_batch().expect("one batch sent");
        let targets: Vec<f64> = batch.iter().map(|a| a.command.target_position.x).collect();
        assert_eq!(targets, vec![1., 2.]);
        assert_eq!(batch[0].robot, blue(1));
        assert_eq!(batch[1].robot, yellow(1));
        assert_eq!(report.forwarded(), 2);
        assert_eq!(report.tick, 1);
    }

    #[tokio::test]
    async fn stalled_slot_is_faulted_and_left_out_next_tick() {
        let gate = Gate::default();
        let _release = gate.opener();
        let mut scheduler = Scheduler::new(&config());
        let stalled = Scripted::new("stalled", Script::Stall(gate.clone(), command(1.)));
        let calls = stalled.calls();
        let steady = Scripted::new("steady", Script::Reply(command(2.)));
        let stalled_id = scheduler
            .register(source(stalled), blue(1))
            .await
            .expect("loads");
        let steady_id = scheduler
            .register(source(steady), blue(2))
            .await
            .expect("loads");

        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        let started = Instant::now();
        let first = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        // waits out the stalled slot's deadline and nothing more
        assert!(started.elapsed() < config().slot_deadline() + Duration::from_millis(40));
        let stalled_report = first.entry(stalled_id).expect("reported");
        assert!(matches!(stalled_report.outcome, Outcome::Substituted(_)));
        assert!(stalled_report.command.is_no_op());
        assert_eq!(stalled_report.command.target_position, Point2::new(-25., 25.));
        assert_eq!(first.entry(steady_id).map(|e| &e.outcome), Some(&Outcome::Forwarded));

        let second = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert_eq!(
            second.entry(stalled_id).map(|e| &e.outcome),
            Some(&Outcome::Skipped(SlotState::Faulted))
        );
        assert_eq!(second.forwarded(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.batches().len(), 2);
        assert!(sink.batches().iter().all(|b| b.len() == 2));
    }

    #[tokio::test]
    async fn failed_loads_keep_a_disabled_slot() {
        let mut scheduler = Scheduler::new(&config());
        let broken = from_fn("broken", |_| panic!("import error"));
        let err = scheduler
            .register(broken, blue(1))
            .await
            .expect_err("load panics");
        let RegisterError::Disabled { slot, .. } = err else {
            panic!("expected a disabled slot, got {err:?}");
        };
        assert_eq!(
            scheduler.slot(slot).map(|s| s.state()),
            Some(SlotState::Disabled)
        );

        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert_eq!(
            report.entries[0].outcome,
            Outcome::Skipped(SlotState::Disabled)
        );
        assert_eq!(report.entries[0].team, "broken");
    }

    #[tokio::test]
    async fn a_robot_is_driven_by_one_slot_only() {
        let mut scheduler = Scheduler::new(&config());
        let strategy = Scripted::new("same", Script::Reply(command(0.)));
        let first = scheduler
            .register(source(strategy.clone()), blue(1))
            .await
            .expect("loads");
        assert_eq!(
            scheduler.register(source(strategy.clone()), blue(1)).await,
            Err(RegisterError::RobotTaken {
                robot: blue(1),
                slot: first
            })
        );
        // same team name on another robot is fine
        let second = scheduler
            .register(source(strategy), blue(2))
            .await
            .expect("loads");
        assert_ne!(first, second);
        assert_eq!(scheduler.entries().len(), 2);
        assert_eq!(scheduler.entries()[0].name(), scheduler.entries()[1].name());
    }

    #[tokio::test]
    async fn missing_robot_gets_a_no_op() {
        let mut scheduler = Scheduler::new(&config());
        let strategy = Scripted::new("ghost", Script::Reply(command(9.)));
        let calls = strategy.calls();
        scheduler
            .register(source(strategy), blue(7))
            .await
            .expect("loads");
        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert!(matches!(report.entries[0].outcome, Outcome::NoSnapshot(_)));
        assert!(report.entries[0].command.is_no_op());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn incomplete_field_is_not_blamed_on_the_strategy() {
        let mut scheduler = Scheduler::new(&config());
        let strategy = Scripted::new("needs both enemies", Script::Reply(command(3.)));
        let seen = strategy.seen();
        let id = scheduler
            .register(source(strategy), blue(1))
            .await
            .expect("loads");
        let mut world = FieldState::kickoff();
        world.remove_robot(yellow(2));
        let mut sink = RecordingSink::default();

        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert!(matches!(report.entries[0].outcome, Outcome::NoSnapshot(_)));
        assert!(report.entries[0].command.is_no_op());
        assert_eq!(
            scheduler.slot(id).map(|s| s.state()),
            Some(SlotState::Active)
        );

        world.set_robot(yellow(2), Point2::new(25., -25.), Some(180.));
        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert_eq!(report.entries[0].outcome, Outcome::Forwarded);
        let seen = seen.lock().expect("not poisoned");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].get("enemy2_position").is_some());
    }

    #[tokio::test]
    async fn reset_brings_a_faulted_slot_back() {
        let mut scheduler = Scheduler::new(&config());
        let flaky = Scripted::new("flaky", Script::Fault("ZeroDivisionError".to_owned()));
        let calls = flaky.calls();
        let id = scheduler.register(source(flaky), blue(1)).await.expect("loads");
        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert_eq!(
            scheduler.slot(id).map(|s| s.state()),
            Some(SlotState::Faulted)
        );
        assert_eq!(
            scheduler.slot(id).and_then(|s| s.last_fault()),
            Some("strategy fault: ZeroDivisionError")
        );

        scheduler.reset_slot(id).await.expect("slot resets");
        assert_eq!(
            scheduler.slot(id).map(|s| s.state()),
            Some(SlotState::Active)
        );
        assert_eq!(
            scheduler.reset_slot(SlotId(42)).await,
            Err(ResetError::UnknownSlot(SlotId(42)))
        );

        // the same strategy instance is called again, and faults again
        let report = scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert!(matches!(report.entries[0].outcome, Outcome::Substituted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_every_robot_and_closes_the_sink() {
        let mut scheduler = Scheduler::new(&config());
        scheduler
            .register(source(Scripted::new("a", Script::Reply(command(5.)))), blue(1))
            .await
            .expect("loads");
        let mut world = FieldState::kickoff();
        let mut sink = RecordingSink::default();
        scheduler
            .run_tick(&mut world, &mut sink)
            .await
            .expect("sink never fails");
        assert_eq!(scheduler.ticks(), 1);

        scheduler
            .shutdown(sink.clone())
            .await
            .expect("sink never fails");
        assert!(sink.is_closed());
        let last = sink.last_batch().expect("stop batch sent");
        assert_eq!(last.len(), 1);
        assert!(last[0].command.is_no_op());
        assert_eq!(last[0].command.target_position, Point2::new(-25., 25.));
    }
}
