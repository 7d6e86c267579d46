#![deny(clippy::unwrap_used)]
#![allow(async_fn_in_trait)]
pub mod command;
pub mod config;
pub mod math;
pub mod scheduler;
pub mod sinks;
pub mod slot;
pub mod strategies;
pub mod telemetry;
pub mod testing;
pub mod world;

use std::{fmt::Debug, sync::LockResult, time::Duration};

use config::MatchConfig;
use scheduler::Scheduler;
use sinks::ActuationSink;
use tokio::{
    select,
    sync::oneshot::{self, Sender},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};
use world::WorldSource;

pub const CONTROL_PERIOD: Duration = Duration::from_millis(20);
pub const SLOT_DEADLINE: Duration = Duration::from_millis(10);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(2);

pub trait IgnoreMutexErr<T> {
    fn unwrap_ignore_poison(self) -> T;
}

impl<T> IgnoreMutexErr<T> for LockResult<T> {
    fn unwrap_ignore_poison(self) -> T {
        match self {
            Ok(r) => r,
            Err(poisoned) => {
                // Handle mutex poisoning
                let guard = poisoned.into_inner();
                warn!("mutex was poisoned, recovering from mutex poisoning");
                guard
            }
        }
    }
}

async fn match_loop<WE: Debug, SE: Debug>(
    scheduler: &mut Scheduler,
    world: &mut impl WorldSource<WE>,
    sink: &mut impl ActuationSink<SE>,
    period: Duration,
    max_ticks: Option<u64>,
) -> Result<(), SE> {
    let mut interval = tokio::time::interval(period);
    // a late tick is dropped rather than bunched up with the next one
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while max_ticks.map_or(true, |max| scheduler.ticks() < max) {
        interval.tick().await; // first tick ticks immediately that's why it's at the beginning

        let report = scheduler.run_tick(world, sink).await?;
        for entry in &report.entries {
            if let scheduler::Outcome::Substituted(reason) = &entry.outcome {
                // the slot already warned about the cause
                debug!(
                    tick = report.tick,
                    slot = %entry.slot,
                    team = %entry.team,
                    "no-op sent: {}",
                    reason
                );
            }
        }
    }
    Ok(())
}

/// Runs the match on its own task until `config.max_ticks` is reached or the
/// returned sender fires (or is dropped). Invocations in flight when the match
/// stops are abandoned and their results discarded. The scheduler is then shut
/// down; the task returns the number of ticks played.
pub fn launch_match<WE, SE>(
    mut scheduler: Scheduler,
    mut world: impl WorldSource<WE> + Send + 'static,
    mut sink: impl ActuationSink<SE> + Send + 'static,
    config: &MatchConfig,
) -> (Sender<()>, JoinHandle<Result<u64, SE>>)
where
    WE: Debug + Send + 'static,
    SE: Debug + Send + 'static,
{
    let (stop_sender, stop_receiver) = oneshot::channel();
    let period = config.tick_period();
    let max_ticks = config.max_ticks;
    let handle = tokio::spawn(async move {
        info!(slots = scheduler.entries().len(), ?period, "match started");
        let played = select! {
            r = match_loop(&mut scheduler, &mut world, &mut sink, period, max_ticks) => r,
            _ = stop_receiver => {
                info!("match received stop signal");
                Ok(())
            }
        };
        let ticks = scheduler.ticks();
        let closed = scheduler.shutdown(sink).await;
        if let Err(e) = &played {
            error!("match aborted by the actuation sink: {:?}", e);
        }
        played.and(closed).map(|_| ticks)
    });
    (stop_sender, handle)
}
