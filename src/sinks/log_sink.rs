use std::{convert::Infallible, future::Future};
use tracing::{debug, info};

use super::{ActuationSink, Actuation};

/// Sink that only logs what it is told to do. Useful to dry-run strategies
/// without anything on the other end.
#[derive(Default)]
pub struct LogSink {
    batches: u64,
    kicks: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActuationSink<Infallible> for LogSink {
    fn actuate(&mut self, batch: Vec<Actuation>) -> impl Future<Output = Result<(), Infallible>> + Send {
        self.batches += 1;
        for Actuation {
            slot,
            robot,
            command,
        } in batch
        {
            if command.kick {
                self.kicks += 1;
            }
            debug!(
                %slot,
                %robot,
                x = command.target_position.x,
                y = command.target_position.y,
                power = command.power,
                orientation = command.target_orientation,
                kick = command.kick,
                "actuate"
            );
        }
        async { Ok(()) }
    }

    async fn close(self) -> Result<(), Infallible> {
        info!(batches = self.batches, kicks = self.kicks, "log sink closed");
        Ok(())
    }
}
