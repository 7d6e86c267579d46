use serde::Serialize;
use std::{fmt::Debug, future::Future};

use crate::{command::ControlCommand, slot::SlotId, world::RobotId};

pub mod log_sink;

/// One validated (or substituted) command, addressed to the robot a slot drives.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Actuation {
    pub slot: SlotId,
    pub robot: RobotId,
    pub command: ControlCommand,
}

/// Whatever turns commands into robot motion: a simulator, real robots, a log.
///
/// Each tick the scheduler hands over exactly one actuation per registered
/// slot, in registration order.
pub trait ActuationSink<E>
where
    E: Debug,
{
    fn actuate(&mut self, batch: Vec<Actuation>) -> impl Future<Output = Result<(), E>> + Send;

    // workaround for async Drop, to be replaced when std::future::AsyncDrop is stabilized
    fn close(self) -> impl Future<Output = Result<(), E>> + Send;
}
