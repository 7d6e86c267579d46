mod field;
mod snapshot;

// EXPORTS
pub use field::{FieldError, FieldState};
pub use snapshot::{SnapshotVersion, WorldSnapshot};

use serde::Serialize;
use std::{fmt::Debug, future::Future};

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TeamColor {
    Blue,
    Yellow,
}

impl TeamColor {
    pub fn opposite(&self) -> Self {
        match self {
            TeamColor::Blue => TeamColor::Yellow,
            TeamColor::Yellow => TeamColor::Blue,
        }
    }
}

/// One robot on the field, identified by its team color and its number in the team.
#[derive(Serialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RobotId {
    pub color: TeamColor,
    pub number: u8,
}

impl RobotId {
    pub fn new(color: TeamColor, number: u8) -> Self {
        Self { color, number }
    }
}

impl std::fmt::Display for RobotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.color, self.number)
    }
}

/// Where the scheduler takes its world state from.
///
/// A source hands out one snapshot per robot per tick, already computed from
/// that robot's point of view (it is `my_position`, its teammate is the friend).
pub trait WorldSource<E>
where
    E: Debug,
{
    fn snapshot_for(&mut self, robot: RobotId) -> impl Future<Output = Result<WorldSnapshot, E>> + Send;
}
