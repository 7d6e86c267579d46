use std::{
    future::Future,
    sync::{Arc, Mutex},
};
use thiserror::Error;

use super::{RobotId, TeamColor, WorldSnapshot, WorldSource};
use crate::{
    math::{normalize_degrees, Point2},
    IgnoreMutexErr,
};

/// kickoff distance from the center lines
const KICKOFF_OFFSET: f64 = 25.;

#[derive(Clone, Copy, Debug, PartialEq)]
struct RobotState {
    id: RobotId,
    pos: Point2,
    orientation: Option<f64>,
}

#[derive(Default)]
struct Inner {
    robots: Vec<RobotState>,
    ball: Point2,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("robot {0} is not on the field")]
    UnknownRobot(RobotId),
    #[error("robot {0} has no teammate on the field")]
    NoTeammate(RobotId),
    #[error("robot {0} has fewer than two opponents on the field")]
    MissingEnemies(RobotId),
}

/// In-memory world state, shared between whoever updates it (a simulator, a
/// vision pipeline) and the scheduler reading it. Cloning is cheap and every
/// clone sees the same field.
#[derive(Clone, Default)]
pub struct FieldState {
    inner: Arc<Mutex<Inner>>,
}

impl FieldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two robots per team aligned at (±25, ±25), blue on the negative x side,
    /// facing the opposite goal, ball at the center.
    pub fn kickoff() -> Self {
        let field = Self::new();
        for (color, x, orientation) in [
            (TeamColor::Blue, -KICKOFF_OFFSET, 0.),
            (TeamColor::Yellow, KICKOFF_OFFSET, 180.),
        ] {
            field.set_robot(
                RobotId::new(color, 1),
                Point2::new(x, KICKOFF_OFFSET),
                Some(orientation),
            );
            field.set_robot(
                RobotId::new(color, 2),
                Point2::new(x, -KICKOFF_OFFSET),
                Some(orientation),
            );
        }
        field.set_ball(Point2::zero());
        field
    }

    /// Adds the robot or moves it if it's already on the field.
    pub fn set_robot(&self, id: RobotId, pos: Point2, orientation: Option<f64>) {
        let orientation = orientation.map(normalize_degrees);
        let mut inner = self.inner.lock().unwrap_ignore_poison();
        match inner.robots.iter_mut().find(|r| r.id == id) {
            Some(robot) => {
                robot.pos = pos;
                robot.orientation = orientation;
            }
            None => inner.robots.push(RobotState {
                id,
                pos,
                orientation,
            }),
        }
    }

    pub fn remove_robot(&self, id: RobotId) {
        self.inner
            .lock()
            .unwrap_ignore_poison()
            .robots
            .retain(|r| r.id != id);
    }

    pub fn set_ball(&self, pos: Point2) {
        self.inner.lock().unwrap_ignore_poison().ball = pos;
    }

    pub fn robots(&self) -> Vec<RobotId> {
        let mut ids: Vec<RobotId> = self
            .inner
            .lock()
            .unwrap_ignore_poison()
            .robots
            .iter()
            .map(|r| r.id)
            .collect();
        ids.sort_by_key(|id| (id.color == TeamColor::Yellow, id.number));
        ids
    }

    pub fn snapshot(&self, robot: RobotId) -> Result<WorldSnapshot, FieldError> {
        let inner = self.inner.lock().unwrap_ignore_poison();
        let me = inner
            .robots
            .iter()
            .find(|r| r.id == robot)
            .ok_or(FieldError::UnknownRobot(robot))?;
        let friend = inner
            .robots
            .iter()
            .filter(|r| r.id.color == robot.color && r.id != robot)
            .min_by_key(|r| r.id.number)
            .ok_or(FieldError::NoTeammate(robot))?;
        let mut enemies: Vec<&RobotState> = inner
            .robots
            .iter()
            .filter(|r| r.id.color == robot.color.opposite())
            .collect();
        if enemies.len() < 2 {
            return Err(FieldError::MissingEnemies(robot));
        }
        enemies.sort_by_key(|r| r.id.number);

        Ok(WorldSnapshot {
            my_position: me.pos,
            my_orientation: me.orientation,
            friend_position: friend.pos,
            enemy_positions: enemies.into_iter().map(|r| r.pos).collect(),
            ball_position: inner.ball,
        })
    }
}

impl WorldSource<FieldError> for FieldState {
    fn snapshot_for(
        &mut self,
        robot: RobotId,
    ) -> impl Future<Output = Result<WorldSnapshot, FieldError>> + Send {
        let snapshot = self.snapshot(robot);
        async move { snapshot }
    }
}
