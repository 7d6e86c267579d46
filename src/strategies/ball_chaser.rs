use rand::Rng;
use serde_json::{json, Value};

use super::{read_point, Strategy, StrategyError};
use crate::{telemetry::Telemetry, world::SnapshotVersion};

/// enough power so robots don't get stuck in the middle
fn random_power() -> u8 {
    rand::thread_rng().gen_range(150..=255)
}

/// Runs at the ball and kicks whenever it can.
pub struct BallChaser;

impl Strategy for BallChaser {
    fn team_name(&self) -> &str {
        "vers balle"
    }

    fn snapshot_version(&self) -> SnapshotVersion {
        SnapshotVersion::Legacy
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError> {
        let ball = read_point(data, "ball_position")?;
        Ok(json!({
            "target_position": [ball.x, ball.y],
            "power": random_power(),
            "target_orientation": 20,
            "kick": true,
        }))
    }
}

/// Chases the ball without kicking, logging a line on every update.
pub struct LoggingChaser {
    telemetry: Telemetry,
}

impl LoggingChaser {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}

impl Strategy for LoggingChaser {
    fn team_name(&self) -> &str {
        "do logs"
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError> {
        self.telemetry.trace("update called");
        let ball = read_point(data, "ball_position")?;
        Ok(json!({
            "target_position": [ball.x, ball.y],
            "power": random_power(),
            "target_orientation": 90,
            "kick": false,
        }))
    }
}

/// Chases the ball and never says whether to kick.
pub struct LazyKicker;

impl Strategy for LazyKicker {
    fn team_name(&self) -> &str {
        "hi there!"
    }

    fn snapshot_version(&self) -> SnapshotVersion {
        SnapshotVersion::Legacy
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError> {
        let ball = read_point(data, "ball_position")?;
        Ok(json!({
            "target_position": [ball.x, ball.y],
            "power": random_power(),
            "target_orientation": 90,
        }))
    }
}
