use serde_json::{json, Value};

use super::{read_number, Strategy, StrategyError};
use crate::telemetry::Telemetry;

/// Heads for (50, 50) at full power and reports its orientation.
pub struct GoToCenter {
    telemetry: Telemetry,
}

impl GoToCenter {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}

impl Strategy for GoToCenter {
    fn team_name(&self) -> &str {
        "vers centre"
    }

    fn update(&mut self, data: &Value) -> Result<Value, StrategyError> {
        // faults like a KeyError when fed legacy data
        let orientation = read_number(data, "my_orientation")?;
        self.telemetry.info(format!("my_orientation = {}", orientation));
        Ok(json!({
            "target_position": [50, 50],
            "power": 255,
            "target_orientation": 180,
            "kick": false,
        }))
    }
}
