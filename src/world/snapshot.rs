use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::math::Point2;

/// The per-tick, per-robot view of the field handed to a strategy.
///
/// All coordinates are in the global field frame (origin at the field center);
/// "my" and "friend" are relative to the robot the snapshot was made for.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct WorldSnapshot {
    pub my_position: Point2,
    /// degrees, in (-180, 180]. Some sources don't track orientation.
    pub my_orientation: Option<f64>,
    pub friend_position: Point2,
    pub enemy_positions: Vec<Point2>,
    pub ball_position: Point2,
}

/// Which shape of strategy data a strategy was written against.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SnapshotVersion {
    /// positions only, `my_orientation` is never sent
    Legacy,
    /// positions plus `my_orientation` whenever it is known
    #[default]
    Oriented,
}

fn pair(p: Point2) -> Value {
    json!([p.x, p.y])
}

impl WorldSnapshot {
    /// Builds the mapping passed to `Strategy::update`.
    ///
    /// Keys: `my_position`, `my_orientation` (oriented only), `friend_position`,
    /// `enemy1_position`, `enemy2_position`, ... and `ball_position`.
    pub fn to_strategy_data(&self, version: SnapshotVersion) -> Value {
        let mut data = Map::new();
        data.insert("my_position".to_owned(), pair(self.my_position));
        if let (SnapshotVersion::Oriented, Some(orientation)) = (version, self.my_orientation) {
            data.insert("my_orientation".to_owned(), json!(orientation));
        }
        data.insert("friend_position".to_owned(), pair(self.friend_position));
        for (i, enemy) in self.enemy_positions.iter().enumerate() {
            data.insert(format!("enemy{}_position", i + 1), pair(*enemy));
        }
        data.insert("ball_position".to_owned(), pair(self.ball_position));
        Value::Object(data)
    }
}
