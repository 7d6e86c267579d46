//! Command model.
//!
//! Strategies hand back a raw mapping (`serde_json::Value`); nothing reaches an
//! actuation sink before going through [`validate`].

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::math::{normalize_degrees, Point2};

pub const TARGET_POSITION: &str = "target_position";
pub const POWER: &str = "power";
pub const TARGET_ORIENTATION: &str = "target_orientation";
pub const KICK: &str = "kick";

pub const MAX_POWER: u8 = u8::MAX;

/// A validated motor/kick instruction for one robot.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    pub target_position: Point2,
    pub power: u8,
    /// degrees, in (-180, 180]
    pub target_orientation: f64,
    pub kick: bool,
}

impl ControlCommand {
    /// The command sent in place of a missing or rejected one: stay where you
    /// are, motors off, no kick.
    pub fn no_op(position: Point2, orientation: Option<f64>) -> Self {
        Self {
            target_position: position,
            power: 0,
            target_orientation: normalize_degrees(orientation.unwrap_or(0.)),
            kick: false,
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.power == 0 && !self.kick
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` should be {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is out of range ({value})")]
    OutOfRange { field: &'static str, value: f64 },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::TypeMismatch { field, .. } => field,
            ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

/// Checks a raw command and turns it into a [`ControlCommand`].
///
/// `power` outside [0, 255] is rejected, never clamped. `kick` defaults to
/// `false` when absent (or `null`). `target_orientation` is normalized into
/// (-180, 180].
pub fn validate(raw: &Value) -> Result<ControlCommand, ValidationError> {
    let fields = raw.as_object().ok_or(ValidationError::TypeMismatch {
        field: "command",
        expected: "a mapping",
    })?;

    let target_position = read_position(fields, TARGET_POSITION)?;
    let power = read_power(fields)?;
    let target_orientation = normalize_degrees(read_finite(fields, TARGET_ORIENTATION)?);
    let kick = match present(fields, KICK) {
        None => false,
        Some(Value::Bool(kick)) => *kick,
        Some(_) => {
            return Err(ValidationError::TypeMismatch {
                field: KICK,
                expected: "a boolean",
            })
        }
    };

    Ok(ControlCommand {
        target_position,
        power,
        target_orientation,
        kick,
    })
}

/// `null` counts as absent.
fn present<'a>(fields: &'a Map<String, Value>, field: &'static str) -> Option<&'a Value> {
    fields.get(field).filter(|v| !v.is_null())
}

fn require<'a>(
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ValidationError> {
    present(fields, field).ok_or(ValidationError::MissingField(field))
}

fn finite(value: &Value, field: &'static str) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::TypeMismatch {
            field,
            expected: "a finite number",
        })
}

fn read_finite(fields: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    finite(require(fields, field)?, field)
}

fn read_position(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Point2, ValidationError> {
    let mismatch = ValidationError::TypeMismatch {
        field,
        expected: "a pair of finite numbers",
    };
    match require(fields, field)? {
        Value::Array(components) if components.len() == 2 => Ok(Point2::new(
            finite(&components[0], field).map_err(|_| mismatch.clone())?,
            finite(&components[1], field).map_err(|_| mismatch.clone())?,
        )),
        _ => Err(mismatch),
    }
}

fn read_power(fields: &Map<String, Value>) -> Result<u8, ValidationError> {
    let value = require(fields, POWER)?;
    let mismatch = ValidationError::TypeMismatch {
        field: POWER,
        expected: "an integer",
    };
    let Value::Number(number) = value else {
        return Err(mismatch);
    };
    let power = if let Some(power) = number.as_i64() {
        power as f64
    } else if let Some(power) = number.as_u64() {
        power as f64
    } else {
        match number.as_f64() {
            Some(power) if power.is_finite() && power.fract() == 0. => power,
            _ => return Err(mismatch),
        }
    };
    if !(0. ..=MAX_POWER as f64).contains(&power) {
        return Err(ValidationError::OutOfRange {
            field: POWER,
            value: power,
        });
    }
    Ok(power as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_command_is_kept_as_is() {
        let command = validate(&json!({
            "target_position": [50, 50],
            "power": 255,
            "target_orientation": 180,
            "kick": true,
        }))
        .expect("command should be valid");
        assert_eq!(
            command,
            ControlCommand {
                target_position: Point2::new(50., 50.),
                power: 255,
                target_orientation: 180.,
                kick: true,
            }
        );
    }

    #[test]
    fn kick_defaults_to_false() {
        let command = validate(&json!({
            "target_position": [-12.5, 3.0],
            "power": 0,
            "target_orientation": -90.0,
        }))
        .expect("command should be valid");
        assert!(!command.kick);
        assert_eq!(command.target_position, Point2::new(-12.5, 3.));

        let command = validate(&json!({
            "target_position": [0, 0],
            "power": 10,
            "target_orientation": 0,
            "kick": null,
        }))
        .expect("null kick counts as absent");
        assert!(!command.kick);
    }

    #[test]
    fn power_out_of_range_is_never_clamped() {
        for power in [json!(256), json!(300), json!(-1), json!(1e9), json!(u64::MAX)] {
            let err = validate(&json!({
                "target_position": [0, 0],
                "power": power,
                "target_orientation": 0,
            }))
            .expect_err("power should be rejected");
            assert!(
                matches!(err, ValidationError::OutOfRange { field: POWER, .. }),
                "{err:?}"
            );
        }
    }

    #[test]
    fn integral_float_power_is_accepted() {
        let command = validate(&json!({
            "target_position": [0, 0],
            "power": 200.0,
            "target_orientation": 0,
        }))
        .expect("200.0 is an integer value");
        assert_eq!(command.power, 200);
    }

    #[test]
    fn missing_fields_are_named() {
        let err = validate(&json!({ "power": 3, "target_orientation": 0 })).expect_err("command should be rejected");
        assert_eq!(err, ValidationError::MissingField(TARGET_POSITION));

        let err = validate(&json!({ "target_position": [0, 0], "target_orientation": 0 }))
            .expect_err("command should be rejected");
        assert_eq!(err.field(), POWER);

        let err = validate(&json!({ "target_position": [0, 0], "power": 3 })).expect_err("command should be rejected");
        assert_eq!(err, ValidationError::MissingField(TARGET_ORIENTATION));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let cases = [
            (json!({ "target_position": [0], "power": 1, "target_orientation": 0 }), TARGET_POSITION),
            (json!({ "target_position": "center", "power": 1, "target_orientation": 0 }), TARGET_POSITION),
            (json!({ "target_position": [0, "a"], "power": 1, "target_orientation": 0 }), TARGET_POSITION),
            (json!({ "target_position": [0, 0], "power": "max", "target_orientation": 0 }), POWER),
            (json!({ "target_position": [0, 0], "power": 12.5, "target_orientation": 0 }), POWER),
            (json!({ "target_position": [0, 0], "power": 1, "target_orientation": "north" }), TARGET_ORIENTATION),
            (json!({ "target_position": [0, 0], "power": 1, "target_orientation": 0, "kick": 1 }), KICK),
        ];
        for (raw, field) in cases {
            let err = validate(&raw).expect_err("command should be rejected");
            assert!(
                matches!(err, ValidationError::TypeMismatch { .. }),
                "{raw} gave {err:?}"
            );
            assert_eq!(err.field(), field);
        }
        assert!(validate(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn orientation_is_normalized() {
        let command = validate(&json!({
            "target_position": [0, 0],
            "power": 1,
            "target_orientation": 270,
        }))
        .expect("command should be valid");
        assert_eq!(command.target_orientation, -90.);
    }

    #[test]
    fn no_op_holds_position() {
        let command = ControlCommand::no_op(Point2::new(3., 4.), Some(-180.));
        assert_eq!(command.power, 0);
        assert!(!command.kick);
        assert_eq!(command.target_position, Point2::new(3., 4.));
        assert_eq!(command.target_orientation, 180.);
        assert!(command.is_no_op());
    }
}
