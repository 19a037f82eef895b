//! Viewer commands forwarded to the gateway over the serial link.

use meshwatch_types::CommandResponse;
use serde_json::Value;

use crate::error::CommandError;

/// A command a viewer may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the gateway's wall clock.
    SetTime { hour: u8, minute: u8, second: u8 },
}

impl Command {
    /// Parse `{"type": "command", "command": "settime", "hour": .., ...}`.
    ///
    /// Missing time components default to zero.
    pub fn parse(value: &Value) -> Result<Self, CommandError> {
        if value.get("type").and_then(Value::as_str) != Some("command") {
            return Err(CommandError::NotACommand);
        }

        let name = value.get("command").and_then(Value::as_str).unwrap_or("");
        match name {
            "settime" => Ok(Command::SetTime {
                hour: component(value, "hour", 23)?,
                minute: component(value, "minute", 59)?,
                second: component(value, "second", 59)?,
            }),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Parse a viewer line. Anything that is not JSON is not a command.
    pub fn parse_line(line: &str) -> Result<Self, CommandError> {
        let value: Value =
            serde_json::from_str(line.trim()).map_err(|_| CommandError::NotACommand)?;
        Self::parse(&value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::SetTime { .. } => "settime",
        }
    }

    /// The line written to the gateway, newline included.
    pub fn to_line(&self) -> String {
        match self {
            Command::SetTime {
                hour,
                minute,
                second,
            } => format!("SETTIME {hour:02}:{minute:02}:{second:02}\n"),
        }
    }

    /// Response for a command that reached the gateway.
    pub fn accepted(&self) -> CommandResponse {
        match self {
            Command::SetTime {
                hour,
                minute,
                second,
            } => CommandResponse::ok(
                self.name(),
                format!("Time set to {hour:02}:{minute:02}:{second:02}"),
            ),
        }
    }
}

fn component(value: &Value, field: &'static str, max: u8) -> Result<u8, CommandError> {
    let raw = value.get(field).and_then(Value::as_i64).unwrap_or(0);
    u8::try_from(raw)
        .ok()
        .filter(|v| *v <= max)
        .ok_or(CommandError::OutOfRange { field, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settime_round_trip_to_serial_line() {
        let command = Command::parse(&json!({
            "type": "command", "command": "settime", "hour": 9, "minute": 5, "second": 7
        }))
        .unwrap();

        assert_eq!(
            command,
            Command::SetTime { hour: 9, minute: 5, second: 7 }
        );
        assert_eq!(command.to_line(), "SETTIME 09:05:07\n");
        assert_eq!(
            command.accepted().message.as_deref(),
            Some("Time set to 09:05:07")
        );
    }

    #[test]
    fn missing_components_default_to_zero() {
        let command = Command::parse_line(r#"{"type":"command","command":"settime","hour":12}"#);
        assert_eq!(
            command,
            Ok(Command::SetTime { hour: 12, minute: 0, second: 0 })
        );
    }

    #[test]
    fn out_of_range_components_are_rejected() {
        for (field, value) in [("hour", 24), ("minute", 60), ("second", -1)] {
            let mut message = json!({"type": "command", "command": "settime"});
            message[field] = json!(value);
            assert_eq!(
                Command::parse(&message),
                Err(CommandError::OutOfRange { field, value })
            );
        }
    }

    #[test]
    fn non_commands() {
        assert_eq!(Command::parse_line("hello"), Err(CommandError::NotACommand));
        assert_eq!(
            Command::parse_line(r#"{"type":"node_data"}"#),
            Err(CommandError::NotACommand)
        );
        assert_eq!(
            Command::parse_line(r#"{"type":"command","command":"reboot"}"#),
            Err(CommandError::Unknown("reboot".to_string()))
        );
    }
}
