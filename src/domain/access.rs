use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::people::PersonCategory;

/// Direction of a gate event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDirection {
    Entry,
    Exit,
}

impl GateDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

/// Error for an unrecognized direction value coming back from the database
#[derive(Debug, thiserror::Error)]
#[error("unknown gate direction `{0}`")]
pub struct UnknownDirection(pub String);

impl std::str::FromStr for GateDirection {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

/// Access event entity
#[derive(Debug, Clone, Serialize)]
pub struct AccessEvent {
    pub id: i64,
    pub person_id: i64,
    pub gate: String,
    pub direction: GateDirection,
    pub recorded_at: DateTime<Utc>,
}

/// Request DTO for recording an access event
#[derive(Debug, Clone, Deserialize)]
pub struct RecordAccessEventRequest {
    pub person_id: i64,
    pub gate: String,
    pub direction: GateDirection,
}

/// List item carrying the person's display fields next to the event
#[derive(Debug, Clone, Serialize)]
pub struct AccessEventWithPerson {
    #[serde(flatten)]
    pub event: AccessEvent,
    pub person_name: String,
    pub person_category: PersonCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_wire_format() {
        assert_eq!(
            serde_json::to_value(GateDirection::Entry).unwrap(),
            serde_json::json!("entry")
        );
        let parsed: GateDirection = serde_json::from_value(serde_json::json!("exit")).unwrap();
        assert_eq!(parsed, GateDirection::Exit);
        assert!("turnstile".parse::<GateDirection>().is_err());
    }
}
