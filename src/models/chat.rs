use chrono::{ DateTime, TimeZone, Utc };
use serde::{ Deserialize, Deserializer, Serialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of the conversation. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(deserialize_with = "deserialize_instant")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered history of turns, serialized as a bare JSON array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInstant {
    Text(String),
    Millis(i64),
}

// Stored snapshots may carry either an RFC 3339 string or epoch milliseconds.
fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where D: Deserializer<'de>
{
    match RawInstant::deserialize(deserializer)? {
        RawInstant::Text(s) =>
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
        RawInstant::Millis(ms) =>
            Utc.timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_accepts_iso_and_numeric_timestamps() {
        let iso: Turn = serde_json
            ::from_str(r#"{"role":"user","content":"hi","timestamp":"2024-03-01T10:15:00.000Z"}"#)
            .unwrap();
        assert_eq!(iso.role, Role::User);
        assert_eq!(iso.timestamp.timestamp(), 1_709_288_100);

        let numeric: Turn = serde_json
            ::from_str(r#"{"role":"assistant","content":"yo","timestamp":1709288100000}"#)
            .unwrap();
        assert_eq!(numeric.role, Role::Assistant);
        assert_eq!(numeric.timestamp, iso.timestamp);
    }

    #[test]
    fn conversation_serializes_as_plain_array() {
        let conversation = Conversation::from(vec![Turn::user("Hello")]);
        let value = serde_json::to_value(&conversation).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["role"], "user");
        assert_eq!(array[0]["content"], "Hello");
        assert!(array[0]["timestamp"].is_string());
    }
}
