//! Serde helpers for human-readable durations, mirroring the convention used
//! throughout the configuration layer: accept either a humantime string
//! (`"30s"`) or a raw millisecond count on the way in, always emit
//! milliseconds on the way out.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    (duration.as_millis() as u64).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "deserialize_duration")]
        value: Duration,
    }

    #[test]
    fn parses_human_string() {
        let w: Wrapper = serde_json::from_str(r#"{"value":"30s"}"#).unwrap();
        assert_eq!(w.value, Duration::from_secs(30));
    }

    #[test]
    fn parses_millis() {
        let w: Wrapper = serde_json::from_str(r#"{"value":1500}"#).unwrap();
        assert_eq!(w.value, Duration::from_millis(1500));
    }
}
