//! Serde helpers for durations written as (fractional) seconds.
//!
//! Use with `#[serde(with = "crate::util::secs")]` on `Duration` fields, or
//! `secs::option` on `Option<Duration>`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a duration as seconds.
pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// Deserialize seconds into a duration.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Same as the parent module, for optional fields.
pub mod option {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    /// Serialize an optional duration as seconds or null.
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "super")]
        elapsed: Duration,
        #[serde(default, with = "super::option")]
        timeout: Option<Duration>,
    }

    #[test]
    fn fractional_seconds() {
        let holder: Holder = serde_json::from_str(r#"{"elapsed": 1.5}"#).expect("parse");
        assert_eq!(holder.elapsed, Duration::from_millis(1500));
        assert_eq!(holder.timeout, None);
    }

    #[test]
    fn negative_seconds_rejected() {
        assert!(serde_json::from_str::<Holder>(r#"{"elapsed": -1}"#).is_err());
    }

    #[test]
    fn serializes_as_float() {
        let holder = Holder {
            elapsed: Duration::from_secs(2),
            timeout: Some(Duration::from_millis(250)),
        };
        let json = serde_json::to_string(&holder).expect("serialize");
        assert_eq!(json, r#"{"elapsed":2.0,"timeout":0.25}"#);
    }
}
