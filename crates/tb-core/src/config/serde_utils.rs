//! Integer encodings of `Duration` for config files
//!
//! Backoff and probe deadlines are whole seconds. The telemetry interval is
//! milliseconds so sub-second sampling stays expressible.

use std::time::Duration;

use serde::{ser, Deserialize, Deserializer, Serializer};

/// Whole seconds; a sub-second remainder is refused rather than truncated
pub mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() != 0 {
            return Err(ser::Error::custom(format!(
                "{:?} is not a whole number of seconds",
                duration
            )));
        }
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Milliseconds
pub mod duration_millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).map_err(ser::Error::custom)?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
