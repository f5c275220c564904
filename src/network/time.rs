use std::{
    fmt::Display,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// A point in time attached to nodes, links and routing observations.
///
/// Collectors report time either as Unix epoch seconds (the radio's node database)
/// or as an RFC 3339 string (packet logs), so both are accepted when deserializing.
/// Serialization always produces an RFC 3339 UTC string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(SystemTime);

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp(UNIX_EPOCH);

    pub fn from_unix_secs(secs: u64) -> Self {
        Timestamp(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn parse_rfc3339(text: &str) -> Result<Self, humantime::TimestampError> {
        humantime::parse_rfc3339_weak(text.trim()).map(Timestamp)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_rfc3339(self.0))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampWire {
    Secs(u64),
    FractionalSecs(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match TimestampWire::deserialize(deserializer)? {
            TimestampWire::Secs(secs) => Ok(Timestamp::from_unix_secs(secs)),
            TimestampWire::FractionalSecs(secs) => {
                if !secs.is_finite() || secs < 0.0 {
                    return Err(serde::de::Error::custom(format!("timestamp out of range: {secs}")));
                }
                Ok(Timestamp(UNIX_EPOCH + Duration::from_secs_f64(secs)))
            }
            TimestampWire::Text(text) => Timestamp::parse_rfc3339(&text)
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
        }
    }
}
