//! Serde helpers for the stable JSON wire format.

/// Base64 (standard alphabet, padded) serialization for `Vec<u8>`.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Current time truncated to millisecond precision, matching the epoch-millis
/// wire format so a value survives a JSON round trip unchanged.
pub(crate) fn now_millis() -> chrono::DateTime<chrono::Utc> {
    let now = chrono::Utc::now();
    chrono::DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Next `modified` stamp for a mutation: never earlier than, and always
/// strictly after, the previous one.
pub(crate) fn next_modified(
    previous: chrono::DateTime<chrono::Utc>,
) -> chrono::DateTime<chrono::Utc> {
    let now = now_millis();
    let floor = previous + chrono::Duration::milliseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}
