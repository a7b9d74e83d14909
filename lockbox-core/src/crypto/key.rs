//! Raw key material wrapper.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key or encoded secret key bytes.
///
/// Serializes as `{"key": base64}` so a key can itself be the payload of a
/// [`ProtectedValue`](crate::crypto::ProtectedValue). The bytes are wiped on
/// drop and on an explicit [`Zeroize::zeroize`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CryptographicKey {
    #[serde(with = "crate::encoding::base64_bytes")]
    key: Vec<u8>,
}

impl CryptographicKey {
    /// Wrap raw key bytes
    pub fn from_bytes(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// True once the buffer has been wiped (or never held anything).
    pub fn is_cleared(&self) -> bool {
        self.key.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for CryptographicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptographicKey([REDACTED; {}])", self.key.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_format() {
        let key = CryptographicKey::from_bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"key":"AQID"}"#);

        let parsed: CryptographicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_zeroize_clears_bytes() {
        let mut key = CryptographicKey::from_bytes(vec![7u8; 32]);
        assert!(!key.is_cleared());

        key.zeroize();
        assert!(key.is_cleared());
        assert!(key.is_empty());
    }

    #[test]
    fn test_debug_redacts() {
        let key = CryptographicKey::from_bytes(vec![0xAB; 4]);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("171"));
        assert!(debug.contains("REDACTED"));
    }
}
