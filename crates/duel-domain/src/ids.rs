use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Opaque duel identifier: 32 lowercase hex chars from 16 random bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(String);

impl DuelId {
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.len() != 32 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidDuelId(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DuelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed one-way hash of a wallet: 64 lowercase hex chars. Stable within a
/// process, opaque to outsiders. Derivation lives in `stealth-identity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StealthId(String);

impl StealthId {
    /// Build directly from a 32-byte digest; lowercase hex is the
    /// canonical form.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn from_hex(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidStealthId(raw));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StealthId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_duel_ids_are_32_hex_and_unique() {
        let a = DuelId::generate();
        let b = DuelId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_bad_lengths_and_non_hex() {
        assert!(DuelId::parse("abc").is_err());
        assert!(DuelId::parse(&"g".repeat(32)).is_err());
        let id = DuelId::parse(&"A".repeat(32)).expect("parse");
        assert_eq!(id.as_str(), &"a".repeat(32));
    }

    #[test]
    fn stealth_id_requires_64_hex() {
        assert!(StealthId::from_hex("ff".repeat(32)).is_ok());
        assert!(StealthId::from_hex("ff".repeat(31)).is_err());
        assert!(StealthId::from_hex("zz".repeat(32)).is_err());
    }

    #[test]
    fn stealth_id_from_bytes_matches_hex_form() {
        let id = StealthId::from_bytes(&[0xab; 32]);
        assert_eq!(id.as_str(), "ab".repeat(32));
        assert_eq!(StealthId::from_hex(id.as_str()).expect("hex"), id);
    }
}
