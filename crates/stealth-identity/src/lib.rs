use std::collections::HashMap;
use std::sync::Mutex;

use duel_domain::StealthId;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const MIN_PEPPER_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum StealthError {
    #[error("wallet pepper must be at least {MIN_PEPPER_BYTES} bytes")]
    PepperTooShort,
    #[error("wallet pepper rejected as hmac key: {0}")]
    InvalidPepper(String),
    #[error("reverse map lock poisoned")]
    LockPoisoned,
}

/// Constant-time comparison of two byte slices.
///
/// The length check is not constant-time; every caller compares fixed-size
/// 32-byte HMAC outputs.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Display-safe wallet truncation. Never echoes the full value.
#[must_use]
pub fn mask(wallet: &str) -> String {
    let wallet = wallet.trim();
    if wallet.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &wallet[..4], &wallet[wallet.len() - 4..])
}

/// Keyed one-way wallet hashing plus the session-scoped reverse map.
///
/// The reverse map lives and dies with active duels: the escrow engine
/// registers wallets at duel creation and unregisters them on any terminal
/// transition. It is never persisted.
pub struct StealthIdentity {
    // Keyed at construction; cloned per digest so the hot path never
    // re-validates the pepper.
    mac: HmacSha256,
    reverse: Mutex<HashMap<StealthId, String>>,
}

impl std::fmt::Debug for StealthIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealthIdentity").finish_non_exhaustive()
    }
}

impl StealthIdentity {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Result<Self, StealthError> {
        let pepper = pepper.into();
        if pepper.len() < MIN_PEPPER_BYTES {
            return Err(StealthError::PepperTooShort);
        }
        let mac = HmacSha256::new_from_slice(&pepper)
            .map_err(|e| StealthError::InvalidPepper(e.to_string()))?;
        Ok(Self {
            mac,
            reverse: Mutex::new(HashMap::new()),
        })
    }

    fn digest(&self, wallet: &str) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(normalise(wallet).as_bytes());
        mac.finalize().into_bytes().into()
    }

    /// Deterministic keyed hash of a wallet. Non-invertible without the
    /// process pepper.
    #[must_use]
    pub fn generate(&self, wallet: &str) -> StealthId {
        StealthId::from_bytes(&self.digest(wallet))
    }

    /// Recompute-and-compare in constant time.
    #[must_use]
    pub fn verify(&self, wallet: &str, stealth_id: &StealthId) -> bool {
        let Ok(candidate) = hex::decode(stealth_id.as_str()) else {
            return false;
        };
        constant_time_eq(&self.digest(wallet), &candidate)
    }

    /// Hash the wallet and remember the back-edge for payout resolution.
    pub fn register(&self, wallet: &str) -> Result<StealthId, StealthError> {
        let stealth_id = self.generate(wallet);
        self.reverse
            .lock()
            .map_err(|_| StealthError::LockPoisoned)?
            .insert(stealth_id.clone(), normalise(wallet));
        Ok(stealth_id)
    }

    pub fn resolve(&self, stealth_id: &StealthId) -> Result<Option<String>, StealthError> {
        Ok(self
            .reverse
            .lock()
            .map_err(|_| StealthError::LockPoisoned)?
            .get(stealth_id)
            .cloned())
    }

    pub fn unregister(&self, stealth_id: &StealthId) -> Result<(), StealthError> {
        self.reverse
            .lock()
            .map_err(|_| StealthError::LockPoisoned)?
            .remove(stealth_id);
        Ok(())
    }
}

/// Trim surrounding whitespace; the wallet's own casing is significant in
/// its address format and is preserved.
fn normalise(wallet: &str) -> String {
    wallet.trim().to_string()
}
