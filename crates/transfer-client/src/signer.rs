use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use uuid::Uuid;

use crate::error::{TransferClientError, TransferErrorKind};

/// Scheme tag folded into every signed intent so signatures cannot be
/// replayed across protocols.
pub const SIGNING_SCHEME: &str = "zkpool";

/// Which process-owned keypair authorises an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    Escrow,
    Treasury,
}

/// An Ed25519 signer whose public key doubles as the pool wallet address.
pub struct WalletSigner {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl WalletSigner {
    /// Decode a base58 32-byte Ed25519 seed. Start-up rejects any failure.
    pub fn from_base58_seed(seed: &str) -> Result<Self, TransferClientError> {
        let bytes = bs58::decode(seed.trim()).into_vec().map_err(|e| {
            TransferClientError::new(TransferErrorKind::InvalidKey, format!("base58: {e}"))
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            TransferClientError::new(
                TransferErrorKind::InvalidKey,
                "ed25519 seed must be exactly 32 bytes".to_string(),
            )
        })?;
        let signing_key = SigningKey::from_bytes(&seed);
        let address = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        Ok(Self {
            signing_key,
            address,
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Detached signature over an intent message, base58-encoded.
    #[must_use]
    pub fn sign_intent(&self, message: &str) -> String {
        let signature = self.signing_key.sign(message.as_bytes());
        bs58::encode(signature.to_bytes()).into_string()
    }
}

/// Canonical intent message: `<scheme>:<transfer-type>:<uuid-nonce>:<unix-seconds>`.
#[must_use]
pub fn build_intent_message(transfer_type: &str) -> String {
    format!(
        "{SIGNING_SCHEME}:{transfer_type}:{}:{}",
        Uuid::now_v7(),
        Utc::now().timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    fn seed_b58() -> String {
        bs58::encode([7_u8; 32]).into_string()
    }

    #[test]
    fn decodes_seed_and_derives_stable_address() {
        let a = WalletSigner::from_base58_seed(&seed_b58()).expect("signer");
        let b = WalletSigner::from_base58_seed(&seed_b58()).expect("signer");
        assert_eq!(a.address(), b.address());
        assert!(!a.address().is_empty());
    }

    #[test]
    fn rejects_malformed_and_short_seeds() {
        assert!(WalletSigner::from_base58_seed("0OIl-not-base58").is_err());
        let short = bs58::encode([1_u8; 16]).into_string();
        assert!(WalletSigner::from_base58_seed(&short).is_err());
    }

    #[test]
    fn signed_intent_verifies_under_the_derived_pubkey() {
        let signer = WalletSigner::from_base58_seed(&seed_b58()).expect("signer");
        let message = build_intent_message("internal-transfer");
        let sig_b58 = signer.sign_intent(&message);

        let sig_bytes: [u8; 64] = bs58::decode(&sig_b58)
            .into_vec()
            .expect("decode")
            .try_into()
            .expect("64 bytes");
        let signature = Signature::from_bytes(&sig_bytes);
        signer
            .signing_key
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .expect("valid signature");
    }

    #[test]
    fn intent_message_carries_scheme_type_nonce_and_epoch() {
        let message = build_intent_message("internal-transfer");
        let parts: Vec<&str> = message.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], SIGNING_SCHEME);
        assert_eq!(parts[1], "internal-transfer");
        assert!(Uuid::parse_str(parts[2]).is_ok());
        assert!(parts[3].parse::<i64>().is_ok());
    }
}
