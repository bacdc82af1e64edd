use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duel_domain::{DuelId, StealthId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use transfer_client::WalletSigner;

/// Commitment protocol version. Bump whenever the canonical serialisation
/// changes shape, since the hash covers the exact byte sequence.
pub const COMMITMENT_VERSION: u32 = 1;

const ANCHOR_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum CommitmentLogError {
    #[error("audit log lock poisoned")]
    LockPoisoned,
    #[error("commitment serialisation failed: {0}")]
    Serialisation(String),
}

#[derive(Debug, Clone, Error)]
#[error("ledger anchor error: {0}")]
pub struct AnchorError(pub String);

/// The record whose SHA-256 goes on the public ledger before any money
/// moves. Field order is the wire order; do not reorder without bumping
/// [`COMMITMENT_VERSION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementCommitment {
    pub duel_id: DuelId,
    pub winner_stealth_id: StealthId,
    pub loser_stealth_id: StealthId,
    pub game_server_signature: Option<String>,
    pub timestamp: i64,
    pub version: u32,
}

impl SettlementCommitment {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CommitmentLogError> {
        serde_json::to_vec(self).map_err(|e| CommitmentLogError::Serialisation(e.to_string()))
    }

    pub fn hash_hex(&self) -> Result<String, CommitmentLogError> {
        Ok(hex::encode(Sha256::digest(self.canonical_bytes()?)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub commitment: SettlementCommitment,
    pub commitment_hash: String,
    pub on_chain_tx_signature: Option<String>,
    pub on_chain_success: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentOutcome {
    pub commitment_hash: String,
    pub on_chain_tx_signature: Option<String>,
    pub on_chain_success: bool,
}

/// Ledger anchoring seam: publish an opaque payload, get a tx id back once
/// it is confirmed. The HTTP implementation signs with the server-authority
/// keypair; tests substitute recording mocks.
#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<String, AnchorError>;
}

#[derive(Debug, Serialize)]
struct MemoPublishBody<'a> {
    payload: &'a str,
    authority: &'a str,
    signature: &'a str,
    commitment_level: &'a str,
}

#[derive(Debug, Deserialize)]
struct MemoPublishResponse {
    success: bool,
    tx_signature: Option<String>,
    error: Option<String>,
}

/// Publishes memo payloads through the chain anchor service and waits for
/// the "confirmed" commitment level server-side.
pub struct ReqwestMemoAnchor {
    base_url: String,
    http: reqwest::Client,
    authority: WalletSigner,
}

impl std::fmt::Debug for ReqwestMemoAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestMemoAnchor")
            .field("base_url", &self.base_url)
            .field("authority", &self.authority.address())
            .finish_non_exhaustive()
    }
}

impl ReqwestMemoAnchor {
    pub fn new(base_url: impl Into<String>, authority_seed_b58: &str) -> Result<Self, AnchorError> {
        let http = reqwest::Client::builder()
            .timeout(ANCHOR_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AnchorError(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            authority: WalletSigner::from_base58_seed(authority_seed_b58)
                .map_err(|e| AnchorError(e.to_string()))?,
        })
    }
}

#[async_trait]
impl LedgerAnchor for ReqwestMemoAnchor {
    async fn publish(&self, payload: &str) -> Result<String, AnchorError> {
        let signature = self.authority.sign_intent(payload);
        let body = MemoPublishBody {
            payload,
            authority: self.authority.address(),
            signature: &signature,
            commitment_level: "confirmed",
        };
        let url = format!("{}/memo/publish", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AnchorError(format!(
                "anchor service returned {}",
                response.status()
            )));
        }
        let payload: MemoPublishResponse = response
            .json()
            .await
            .map_err(|e| AnchorError(e.to_string()))?;
        if !payload.success {
            return Err(AnchorError(
                payload.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        payload
            .tx_signature
            .ok_or_else(|| AnchorError("anchor reported success without a tx signature".to_string()))
    }
}

/// Commit-then-settle accountability: hash the commitment, publish the hash
/// before any transfer, and keep a local audit trail no matter what the
/// ledger said.
pub struct CommitmentLog {
    anchor: std::sync::Arc<dyn LedgerAnchor>,
    audit: Mutex<Vec<CommitmentRecord>>,
}

impl std::fmt::Debug for CommitmentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitmentLog").finish_non_exhaustive()
    }
}

impl CommitmentLog {
    #[must_use]
    pub fn new(anchor: std::sync::Arc<dyn LedgerAnchor>) -> Self {
        Self {
            anchor,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Build, hash, optionally publish, and always append to the audit log.
    ///
    /// Publication failure is non-fatal: a briefly unreachable ledger must
    /// not freeze a winner's payout, and the local record still proves the
    /// prior commitment at operator level.
    pub async fn commit_to_settlement(
        &self,
        duel_id: &DuelId,
        winner_stealth_id: &StealthId,
        loser_stealth_id: &StealthId,
        game_server_signature: Option<String>,
        publish: bool,
    ) -> Result<CommitmentOutcome, CommitmentLogError> {
        let commitment = SettlementCommitment {
            duel_id: duel_id.clone(),
            winner_stealth_id: winner_stealth_id.clone(),
            loser_stealth_id: loser_stealth_id.clone(),
            game_server_signature,
            timestamp: Utc::now().timestamp_millis(),
            version: COMMITMENT_VERSION,
        };
        let commitment_hash = commitment.hash_hex()?;

        let (on_chain_tx_signature, on_chain_success) = if publish {
            match self.anchor.publish(&commitment_hash).await {
                Ok(tx_signature) => {
                    info!(
                        duel_id = %duel_id,
                        commitment_hash = %commitment_hash,
                        tx_signature = %tx_signature,
                        "settlement commitment anchored"
                    );
                    (Some(tx_signature), true)
                }
                Err(err) => {
                    warn!(
                        duel_id = %duel_id,
                        commitment_hash = %commitment_hash,
                        error = %err,
                        "commitment anchoring failed, continuing to settlement"
                    );
                    (None, false)
                }
            }
        } else {
            (None, false)
        };

        let record = CommitmentRecord {
            commitment,
            commitment_hash: commitment_hash.clone(),
            on_chain_tx_signature: on_chain_tx_signature.clone(),
            on_chain_success,
            recorded_at: Utc::now(),
        };
        self.audit
            .lock()
            .map_err(|_| CommitmentLogError::LockPoisoned)?
            .push(record);

        Ok(CommitmentOutcome {
            commitment_hash,
            on_chain_tx_signature,
            on_chain_success,
        })
    }

    /// Recompute-and-compare against a stored hash.
    #[must_use]
    pub fn verify_commitment(commitment: &SettlementCommitment, expected_hash: &str) -> bool {
        commitment
            .hash_hex()
            .map(|hash| hash == expected_hash)
            .unwrap_or(false)
    }

    /// Latest audit record for a duel, if any settlement was committed.
    pub fn get_commitment_record(
        &self,
        duel_id: &DuelId,
    ) -> Result<Option<CommitmentRecord>, CommitmentLogError> {
        Ok(self
            .audit
            .lock()
            .map_err(|_| CommitmentLogError::LockPoisoned)?
            .iter()
            .rev()
            .find(|record| &record.commitment.duel_id == duel_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct MockAnchor {
        published: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LedgerAnchor for MockAnchor {
        async fn publish(&self, payload: &str) -> Result<String, AnchorError> {
            if self.fail {
                return Err(AnchorError("anchor unreachable".to_string()));
            }
            self.published
                .lock()
                .expect("lock")
                .push(payload.to_string());
            Ok("anchor_tx_1".to_string())
        }
    }

    fn stealth(byte: u8) -> StealthId {
        StealthId::from_hex(format!("{byte:02x}").repeat(32)).expect("stealth id")
    }

    fn commitment() -> SettlementCommitment {
        SettlementCommitment {
            duel_id: DuelId::parse(&"ab".repeat(16)).expect("duel id"),
            winner_stealth_id: stealth(1),
            loser_stealth_id: stealth(2),
            game_server_signature: Some("sig".to_string()),
            timestamp: 1_722_000_000_000,
            version: COMMITMENT_VERSION,
        }
    }

    #[test]
    fn canonical_serialisation_is_stable_field_order() {
        let bytes = commitment().canonical_bytes().expect("bytes");
        let json = String::from_utf8(bytes).expect("utf8");
        let duel_pos = json.find("duel_id").expect("duel_id");
        let winner_pos = json.find("winner_stealth_id").expect("winner");
        let loser_pos = json.find("loser_stealth_id").expect("loser");
        let sig_pos = json.find("game_server_signature").expect("signature");
        let ts_pos = json.find("timestamp").expect("timestamp");
        let version_pos = json.find("version").expect("version");
        assert!(duel_pos < winner_pos);
        assert!(winner_pos < loser_pos);
        assert!(loser_pos < sig_pos);
        assert!(sig_pos < ts_pos);
        assert!(ts_pos < version_pos);
    }

    #[test]
    fn hash_recomputes_byte_for_byte() {
        let commitment = commitment();
        let hash = commitment.hash_hex().expect("hash");
        assert_eq!(hash.len(), 64);
        assert_eq!(commitment.hash_hex().expect("hash"), hash);
        assert!(CommitmentLog::verify_commitment(&commitment, &hash));

        let mut tampered = commitment;
        tampered.timestamp += 1;
        assert!(!CommitmentLog::verify_commitment(&tampered, &hash));
    }

    #[tokio::test]
    async fn commit_publishes_hash_and_appends_audit_record() {
        let anchor = Arc::new(MockAnchor::default());
        let log = CommitmentLog::new(anchor.clone());
        let duel_id = DuelId::generate();

        let outcome = log
            .commit_to_settlement(&duel_id, &stealth(1), &stealth(2), None, true)
            .await
            .expect("commit");

        assert!(outcome.on_chain_success);
        assert_eq!(outcome.on_chain_tx_signature.as_deref(), Some("anchor_tx_1"));
        assert_eq!(
            anchor.published.lock().expect("lock").as_slice(),
            &[outcome.commitment_hash.clone()]
        );

        let record = log
            .get_commitment_record(&duel_id)
            .expect("read")
            .expect("present");
        assert_eq!(record.commitment_hash, outcome.commitment_hash);
        assert!(CommitmentLog::verify_commitment(
            &record.commitment,
            &record.commitment_hash
        ));
    }

    #[tokio::test]
    async fn anchor_failure_is_non_fatal_and_still_audited() {
        let anchor = Arc::new(MockAnchor {
            published: Mutex::new(Vec::new()),
            fail: true,
        });
        let log = CommitmentLog::new(anchor);
        let duel_id = DuelId::generate();

        let outcome = log
            .commit_to_settlement(&duel_id, &stealth(1), &stealth(2), None, true)
            .await
            .expect("commit survives anchor outage");

        assert!(!outcome.on_chain_success);
        assert!(outcome.on_chain_tx_signature.is_none());
        let record = log
            .get_commitment_record(&duel_id)
            .expect("read")
            .expect("audited regardless");
        assert!(!record.on_chain_success);
    }

    #[tokio::test]
    async fn publish_false_skips_the_anchor_entirely() {
        let anchor = Arc::new(MockAnchor::default());
        let log = CommitmentLog::new(anchor.clone());
        let duel_id = DuelId::generate();

        let outcome = log
            .commit_to_settlement(&duel_id, &stealth(1), &stealth(2), None, false)
            .await
            .expect("commit");

        assert!(!outcome.on_chain_success);
        assert!(anchor.published.lock().expect("lock").is_empty());
        assert!(log.get_commitment_record(&duel_id).expect("read").is_some());
    }

    #[tokio::test]
    async fn latest_record_wins_for_repeated_settles() {
        let log = CommitmentLog::new(Arc::new(MockAnchor::default()));
        let duel_id = DuelId::generate();
        let first = log
            .commit_to_settlement(&duel_id, &stealth(1), &stealth(2), None, false)
            .await
            .expect("first");
        let second = log
            .commit_to_settlement(&duel_id, &stealth(2), &stealth(1), None, false)
            .await
            .expect("second");
        assert_ne!(first.commitment_hash, second.commitment_hash);

        let record = log
            .get_commitment_record(&duel_id)
            .expect("read")
            .expect("present");
        assert_eq!(record.commitment_hash, second.commitment_hash);
        assert_eq!(record.commitment.winner_stealth_id, stealth(2));
    }
}
