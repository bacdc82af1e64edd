pub mod error;
pub mod proof;
pub mod signer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duel_domain::{Lamports, TokenSymbol};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use error::{TransferClientError, TransferErrorKind, classify_backend_error};
pub use proof::{BulletproofGenerator, RangeProofArtifacts, RangeProofGenerator, RANGE_PROOF_BITS};
pub use signer::{SignerRole, WalletSigner, build_intent_message, SIGNING_SCHEME};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const TRANSFER_TYPE_INTERNAL: &str = "internal-transfer";

/// One outbound value movement inside the shielded pool, to be proven,
/// signed, and submitted. The nonce is caller-owned so a retrying caller
/// can keep it stable and let the backend deduplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub sender: SignerRole,
    pub recipient_wallet: String,
    pub token: TokenSymbol,
    pub amount: Lamports,
    pub nonce: u32,
}

/// Seam the escrow engine consumes. The reqwest implementation talks to the
/// ZK transfer backend; tests substitute scripted mocks.
#[async_trait]
pub trait ShieldedTransferApi: Send + Sync {
    async fn get_balance(
        &self,
        wallet: &str,
        token: TokenSymbol,
    ) -> Result<Lamports, TransferClientError>;

    /// Submit one internal transfer. Never retries; retry policy belongs to
    /// the caller.
    async fn internal_transfer(
        &self,
        intent: &TransferIntent,
    ) -> Result<String, TransferClientError>;

    fn escrow_wallet(&self) -> &str;

    fn treasury_wallet(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct InternalTransferBody<'a> {
    sender_wallet: &'a str,
    recipient_wallet: &'a str,
    token: &'a str,
    nonce: u32,
    amount: u128,
    proof_bytes: &'a str,
    commitment: &'a str,
    sender_signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct InternalTransferResponse {
    success: bool,
    tx_signature: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolBalanceResponse {
    available: Option<u128>,
    balance: Option<u128>,
}

/// HTTP client for the shielded-pool backend. Owns the escrow and treasury
/// signing keypairs for the process; construction fails on any key decoding
/// problem so a misconfigured service never comes up.
pub struct ReqwestShieldedTransferClient {
    base_url: String,
    http: reqwest::Client,
    escrow: WalletSigner,
    treasury: WalletSigner,
    proofs: Arc<dyn RangeProofGenerator>,
}

impl std::fmt::Debug for ReqwestShieldedTransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestShieldedTransferClient")
            .field("base_url", &self.base_url)
            .field("escrow_wallet", &self.escrow.address())
            .field("treasury_wallet", &self.treasury.address())
            .finish_non_exhaustive()
    }
}

impl ReqwestShieldedTransferClient {
    pub fn new(
        base_url: impl Into<String>,
        escrow_seed_b58: &str,
        treasury_seed_b58: &str,
        proofs: Arc<dyn RangeProofGenerator>,
    ) -> Result<Self, TransferClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                TransferClientError::new(TransferErrorKind::Network, format!("http client: {e}"))
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            escrow: WalletSigner::from_base58_seed(escrow_seed_b58)?,
            treasury: WalletSigner::from_base58_seed(treasury_seed_b58)?,
            proofs,
        })
    }

    fn signer_for(&self, role: SignerRole) -> &WalletSigner {
        match role {
            SignerRole::Escrow => &self.escrow,
            SignerRole::Treasury => &self.treasury,
        }
    }
}

#[async_trait]
impl ShieldedTransferApi for ReqwestShieldedTransferClient {
    async fn get_balance(
        &self,
        wallet: &str,
        token: TokenSymbol,
    ) -> Result<Lamports, TransferClientError> {
        let url = format!("{}/pool/balance/{wallet}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token", token.as_str())])
            .send()
            .await
            .map_err(|e| TransferClientError::new(TransferErrorKind::Network, e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TransferClientError::new(
                TransferErrorKind::UnknownWallet,
                format!("no pool balance for wallet {wallet}"),
            ));
        }
        if !response.status().is_success() {
            return Err(TransferClientError::new(
                TransferErrorKind::Network,
                format!("balance query returned {}", response.status()),
            ));
        }

        let payload: PoolBalanceResponse = response
            .json()
            .await
            .map_err(|e| TransferClientError::new(TransferErrorKind::Network, e.to_string()))?;
        let amount = payload.available.or(payload.balance).ok_or_else(|| {
            TransferClientError::new(
                TransferErrorKind::Network,
                "balance response carried neither available nor balance".to_string(),
            )
        })?;
        Ok(Lamports(amount))
    }

    async fn internal_transfer(
        &self,
        intent: &TransferIntent,
    ) -> Result<String, TransferClientError> {
        let signer = self.signer_for(intent.sender);
        let artifacts = self.proofs.prove(intent.amount.as_u128())?;
        let message = build_intent_message(TRANSFER_TYPE_INTERNAL);
        let signature = signer.sign_intent(&message);

        let body = InternalTransferBody {
            sender_wallet: signer.address(),
            recipient_wallet: &intent.recipient_wallet,
            token: intent.token.as_str(),
            nonce: intent.nonce,
            amount: intent.amount.as_u128(),
            proof_bytes: &artifacts.proof_hex,
            commitment: &artifacts.commitment_hex,
            sender_signature: &signature,
        };

        let url = format!("{}/zk/internal-transfer", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransferClientError::new(TransferErrorKind::Network, e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransferClientError::new(
                TransferErrorKind::RateLimited,
                "transfer backend rate limit".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(TransferClientError::new(
                TransferErrorKind::Network,
                format!("transfer backend returned {}", response.status()),
            ));
        }

        let payload: InternalTransferResponse = response
            .json()
            .await
            .map_err(|e| TransferClientError::new(TransferErrorKind::Network, e.to_string()))?;

        if !payload.success {
            let code = payload.error.unwrap_or_else(|| "unspecified".to_string());
            let detail = payload.message.unwrap_or_else(|| code.clone());
            warn!(
                token = %intent.token,
                nonce = intent.nonce,
                error = %code,
                "internal transfer rejected by backend"
            );
            return Err(TransferClientError::new(classify_backend_error(&code), detail));
        }

        let tx_signature = payload.tx_signature.ok_or_else(|| {
            TransferClientError::new(
                TransferErrorKind::Network,
                "backend reported success without a tx signature".to_string(),
            )
        })?;
        debug!(
            token = %intent.token,
            amount = %intent.amount,
            nonce = intent.nonce,
            "internal transfer submitted"
        );
        Ok(tx_signature)
    }

    fn escrow_wallet(&self) -> &str {
        self.escrow.address()
    }

    fn treasury_wallet(&self) -> &str {
        self.treasury.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ReqwestShieldedTransferClient {
        ReqwestShieldedTransferClient::new(
            "http://127.0.0.1:9999/",
            &bs58::encode([3_u8; 32]).into_string(),
            &bs58::encode([4_u8; 32]).into_string(),
            Arc::new(BulletproofGenerator),
        )
        .expect("client")
    }

    #[test]
    fn construction_strips_trailing_slash_and_derives_wallets() {
        let client = client();
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
        assert_ne!(client.escrow_wallet(), client.treasury_wallet());
    }

    #[test]
    fn construction_rejects_bad_seeds() {
        let err = ReqwestShieldedTransferClient::new(
            "http://127.0.0.1:9999",
            "not-a-seed",
            &bs58::encode([4_u8; 32]).into_string(),
            Arc::new(BulletproofGenerator),
        )
        .expect_err("bad escrow seed");
        assert_eq!(err.kind, TransferErrorKind::InvalidKey);
    }

    #[test]
    fn transfer_body_uses_backend_wire_field_names() {
        let body = InternalTransferBody {
            sender_wallet: "escrow",
            recipient_wallet: "winner",
            token: "SOL",
            nonce: 7,
            amount: 195_020_000,
            proof_bytes: "aa",
            commitment: "bb",
            sender_signature: "cc",
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["sender_wallet"], "escrow");
        assert_eq!(json["recipient_wallet"], "winner");
        assert_eq!(json["nonce"], 7);
        assert_eq!(json["amount"], 195_020_000_u64);
        assert_eq!(json["proof_bytes"], "aa");
        assert_eq!(json["commitment"], "bb");
        assert_eq!(json["sender_signature"], "cc");
    }

    #[test]
    fn balance_response_accepts_either_field() {
        let available: PoolBalanceResponse =
            serde_json::from_str(r#"{"available": 5}"#).expect("parse");
        assert_eq!(available.available, Some(5));
        let balance: PoolBalanceResponse =
            serde_json::from_str(r#"{"balance": 9}"#).expect("parse");
        assert_eq!(balance.balance, Some(9));
    }
}
