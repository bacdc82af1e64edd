use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use commitment_log::{CommitmentLog, CommitmentLogError};
use duel_domain::{
    DomainError, DuelId, DuelRecord, DuelStatus, Lamports, Participant, StealthId, TokenSymbol,
};
use escrow_store::{DuelStore, StoreError};
use serde_json::Value;
use stealth_identity::{StealthError, StealthIdentity, mask};
use thiserror::Error;
use tracing::{info, warn};
use transfer_client::{ShieldedTransferApi, SignerRole, TransferClientError, TransferIntent};

/// Winner payout retry policy. Hard-coded by contract: three attempts with
/// a flat two-second gap, no jitter.
pub const PAYOUT_ATTEMPTS: u32 = 3;
pub const PAYOUT_RETRY_DELAY: StdDuration = StdDuration::from_secs(2);

/// Records that reached settlement or a terminal state stay around for a
/// day so operators can audit and recover.
const RECOVERY_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("duel not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Precondition(String),
    #[error("winner payout failed after {attempts} attempts: {message}")]
    SettlementFailed { attempts: u32, message: String },
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferClientError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stealth(#[from] StealthError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Commitment(#[from] CommitmentLogError),
    #[error("duel lock table poisoned")]
    LockPoisoned,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Two nested fee layers applied at settlement: the pool already took its
/// deposit fee on the way in, the house takes its cut of what actually sits
/// in escrow. Everything floors to the integer pool unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    /// What one stake is actually worth inside the pool after the deposit fee.
    pub escrowed_per_player: Lamports,
    pub pot: Lamports,
    pub house_fee: Lamports,
    pub winner_payout: Lamports,
}

/// `A = floor(S * (1 - f_d))`, `P = 2A`, `H = floor(P * f_h)`, `W = P - H`.
/// The pool deducts its deposit fee again on the outgoing transfer; the
/// declared winner payout is pre-withdrawal-fee by contract.
#[must_use]
pub fn compute_payout(
    stake: Lamports,
    deposit_fee_bps: u16,
    house_fee_percent: u8,
) -> PayoutBreakdown {
    let escrowed_per_player = Lamports(
        stake
            .as_u128()
            .saturating_mul(u128::from(10_000 - deposit_fee_bps.min(10_000)))
            / 10_000,
    );
    let pot = Lamports(escrowed_per_player.as_u128().saturating_mul(2));
    let house_fee = pot.bps_share(u16::from(house_fee_percent) * 100);
    let winner_payout = Lamports(pot.as_u128() - house_fee.as_u128());
    PayoutBreakdown {
        escrowed_per_player,
        pot,
        house_fee,
        winner_payout,
    }
}

#[derive(Debug, Clone)]
pub struct CreateDuelInput {
    pub player1_wallet: String,
    pub player2_wallet: String,
    pub player1_character_id: String,
    pub player2_character_id: String,
    pub player1_name: String,
    pub player2_name: String,
    pub stake_amount: f64,
    pub token: TokenSymbol,
    pub rules: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDuelOutput {
    pub duel_id: DuelId,
    pub player1_stealth_id: StealthId,
    pub player2_stealth_id: StealthId,
    pub stake_lamports: Lamports,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStakeOutput {
    pub tx_signature: String,
    pub status: DuelStatus,
    pub both_locked: bool,
}

#[derive(Debug, Clone)]
pub struct SettleInput {
    pub duel_id: DuelId,
    pub winner_wallet: String,
    pub combat_summary: Option<Value>,
    pub server_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutput {
    pub winner_tx_signature: String,
    pub treasury_tx_signature: Option<String>,
    pub winner_payout: Lamports,
    pub house_fee: Lamports,
    pub commitment_hash: String,
    pub commitment_tx_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    Timeout,
    Cancelled,
    Error,
}

impl RefundReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for RefundReason {
    type Err = EscrowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            other => Err(EscrowError::Validation(format!(
                "unknown refund reason: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DustStatus {
    pub accumulated: Lamports,
    pub can_sweep: bool,
    pub minimum_to_sweep: Lamports,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutput {
    pub swept: Lamports,
    pub tx_signature: String,
}

#[derive(Debug, Clone)]
pub struct EmergencyRefundInput {
    pub duel_id: DuelId,
    pub player1_wallet: String,
    pub player2_wallet: String,
    pub stake_per_player: Lamports,
    pub token: TokenSymbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyRefundResult {
    pub player: String,
    pub success: bool,
    pub tx_signature: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStatus {
    pub failed_duels: Vec<String>,
    pub pending_settlements: Vec<String>,
}

/// The duel lifecycle authority. Owns every record mutation; each duel id
/// is a critical section, so concurrent calls against one duel serialise
/// while distinct duels proceed independently.
pub struct EscrowEngine {
    store: Arc<DuelStore>,
    stealth: Arc<StealthIdentity>,
    transfers: Arc<dyn ShieldedTransferApi>,
    commitments: Arc<CommitmentLog>,
    house_fee_percent: u8,
    escrow_timeout: Duration,
    duel_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for EscrowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("house_fee_percent", &self.house_fee_percent)
            .field("escrow_timeout", &self.escrow_timeout)
            .finish_non_exhaustive()
    }
}

impl EscrowEngine {
    #[must_use]
    pub fn new(
        store: Arc<DuelStore>,
        stealth: Arc<StealthIdentity>,
        transfers: Arc<dyn ShieldedTransferApi>,
        commitments: Arc<CommitmentLog>,
        house_fee_percent: u8,
        escrow_timeout: Duration,
    ) -> Self {
        Self {
            store,
            stealth,
            transfers,
            commitments,
            house_fee_percent,
            escrow_timeout,
            duel_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DuelStore> {
        &self.store
    }

    #[must_use]
    pub fn commitments(&self) -> &Arc<CommitmentLog> {
        &self.commitments
    }

    fn duel_lock(&self, duel_id: &DuelId) -> Result<Arc<tokio::sync::Mutex<()>>, EscrowError> {
        Ok(self
            .duel_locks
            .lock()
            .map_err(|_| EscrowError::LockPoisoned)?
            .entry(duel_id.as_str().to_string())
            .or_default()
            .clone())
    }

    /// Terminal duels never lock again; drop the table entry so it only
    /// tracks live duels. Best-effort, callers still hold their own
    /// `Arc` to the mutex.
    fn release_duel_lock(&self, duel_id: &DuelId) {
        if let Ok(mut locks) = self.duel_locks.lock() {
            locks.remove(duel_id.as_str());
        }
    }

    fn recovery_ttl() -> Duration {
        Duration::hours(RECOVERY_TTL_HOURS)
    }

    /// Register both wallets, mint a duel id, and open the staking window.
    /// No server-side balance pre-check: clients verify before generating
    /// their deposit proof.
    pub fn create_duel(&self, input: CreateDuelInput) -> Result<CreateDuelOutput, EscrowError> {
        let wallet1 = input.player1_wallet.trim().to_string();
        let wallet2 = input.player2_wallet.trim().to_string();
        if wallet1 == wallet2 {
            return Err(EscrowError::Validation(
                "players must stake from different wallets".to_string(),
            ));
        }

        let stake = input.token.to_base_units(input.stake_amount)?;
        if stake < input.token.params().min_stake {
            return Err(EscrowError::Precondition("Stake too low".to_string()));
        }

        let player1_stealth_id = self.stealth.register(&wallet1)?;
        let player2_stealth_id = self.stealth.register(&wallet2)?;

        let now = Utc::now();
        let expires_at = now + self.escrow_timeout;
        let duel_id = DuelId::generate();
        let record = DuelRecord {
            duel_id: duel_id.clone(),
            status: DuelStatus::PendingStakes,
            player1: Participant::new(
                player1_stealth_id.clone(),
                input.player1_character_id,
                input.player1_name,
                stake,
            ),
            player2: Participant::new(
                player2_stealth_id.clone(),
                input.player2_character_id,
                input.player2_name,
                stake,
            ),
            token: input.token,
            house_fee_percent: self.house_fee_percent,
            rules: input.rules,
            created_at: now,
            updated_at: now,
            expires_at,
            winner_stealth_id: None,
            settlement_tx_signatures: Vec::new(),
            combat_summary: None,
        };
        self.store.set(record, self.escrow_timeout)?;

        info!(
            duel_id = %duel_id,
            token = %input.token,
            stake = %stake,
            player1 = %mask(&wallet1),
            player2 = %mask(&wallet2),
            "duel created"
        );
        Ok(CreateDuelOutput {
            duel_id,
            player1_stealth_id,
            player2_stealth_id,
            stake_lamports: stake,
            expires_at,
        })
    }

    /// Record a participant's stake lock. Idempotence is by rejection: a
    /// second lock for the same participant errors without touching the
    /// transfer backend.
    pub async fn lock_stake(
        &self,
        duel_id: &DuelId,
        player_wallet: &str,
        payment_proof: &str,
    ) -> Result<LockStakeOutput, EscrowError> {
        let lock = self.duel_lock(duel_id)?;
        let _guard = lock.lock().await;

        let mut record = self.store.get(duel_id)?.ok_or(EscrowError::NotFound)?;
        if record.status != DuelStatus::PendingStakes {
            return Err(EscrowError::Precondition(format!(
                "duel is not accepting stakes (status {})",
                record.status.as_str()
            )));
        }
        let now = Utc::now();
        if record.is_expired(now) {
            return Err(EscrowError::Precondition(
                "staking window has expired".to_string(),
            ));
        }

        let wallet = player_wallet.trim();
        let stealth_id = if self.stealth.verify(wallet, &record.player1.stealth_id) {
            record.player1.stealth_id.clone()
        } else if self.stealth.verify(wallet, &record.player2.stealth_id) {
            record.player2.stealth_id.clone()
        } else {
            return Err(EscrowError::Precondition(
                "wallet is not a participant in this duel".to_string(),
            ));
        };

        let tx_signature = extract_tx_signature(payment_proof);
        {
            let participant = record.participant_mut(&stealth_id).ok_or_else(|| {
                EscrowError::Internal("matched stealth id missing from duel record".to_string())
            })?;
            if participant.stake_locked {
                return Err(EscrowError::Precondition(
                    "stake already locked for this player".to_string(),
                ));
            }
            participant.stake_locked = true;
            participant.lock_tx_signature = Some(tx_signature.clone());
            participant.locked_at = Some(now);
        }
        record.updated_at = now;

        let both_locked = record.both_locked();
        if both_locked {
            record.transition_to(DuelStatus::Active, now)?;
        }
        let status = record.status;

        let remaining = (record.expires_at - now).max(Duration::seconds(1));
        self.store.set(record, remaining)?;

        info!(
            duel_id = %duel_id,
            player = %mask(wallet),
            both_locked,
            "stake locked"
        );
        Ok(LockStakeOutput {
            tx_signature,
            status,
            both_locked,
        })
    }

    /// Commit, then settle: publish the commitment hash before any money
    /// moves, pay the winner with the fixed retry policy, then take the
    /// house fee or defer it into dust. Runs entirely inside the duel's
    /// critical section, so a duplicate settle call waits and then fails
    /// the status precondition.
    pub async fn settle(&self, input: SettleInput) -> Result<SettleOutput, EscrowError> {
        let lock = self.duel_lock(&input.duel_id)?;
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .get(&input.duel_id)?
            .ok_or(EscrowError::NotFound)?;
        if !matches!(
            record.status,
            DuelStatus::Active | DuelStatus::PendingSettlement
        ) {
            return Err(EscrowError::Precondition(format!(
                "duel cannot be settled from status {}",
                record.status.as_str()
            )));
        }

        let winner_wallet = input.winner_wallet.trim().to_string();
        let (winner_stealth_id, loser_stealth_id) =
            if self.stealth.verify(&winner_wallet, &record.player1.stealth_id) {
                (
                    record.player1.stealth_id.clone(),
                    record.player2.stealth_id.clone(),
                )
            } else if self.stealth.verify(&winner_wallet, &record.player2.stealth_id) {
                (
                    record.player2.stealth_id.clone(),
                    record.player1.stealth_id.clone(),
                )
            } else {
                return Err(EscrowError::Precondition(
                    "winner wallet is not a participant in this duel".to_string(),
                ));
            };

        let params = record.token.params();
        let payout = compute_payout(
            record.player1.stake,
            params.deposit_fee_bps,
            record.house_fee_percent,
        );

        // Accountability first: one commitment per settle call, published
        // before any transfer. Publication failure is non-fatal.
        let commitment = self
            .commitments
            .commit_to_settlement(
                &input.duel_id,
                &winner_stealth_id,
                &loser_stealth_id,
                input.server_signature.clone(),
                true,
            )
            .await?;

        let now = Utc::now();
        record.winner_stealth_id = Some(winner_stealth_id.clone());
        record.combat_summary = input.combat_summary.clone();
        if record.status == DuelStatus::Active {
            record.transition_to(DuelStatus::PendingSettlement, now)?;
        }
        self.store.set(record.clone(), Self::recovery_ttl())?;
        self.store.add_pending_recovery(&input.duel_id)?;

        // One nonce for the whole settle call so the backend can
        // deduplicate a retry whose first response was lost.
        let payout_nonce: u32 = rand::random();
        let winner_intent = TransferIntent {
            sender: SignerRole::Escrow,
            recipient_wallet: winner_wallet.clone(),
            token: record.token,
            amount: payout.winner_payout,
            nonce: payout_nonce,
        };

        let mut winner_tx_signature = None;
        let mut last_error: Option<TransferClientError> = None;
        let mut attempts_made = 0;
        for attempt in 1..=PAYOUT_ATTEMPTS {
            attempts_made = attempt;
            match self.transfers.internal_transfer(&winner_intent).await {
                Ok(tx_signature) => {
                    winner_tx_signature = Some(tx_signature);
                    break;
                }
                Err(err) => {
                    warn!(
                        duel_id = %input.duel_id,
                        attempt,
                        error = %err,
                        "winner payout attempt failed"
                    );
                    let transient = err.is_transient();
                    last_error = Some(err);
                    if !transient {
                        break;
                    }
                    if attempt < PAYOUT_ATTEMPTS {
                        tokio::time::sleep(PAYOUT_RETRY_DELAY).await;
                    }
                }
            }
        }

        let Some(winner_tx_signature) = winner_tx_signature else {
            // Exhausted: revert so the duel stays recoverable, and surface
            // it through the failed set.
            let mut reverted = self
                .store
                .get(&input.duel_id)?
                .ok_or(EscrowError::NotFound)?;
            reverted.transition_to(DuelStatus::Active, Utc::now())?;
            self.store.set(reverted, Self::recovery_ttl())?;
            self.store.remove_pending_recovery(&input.duel_id)?;
            self.store.add_failed_recovery(&input.duel_id)?;
            let message = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no transfer attempt completed".to_string());
            return Err(EscrowError::SettlementFailed {
                attempts: attempts_made,
                message,
            });
        };

        self.store.remove_pending_recovery(&input.duel_id)?;

        let treasury_tx_signature = self
            .pay_or_defer_house_fee(&input.duel_id, record.token, payout.house_fee)
            .await?;

        let now = Utc::now();
        record.transition_to(DuelStatus::Settled, now)?;
        record.settlement_tx_signatures = std::iter::once(winner_tx_signature.clone())
            .chain(treasury_tx_signature.clone())
            .collect();
        self.store.set(record, Self::recovery_ttl())?;

        self.stealth.unregister(&winner_stealth_id)?;
        self.stealth.unregister(&loser_stealth_id)?;
        self.release_duel_lock(&input.duel_id);

        info!(
            duel_id = %input.duel_id,
            winner_payout = %payout.winner_payout,
            house_fee = %payout.house_fee,
            commitment_hash = %commitment.commitment_hash,
            on_chain = commitment.on_chain_success,
            "duel settled"
        );
        Ok(SettleOutput {
            winner_tx_signature,
            treasury_tx_signature,
            winner_payout: payout.winner_payout,
            house_fee: payout.house_fee,
            commitment_hash: commitment.commitment_hash,
            commitment_tx_signature: commitment.on_chain_tx_signature,
        })
    }

    /// Single treasury attempt; anything unpaid lands in the dust counter.
    async fn pay_or_defer_house_fee(
        &self,
        duel_id: &DuelId,
        token: TokenSymbol,
        house_fee: Lamports,
    ) -> Result<Option<String>, EscrowError> {
        if house_fee == Lamports::ZERO {
            return Ok(None);
        }
        if house_fee < token.params().min_transfer_out {
            let total = self.store.add_dust(token, house_fee)?;
            info!(
                duel_id = %duel_id,
                token = %token,
                house_fee = %house_fee,
                dust_total = %total,
                "house fee below minimum transfer, deferred to dust"
            );
            return Ok(None);
        }

        let intent = TransferIntent {
            sender: SignerRole::Escrow,
            recipient_wallet: self.transfers.treasury_wallet().to_string(),
            token,
            amount: house_fee,
            nonce: rand::random(),
        };
        match self.transfers.internal_transfer(&intent).await {
            Ok(tx_signature) => Ok(Some(tx_signature)),
            Err(err) => {
                let total = self.store.add_dust(token, house_fee)?;
                warn!(
                    duel_id = %duel_id,
                    token = %token,
                    house_fee = %house_fee,
                    dust_total = %total,
                    error = %err,
                    "treasury transfer failed, fee accumulated as dust"
                );
                Ok(None)
            }
        }
    }

    /// Return locked stakes. Pays the nominal stake rather than the
    /// after-deposit-fee amount: the house absorbs the pool's deposit fee
    /// to make players whole.
    pub async fn refund(
        &self,
        duel_id: &DuelId,
        reason: RefundReason,
    ) -> Result<Vec<String>, EscrowError> {
        let lock = self.duel_lock(duel_id)?;
        let _guard = lock.lock().await;

        let mut record = self.store.get(duel_id)?.ok_or(EscrowError::NotFound)?;
        if record.status.is_terminal() {
            return Err(EscrowError::Precondition(format!(
                "duel already finalised (status {})",
                record.status.as_str()
            )));
        }

        let mut tx_signatures = Vec::new();
        let mut any_failed = false;
        for participant in [&record.player1, &record.player2] {
            if !participant.stake_locked {
                continue;
            }
            match self.stealth.resolve(&participant.stealth_id)? {
                Some(wallet) => {
                    let intent = TransferIntent {
                        sender: SignerRole::Escrow,
                        recipient_wallet: wallet.clone(),
                        token: record.token,
                        amount: participant.stake,
                        nonce: rand::random(),
                    };
                    match self.transfers.internal_transfer(&intent).await {
                        Ok(tx_signature) => tx_signatures.push(tx_signature),
                        Err(err) => {
                            any_failed = true;
                            warn!(
                                duel_id = %duel_id,
                                player = %mask(&wallet),
                                error = %err,
                                "refund transfer failed"
                            );
                        }
                    }
                }
                None => {
                    any_failed = true;
                    warn!(
                        duel_id = %duel_id,
                        stealth_id = %participant.stealth_id,
                        "refund could not resolve wallet; emergency refund required"
                    );
                }
            }
        }

        if any_failed {
            self.store.add_failed_recovery(duel_id)?;
        }

        let now = Utc::now();
        record.transition_to(DuelStatus::Refunded, now)?;
        self.store.set(record.clone(), Self::recovery_ttl())?;
        self.stealth.unregister(&record.player1.stealth_id)?;
        self.stealth.unregister(&record.player2.stealth_id)?;
        self.release_duel_lock(duel_id);

        info!(
            duel_id = %duel_id,
            reason = reason.as_str(),
            refunds = tx_signatures.len(),
            "duel refunded"
        );
        Ok(tx_signatures)
    }

    pub fn get_duel(&self, duel_id: &DuelId) -> Result<DuelRecord, EscrowError> {
        self.store.get(duel_id)?.ok_or(EscrowError::NotFound)
    }

    pub fn recovery_status(&self) -> Result<RecoveryStatus, EscrowError> {
        Ok(RecoveryStatus {
            failed_duels: self.store.list_failed_recovery()?,
            pending_settlements: self.store.list_pending_recovery()?,
        })
    }

    pub fn dust_status(&self, token: TokenSymbol) -> Result<DustStatus, EscrowError> {
        let accumulated = self.store.read_dust(token)?;
        let minimum_to_sweep = token.params().min_transfer_out;
        Ok(DustStatus {
            accumulated,
            can_sweep: accumulated >= minimum_to_sweep,
            minimum_to_sweep,
        })
    }

    /// Move accumulated dust to the treasury in one transfer, no retry. The
    /// counter only resets on success.
    pub async fn sweep_dust(&self, token: TokenSymbol) -> Result<SweepOutput, EscrowError> {
        let accumulated = self.store.read_dust(token)?;
        let minimum = token.params().min_transfer_out;
        if accumulated < minimum {
            return Err(EscrowError::Precondition(format!(
                "accumulated dust {accumulated} is below the minimum transfer {minimum}"
            )));
        }

        let intent = TransferIntent {
            sender: SignerRole::Escrow,
            recipient_wallet: self.transfers.treasury_wallet().to_string(),
            token,
            amount: accumulated,
            nonce: rand::random(),
        };
        let tx_signature = self.transfers.internal_transfer(&intent).await?;
        self.store.reset_dust(token)?;

        info!(token = %token, swept = %accumulated, "dust swept to treasury");
        Ok(SweepOutput {
            swept: accumulated,
            tx_signature,
        })
    }

    /// Operator path for duels whose reverse map is gone (process restart)
    /// or whose settlement is wedged. Wallets and stake arrive explicitly;
    /// each player gets one attempt at the after-deposit-fee amount.
    pub async fn emergency_refund(
        &self,
        input: EmergencyRefundInput,
    ) -> Result<Vec<EmergencyRefundResult>, EscrowError> {
        let lock = self.duel_lock(&input.duel_id)?;
        let _guard = lock.lock().await;

        let params = input.token.params();
        let per_player = Lamports(
            input
                .stake_per_player
                .as_u128()
                .saturating_mul(u128::from(10_000 - params.deposit_fee_bps.min(10_000)))
                / 10_000,
        );

        let mut results = Vec::with_capacity(2);
        for wallet in [&input.player1_wallet, &input.player2_wallet] {
            let intent = TransferIntent {
                sender: SignerRole::Escrow,
                recipient_wallet: wallet.trim().to_string(),
                token: input.token,
                amount: per_player,
                nonce: rand::random(),
            };
            match self.transfers.internal_transfer(&intent).await {
                Ok(tx_signature) => results.push(EmergencyRefundResult {
                    player: mask(wallet),
                    success: true,
                    tx_signature: Some(tx_signature),
                    error: None,
                }),
                Err(err) => results.push(EmergencyRefundResult {
                    player: mask(wallet),
                    success: false,
                    tx_signature: None,
                    error: Some(err.to_string()),
                }),
            }
        }

        let all_succeeded = results.iter().all(|r| r.success);
        if all_succeeded {
            self.store.remove_pending_recovery(&input.duel_id)?;
            self.store.remove_failed_recovery(&input.duel_id)?;
            if let Some(mut record) = self.store.get(&input.duel_id)? {
                if !record.status.is_terminal() {
                    record.transition_to(DuelStatus::Refunded, Utc::now())?;
                    self.store.set(record.clone(), Self::recovery_ttl())?;
                    self.stealth.unregister(&record.player1.stealth_id)?;
                    self.stealth.unregister(&record.player2.stealth_id)?;
                }
            }
            self.release_duel_lock(&input.duel_id);
        }

        info!(
            duel_id = %input.duel_id,
            all_succeeded,
            "emergency refund executed"
        );
        Ok(results)
    }
}

/// The lock proof may be a bare tx id or a JSON object wrapping one. The
/// claimed id is recorded as supplied; cross-checking it against the pool
/// is a known production gap.
fn extract_tx_signature(payment_proof: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payment_proof) {
        for key in ["txSignature", "signature", "tx"] {
            if let Some(Value::String(signature)) = map.get(key) {
                return signature.clone();
            }
        }
    }
    payment_proof.to_string()
}
