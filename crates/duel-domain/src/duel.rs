use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;
use crate::ids::{DuelId, StealthId};
use crate::money::Lamports;
use crate::token::TokenSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelStatus {
    PendingStakes,
    Active,
    PendingSettlement,
    Settled,
    Refunded,
    /// Reserved for unrecoverable duels surfaced to operators. No engine
    /// path enters it; exhausted settlements revert to ACTIVE instead.
    Failed,
}

impl DuelStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingStakes => "PENDING_STAKES",
            Self::Active => "ACTIVE",
            Self::PendingSettlement => "PENDING_SETTLEMENT",
            Self::Settled => "SETTLED",
            Self::Refunded => "REFUNDED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Refunded)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingStakes, Self::Active)
                | (Self::PendingStakes, Self::Refunded)
                | (Self::Active, Self::PendingSettlement)
                | (Self::Active, Self::Refunded)
                | (Self::PendingSettlement, Self::Settled)
                | (Self::PendingSettlement, Self::Active)
                | (Self::PendingSettlement, Self::Refunded)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub stealth_id: StealthId,
    pub character_id: String,
    pub display_name: String,
    pub stake: Lamports,
    pub stake_locked: bool,
    pub lock_tx_signature: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl Participant {
    #[must_use]
    pub fn new(
        stealth_id: StealthId,
        character_id: impl Into<String>,
        display_name: impl Into<String>,
        stake: Lamports,
    ) -> Self {
        Self {
            stealth_id,
            character_id: character_id.into(),
            display_name: display_name.into(),
            stake,
            stake_locked: false,
            lock_tx_signature: None,
            locked_at: None,
        }
    }
}

/// Post-match summary passed through from the game server, stored verbatim.
pub type CombatSummary = Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelRecord {
    pub duel_id: DuelId,
    pub status: DuelStatus,
    pub player1: Participant,
    pub player2: Participant,
    pub token: TokenSymbol,
    pub house_fee_percent: u8,
    pub rules: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub winner_stealth_id: Option<StealthId>,
    pub settlement_tx_signatures: Vec<String>,
    pub combat_summary: Option<CombatSummary>,
}

impl DuelRecord {
    #[must_use]
    pub fn both_locked(&self) -> bool {
        self.player1.stake_locked && self.player2.stake_locked
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn participant(&self, stealth_id: &StealthId) -> Option<&Participant> {
        if &self.player1.stealth_id == stealth_id {
            Some(&self.player1)
        } else if &self.player2.stealth_id == stealth_id {
            Some(&self.player2)
        } else {
            None
        }
    }

    #[must_use]
    pub fn participant_mut(&mut self, stealth_id: &StealthId) -> Option<&mut Participant> {
        if &self.player1.stealth_id == stealth_id {
            Some(&mut self.player1)
        } else if &self.player2.stealth_id == stealth_id {
            Some(&mut self.player2)
        } else {
            None
        }
    }

    /// The other participant's stealth id, if the given one belongs to the
    /// duel at all.
    #[must_use]
    pub fn opponent_of(&self, stealth_id: &StealthId) -> Option<&StealthId> {
        if &self.player1.stealth_id == stealth_id {
            Some(&self.player2.stealth_id)
        } else if &self.player2.stealth_id == stealth_id {
            Some(&self.player1.stealth_id)
        } else {
            None
        }
    }

    pub fn transition_to(&mut self, next: DuelStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::IllegalTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stealth(byte: u8) -> StealthId {
        StealthId::from_hex(hex::encode([byte; 32])).expect("stealth id")
    }

    fn record() -> DuelRecord {
        let now = Utc::now();
        DuelRecord {
            duel_id: DuelId::generate(),
            status: DuelStatus::PendingStakes,
            player1: Participant::new(stealth(1), "char-1", "Avara", Lamports(100_000_000)),
            player2: Participant::new(stealth(2), "char-2", "Brakk", Lamports(100_000_000)),
            token: TokenSymbol::Sol,
            house_fee_percent: 2,
            rules: serde_json::json!({"suddenDeath": true, "timeLimitSeconds": 180}),
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::seconds(1800),
            winner_stealth_id: None,
            settlement_tx_signatures: Vec::new(),
            combat_summary: None,
        }
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&DuelStatus::PendingStakes).expect("serialize");
        assert_eq!(json, "\"PENDING_STAKES\"");
        let json = serde_json::to_string(&DuelStatus::PendingSettlement).expect("serialize");
        assert_eq!(json, "\"PENDING_SETTLEMENT\"");
    }

    #[test]
    fn transitions_follow_the_lifecycle_graph() {
        use DuelStatus::*;
        assert!(PendingStakes.can_transition_to(Active));
        assert!(PendingStakes.can_transition_to(Refunded));
        assert!(Active.can_transition_to(PendingSettlement));
        assert!(PendingSettlement.can_transition_to(Settled));
        // Exhausted settlement reverts.
        assert!(PendingSettlement.can_transition_to(Active));

        assert!(!PendingStakes.can_transition_to(Settled));
        assert!(!Settled.can_transition_to(Active));
        assert!(!Refunded.can_transition_to(PendingStakes));
        assert!(!Active.can_transition_to(Failed));
    }

    #[test]
    fn transition_to_rejects_illegal_moves_and_stamps_updated_at() {
        let mut rec = record();
        let later = rec.created_at + chrono::Duration::seconds(5);
        rec.transition_to(DuelStatus::Active, later).expect("legal");
        assert_eq!(rec.status, DuelStatus::Active);
        assert_eq!(rec.updated_at, later);

        let err = rec
            .transition_to(DuelStatus::PendingStakes, later)
            .expect_err("illegal");
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
        assert_eq!(rec.status, DuelStatus::Active);
    }

    #[test]
    fn participant_lookup_is_symmetric() {
        let rec = record();
        assert_eq!(
            rec.opponent_of(&rec.player1.stealth_id.clone()),
            Some(&rec.player2.stealth_id)
        );
        assert!(rec.participant(&stealth(9)).is_none());
        assert!(rec.opponent_of(&stealth(9)).is_none());
    }

    #[test]
    fn both_locked_requires_both_flags() {
        let mut rec = record();
        assert!(!rec.both_locked());
        rec.player1.stake_locked = true;
        assert!(!rec.both_locked());
        rec.player2.stake_locked = true;
        assert!(rec.both_locked());
    }
}
