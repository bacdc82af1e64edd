use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token amount in the smallest on-pool unit (lamport-scale integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lamports(pub u128);

impl Lamports {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn as_u128(self) -> u128 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(MoneyError::Underflow)
    }

    /// Basis-point share of an amount. Pool units are integers, so the
    /// share always rounds down.
    #[must_use]
    pub fn bps_share(self, bps: u16) -> Self {
        Self(self.0.saturating_mul(u128::from(bps)) / 10_000)
    }
}

impl std::fmt::Display for Lamports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount overflow")]
    Overflow,
    #[error("amount underflow")]
    Underflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_math_detects_overflow_and_underflow() {
        assert_eq!(
            Lamports(u128::MAX).checked_add(Lamports(1)),
            Err(MoneyError::Overflow)
        );
        assert_eq!(
            Lamports::ZERO.checked_sub(Lamports(1)),
            Err(MoneyError::Underflow)
        );
        assert_eq!(
            Lamports(2).checked_add(Lamports(3)).expect("sum"),
            Lamports(5)
        );
    }

    #[test]
    fn bps_share_rounds_down() {
        // 2% of 199_000_000 = 3_980_000 exactly.
        assert_eq!(Lamports(199_000_000).bps_share(200), Lamports(3_980_000));
        // 3% of 33 = 0.99, floors to 0.
        assert_eq!(Lamports(33).bps_share(300), Lamports(0));
        assert_eq!(Lamports(34).bps_share(300), Lamports(1));
    }

    #[test]
    fn serializes_transparent() {
        let json = serde_json::to_string(&Lamports(100_000_000)).expect("serialize");
        assert_eq!(json, "100000000");
    }
}
