use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::money::Lamports;

/// Closed set of pool tokens the escrow accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenSymbol {
    #[serde(rename = "SOL")]
    Sol,
    #[serde(rename = "USD1")]
    Usd1,
    #[serde(rename = "RADR")]
    Radr,
}

/// Static per-token escrow parameters. Fees are basis points of the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParams {
    pub decimals: u32,
    pub min_stake: Lamports,
    pub min_transfer_out: Lamports,
    pub deposit_fee_bps: u16,
}

const SOL_PARAMS: TokenParams = TokenParams {
    decimals: 9,
    min_stake: Lamports(10_000_000),
    min_transfer_out: Lamports(100_000_000),
    deposit_fee_bps: 50,
};

const USD1_PARAMS: TokenParams = TokenParams {
    decimals: 6,
    min_stake: Lamports(1_000_000),
    min_transfer_out: Lamports(1_000_000),
    deposit_fee_bps: 50,
};

const RADR_PARAMS: TokenParams = TokenParams {
    decimals: 9,
    min_stake: Lamports(1_000_000_000),
    min_transfer_out: Lamports(1_000_000_000),
    deposit_fee_bps: 50,
};

impl TokenSymbol {
    pub const ALL: [Self; 3] = [Self::Sol, Self::Usd1, Self::Radr];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sol => "SOL",
            Self::Usd1 => "USD1",
            Self::Radr => "RADR",
        }
    }

    #[must_use]
    pub fn params(self) -> &'static TokenParams {
        match self {
            Self::Sol => &SOL_PARAMS,
            Self::Usd1 => &USD1_PARAMS,
            Self::Radr => &RADR_PARAMS,
        }
    }

    /// Convert a human-unit amount to base units, rounding to the nearest
    /// integer unit.
    pub fn to_base_units(self, amount: f64) -> Result<Lamports, DomainError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(DomainError::InvalidAmount(amount.to_string()));
        }
        let scale = 10_f64.powi(self.params().decimals as i32);
        let scaled = (amount * scale).round();
        if scaled > u128::MAX as f64 {
            return Err(DomainError::InvalidAmount(amount.to_string()));
        }
        Ok(Lamports(scaled as u128))
    }
}

impl std::str::FromStr for TokenSymbol {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SOL" => Ok(Self::Sol),
            "USD1" => Ok(Self::Usd1),
            "RADR" => Ok(Self::Radr),
            other => Err(DomainError::UnsupportedToken(other.to_string())),
        }
    }
}

impl std::fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unit_conversion_matches_decimals() {
        assert_eq!(
            TokenSymbol::Sol.to_base_units(0.1).expect("sol"),
            Lamports(100_000_000)
        );
        assert_eq!(
            TokenSymbol::Sol.to_base_units(0.11).expect("sol"),
            Lamports(110_000_000)
        );
        assert_eq!(
            TokenSymbol::Usd1.to_base_units(2.5).expect("usd1"),
            Lamports(2_500_000)
        );
    }

    #[test]
    fn conversion_rejects_non_positive_and_non_finite() {
        assert!(TokenSymbol::Sol.to_base_units(0.0).is_err());
        assert!(TokenSymbol::Sol.to_base_units(-1.0).is_err());
        assert!(TokenSymbol::Sol.to_base_units(f64::NAN).is_err());
        assert!(TokenSymbol::Sol.to_base_units(f64::INFINITY).is_err());
    }

    #[test]
    fn symbols_round_trip_through_serde_and_from_str() {
        for token in TokenSymbol::ALL {
            let json = serde_json::to_string(&token).expect("serialize");
            assert_eq!(json, format!("\"{}\"", token.as_str()));
            let parsed: TokenSymbol = token.as_str().parse().expect("parse");
            assert_eq!(parsed, token);
        }
        assert!("DOGE".parse::<TokenSymbol>().is_err());
    }
}
