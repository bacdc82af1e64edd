use thiserror::Error;

/// Backend-facing error taxonomy. The escrow engine retries only on
/// transient kinds; everything else surfaces immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    InsufficientBalance,
    BelowMinimum,
    InvalidProof,
    UnknownWallet,
    RateLimited,
    Network,
    InvalidKey,
    InvalidRequest,
}

impl TransferErrorKind {
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient-balance",
            Self::BelowMinimum => "below-minimum",
            Self::InvalidProof => "invalid-proof",
            Self::UnknownWallet => "unknown-wallet",
            Self::RateLimited => "rate-limit",
            Self::Network => "network",
            Self::InvalidKey => "invalid-key",
            Self::InvalidRequest => "invalid-request",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} error: {message}", kind.as_str())]
pub struct TransferClientError {
    pub kind: TransferErrorKind,
    pub message: String,
}

impl TransferClientError {
    #[must_use]
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Map a backend-reported error string onto the taxonomy. The backend's
/// codes are short snake_case tags; match loosely on the stem.
#[must_use]
pub fn classify_backend_error(error: &str) -> TransferErrorKind {
    let lowered = error.to_ascii_lowercase();
    if lowered.contains("insufficient") {
        TransferErrorKind::InsufficientBalance
    } else if lowered.contains("minimum") || lowered.contains("below_min") {
        TransferErrorKind::BelowMinimum
    } else if lowered.contains("proof") || lowered.contains("commitment") {
        TransferErrorKind::InvalidProof
    } else if lowered.contains("rate") {
        TransferErrorKind::RateLimited
    } else if lowered.contains("unknown_wallet") || lowered.contains("not_found") {
        TransferErrorKind::UnknownWallet
    } else {
        TransferErrorKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_split_matches_retry_policy() {
        assert!(TransferErrorKind::Network.is_transient());
        assert!(TransferErrorKind::RateLimited.is_transient());
        assert!(!TransferErrorKind::InsufficientBalance.is_transient());
        assert!(!TransferErrorKind::BelowMinimum.is_transient());
        assert!(!TransferErrorKind::InvalidProof.is_transient());
    }

    #[test]
    fn backend_codes_map_to_kinds() {
        assert_eq!(
            classify_backend_error("insufficient_balance"),
            TransferErrorKind::InsufficientBalance
        );
        assert_eq!(
            classify_backend_error("amount_below_minimum"),
            TransferErrorKind::BelowMinimum
        );
        assert_eq!(
            classify_backend_error("invalid_range_proof"),
            TransferErrorKind::InvalidProof
        );
        assert_eq!(
            classify_backend_error("rate_limited"),
            TransferErrorKind::RateLimited
        );
        assert_eq!(
            classify_backend_error("wallet_not_found"),
            TransferErrorKind::UnknownWallet
        );
        assert_eq!(
            classify_backend_error("internal server error"),
            TransferErrorKind::Network
        );
    }
}
