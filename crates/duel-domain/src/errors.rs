use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid duel id: {0}")]
    InvalidDuelId(String),
    #[error("invalid stealth id: {0}")]
    InvalidStealthId(String),
    #[error("unsupported token: {0}")]
    UnsupportedToken(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transition from {from} to {to} is not allowed")]
    IllegalTransition { from: &'static str, to: &'static str },
}
