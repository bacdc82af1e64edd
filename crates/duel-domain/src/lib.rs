pub mod duel;
pub mod errors;
pub mod ids;
pub mod money;
pub mod token;

pub use duel::{CombatSummary, DuelRecord, DuelStatus, Participant};
pub use errors::DomainError;
pub use ids::{DuelId, StealthId};
pub use money::{Lamports, MoneyError};
pub use token::{TokenParams, TokenSymbol};
