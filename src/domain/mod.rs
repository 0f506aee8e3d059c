//! Domain module
//!
//! Core domain types and business rules of the marketplace ledger.

pub mod amount;
pub mod context;
pub mod error;
pub mod model;

pub use amount::{Amount, AmountError, Balance, Price};
pub use context::OperationContext;
pub use error::DomainError;
pub use model::{ensure_positive_id, Asset, AssetId, NewAsset, User, UserId};
