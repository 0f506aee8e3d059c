//! asset_market Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod coordinator;
pub mod domain;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::{Config, LogFormat};
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext, Price};
pub use coordinator::{
    check_balance, DepositCommand, DepositCoordinator, PurchaseCommand, PurchaseCoordinator,
    TransactionSettings,
};
