//! Command definitions
//!
//! Commands represent intentions to change balances or grants.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AssetId, UserId};

// =========================================================================
// PurchaseCommand
// =========================================================================

/// Command to buy access to an asset owned by another user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCommand {
    /// Authenticated caller paying for the asset
    pub buyer_id: UserId,
    pub asset_id: AssetId,
}

impl PurchaseCommand {
    pub fn new(buyer_id: UserId, asset_id: AssetId) -> Self {
        Self { buyer_id, asset_id }
    }
}

// =========================================================================
// DepositCommand
// =========================================================================

/// Command to add funds to the caller's account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositCommand {
    pub user_id: UserId,
    /// Unvalidated amount; the coordinator rejects non-positive values
    pub amount: Decimal,
}

impl DepositCommand {
    pub fn new(user_id: UserId, amount: Decimal) -> Self {
        Self { user_id, amount }
    }
}

/// Result of a committed purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub asset_id: AssetId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub price: Decimal,
    /// Buyer's balance after the debit
    pub balance: Decimal,
}

/// Result of a committed deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositResult {
    pub user_id: UserId,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub balance: Decimal,
}
