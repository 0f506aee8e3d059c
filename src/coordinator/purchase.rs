//! Purchase Transaction Coordinator
//!
//! Buys access to an asset in one transaction: lock the asset row, reject
//! self-purchase, insert the grant, debit the buyer, commit. Any failure
//! after the lock rolls back the grant and the debit together.

use sqlx::PgPool;

use crate::domain::{ensure_positive_id, DomainError, OperationContext};
use crate::store::{AccountStore, AssetCatalog, GrantRegistry, PurchaseTerms};

use super::transaction::{self, run_with_retry, TransactionSettings};
use super::{PurchaseCommand, PurchaseResult};

/// Coordinator for asset purchases
pub struct PurchaseCoordinator {
    pool: PgPool,
    catalog: AssetCatalog,
    accounts: AccountStore,
    grants: GrantRegistry,
    settings: TransactionSettings,
}

impl PurchaseCoordinator {
    pub fn new(pool: PgPool, settings: TransactionSettings) -> Self {
        Self {
            catalog: AssetCatalog::new(pool.clone()),
            accounts: AccountStore::new(pool.clone()),
            grants: GrantRegistry::new(pool.clone()),
            pool,
            settings,
        }
    }

    /// Execute the purchase command.
    ///
    /// Re-running after `TransactionFailed` or `StoreUnavailable` is safe: the
    /// grant key makes a second success impossible.
    pub async fn execute(
        &self,
        command: PurchaseCommand,
        context: &OperationContext,
    ) -> Result<PurchaseResult, DomainError> {
        ensure_positive_id("buyer id", command.buyer_id)?;
        ensure_positive_id("asset id", command.asset_id)?;

        let result = run_with_retry(&self.settings, "purchase", |attempt| {
            self.try_purchase(command, attempt)
        })
        .await;

        match &result {
            Ok(purchase) => tracing::info!(
                buyer_id = purchase.buyer_id,
                asset_id = purchase.asset_id,
                seller_id = purchase.seller_id,
                price = %purchase.price,
                balance = %purchase.balance,
                correlation_id = ?context.correlation_id,
                api_key_id = ?context.api_key_id,
                client_ip = ?context.client_ip,
                "Asset purchased"
            ),
            Err(e) if e.is_client_error() => tracing::warn!(
                buyer_id = command.buyer_id,
                asset_id = command.asset_id,
                correlation_id = ?context.correlation_id,
                error = %e,
                "Purchase rejected"
            ),
            Err(e) => tracing::error!(
                buyer_id = command.buyer_id,
                asset_id = command.asset_id,
                correlation_id = ?context.correlation_id,
                api_key_id = ?context.api_key_id,
                client_ip = ?context.client_ip,
                error = %e,
                "Purchase failed"
            ),
        }

        result
    }

    /// One attempt: a single transaction from lock to commit
    async fn try_purchase(
        &self,
        command: PurchaseCommand,
        attempt: u32,
    ) -> Result<PurchaseResult, DomainError> {
        let mut tx = transaction::begin(&self.pool, self.settings.isolation, self.settings.timeout).await?;

        // 1. Lock the asset before touching the account or the grant
        let terms = self
            .catalog
            .lock_and_read_for_purchase(&mut tx, command.asset_id)
            .await?;

        tracing::debug!(
            asset_id = command.asset_id,
            price = %terms.price,
            owner_id = terms.owner_id,
            attempt,
            "Asset locked for purchase"
        );

        // 2. Ownership check under the lock
        if let Err(rejection) = check_terms(&command, &terms) {
            return Err(transaction::abort(tx, rejection).await);
        }

        // 3. Grant access; an existing grant wins over any balance check
        let granted = match self
            .grants
            .grant_if_absent(&mut tx, command.asset_id, command.buyer_id, terms.price)
            .await
        {
            Ok(granted) => granted,
            Err(e) => return Err(transaction::abort(tx, e).await),
        };

        if !granted {
            let rejection = DomainError::AlreadyPurchased {
                asset_id: command.asset_id,
                user_id: command.buyer_id,
            };
            return Err(transaction::abort(tx, rejection).await);
        }

        // 4. Debit the buyer; insufficient funds undoes the grant above
        let balance = match self
            .accounts
            .adjust_balance(&mut tx, command.buyer_id, -terms.price)
            .await
        {
            Ok(balance) => balance,
            Err(e) => return Err(transaction::abort(tx, e).await),
        };

        // 5. Commit both effects together
        transaction::commit(tx).await?;

        Ok(PurchaseResult {
            asset_id: command.asset_id,
            buyer_id: command.buyer_id,
            seller_id: terms.owner_id,
            price: terms.price,
            balance: balance.value(),
        })
    }
}

/// Validation of the locked asset terms; runs without I/O
fn check_terms(command: &PurchaseCommand, terms: &PurchaseTerms) -> Result<(), DomainError> {
    if terms.owner_id == command.buyer_id {
        return Err(DomainError::SelfPurchaseForbidden {
            asset_id: command.asset_id,
            user_id: command.buyer_id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_owner_cannot_buy_own_asset() {
        let command = PurchaseCommand::new(7, 3);
        let terms = PurchaseTerms { price: dec!(150), owner_id: 7 };

        assert_eq!(
            check_terms(&command, &terms),
            Err(DomainError::SelfPurchaseForbidden { asset_id: 3, user_id: 7 })
        );
    }

    #[test]
    fn test_other_buyer_passes_terms_check() {
        let command = PurchaseCommand::new(1, 3);
        let terms = PurchaseTerms { price: dec!(0), owner_id: 2 };

        assert!(check_terms(&command, &terms).is_ok());
    }
}
