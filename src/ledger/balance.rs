//! Balance mutation primitive

use crate::traits::StorageTx;
use crate::types::*;

/// Apply a signed delta to one account's balance
///
/// Locks the account row for the rest of the enclosing transaction, then
/// writes the new balance. Must run inside a transaction; it never commits
/// or rolls back on its own.
pub async fn add_balance<T>(tx: &mut T, account_id: RecordId, delta: i64) -> LedgerResult<Account>
where
    T: StorageTx + ?Sized,
{
    let account = tx.get_account_for_update(account_id).await?;

    let balance = account
        .balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow {
            account_id,
            balance: account.balance,
            delta,
        })?;

    tracing::debug!(account_id, delta, balance, "Applying balance delta");

    tx.update_account_balance(account_id, balance).await
}
