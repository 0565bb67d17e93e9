//! Append-only writers for transfer and entry records

use crate::traits::StorageTx;
use crate::types::*;

/// Append the record of a transfer
pub async fn create_transfer<T>(
    tx: &mut T,
    from_account_id: RecordId,
    to_account_id: RecordId,
    amount: i64,
) -> LedgerResult<Transfer>
where
    T: StorageTx + ?Sized,
{
    let transfer = tx
        .insert_transfer(from_account_id, to_account_id, amount)
        .await?;
    tracing::debug!(
        transfer_id = transfer.id,
        from_account_id,
        to_account_id,
        amount,
        "Transfer record written"
    );
    Ok(transfer)
}

/// Append one signed entry against an account
pub async fn create_entry<T>(tx: &mut T, account_id: RecordId, amount: i64) -> LedgerResult<Entry>
where
    T: StorageTx + ?Sized,
{
    let entry = tx.insert_entry(account_id, amount).await?;
    tracing::debug!(entry_id = entry.id, account_id, amount, "Entry written");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LedgerStorage;
    use crate::utils::memory_storage::MemoryStorage;

    #[tokio::test]
    async fn test_records_get_fresh_ids() {
        let storage = MemoryStorage::new();
        let alice = storage.create_account("alice", "USD", 0).await.unwrap();
        let bob = storage.create_account("bob", "USD", 0).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        let first = create_entry(&mut tx, alice.id, -5).await.unwrap();
        let second = create_entry(&mut tx, bob.id, 5).await.unwrap();
        let transfer = create_transfer(&mut tx, alice.id, bob.id, 5).await.unwrap();
        tx.commit().await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(transfer.from_account_id, alice.id);
        assert_eq!(transfer.to_account_id, bob.id);
        assert_eq!(storage.get_transfer(transfer.id).await.unwrap(), Some(transfer));
    }

    #[tokio::test]
    async fn test_entry_for_unknown_account() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();

        let err = create_entry(&mut tx, 41, 10).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(41)));
    }
}
