//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::traits::*;
use crate::types::*;

/// Committed account state plus the lock guarding its row
#[derive(Debug)]
struct AccountRow {
    account: Account,
    lock: Arc<Mutex<()>>,
}

/// Committed state. Writers publish a whole transaction under one write
/// guard, so readers never see half of one.
#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<RecordId, AccountRow>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    next_account_id: AtomicI64,
    next_transfer_id: AtomicI64,
    next_entry_id: AtomicI64,
}

impl Shared {
    fn next_id(counter: &AtomicI64) -> RecordId {
        counter.fetch_add(1, Ordering::SeqCst)
    }
}

/// In-memory storage implementation for testing and development
///
/// Each account row is guarded by its own async mutex. A transaction takes
/// the guard on first touch and keeps it until commit or rollback, which
/// mirrors `SELECT ... FOR UPDATE` row locking. IDs come from counters that
/// are not rolled back, so aborted transactions leave gaps.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                next_account_id: AtomicI64::new(1),
                next_transfer_id: AtomicI64::new(1),
                next_entry_id: AtomicI64::new(1),
            }),
        }
    }

    /// Clear all data (useful for testing)
    pub async fn clear(&self) {
        let mut tables = self.shared.tables.write().await;
        *tables = Tables::default();
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            row_guards: HashMap::new(),
            staged_accounts: BTreeMap::new(),
            staged_transfers: Vec::new(),
            staged_entries: Vec::new(),
        })
    }

    async fn create_account(
        &self,
        owner: &str,
        currency: &str,
        balance: i64,
    ) -> LedgerResult<Account> {
        let id = Shared::next_id(&self.shared.next_account_id);
        let account = Account::new(id, owner.to_string(), currency.to_string(), balance);

        let mut tables = self.shared.tables.write().await;
        tables.accounts.insert(
            id,
            AccountRow {
                account: account.clone(),
                lock: Arc::new(Mutex::new(())),
            },
        );
        if balance != 0 {
            let entry_id = Shared::next_id(&self.shared.next_entry_id);
            tables.entries.push(Entry::new(entry_id, id, balance));
        }

        Ok(account)
    }

    async fn get_account(&self, account_id: RecordId) -> LedgerResult<Option<Account>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .accounts
            .get(&account_id)
            .map(|row| row.account.clone()))
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .map(|row| row.account.clone())
            .collect())
    }

    async fn get_transfer(&self, transfer_id: RecordId) -> LedgerResult<Option<Transfer>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .transfers
            .iter()
            .find(|transfer| transfer.id == transfer_id)
            .cloned())
    }

    async fn list_transfers(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Transfer>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .transfers
            .iter()
            .filter(|transfer| {
                account_id.is_none_or(|id| {
                    transfer.from_account_id == id || transfer.to_account_id == id
                })
            })
            .cloned()
            .collect())
    }

    async fn list_entries(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Entry>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .entries
            .iter()
            .filter(|entry| account_id.is_none_or(|id| entry.account_id == id))
            .cloned()
            .collect())
    }
}

/// Transaction handle of [`MemoryStorage`]
///
/// Holds the row guards it acquired and stages every write locally.
/// Dropping it releases the guards and discards the staged writes.
#[derive(Debug)]
pub struct MemoryTx {
    shared: Arc<Shared>,
    row_guards: HashMap<RecordId, OwnedMutexGuard<()>>,
    staged_accounts: BTreeMap<RecordId, Account>,
    staged_transfers: Vec<Transfer>,
    staged_entries: Vec<Entry>,
}

impl MemoryTx {
    async fn account_exists(&self, account_id: RecordId) -> bool {
        self.shared
            .tables
            .read()
            .await
            .accounts
            .contains_key(&account_id)
    }

    /// Acquire the row lock of an account unless this transaction holds it
    async fn lock_row(&mut self, account_id: RecordId) -> LedgerResult<()> {
        if self.row_guards.contains_key(&account_id) {
            return Ok(());
        }

        // The tables guard must be released before waiting on the row lock,
        // otherwise the holder of the row could never commit.
        let lock = {
            let tables = self.shared.tables.read().await;
            let row = tables
                .accounts
                .get(&account_id)
                .ok_or(LedgerError::AccountNotFound(account_id))?;
            Arc::clone(&row.lock)
        };

        let guard = lock.lock_owned().await;
        self.row_guards.insert(account_id, guard);
        Ok(())
    }
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn get_account_for_update(&mut self, account_id: RecordId) -> LedgerResult<Account> {
        if let Some(account) = self.staged_accounts.get(&account_id) {
            return Ok(account.clone());
        }

        self.lock_row(account_id).await?;

        // With the row lock held, the committed value cannot change under us.
        let account = {
            let tables = self.shared.tables.read().await;
            tables
                .accounts
                .get(&account_id)
                .map(|row| row.account.clone())
                .ok_or(LedgerError::AccountNotFound(account_id))?
        };

        self.staged_accounts.insert(account_id, account.clone());
        Ok(account)
    }

    async fn update_account_balance(
        &mut self,
        account_id: RecordId,
        balance: i64,
    ) -> LedgerResult<Account> {
        let mut account = self.get_account_for_update(account_id).await?;
        account.balance = balance;
        self.staged_accounts.insert(account_id, account.clone());
        Ok(account)
    }

    async fn insert_transfer(
        &mut self,
        from_account_id: RecordId,
        to_account_id: RecordId,
        amount: i64,
    ) -> LedgerResult<Transfer> {
        for account_id in [from_account_id, to_account_id] {
            if !self.account_exists(account_id).await {
                return Err(LedgerError::AccountNotFound(account_id));
            }
        }
        if amount <= 0 {
            return Err(LedgerError::Storage(format!(
                "transfers.amount must be positive, got {}",
                amount
            )));
        }

        let id = Shared::next_id(&self.shared.next_transfer_id);
        let transfer = Transfer::new(id, from_account_id, to_account_id, amount);
        self.staged_transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn insert_entry(&mut self, account_id: RecordId, amount: i64) -> LedgerResult<Entry> {
        if !self.account_exists(account_id).await {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let id = Shared::next_id(&self.shared.next_entry_id);
        let entry = Entry::new(id, account_id, amount);
        self.staged_entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(mut self) -> LedgerResult<()> {
        let mut tables = self.shared.tables.write().await;

        if let Some(missing) = self
            .staged_accounts
            .keys()
            .find(|id| !tables.accounts.contains_key(*id))
        {
            return Err(LedgerError::AccountNotFound(*missing));
        }
        for (account_id, account) in std::mem::take(&mut self.staged_accounts) {
            if let Some(row) = tables.accounts.get_mut(&account_id) {
                row.account = account;
            }
        }
        tables
            .transfers
            .extend(std::mem::take(&mut self.staged_transfers));
        tables
            .entries
            .extend(std::mem::take(&mut self.staged_entries));

        drop(tables);
        // Row guards are released only after the new state is published.
        self.row_guards.clear();
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        tracing::debug!(
            locked_rows = self.row_guards.len(),
            staged_entries = self.staged_entries.len(),
            "Rolling back in-memory transaction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_opening_balance_is_recorded_as_entry() {
        let storage = MemoryStorage::new();
        let funded = storage.create_account("alice", "USD", 100).await.unwrap();
        let empty = storage.create_account("bob", "EUR", 0).await.unwrap();

        let entries = storage.list_entries(Some(funded.id)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 100);
        assert!(storage.list_entries(Some(empty.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let storage = MemoryStorage::new();
        let alice = storage.create_account("alice", "USD", 100).await.unwrap();
        let bob = storage.create_account("bob", "USD", 0).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        tx.update_account_balance(alice.id, 40).await.unwrap();
        tx.insert_transfer(alice.id, bob.id, 60).await.unwrap();

        let seen = storage.get_account(alice.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, 100);
        assert!(storage.list_transfers(None).await.unwrap().is_empty());

        tx.commit().await.unwrap();
        let seen = storage.get_account(alice.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, 40);
        assert_eq!(storage.list_transfers(Some(bob.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back_and_releases_lock() {
        let storage = MemoryStorage::new();
        let alice = storage.create_account("alice", "USD", 100).await.unwrap();

        {
            let mut tx = storage.begin().await.unwrap();
            tx.update_account_balance(alice.id, 1).await.unwrap();
            tx.insert_entry(alice.id, -99).await.unwrap();
        }

        let mut tx = storage.begin().await.unwrap();
        let account = tokio::time::timeout(
            Duration::from_secs(1),
            tx.get_account_for_update(alice.id),
        )
        .await
        .expect("row lock should have been released")
        .unwrap();
        assert_eq!(account.balance, 100);
        assert_eq!(storage.list_entries(Some(alice.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction() {
        let storage = MemoryStorage::new();
        let alice = storage.create_account("alice", "USD", 100).await.unwrap();

        let mut holder = storage.begin().await.unwrap();
        holder.get_account_for_update(alice.id).await.unwrap();

        let mut waiter = storage.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            waiter.get_account_for_update(alice.id),
        )
        .await;
        assert!(blocked.is_err());

        holder.update_account_balance(alice.id, 150).await.unwrap();
        holder.commit().await.unwrap();

        let account = waiter.get_account_for_update(alice.id).await.unwrap();
        assert_eq!(account.balance, 150);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_transfer() {
        let storage = MemoryStorage::new();
        let alice = storage.create_account("alice", "USD", 100).await.unwrap();
        let bob = storage.create_account("bob", "USD", 0).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        let err = tx.insert_transfer(alice.id, bob.id, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_clear() {
        let storage = MemoryStorage::new();
        storage.create_account("alice", "USD", 100).await.unwrap();
        storage.clear().await;
        assert!(storage.list_accounts().await.unwrap().is_empty());
        assert!(storage.list_entries(None).await.unwrap().is_empty());
    }
}
