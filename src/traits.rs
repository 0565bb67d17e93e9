//! Traits for storage abstraction

use async_trait::async_trait;

use crate::types::*;

/// One open transaction against the ledger store
///
/// Every read and write issued through a `StorageTx` belongs to the same
/// transaction. Nothing becomes visible to other callers until `commit`.
/// Dropping the handle without committing rolls the transaction back and
/// releases every row lock it holds.
#[async_trait]
pub trait StorageTx: Send {
    /// Read an account and hold an exclusive lock on its row until the
    /// transaction resolves
    async fn get_account_for_update(&mut self, account_id: RecordId) -> LedgerResult<Account>;

    /// Overwrite an account's balance, returning the updated snapshot
    async fn update_account_balance(
        &mut self,
        account_id: RecordId,
        balance: i64,
    ) -> LedgerResult<Account>;

    /// Append a transfer record
    async fn insert_transfer(
        &mut self,
        from_account_id: RecordId,
        to_account_id: RecordId,
        amount: i64,
    ) -> LedgerResult<Transfer>;

    /// Append a signed ledger entry
    async fn insert_entry(&mut self, account_id: RecordId, amount: i64) -> LedgerResult<Entry>;

    /// Make every change of this transaction durable and visible at once
    async fn commit(self) -> LedgerResult<()>;

    /// Discard every change of this transaction
    async fn rollback(self) -> LedgerResult<()>;
}

/// Storage abstraction for the transfer engine
///
/// Implemented by the PostgreSQL backend and by the in-memory backend used
/// in tests. Only `begin` participates in transfers; the remaining methods
/// are single-row accessors for seeding and auditing.
#[async_trait]
pub trait LedgerStorage: Send + Sync + Clone + 'static {
    type Tx: StorageTx + 'static;

    /// Open a new transaction
    async fn begin(&self) -> LedgerResult<Self::Tx>;

    /// Create an account with an opening balance
    ///
    /// A non-zero opening balance is recorded as an entry so the account's
    /// balance always equals the sum of its entries.
    async fn create_account(
        &self,
        owner: &str,
        currency: &str,
        balance: i64,
    ) -> LedgerResult<Account>;

    /// Get the committed state of an account
    async fn get_account(&self, account_id: RecordId) -> LedgerResult<Option<Account>>;

    /// List all accounts ordered by ID
    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;

    /// Get a transfer by ID
    async fn get_transfer(&self, transfer_id: RecordId) -> LedgerResult<Option<Transfer>>;

    /// List transfers touching an account, or all transfers
    async fn list_transfers(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Transfer>>;

    /// List entries of an account, or all entries
    async fn list_entries(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Entry>>;
}
