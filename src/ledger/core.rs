//! Transfer orchestrator that coordinates records, entries and balances

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::config::LedgerConfig;
use crate::ledger::balance::add_balance;
use crate::ledger::lock_order::lock_order;
use crate::ledger::records::{create_entry, create_transfer};
use crate::ledger::runner::TxRunner;
use crate::traits::*;
use crate::types::*;

/// Money-transfer engine over one transactional store
#[derive(Debug, Clone)]
pub struct Ledger<S: LedgerStorage> {
    runner: TxRunner<S>,
    transfer_timeout: Option<Duration>,
}

impl<S: LedgerStorage> Ledger<S> {
    /// Create a new ledger with the given storage backend and no timeout
    pub fn new(storage: S) -> Self {
        Self {
            runner: TxRunner::new(storage),
            transfer_timeout: None,
        }
    }

    /// Create a new ledger honouring the configured transfer timeout
    pub fn with_config(storage: S, config: &LedgerConfig) -> Self {
        Self {
            runner: TxRunner::new(storage),
            transfer_timeout: config.transfer_timeout(),
        }
    }

    /// Get the underlying storage backend
    pub fn storage(&self) -> &S {
        self.runner.storage()
    }

    /// Move `amount` from one account to another in a single transaction
    ///
    /// Writes the transfer record and both entries, then applies the two
    /// balance deltas with the account rows locked smaller-ID first. Either
    /// everything commits or nothing is persisted. Exceeding the configured
    /// timeout before commit rolls the attempt back and yields
    /// `LedgerError::Cancelled`.
    pub async fn transfer_tx(&self, params: TransferTxParams) -> LedgerResult<TransferTxResult> {
        self.transfer_tx_until(params, std::future::pending()).await
    }

    /// Like `transfer_tx`, but gives up as soon as `cancel` completes
    ///
    /// The signal and the configured timeout are honoured until the work of
    /// the transfer is done; the commit itself is never interrupted. If
    /// either fires first, the transaction is rolled back and
    /// `LedgerError::Cancelled` is returned.
    pub async fn transfer_tx_until<C>(
        &self,
        params: TransferTxParams,
        cancel: C,
    ) -> LedgerResult<TransferTxResult>
    where
        C: Future<Output = ()>,
    {
        let deadline = self.transfer_timeout;
        let stop = async move {
            let timed_out = async move {
                match deadline {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = timed_out => tracing::warn!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    timeout_ms = deadline.map_or(0, |limit| limit.as_millis() as u64),
                    "Transfer timed out before commit"
                ),
                _ = cancel => tracing::warn!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    "Transfer cancelled by caller"
                ),
            }
        };

        let outcome = self
            .runner
            .exec_tx_until(
                move |tx| Box::pin(async move { run_transfer(tx, params).await }),
                stop,
            )
            .await;

        match &outcome {
            Ok(result) => tracing::info!(
                transfer_id = result.transfer.id,
                from_account_id = params.from_account_id,
                to_account_id = params.to_account_id,
                amount = params.amount,
                "Transfer committed"
            ),
            Err(err) => tracing::warn!(
                from_account_id = params.from_account_id,
                to_account_id = params.to_account_id,
                amount = params.amount,
                code = err.code(),
                error = %err,
                "Transfer aborted"
            ),
        }

        outcome
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: RecordId) -> LedgerResult<Option<Account>> {
        self.storage().get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: RecordId) -> LedgerResult<Account> {
        self.storage()
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// List all accounts ordered by ID
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.storage().list_accounts().await
    }

    /// Get a transfer by ID
    pub async fn get_transfer(&self, transfer_id: RecordId) -> LedgerResult<Option<Transfer>> {
        self.storage().get_transfer(transfer_id).await
    }

    /// List transfers touching an account, or all transfers
    pub async fn list_transfers(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Transfer>> {
        self.storage().list_transfers(account_id).await
    }

    /// List entries of an account, or all entries
    pub async fn list_entries(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Entry>> {
        self.storage().list_entries(account_id).await
    }

    /// Check that every balance equals the sum of its account's entries
    ///
    /// Also checks that every transfer is backed by a debit entry on its
    /// source and a matching credit entry on its destination, and that an
    /// account has at most one entry (its opening balance) outside those
    /// pairs. Entries against unknown accounts and transfers with a
    /// non-positive amount are flagged too. Accounts, entries and transfers
    /// are read separately, so run it while no transfers are in flight.
    pub async fn validate_integrity(&self) -> LedgerResult<LedgerIntegrityReport> {
        let accounts = self.list_accounts().await?;
        let entries = self.list_entries(None).await?;
        let transfers = self.list_transfers(None).await?;

        let mut entry_sums: BTreeMap<RecordId, i128> = BTreeMap::new();
        for entry in &entries {
            *entry_sums.entry(entry.account_id).or_default() += i128::from(entry.amount);
        }

        let mut issues = Vec::new();
        let mut total_balance: i128 = 0;

        for account in &accounts {
            let balance = i128::from(account.balance);
            let ledger_sum = entry_sums.remove(&account.id).unwrap_or(0);
            total_balance += balance;
            if balance != ledger_sum {
                issues.push(format!(
                    "Account {} balance {} does not match entry sum {}",
                    account.id, balance, ledger_sum
                ));
            }
        }

        for (account_id, sum) in entry_sums {
            issues.push(format!(
                "Entries totalling {} reference unknown account {}",
                sum, account_id
            ));
        }

        // Entries not yet paired with a transfer, keyed by (account, amount).
        let mut unpaired: BTreeMap<(RecordId, i64), usize> = BTreeMap::new();
        for entry in &entries {
            *unpaired.entry((entry.account_id, entry.amount)).or_default() += 1;
        }
        let mut take = |account_id: RecordId, amount: i64| {
            match unpaired.get_mut(&(account_id, amount)) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    true
                }
                _ => false,
            }
        };

        for transfer in &transfers {
            if transfer.amount <= 0 {
                issues.push(format!(
                    "Transfer {} has non-positive amount {}",
                    transfer.id, transfer.amount
                ));
                continue;
            }
            if !take(transfer.from_account_id, -transfer.amount) {
                issues.push(format!(
                    "Transfer {} has no debit entry of {} on account {}",
                    transfer.id, -transfer.amount, transfer.from_account_id
                ));
            }
            if !take(transfer.to_account_id, transfer.amount) {
                issues.push(format!(
                    "Transfer {} has no credit entry of {} on account {}",
                    transfer.id, transfer.amount, transfer.to_account_id
                ));
            }
        }

        let mut leftovers: BTreeMap<RecordId, usize> = BTreeMap::new();
        for ((account_id, _), count) in unpaired {
            *leftovers.entry(account_id).or_default() += count;
        }
        for account in &accounts {
            let count = leftovers.get(&account.id).copied().unwrap_or(0);
            if count > 1 {
                issues.push(format!(
                    "Account {} has {} entries not paired with any transfer",
                    account.id, count
                ));
            }
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "Ledger integrity check failed");
        }

        Ok(LedgerIntegrityReport {
            is_valid: issues.is_empty(),
            issues,
            accounts_checked: accounts.len(),
            transfers_checked: transfers.len(),
            total_balance,
        })
    }
}

/// The five steps of a transfer, all against one open transaction
async fn run_transfer<T>(tx: &mut T, params: TransferTxParams) -> LedgerResult<TransferTxResult>
where
    T: StorageTx + ?Sized,
{
    let TransferTxParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let debit = amount
        .checked_neg()
        .ok_or_else(|| LedgerError::Validation(format!("amount {} out of range", amount)))?;

    let transfer = create_transfer(tx, from_account_id, to_account_id, amount).await?;
    let from_entry = create_entry(tx, from_account_id, debit).await?;
    let to_entry = create_entry(tx, to_account_id, amount).await?;

    // Lock order decides which row is touched first, never which delta it gets.
    let (first_id, second_id) = lock_order(from_account_id, to_account_id);
    let (first_delta, second_delta) = if first_id == from_account_id {
        (debit, amount)
    } else {
        (amount, debit)
    };

    let first = add_balance(tx, first_id, first_delta).await?;
    let second = add_balance(tx, second_id, second_delta).await?;

    let (from_account, to_account) = if first_id == from_account_id {
        (first, second)
    } else {
        (second, first)
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
