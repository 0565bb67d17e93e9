//! Core types and data structures for the transfer ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier type shared by accounts, entries and transfers
pub type RecordId = i64;

/// Currency-denominated account holding a balance in minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique, immutable identifier
    pub id: RecordId,
    /// Name of the owning user
    pub owner: String,
    /// ISO currency code (e.g. "USD")
    pub currency: String,
    /// Current balance in minor units
    pub balance: i64,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account snapshot
    pub fn new(id: RecordId, owner: String, currency: String, balance: i64) -> Self {
        Self {
            id,
            owner,
            currency,
            balance,
            created_at: Utc::now(),
        }
    }
}

/// One signed balance change applied to exactly one account
///
/// Negative amounts are debits, positive amounts are credits. Entries are
/// append-only and never updated or deleted. Each one is written by exactly
/// one transfer, except the opening-balance entry `create_account` records
/// for an account seeded with a non-zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: RecordId,
    /// Account the change was applied to
    pub account_id: RecordId,
    /// Signed amount in minor units
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Create a new entry
    pub fn new(id: RecordId, account_id: RecordId, amount: i64) -> Self {
        Self {
            id,
            account_id,
            amount,
            created_at: Utc::now(),
        }
    }

    /// Whether this entry takes money out of its account
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// Immutable record of one completed movement of funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: RecordId,
    pub from_account_id: RecordId,
    pub to_account_id: RecordId,
    /// Positive amount in minor units
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Create a new transfer record
    pub fn new(id: RecordId, from_account_id: RecordId, to_account_id: RecordId, amount: i64) -> Self {
        Self {
            id,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Input of a transfer between two accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: RecordId,
    pub to_account_id: RecordId,
    pub amount: i64,
}

impl TransferTxParams {
    /// Create transfer parameters
    pub fn new(from_account_id: RecordId, to_account_id: RecordId, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }
}

/// Everything a committed transfer produced, as seen right after commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Report on ledger/balance consistency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub accounts_checked: usize,
    pub transfers_checked: usize,
    /// Sum of all account balances
    pub total_balance: i128,
}

/// Errors that can occur in the transfer engine
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(RecordId),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Transfer cancelled before commit")]
    Cancelled,
    #[error("Balance overflow on account {account_id}: {balance} + {delta}")]
    BalanceOverflow {
        account_id: RecordId,
        balance: i64,
        delta: i64,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Stable error code for callers mapping errors onto a transport
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Cancelled => "CANCELLED",
            LedgerError::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether a caller may reasonably try the same request again
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }

    /// Whether the error names a missing account
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::AccountNotFound(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
