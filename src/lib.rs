//! # Transfer Ledger
//!
//! An atomic, concurrency-safe money-transfer engine over a single
//! transactional store.
//!
//! ## Features
//!
//! - **Atomic transfers**: transfer record, both ledger entries and both balance
//!   updates commit together or not at all
//! - **Deadlock freedom**: account rows are always locked smaller-ID first
//! - **Audit trail**: append-only transfers and signed entries, with an integrity
//!   check that every balance equals the sum of its entries
//! - **Cancellation**: timeouts and caller signals roll the in-flight transaction back
//! - **Storage abstraction**: PostgreSQL (feature `postgres`) and an in-memory
//!   backend with per-account row locks
//!
//! ## Quick Start
//!
//! ```rust
//! use transfer_ledger::{Ledger, LedgerStorage, TransferTxParams};
//! use transfer_ledger::utils::MemoryStorage;
//!
//! # tokio_test_main();
//! # fn tokio_test_main() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let storage = MemoryStorage::new();
//! let alice = storage.create_account("alice", "USD", 100).await.unwrap();
//! let bob = storage.create_account("bob", "USD", 50).await.unwrap();
//!
//! let ledger = Ledger::new(storage);
//! let result = ledger
//!     .transfer_tx(TransferTxParams::new(alice.id, bob.id, 30))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(result.from_account.balance, 70);
//! assert_eq!(result.to_account.balance, 80);
//! # });
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod logging;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use ledger::*;
pub use traits::*;
pub use types::*;
