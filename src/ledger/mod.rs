//! Ledger module containing the transfer engine and its building blocks

pub mod balance;
pub mod core;
pub mod lock_order;
pub mod records;
pub mod runner;

pub use balance::*;
pub use core::*;
pub use lock_order::*;
pub use records::*;
pub use runner::*;
