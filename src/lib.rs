//! # Backoffice Ledger
//!
//! A templated double-entry ledger engine with inventory-cost integration.
//! Business events (sales, supplier payments, customer receipts, stock
//! adjustments) become balanced journal entries, running account balances stay
//! consistent, and stock depletion is coupled to a cost-of-goods figure inside
//! one atomic unit of work.
//!
//! ## Features
//!
//! - **Hierarchical chart of accounts**: only active leaf accounts accept postings
//! - **Journal templates**: trigger types map to versioned line rules instead of
//!   hard-coded logic per event
//! - **Inventory costing**: last-purchase or weighted-average unit costs with a
//!   price-record fallback
//! - **Sale saga**: stock check, costing, invoice, guarded stock movements and
//!   one aggregate cost-of-goods entry, all or nothing
//! - **Supplier invoices**: merchandise and tax credit posted against payables
//! - **Payments and receipts**: two-line postings that also settle counterparty
//!   and invoice balances
//! - **Storage abstraction**: every operation runs in a [`UnitOfWork`] opened
//!   from a [`LedgerStorage`]
//!
//! ## Quick Start
//!
//! ```rust
//! use backoffice_ledger::{Ledger, MemoryStorage};
//!
//! # async fn run() -> backoffice_ledger::LedgerResult<()> {
//! let ledger = Ledger::new(MemoryStorage::new());
//! ledger.provision_standard_chart().await?;
//! let trial_balance = ledger.trial_balance().await?;
//! assert!(trial_balance.is_balanced);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod inventory;
pub mod invoicing;
pub mod ledger;
pub mod posting;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use self::config::*;
pub use error::*;
pub use inventory::*;
pub use invoicing::*;
pub use ledger::*;
pub use posting::*;
pub use traits::*;
pub use types::*;
pub use utils::memory_storage::MemoryStorage;
