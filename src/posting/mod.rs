//! Event posting adapters
//!
//! Turn business events into journal entries. Sale invoices go through the
//! template engine; supplier payments and customer receipts are always exactly
//! two lines and are posted directly. Supplier invoices debit merchandise and
//! tax credit against payables.

pub mod payment;
pub mod purchase;
pub mod sale;

pub use payment::*;
pub use purchase::*;
pub use sale::*;

use bigdecimal::BigDecimal;

use crate::error::{LedgerError, LedgerResult};
use crate::traits::UnitOfWork;
use crate::types::{Counterparty, CounterpartyKind};

/// Load a counterparty or fail with [`LedgerError::CounterpartyNotFound`]
pub(crate) async fn require_counterparty(
    uow: &mut dyn UnitOfWork,
    kind: CounterpartyKind,
    id: &str,
) -> LedgerResult<Counterparty> {
    uow.find_counterparty(kind, id)
        .await?
        .ok_or_else(|| LedgerError::CounterpartyNotFound(format!("{:?} {}", kind, id)))
}

/// Move a counterparty's running balance; zero affected rows is a lost race
pub(crate) async fn shift_counterparty_balance(
    uow: &mut dyn UnitOfWork,
    kind: CounterpartyKind,
    id: &str,
    delta: &BigDecimal,
) -> LedgerResult<()> {
    if uow.adjust_counterparty_balance(kind, id, delta).await? != 1 {
        return Err(LedgerError::ConcurrencyConflict(format!(
            "balance of {:?} '{}' could not be updated",
            kind, id
        )));
    }
    tracing::debug!(?kind, id, %delta, "moved counterparty balance");
    Ok(())
}
