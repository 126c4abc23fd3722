//! Supplier invoices
//!
//! Registering a supplier's invoice is where purchases reach the journal:
//! merchandise and tax credit are debited against payables, and the supplier's
//! running balance grows by the invoice total. Stock intake only records the
//! quantity and unit cost.

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AccountMap;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::journal::{Journal, RecordOptions};
use crate::posting::{require_counterparty, shift_counterparty_balance};
use crate::traits::UnitOfWork;
use crate::types::*;

/// Invoice received from a supplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierInvoiceRequest {
    /// Supplier's own document number
    pub number: String,
    pub invoice_type: InvoiceType,
    pub supplier_id: String,
    pub currency: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: BigDecimal,
    pub tax: BigDecimal,
    pub perceptions: Vec<BigDecimal>,
    pub total: BigDecimal,
}

impl SupplierInvoiceRequest {
    fn tax_credit(&self) -> BigDecimal {
        self.perceptions.iter().fold(self.tax.clone(), |acc, p| acc + p)
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.number.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Supplier invoice number cannot be empty".to_string(),
            ));
        }
        if self.subtotal <= BigDecimal::zero() {
            return Err(LedgerError::Validation(format!(
                "Supplier invoice {} must have a positive subtotal, got {}",
                self.number, self.subtotal
            )));
        }
        let tax_credit = self.tax_credit();
        if tax_credit < BigDecimal::zero() || self.perceptions.iter().any(|p| *p < BigDecimal::zero()) {
            return Err(LedgerError::Validation(format!(
                "Supplier invoice {} has negative tax or perceptions",
                self.number
            )));
        }
        let expected = &self.subtotal + &tax_credit;
        if expected != self.total {
            return Err(LedgerError::Validation(format!(
                "Supplier invoice {} total {} does not match subtotal plus taxes {}",
                self.number, self.total, expected
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplierInvoiceOutcome {
    pub invoice: Invoice,
    pub journal_entry: JournalEntry,
}

#[derive(Debug, Clone)]
pub struct PurchasePoster {
    journal: Journal,
    accounts: AccountMap,
}

impl PurchasePoster {
    pub fn new(journal: Journal, accounts: AccountMap) -> Self {
        Self { journal, accounts }
    }

    /// Store the invoice, post inventory and tax credit against payables and
    /// raise the supplier's balance
    pub async fn register_supplier_invoice(
        &self,
        uow: &mut dyn UnitOfWork,
        request: SupplierInvoiceRequest,
        actor: &str,
    ) -> LedgerResult<SupplierInvoiceOutcome> {
        request.validate()?;
        let supplier =
            require_counterparty(uow, CounterpartyKind::Supplier, &request.supplier_id).await?;

        let tax_credit = request.tax_credit();
        let mut invoice = Invoice::new(
            request.number,
            request.invoice_type,
            CounterpartyKind::Supplier,
            supplier.id.clone(),
            request.date,
            request.total,
            actor.to_string(),
        );
        invoice.currency = request.currency;
        invoice.due_date = request.due_date;
        invoice.subtotal = request.subtotal;
        invoice.tax = request.tax;
        invoice.perceptions = request.perceptions;
        uow.insert_invoice(&invoice).await?;

        let mut entry = JournalEntry::new(
            invoice.date,
            format!("Supplier invoice {} from {}", invoice.number, supplier.name),
            actor.to_string(),
        );
        entry.reference = Some(invoice.number.clone());
        entry.trigger = Some(TriggerType::PurchaseInvoice);
        entry.origin = EntryOrigin::Invoice {
            invoice_id: invoice.id,
        };
        entry.add_line(JournalEntryLine::debit(
            self.accounts.inventory.clone(),
            invoice.subtotal.clone(),
            None,
        ));
        if !tax_credit.is_zero() {
            entry.add_line(JournalEntryLine::debit(
                self.accounts.vat_credit.clone(),
                tax_credit,
                None,
            ));
        }
        entry.add_line(JournalEntryLine::credit(
            self.accounts.payables.clone(),
            invoice.total.clone(),
            None,
        ));
        let journal_entry = self
            .journal
            .record(uow, entry, RecordOptions::default())
            .await?;

        shift_counterparty_balance(uow, CounterpartyKind::Supplier, &supplier.id, &invoice.total)
            .await?;

        invoice.cost_entry_id = Some(journal_entry.id);
        uow.update_invoice(&invoice).await?;
        uow.insert_activity(
            &ActivityRecord::new(actor, "register_supplier_invoice", "invoice", invoice.id.to_string())
                .with_detail(format!("{} from {}", invoice.total, supplier.id)),
        )
        .await?;

        tracing::info!(
            invoice = %invoice.number,
            supplier = %supplier.id,
            total = %invoice.total,
            entry = journal_entry.number,
            "registered supplier invoice"
        );
        Ok(SupplierInvoiceOutcome {
            invoice,
            journal_entry,
        })
    }
}
