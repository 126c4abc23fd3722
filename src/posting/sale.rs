//! Template-driven posting of sale invoices

use uuid::Uuid;

use crate::config::InvoicingConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::template::{ApplyOptions, TemplateEngine};
use crate::posting::{require_counterparty, shift_counterparty_balance};
use crate::traits::UnitOfWork;
use crate::types::*;

/// Build the source document a sale-invoice template is applied to
pub fn invoice_document(invoice: &Invoice) -> SourceDocument {
    let mut doc = SourceDocument::new(
        invoice.number.clone(),
        TriggerType::SaleInvoice,
        invoice.date,
        format!("Sale invoice {}", invoice.number),
    );
    doc.reference = Some(invoice.number.clone());
    doc.total = invoice.total.clone();
    doc.subtotal = invoice.subtotal.clone();
    doc.tax = invoice.tax.clone();
    doc.tax_rate_a = invoice.tax_rate_a.clone();
    doc.tax_rate_b = invoice.tax_rate_b.clone();
    doc.perceptions = invoice.perceptions.clone();
    doc.currency = invoice.currency.clone();
    doc
}

/// Posts the revenue side of sale invoices
///
/// The revenue entry is always recorded as POSTED: the customer's balance
/// moves in the same unit of work as receivables, never against a draft.
#[derive(Debug, Clone)]
pub struct SalePoster {
    templates: TemplateEngine,
    invoicing: InvoicingConfig,
}

impl SalePoster {
    pub fn new(templates: TemplateEngine, invoicing: InvoicingConfig) -> Self {
        Self {
            templates,
            invoicing,
        }
    }

    /// Apply the invoice type's template, raise the customer's balance and
    /// link the entry to the invoice
    pub async fn post_sale_invoice(
        &self,
        uow: &mut dyn UnitOfWork,
        invoice_id: Uuid,
        actor: &str,
    ) -> LedgerResult<JournalEntry> {
        let mut invoice = uow
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| LedgerError::InvoiceNotFound(invoice_id.to_string()))?;
        if invoice.counterparty_kind != CounterpartyKind::Customer {
            return Err(LedgerError::Validation(format!(
                "Invoice {} is not a sale invoice",
                invoice.number
            )));
        }
        if invoice.revenue_entry_id.is_some() {
            return Err(LedgerError::Validation(format!(
                "Invoice {} already has a revenue entry",
                invoice.number
            )));
        }
        require_counterparty(uow, CounterpartyKind::Customer, &invoice.counterparty_id).await?;

        let template_code = self.invoicing.template_for(invoice.invoice_type);
        let entry = self
            .templates
            .apply(
                uow,
                template_code,
                &invoice_document(&invoice),
                actor,
                ApplyOptions {
                    auto_post: true,
                    validate_balance: true,
                    origin: EntryOrigin::Invoice {
                        invoice_id: invoice.id,
                    },
                },
            )
            .await?;

        shift_counterparty_balance(
            uow,
            CounterpartyKind::Customer,
            &invoice.counterparty_id,
            &invoice.total,
        )
        .await?;

        invoice.revenue_entry_id = Some(entry.id);
        uow.update_invoice(&invoice).await?;
        uow.insert_activity(
            &ActivityRecord::new(actor, "post_sale_invoice", "invoice", invoice.id.to_string())
                .with_detail(format!("template {} entry {}", template_code, entry.number)),
        )
        .await?;

        tracing::info!(
            invoice = %invoice.number,
            template = template_code,
            entry = entry.number,
            total = %invoice.total,
            "posted sale invoice"
        );
        Ok(entry)
    }
}
