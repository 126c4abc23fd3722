//! Supplier payments and customer receipts
//!
//! Both post a balanced two-line entry between the counterparty account
//! (payables or receivables) and the settlement account of the payment method,
//! move the counterparty's running balance and, when an invoice is named,
//! settle that invoice, all in the caller's unit of work.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AccountMap;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::journal::{Journal, TwoLinePosting};
use crate::posting::{require_counterparty, shift_counterparty_balance};
use crate::traits::UnitOfWork;
use crate::types::*;
use crate::utils::validation::validate_positive_amount;

/// A payment to a supplier or a receipt from a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub counterparty_id: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Invoice being settled, if any
    pub invoice_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub payment: PaymentRecord,
    pub journal_entry: JournalEntry,
}

#[derive(Debug, Clone)]
pub struct PaymentPoster {
    journal: Journal,
    accounts: AccountMap,
}

impl PaymentPoster {
    pub fn new(journal: Journal, accounts: AccountMap) -> Self {
        Self { journal, accounts }
    }

    /// Debit payables, credit the settlement account, lower the supplier balance
    pub async fn post_supplier_payment(
        &self,
        uow: &mut dyn UnitOfWork,
        request: PaymentRequest,
        actor: &str,
    ) -> LedgerResult<PaymentOutcome> {
        self.post(uow, PaymentKind::SupplierPayment, request, actor)
            .await
    }

    /// Debit the settlement account, credit receivables, lower the customer balance
    pub async fn post_customer_receipt(
        &self,
        uow: &mut dyn UnitOfWork,
        request: PaymentRequest,
        actor: &str,
    ) -> LedgerResult<PaymentOutcome> {
        self.post(uow, PaymentKind::CustomerReceipt, request, actor)
            .await
    }

    async fn settle_invoice(
        uow: &mut dyn UnitOfWork,
        invoice_id: Uuid,
        kind: CounterpartyKind,
        counterparty_id: &str,
        amount: &BigDecimal,
    ) -> LedgerResult<()> {
        let mut invoice = uow
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| LedgerError::InvoiceNotFound(invoice_id.to_string()))?;
        if invoice.counterparty_kind != kind || invoice.counterparty_id != counterparty_id {
            return Err(LedgerError::Validation(format!(
                "Invoice {} does not belong to {:?} '{}'",
                invoice.number, kind, counterparty_id
            )));
        }
        if let Err(err) = invoice.apply_payment(amount) {
            tracing::warn!(invoice = %invoice.number, %amount, remaining = %invoice.balance, "payment exceeds invoice balance");
            return Err(err);
        }
        uow.update_invoice(&invoice).await?;
        tracing::debug!(invoice = %invoice.number, status = ?invoice.status, balance = %invoice.balance, "settled invoice");
        Ok(())
    }

    async fn post(
        &self,
        uow: &mut dyn UnitOfWork,
        kind: PaymentKind,
        request: PaymentRequest,
        actor: &str,
    ) -> LedgerResult<PaymentOutcome> {
        validate_positive_amount(&request.amount)?;

        let settlement = self.accounts.settlement_account(request.method).to_string();
        let (counterparty_kind, trigger, debit_account, credit_account) = match kind {
            PaymentKind::SupplierPayment => (
                CounterpartyKind::Supplier,
                TriggerType::SupplierPayment,
                self.accounts.payables.clone(),
                settlement,
            ),
            PaymentKind::CustomerReceipt => (
                CounterpartyKind::Customer,
                TriggerType::CustomerReceipt,
                settlement,
                self.accounts.receivables.clone(),
            ),
        };

        let counterparty =
            require_counterparty(uow, counterparty_kind, &request.counterparty_id).await?;

        if let Some(invoice_id) = request.invoice_id {
            Self::settle_invoice(
                uow,
                invoice_id,
                counterparty_kind,
                &counterparty.id,
                &request.amount,
            )
            .await?;
        }

        let payment_id = Uuid::new_v4();
        let origin = match kind {
            PaymentKind::SupplierPayment => EntryOrigin::Payment { payment_id },
            PaymentKind::CustomerReceipt => EntryOrigin::Receipt {
                receipt_id: payment_id,
            },
        };
        let description = match kind {
            PaymentKind::SupplierPayment => format!("Payment to supplier {}", counterparty.name),
            PaymentKind::CustomerReceipt => format!("Receipt from customer {}", counterparty.name),
        };

        let journal_entry = self
            .journal
            .post_two_line(
                uow,
                TwoLinePosting {
                    date: request.date,
                    description,
                    reference: request.reference.clone(),
                    debit_account,
                    credit_account,
                    amount: request.amount.clone(),
                    trigger,
                    origin,
                    actor: actor.to_string(),
                },
            )
            .await?;

        shift_counterparty_balance(
            uow,
            counterparty_kind,
            &counterparty.id,
            &-&request.amount,
        )
        .await?;

        let payment = PaymentRecord {
            id: payment_id,
            kind,
            counterparty_id: counterparty.id.clone(),
            amount: request.amount,
            date: request.date,
            method: request.method,
            reference: request.reference,
            invoice_id: request.invoice_id,
            journal_entry_id: journal_entry.id,
            created_by: actor.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        uow.insert_payment(&payment).await?;

        let action = match kind {
            PaymentKind::SupplierPayment => "post_supplier_payment",
            PaymentKind::CustomerReceipt => "post_customer_receipt",
        };
        uow.insert_activity(
            &ActivityRecord::new(actor, action, "payment", payment.id.to_string()).with_detail(
                format!("{:?} {} via {:?}", counterparty_kind, payment.amount, payment.method),
            ),
        )
        .await?;

        tracing::info!(
            ?kind,
            counterparty = %counterparty.id,
            amount = %payment.amount,
            entry = journal_entry.number,
            "posted payment"
        );
        Ok(PaymentOutcome {
            payment,
            journal_entry,
        })
    }
}
