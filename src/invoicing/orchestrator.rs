//! Sale saga: stock check, costing, invoice, movements and cost-of-goods entry
//!
//! Every step runs in the caller's unit of work. The saga has no persisted
//! intermediate state; an error anywhere leaves the unit to be rolled back.

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AccountMap;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{
    AvailabilityReport, CostBreakdown, CostResolver, MovementRequest, MovementType, StockItem,
    StockLedger, StockMovement,
};
use crate::ledger::journal::{Journal, TwoLinePosting};
use crate::posting::{require_counterparty, SalePoster};
use crate::traits::UnitOfWork;
use crate::types::*;

/// One product line of an invoice request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineRequest {
    pub product_id: String,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
}

/// Sale invoice to issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub number: String,
    pub invoice_type: InvoiceType,
    pub customer_id: String,
    pub currency: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: BigDecimal,
    pub tax: BigDecimal,
    pub tax_rate_a: BigDecimal,
    pub tax_rate_b: BigDecimal,
    pub perceptions: Vec<BigDecimal>,
    pub total: BigDecimal,
    pub items: Vec<InvoiceLineRequest>,
}

impl InvoiceRequest {
    pub fn stock_items(&self) -> Vec<StockItem> {
        self.items
            .iter()
            .map(|item| StockItem::new(item.product_id.clone(), item.quantity.clone()))
            .collect()
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.number.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Invoice number cannot be empty".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(LedgerError::Validation(format!(
                "Invoice {} has no items",
                self.number
            )));
        }
        if self.total < BigDecimal::zero() {
            return Err(LedgerError::Validation(format!(
                "Invoice {} has a negative total {}",
                self.number, self.total
            )));
        }
        Ok(())
    }
}

/// Everything a committed sale produced
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceOutcome {
    pub invoice: Invoice,
    pub movements: Vec<StockMovement>,
    /// Cost-of-goods entry; absent only when every item costs zero
    pub journal_entry: Option<JournalEntry>,
    /// Sale-template entry, when the saga is configured to post it
    pub revenue_entry: Option<JournalEntry>,
}

/// Read-only view of what a sale would need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePreview {
    pub availability: AvailabilityReport,
    pub cost: CostBreakdown,
}

#[derive(Debug, Clone)]
pub struct InvoiceOrchestrator {
    journal: Journal,
    costs: CostResolver,
    accounts: AccountMap,
    sales: SalePoster,
    post_revenue_entry: bool,
}

impl InvoiceOrchestrator {
    pub fn new(
        journal: Journal,
        costs: CostResolver,
        accounts: AccountMap,
        sales: SalePoster,
        post_revenue_entry: bool,
    ) -> Self {
        Self {
            journal,
            costs,
            accounts,
            sales,
            post_revenue_entry,
        }
    }

    /// Stock check and costing only; performs no writes
    pub async fn preview(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &InvoiceRequest,
    ) -> LedgerResult<InvoicePreview> {
        request.validate()?;
        let items = request.stock_items();
        let availability = StockLedger::validate_availability(uow, &items).await?;
        let cost = self.costs.total_cost(uow, &items, request.date).await?;
        Ok(InvoicePreview { availability, cost })
    }

    /// Issue a sale invoice and consume its stock
    pub async fn create_invoice(
        &self,
        uow: &mut dyn UnitOfWork,
        request: InvoiceRequest,
        actor: &str,
    ) -> LedgerResult<InvoiceOutcome> {
        request.validate()?;
        require_counterparty(uow, CounterpartyKind::Customer, &request.customer_id).await?;

        let stock_items = request.stock_items();
        StockLedger::validate_availability(uow, &stock_items)
            .await?
            .into_result()?;
        let cost = self
            .costs
            .total_cost(uow, &stock_items, request.date)
            .await?;

        let invoice = Self::build_invoice(&request, &cost, actor);
        uow.insert_invoice(&invoice).await?;

        let mut movements = Vec::with_capacity(invoice.items.len());
        for item in &invoice.items {
            let movement = StockLedger::record_movement(
                uow,
                MovementRequest {
                    product_id: item.product_id.clone(),
                    movement_type: MovementType::Sale,
                    quantity: -&item.quantity,
                    unit_cost: item.unit_cost.clone(),
                    reference: Some(invoice.number.clone()),
                    invoice_id: Some(invoice.id),
                    actor: actor.to_string(),
                },
            )
            .await?;
            movements.push(movement);
        }

        let journal_entry = self
            .post_cost_of_goods(uow, &invoice, &cost.total, actor)
            .await?;

        let mut invoice = invoice;
        if let Some(entry) = &journal_entry {
            for movement in &mut movements {
                uow.link_movement_to_entry(movement.id, entry.id).await?;
                movement.journal_entry_id = Some(entry.id);
            }
            invoice.cost_entry_id = Some(entry.id);
            uow.update_invoice(&invoice).await?;
        }

        let revenue_entry = if self.post_revenue_entry {
            let entry = self.sales.post_sale_invoice(uow, invoice.id, actor).await?;
            invoice.revenue_entry_id = Some(entry.id);
            Some(entry)
        } else {
            None
        };

        uow.insert_activity(
            &ActivityRecord::new(actor, "create_invoice", "invoice", invoice.id.to_string())
                .with_detail(format!(
                    "{} items, total {}, cost {}",
                    invoice.items.len(),
                    invoice.total,
                    cost.total
                )),
        )
        .await?;

        tracing::info!(
            invoice = %invoice.number,
            items = invoice.items.len(),
            total = %invoice.total,
            cost = %cost.total,
            cost_entry = journal_entry.as_ref().map(|e| e.number),
            "created sale invoice"
        );
        Ok(InvoiceOutcome {
            invoice,
            movements,
            journal_entry,
            revenue_entry,
        })
    }

    fn build_invoice(request: &InvoiceRequest, cost: &CostBreakdown, actor: &str) -> Invoice {
        let items = request
            .items
            .iter()
            .zip(&cost.per_item)
            .map(|(line, costed)| InvoiceItem {
                product_id: line.product_id.clone(),
                description: line.description.clone(),
                quantity: line.quantity.clone(),
                unit_price: line.unit_price.clone(),
                unit_cost: costed.unit_cost.clone(),
                total_cost: costed.total_cost.clone(),
            })
            .collect();

        Invoice {
            id: Uuid::new_v4(),
            number: request.number.clone(),
            invoice_type: request.invoice_type,
            counterparty_kind: CounterpartyKind::Customer,
            counterparty_id: request.customer_id.clone(),
            currency: request.currency.clone(),
            date: request.date,
            due_date: request.due_date,
            subtotal: request.subtotal.clone(),
            tax: request.tax.clone(),
            tax_rate_a: request.tax_rate_a.clone(),
            tax_rate_b: request.tax_rate_b.clone(),
            perceptions: request.perceptions.clone(),
            total: request.total.clone(),
            paid_amount: BigDecimal::zero(),
            balance: request.total.clone(),
            status: PaymentStatus::Unpaid,
            items,
            cost_entry_id: None,
            revenue_entry_id: None,
            created_by: actor.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// One aggregate entry for the whole invoice: debit COGS, credit inventory
    async fn post_cost_of_goods(
        &self,
        uow: &mut dyn UnitOfWork,
        invoice: &Invoice,
        total_cost: &BigDecimal,
        actor: &str,
    ) -> LedgerResult<Option<JournalEntry>> {
        if total_cost.is_zero() {
            tracing::debug!(invoice = %invoice.number, "zero cost of goods, no entry posted");
            return Ok(None);
        }
        let entry = self
            .journal
            .post_two_line(
                uow,
                TwoLinePosting {
                    date: invoice.date,
                    description: format!("Cost of goods sold, invoice {}", invoice.number),
                    reference: Some(invoice.number.clone()),
                    debit_account: self.accounts.cost_of_goods_sold.clone(),
                    credit_account: self.accounts.inventory.clone(),
                    amount: total_cost.clone(),
                    trigger: TriggerType::CostOfGoodsSold,
                    origin: EntryOrigin::Invoice {
                        invoice_id: invoice.id,
                    },
                    actor: actor.to_string(),
                },
            )
            .await?;
        Ok(Some(entry))
    }
}
