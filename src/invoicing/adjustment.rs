//! Stock intake and inventory adjustments

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AccountMap;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{CostResolver, MovementRequest, MovementType, StockLedger, StockMovement};
use crate::ledger::journal::{Journal, TwoLinePosting};
use crate::traits::UnitOfWork;
use crate::types::*;

/// Goods received into stock at a known unit cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub product_id: String,
    pub quantity: BigDecimal,
    pub unit_cost: BigDecimal,
    pub reference: Option<String>,
}

/// Count correction; positive quantities are found stock, negative are shrinkage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: String,
    pub quantity: BigDecimal,
    /// Falls back to the resolved unit cost
    pub unit_cost: Option<BigDecimal>,
    pub reason: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentOutcome {
    pub movement: StockMovement,
    /// Absent when the adjustment carries no value
    pub journal_entry: Option<JournalEntry>,
}

#[derive(Debug, Clone)]
pub struct StockAdjuster {
    journal: Journal,
    costs: CostResolver,
    accounts: AccountMap,
}

impl StockAdjuster {
    pub fn new(journal: Journal, costs: CostResolver, accounts: AccountMap) -> Self {
        Self {
            journal,
            costs,
            accounts,
        }
    }

    /// Record a purchase movement; its unit cost feeds later costing.
    ///
    /// No entry is posted here: the supplier invoice debits inventory against
    /// payables (see [`crate::posting::PurchasePoster`]).
    pub async fn receive_stock(
        &self,
        uow: &mut dyn UnitOfWork,
        receipt: StockReceipt,
        actor: &str,
    ) -> LedgerResult<StockMovement> {
        let movement = StockLedger::record_movement(
            uow,
            MovementRequest {
                product_id: receipt.product_id,
                movement_type: MovementType::Purchase,
                quantity: receipt.quantity,
                unit_cost: receipt.unit_cost,
                reference: receipt.reference,
                invoice_id: None,
                actor: actor.to_string(),
            },
        )
        .await?;

        uow.insert_activity(
            &ActivityRecord::new(actor, "receive_stock", "product", movement.product_id.clone())
                .with_detail(format!("{} at {}", movement.quantity, movement.unit_cost)),
        )
        .await?;
        tracing::info!(
            product_id = %movement.product_id,
            quantity = %movement.quantity,
            unit_cost = %movement.unit_cost,
            "received stock"
        );
        Ok(movement)
    }

    /// Adjust stock and post inventory against adjustment gain or shrinkage
    pub async fn record_stock_adjustment(
        &self,
        uow: &mut dyn UnitOfWork,
        adjustment: StockAdjustment,
        actor: &str,
    ) -> LedgerResult<AdjustmentOutcome> {
        adjustment.validate()?;
        let inbound = adjustment.quantity > BigDecimal::zero();
        let movement_type = if inbound {
            MovementType::PositiveAdjustment
        } else {
            MovementType::NegativeAdjustment
        };
        let unit_cost = match adjustment.unit_cost {
            Some(cost) => cost,
            None => {
                self.costs
                    .unit_cost(uow, &adjustment.product_id, adjustment.date)
                    .await?
            }
        };

        let mut movement = StockLedger::record_movement(
            uow,
            MovementRequest {
                product_id: adjustment.product_id,
                movement_type,
                quantity: adjustment.quantity,
                unit_cost,
                reference: Some(adjustment.reason.clone()),
                invoice_id: None,
                actor: actor.to_string(),
            },
        )
        .await?;

        let journal_entry = if movement.total_cost.is_zero() {
            None
        } else {
            let (debit_account, credit_account) = if inbound {
                (
                    self.accounts.inventory.clone(),
                    self.accounts.inventory_gain.clone(),
                )
            } else {
                (
                    self.accounts.inventory_shrinkage.clone(),
                    self.accounts.inventory.clone(),
                )
            };
            let entry = self
                .journal
                .post_two_line(
                    uow,
                    TwoLinePosting {
                        date: adjustment.date,
                        description: format!("Stock adjustment: {}", adjustment.reason),
                        reference: Some(movement.id.to_string()),
                        debit_account,
                        credit_account,
                        amount: movement.total_cost.clone(),
                        trigger: TriggerType::StockAdjustment,
                        origin: EntryOrigin::Adjustment {
                            movement_id: movement.id,
                        },
                        actor: actor.to_string(),
                    },
                )
                .await?;
            uow.link_movement_to_entry(movement.id, entry.id).await?;
            movement.journal_entry_id = Some(entry.id);
            Some(entry)
        };

        uow.insert_activity(
            &ActivityRecord::new(actor, "record_stock_adjustment", "product", movement.product_id.clone())
                .with_detail(format!("{} ({})", movement.quantity, adjustment.reason)),
        )
        .await?;
        tracing::info!(
            product_id = %movement.product_id,
            quantity = %movement.quantity,
            value = %movement.total_cost,
            "recorded stock adjustment"
        );
        Ok(AdjustmentOutcome {
            movement,
            journal_entry,
        })
    }
}

impl StockAdjustment {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity.is_zero() {
            return Err(LedgerError::Validation(format!(
                "Adjustment of product '{}' has zero quantity",
                self.product_id
            )));
        }
        crate::utils::validation::validate_description(&self.reason)
    }
}
