//! Stock availability checks and guarded movements

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult, StockShortfall};
use crate::inventory::{MovementType, Product, StockGuard, StockItem, StockMovement};
use crate::traits::UnitOfWork;

/// Outcome of an availability check; every failing product is listed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub ok: bool,
    pub shortfalls: Vec<StockShortfall>,
}

impl AvailabilityReport {
    /// Turn a failed report into [`LedgerError::InsufficientStock`]
    pub fn into_result(self) -> LedgerResult<()> {
        if self.ok {
            Ok(())
        } else {
            Err(LedgerError::InsufficientStock(self.shortfalls))
        }
    }
}

/// One signed stock change to record
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    pub product_id: String,
    pub movement_type: MovementType,
    /// Positive inbound, negative outbound
    pub quantity: BigDecimal,
    pub unit_cost: BigDecimal,
    pub reference: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub actor: String,
}

/// Requested quantities with repeated products merged, in first-seen order
fn merge_items(items: &[StockItem]) -> Vec<(String, BigDecimal)> {
    let mut merged: Vec<(String, BigDecimal)> = Vec::new();
    for item in items {
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => *quantity += &item.quantity,
            None => merged.push((item.product_id.clone(), item.quantity.clone())),
        }
    }
    merged
}

pub struct StockLedger;

impl StockLedger {
    async fn product(uow: &mut dyn UnitOfWork, product_id: &str) -> LedgerResult<Product> {
        uow.find_product(product_id)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))
    }

    /// Check every item against current stock without failing fast
    pub async fn validate_availability(
        uow: &mut dyn UnitOfWork,
        items: &[StockItem],
    ) -> LedgerResult<AvailabilityReport> {
        let mut shortfalls = Vec::new();

        for (product_id, required) in merge_items(items) {
            if required <= BigDecimal::zero() {
                return Err(LedgerError::Validation(format!(
                    "Requested quantity for product '{}' must be positive, got {}",
                    product_id, required
                )));
            }
            let product = Self::product(uow, &product_id).await?;
            if !product.allow_negative_stock && product.stock < required {
                shortfalls.push(StockShortfall {
                    product_id,
                    product_name: product.name,
                    available: product.stock,
                    required,
                });
            }
        }

        if !shortfalls.is_empty() {
            tracing::warn!(count = shortfalls.len(), "stock availability check failed");
        }
        Ok(AvailabilityReport {
            ok: shortfalls.is_empty(),
            shortfalls,
        })
    }

    /// Persist one movement and move the product's stock with a guarded write
    pub async fn record_movement(
        uow: &mut dyn UnitOfWork,
        request: MovementRequest,
    ) -> LedgerResult<StockMovement> {
        if request.quantity.is_zero() {
            return Err(LedgerError::Validation(format!(
                "Stock movement for product '{}' has zero quantity",
                request.product_id
            )));
        }
        let positive = request.quantity > BigDecimal::zero();
        if let Some(inbound) = request.movement_type.inbound() {
            if inbound != positive {
                return Err(LedgerError::Validation(format!(
                    "{:?} movement cannot have quantity {}",
                    request.movement_type, request.quantity
                )));
            }
        }
        if request.unit_cost < BigDecimal::zero() {
            return Err(LedgerError::Validation(format!(
                "Unit cost cannot be negative, got {}",
                request.unit_cost
            )));
        }

        let mut product = Self::product(uow, &request.product_id).await?;
        let stock_before = product.stock.clone();
        let stock_after = &stock_before + &request.quantity;
        let outbound = -&request.quantity;

        let guard = if positive || product.allow_negative_stock {
            StockGuard::None
        } else {
            if stock_after < BigDecimal::zero() {
                tracing::warn!(
                    product_id = %product.id,
                    available = %stock_before,
                    required = %outbound,
                    "rejecting movement below zero stock"
                );
                return Err(LedgerError::InsufficientStock(vec![StockShortfall {
                    product_id: product.id,
                    product_name: product.name,
                    available: stock_before,
                    required: outbound,
                }]));
            }
            StockGuard::AtLeast(outbound)
        };

        let rows = uow
            .adjust_stock(&request.product_id, &request.quantity, guard)
            .await?;
        if rows != 1 {
            tracing::warn!(product_id = %request.product_id, "stock changed under a guarded write");
            return Err(LedgerError::ConcurrencyConflict(format!(
                "stock of product '{}' changed while recording a movement",
                request.product_id
            )));
        }

        product.stock = stock_after.clone();
        if product.is_below_minimum() {
            tracing::warn!(product_id = %product.id, stock = %product.stock, minimum = %product.min_stock, "stock below minimum");
        }

        let movement = StockMovement {
            id: Uuid::new_v4(),
            total_cost: (request.quantity.abs() * &request.unit_cost)
                .with_scale_round(2, RoundingMode::HalfUp),
            product_id: request.product_id,
            movement_type: request.movement_type,
            quantity: request.quantity,
            unit_cost: request.unit_cost,
            stock_before,
            stock_after,
            reference: request.reference,
            invoice_id: request.invoice_id,
            journal_entry_id: None,
            created_by: request.actor,
            created_at: chrono::Utc::now().naive_utc(),
        };
        uow.insert_movement(&movement).await?;

        tracing::debug!(
            product_id = %movement.product_id,
            movement_type = ?movement.movement_type,
            before = %movement.stock_before,
            after = %movement.stock_after,
            "recorded stock movement"
        );
        Ok(movement)
    }
}
