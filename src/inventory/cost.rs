//! Unit cost resolution
//!
//! Resolution order: acquisition movements (per strategy), then the current
//! cost price record, then [`LedgerError::NoCostDefined`]. Read-only; call it
//! inside the unit of work that writes the movements it prices.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{PriceKind, StockItem};
use crate::traits::UnitOfWork;

/// How acquisition movements turn into a unit cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostStrategy {
    /// Unit cost of the most recent purchase or positive adjustment
    #[default]
    LastPurchase,
    /// Quantity-weighted mean over every purchase and positive adjustment
    WeightedAverage,
}

/// Cost of one requested item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCost {
    pub product_id: String,
    pub quantity: BigDecimal,
    pub unit_cost: BigDecimal,
    pub total_cost: BigDecimal,
}

/// Result of [`CostResolver::total_cost`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total: BigDecimal,
    pub per_item: Vec<ItemCost>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostResolver {
    strategy: CostStrategy,
}

impl CostResolver {
    pub fn new(strategy: CostStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> CostStrategy {
        self.strategy
    }

    async fn from_movements(
        &self,
        uow: &mut dyn UnitOfWork,
        product_id: &str,
    ) -> LedgerResult<Option<BigDecimal>> {
        let acquisitions: Vec<_> = uow
            .list_movements(product_id)
            .await?
            .into_iter()
            .filter(|m| m.movement_type.is_acquisition())
            .collect();

        Ok(match self.strategy {
            CostStrategy::LastPurchase => acquisitions
                .iter()
                .max_by_key(|m| m.created_at)
                .map(|m| m.unit_cost.clone()),
            CostStrategy::WeightedAverage => {
                let quantity: BigDecimal = acquisitions.iter().map(|m| &m.quantity).sum();
                if quantity.is_zero() {
                    None
                } else {
                    let value: BigDecimal =
                        acquisitions.iter().map(|m| &m.quantity * &m.unit_cost).sum();
                    Some((value / quantity).with_scale_round(4, RoundingMode::HalfUp))
                }
            }
        })
    }

    /// Per-unit cost of a product on `date`
    pub async fn unit_cost(
        &self,
        uow: &mut dyn UnitOfWork,
        product_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<BigDecimal> {
        if uow.find_product(product_id).await?.is_none() {
            return Err(LedgerError::ProductNotFound(product_id.to_string()));
        }

        if let Some(cost) = self.from_movements(uow, product_id).await? {
            tracing::debug!(product_id, strategy = ?self.strategy, %cost, "unit cost from movements");
            return Ok(cost);
        }

        match uow.find_current_price(product_id, PriceKind::Cost, date).await? {
            Some(price) => {
                tracing::debug!(product_id, cost = %price.amount, "unit cost from price record");
                Ok(price.amount)
            }
            None => {
                tracing::warn!(product_id, "no cost defined");
                Err(LedgerError::NoCostDefined {
                    product_id: product_id.to_string(),
                })
            }
        }
    }

    /// Sum of `quantity x unit cost`; any unresolvable item fails the whole call
    pub async fn total_cost(
        &self,
        uow: &mut dyn UnitOfWork,
        items: &[StockItem],
        date: NaiveDate,
    ) -> LedgerResult<CostBreakdown> {
        let mut per_item = Vec::with_capacity(items.len());
        let mut total = BigDecimal::zero();

        for item in items {
            let unit_cost = self.unit_cost(uow, &item.product_id, date).await?;
            let total_cost =
                (&item.quantity * &unit_cost).with_scale_round(2, RoundingMode::HalfUp);
            total += &total_cost;
            per_item.push(ItemCost {
                product_id: item.product_id.clone(),
                quantity: item.quantity.clone(),
                unit_cost,
                total_cost,
            });
        }

        Ok(CostBreakdown { total, per_item })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{MovementType, PriceRecord, Product, StockMovement};
    use crate::traits::LedgerStorage;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::Duration;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn acquisition(product_id: &str, quantity: i64, unit_cost: i64, minutes: i64) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            product_id: product_id.into(),
            movement_type: MovementType::Purchase,
            quantity: BigDecimal::from(quantity),
            unit_cost: BigDecimal::from(unit_cost),
            total_cost: BigDecimal::from(quantity * unit_cost),
            stock_before: BigDecimal::zero(),
            stock_after: BigDecimal::from(quantity),
            reference: None,
            invoice_id: None,
            journal_entry_id: None,
            created_by: "tester".into(),
            created_at: chrono::Utc::now().naive_utc() + Duration::minutes(minutes),
        }
    }

    fn cost_price(product_id: &str, amount: i64) -> PriceRecord {
        PriceRecord {
            product_id: product_id.into(),
            kind: PriceKind::Cost,
            amount: BigDecimal::from(amount),
            valid_from: date() - Duration::days(30),
            valid_to: None,
        }
    }

    async fn storage_with_products() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut uow = storage.begin().await.unwrap();
        for id in ["p1", "p2", "p3"] {
            uow.insert_product(&Product::new(id.into(), id.to_uppercase(), id.into()))
                .await
                .unwrap();
        }
        uow.insert_movement(&acquisition("p1", 10, 80, 0)).await.unwrap();
        uow.insert_movement(&acquisition("p1", 30, 100, 5)).await.unwrap();
        uow.insert_price(&cost_price("p1", 50)).await.unwrap();
        uow.insert_price(&cost_price("p2", 70)).await.unwrap();
        uow.commit().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_fallback_chain() {
        let storage = storage_with_products().await;
        let mut uow = storage.begin().await.unwrap();
        let resolver = CostResolver::default();

        assert_eq!(
            resolver.unit_cost(uow.as_mut(), "p1", date()).await.unwrap(),
            BigDecimal::from(100)
        );
        assert_eq!(
            resolver.unit_cost(uow.as_mut(), "p2", date()).await.unwrap(),
            BigDecimal::from(70)
        );
        assert!(matches!(
            resolver.unit_cost(uow.as_mut(), "p3", date()).await,
            Err(LedgerError::NoCostDefined { product_id }) if product_id == "p3"
        ));
        assert!(matches!(
            resolver.unit_cost(uow.as_mut(), "nope", date()).await,
            Err(LedgerError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_weighted_average_strategy() {
        let storage = storage_with_products().await;
        let mut uow = storage.begin().await.unwrap();
        let resolver = CostResolver::new(CostStrategy::WeightedAverage);

        // (10 * 80 + 30 * 100) / 40
        assert_eq!(
            resolver.unit_cost(uow.as_mut(), "p1", date()).await.unwrap(),
            BigDecimal::from(95)
        );
        assert_eq!(
            resolver.unit_cost(uow.as_mut(), "p2", date()).await.unwrap(),
            BigDecimal::from(70)
        );
    }

    #[tokio::test]
    async fn test_total_cost_has_no_partial_results() {
        let storage = storage_with_products().await;
        let mut uow = storage.begin().await.unwrap();
        let resolver = CostResolver::default();

        let breakdown = resolver
            .total_cost(
                uow.as_mut(),
                &[
                    StockItem::new("p1", BigDecimal::from(2)),
                    StockItem::new("p2", "1.5".parse().unwrap()),
                ],
                date(),
            )
            .await
            .unwrap();
        assert_eq!(breakdown.total, BigDecimal::from(305));
        assert_eq!(breakdown.per_item.len(), 2);

        let err = resolver
            .total_cost(
                uow.as_mut(),
                &[
                    StockItem::new("p1", BigDecimal::from(2)),
                    StockItem::new("p3", BigDecimal::from(1)),
                ],
                date(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoCostDefined { .. }));
    }
}
