//! Inventory: products, stock movements and unit costing

pub mod cost;
pub mod stock;

pub use cost::*;
pub use stock::*;

use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stocked product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub stock: BigDecimal,
    pub min_stock: BigDecimal,
    pub allow_negative_stock: bool,
    pub updated_at: NaiveDateTime,
}

impl Product {
    pub fn new(id: String, sku: String, name: String) -> Self {
        Self {
            id,
            sku,
            name,
            stock: BigDecimal::zero(),
            min_stock: BigDecimal::zero(),
            allow_negative_stock: false,
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn with_stock(mut self, stock: BigDecimal) -> Self {
        self.stock = stock;
        self
    }

    pub fn allowing_negative_stock(mut self) -> Self {
        self.allow_negative_stock = true;
        self
    }

    pub fn is_below_minimum(&self) -> bool {
        self.stock < self.min_stock
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceKind {
    Cost,
    Sale,
}

/// Dated price for a product; the current one is the latest valid on a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub product_id: String,
    pub kind: PriceKind,
    pub amount: BigDecimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl PriceRecord {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && self.valid_to.is_none_or(|to| date <= to)
    }
}

/// Closed set of reasons stock can move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    Sale,
    PositiveAdjustment,
    NegativeAdjustment,
    CustomerReturn,
    SupplierReturn,
    Transfer,
}

impl MovementType {
    /// Required sign of the quantity: `Some(true)` inbound, `Some(false)`
    /// outbound, `None` either way
    pub fn inbound(&self) -> Option<bool> {
        match self {
            MovementType::Purchase
            | MovementType::PositiveAdjustment
            | MovementType::CustomerReturn => Some(true),
            MovementType::Sale | MovementType::NegativeAdjustment | MovementType::SupplierReturn => {
                Some(false)
            }
            MovementType::Transfer => None,
        }
    }

    /// Movements whose unit cost reflects an acquisition
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            MovementType::Purchase | MovementType::PositiveAdjustment
        )
    }
}

/// Immutable record of one signed quantity change
///
/// `stock_after == stock_before + quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: String,
    pub movement_type: MovementType,
    pub quantity: BigDecimal,
    pub unit_cost: BigDecimal,
    pub total_cost: BigDecimal,
    pub stock_before: BigDecimal,
    pub stock_after: BigDecimal,
    pub reference: Option<String>,
    pub invoice_id: Option<Uuid>,
    /// Set once, after the funding journal entry is posted
    pub journal_entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Requested quantity of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub product_id: String,
    pub quantity: BigDecimal,
}

impl StockItem {
    pub fn new(product_id: impl Into<String>, quantity: BigDecimal) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Guard attached to a stock write
#[derive(Debug, Clone, PartialEq)]
pub enum StockGuard {
    /// Unconditional write
    None,
    /// Write only if current stock is at least this quantity
    AtLeast(BigDecimal),
}
