//! Error taxonomy for the ledger engine
//!
//! Every error aborts the enclosing unit of work. Errors fall into three
//! categories so callers can decide what to do with them: configuration
//! mistakes are loud and final, validation failures carry structured data the
//! caller can act on, and transient failures may be retried.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::EntryType;

/// Broad classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Setup mistake (templates, chart of accounts). Not retryable.
    Configuration,
    /// Expected business rejection, recoverable by changing the request.
    Validation,
    /// Lost a race or timed out waiting. The caller may retry.
    Transient,
}

/// One product that cannot cover the requested quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: String,
    pub product_name: String,
    pub available: BigDecimal,
    pub required: BigDecimal,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): available {}, required {}",
            self.product_name, self.product_id, self.available, self.required
        )
    }
}

fn join_shortfalls(shortfalls: &[StockShortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in the ledger engine
#[derive(Debug, Error)]
pub enum LedgerError {
    // Configuration
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
    #[error("Template is inactive: {0}")]
    TemplateInactive(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Account is not postable (non-leaf or inactive): {0}")]
    AccountNotPostable(String),
    #[error("Template '{template}' has no {side:?} line")]
    TemplateMissingSide { template: String, side: EntryType },
    #[error("Template '{template}' line {line}: rule {rule} requires a configured value")]
    MissingRuleParameter {
        template: String,
        line: usize,
        rule: String,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Validation
    #[error("Insufficient stock: {}", join_shortfalls(.0))]
    InsufficientStock(Vec<StockShortfall>),
    #[error("Unbalanced entry: debit = {debit}, credit = {credit}, difference = {difference}")]
    UnbalancedEntry {
        debit: BigDecimal,
        credit: BigDecimal,
        difference: BigDecimal,
    },
    #[error("No cost defined for product {product_id}")]
    NoCostDefined { product_id: String },
    #[error("Amount {requested} exceeds remaining balance {remaining} of invoice {invoice_id}")]
    AmountExceedsBalance {
        invoice_id: String,
        requested: BigDecimal,
        remaining: BigDecimal,
    },
    #[error("Invalid journal line: {0}")]
    InvalidLine(String),
    #[error("Journal entry {0} is posted and cannot be modified")]
    EntryImmutable(u64),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Counterparty not found: {0}")]
    CounterpartyNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),

    // Transient
    #[error("Concurrent modification detected: {0}")]
    ConcurrencyConflict(String),
    #[error("Timed out after {0:?} waiting to start a unit of work")]
    LockTimeout(Duration),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Category used by callers to decide between fixing setup, fixing the
    /// request, or retrying
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::TemplateNotFound(_)
            | LedgerError::TemplateInactive(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::AccountNotPostable(_)
            | LedgerError::TemplateMissingSide { .. }
            | LedgerError::MissingRuleParameter { .. }
            | LedgerError::InvalidConfiguration(_)
            | LedgerError::Config(_) => ErrorCategory::Configuration,
            LedgerError::InsufficientStock(_)
            | LedgerError::UnbalancedEntry { .. }
            | LedgerError::NoCostDefined { .. }
            | LedgerError::AmountExceedsBalance { .. }
            | LedgerError::InvalidLine(_)
            | LedgerError::EntryImmutable(_)
            | LedgerError::EntryNotFound(_)
            | LedgerError::ProductNotFound(_)
            | LedgerError::InvoiceNotFound(_)
            | LedgerError::CounterpartyNotFound(_)
            | LedgerError::Validation(_) => ErrorCategory::Validation,
            LedgerError::ConcurrencyConflict(_)
            | LedgerError::LockTimeout(_)
            | LedgerError::Storage(_) => ErrorCategory::Transient,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Stock shortfalls carried by an insufficient-stock rejection
    pub fn shortfalls(&self) -> &[StockShortfall] {
        match self {
            LedgerError::InsufficientStock(shortfalls) => shortfalls,
            _ => &[],
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
