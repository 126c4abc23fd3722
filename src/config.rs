//! Engine configuration
//!
//! Defaults are layered under an optional file and `LEDGER__`-prefixed
//! environment variables, e.g. `LEDGER__STORAGE__LOCK_TIMEOUT_SECS=10`.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LedgerError, LedgerResult};
use crate::inventory::CostStrategy;
use crate::types::{InvoiceType, PaymentMethod};

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub posting: PostingConfig,
    pub storage: StorageConfig,
    pub accounts: AccountMap,
    pub invoicing: InvoicingConfig,
    pub costing: CostingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingConfig {
    /// Largest accepted |debit - credit| for a posted entry
    pub balance_tolerance: BigDecimal,
    /// Whether template postings are posted immediately unless told otherwise;
    /// sale-invoice revenue entries are always posted
    pub auto_post: bool,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: BigDecimal::new(1.into(), 2),
            auto_post: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Longest wait to start a unit of work before giving up
    pub lock_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Fixed accounts used by direct two-line postings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMap {
    pub cash: String,
    pub bank: String,
    pub check_in_hand: String,
    pub card: String,
    pub receivables: String,
    pub payables: String,
    pub cost_of_goods_sold: String,
    pub inventory: String,
    /// Tax and perceptions charged on supplier invoices
    pub vat_credit: String,
    pub inventory_gain: String,
    pub inventory_shrinkage: String,
}

impl Default for AccountMap {
    fn default() -> Self {
        Self {
            cash: "1.1.01.001".to_string(),
            bank: "1.1.02.001".to_string(),
            check_in_hand: "1.1.01.002".to_string(),
            card: "1.1.03.002".to_string(),
            receivables: "1.1.03.001".to_string(),
            payables: "2.1.01.001".to_string(),
            cost_of_goods_sold: "5.1.01.001".to_string(),
            inventory: "1.1.04.001".to_string(),
            vat_credit: "1.1.05.001".to_string(),
            inventory_gain: "4.2.01.001".to_string(),
            inventory_shrinkage: "5.2.01.001".to_string(),
        }
    }
}

impl AccountMap {
    /// Settlement account for a payment method
    pub fn settlement_account(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Cash => &self.cash,
            PaymentMethod::BankTransfer => &self.bank,
            PaymentMethod::CheckInHand => &self.check_in_hand,
            PaymentMethod::Card => &self.card,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicingConfig {
    /// Template for invoices that discriminate tax
    pub tax_discriminated_template: String,
    /// Template for invoices with tax included or exempt
    pub tax_included_template: String,
    /// Also post the sale-invoice template entry inside the invoice saga
    pub post_revenue_entry: bool,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            tax_discriminated_template: "SALE_INVOICE_A".to_string(),
            tax_included_template: "SALE_INVOICE_B".to_string(),
            post_revenue_entry: false,
        }
    }
}

impl InvoicingConfig {
    pub fn template_for(&self, invoice_type: InvoiceType) -> &str {
        if invoice_type.discriminates_tax() {
            &self.tax_discriminated_template
        } else {
            &self.tax_included_template
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostingConfig {
    pub strategy: CostStrategy,
}

impl EngineConfig {
    /// Load defaults, then `path` if given, then `LEDGER__*` environment variables
    pub fn load(path: Option<&Path>) -> LedgerResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("LEDGER").separator("__"))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> LedgerResult<()> {
        if self.posting.balance_tolerance < BigDecimal::zero() {
            return Err(LedgerError::InvalidConfiguration(format!(
                "posting.balance_tolerance cannot be negative, got {}",
                self.posting.balance_tolerance
            )));
        }
        if self.storage.lock_timeout_secs == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "storage.lock_timeout_secs must be at least 1".to_string(),
            ));
        }

        let accounts = &self.accounts;
        for (key, code) in [
            ("cash", &accounts.cash),
            ("bank", &accounts.bank),
            ("check_in_hand", &accounts.check_in_hand),
            ("card", &accounts.card),
            ("receivables", &accounts.receivables),
            ("payables", &accounts.payables),
            ("cost_of_goods_sold", &accounts.cost_of_goods_sold),
            ("inventory", &accounts.inventory),
            ("vat_credit", &accounts.vat_credit),
            ("inventory_gain", &accounts.inventory_gain),
            ("inventory_shrinkage", &accounts.inventory_shrinkage),
        ] {
            crate::utils::validation::validate_account_code(code).map_err(|err| {
                LedgerError::InvalidConfiguration(format!("accounts.{}: {}", key, err))
            })?;
        }

        for (key, code) in [
            ("tax_discriminated_template", &self.invoicing.tax_discriminated_template),
            ("tax_included_template", &self.invoicing.tax_included_template),
        ] {
            if code.trim().is_empty() {
                return Err(LedgerError::InvalidConfiguration(format!(
                    "invoicing.{} cannot be empty",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(
            config.posting.balance_tolerance,
            "0.01".parse::<BigDecimal>().unwrap()
        );
        assert_eq!(config.storage.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.accounts.settlement_account(PaymentMethod::Cash), "1.1.01.001");
        assert_eq!(config.invoicing.template_for(InvoiceType::A), "SALE_INVOICE_A");
        assert_eq!(config.invoicing.template_for(InvoiceType::C), "SALE_INVOICE_B");
        assert_eq!(config.costing.strategy, CostStrategy::LastPurchase);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"costing": {"strategy": "weighted_average"}, "storage": {"lock_timeout_secs": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.costing.strategy, CostStrategy::WeightedAverage);
        assert_eq!(config.storage.lock_timeout_secs, 5);
        assert_eq!(config.accounts, AccountMap::default());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.invoicing, InvoicingConfig::default());
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut config = EngineConfig::default();
        config.posting.balance_tolerance = "-0.01".parse().unwrap();
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfiguration(_))));

        let mut config = EngineConfig::default();
        config.storage.lock_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfiguration(_))));

        let mut config = EngineConfig::default();
        config.accounts.payables = String::new();
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfiguration(_))));

        let mut config = EngineConfig::default();
        config.invoicing.tax_included_template = " ".into();
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    #[test]
    fn test_load_validates_file_settings() {
        let path = std::env::temp_dir().join(format!("ledger-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"storage": {"lock_timeout_secs": 0}}"#).unwrap();
        let result = EngineConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(LedgerError::InvalidConfiguration(_))));
    }
}
