//! Account registry: chart of accounts, leaf resolution and running balances

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::*;
use crate::types::*;

/// Input for creating one account of the chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
}

impl AccountSpec {
    pub fn new(code: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            account_type,
        }
    }
}

/// Account registry for chart of accounts operations
pub struct AccountRegistry {
    validator: Box<dyn AccountValidator>,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self {
            validator: Box::new(DefaultAccountValidator),
        }
    }

    /// Create a registry with a custom account validator
    pub fn with_validator(validator: Box<dyn AccountValidator>) -> Self {
        Self { validator }
    }

    /// Look up an account by code
    pub async fn resolve(uow: &mut dyn UnitOfWork, code: &str) -> LedgerResult<Account> {
        uow.find_account(code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(code.to_string()))
    }

    /// True iff the account is a leaf and active
    pub fn is_postable(account: &Account) -> bool {
        account.is_postable()
    }

    /// Look up an account that may appear in a journal line
    pub async fn resolve_postable(uow: &mut dyn UnitOfWork, code: &str) -> LedgerResult<Account> {
        let account = Self::resolve(uow, code).await?;
        if !Self::is_postable(&account) {
            return Err(LedgerError::AccountNotPostable(code.to_string()));
        }
        Ok(account)
    }

    /// Add debit and credit deltas to an account's running sums
    pub async fn apply_posting(
        uow: &mut dyn UnitOfWork,
        code: &str,
        debit: &BigDecimal,
        credit: &BigDecimal,
    ) -> LedgerResult<()> {
        if *debit < BigDecimal::zero() || *credit < BigDecimal::zero() {
            return Err(LedgerError::Validation(format!(
                "Posting deltas on '{}' must not be negative",
                code
            )));
        }
        tracing::debug!(account = code, %debit, %credit, "applying posting to account");
        uow.apply_account_posting(code, debit, credit).await
    }

    /// Create one account; its parent (derived from the code) must already exist
    pub async fn create_account(
        &self,
        uow: &mut dyn UnitOfWork,
        spec: AccountSpec,
    ) -> LedgerResult<Account> {
        let account = Account::new(spec.code, spec.name, spec.account_type);
        self.validator.validate_account(&account)?;

        if uow.find_account(&account.code).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account with code '{}' already exists",
                account.code
            )));
        }

        if let Some(ref parent_code) = account.parent_code {
            let mut parent = uow.find_account(parent_code).await?.ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Parent account '{}' of '{}' does not exist",
                    parent_code, account.code
                ))
            })?;

            if parent.account_type != account.account_type {
                return Err(LedgerError::Validation(format!(
                    "Account '{}' is {:?} but its parent '{}' is {:?}",
                    account.code, account.account_type, parent.code, parent.account_type
                )));
            }

            if parent.is_leaf {
                if parent.has_postings() {
                    return Err(LedgerError::Validation(format!(
                        "Account '{}' already has postings and cannot become a parent",
                        parent.code
                    )));
                }
                parent.is_leaf = false;
                parent.updated_at = chrono::Utc::now().naive_utc();
                uow.update_account(&parent).await?;
            }
        }

        uow.insert_account(&account).await?;
        Ok(account)
    }

    /// Bulk-create a chart, parents before children
    pub async fn provision_chart(
        &self,
        uow: &mut dyn UnitOfWork,
        mut specs: Vec<AccountSpec>,
    ) -> LedgerResult<Vec<Account>> {
        specs.sort_by_key(|spec| level_of(&spec.code));

        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            created.push(self.create_account(uow, spec).await?);
        }

        tracing::info!(accounts = created.len(), "provisioned chart of accounts");
        Ok(created)
    }

    /// Accounts are never deleted; a deactivated account stops being postable
    pub async fn deactivate(uow: &mut dyn UnitOfWork, code: &str) -> LedgerResult<Account> {
        let mut account = Self::resolve(uow, code).await?;
        account.active = false;
        account.updated_at = chrono::Utc::now().naive_utc();
        uow.update_account(&account).await?;
        tracing::info!(account = code, "deactivated account");
        Ok(account)
    }

    /// Direct children of an account
    pub async fn children(uow: &mut dyn UnitOfWork, code: &str) -> LedgerResult<Vec<Account>> {
        Ok(uow
            .list_accounts()
            .await?
            .into_iter()
            .filter(|account| account.parent_code.as_deref() == Some(code))
            .collect())
    }

    /// Path from the root down to the account (for hierarchical display)
    pub async fn account_path(uow: &mut dyn UnitOfWork, code: &str) -> LedgerResult<Vec<Account>> {
        let mut path = Vec::new();
        let mut current_code = Some(code.to_string());

        while let Some(code) = current_code {
            let account = Self::resolve(uow, &code).await?;
            current_code = account.parent_code.clone();
            path.insert(0, account);
        }

        Ok(path)
    }

    /// Debit and credit totals over every leaf account
    pub async fn trial_balance(uow: &mut dyn UnitOfWork) -> LedgerResult<TrialBalance> {
        let accounts: Vec<AccountBalance> = uow
            .list_accounts()
            .await?
            .into_iter()
            .filter(|account| account.is_leaf)
            .map(|account| AccountBalance {
                balance: account.balance(),
                code: account.code,
                name: account.name,
                account_type: account.account_type,
                debit_total: account.debit_total,
                credit_total: account.credit_total,
            })
            .collect();

        let total_debits: BigDecimal = accounts.iter().map(|a| &a.debit_total).sum();
        let total_credits: BigDecimal = accounts.iter().map(|a| &a.credit_total).sum();
        let is_balanced = total_debits == total_credits;

        Ok(TrialBalance {
            accounts,
            total_debits,
            total_credits,
            is_balanced,
        })
    }
}

/// Chart used by tests and new installations
pub fn standard_chart() -> Vec<AccountSpec> {
    vec![
        AccountSpec::new("1", "Assets", AccountType::Asset),
        AccountSpec::new("1.1", "Current Assets", AccountType::Asset),
        AccountSpec::new("1.1.01", "Cash on Hand", AccountType::Asset),
        AccountSpec::new("1.1.01.001", "Cash", AccountType::Asset),
        AccountSpec::new("1.1.01.002", "Checks in Hand", AccountType::Asset),
        AccountSpec::new("1.1.02", "Banks", AccountType::Asset),
        AccountSpec::new("1.1.02.001", "Bank Current Account", AccountType::Asset),
        AccountSpec::new("1.1.03", "Receivables", AccountType::Asset),
        AccountSpec::new("1.1.03.001", "Accounts Receivable", AccountType::Asset),
        AccountSpec::new("1.1.03.002", "Card Settlements Receivable", AccountType::Asset),
        AccountSpec::new("1.1.04", "Inventories", AccountType::Asset),
        AccountSpec::new("1.1.04.001", "Merchandise Inventory", AccountType::Asset),
        AccountSpec::new("1.1.05", "Tax Credits", AccountType::Asset),
        AccountSpec::new("1.1.05.001", "VAT Credit", AccountType::Asset),
        AccountSpec::new("2", "Liabilities", AccountType::Liability),
        AccountSpec::new("2.1", "Current Liabilities", AccountType::Liability),
        AccountSpec::new("2.1.01", "Trade Payables", AccountType::Liability),
        AccountSpec::new("2.1.01.001", "Accounts Payable", AccountType::Liability),
        AccountSpec::new("2.1.02", "Tax Liabilities", AccountType::Liability),
        AccountSpec::new("2.1.02.001", "VAT Payable", AccountType::Liability),
        AccountSpec::new("2.1.02.002", "Perceptions Payable", AccountType::Liability),
        AccountSpec::new("3", "Equity", AccountType::Equity),
        AccountSpec::new("3.1", "Owner's Capital", AccountType::Equity),
        AccountSpec::new("4", "Income", AccountType::Income),
        AccountSpec::new("4.1", "Sales", AccountType::Income),
        AccountSpec::new("4.1.01", "Merchandise Sales", AccountType::Income),
        AccountSpec::new("4.1.01.001", "Sales", AccountType::Income),
        AccountSpec::new("4.2", "Other Income", AccountType::Income),
        AccountSpec::new("4.2.01", "Inventory Gains", AccountType::Income),
        AccountSpec::new("4.2.01.001", "Inventory Adjustment Gain", AccountType::Income),
        AccountSpec::new("5", "Expenses", AccountType::Expense),
        AccountSpec::new("5.1", "Cost of Sales", AccountType::Expense),
        AccountSpec::new("5.1.01", "Cost of Goods Sold", AccountType::Expense),
        AccountSpec::new("5.1.01.001", "Cost of Goods Sold", AccountType::Expense),
        AccountSpec::new("5.2", "Operating Expenses", AccountType::Expense),
        AccountSpec::new("5.2.01", "Inventory Losses", AccountType::Expense),
        AccountSpec::new("5.2.01.001", "Inventory Shrinkage", AccountType::Expense),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    #[tokio::test]
    async fn test_provisioning_resolves_parents_in_level_order() {
        let storage = MemoryStorage::new();
        let registry = AccountRegistry::new();
        let mut uow = storage.begin().await.unwrap();

        // children listed before parents
        let specs = vec![
            AccountSpec::new("1.1.01", "Cash", AccountType::Asset),
            AccountSpec::new("1.1", "Current Assets", AccountType::Asset),
            AccountSpec::new("1", "Assets", AccountType::Asset),
        ];
        registry.provision_chart(uow.as_mut(), specs).await.unwrap();

        let root = AccountRegistry::resolve(uow.as_mut(), "1").await.unwrap();
        let cash = AccountRegistry::resolve(uow.as_mut(), "1.1.01").await.unwrap();
        assert!(!root.is_leaf);
        assert!(cash.is_leaf);
        assert_eq!(cash.level, 3);

        let path = AccountRegistry::account_path(uow.as_mut(), "1.1.01")
            .await
            .unwrap();
        let codes: Vec<_> = path.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["1", "1.1", "1.1.01"]);

        let children = AccountRegistry::children(uow.as_mut(), "1").await.unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_child_type_must_match_parent() {
        let storage = MemoryStorage::new();
        let registry = AccountRegistry::new();
        let mut uow = storage.begin().await.unwrap();

        registry
            .create_account(uow.as_mut(), AccountSpec::new("1", "Assets", AccountType::Asset))
            .await
            .unwrap();
        let err = registry
            .create_account(
                uow.as_mut(),
                AccountSpec::new("1.1", "Sales", AccountType::Income),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = registry
            .create_account(
                uow.as_mut(),
                AccountSpec::new("9.1", "Orphan", AccountType::Asset),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_postability() {
        let storage = MemoryStorage::new();
        let registry = AccountRegistry::new();
        let mut uow = storage.begin().await.unwrap();
        registry
            .provision_chart(uow.as_mut(), standard_chart())
            .await
            .unwrap();

        assert!(matches!(
            AccountRegistry::resolve_postable(uow.as_mut(), "1.1").await,
            Err(LedgerError::AccountNotPostable(_))
        ));
        assert!(matches!(
            AccountRegistry::resolve_postable(uow.as_mut(), "9.9.9").await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(AccountRegistry::resolve_postable(uow.as_mut(), "1.1.01.001")
            .await
            .is_ok());

        AccountRegistry::deactivate(uow.as_mut(), "1.1.01.001")
            .await
            .unwrap();
        assert!(matches!(
            AccountRegistry::resolve_postable(uow.as_mut(), "1.1.01.001").await,
            Err(LedgerError::AccountNotPostable(_))
        ));
    }

    #[tokio::test]
    async fn test_account_with_postings_cannot_gain_children() {
        let storage = MemoryStorage::new();
        let registry = AccountRegistry::new();
        let mut uow = storage.begin().await.unwrap();
        registry
            .create_account(uow.as_mut(), AccountSpec::new("1", "Assets", AccountType::Asset))
            .await
            .unwrap();
        AccountRegistry::apply_posting(uow.as_mut(), "1", &BigDecimal::from(10), &BigDecimal::zero())
            .await
            .unwrap();

        let err = registry
            .create_account(uow.as_mut(), AccountSpec::new("1.1", "Cash", AccountType::Asset))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already has postings"));
    }

    #[tokio::test]
    async fn test_apply_posting_never_subtracts() {
        let storage = MemoryStorage::new();
        let registry = AccountRegistry::new();
        let mut uow = storage.begin().await.unwrap();
        registry
            .create_account(uow.as_mut(), AccountSpec::new("1", "Assets", AccountType::Asset))
            .await
            .unwrap();

        let err = AccountRegistry::apply_posting(
            uow.as_mut(),
            "1",
            &BigDecimal::from(-5),
            &BigDecimal::zero(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let trial = AccountRegistry::trial_balance(uow.as_mut()).await.unwrap();
        assert!(trial.is_balanced);
    }
}
