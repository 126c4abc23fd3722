//! Main ledger facade that runs every operation in its own unit of work

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{
    AvailabilityReport, CostResolver, PriceRecord, Product, StockItem, StockLedger, StockMovement,
};
use crate::invoicing::{
    AdjustmentOutcome, InvoiceOrchestrator, InvoiceOutcome, InvoicePreview, InvoiceRequest,
    StockAdjuster, StockAdjustment, StockReceipt,
};
use crate::ledger::account::{standard_chart, AccountRegistry, AccountSpec};
use crate::ledger::journal::{Journal, RecordOptions};
use crate::ledger::template::{
    ApplyOptions, JournalTemplate, TemplateEngine, TemplateSpec, TemplateValidation,
};
use crate::posting::{
    PaymentOutcome, PaymentPoster, PaymentRequest, PurchasePoster, SalePoster,
    SupplierInvoiceOutcome, SupplierInvoiceRequest,
};
use crate::traits::*;
use crate::types::*;

/// Commit on success, roll back on failure
async fn finish<T>(mut uow: Box<dyn UnitOfWork>, result: LedgerResult<T>) -> LedgerResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            if err.is_retryable() {
                tracing::warn!(error = %err, "unit of work aborted, caller may retry");
            }
            Err(err)
        }
    }
}

/// Always roll back; for reads and previews
async fn discard<T>(mut uow: Box<dyn UnitOfWork>, result: LedgerResult<T>) -> LedgerResult<T> {
    uow.rollback().await?;
    result
}

/// Main ledger system that orchestrates all accounting operations
pub struct Ledger<S: LedgerStorage> {
    storage: S,
    config: EngineConfig,
    registry: AccountRegistry,
    journal: Journal,
    templates: TemplateEngine,
    costs: CostResolver,
    sales: SalePoster,
    payments: PaymentPoster,
    purchases: PurchasePoster,
    invoices: InvoiceOrchestrator,
    adjustments: StockAdjuster,
}

impl<S: LedgerStorage> Ledger<S> {
    /// Create a new ledger with the default configuration
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self::with_validator(storage, config, Box::new(DefaultAccountValidator))
    }

    /// Create a new ledger with a custom account validator
    pub fn with_validator(
        storage: S,
        config: EngineConfig,
        validator: Box<dyn AccountValidator>,
    ) -> Self {
        let journal = Journal::new(config.posting.balance_tolerance.clone());
        let templates = TemplateEngine::new(journal.clone());
        let costs = CostResolver::new(config.costing.strategy);
        let sales = SalePoster::new(templates.clone(), config.invoicing.clone());
        Self {
            payments: PaymentPoster::new(journal.clone(), config.accounts.clone()),
            purchases: PurchasePoster::new(journal.clone(), config.accounts.clone()),
            invoices: InvoiceOrchestrator::new(
                journal.clone(),
                costs,
                config.accounts.clone(),
                sales.clone(),
                config.invoicing.post_revenue_entry,
            ),
            adjustments: StockAdjuster::new(journal.clone(), costs, config.accounts.clone()),
            registry: AccountRegistry::with_validator(validator),
            storage,
            config,
            journal,
            templates,
            costs,
            sales,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // Chart of accounts
    /// Create a whole chart in one unit of work
    pub async fn provision_chart(&self, specs: Vec<AccountSpec>) -> LedgerResult<Vec<Account>> {
        let mut uow = self.storage.begin().await?;
        let result = self.registry.provision_chart(uow.as_mut(), specs).await;
        finish(uow, result).await
    }

    pub async fn provision_standard_chart(&self) -> LedgerResult<Vec<Account>> {
        self.provision_chart(standard_chart()).await
    }

    pub async fn create_account(&self, spec: AccountSpec) -> LedgerResult<Account> {
        let mut uow = self.storage.begin().await?;
        let result = self.registry.create_account(uow.as_mut(), spec).await;
        finish(uow, result).await
    }

    pub async fn deactivate_account(&self, code: &str) -> LedgerResult<Account> {
        let mut uow = self.storage.begin().await?;
        let result = AccountRegistry::deactivate(uow.as_mut(), code).await;
        finish(uow, result).await
    }

    pub async fn get_account(&self, code: &str) -> LedgerResult<Option<Account>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_account(code).await;
        discard(uow, result).await
    }

    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.list_accounts().await;
        discard(uow, result).await
    }

    /// Accounts from the root down to `code`
    pub async fn account_path(&self, code: &str) -> LedgerResult<Vec<Account>> {
        let mut uow = self.storage.begin().await?;
        let result = AccountRegistry::account_path(uow.as_mut(), code).await;
        discard(uow, result).await
    }

    // Templates
    pub async fn create_template(&self, spec: TemplateSpec) -> LedgerResult<JournalTemplate> {
        let mut uow = self.storage.begin().await?;
        let result = self.templates.create_template(uow.as_mut(), spec).await;
        finish(uow, result).await
    }

    /// Store a new version; the previous version is deactivated
    pub async fn revise_template(&self, spec: TemplateSpec) -> LedgerResult<JournalTemplate> {
        let mut uow = self.storage.begin().await?;
        let result = self.templates.revise_template(uow.as_mut(), spec).await;
        finish(uow, result).await
    }

    pub async fn activate_template(&self, code: &str) -> LedgerResult<JournalTemplate> {
        let mut uow = self.storage.begin().await?;
        let result = TemplateEngine::set_active(uow.as_mut(), code, true).await;
        finish(uow, result).await
    }

    pub async fn deactivate_template(&self, code: &str) -> LedgerResult<JournalTemplate> {
        let mut uow = self.storage.begin().await?;
        let result = TemplateEngine::set_active(uow.as_mut(), code, false).await;
        finish(uow, result).await
    }

    pub async fn validate_template(&self, code: &str) -> LedgerResult<TemplateValidation> {
        let mut uow = self.storage.begin().await?;
        let result = TemplateEngine::validate_template(uow.as_mut(), code).await;
        discard(uow, result).await
    }

    pub async fn get_template(&self, code: &str) -> LedgerResult<Option<JournalTemplate>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_template(code).await;
        discard(uow, result).await
    }

    /// Latest version of every template
    pub async fn list_templates(&self) -> LedgerResult<Vec<JournalTemplate>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.list_templates().await;
        discard(uow, result).await
    }

    // Journal
    /// Apply a template with the configured posting defaults
    pub async fn apply_template(
        &self,
        code: &str,
        doc: &SourceDocument,
        actor: &str,
    ) -> LedgerResult<JournalEntry> {
        let options = ApplyOptions {
            auto_post: self.config.posting.auto_post,
            ..ApplyOptions::default()
        };
        self.apply_template_with(code, doc, actor, options).await
    }

    pub async fn apply_template_with(
        &self,
        code: &str,
        doc: &SourceDocument,
        actor: &str,
        options: ApplyOptions,
    ) -> LedgerResult<JournalEntry> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .templates
            .apply(uow.as_mut(), code, doc, actor, options)
            .await;
        finish(uow, result).await
    }

    /// Record a hand-built entry, e.g. from [`JournalEntryBuilder`](crate::ledger::journal::JournalEntryBuilder)
    pub async fn record_entry(
        &self,
        entry: JournalEntry,
        options: RecordOptions,
    ) -> LedgerResult<JournalEntry> {
        let mut uow = self.storage.begin().await?;
        let result = self.journal.record(uow.as_mut(), entry, options).await;
        finish(uow, result).await
    }

    pub async fn post_draft(&self, id: Uuid) -> LedgerResult<JournalEntry> {
        let mut uow = self.storage.begin().await?;
        let result = self.journal.post_draft(uow.as_mut(), id).await;
        finish(uow, result).await
    }

    pub async fn delete_draft(&self, id: Uuid) -> LedgerResult<()> {
        let mut uow = self.storage.begin().await?;
        let result = Journal::delete_draft(uow.as_mut(), id).await;
        finish(uow, result).await
    }

    /// Post the mirror image of a posted entry
    pub async fn reverse_entry(
        &self,
        id: Uuid,
        date: NaiveDate,
        actor: &str,
    ) -> LedgerResult<JournalEntry> {
        let mut uow = self.storage.begin().await?;
        let result = self.journal.reverse(uow.as_mut(), id, date, actor).await;
        finish(uow, result).await
    }

    pub async fn get_entry(&self, id: Uuid) -> LedgerResult<Option<JournalEntry>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_journal_entry(id).await;
        discard(uow, result).await
    }

    /// Entries in number order
    pub async fn list_entries(&self) -> LedgerResult<Vec<JournalEntry>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.list_journal_entries().await.map(|mut entries| {
            entries.sort_by_key(|e| e.number);
            entries
        });
        discard(uow, result).await
    }

    // Products, prices and counterparties
    pub async fn register_product(&self, product: Product) -> LedgerResult<Product> {
        let mut uow = self.storage.begin().await?;
        let result = uow.insert_product(&product).await.map(|_| product);
        finish(uow, result).await
    }

    pub async fn get_product(&self, id: &str) -> LedgerResult<Option<Product>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_product(id).await;
        discard(uow, result).await
    }

    pub async fn set_price(&self, price: PriceRecord) -> LedgerResult<()> {
        crate::utils::validation::validate_positive_amount(&price.amount)?;
        let mut uow = self.storage.begin().await?;
        let result = match uow.find_product(&price.product_id).await {
            Ok(Some(_)) => uow.insert_price(&price).await,
            Ok(None) => Err(LedgerError::ProductNotFound(price.product_id.clone())),
            Err(err) => Err(err),
        };
        finish(uow, result).await
    }

    pub async fn register_counterparty(&self, counterparty: Counterparty) -> LedgerResult<()> {
        let mut uow = self.storage.begin().await?;
        let result = uow.insert_counterparty(&counterparty).await;
        finish(uow, result).await
    }

    pub async fn get_counterparty(
        &self,
        kind: CounterpartyKind,
        id: &str,
    ) -> LedgerResult<Option<Counterparty>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_counterparty(kind, id).await;
        discard(uow, result).await
    }

    // Inventory
    pub async fn receive_stock(
        &self,
        receipt: StockReceipt,
        actor: &str,
    ) -> LedgerResult<StockMovement> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .adjustments
            .receive_stock(uow.as_mut(), receipt, actor)
            .await;
        finish(uow, result).await
    }

    pub async fn record_stock_adjustment(
        &self,
        adjustment: StockAdjustment,
        actor: &str,
    ) -> LedgerResult<AdjustmentOutcome> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .adjustments
            .record_stock_adjustment(uow.as_mut(), adjustment, actor)
            .await;
        finish(uow, result).await
    }

    pub async fn check_availability(&self, items: &[StockItem]) -> LedgerResult<AvailabilityReport> {
        let mut uow = self.storage.begin().await?;
        let result = StockLedger::validate_availability(uow.as_mut(), items).await;
        discard(uow, result).await
    }

    pub async fn unit_cost(&self, product_id: &str, date: NaiveDate) -> LedgerResult<BigDecimal> {
        let mut uow = self.storage.begin().await?;
        let result = self.costs.unit_cost(uow.as_mut(), product_id, date).await;
        discard(uow, result).await
    }

    pub async fn movements(&self, product_id: &str) -> LedgerResult<Vec<StockMovement>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.list_movements(product_id).await;
        discard(uow, result).await
    }

    // Invoicing and payments
    /// Stock check and costing for a prospective invoice; nothing is written
    pub async fn preview_invoice(&self, request: &InvoiceRequest) -> LedgerResult<InvoicePreview> {
        let mut uow = self.storage.begin().await?;
        let result = self.invoices.preview(uow.as_mut(), request).await;
        discard(uow, result).await
    }

    pub async fn create_invoice(
        &self,
        request: InvoiceRequest,
        actor: &str,
    ) -> LedgerResult<InvoiceOutcome> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .invoices
            .create_invoice(uow.as_mut(), request, actor)
            .await;
        finish(uow, result).await
    }

    pub async fn get_invoice(&self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.find_invoice(id).await;
        discard(uow, result).await
    }

    /// Post the revenue entry of an existing sale invoice
    pub async fn post_sale_invoice(&self, invoice_id: Uuid, actor: &str) -> LedgerResult<JournalEntry> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .sales
            .post_sale_invoice(uow.as_mut(), invoice_id, actor)
            .await;
        finish(uow, result).await
    }

    /// Record a supplier's invoice so payments can settle it
    pub async fn register_supplier_invoice(
        &self,
        request: SupplierInvoiceRequest,
        actor: &str,
    ) -> LedgerResult<SupplierInvoiceOutcome> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .purchases
            .register_supplier_invoice(uow.as_mut(), request, actor)
            .await;
        finish(uow, result).await
    }

    pub async fn post_supplier_payment(
        &self,
        request: PaymentRequest,
        actor: &str,
    ) -> LedgerResult<PaymentOutcome> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .payments
            .post_supplier_payment(uow.as_mut(), request, actor)
            .await;
        finish(uow, result).await
    }

    pub async fn post_customer_receipt(
        &self,
        request: PaymentRequest,
        actor: &str,
    ) -> LedgerResult<PaymentOutcome> {
        let mut uow = self.storage.begin().await?;
        let result = self
            .payments
            .post_customer_receipt(uow.as_mut(), request, actor)
            .await;
        finish(uow, result).await
    }

    // Reporting
    pub async fn trial_balance(&self) -> LedgerResult<TrialBalance> {
        let mut uow = self.storage.begin().await?;
        let result = AccountRegistry::trial_balance(uow.as_mut()).await;
        discard(uow, result).await
    }

    pub async fn activity(&self) -> LedgerResult<Vec<ActivityRecord>> {
        let mut uow = self.storage.begin().await?;
        let result = uow.list_activity().await;
        discard(uow, result).await
    }

    /// Validate the integrity of the ledger
    pub async fn validate_integrity(&self) -> LedgerResult<LedgerIntegrityReport> {
        let mut uow = self.storage.begin().await?;
        let result = self.integrity(uow.as_mut()).await;
        discard(uow, result).await
    }

    async fn integrity(&self, uow: &mut dyn UnitOfWork) -> LedgerResult<LedgerIntegrityReport> {
        let tolerance = self.journal.tolerance();
        let mut issues = Vec::new();

        let trial_balance = AccountRegistry::trial_balance(uow).await?;
        if !trial_balance.is_balanced {
            issues.push(format!(
                "Trial balance is not balanced: debits = {}, credits = {}",
                trial_balance.total_debits, trial_balance.total_credits
            ));
        }

        let entries = uow.list_journal_entries().await?;
        let mut line_sums: BTreeMap<&str, (BigDecimal, BigDecimal)> = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.is_posted()) {
            if !entry.is_balanced_within(tolerance) {
                issues.push(format!(
                    "Entry {} is unbalanced by {}",
                    entry.number,
                    entry.imbalance()
                ));
            }
            for line in &entry.lines {
                if let Err(err) = line.validate() {
                    issues.push(format!("Entry {}: {}", entry.number, err));
                }
                let sums = line_sums
                    .entry(line.account_code.as_str())
                    .or_insert_with(|| (BigDecimal::zero(), BigDecimal::zero()));
                sums.0 += &line.debit;
                sums.1 += &line.credit;
            }
        }

        for account in uow.list_accounts().await? {
            let (debit, credit) = line_sums
                .remove(account.code.as_str())
                .unwrap_or_else(|| (BigDecimal::zero(), BigDecimal::zero()));
            if debit != account.debit_total || credit != account.credit_total {
                issues.push(format!(
                    "Account {} totals ({} / {}) differ from its posted lines ({} / {})",
                    account.code, account.debit_total, account.credit_total, debit, credit
                ));
            }
        }
        for code in line_sums.keys() {
            issues.push(format!("Posted lines reference unknown account {}", code));
        }

        let movements = uow.list_all_movements().await?;
        for movement in &movements {
            if movement.stock_after != &movement.stock_before + &movement.quantity {
                issues.push(format!(
                    "Movement {} snapshot does not add up: {} + {} != {}",
                    movement.id, movement.stock_before, movement.quantity, movement.stock_after
                ));
            }
            if movement.stock_after < BigDecimal::zero() {
                let allowed = uow
                    .find_product(&movement.product_id)
                    .await?
                    .is_some_and(|p| p.allow_negative_stock);
                if !allowed {
                    issues.push(format!(
                        "Movement {} left product {} below zero",
                        movement.id, movement.product_id
                    ));
                }
            }
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "ledger integrity check found issues");
        }
        Ok(LedgerIntegrityReport {
            is_valid: issues.is_empty(),
            issues,
            entries_checked: entries.len(),
            movements_checked: movements.len(),
            trial_balance_total_debits: trial_balance.total_debits,
            trial_balance_total_credits: trial_balance.total_credits,
        })
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub entries_checked: usize,
    pub movements_checked: usize,
    pub trial_balance_total_debits: BigDecimal,
    pub trial_balance_total_credits: BigDecimal,
}
