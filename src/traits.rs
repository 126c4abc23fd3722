//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::inventory::{PriceKind, PriceRecord, Product, StockGuard, StockMovement};
use crate::ledger::template::JournalTemplate;
use crate::types::*;

/// Storage abstraction for the ledger engine
///
/// Every posting runs inside one [`UnitOfWork`] opened by [`LedgerStorage::begin`].
/// Implementations must give each unit serializable (or snapshot-isolated with
/// guarded writes) semantics: nothing written inside a unit is observable by
/// others until `commit`, and a unit dropped without `commit` leaves no trace.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Open a unit of work, waiting at most the storage's configured timeout
    async fn begin(&self) -> LedgerResult<Box<dyn UnitOfWork>>;
}

/// Active transaction handle threaded through every engine call
#[async_trait]
pub trait UnitOfWork: Send {
    // Chart of accounts
    async fn find_account(&mut self, code: &str) -> LedgerResult<Option<Account>>;

    async fn list_accounts(&mut self) -> LedgerResult<Vec<Account>>;

    /// Fails if the code already exists
    async fn insert_account(&mut self, account: &Account) -> LedgerResult<()>;

    async fn update_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// Add to the account's running debit and credit sums
    async fn apply_account_posting(
        &mut self,
        code: &str,
        debit: &BigDecimal,
        credit: &BigDecimal,
    ) -> LedgerResult<()>;

    // Templates
    /// Latest version of the template with this code
    async fn find_template(&mut self, code: &str) -> LedgerResult<Option<JournalTemplate>>;

    async fn list_templates(&mut self) -> LedgerResult<Vec<JournalTemplate>>;

    /// Store a new version; storage assigns `version`
    async fn insert_template(&mut self, template: JournalTemplate) -> LedgerResult<JournalTemplate>;

    /// Change the active flag of one stored version
    async fn set_template_active(
        &mut self,
        code: &str,
        version: u32,
        active: bool,
    ) -> LedgerResult<()>;

    // Journal
    /// Persist an entry with all its lines; storage assigns `number` from a
    /// sequence that is strictly increasing and never reused
    async fn insert_journal_entry(&mut self, entry: JournalEntry) -> LedgerResult<JournalEntry>;

    async fn find_journal_entry(&mut self, id: Uuid) -> LedgerResult<Option<JournalEntry>>;

    async fn list_journal_entries(&mut self) -> LedgerResult<Vec<JournalEntry>>;

    /// DRAFT -> POSTED; returns affected rows (0 if not a draft)
    async fn mark_entry_posted(&mut self, id: Uuid) -> LedgerResult<u64>;

    /// Delete a DRAFT entry; returns affected rows (0 if not a draft)
    async fn delete_draft_entry(&mut self, id: Uuid) -> LedgerResult<u64>;

    // Products and prices
    async fn find_product(&mut self, id: &str) -> LedgerResult<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> LedgerResult<()>;

    /// Add `delta` to the product's stock if `guard` holds; returns affected rows
    async fn adjust_stock(
        &mut self,
        product_id: &str,
        delta: &BigDecimal,
        guard: StockGuard,
    ) -> LedgerResult<u64>;

    async fn insert_price(&mut self, price: &PriceRecord) -> LedgerResult<()>;

    /// Latest-starting price of this kind valid on `date`
    async fn find_current_price(
        &mut self,
        product_id: &str,
        kind: PriceKind,
        date: NaiveDate,
    ) -> LedgerResult<Option<PriceRecord>>;

    // Stock movements
    async fn insert_movement(&mut self, movement: &StockMovement) -> LedgerResult<()>;

    /// Movements of one product in creation order
    async fn list_movements(&mut self, product_id: &str) -> LedgerResult<Vec<StockMovement>>;

    async fn list_all_movements(&mut self) -> LedgerResult<Vec<StockMovement>>;

    /// Link a movement to the entry that funded it; fails if already linked
    async fn link_movement_to_entry(&mut self, movement_id: Uuid, entry_id: Uuid)
        -> LedgerResult<()>;

    // Invoices
    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()>;

    async fn find_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>>;

    async fn update_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()>;

    // Counterparties
    async fn find_counterparty(
        &mut self,
        kind: CounterpartyKind,
        id: &str,
    ) -> LedgerResult<Option<Counterparty>>;

    async fn insert_counterparty(&mut self, counterparty: &Counterparty) -> LedgerResult<()>;

    /// Add `delta` to the counterparty's balance; returns affected rows
    async fn adjust_counterparty_balance(
        &mut self,
        kind: CounterpartyKind,
        id: &str,
        delta: &BigDecimal,
    ) -> LedgerResult<u64>;

    // Payments and receipts
    async fn insert_payment(&mut self, payment: &PaymentRecord) -> LedgerResult<()>;

    async fn find_payment(&mut self, id: Uuid) -> LedgerResult<Option<PaymentRecord>>;

    // Activity log
    async fn insert_activity(&mut self, record: &ActivityRecord) -> LedgerResult<()>;

    async fn list_activity(&mut self) -> LedgerResult<Vec<ActivityRecord>>;

    // Lifecycle
    /// Make every write of this unit visible atomically
    async fn commit(&mut self) -> LedgerResult<()>;

    /// Discard every write of this unit
    async fn rollback(&mut self) -> LedgerResult<()>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> LedgerResult<()>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        crate::utils::validation::validate_account_code(&account.code)?;
        crate::utils::validation::validate_account_name(&account.name)?;
        Ok(())
    }
}

