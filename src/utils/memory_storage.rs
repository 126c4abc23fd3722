//! In-memory storage implementation for testing and development
//!
//! Units of work are serialized behind a single async mutex. Each unit works
//! on a private copy of the state; `commit` swaps the copy in, anything else
//! (explicit rollback, error, drop) throws it away. The entry-number sequence
//! lives outside the state so numbers handed to rolled-back units are never
//! reused.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{PriceKind, PriceRecord, Product, StockGuard, StockMovement};
use crate::ledger::template::JournalTemplate;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct State {
    accounts: BTreeMap<String, Account>,
    /// Versions of each template in ascending order
    templates: BTreeMap<String, Vec<JournalTemplate>>,
    entries: Vec<JournalEntry>,
    products: HashMap<String, Product>,
    prices: Vec<PriceRecord>,
    movements: Vec<StockMovement>,
    invoices: HashMap<Uuid, Invoice>,
    counterparties: HashMap<(CounterpartyKind, String), Counterparty>,
    payments: HashMap<Uuid, PaymentRecord>,
    activity: Vec<ActivityRecord>,
}

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
    sequence: Arc<AtomicU64>,
    lock_timeout: Duration,
}

impl MemoryStorage {
    /// Create a new memory storage instance with a 30 second lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(30))
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::with_lock_timeout(config.lock_timeout())
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            sequence: Arc::new(AtomicU64::new(0)),
            lock_timeout,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn begin(&self) -> LedgerResult<Box<dyn UnitOfWork>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(self.lock_timeout))?;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard: Some(guard),
            working,
            sequence: self.sequence.clone(),
        }))
    }
}

/// Unit of work over [`MemoryStorage`]
pub struct MemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<State>>,
    working: State,
    sequence: Arc<AtomicU64>,
}

impl MemoryUnitOfWork {
    fn state(&mut self) -> LedgerResult<&mut State> {
        if self.guard.is_none() {
            return Err(LedgerError::Storage(
                "unit of work already committed or rolled back".to_string(),
            ));
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_account(&mut self, code: &str) -> LedgerResult<Option<Account>> {
        Ok(self.state()?.accounts.get(code).cloned())
    }

    async fn list_accounts(&mut self) -> LedgerResult<Vec<Account>> {
        Ok(self.state()?.accounts.values().cloned().collect())
    }

    async fn insert_account(&mut self, account: &Account) -> LedgerResult<()> {
        let state = self.state()?;
        if state.accounts.contains_key(&account.code) {
            return Err(LedgerError::Validation(format!(
                "Account with code '{}' already exists",
                account.code
            )));
        }
        state.accounts.insert(account.code.clone(), account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> LedgerResult<()> {
        match self.state()?.accounts.get_mut(&account.code) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(LedgerError::AccountNotFound(account.code.clone())),
        }
    }

    async fn apply_account_posting(
        &mut self,
        code: &str,
        debit: &BigDecimal,
        credit: &BigDecimal,
    ) -> LedgerResult<()> {
        match self.state()?.accounts.get_mut(code) {
            Some(account) => {
                account.apply_posting(debit, credit);
                Ok(())
            }
            None => Err(LedgerError::AccountNotFound(code.to_string())),
        }
    }

    async fn find_template(&mut self, code: &str) -> LedgerResult<Option<JournalTemplate>> {
        Ok(self
            .state()?
            .templates
            .get(code)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn list_templates(&mut self) -> LedgerResult<Vec<JournalTemplate>> {
        Ok(self
            .state()?
            .templates
            .values()
            .filter_map(|versions| versions.last())
            .cloned()
            .collect())
    }

    async fn insert_template(
        &mut self,
        mut template: JournalTemplate,
    ) -> LedgerResult<JournalTemplate> {
        let versions = self
            .state()?
            .templates
            .entry(template.code.clone())
            .or_default();
        template.version = versions.last().map_or(1, |latest| latest.version + 1);
        versions.push(template.clone());
        Ok(template)
    }

    async fn set_template_active(
        &mut self,
        code: &str,
        version: u32,
        active: bool,
    ) -> LedgerResult<()> {
        let stored = self
            .state()?
            .templates
            .get_mut(code)
            .and_then(|versions| versions.iter_mut().find(|t| t.version == version))
            .ok_or_else(|| LedgerError::TemplateNotFound(format!("{} v{}", code, version)))?;
        stored.active = active;
        Ok(())
    }

    async fn insert_journal_entry(&mut self, mut entry: JournalEntry) -> LedgerResult<JournalEntry> {
        self.state()?;
        entry.number = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.working.entries.push(entry.clone());
        Ok(entry)
    }

    async fn find_journal_entry(&mut self, id: Uuid) -> LedgerResult<Option<JournalEntry>> {
        Ok(self.state()?.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn list_journal_entries(&mut self) -> LedgerResult<Vec<JournalEntry>> {
        Ok(self.state()?.entries.clone())
    }

    async fn mark_entry_posted(&mut self, id: Uuid) -> LedgerResult<u64> {
        let entry = self
            .state()?
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.status == EntryStatus::Draft);
        Ok(match entry {
            Some(entry) => {
                entry.status = EntryStatus::Posted;
                entry.posted_at = Some(chrono::Utc::now().naive_utc());
                1
            }
            None => 0,
        })
    }

    async fn delete_draft_entry(&mut self, id: Uuid) -> LedgerResult<u64> {
        let entries = &mut self.state()?.entries;
        let before = entries.len();
        entries.retain(|e| !(e.id == id && e.status == EntryStatus::Draft));
        Ok((before - entries.len()) as u64)
    }

    async fn find_product(&mut self, id: &str) -> LedgerResult<Option<Product>> {
        Ok(self.state()?.products.get(id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> LedgerResult<()> {
        let state = self.state()?;
        if state.products.contains_key(&product.id) {
            return Err(LedgerError::Validation(format!(
                "Product '{}' already exists",
                product.id
            )));
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn adjust_stock(
        &mut self,
        product_id: &str,
        delta: &BigDecimal,
        guard: StockGuard,
    ) -> LedgerResult<u64> {
        let Some(product) = self.state()?.products.get_mut(product_id) else {
            return Ok(0);
        };
        if let StockGuard::AtLeast(required) = guard {
            if product.stock < required {
                return Ok(0);
            }
        }
        product.stock += delta;
        product.updated_at = chrono::Utc::now().naive_utc();
        Ok(1)
    }

    async fn insert_price(&mut self, price: &PriceRecord) -> LedgerResult<()> {
        self.state()?.prices.push(price.clone());
        Ok(())
    }

    async fn find_current_price(
        &mut self,
        product_id: &str,
        kind: PriceKind,
        date: NaiveDate,
    ) -> LedgerResult<Option<PriceRecord>> {
        Ok(self
            .state()?
            .prices
            .iter()
            .filter(|p| p.product_id == product_id && p.kind == kind && p.is_valid_on(date))
            .max_by_key(|p| p.valid_from)
            .cloned())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> LedgerResult<()> {
        self.state()?.movements.push(movement.clone());
        Ok(())
    }

    async fn list_movements(&mut self, product_id: &str) -> LedgerResult<Vec<StockMovement>> {
        Ok(self
            .state()?
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn list_all_movements(&mut self) -> LedgerResult<Vec<StockMovement>> {
        Ok(self.state()?.movements.clone())
    }

    async fn link_movement_to_entry(
        &mut self,
        movement_id: Uuid,
        entry_id: Uuid,
    ) -> LedgerResult<()> {
        let movement = self
            .state()?
            .movements
            .iter_mut()
            .find(|m| m.id == movement_id)
            .ok_or_else(|| {
                LedgerError::Validation(format!("Stock movement not found: {}", movement_id))
            })?;
        if movement.journal_entry_id.is_some() {
            return Err(LedgerError::Validation(format!(
                "Stock movement {} is already linked to a journal entry",
                movement_id
            )));
        }
        movement.journal_entry_id = Some(entry_id);
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        let state = self.state()?;
        if state.invoices.contains_key(&invoice.id) {
            return Err(LedgerError::Validation(format!(
                "Invoice {} already exists",
                invoice.id
            )));
        }
        // sale numbers are ours; purchase numbers are unique per supplier
        let duplicate = state.invoices.values().any(|existing| {
            existing.counterparty_kind == invoice.counterparty_kind
                && existing.number == invoice.number
                && (invoice.counterparty_kind == CounterpartyKind::Customer
                    || existing.counterparty_id == invoice.counterparty_id)
        });
        if duplicate {
            return Err(LedgerError::Validation(format!(
                "{:?} invoice number {} already exists",
                invoice.counterparty_kind, invoice.number
            )));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn find_invoice(&mut self, id: Uuid) -> LedgerResult<Option<Invoice>> {
        Ok(self.state()?.invoices.get(&id).cloned())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        match self.state()?.invoices.get_mut(&invoice.id) {
            Some(existing) => {
                *existing = invoice.clone();
                Ok(())
            }
            None => Err(LedgerError::InvoiceNotFound(invoice.id.to_string())),
        }
    }

    async fn find_counterparty(
        &mut self,
        kind: CounterpartyKind,
        id: &str,
    ) -> LedgerResult<Option<Counterparty>> {
        Ok(self
            .state()?
            .counterparties
            .get(&(kind, id.to_string()))
            .cloned())
    }

    async fn insert_counterparty(&mut self, counterparty: &Counterparty) -> LedgerResult<()> {
        let key = (counterparty.kind, counterparty.id.clone());
        let state = self.state()?;
        if state.counterparties.contains_key(&key) {
            return Err(LedgerError::Validation(format!(
                "{:?} '{}' already exists",
                counterparty.kind, counterparty.id
            )));
        }
        state.counterparties.insert(key, counterparty.clone());
        Ok(())
    }

    async fn adjust_counterparty_balance(
        &mut self,
        kind: CounterpartyKind,
        id: &str,
        delta: &BigDecimal,
    ) -> LedgerResult<u64> {
        Ok(
            match self.state()?.counterparties.get_mut(&(kind, id.to_string())) {
                Some(counterparty) => {
                    counterparty.balance += delta;
                    counterparty.updated_at = chrono::Utc::now().naive_utc();
                    1
                }
                None => 0,
            },
        )
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> LedgerResult<()> {
        self.state()?.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment(&mut self, id: Uuid) -> LedgerResult<Option<PaymentRecord>> {
        Ok(self.state()?.payments.get(&id).cloned())
    }

    async fn insert_activity(&mut self, record: &ActivityRecord) -> LedgerResult<()> {
        self.state()?.activity.push(record.clone());
        Ok(())
    }

    async fn list_activity(&mut self) -> LedgerResult<Vec<ActivityRecord>> {
        Ok(self.state()?.activity.clone())
    }

    async fn commit(&mut self) -> LedgerResult<()> {
        let mut guard = self.guard.take().ok_or_else(|| {
            LedgerError::Storage("unit of work already committed or rolled back".to_string())
        })?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> LedgerResult<()> {
        self.guard = None;
        self.working = State::default();
        Ok(())
    }
}
