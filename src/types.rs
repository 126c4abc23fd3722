//! Core types and data structures for the ledger engine

use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Inventory, Receivables, etc.)
    Asset,
    /// Liabilities - what the business owes (Payables, VAT Payable, etc.)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Income/Revenue - money earned by the business
    Income,
    /// Expenses - costs incurred by the business (including cost of goods sold)
    Expense,
}

impl AccountType {
    /// Returns the normal balance type for this account type
    /// Assets and Expenses normally have debit balances
    /// Liabilities, Equity, and Income normally have credit balances
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => EntryType::Credit,
        }
    }
}

/// Side of a journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn opposite(&self) -> EntryType {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// Parent code of a dot-segmented account code ("1.1.03.001" -> "1.1.03")
pub fn parent_code_of(code: &str) -> Option<String> {
    code.rsplit_once('.').map(|(parent, _)| parent.to_string())
}

/// Nesting level of a dot-segmented account code (root = 1)
pub fn level_of(code: &str) -> u32 {
    code.split('.').count() as u32
}

/// Account in the hierarchical chart of accounts
///
/// Running debit and credit sums only ever grow; corrections are new postings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique hierarchical code, e.g. "1.1.03.001"
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
    /// Root accounts are level 1
    pub level: u32,
    /// Only leaf accounts may appear in journal lines
    pub is_leaf: bool,
    /// Accounts are deactivated, never deleted
    pub active: bool,
    pub debit_total: BigDecimal,
    pub credit_total: BigDecimal,
    pub metadata: HashMap<String, String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new active leaf account; parent and level come from the code
    pub fn new(code: String, name: String, account_type: AccountType) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            parent_code: parent_code_of(&code),
            level: level_of(&code),
            code,
            name,
            account_type,
            is_leaf: true,
            active: true,
            debit_total: BigDecimal::zero(),
            credit_total: BigDecimal::zero(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True iff the account may appear directly in a journal line
    pub fn is_postable(&self) -> bool {
        self.is_leaf && self.active
    }

    /// Whether any posting has ever touched this account
    pub fn has_postings(&self) -> bool {
        !self.debit_total.is_zero() || !self.credit_total.is_zero()
    }

    /// Add to the running sums
    pub fn apply_posting(&mut self, debit: &BigDecimal, credit: &BigDecimal) {
        self.debit_total += debit;
        self.credit_total += credit;
        self.updated_at = chrono::Utc::now().naive_utc();
    }

    /// Balance expressed on the account's normal side
    pub fn balance(&self) -> BigDecimal {
        match self.account_type.normal_balance() {
            EntryType::Debit => &self.debit_total - &self.credit_total,
            EntryType::Credit => &self.credit_total - &self.debit_total,
        }
    }
}

/// Lifecycle state of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Draft,
    Posted,
}

/// Category of business event that caused a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    SaleInvoice,
    PurchaseInvoice,
    CostOfGoodsSold,
    SupplierPayment,
    CustomerReceipt,
    StockAdjustment,
    Reversal,
    Manual,
}

/// What a journal entry was posted for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryOrigin {
    None,
    Invoice { invoice_id: Uuid },
    Payment { payment_id: Uuid },
    Receipt { receipt_id: Uuid },
    Adjustment { movement_id: Uuid },
    Reversal { entry_id: Uuid },
}

/// Single line of a journal entry
///
/// Exactly one of `debit`/`credit` is strictly positive, the other is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account_code: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub description: Option<String>,
}

impl JournalEntryLine {
    /// Build a line on the given side
    pub fn new(
        account_code: String,
        side: EntryType,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        let (debit, credit) = match side {
            EntryType::Debit => (amount, BigDecimal::zero()),
            EntryType::Credit => (BigDecimal::zero(), amount),
        };
        Self {
            account_code,
            debit,
            credit,
            description,
        }
    }

    pub fn debit(account_code: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self::new(account_code, EntryType::Debit, amount, description)
    }

    pub fn credit(account_code: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self::new(account_code, EntryType::Credit, amount, description)
    }

    pub fn side(&self) -> EntryType {
        if self.debit > BigDecimal::zero() {
            EntryType::Debit
        } else {
            EntryType::Credit
        }
    }

    pub fn amount(&self) -> &BigDecimal {
        match self.side() {
            EntryType::Debit => &self.debit,
            EntryType::Credit => &self.credit,
        }
    }

    /// Same amount on the opposite side
    pub fn reversed(&self) -> Self {
        Self::new(
            self.account_code.clone(),
            self.side().opposite(),
            self.amount().clone(),
            self.description.clone(),
        )
    }

    pub fn validate(&self) -> LedgerResult<()> {
        let zero = BigDecimal::zero();
        let one_sided = (self.debit > zero && self.credit == zero)
            || (self.credit > zero && self.debit == zero);
        if !one_sided {
            return Err(LedgerError::InvalidLine(format!(
                "line on '{}' must carry exactly one positive side (debit = {}, credit = {})",
                self.account_code, self.debit, self.credit
            )));
        }
        Ok(())
    }
}

/// Journal entry with its ordered lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    /// Assigned by storage on insert; strictly increasing, never reused
    pub number: u64,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub template_code: Option<String>,
    pub trigger: Option<TriggerType>,
    pub origin: EntryOrigin,
    pub status: EntryStatus,
    pub created_by: String,
    pub lines: Vec<JournalEntryLine>,
    pub created_at: NaiveDateTime,
    pub posted_at: Option<NaiveDateTime>,
}

impl JournalEntry {
    /// Create an empty draft; `number` stays 0 until storage assigns it
    pub fn new(date: NaiveDate, description: String, created_by: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: 0,
            date,
            description,
            reference: None,
            template_code: None,
            trigger: None,
            origin: EntryOrigin::None,
            status: EntryStatus::Draft,
            created_by,
            lines: Vec::new(),
            created_at: chrono::Utc::now().naive_utc(),
            posted_at: None,
        }
    }

    pub fn add_line(&mut self, line: JournalEntryLine) {
        self.lines.push(line);
    }

    pub fn total_debits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.debit).sum()
    }

    pub fn total_credits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.credit).sum()
    }

    /// Absolute difference between debits and credits
    pub fn imbalance(&self) -> BigDecimal {
        (self.total_debits() - self.total_credits()).abs()
    }

    pub fn is_balanced_within(&self, tolerance: &BigDecimal) -> bool {
        self.imbalance() <= *tolerance
    }

    pub fn is_posted(&self) -> bool {
        self.status == EntryStatus::Posted
    }

    /// Structural validation: lines present, one-sided, balanced
    pub fn validate(&self, tolerance: &BigDecimal) -> LedgerResult<()> {
        if self.lines.len() < 2 {
            return Err(LedgerError::Validation(
                "Journal entry must have at least two lines for double-entry bookkeeping"
                    .to_string(),
            ));
        }

        for line in &self.lines {
            line.validate()?;
        }

        if !self.is_balanced_within(tolerance) {
            return Err(LedgerError::UnbalancedEntry {
                debit: self.total_debits(),
                credit: self.total_credits(),
                difference: self.imbalance(),
            });
        }

        Ok(())
    }
}

/// Generic bag of monetary figures an event producer hands to the template engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub trigger: TriggerType,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub total: BigDecimal,
    pub subtotal: BigDecimal,
    pub tax: BigDecimal,
    /// Tax computed at the first (standard) rate
    pub tax_rate_a: BigDecimal,
    /// Tax computed at the second (reduced) rate
    pub tax_rate_b: BigDecimal,
    pub perceptions: Vec<BigDecimal>,
    pub retention: BigDecimal,
    /// Explicit net payment; defaults to total minus retention
    pub net_payment: Option<BigDecimal>,
    pub principal: BigDecimal,
    pub interest: BigDecimal,
    pub currency: String,
}

impl SourceDocument {
    /// A document with every figure set to zero
    pub fn new(id: String, trigger: TriggerType, date: NaiveDate, description: String) -> Self {
        Self {
            id,
            trigger,
            date,
            description,
            reference: None,
            total: BigDecimal::zero(),
            subtotal: BigDecimal::zero(),
            tax: BigDecimal::zero(),
            tax_rate_a: BigDecimal::zero(),
            tax_rate_b: BigDecimal::zero(),
            perceptions: Vec::new(),
            retention: BigDecimal::zero(),
            net_payment: None,
            principal: BigDecimal::zero(),
            interest: BigDecimal::zero(),
            currency: "ARS".to_string(),
        }
    }

    pub fn perception_sum(&self) -> BigDecimal {
        self.perceptions.iter().sum()
    }

    pub fn net_payment(&self) -> BigDecimal {
        self.net_payment
            .clone()
            .unwrap_or_else(|| &self.total - &self.retention)
    }
}

/// Which side of the business a counterparty sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CounterpartyKind {
    Customer,
    Supplier,
}

/// Customer or supplier with a running balance (what they owe us / we owe them)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    pub name: String,
    pub kind: CounterpartyKind,
    pub balance: BigDecimal,
    pub updated_at: NaiveDateTime,
}

impl Counterparty {
    pub fn new(id: String, name: String, kind: CounterpartyKind, balance: BigDecimal) -> Self {
        Self {
            id,
            name,
            kind,
            balance,
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Fiscal sub-type of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceType {
    /// Discriminates tax on the document
    A,
    /// Tax included in the price
    B,
    /// Tax-exempt issuer
    C,
}

impl InvoiceType {
    pub fn discriminates_tax(&self) -> bool {
        matches!(self, InvoiceType::A)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

/// One sold line of an invoice with the cost it consumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub product_id: String,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub unit_cost: BigDecimal,
    pub total_cost: BigDecimal,
}

/// Sale or purchase invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub invoice_type: InvoiceType,
    pub counterparty_kind: CounterpartyKind,
    pub counterparty_id: String,
    pub currency: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: BigDecimal,
    pub tax: BigDecimal,
    pub tax_rate_a: BigDecimal,
    pub tax_rate_b: BigDecimal,
    pub perceptions: Vec<BigDecimal>,
    pub total: BigDecimal,
    pub paid_amount: BigDecimal,
    pub balance: BigDecimal,
    pub status: PaymentStatus,
    pub items: Vec<InvoiceItem>,
    pub cost_entry_id: Option<Uuid>,
    pub revenue_entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl Invoice {
    /// Unpaid invoice whose total is all subtotal; callers fill in tax and items
    pub fn new(
        number: String,
        invoice_type: InvoiceType,
        counterparty_kind: CounterpartyKind,
        counterparty_id: String,
        date: NaiveDate,
        total: BigDecimal,
        created_by: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            invoice_type,
            counterparty_kind,
            counterparty_id,
            currency: String::new(),
            date,
            due_date: None,
            subtotal: total.clone(),
            tax: BigDecimal::zero(),
            tax_rate_a: BigDecimal::zero(),
            tax_rate_b: BigDecimal::zero(),
            perceptions: Vec::new(),
            paid_amount: BigDecimal::zero(),
            balance: total.clone(),
            total,
            status: PaymentStatus::Unpaid,
            items: Vec::new(),
            cost_entry_id: None,
            revenue_entry_id: None,
            created_by,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Register a payment against the invoice and recompute its status
    pub fn apply_payment(&mut self, amount: &BigDecimal) -> LedgerResult<()> {
        if *amount > self.balance {
            return Err(LedgerError::AmountExceedsBalance {
                invoice_id: self.id.to_string(),
                requested: amount.clone(),
                remaining: self.balance.clone(),
            });
        }
        self.paid_amount += amount;
        self.balance = &self.total - &self.paid_amount;
        self.status = if self.balance.is_zero() {
            PaymentStatus::Paid
        } else if self.paid_amount.is_zero() {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Partial
        };
        Ok(())
    }
}

/// Payment method, mapped to a settlement account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    CheckInHand,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    SupplierPayment,
    CustomerReceipt,
}

/// Persisted supplier payment or customer receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub kind: PaymentKind,
    pub counterparty_id: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub journal_entry_id: Uuid,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Audit trail record written by every saga and posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<String>,
    pub at: NaiveDateTime,
}

impl ActivityRecord {
    pub fn new(actor: &str, action: &str, entity: &str, entity_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id,
            detail: None,
            at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Trial balance over leaf accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub accounts: Vec<AccountBalance>,
    pub total_debits: BigDecimal,
    pub total_credits: BigDecimal,
    pub is_balanced: bool,
}

/// Account balance information for trial balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: BigDecimal,
    pub credit_total: BigDecimal,
    pub balance: BigDecimal,
}
