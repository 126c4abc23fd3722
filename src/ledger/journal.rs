//! Journal entry persistence, posting and correction
//!
//! This is the only place that writes journal entries or touches account
//! balances. POSTED entries are append-only: the storage contract exposes no
//! way to edit their lines, drafts can only be promoted or deleted through the
//! guarded calls below, and corrections are reversing entries.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::account::AccountRegistry;
use crate::traits::*;
use crate::types::*;

/// How a journal entry is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOptions {
    /// Post immediately (and move balances) instead of leaving a draft
    pub auto_post: bool,
    /// Reject unbalanced drafts too; posted entries are always checked
    pub validate_balance: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            auto_post: true,
            validate_balance: true,
        }
    }
}

/// A balanced debit/credit pair posted without a template
#[derive(Debug, Clone, PartialEq)]
pub struct TwoLinePosting {
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub debit_account: String,
    pub credit_account: String,
    pub amount: BigDecimal,
    pub trigger: TriggerType,
    pub origin: EntryOrigin,
    pub actor: String,
}

/// Journal writer enforcing line, balance and postability rules
#[derive(Debug, Clone)]
pub struct Journal {
    tolerance: BigDecimal,
}

impl Journal {
    pub fn new(tolerance: BigDecimal) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> &BigDecimal {
        &self.tolerance
    }

    fn check_balance(&self, entry: &JournalEntry) -> LedgerResult<()> {
        if !entry.is_balanced_within(&self.tolerance) {
            let debit = entry.total_debits();
            let credit = entry.total_credits();
            tracing::warn!(%debit, %credit, description = %entry.description, "rejecting unbalanced entry");
            return Err(LedgerError::UnbalancedEntry {
                difference: entry.imbalance(),
                debit,
                credit,
            });
        }
        Ok(())
    }

    async fn check_accounts(uow: &mut dyn UnitOfWork, entry: &JournalEntry) -> LedgerResult<()> {
        let codes: BTreeSet<&str> = entry.lines.iter().map(|l| l.account_code.as_str()).collect();
        for code in codes {
            AccountRegistry::resolve_postable(uow, code).await?;
        }
        Ok(())
    }

    async fn apply_balances(uow: &mut dyn UnitOfWork, entry: &JournalEntry) -> LedgerResult<()> {
        for line in &entry.lines {
            AccountRegistry::apply_posting(uow, &line.account_code, &line.debit, &line.credit)
                .await?;
        }
        Ok(())
    }

    /// Persist an entry and all its lines in one write, posting it if asked
    pub async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        mut entry: JournalEntry,
        options: RecordOptions,
    ) -> LedgerResult<JournalEntry> {
        if entry.lines.len() < 2 {
            return Err(LedgerError::Validation(format!(
                "Journal entry '{}' needs at least two lines, got {}",
                entry.description,
                entry.lines.len()
            )));
        }
        for line in &entry.lines {
            line.validate()?;
        }
        if options.validate_balance || options.auto_post {
            self.check_balance(&entry)?;
        }
        Self::check_accounts(uow, &entry).await?;

        if options.auto_post {
            entry.status = EntryStatus::Posted;
            entry.posted_at = Some(chrono::Utc::now().naive_utc());
        } else {
            entry.status = EntryStatus::Draft;
            entry.posted_at = None;
        }

        let entry = uow.insert_journal_entry(entry).await?;
        if entry.is_posted() {
            Self::apply_balances(uow, &entry).await?;
        }

        tracing::info!(
            number = entry.number,
            trigger = ?entry.trigger,
            status = ?entry.status,
            total = %entry.total_debits(),
            lines = entry.lines.len(),
            "recorded journal entry"
        );
        Ok(entry)
    }

    /// Post a balanced two-line entry: debit one account, credit the other
    pub async fn post_two_line(
        &self,
        uow: &mut dyn UnitOfWork,
        posting: TwoLinePosting,
    ) -> LedgerResult<JournalEntry> {
        crate::utils::validation::validate_positive_amount(&posting.amount)?;

        let mut entry = JournalEntry::new(posting.date, posting.description, posting.actor);
        entry.reference = posting.reference;
        entry.trigger = Some(posting.trigger);
        entry.origin = posting.origin;
        entry.add_line(JournalEntryLine::debit(
            posting.debit_account,
            posting.amount.clone(),
            None,
        ));
        entry.add_line(JournalEntryLine::credit(
            posting.credit_account,
            posting.amount,
            None,
        ));

        self.record(uow, entry, RecordOptions::default()).await
    }

    pub async fn find(uow: &mut dyn UnitOfWork, id: Uuid) -> LedgerResult<JournalEntry> {
        uow.find_journal_entry(id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()))
    }

    /// DRAFT -> POSTED after re-checking balance and postability
    pub async fn post_draft(&self, uow: &mut dyn UnitOfWork, id: Uuid) -> LedgerResult<JournalEntry> {
        let entry = Self::find(uow, id).await?;
        if entry.is_posted() {
            return Err(LedgerError::EntryImmutable(entry.number));
        }

        entry.validate(&self.tolerance)?;
        Self::check_accounts(uow, &entry).await?;

        if uow.mark_entry_posted(id).await? != 1 {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "journal entry {} changed state while posting",
                entry.number
            )));
        }
        Self::apply_balances(uow, &entry).await?;

        tracing::info!(number = entry.number, "posted draft journal entry");
        Self::find(uow, id).await
    }

    /// Remove a draft; posted entries can only be reversed
    pub async fn delete_draft(uow: &mut dyn UnitOfWork, id: Uuid) -> LedgerResult<()> {
        let entry = Self::find(uow, id).await?;
        if entry.is_posted() {
            return Err(LedgerError::EntryImmutable(entry.number));
        }
        if let EntryOrigin::Invoice { invoice_id } = entry.origin {
            if let Some(invoice) = uow.find_invoice(invoice_id).await? {
                if invoice.revenue_entry_id == Some(id) || invoice.cost_entry_id == Some(id) {
                    tracing::warn!(number = entry.number, invoice = %invoice.number, "refusing to delete linked draft");
                    return Err(LedgerError::Validation(format!(
                        "Journal entry {} is linked to invoice {}",
                        entry.number, invoice.number
                    )));
                }
            }
        }
        if uow.delete_draft_entry(id).await? != 1 {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "journal entry {} changed state while deleting",
                entry.number
            )));
        }
        Ok(())
    }

    /// Offset a posted entry with a new one whose lines swap sides
    pub async fn reverse(
        &self,
        uow: &mut dyn UnitOfWork,
        id: Uuid,
        date: NaiveDate,
        actor: &str,
    ) -> LedgerResult<JournalEntry> {
        let original = Self::find(uow, id).await?;
        if !original.is_posted() {
            return Err(LedgerError::Validation(format!(
                "Only posted entries can be reversed; entry {} is a draft",
                original.number
            )));
        }
        if let EntryOrigin::Reversal { entry_id } = original.origin {
            return Err(LedgerError::Validation(format!(
                "Entry {} is itself the reversal of {}",
                original.number, entry_id
            )));
        }
        let existing = uow
            .list_journal_entries()
            .await?
            .into_iter()
            .find(|e| e.origin == EntryOrigin::Reversal { entry_id: id });
        if let Some(existing) = existing {
            tracing::warn!(number = original.number, reversal = existing.number, "entry already reversed");
            return Err(LedgerError::Validation(format!(
                "Entry {} is already reversed by entry {}",
                original.number, existing.number
            )));
        }

        let mut reversal = JournalEntry::new(
            date,
            format!("Reversal of entry {}: {}", original.number, original.description),
            actor.to_string(),
        );
        reversal.reference = Some(original.number.to_string());
        reversal.trigger = Some(TriggerType::Reversal);
        reversal.origin = EntryOrigin::Reversal { entry_id: original.id };
        reversal.lines = original.lines.iter().map(JournalEntryLine::reversed).collect();

        self.record(uow, reversal, RecordOptions::default()).await
    }
}

/// Builder for multi-line manual entries
#[derive(Debug)]
pub struct JournalEntryBuilder {
    entry: JournalEntry,
}

impl JournalEntryBuilder {
    pub fn new(date: NaiveDate, description: String, actor: String) -> Self {
        let mut entry = JournalEntry::new(date, description, actor);
        entry.trigger = Some(TriggerType::Manual);
        Self { entry }
    }

    /// Set the reference for the entry
    pub fn reference(mut self, reference: String) -> Self {
        self.entry.reference = Some(reference);
        self
    }

    pub fn origin(mut self, origin: EntryOrigin) -> Self {
        self.entry.origin = origin;
        self
    }

    /// Add a debit line
    pub fn debit(mut self, account_code: &str, amount: BigDecimal, description: Option<String>) -> Self {
        self.entry
            .add_line(JournalEntryLine::debit(account_code.to_string(), amount, description));
        self
    }

    /// Add a credit line
    pub fn credit(
        mut self,
        account_code: &str,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.entry
            .add_line(JournalEntryLine::credit(account_code.to_string(), amount, description));
        self
    }

    /// Build the entry, checking line shape and balance
    pub fn build(self, tolerance: &BigDecimal) -> LedgerResult<JournalEntry> {
        self.entry.validate(tolerance)?;
        Ok(self.entry)
    }

    /// Build without the balance check, for drafts still being edited
    pub fn build_draft(self) -> JournalEntry {
        self.entry
    }
}
