//! Journal entry templates
//!
//! A template maps a trigger type to an ordered set of (account, side, amount
//! rule) lines. Applying it to a [`SourceDocument`] computes every line amount
//! from the document's figures and records one journal entry.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::journal::{Journal, RecordOptions};
use crate::traits::*;
use crate::types::*;

/// How a template line derives its amount from a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmountRule {
    Total,
    Subtotal,
    Tax,
    TaxAtRateA,
    TaxAtRateB,
    PerceptionSum,
    Retention,
    NetPayment,
    Principal,
    Interest,
    /// Constant amount
    Fixed(BigDecimal),
    /// Percentage of the document total
    Percentage(BigDecimal),
}

impl AmountRule {
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn kind(&self) -> AmountRuleKind {
        match self {
            AmountRule::Total => AmountRuleKind::Total,
            AmountRule::Subtotal => AmountRuleKind::Subtotal,
            AmountRule::Tax => AmountRuleKind::Tax,
            AmountRule::TaxAtRateA => AmountRuleKind::TaxAtRateA,
            AmountRule::TaxAtRateB => AmountRuleKind::TaxAtRateB,
            AmountRule::PerceptionSum => AmountRuleKind::PerceptionSum,
            AmountRule::Retention => AmountRuleKind::Retention,
            AmountRule::NetPayment => AmountRuleKind::NetPayment,
            AmountRule::Principal => AmountRuleKind::Principal,
            AmountRule::Interest => AmountRuleKind::Interest,
            AmountRule::Fixed(_) => AmountRuleKind::Fixed,
            AmountRule::Percentage(_) => AmountRuleKind::Percentage,
        }
    }

    /// Amount for this rule, rounded half-up to cents
    pub fn compute(&self, doc: &SourceDocument) -> BigDecimal {
        let raw = match self {
            AmountRule::Total => doc.total.clone(),
            AmountRule::Subtotal => doc.subtotal.clone(),
            AmountRule::Tax => doc.tax.clone(),
            AmountRule::TaxAtRateA => doc.tax_rate_a.clone(),
            AmountRule::TaxAtRateB => doc.tax_rate_b.clone(),
            AmountRule::PerceptionSum => doc.perception_sum(),
            AmountRule::Retention => doc.retention.clone(),
            AmountRule::NetPayment => doc.net_payment(),
            AmountRule::Principal => doc.principal.clone(),
            AmountRule::Interest => doc.interest.clone(),
            AmountRule::Fixed(amount) => amount.clone(),
            AmountRule::Percentage(rate) => &doc.total * rate / BigDecimal::from(100),
        };
        raw.with_scale_round(2, RoundingMode::HalfUp)
    }

    /// Assemble a rule from loosely-typed template configuration
    pub fn from_parts(
        kind: AmountRuleKind,
        fixed_amount: Option<BigDecimal>,
        percentage: Option<BigDecimal>,
    ) -> Result<Self, AmountRuleKind> {
        Ok(match kind {
            AmountRuleKind::Total => AmountRule::Total,
            AmountRuleKind::Subtotal => AmountRule::Subtotal,
            AmountRuleKind::Tax => AmountRule::Tax,
            AmountRuleKind::TaxAtRateA => AmountRule::TaxAtRateA,
            AmountRuleKind::TaxAtRateB => AmountRule::TaxAtRateB,
            AmountRuleKind::PerceptionSum => AmountRule::PerceptionSum,
            AmountRuleKind::Retention => AmountRule::Retention,
            AmountRuleKind::NetPayment => AmountRule::NetPayment,
            AmountRuleKind::Principal => AmountRule::Principal,
            AmountRuleKind::Interest => AmountRule::Interest,
            AmountRuleKind::Fixed => AmountRule::Fixed(fixed_amount.ok_or(kind)?),
            AmountRuleKind::Percentage => AmountRule::Percentage(percentage.ok_or(kind)?),
        })
    }
}

/// Parameterless name of an [`AmountRule`], as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmountRuleKind {
    Total,
    Subtotal,
    Tax,
    TaxAtRateA,
    TaxAtRateB,
    PerceptionSum,
    Retention,
    NetPayment,
    Principal,
    Interest,
    Fixed,
    Percentage,
}

impl AmountRuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            AmountRuleKind::Total => "TOTAL",
            AmountRuleKind::Subtotal => "SUBTOTAL",
            AmountRuleKind::Tax => "TAX",
            AmountRuleKind::TaxAtRateA => "TAX_AT_RATE_A",
            AmountRuleKind::TaxAtRateB => "TAX_AT_RATE_B",
            AmountRuleKind::PerceptionSum => "PERCEPTION_SUM",
            AmountRuleKind::Retention => "RETENTION",
            AmountRuleKind::NetPayment => "NET_PAYMENT",
            AmountRuleKind::Principal => "PRINCIPAL",
            AmountRuleKind::Interest => "INTEREST",
            AmountRuleKind::Fixed => "FIXED",
            AmountRuleKind::Percentage => "PERCENTAGE",
        }
    }
}

/// One line of a stored template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLine {
    pub account_code: String,
    pub side: EntryType,
    pub rule: AmountRule,
    pub description: Option<String>,
}

/// Stored, versioned template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalTemplate {
    pub code: String,
    pub name: String,
    pub trigger: TriggerType,
    /// Assigned by storage; a revision stores a new version
    pub version: u32,
    pub active: bool,
    pub lines: Vec<TemplateLine>,
    pub created_at: NaiveDateTime,
}

/// Template line as supplied by administration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLineSpec {
    pub account_code: String,
    pub side: EntryType,
    pub rule: AmountRuleKind,
    pub fixed_amount: Option<BigDecimal>,
    pub percentage: Option<BigDecimal>,
    pub description: Option<String>,
}

impl TemplateLineSpec {
    pub fn new(account_code: &str, side: EntryType, rule: AmountRuleKind) -> Self {
        Self {
            account_code: account_code.to_string(),
            side,
            rule,
            fixed_amount: None,
            percentage: None,
            description: None,
        }
    }

    pub fn debit(account_code: &str, rule: AmountRuleKind) -> Self {
        Self::new(account_code, EntryType::Debit, rule)
    }

    pub fn credit(account_code: &str, rule: AmountRuleKind) -> Self {
        Self::new(account_code, EntryType::Credit, rule)
    }

    pub fn fixed(mut self, amount: BigDecimal) -> Self {
        self.fixed_amount = Some(amount);
        self
    }

    pub fn percentage(mut self, rate: BigDecimal) -> Self {
        self.percentage = Some(rate);
        self
    }
}

/// Template as supplied by administration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub code: String,
    pub name: String,
    pub trigger: TriggerType,
    pub lines: Vec<TemplateLineSpec>,
}

/// Outcome of [`TemplateEngine::validate_template`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Options for [`TemplateEngine::apply`]
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptions {
    pub auto_post: bool,
    pub validate_balance: bool,
    pub origin: EntryOrigin,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            auto_post: true,
            validate_balance: true,
            origin: EntryOrigin::None,
        }
    }
}

/// Applies and administers templates
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    journal: Journal,
}

impl TemplateEngine {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }

    fn build_lines(spec: &TemplateSpec) -> LedgerResult<Vec<TemplateLine>> {
        spec.lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let rule = AmountRule::from_parts(
                    line.rule,
                    line.fixed_amount.clone(),
                    line.percentage.clone(),
                )
                .map_err(|kind| LedgerError::MissingRuleParameter {
                    template: spec.code.clone(),
                    line: index + 1,
                    rule: kind.name().to_string(),
                })?;
                Ok(TemplateLine {
                    account_code: line.account_code.clone(),
                    side: line.side,
                    rule,
                    description: line.description.clone(),
                })
            })
            .collect()
    }

    /// Errors and warnings for a template's shape and accounts
    async fn inspect(
        uow: &mut dyn UnitOfWork,
        template: &JournalTemplate,
    ) -> LedgerResult<TemplateValidation> {
        let mut report = TemplateValidation::default();

        if !template.active {
            report
                .warnings
                .push(format!("Template '{}' is inactive", template.code));
        }
        if template.lines.is_empty() {
            report
                .errors
                .push(format!("Template '{}' has no lines", template.code));
        }
        for side in [EntryType::Debit, EntryType::Credit] {
            if !template.lines.iter().any(|l| l.side == side) {
                report.errors.push(format!(
                    "Template '{}' has no {:?} line",
                    template.code, side
                ));
            }
        }

        for (index, line) in template.lines.iter().enumerate() {
            match uow.find_account(&line.account_code).await? {
                None => report.errors.push(format!(
                    "Line {}: account '{}' does not exist",
                    index + 1,
                    line.account_code
                )),
                Some(account) if !account.is_leaf => report.errors.push(format!(
                    "Line {}: account '{}' is not a posting account",
                    index + 1,
                    line.account_code
                )),
                Some(account) if !account.active => report.warnings.push(format!(
                    "Line {}: account '{}' is inactive",
                    index + 1,
                    line.account_code
                )),
                Some(_) => {}
            }
        }

        report.valid = report.errors.is_empty();
        Ok(report)
    }

    /// Fail with the configuration error matching the template's first problem
    async fn ensure_well_formed(
        uow: &mut dyn UnitOfWork,
        template: &JournalTemplate,
    ) -> LedgerResult<()> {
        for side in [EntryType::Debit, EntryType::Credit] {
            if !template.lines.iter().any(|l| l.side == side) {
                return Err(LedgerError::TemplateMissingSide {
                    template: template.code.clone(),
                    side,
                });
            }
        }
        for line in &template.lines {
            match uow.find_account(&line.account_code).await? {
                None => return Err(LedgerError::AccountNotFound(line.account_code.clone())),
                Some(account) if !account.is_leaf => {
                    return Err(LedgerError::AccountNotPostable(line.account_code.clone()))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Store a new template under an unused code
    pub async fn create_template(
        &self,
        uow: &mut dyn UnitOfWork,
        spec: TemplateSpec,
    ) -> LedgerResult<JournalTemplate> {
        if uow.find_template(&spec.code).await?.is_some() {
            return Err(LedgerError::InvalidConfiguration(format!(
                "Template '{}' already exists; revise it instead",
                spec.code
            )));
        }
        self.store(uow, spec).await
    }

    /// Store a new version of an existing template and deactivate the old one
    pub async fn revise_template(
        &self,
        uow: &mut dyn UnitOfWork,
        spec: TemplateSpec,
    ) -> LedgerResult<JournalTemplate> {
        let previous = uow
            .find_template(&spec.code)
            .await?
            .ok_or_else(|| LedgerError::TemplateNotFound(spec.code.clone()))?;
        let revised = self.store(uow, spec).await?;
        uow.set_template_active(&previous.code, previous.version, false)
            .await?;
        Ok(revised)
    }

    async fn store(
        &self,
        uow: &mut dyn UnitOfWork,
        spec: TemplateSpec,
    ) -> LedgerResult<JournalTemplate> {
        let template = JournalTemplate {
            lines: Self::build_lines(&spec)?,
            code: spec.code,
            name: spec.name,
            trigger: spec.trigger,
            version: 0,
            active: true,
            created_at: chrono::Utc::now().naive_utc(),
        };
        Self::ensure_well_formed(uow, &template).await?;

        let template = uow.insert_template(template).await?;
        tracing::info!(
            code = %template.code,
            version = template.version,
            lines = template.lines.len(),
            "stored journal template"
        );
        Ok(template)
    }

    /// Activate or deactivate the latest version of a template
    pub async fn set_active(
        uow: &mut dyn UnitOfWork,
        code: &str,
        active: bool,
    ) -> LedgerResult<JournalTemplate> {
        let mut template = uow
            .find_template(code)
            .await?
            .ok_or_else(|| LedgerError::TemplateNotFound(code.to_string()))?;
        uow.set_template_active(code, template.version, active)
            .await?;
        template.active = active;
        tracing::info!(code, active, "changed template state");
        Ok(template)
    }

    /// Report every problem with a template without failing
    pub async fn validate_template(
        uow: &mut dyn UnitOfWork,
        code: &str,
    ) -> LedgerResult<TemplateValidation> {
        match uow.find_template(code).await? {
            Some(template) => Self::inspect(uow, &template).await,
            None => Ok(TemplateValidation {
                valid: false,
                errors: vec![format!("Template '{}' does not exist", code)],
                warnings: Vec::new(),
            }),
        }
    }

    /// Compute line amounts for a document; zero-amount lines are dropped
    pub fn compute_lines(
        template: &JournalTemplate,
        doc: &SourceDocument,
    ) -> LedgerResult<Vec<JournalEntryLine>> {
        let mut lines = Vec::with_capacity(template.lines.len());
        for line in &template.lines {
            let amount = line.rule.compute(doc);
            tracing::debug!(
                template = %template.code,
                account = %line.account_code,
                rule = line.rule.name(),
                %amount,
                "computed template line"
            );
            if amount < BigDecimal::zero() {
                return Err(LedgerError::Validation(format!(
                    "Rule {} on account '{}' produced a negative amount {} for document {}",
                    line.rule.name(),
                    line.account_code,
                    amount,
                    doc.id
                )));
            }
            if amount.is_zero() {
                continue;
            }
            lines.push(JournalEntryLine::new(
                line.account_code.clone(),
                line.side,
                amount,
                line.description.clone(),
            ));
        }
        Ok(lines)
    }

    /// Apply a template to a source document and record the resulting entry
    pub async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        template_code: &str,
        doc: &SourceDocument,
        actor: &str,
        options: ApplyOptions,
    ) -> LedgerResult<JournalEntry> {
        let template = uow
            .find_template(template_code)
            .await?
            .ok_or_else(|| LedgerError::TemplateNotFound(template_code.to_string()))?;
        if !template.active {
            return Err(LedgerError::TemplateInactive(template_code.to_string()));
        }
        if template.trigger != doc.trigger {
            tracing::warn!(template = template_code, expected = ?template.trigger, got = ?doc.trigger, "document trigger does not match template");
            return Err(LedgerError::Validation(format!(
                "Template {} is for {:?} documents, got {:?} document {}",
                template_code, template.trigger, doc.trigger, doc.id
            )));
        }

        let mut entry = JournalEntry::new(doc.date, doc.description.clone(), actor.to_string());
        entry.reference = doc.reference.clone().or_else(|| Some(doc.id.clone()));
        entry.template_code = Some(template.code.clone());
        entry.trigger = Some(doc.trigger);
        entry.origin = options.origin;
        entry.lines = Self::compute_lines(&template, doc)?;

        self.journal
            .record(
                uow,
                entry,
                RecordOptions {
                    auto_post: options.auto_post,
                    validate_balance: options.validate_balance,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::{standard_chart, AccountRegistry};
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(Journal::new("0.01".parse().unwrap()))
    }

    fn sale_template() -> TemplateSpec {
        TemplateSpec {
            code: "SALE_INVOICE_A".into(),
            name: "Sale invoice (tax discriminated)".into(),
            trigger: TriggerType::SaleInvoice,
            lines: vec![
                TemplateLineSpec::debit("1.1.03.001", AmountRuleKind::Total),
                TemplateLineSpec::credit("4.1.01.001", AmountRuleKind::Subtotal),
                TemplateLineSpec::credit("2.1.02.001", AmountRuleKind::Tax),
            ],
        }
    }

    fn document(total: i64, subtotal: i64, tax: i64) -> SourceDocument {
        let mut doc = SourceDocument::new(
            "INV-1".into(),
            TriggerType::SaleInvoice,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            "Invoice INV-1".into(),
        );
        doc.total = BigDecimal::from(total);
        doc.subtotal = BigDecimal::from(subtotal);
        doc.tax = BigDecimal::from(tax);
        doc
    }

    async fn setup() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut uow = storage.begin().await.unwrap();
        AccountRegistry::new()
            .provision_chart(uow.as_mut(), standard_chart())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_sale_invoice_template_balances() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();
        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();

        let entry = engine()
            .apply(
                uow.as_mut(),
                "SALE_INVOICE_A",
                &document(12100, 10000, 2100),
                "tester",
                ApplyOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(entry.total_debits(), BigDecimal::from(12100));
        assert_eq!(entry.total_credits(), BigDecimal::from(12100));
        assert_eq!(entry.template_code.as_deref(), Some("SALE_INVOICE_A"));
        assert_eq!(entry.lines.len(), 3);

        let vat = AccountRegistry::resolve(uow.as_mut(), "2.1.02.001").await.unwrap();
        assert_eq!(vat.balance(), BigDecimal::from(2100));
    }

    #[tokio::test]
    async fn test_unbalanced_document_leaves_no_entry() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();
        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();

        let err = engine()
            .apply(
                uow.as_mut(),
                "SALE_INVOICE_A",
                &document(12000, 10000, 2100),
                "tester",
                ApplyOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            LedgerError::UnbalancedEntry {
                debit,
                credit,
                difference,
            } => {
                assert_eq!(debit, BigDecimal::from(12000));
                assert_eq!(credit, BigDecimal::from(12100));
                assert_eq!(difference, BigDecimal::from(100));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(uow.list_journal_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_inactive_templates() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();
        let doc = document(1, 1, 0);

        let err = engine()
            .apply(uow.as_mut(), "NOPE", &doc, "tester", ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TemplateNotFound(_)));

        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();
        TemplateEngine::set_active(uow.as_mut(), "SALE_INVOICE_A", false)
            .await
            .unwrap();
        let err = engine()
            .apply(uow.as_mut(), "SALE_INVOICE_A", &doc, "tester", ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TemplateInactive(_)));
    }

    #[tokio::test]
    async fn test_document_trigger_must_match_template() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();
        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();

        let mut doc = document(12100, 10000, 2100);
        doc.trigger = TriggerType::SupplierPayment;
        let err = engine()
            .apply(uow.as_mut(), "SALE_INVOICE_A", &doc, "tester", ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(uow.list_journal_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_template_configuration_errors() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();

        let mut one_sided = sale_template();
        one_sided.lines.remove(0);
        let err = engine()
            .create_template(uow.as_mut(), one_sided)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::TemplateMissingSide {
                side: EntryType::Debit,
                ..
            }
        ));

        let mut missing_rate = sale_template();
        missing_rate.lines[2] = TemplateLineSpec::credit("2.1.02.001", AmountRuleKind::Percentage);
        let err = engine()
            .create_template(uow.as_mut(), missing_rate)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MissingRuleParameter { line: 3, .. }
        ));
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);

        let mut grouping_account = sale_template();
        grouping_account.lines[1] = TemplateLineSpec::credit("4.1", AmountRuleKind::Subtotal);
        let err = engine()
            .create_template(uow.as_mut(), grouping_account)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotPostable(_)));
    }

    #[tokio::test]
    async fn test_validate_template_reports_errors_and_warnings() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();

        let report = TemplateEngine::validate_template(uow.as_mut(), "MISSING")
            .await
            .unwrap();
        assert!(!report.valid);

        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();
        AccountRegistry::deactivate(uow.as_mut(), "2.1.02.001")
            .await
            .unwrap();

        let report = TemplateEngine::validate_template(uow.as_mut(), "SALE_INVOICE_A")
            .await
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("2.1.02.001"));
    }

    #[tokio::test]
    async fn test_revision_deactivates_previous_version() {
        let storage = setup().await;
        let mut uow = storage.begin().await.unwrap();
        engine()
            .create_template(uow.as_mut(), sale_template())
            .await
            .unwrap();

        let mut revised = sale_template();
        revised.lines.push(
            TemplateLineSpec::credit("2.1.02.002", AmountRuleKind::PerceptionSum),
        );
        let template = engine()
            .revise_template(uow.as_mut(), revised)
            .await
            .unwrap();
        assert_eq!(template.version, 2);
        assert!(template.active);

        let mut doc = document(12150, 10000, 2100);
        doc.perceptions = vec![BigDecimal::from(50)];
        let entry = engine()
            .apply(uow.as_mut(), "SALE_INVOICE_A", &doc, "tester", ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(entry.lines.len(), 4);
    }

    #[test]
    fn test_rule_computation() {
        let mut doc = document(1000, 800, 200);
        doc.retention = BigDecimal::from(30);
        doc.principal = BigDecimal::from(900);
        doc.interest = BigDecimal::from(100);

        assert_eq!(AmountRule::NetPayment.compute(&doc), BigDecimal::from(970));
        assert_eq!(
            AmountRule::Percentage("10.5".parse().unwrap()).compute(&doc),
            BigDecimal::from(105)
        );
        assert_eq!(
            AmountRule::Fixed("12.345".parse().unwrap()).compute(&doc),
            "12.35".parse::<BigDecimal>().unwrap()
        );
        assert_eq!(AmountRule::Principal.compute(&doc), BigDecimal::from(900));
        assert_eq!(AmountRule::Interest.compute(&doc), BigDecimal::from(100));
        assert_eq!(
            AmountRule::from_parts(AmountRuleKind::Fixed, None, None),
            Err(AmountRuleKind::Fixed)
        );
    }

    proptest! {
        #[test]
        fn template_lines_are_one_sided_and_balanced(subtotal in 1i64..10_000_000, tax in 0i64..2_000_000) {
            let template = JournalTemplate {
                code: "SALE_INVOICE_A".into(),
                name: "Sale".into(),
                trigger: TriggerType::SaleInvoice,
                version: 1,
                active: true,
                lines: vec![
                    TemplateLine { account_code: "1.1.03.001".into(), side: EntryType::Debit, rule: AmountRule::Total, description: None },
                    TemplateLine { account_code: "4.1.01.001".into(), side: EntryType::Credit, rule: AmountRule::Subtotal, description: None },
                    TemplateLine { account_code: "2.1.02.001".into(), side: EntryType::Credit, rule: AmountRule::Tax, description: None },
                ],
                created_at: chrono::Utc::now().naive_utc(),
            };
            let doc = document(subtotal + tax, subtotal, tax);
            let lines = TemplateEngine::compute_lines(&template, &doc).unwrap();
            for line in &lines {
                prop_assert!(line.validate().is_ok());
            }
            let debit: BigDecimal = lines.iter().map(|l| &l.debit).sum();
            let credit: BigDecimal = lines.iter().map(|l| &l.credit).sum();
            prop_assert_eq!(debit, credit);
        }
    }
}
