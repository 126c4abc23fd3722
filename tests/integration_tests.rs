//! Integration tests for backoffice-ledger

use std::collections::HashSet;
use std::sync::Arc;

use backoffice_ledger::{
    AmountRuleKind, ApplyOptions, Counterparty, CounterpartyKind, EngineConfig, EntryOrigin,
    EntryStatus, InvoiceLineRequest, InvoiceRequest, InvoiceType, Ledger, LedgerError,
    MemoryStorage, PaymentMethod, PaymentRequest, PaymentStatus, PriceKind, PriceRecord, Product,
    SourceDocument, StockAdjustment, StockItem, StockReceipt, SupplierInvoiceRequest,
    TemplateLineSpec, TemplateSpec, TriggerType,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 4).unwrap()
}

fn sale_template(code: &str, with_tax: bool) -> TemplateSpec {
    let mut lines = vec![
        TemplateLineSpec::debit("1.1.03.001", AmountRuleKind::Total),
        TemplateLineSpec::credit("4.1.01.001", AmountRuleKind::Subtotal),
    ];
    if with_tax {
        lines.push(TemplateLineSpec::credit("2.1.02.001", AmountRuleKind::Tax));
    }
    TemplateSpec {
        code: code.into(),
        name: format!("Sale invoice {}", code),
        trigger: TriggerType::SaleInvoice,
        lines,
    }
}

fn invoice_request(number: &str, quantity: i64) -> InvoiceRequest {
    let subtotal = BigDecimal::from(150 * quantity);
    let tax = BigDecimal::from(150 * quantity) * BigDecimal::new(21.into(), 2);
    InvoiceRequest {
        number: number.into(),
        invoice_type: InvoiceType::A,
        customer_id: "c1".into(),
        currency: "ARS".into(),
        date: date(),
        due_date: None,
        total: &subtotal + &tax,
        tax_rate_a: tax.clone(),
        tax_rate_b: BigDecimal::zero(),
        perceptions: vec![],
        subtotal,
        tax,
        items: vec![InvoiceLineRequest {
            product_id: "p1".into(),
            description: "Widget".into(),
            quantity: BigDecimal::from(quantity),
            unit_price: BigDecimal::from(150),
        }],
    }
}

fn payment(counterparty_id: &str, amount: i64, method: PaymentMethod) -> PaymentRequest {
    PaymentRequest {
        counterparty_id: counterparty_id.into(),
        amount: BigDecimal::from(amount),
        date: date(),
        method,
        reference: None,
        invoice_id: None,
    }
}

async fn ledger_with(config: EngineConfig, stock: i64) -> Ledger<MemoryStorage> {
    init_tracing();
    let ledger = Ledger::with_config(MemoryStorage::new(), config);
    ledger.provision_standard_chart().await.unwrap();
    ledger
        .create_template(sale_template("SALE_INVOICE_A", true))
        .await
        .unwrap();
    ledger
        .create_template(sale_template("SALE_INVOICE_B", false))
        .await
        .unwrap();
    ledger
        .register_counterparty(Counterparty::new(
            "c1".into(),
            "Jane Buyer".into(),
            CounterpartyKind::Customer,
            BigDecimal::zero(),
        ))
        .await
        .unwrap();
    ledger
        .register_counterparty(Counterparty::new(
            "s1".into(),
            "Acme Supplies".into(),
            CounterpartyKind::Supplier,
            BigDecimal::from(5000),
        ))
        .await
        .unwrap();
    ledger
        .register_product(Product::new("p1".into(), "SKU-1".into(), "Widget".into()))
        .await
        .unwrap();
    if stock > 0 {
        ledger
            .receive_stock(
                StockReceipt {
                    product_id: "p1".into(),
                    quantity: BigDecimal::from(stock),
                    unit_cost: BigDecimal::from(100),
                    reference: Some("PO-0001".into()),
                },
                "tester",
            )
            .await
            .unwrap();
    }
    ledger
}

fn supplier_invoice(number: &str, subtotal: i64, tax: i64) -> SupplierInvoiceRequest {
    SupplierInvoiceRequest {
        number: number.into(),
        invoice_type: InvoiceType::A,
        supplier_id: "s1".into(),
        currency: "ARS".into(),
        date: date(),
        due_date: None,
        subtotal: BigDecimal::from(subtotal),
        tax: BigDecimal::from(tax),
        perceptions: vec![],
        total: BigDecimal::from(subtotal + tax),
    }
}

async fn supplier_balance(ledger: &Ledger<MemoryStorage>) -> BigDecimal {
    ledger
        .get_counterparty(CounterpartyKind::Supplier, "s1")
        .await
        .unwrap()
        .unwrap()
        .balance
}

async fn ledger(stock: i64) -> Ledger<MemoryStorage> {
    ledger_with(EngineConfig::default(), stock).await
}

#[tokio::test]
async fn test_sale_invoice_a_template_balances() {
    let ledger = ledger(0).await;

    let mut doc = SourceDocument::new(
        "0001-00000100".into(),
        TriggerType::SaleInvoice,
        date(),
        "Invoice 0001-00000100".into(),
    );
    doc.total = BigDecimal::from(12100);
    doc.subtotal = BigDecimal::from(10000);
    doc.tax = BigDecimal::from(2100);

    let entry = ledger
        .apply_template("SALE_INVOICE_A", &doc, "tester")
        .await
        .unwrap();
    assert_eq!(entry.total_debits(), BigDecimal::from(12100));
    assert_eq!(entry.total_credits(), BigDecimal::from(12100));
    assert_eq!(entry.status, EntryStatus::Posted);

    let receivables = ledger.get_account("1.1.03.001").await.unwrap().unwrap();
    let sales = ledger.get_account("4.1.01.001").await.unwrap().unwrap();
    let vat = ledger.get_account("2.1.02.001").await.unwrap().unwrap();
    assert_eq!(receivables.balance(), BigDecimal::from(12100));
    assert_eq!(sales.balance(), BigDecimal::from(10000));
    assert_eq!(vat.balance(), BigDecimal::from(2100));
}

#[tokio::test]
async fn test_insufficient_stock_leaves_no_trace() {
    let ledger = ledger(3).await;
    let activity_before = ledger.activity().await.unwrap().len();

    let err = ledger
        .create_invoice(invoice_request("0001-00000001", 5), "tester")
        .await
        .unwrap_err();

    let shortfalls = err.shortfalls();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0].product_id, "p1");
    assert_eq!(shortfalls[0].available, BigDecimal::from(3));
    assert_eq!(shortfalls[0].required, BigDecimal::from(5));
    assert!(!err.is_retryable());

    assert!(ledger.list_entries().await.unwrap().is_empty());
    assert_eq!(ledger.movements("p1").await.unwrap().len(), 1);
    assert_eq!(ledger.activity().await.unwrap().len(), activity_before);
    assert_eq!(
        ledger.get_product("p1").await.unwrap().unwrap().stock,
        BigDecimal::from(3)
    );
}

#[tokio::test]
async fn test_supplier_payment_by_cash() {
    let ledger = ledger(0).await;

    let outcome = ledger
        .post_supplier_payment(payment("s1", 1500, PaymentMethod::Cash), "tester")
        .await
        .unwrap();

    let supplier = ledger
        .get_counterparty(CounterpartyKind::Supplier, "s1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(supplier.balance, BigDecimal::from(3500));

    let entries = ledger.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id, outcome.journal_entry.id);
    assert_eq!(entry.trigger, Some(TriggerType::SupplierPayment));
    assert_eq!(entry.lines[0].account_code, "2.1.01.001");
    assert_eq!(entry.lines[0].debit, BigDecimal::from(1500));
    assert_eq!(entry.lines[1].account_code, "1.1.01.001");
    assert_eq!(entry.lines[1].credit, BigDecimal::from(1500));
}

#[tokio::test]
async fn test_supplier_payments_settle_supplier_invoice() {
    let ledger = ledger(0).await;
    let registered = ledger
        .register_supplier_invoice(supplier_invoice("A-0005-00000077", 1000, 210), "tester")
        .await
        .unwrap();
    let invoice_id = registered.invoice.id;

    assert_eq!(supplier_balance(&ledger).await, BigDecimal::from(6210));

    let mut first = payment("s1", 500, PaymentMethod::BankTransfer);
    first.invoice_id = Some(invoice_id);
    ledger.post_supplier_payment(first, "tester").await.unwrap();
    let invoice = ledger.get_invoice(invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, PaymentStatus::Partial);
    assert_eq!(invoice.balance, BigDecimal::from(710));

    let mut too_much = payment("s1", 711, PaymentMethod::Cash);
    too_much.invoice_id = Some(invoice_id);
    match ledger.post_supplier_payment(too_much, "tester").await {
        Err(LedgerError::AmountExceedsBalance {
            requested,
            remaining,
            ..
        }) => {
            assert_eq!(requested, BigDecimal::from(711));
            assert_eq!(remaining, BigDecimal::from(710));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(supplier_balance(&ledger).await, BigDecimal::from(5710));

    let mut rest = payment("s1", 710, PaymentMethod::Cash);
    rest.invoice_id = Some(invoice_id);
    ledger.post_supplier_payment(rest, "tester").await.unwrap();
    let invoice = ledger.get_invoice(invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, PaymentStatus::Paid);
    assert!(invoice.balance.is_zero());
    assert_eq!(supplier_balance(&ledger).await, BigDecimal::from(5000));

    let payables = ledger.get_account("2.1.01.001").await.unwrap().unwrap();
    assert!(payables.balance().is_zero());
    assert!(ledger.validate_integrity().await.unwrap().is_valid);
}

#[tokio::test]
async fn test_purchases_keep_inventory_on_the_debit_side() {
    let ledger = ledger(10).await;
    ledger
        .register_supplier_invoice(supplier_invoice("A-0005-00000078", 1000, 210), "tester")
        .await
        .unwrap();
    ledger
        .create_invoice(invoice_request("0001-00000040", 4), "tester")
        .await
        .unwrap();

    let inventory = ledger.get_account("1.1.04.001").await.unwrap().unwrap();
    assert_eq!(inventory.debit_total, BigDecimal::from(1000));
    assert_eq!(inventory.credit_total, BigDecimal::from(400));
    assert_eq!(inventory.balance(), BigDecimal::from(600));
    let vat_credit = ledger.get_account("1.1.05.001").await.unwrap().unwrap();
    assert_eq!(vat_credit.balance(), BigDecimal::from(210));

    assert!(matches!(
        ledger
            .register_supplier_invoice(supplier_invoice("A-0005-00000078", 1000, 210), "tester")
            .await,
        Err(LedgerError::Validation(_))
    ));
    assert!(ledger.validate_integrity().await.unwrap().is_valid);
}

#[tokio::test]
async fn test_sale_revenue_entry_is_posted_with_customer_balance() {
    let mut config = EngineConfig::default();
    config.posting.auto_post = false;
    let ledger = ledger_with(config, 5).await;

    let outcome = ledger
        .create_invoice(invoice_request("0001-00000050", 1), "tester")
        .await
        .unwrap();
    let entry = ledger
        .post_sale_invoice(outcome.invoice.id, "tester")
        .await
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Posted);

    let customer = ledger
        .get_counterparty(CounterpartyKind::Customer, "c1")
        .await
        .unwrap()
        .unwrap();
    let receivables = ledger.get_account("1.1.03.001").await.unwrap().unwrap();
    assert_eq!(customer.balance, "181.5".parse::<BigDecimal>().unwrap());
    assert_eq!(receivables.balance(), customer.balance);

    assert!(matches!(
        ledger.delete_draft(entry.id).await,
        Err(LedgerError::EntryImmutable(_))
    ));
    assert!(matches!(
        ledger.post_sale_invoice(outcome.invoice.id, "tester").await,
        Err(LedgerError::Validation(_))
    ));
    let customer = ledger
        .get_counterparty(CounterpartyKind::Customer, "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.balance, receivables.balance());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sales_compete_for_stock() {
    let ledger = Arc::new(ledger(5).await);

    let handles: Vec<_> = ["0001-00000011", "0001-00000012"]
        .into_iter()
        .map(|number| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .create_invoice(invoice_request(number, 3), "tester")
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut shortfalls = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerError::InsufficientStock(items)) => {
                assert_eq!(items[0].available, BigDecimal::from(2));
                assert_eq!(items[0].required, BigDecimal::from(3));
                shortfalls += 1;
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(shortfalls, 1);
    assert_eq!(
        ledger.get_product("p1").await.unwrap().unwrap().stock,
        BigDecimal::from(2)
    );
    assert!(ledger.validate_integrity().await.unwrap().is_valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_postings_get_unique_gapless_numbers() {
    let ledger = Arc::new(ledger(0).await);
    let postings = 20;

    let handles: Vec<_> = (0..postings)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let mut doc = SourceDocument::new(
                    format!("DOC-{}", i),
                    TriggerType::SaleInvoice,
                    date(),
                    format!("Concurrent sale {}", i),
                );
                doc.total = BigDecimal::from(100 + i);
                doc.subtotal = BigDecimal::from(100 + i);
                ledger.apply_template("SALE_INVOICE_B", &doc, "tester").await
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().number);
    }

    let unique: HashSet<_> = numbers.iter().copied().collect();
    assert_eq!(unique.len(), postings as usize);
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=postings as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_same_document_twice_gives_two_entries() {
    let ledger = ledger(0).await;
    let mut doc = SourceDocument::new("D1".into(), TriggerType::SaleInvoice, date(), "Repeat".into());
    doc.total = BigDecimal::from(500);
    doc.subtotal = BigDecimal::from(500);

    let first = ledger.apply_template("SALE_INVOICE_B", &doc, "tester").await.unwrap();
    let second = ledger.apply_template("SALE_INVOICE_B", &doc, "tester").await.unwrap();

    assert_ne!(first.id, second.id);
    assert!(second.number > first.number);
    assert_eq!(ledger.list_entries().await.unwrap().len(), 2);
    let receivables = ledger.get_account("1.1.03.001").await.unwrap().unwrap();
    assert_eq!(receivables.balance(), BigDecimal::from(1000));
}

#[tokio::test]
async fn test_failed_posting_leaves_zero_trace() {
    let ledger = ledger(0).await;
    let mut doc = SourceDocument::new("D2".into(), TriggerType::SaleInvoice, date(), "Broken".into());
    doc.total = BigDecimal::from(1200);
    doc.subtotal = BigDecimal::from(1000);
    doc.tax = BigDecimal::from(100);

    let err = ledger
        .apply_template("SALE_INVOICE_A", &doc, "tester")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnbalancedEntry { .. }));

    assert!(ledger.list_entries().await.unwrap().is_empty());
    let trial_balance = ledger.trial_balance().await.unwrap();
    assert_eq!(trial_balance.total_debits, BigDecimal::zero());
    assert_eq!(trial_balance.total_credits, BigDecimal::zero());

    doc.tax = BigDecimal::from(200);
    let entry = ledger
        .apply_template("SALE_INVOICE_A", &doc, "tester")
        .await
        .unwrap();
    assert_eq!(entry.total_debits(), BigDecimal::from(1200));
}

#[tokio::test]
async fn test_full_sale_cycle_with_revenue_entry() {
    let mut config = EngineConfig::default();
    config.invoicing.post_revenue_entry = true;
    let ledger = ledger_with(config, 10).await;

    let outcome = ledger
        .create_invoice(invoice_request("0001-00000020", 4), "tester")
        .await
        .unwrap();
    let cost_entry = outcome.journal_entry.clone().unwrap();
    let revenue_entry = outcome.revenue_entry.clone().unwrap();
    assert_eq!(cost_entry.total_debits(), BigDecimal::from(400));
    assert_eq!(revenue_entry.total_debits(), BigDecimal::from(726));
    assert_eq!(
        cost_entry.origin,
        EntryOrigin::Invoice {
            invoice_id: outcome.invoice.id
        }
    );

    let mut receipt = payment("c1", 726, PaymentMethod::Card);
    receipt.invoice_id = Some(outcome.invoice.id);
    ledger.post_customer_receipt(receipt, "tester").await.unwrap();

    let invoice = ledger.get_invoice(outcome.invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, PaymentStatus::Paid);
    assert_eq!(invoice.cost_entry_id, Some(cost_entry.id));
    assert_eq!(invoice.revenue_entry_id, Some(revenue_entry.id));

    let customer = ledger
        .get_counterparty(CounterpartyKind::Customer, "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.balance, BigDecimal::zero());

    let inventory = ledger.get_account("1.1.04.001").await.unwrap().unwrap();
    let cogs = ledger.get_account("5.1.01.001").await.unwrap().unwrap();
    assert_eq!(inventory.credit_total, BigDecimal::from(400));
    assert_eq!(cogs.balance(), BigDecimal::from(400));

    let report = ledger.validate_integrity().await.unwrap();
    assert!(report.is_valid, "{:?}", report.issues);
    assert_eq!(report.entries_checked, 3);
    assert_eq!(ledger.activity().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_preview_does_not_write() {
    let ledger = ledger(3).await;

    let preview = ledger
        .preview_invoice(&invoice_request("0001-00000030", 2))
        .await
        .unwrap();
    assert!(preview.availability.ok);
    assert_eq!(preview.cost.total, BigDecimal::from(200));

    assert!(ledger.list_entries().await.unwrap().is_empty());
    assert_eq!(
        ledger.get_product("p1").await.unwrap().unwrap().stock,
        BigDecimal::from(3)
    );
}

#[tokio::test]
async fn test_reversal_and_draft_lifecycle() {
    let ledger = ledger(0).await;
    let mut doc = SourceDocument::new("D3".into(), TriggerType::SaleInvoice, date(), "Draft".into());
    doc.total = BigDecimal::from(300);
    doc.subtotal = BigDecimal::from(300);

    let draft = ledger
        .apply_template_with(
            "SALE_INVOICE_B",
            &doc,
            "tester",
            ApplyOptions {
                auto_post: false,
                ..ApplyOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(draft.status, EntryStatus::Draft);
    let receivables = ledger.get_account("1.1.03.001").await.unwrap().unwrap();
    assert!(receivables.balance().is_zero());

    let posted = ledger.post_draft(draft.id).await.unwrap();
    assert_eq!(posted.status, EntryStatus::Posted);
    assert!(matches!(
        ledger.delete_draft(draft.id).await,
        Err(LedgerError::EntryImmutable(_))
    ));

    let reversal = ledger.reverse_entry(posted.id, date(), "tester").await.unwrap();
    assert_eq!(reversal.trigger, Some(TriggerType::Reversal));
    let receivables = ledger.get_account("1.1.03.001").await.unwrap().unwrap();
    assert!(receivables.balance().is_zero());
    assert_eq!(receivables.debit_total, BigDecimal::from(300));
}

#[tokio::test]
async fn test_template_administration() {
    let ledger = ledger(0).await;

    ledger.deactivate_template("SALE_INVOICE_B").await.unwrap();
    let doc = SourceDocument::new("D4".into(), TriggerType::SaleInvoice, date(), "Off".into());
    assert!(matches!(
        ledger.apply_template("SALE_INVOICE_B", &doc, "tester").await,
        Err(LedgerError::TemplateInactive(_))
    ));
    let report = ledger.validate_template("SALE_INVOICE_B").await.unwrap();
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 1);

    ledger.activate_template("SALE_INVOICE_B").await.unwrap();
    let revised = ledger
        .revise_template(sale_template("SALE_INVOICE_B", true))
        .await
        .unwrap();
    assert_eq!(revised.version, 2);
    assert_eq!(
        ledger.get_template("SALE_INVOICE_B").await.unwrap().unwrap().lines.len(),
        3
    );
}

#[tokio::test]
async fn test_cost_falls_back_to_price_record() {
    let ledger = ledger(0).await;
    ledger
        .register_product(Product::new("p2".into(), "SKU-2".into(), "Gadget".into()))
        .await
        .unwrap();

    assert!(matches!(
        ledger.unit_cost("p2", date()).await,
        Err(LedgerError::NoCostDefined { .. })
    ));

    ledger
        .set_price(PriceRecord {
            product_id: "p2".into(),
            kind: PriceKind::Cost,
            amount: BigDecimal::from(55),
            valid_from: date(),
            valid_to: None,
        })
        .await
        .unwrap();
    assert_eq!(ledger.unit_cost("p2", date()).await.unwrap(), BigDecimal::from(55));

    let report = ledger
        .check_availability(&[StockItem::new("p2", BigDecimal::from(1))])
        .await
        .unwrap();
    assert!(!report.ok);
}

#[tokio::test]
async fn test_stock_adjustment_posts_and_links() {
    let ledger = ledger(10).await;

    let outcome = ledger
        .record_stock_adjustment(
            StockAdjustment {
                product_id: "p1".into(),
                quantity: BigDecimal::from(-1),
                unit_cost: None,
                reason: "Broken on shelf".into(),
                date: date(),
            },
            "tester",
        )
        .await
        .unwrap();

    let entry = outcome.journal_entry.unwrap();
    assert_eq!(entry.total_debits(), BigDecimal::from(100));
    let movements = ledger.movements("p1").await.unwrap();
    assert_eq!(movements.last().unwrap().journal_entry_id, Some(entry.id));
    assert!(ledger.validate_integrity().await.unwrap().is_valid);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn sales_never_oversell(quantities in proptest::collection::vec(1i64..6, 1..8)) {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let ledger = ledger(12).await;
            let mut sold = 0;
            for (i, quantity) in quantities.iter().enumerate() {
                match ledger.create_invoice(invoice_request(&format!("P-{}", i), *quantity), "tester").await {
                    Ok(_) => sold += quantity,
                    Err(err) => assert!(matches!(err, LedgerError::InsufficientStock(_))),
                }
            }

            let stock = ledger.get_product("p1").await.unwrap().unwrap().stock;
            assert_eq!(stock, BigDecimal::from(12 - sold));
            let report = ledger.validate_integrity().await.unwrap();
            assert!(report.is_valid, "{:?}", report.issues);
        });
    }
}
