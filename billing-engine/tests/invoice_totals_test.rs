//! Invoice totals integration tests for billing-engine.

use billing_engine::engine::tax::TaxRuleTable;
use billing_engine::engine::totals::{
    apply_manual_update, build_invoice, recompute, resolve_line_rules, UniversalTotals,
};
use billing_engine::models::{
    CreateInvoice, InvoiceStatus, InvoiceUpdate, LineItemInput, TaxKind, TaxRule,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

fn line(quantity: &str, unit_price: &str) -> LineItemInput {
    LineItemInput {
        description: "Service".to_string(),
        quantity: dec(quantity),
        unit_price: dec(unit_price),
        tax_kind: None,
        tax_rate: None,
        tax_rule_id: None,
    }
}

fn create_input(owner_id: Uuid, items: Vec<LineItemInput>) -> CreateInvoice {
    CreateInvoice {
        owner_id,
        client_id: Uuid::new_v4(),
        invoice_number: None,
        status: None,
        currency: "USD".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
        due_date: NaiveDate::from_ymd_opt(2026, 3, 31),
        notes: None,
        template_id: None,
        items,
    }
}

#[tokio::test]
async fn invoice_totals_use_referenced_rule_snapshots() {
    let owner = Uuid::new_v4();
    let vat = TaxRule::new(owner, "VAT", TaxKind::Percentage, dec("7.5"));
    let stamp = TaxRule::new(owner, "Stamp", TaxKind::Fixed, dec("2"));
    let table = TaxRuleTable::new([vat.clone(), stamp.clone()]);

    let mut consulting = line("2", "100");
    consulting.tax_rule_id = Some(vat.tax_rule_id);
    let mut forms = line("3", "10");
    forms.tax_rule_id = Some(stamp.tax_rule_id);
    let input = create_input(owner, vec![consulting, forms, line("1", "5")]);

    let rules = resolve_line_rules(owner, &input.items, &table)
        .await
        .expect("resolve");
    let invoice = build_invoice(&input, "INV-2026-0001".to_string(), &rules);

    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.items.len(), 3);
    assert_eq!(invoice.items[0].tax_kind, TaxKind::Percentage);
    assert_eq!(invoice.items[0].tax_amount, dec("15"));
    assert_eq!(invoice.items[1].tax_kind, TaxKind::Fixed);
    assert_eq!(invoice.items[1].tax_amount, dec("6"));
    assert_eq!(invoice.items[2].tax_amount, Decimal::ZERO);

    assert_eq!(invoice.subtotal, dec("235"));
    assert_eq!(invoice.tax_total, dec("21"));
    assert_eq!(invoice.total, dec("256"));
    assert_eq!(invoice.amount_due(), dec("256"));
}

#[tokio::test]
async fn explicit_override_wins_over_rule_and_foreign_rules_are_ignored() {
    let owner = Uuid::new_v4();
    let own_rule = TaxRule::new(owner, "VAT", TaxKind::Percentage, dec("20"));
    let foreign_rule = TaxRule::new(Uuid::new_v4(), "GST", TaxKind::Percentage, dec("10"));
    let table = TaxRuleTable::new([own_rule.clone(), foreign_rule.clone()]);

    let mut overridden = line("1", "100");
    overridden.tax_rule_id = Some(own_rule.tax_rule_id);
    overridden.tax_kind = Some(TaxKind::Percentage);
    overridden.tax_rate = Some(dec("5"));
    let mut foreign = line("1", "100");
    foreign.tax_rule_id = Some(foreign_rule.tax_rule_id);
    let input = create_input(owner, vec![overridden, foreign]);

    let rules = resolve_line_rules(owner, &input.items, &table)
        .await
        .expect("resolve");
    assert_eq!(rules.len(), 1);

    let invoice = build_invoice(&input, "INV-1".to_string(), &rules);
    assert_eq!(invoice.items[0].tax_amount, dec("5"));
    assert_eq!(invoice.items[1].tax_amount, Decimal::ZERO);
    assert_eq!(invoice.total, dec("205"));
}

#[test]
fn manual_update_replaces_all_items_and_keeps_user_status() {
    let owner = Uuid::new_v4();
    let input = create_input(owner, vec![line("1", "100"), line("2", "50")]);
    let mut invoice = build_invoice(&input, "INV-1".to_string(), &Default::default());
    let original_ids: Vec<Uuid> = invoice.items.iter().map(|i| i.line_item_id).collect();

    let update = InvoiceUpdate {
        status: Some(InvoiceStatus::Cancelled),
        due_date: None,
        notes: Some("Client withdrew".to_string()),
        template_id: None,
        items: vec![line("4", "25")],
    };
    apply_manual_update(&mut invoice, &update, &Default::default());

    assert_eq!(invoice.items.len(), 1);
    assert!(!original_ids.contains(&invoice.items[0].line_item_id));
    assert_eq!(invoice.items[0].sort_order, 0);
    assert_eq!(invoice.total, dec("100"));
    assert_eq!(invoice.status, InvoiceStatus::Cancelled);
    assert_eq!(invoice.notes.as_deref(), Some("Client withdrew"));
    assert_eq!(invoice.due_date, input.due_date);
}

#[test]
fn totals_always_equal_sum_of_lines() {
    let owner = Uuid::new_v4();
    let mut taxed = line("3", "19.99");
    taxed.tax_kind = Some(TaxKind::Percentage);
    taxed.tax_rate = Some(dec("7.5"));
    let input = create_input(owner, vec![taxed, line("0.5", "80")]);
    let invoice = build_invoice(&input, "INV-1".to_string(), &Default::default());

    let totals = recompute(&invoice.items);
    let line_sum: Decimal = invoice.items.iter().map(|i| i.line_total).sum();
    assert_eq!(totals.total, line_sum);
    assert_eq!(invoice.total, totals.subtotal + totals.tax_total);
}

#[test]
fn empty_invoice_has_zero_totals() {
    let invoice = build_invoice(
        &create_input(Uuid::new_v4(), Vec::new()),
        "INV-1".to_string(),
        &Default::default(),
    );
    assert_eq!(invoice.subtotal, Decimal::ZERO);
    assert_eq!(invoice.tax_total, Decimal::ZERO);
    assert_eq!(invoice.total, Decimal::ZERO);
}

#[test]
fn universal_totals_apply_discount_before_tax() {
    let totals = UniversalTotals::compute(dec("200"), dec("20"), dec("10"), dec("15"));
    assert_eq!(totals.tax, dec("18"));
    assert_eq!(totals.total, dec("213"));
}
