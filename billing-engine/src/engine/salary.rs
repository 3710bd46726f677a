//! Salary slip meta normalization, tax-linked deductions and net pay.

use super::tax::{amount_for, label_for, round_money, TaxRuleResolver};
use crate::models::{
    CreateSalarySlip, FieldEntry, SalaryMeta, SalarySlip, TaxRule, TaxRuleId, UpdateSalarySlip,
    RESERVED_META_KEYS,
};
use crate::services::metrics::{SALARY_SLIPS_NORMALIZED_TOTAL, TAX_DEDUCTIONS_TOTAL};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Project a submitted meta document onto its canonical shape.
///
/// - field groups are flattened into top-level entries plus a
///   `{group}_labels` map; entries with an empty key or label are dropped;
/// - earnings and extra rows need a label, deductions need a label or a
///   tax reference; other rows are dropped.
///
/// Normalizing an already-normalized document returns it unchanged.
pub fn normalize(mut meta: SalaryMeta) -> SalaryMeta {
    flatten_group(
        meta.payslip_fields.take(),
        &mut meta.payslip_fields_labels,
        &mut meta.extra,
    );
    flatten_group(
        meta.employee_fields.take(),
        &mut meta.employee_fields_labels,
        &mut meta.extra,
    );

    meta.earnings.retain(|row| !row.label.is_empty());
    meta.deductions
        .retain(|row| !row.label.is_empty() || row.tax_id.is_some());
    meta.payslip_extra.retain(|row| !row.label.is_empty());
    meta.employee_extra.retain(|row| !row.label.is_empty());

    meta
}

fn flatten_group(
    entries: Option<Vec<FieldEntry>>,
    labels: &mut BTreeMap<String, String>,
    extra: &mut Map<String, Value>,
) {
    // Not resubmitted: keep what is stored.
    let Some(entries) = entries else {
        return;
    };

    for key in labels.keys() {
        extra.remove(key);
    }
    labels.clear();

    for entry in entries {
        if entry.key.is_empty() || entry.label.is_empty() {
            continue;
        }
        if RESERVED_META_KEYS.contains(&entry.key.as_str()) {
            debug!(key = %entry.key, "Skipping field entry with reserved key");
            continue;
        }
        extra.insert(entry.key.clone(), entry.value);
        labels.insert(entry.key, entry.label);
    }
}

/// Running total of row amounts; a row that would overflow counts as zero.
fn sum_rows(rows: &'static str, amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, |total, amount| match total.checked_add(amount) {
        Some(sum) => sum,
        None => {
            warn!(rows, amount = %amount, "Row amount overflows the total, counted as zero");
            total
        }
    })
}

/// Sum of earnings amounts.
pub fn total_earnings(meta: &SalaryMeta) -> Decimal {
    sum_rows("earnings", meta.earnings.iter().map(|row| row.amount))
}

/// Sum of deduction amounts.
pub fn total_deductions(meta: &SalaryMeta) -> Decimal {
    sum_rows("deductions", meta.deductions.iter().map(|row| row.amount))
}

/// Tax rule ids referenced by deduction rows.
pub fn referenced_tax_rules(meta: &SalaryMeta) -> HashSet<TaxRuleId> {
    meta.deductions.iter().filter_map(|row| row.tax_id).collect()
}

/// Overwrite every tax-linked deduction's amount and label from its rule.
///
/// Amounts are computed against total earnings (pre-deduction gross) and
/// rounded to 2 decimals. Rows whose rule is unknown are left as submitted.
pub fn apply_taxes_to_deductions(
    mut meta: SalaryMeta,
    rules: &HashMap<TaxRuleId, TaxRule>,
) -> SalaryMeta {
    let gross = total_earnings(&meta);

    for row in meta.deductions.iter_mut() {
        let Some(tax_id) = row.tax_id else {
            continue;
        };
        match rules.get(&tax_id) {
            Some(rule) => {
                row.amount = round_money(amount_for(gross, rule));
                row.label = label_for(rule);
                TAX_DEDUCTIONS_TOTAL.with_label_values(&["applied"]).inc();
            }
            None => {
                warn!(tax_id = %tax_id, "Deduction references unknown tax rule, left unchanged");
                TAX_DEDUCTIONS_TOTAL
                    .with_label_values(&["unknown_rule"])
                    .inc();
            }
        }
    }

    meta
}

/// Normalize, then resolve and apply deduction taxes.
#[instrument(skip(meta, resolver), fields(owner_id = %owner_id))]
pub async fn normalize_with_taxes<R>(
    owner_id: Uuid,
    meta: SalaryMeta,
    resolver: &R,
) -> Result<SalaryMeta, AppError>
where
    R: TaxRuleResolver + ?Sized,
{
    let meta = normalize(meta);
    let ids = referenced_tax_rules(&meta);
    if ids.is_empty() {
        return Ok(meta);
    }

    let rules = resolver.resolve(owner_id, &ids).await?;
    Ok(apply_taxes_to_deductions(meta, &rules))
}

/// Denormalized salary figures stored alongside the meta document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalaryAmounts {
    pub basic_salary: Decimal,
    pub allowance_amount: Decimal,
    pub deduction_amount: Decimal,
    pub net_salary: Decimal,
}

impl SalaryAmounts {
    /// Figures for a slip given an explicit deduction amount.
    pub fn new(basic_salary: Decimal, allowance_amount: Decimal, deduction_amount: Decimal) -> Self {
        Self {
            basic_salary,
            allowance_amount,
            deduction_amount,
            net_salary: basic_salary
                .saturating_add(allowance_amount)
                .saturating_sub(deduction_amount),
        }
    }

    /// Figures with the deduction amount taken from the meta document.
    pub fn from_meta(basic_salary: Decimal, allowance_amount: Decimal, meta: &SalaryMeta) -> Self {
        Self::new(basic_salary, allowance_amount, total_deductions(meta))
    }
}

/// Build a new slip with normalized meta and derived figures.
#[instrument(skip(input, resolver), fields(owner_id = %input.owner_id))]
pub async fn prepare_new<R>(input: CreateSalarySlip, resolver: &R) -> Result<SalarySlip, AppError>
where
    R: TaxRuleResolver + ?Sized,
{
    let meta = normalize_with_taxes(input.owner_id, input.meta, resolver).await?;
    let amounts = SalaryAmounts::from_meta(input.basic_salary, input.allowance_amount, &meta);
    let now = Utc::now();

    SALARY_SLIPS_NORMALIZED_TOTAL
        .with_label_values(&["create"])
        .inc();

    Ok(SalarySlip {
        salary_slip_id: Uuid::new_v4(),
        owner_id: input.owner_id,
        employee_name: input.employee_name,
        pay_period: input.pay_period,
        basic_salary: amounts.basic_salary,
        allowance_amount: amounts.allowance_amount,
        deduction_amount: amounts.deduction_amount,
        net_salary: amounts.net_salary,
        meta,
        template_id: input.template_id,
        created_utc: now,
        updated_utc: now,
    })
}

/// Apply a partial update.
///
/// Without `meta`, the stored meta and deduction amount are trusted as-is;
/// net salary is still recomputed from the (possibly updated) basic and
/// allowance figures.
#[instrument(skip(slip, update, resolver), fields(salary_slip_id = %slip.salary_slip_id))]
pub async fn apply_update<R>(
    slip: &mut SalarySlip,
    update: UpdateSalarySlip,
    resolver: &R,
) -> Result<(), AppError>
where
    R: TaxRuleResolver + ?Sized,
{
    if let Some(name) = update.employee_name {
        slip.employee_name = name;
    }
    if let Some(period) = update.pay_period {
        slip.pay_period = period;
    }
    if update.template_id.is_some() {
        slip.template_id = update.template_id;
    }

    let basic = update.basic_salary.unwrap_or(slip.basic_salary);
    let allowance = update.allowance_amount.unwrap_or(slip.allowance_amount);

    let amounts = match update.meta {
        Some(meta) => {
            let meta = normalize_with_taxes(slip.owner_id, meta, resolver).await?;
            let amounts = SalaryAmounts::from_meta(basic, allowance, &meta);
            slip.meta = meta;
            SALARY_SLIPS_NORMALIZED_TOTAL
                .with_label_values(&["update"])
                .inc();
            amounts
        }
        None => SalaryAmounts::new(basic, allowance, slip.deduction_amount),
    };

    slip.basic_salary = amounts.basic_salary;
    slip.allowance_amount = amounts.allowance_amount;
    slip.deduction_amount = amounts.deduction_amount;
    slip.net_salary = amounts.net_salary;
    slip.updated_utc = Utc::now();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> SalaryMeta {
        serde_json::from_value(value).expect("meta should parse")
    }

    #[test]
    fn test_field_groups_flatten_into_entries_and_labels() {
        let meta = normalize(parse(json!({
            "payslip_fields": [
                { "key": "pay_date", "label": "Pay Date", "value": "2026-03-31" },
                { "key": "", "label": "No key", "value": "x" },
                { "key": "no_label", "label": "  ", "value": "x" },
                { "key": "earnings", "label": "Sneaky", "value": [] }
            ],
            "employee_fields": [
                { "key": "emp_code", "label": "Employee Code", "value": 42 }
            ]
        })));

        assert!(meta.payslip_fields.is_none());
        assert_eq!(meta.extra.get("pay_date"), Some(&json!("2026-03-31")));
        assert_eq!(meta.extra.get("emp_code"), Some(&json!(42)));
        assert!(!meta.extra.contains_key("no_label"));
        assert_eq!(meta.payslip_fields_labels.len(), 1);
        assert_eq!(
            meta.employee_fields_labels.get("emp_code").map(String::as_str),
            Some("Employee Code")
        );
        assert!(meta.earnings.is_empty());
    }

    #[test]
    fn test_resubmitted_group_replaces_previous_entries() {
        let first = normalize(parse(json!({
            "payslip_fields": [{ "key": "old", "label": "Old", "value": 1 }]
        })));
        let mut raw = first.clone();
        raw.payslip_fields = Some(vec![FieldEntry {
            key: "new".into(),
            label: "New".into(),
            value: json!(2),
        }]);

        let second = normalize(raw);
        assert!(!second.extra.contains_key("old"));
        assert!(!second.payslip_fields_labels.contains_key("old"));
        assert_eq!(second.extra.get("new"), Some(&json!(2)));
    }

    #[test]
    fn test_rows_failing_shape_check_are_dropped() {
        let tax_id = Uuid::new_v4();
        let meta = normalize(parse(json!({
            "earnings": [{ "label": "Basic", "amount": 100 }, { "label": "", "amount": 5 }],
            "deductions": [
                { "label": "", "amount": 5 },
                { "label": "", "amount": 0, "tax_id": tax_id.to_string() },
                { "label": "Loan", "amount": 10 }
            ],
            "payslip_extra": [{ "label": "Note", "value": "ok" }, { "value": "orphan" }],
            "employee_extra": [{ "label": "" }]
        })));

        assert_eq!(meta.earnings.len(), 1);
        assert_eq!(meta.deductions.len(), 2);
        assert_eq!(meta.payslip_extra.len(), 1);
        assert!(meta.employee_extra.is_empty());
    }

    #[test]
    fn test_malformed_amounts_sum_as_zero() {
        let meta = normalize(parse(json!({
            "earnings": [
                { "label": "Basic", "amount": "1000" },
                { "label": "Bonus", "amount": "soon" },
                { "label": "Overtime" }
            ]
        })));
        assert_eq!(meta.earnings.len(), 3);
        assert_eq!(total_earnings(&meta), Decimal::from(1000));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(parse(json!({
            "heading": "March payslip",
            "payslip_fields": [{ "key": "pay_date", "label": "Pay Date", "value": "2026-03-31" }],
            "earnings": [{ "label": "Basic", "amount": 1000 }, { "label": "" }],
            "deductions": [{ "label": "Loan", "amount": 50 }],
            "show_signatures_in_pdf": "1",
            "footer_note": "Thank you"
        })));
        let twice = normalize(once.clone());
        assert_eq!(once, twice);

        let reparsed: SalaryMeta =
            serde_json::from_value(serde_json::to_value(&once).expect("serialize")).expect("parse");
        assert_eq!(normalize(reparsed), once);
    }

    #[test]
    fn test_unknown_tax_rule_leaves_row_untouched() {
        let meta = normalize(parse(json!({
            "earnings": [{ "label": "Basic", "amount": 1000 }],
            "deductions": [{ "label": "Custom", "amount": 12, "tax_id": Uuid::new_v4().to_string() }]
        })));
        let applied = apply_taxes_to_deductions(meta.clone(), &HashMap::new());
        assert_eq!(applied, meta);
    }

    #[test]
    fn test_overflowing_earnings_do_not_panic() {
        let max = Decimal::MAX.to_string();
        let meta = normalize(parse(json!({
            "earnings": [
                { "label": "Basic", "amount": max },
                { "label": "Bonus", "amount": max }
            ],
            "deductions": [{ "label": "", "tax_id": Uuid::nil().to_string() }]
        })));
        assert_eq!(meta.earnings.len(), 2);
        assert_eq!(total_earnings(&meta), Decimal::MAX);

        let rule = TaxRule {
            tax_rule_id: Uuid::nil(),
            ..TaxRule::new(Uuid::nil(), "PAYE", crate::models::TaxKind::Percentage, Decimal::from(10))
        };
        let rules = HashMap::from([(rule.tax_rule_id, rule)]);
        let applied = apply_taxes_to_deductions(meta, &rules);
        assert!(applied.deductions[0].amount > Decimal::ZERO);
        assert_eq!(applied.deductions[0].label, "PAYE (10%)");

        let amounts = SalaryAmounts::new(Decimal::MAX, Decimal::MAX, Decimal::ZERO);
        assert_eq!(amounts.net_salary, Decimal::MAX);
    }

    #[test]
    fn test_salary_amounts_net_identity() {
        let amounts = SalaryAmounts::new(
            Decimal::from(3000),
            Decimal::from(250),
            Decimal::new(41050, 2),
        );
        assert_eq!(amounts.net_salary, Decimal::new(283950, 2));
    }
}
