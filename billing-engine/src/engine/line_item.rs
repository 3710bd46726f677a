//! Per-line amount and tax calculation.

use crate::models::{LineItem, LineItemInput, TaxKind, TaxRule, TaxRuleId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// Compute a line's pre-tax amount, tax and total.
///
/// Fixed tax is charged per unit (`quantity * tax_rate`), not once per line.
/// Inputs are assumed range-checked; results saturate at `Decimal::MAX`.
pub fn compute_line(
    quantity: Decimal,
    unit_price: Decimal,
    tax_kind: TaxKind,
    tax_rate: Decimal,
) -> LineAmounts {
    let amount = quantity.saturating_mul(unit_price);
    let tax_amount = match tax_kind {
        TaxKind::Percentage => amount
            .checked_mul(tax_rate)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .unwrap_or_else(|| (amount / Decimal::ONE_HUNDRED).saturating_mul(tax_rate)),
        TaxKind::Fixed => quantity.saturating_mul(tax_rate),
    };

    LineAmounts {
        amount,
        tax_amount,
        line_total: amount.saturating_add(tax_amount),
    }
}

/// Tax kind and rate to snapshot onto a submitted line.
///
/// Precedence: explicit kind + rate, then the referenced rule, then whatever
/// partial override was given (no tax when nothing was).
pub fn tax_snapshot(
    input: &LineItemInput,
    rules: &HashMap<TaxRuleId, TaxRule>,
) -> (TaxKind, Decimal) {
    let rule = input.tax_rule_id.and_then(|id| rules.get(&id));

    match (input.tax_kind, input.tax_rate, rule) {
        (Some(kind), Some(rate), _) => (kind, rate),
        (_, _, Some(rule)) => (rule.kind, rule.value),
        (kind, rate, None) => (
            kind.unwrap_or(TaxKind::Percentage),
            rate.unwrap_or(Decimal::ZERO),
        ),
    }
}

/// Build a stored line item from a submitted one.
pub fn build_line_item(
    invoice_id: Uuid,
    sort_order: i32,
    input: &LineItemInput,
    rules: &HashMap<TaxRuleId, TaxRule>,
) -> LineItem {
    let (tax_kind, tax_rate) = tax_snapshot(input, rules);
    let amounts = compute_line(input.quantity, input.unit_price, tax_kind, tax_rate);

    LineItem {
        line_item_id: Uuid::new_v4(),
        invoice_id,
        description: input.description.clone(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        tax_kind,
        tax_rate,
        tax_rule_id: input.tax_rule_id,
        amount: amounts.amount,
        tax_amount: amounts.tax_amount,
        line_total: amounts.line_total,
        sort_order,
    }
}
