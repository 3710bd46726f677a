//! Invoice totals: aggregation, full item replacement and invoice assembly.

use super::line_item::build_line_item;
use super::tax::TaxRuleResolver;
use crate::models::{
    CreateInvoice, Invoice, InvoiceStatus, InvoiceUpdate, LineItem, LineItemInput, TaxRule,
    TaxRuleId,
};
use crate::services::metrics::INVOICE_RECOMPUTES_TOTAL;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Aggregated invoice amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

/// Sum line amounts into invoice totals.
pub fn recompute(items: &[LineItem]) -> InvoiceTotals {
    let (subtotal, tax_total) = items
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(sub, tax), item| {
            (
                sub.saturating_add(item.amount),
                tax.saturating_add(item.tax_amount),
            )
        });

    InvoiceTotals {
        subtotal,
        tax_total,
        total: subtotal.saturating_add(tax_total),
    }
}

/// Totals for the universal layout: discount before a global tax
/// percentage, shipping after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniversalTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl UniversalTotals {
    pub fn compute(
        subtotal: Decimal,
        discount: Decimal,
        tax_percent: Decimal,
        shipping: Decimal,
    ) -> Self {
        let discounted = subtotal.saturating_sub(discount);
        let tax = discounted
            .checked_mul(tax_percent)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .unwrap_or_else(|| (discounted / Decimal::ONE_HUNDRED).saturating_mul(tax_percent));

        Self {
            subtotal,
            discount,
            tax,
            shipping,
            total: discounted
                .max(Decimal::ZERO)
                .saturating_add(tax)
                .saturating_add(shipping),
        }
    }
}

/// Tax rule ids referenced by a set of submitted lines.
pub fn referenced_tax_rules(inputs: &[LineItemInput]) -> HashSet<TaxRuleId> {
    inputs.iter().filter_map(|i| i.tax_rule_id).collect()
}

/// Resolve every tax rule referenced by `inputs`.
pub async fn resolve_line_rules<R>(
    owner_id: Uuid,
    inputs: &[LineItemInput],
    resolver: &R,
) -> Result<HashMap<TaxRuleId, TaxRule>, AppError>
where
    R: TaxRuleResolver + ?Sized,
{
    let ids = referenced_tax_rules(inputs);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    resolver.resolve(owner_id, &ids).await
}

/// Discard every existing item, build the submitted set, recompute totals.
///
/// There is no per-item patch path.
pub fn replace_line_items(
    invoice: &mut Invoice,
    inputs: &[LineItemInput],
    rules: &HashMap<TaxRuleId, TaxRule>,
) {
    invoice.items = inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| build_line_item(invoice.invoice_id, idx as i32, input, rules))
        .collect();

    let totals = recompute(&invoice.items);
    invoice.subtotal = totals.subtotal;
    invoice.tax_total = totals.tax_total;
    invoice.total = totals.total;

    debug!(
        invoice_id = %invoice.invoice_id,
        items = invoice.items.len(),
        total = %invoice.total,
        "Invoice totals recomputed"
    );
}

/// Assemble a new invoice with computed items and totals.
#[instrument(skip(input, rules), fields(owner_id = %input.owner_id))]
pub fn build_invoice(
    input: &CreateInvoice,
    invoice_number: String,
    rules: &HashMap<TaxRuleId, TaxRule>,
) -> Invoice {
    let now = Utc::now();
    let mut invoice = Invoice {
        invoice_id: Uuid::new_v4(),
        owner_id: input.owner_id,
        client_id: input.client_id,
        invoice_number,
        status: input.status.unwrap_or(InvoiceStatus::Draft),
        currency: input.currency.clone(),
        issue_date: input.issue_date,
        due_date: input.due_date,
        subtotal: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        total: Decimal::ZERO,
        amount_paid: Decimal::ZERO,
        notes: input.notes.clone(),
        template_id: input.template_id,
        created_utc: now,
        updated_utc: now,
        items: Vec::new(),
        payments: Vec::new(),
    };

    replace_line_items(&mut invoice, &input.items, rules);
    INVOICE_RECOMPUTES_TOTAL
        .with_label_values(&["create"])
        .inc();

    invoice
}

/// Apply a manual edit: full item replacement plus user-set fields.
///
/// Status is taken verbatim from the update; it is derived only when the
/// payment ledger changes.
#[instrument(skip(invoice, update, rules), fields(invoice_id = %invoice.invoice_id))]
pub fn apply_manual_update(
    invoice: &mut Invoice,
    update: &InvoiceUpdate,
    rules: &HashMap<TaxRuleId, TaxRule>,
) {
    replace_line_items(invoice, &update.items, rules);

    if let Some(status) = update.status {
        invoice.status = status;
    }
    if let Some(due_date) = update.due_date {
        invoice.due_date = Some(due_date);
    }
    if update.notes.is_some() {
        invoice.notes = update.notes.clone();
    }
    if update.template_id.is_some() {
        invoice.template_id = update.template_id;
    }
    invoice.updated_utc = Utc::now();

    INVOICE_RECOMPUTES_TOTAL
        .with_label_values(&["update"])
        .inc();
}
