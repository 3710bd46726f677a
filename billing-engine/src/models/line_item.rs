//! Line item model for billing-engine.

use super::tax_rule::{TaxKind, TaxRuleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Line item on an invoice, with its tax snapshot and computed amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[sqlx(try_from = "String")]
    pub tax_kind: TaxKind,
    pub tax_rate: Decimal,
    pub tax_rule_id: Option<TaxRuleId>,
    /// Pre-tax amount (quantity x unit price).
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub sort_order: i32,
}

/// Submitted line item.
///
/// An explicit `tax_kind` + `tax_rate` pair overrides the referenced rule.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemInput {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(custom(function = "crate::models::validate_positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub unit_price: Decimal,
    #[serde(default)]
    pub tax_kind: Option<TaxKind>,
    #[serde(default)]
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub tax_rule_id: Option<TaxRuleId>,
}
