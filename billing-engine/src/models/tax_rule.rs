//! Tax rule model for billing-engine.

use super::UnknownVariant;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Tax rule identifier.
pub type TaxRuleId = Uuid;

/// How a tax value is applied to its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxKind {
    Fixed,
    #[serde(alias = "percent")]
    Percentage,
}

impl TaxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxKind::Fixed => "fixed",
            TaxKind::Percentage => "percentage",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed" => TaxKind::Fixed,
            _ => TaxKind::Percentage,
        }
    }
}

impl TryFrom<String> for TaxKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "fixed" => Ok(TaxKind::Fixed),
            "percentage" | "percent" => Ok(TaxKind::Percentage),
            _ => Err(UnknownVariant::new("tax kind", value)),
        }
    }
}

/// Named, reusable tax definition.
///
/// Documents snapshot the computed amount and label; editing or deactivating
/// a rule never touches documents that already reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaxRule {
    pub tax_rule_id: TaxRuleId,
    pub owner_id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub kind: TaxKind,
    pub value: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl TaxRule {
    pub fn new(owner_id: Uuid, name: impl Into<String>, kind: TaxKind, value: Decimal) -> Self {
        Self {
            tax_rule_id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            kind,
            value,
            active: true,
            created_utc: Utc::now(),
        }
    }
}

/// Input for creating a tax rule.
#[derive(Debug, Clone, Validate)]
pub struct CreateTaxRule {
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub kind: TaxKind,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub value: Decimal,
}
