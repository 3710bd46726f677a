//! Tax rule lookup and the tax amount/label functions.

use crate::models::{TaxKind, TaxRule, TaxRuleId};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Batch lookup of tax rules for one owner.
///
/// Unknown ids are absent from the result; that is not an error.
#[async_trait]
pub trait TaxRuleResolver: Send + Sync {
    async fn resolve(
        &self,
        owner_id: Uuid,
        ids: &HashSet<TaxRuleId>,
    ) -> Result<HashMap<TaxRuleId, TaxRule>, AppError>;
}

/// In-process tax rule table.
#[derive(Debug, Clone, Default)]
pub struct TaxRuleTable {
    rules: HashMap<TaxRuleId, TaxRule>,
}

impl TaxRuleTable {
    pub fn new(rules: impl IntoIterator<Item = TaxRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| (rule.tax_rule_id, rule))
                .collect(),
        }
    }

    pub fn insert(&mut self, rule: TaxRule) {
        self.rules.insert(rule.tax_rule_id, rule);
    }
}

#[async_trait]
impl TaxRuleResolver for TaxRuleTable {
    async fn resolve(
        &self,
        owner_id: Uuid,
        ids: &HashSet<TaxRuleId>,
    ) -> Result<HashMap<TaxRuleId, TaxRule>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.rules.get(id))
            .filter(|rule| rule.owner_id == owner_id)
            .map(|rule| (rule.tax_rule_id, rule.clone()))
            .collect())
    }
}

/// Tax amount for `base` under `rule`. Not rounded.
///
/// Bases too large to multiply directly are scaled down first and the result
/// saturates at `Decimal::MAX`.
pub fn amount_for(base: Decimal, rule: &TaxRule) -> Decimal {
    match rule.kind {
        TaxKind::Percentage => base
            .checked_mul(rule.value)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .unwrap_or_else(|| (base / Decimal::ONE_HUNDRED).saturating_mul(rule.value)),
        TaxKind::Fixed => rule.value,
    }
}

/// Display label: `"{name}"` for fixed, `"{name} ({value}%)"` for percentage.
pub fn label_for(rule: &TaxRule) -> String {
    match rule.kind {
        TaxKind::Fixed => rule.name.clone(),
        TaxKind::Percentage => format!("{} ({}%)", rule.name, rule.value.normalize()),
    }
}

/// Round a money amount to 2 decimals, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, kind: TaxKind, value: Decimal) -> TaxRule {
        TaxRule::new(Uuid::nil(), name, kind, value)
    }

    #[test]
    fn test_percentage_amount() {
        let vat = rule("VAT", TaxKind::Percentage, Decimal::new(75, 1));
        assert_eq!(amount_for(Decimal::from(200), &vat), Decimal::from(15));
    }

    #[test]
    fn test_percentage_of_huge_base_saturates_instead_of_panicking() {
        let paye = rule("PAYE", TaxKind::Percentage, Decimal::from(10));
        let amount = amount_for(Decimal::MAX, &paye);
        assert!(amount > Decimal::ZERO);
        assert!(amount < Decimal::MAX);

        let silly = rule("Silly", TaxKind::Percentage, Decimal::from(1_000_000));
        assert_eq!(amount_for(Decimal::MAX, &silly), Decimal::MAX);
    }

    #[test]
    fn test_fixed_amount_ignores_base() {
        let stamp = rule("Stamp", TaxKind::Fixed, Decimal::from(5));
        assert_eq!(amount_for(Decimal::from(10_000), &stamp), Decimal::from(5));
        assert_eq!(amount_for(Decimal::ZERO, &stamp), Decimal::from(5));
    }

    #[test]
    fn test_amount_is_not_rounded() {
        let odd = rule("Odd", TaxKind::Percentage, Decimal::new(333, 1));
        assert_eq!(amount_for(Decimal::ONE, &odd), Decimal::new(333, 3));
    }

    #[test]
    fn test_labels_trim_trailing_zeros() {
        assert_eq!(
            label_for(&rule("VAT", TaxKind::Percentage, Decimal::new(750, 2))),
            "VAT (7.5%)"
        );
        assert_eq!(
            label_for(&rule("VAT", TaxKind::Percentage, Decimal::new(2000, 2))),
            "VAT (20%)"
        );
        assert_eq!(
            label_for(&rule("VAT", TaxKind::Percentage, Decimal::from(7))),
            "VAT (7%)"
        );
        assert_eq!(
            label_for(&rule("Stamp", TaxKind::Fixed, Decimal::from(5))),
            "Stamp"
        );
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
        assert_eq!(round_money(Decimal::from(100)), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_table_omits_unknown_and_foreign_rules() {
        let owner = Uuid::new_v4();
        let mine = TaxRule::new(owner, "VAT", TaxKind::Percentage, Decimal::from(20));
        let theirs = TaxRule::new(Uuid::new_v4(), "GST", TaxKind::Percentage, Decimal::from(5));
        let table = TaxRuleTable::new([mine.clone(), theirs.clone()]);

        let ids: HashSet<_> = [mine.tax_rule_id, theirs.tax_rule_id, Uuid::new_v4()]
            .into_iter()
            .collect();
        let resolved = table.resolve(owner, &ids).await.expect("resolve");

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get(&mine.tax_rule_id), Some(&mine));
    }
}
