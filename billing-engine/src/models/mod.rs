//! Domain models for billing-engine.

mod invoice;
pub mod lenient;
mod line_item;
mod payment;
mod salary_slip;
mod settings;
mod tax_rule;
mod template;

pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, InvoiceUpdate};
pub use line_item::{LineItem, LineItemInput};
pub use payment::{NewPayment, Payment};
pub use salary_slip::{
    CreateSalarySlip, DeductionRow, EarningRow, ExtraRow, FieldEntry, SalaryMeta, SalarySlip,
    UpdateSalarySlip, RESERVED_META_KEYS,
};
pub use settings::CompanySettings;
pub use tax_rule::{CreateTaxRule, TaxKind, TaxRule, TaxRuleId};
pub use template::{DocumentTemplate, TemplateStyle};

use rust_decimal::Decimal;
use validator::ValidationError;

/// A stored string did not name a known enum variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: String) -> Self {
        Self { kind, value }
    }
}

pub(crate) fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}
