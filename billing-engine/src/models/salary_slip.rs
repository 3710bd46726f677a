//! Salary slip model and its meta document.

use super::lenient;
use super::tax_rule::TaxRuleId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Meta keys owned by the typed fields of [`SalaryMeta`].
///
/// Field-group entries may not claim these as their key.
pub const RESERVED_META_KEYS: &[&str] = &[
    "heading",
    "company_name",
    "company_address",
    "payslip_fields",
    "employee_fields",
    "payslip_fields_labels",
    "employee_fields_labels",
    "payslip_extra",
    "employee_extra",
    "earnings",
    "deductions",
    "employer_signature",
    "employee_signature",
    "show_employer_signature_in_pdf",
    "show_employee_signature_in_pdf",
    "show_signatures_in_pdf",
];

/// One submitted `{key, label, value}` entry of a field group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    #[serde(default, deserialize_with = "lenient::trimmed")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient::trimmed")]
    pub label: String,
    #[serde(default)]
    pub value: Value,
}

/// Labelled display row in one of the extra lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraRow {
    #[serde(default, deserialize_with = "lenient::trimmed")]
    pub label: String,
    #[serde(default)]
    pub value: Value,
}

/// Earnings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningRow {
    #[serde(default, deserialize_with = "lenient::trimmed")]
    pub label: String,
    #[serde(
        default,
        deserialize_with = "lenient::amount",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub amount: Decimal,
}

/// Deduction row, optionally computed from a tax rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionRow {
    #[serde(default, deserialize_with = "lenient::trimmed")]
    pub label: String,
    #[serde(
        default,
        deserialize_with = "lenient::amount",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub amount: Decimal,
    #[serde(
        default,
        alias = "tax_rule_id",
        deserialize_with = "lenient::tax_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub tax_id: Option<TaxRuleId>,
}

/// Salary slip meta document.
///
/// Known fields are typed; anything else (including flattened field-group
/// values) is carried in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryMeta {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub company_address: Option<String>,

    /// Submitted only; consumed by normalization.
    #[serde(
        default,
        deserialize_with = "lenient::optional_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub payslip_fields: Option<Vec<FieldEntry>>,
    /// Submitted only; consumed by normalization.
    #[serde(
        default,
        deserialize_with = "lenient::optional_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_fields: Option<Vec<FieldEntry>>,
    #[serde(default, deserialize_with = "lenient::label_map")]
    pub payslip_fields_labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient::label_map")]
    pub employee_fields_labels: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::list")]
    pub payslip_extra: Vec<ExtraRow>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub employee_extra: Vec<ExtraRow>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub earnings: Vec<EarningRow>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub deductions: Vec<DeductionRow>,

    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub employer_signature: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub employee_signature: Option<String>,
    #[serde(default, deserialize_with = "lenient::toggle", skip_serializing_if = "Option::is_none")]
    pub show_employer_signature_in_pdf: Option<bool>,
    #[serde(default, deserialize_with = "lenient::toggle", skip_serializing_if = "Option::is_none")]
    pub show_employee_signature_in_pdf: Option<bool>,
    /// Legacy combined toggle, consulted when a per-role toggle is unset.
    #[serde(default, deserialize_with = "lenient::toggle", skip_serializing_if = "Option::is_none")]
    pub show_signatures_in_pdf: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Salary slip with its denormalized totals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SalarySlip {
    pub salary_slip_id: Uuid,
    pub owner_id: Uuid,
    pub employee_name: String,
    pub pay_period: String,
    pub basic_salary: Decimal,
    pub allowance_amount: Decimal,
    pub deduction_amount: Decimal,
    pub net_salary: Decimal,
    #[sqlx(json)]
    pub meta: SalaryMeta,
    pub template_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a salary slip.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSalarySlip {
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub employee_name: String,
    #[validate(length(min = 1, max = 50))]
    pub pay_period: String,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub basic_salary: Decimal,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub allowance_amount: Decimal,
    #[serde(default)]
    pub meta: SalaryMeta,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

/// Partial update of a salary slip.
///
/// When `meta` is omitted, the stored meta and deduction amount are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateSalarySlip {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub employee_name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 50))]
    pub pay_period: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub basic_salary: Option<Decimal>,
    #[serde(default)]
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub allowance_amount: Option<Decimal>,
    #[serde(default)]
    pub meta: Option<SalaryMeta>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}
