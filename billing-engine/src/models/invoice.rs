//! Invoice model for billing-engine.

use super::line_item::{LineItem, LineItemInput};
use super::payment::Payment;
use super::UnknownVariant;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    PartiallyPaid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "paid" => InvoiceStatus::Paid,
            "partially_paid" => InvoiceStatus::PartiallyPaid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" | "sent" | "paid" | "partially_paid" | "overdue" | "cancelled" => {
                Ok(InvoiceStatus::from_string(&value))
            }
            _ => Err(UnknownVariant::new("invoice status", value)),
        }
    }
}

/// Invoice document.
///
/// `subtotal`, `tax_total`, `total` and `amount_paid` are maintained by the
/// engine and are never written directly by callers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub notes: Option<String>,
    pub template_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<LineItem>,
    #[sqlx(skip)]
    pub payments: Vec<Payment>,
}

impl Invoice {
    /// Outstanding balance, never negative.
    pub fn amount_due(&self) -> Decimal {
        (self.total - self.amount_paid).max(Decimal::ZERO)
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInvoice {
    pub owner_id: Uuid,
    pub client_id: Uuid,
    /// Defaults to the generated candidate number when absent.
    #[serde(default)]
    #[validate(length(min = 1, max = 50))]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[validate(nested)]
    pub items: Vec<LineItemInput>,
}

/// Manual edit of an invoice.
///
/// `items` always replaces the full item set. `status`, when given, is the
/// user's choice and is stored as-is.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceUpdate {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[validate(nested)]
    pub items: Vec<LineItemInput>,
}
