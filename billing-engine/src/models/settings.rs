//! Company settings model for billing-engine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-owner company defaults used on rendered documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CompanySettings {
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    /// Logo reference: data-URI, URL or storage path.
    pub logo: Option<String>,
    pub invoice_prefix: String,
    pub currency: String,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            company_name: None,
            company_address: None,
            company_email: None,
            company_phone: None,
            logo: None,
            invoice_prefix: "INV".to_string(),
            currency: "USD".to_string(),
        }
    }
}
