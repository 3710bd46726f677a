//! Financial computation core.
//!
//! Everything here is pure or reaches storage only through the
//! [`TaxRuleResolver`] and [`Storage`](crate::services::Storage) seams.

pub mod ledger;
pub mod line_item;
pub mod render;
pub mod salary;
pub mod tax;
pub mod totals;

pub use ledger::{derive_status, refresh_status, PAID_TOLERANCE};
pub use line_item::{compute_line, LineAmounts};
pub use render::{RenderPreparer, RenderableInvoice, RenderableSalarySlip};
pub use salary::{normalize, SalaryAmounts};
pub use tax::{TaxRuleResolver, TaxRuleTable};
pub use totals::{recompute, InvoiceTotals, UniversalTotals};
