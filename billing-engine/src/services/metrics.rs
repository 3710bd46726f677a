//! Prometheus metrics for billing-engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Invoice totals recomputations by triggering operation.
pub static INVOICE_RECOMPUTES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoice_recomputes_total",
        "Total number of invoice totals recomputations",
        &["operation"] // create, update
    )
    .expect("Failed to register invoice_recomputes_total")
});

/// Derived status transitions by target status.
pub static STATUS_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_status_transitions_total",
        "Total number of derived invoice status changes",
        &["status"]
    )
    .expect("Failed to register status_transitions_total")
});

/// Payment ledger mutations by operation and method.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_payments_total",
        "Total number of payment ledger mutations",
        &["operation", "method"] // record, remove
    )
    .expect("Failed to register payments_total")
});

/// Salary meta normalizations by operation.
pub static SALARY_SLIPS_NORMALIZED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_salary_slips_normalized_total",
        "Total number of salary slip meta normalizations",
        &["operation"] // create, update
    )
    .expect("Failed to register salary_slips_normalized_total")
});

/// Tax-linked deduction rows by outcome.
pub static TAX_DEDUCTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_tax_deductions_total",
        "Total number of tax-linked deduction rows processed",
        &["outcome"] // applied, unknown_rule
    )
    .expect("Failed to register tax_deductions_total")
});

/// Rendering asset resolutions by outcome.
pub static ASSET_RESOLUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_asset_resolutions_total",
        "Total number of signature/logo asset resolutions",
        &["outcome"] // data_uri, inlined, external, failed, suppressed
    )
    .expect("Failed to register asset_resolutions_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Bounded `method` label for payment metrics; unrecognised methods are `other`.
pub fn payment_method_label(method: &str) -> &'static str {
    match method.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
        "cash" => "cash",
        "bank_transfer" | "bank" | "transfer" | "wire" => "bank_transfer",
        "card" | "credit_card" | "debit_card" => "card",
        "cheque" | "check" => "cheque",
        "mobile_money" | "mobile" => "mobile_money",
        "online" | "paypal" | "stripe" => "online",
        _ => "other",
    }
}

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICE_RECOMPUTES_TOTAL);
    Lazy::force(&STATUS_TRANSITIONS_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&SALARY_SLIPS_NORMALIZED_TOTAL);
    Lazy::force(&TAX_DEDUCTIONS_TOTAL);
    Lazy::force(&ASSET_RESOLUTIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_label_is_bounded() {
        assert_eq!(payment_method_label("Bank Transfer"), "bank_transfer");
        assert_eq!(payment_method_label(" CASH "), "cash");
        assert_eq!(payment_method_label("credit-card"), "card");
        assert_eq!(payment_method_label("paid by neighbour on tuesday"), "other");
    }

    #[test]
    fn test_metrics_are_exported_after_use() {
        init_metrics();
        STATUS_TRANSITIONS_TOTAL.with_label_values(&["paid"]).inc();

        let text = get_metrics();
        assert!(text.contains("billing_status_transitions_total"));
    }
}
