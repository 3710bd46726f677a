//! Payment ledger and invoice status derivation.

use crate::models::{Invoice, InvoiceStatus, NewPayment, Payment};
use crate::services::metrics::{
    payment_method_label, PAYMENTS_TOTAL, STATUS_TRANSITIONS_TOTAL,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Tolerance under which an invoice counts as fully paid (0.01).
pub const PAID_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Sum of all payment amounts.
pub fn sum_payments(payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .fold(Decimal::ZERO, |paid, p| paid.saturating_add(p.amount))
}

/// Derive status from the paid amount, the total and the due date.
///
/// With no payments the result is `Overdue` or `Sent`; a manually set
/// `Draft` or `Cancelled` is not preserved.
pub fn derive_status(
    total: Decimal,
    paid: Decimal,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> InvoiceStatus {
    if paid >= total - PAID_TOLERANCE {
        InvoiceStatus::Paid
    } else if paid > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else if due_date.is_some_and(|due| due < today) {
        InvoiceStatus::Overdue
    } else {
        InvoiceStatus::Sent
    }
}

/// Re-sum the ledger into `amount_paid` and re-derive the status.
pub fn refresh_status(invoice: &mut Invoice, today: NaiveDate) -> InvoiceStatus {
    let paid = sum_payments(&invoice.payments);
    invoice.amount_paid = paid;

    let previous = invoice.status;
    let next = derive_status(invoice.total, paid, invoice.due_date, today);
    if next != previous {
        STATUS_TRANSITIONS_TOTAL
            .with_label_values(&[next.as_str()])
            .inc();
        info!(
            invoice_id = %invoice.invoice_id,
            from = previous.as_str(),
            to = next.as_str(),
            "Invoice status changed"
        );
    }
    invoice.status = next;
    invoice.updated_utc = Utc::now();

    next
}

/// Append a payment and re-derive status. Returns the stored payment.
#[instrument(skip(invoice, input), fields(invoice_id = %invoice.invoice_id, amount = %input.amount))]
pub fn record_payment(invoice: &mut Invoice, input: NewPayment, today: NaiveDate) -> Payment {
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        invoice_id: invoice.invoice_id,
        amount: input.amount,
        payment_date: input.payment_date,
        method: input.method,
        reference: input.reference,
        notes: input.notes,
        created_utc: Utc::now(),
    };

    invoice.payments.push(payment.clone());
    invoice.payments.sort_by_key(|p| (p.payment_date, p.created_utc));
    refresh_status(invoice, today);

    PAYMENTS_TOTAL
        .with_label_values(&["record", payment_method_label(&payment.method)])
        .inc();

    payment
}

/// Remove a payment and re-derive status.
///
/// A payment id that is not on this invoice is a not-found error, even if
/// it exists on another invoice.
#[instrument(skip(invoice), fields(invoice_id = %invoice.invoice_id))]
pub fn remove_payment(
    invoice: &mut Invoice,
    payment_id: Uuid,
    today: NaiveDate,
) -> Result<Payment, AppError> {
    let idx = invoice
        .payments
        .iter()
        .position(|p| p.payment_id == payment_id)
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Payment {} not found on invoice {}",
                payment_id,
                invoice.invoice_id
            ))
        })?;

    let removed = invoice.payments.remove(idx);
    refresh_status(invoice, today);

    PAYMENTS_TOTAL
        .with_label_values(&["remove", payment_method_label(&removed.method)])
        .inc();

    Ok(removed)
}
