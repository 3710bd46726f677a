//! Database service for billing-engine.

use crate::engine::{ledger, salary, tax::TaxRuleResolver, totals};
use crate::models::{
    CompanySettings, CreateInvoice, CreateSalarySlip, CreateTaxRule, DocumentTemplate, Invoice,
    InvoiceUpdate, LineItem, NewPayment, Payment, SalarySlip, TaxRule, TaxRuleId,
    UpdateSalarySlip,
};
use crate::services::metrics::{DB_QUERY_DURATION, ERRORS_TOTAL};
use crate::services::settings::SettingsSource;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    ERRORS_TOTAL.with_label_values(&["database"]).inc();
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tax Rule Operations
    // -------------------------------------------------------------------------

    /// Create a new tax rule.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_tax_rule(&self, input: &CreateTaxRule) -> Result<TaxRule, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tax_rule"])
            .start_timer();

        let tax_rule = sqlx::query_as::<_, TaxRule>(
            r#"
            INSERT INTO tax_rules (tax_rule_id, owner_id, name, kind, value, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING tax_rule_id, owner_id, name, kind, value, active, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(input.kind.as_str())
        .bind(input.value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Tax rule '{}' already exists", input.name))
            }
            _ => db_error("Failed to create tax rule", e),
        })?;

        timer.observe_duration();

        info!(tax_rule_id = %tax_rule.tax_rule_id, name = %tax_rule.name, "Tax rule created");

        Ok(tax_rule)
    }

    /// List the active tax rules offered for new documents.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn list_active_tax_rules(&self, owner_id: Uuid) -> Result<Vec<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_tax_rules"])
            .start_timer();

        let rules = sqlx::query_as::<_, TaxRule>(
            r#"
            SELECT tax_rule_id, owner_id, name, kind, value, active, created_utc
            FROM tax_rules
            WHERE owner_id = $1 AND active = TRUE
            ORDER BY name
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list tax rules", e))?;

        timer.observe_duration();

        Ok(rules)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Candidate invoice number for display before save: `{prefix}-{year}-{n:04}`.
    ///
    /// Not reserved; the unique index decides at insert time.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn next_invoice_number(
        &self,
        owner_id: Uuid,
        prefix: &str,
        issue_date: NaiveDate,
    ) -> Result<String, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_invoice_number"])
            .start_timer();

        let year = issue_date.year();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM invoices
            WHERE owner_id = $1 AND EXTRACT(YEAR FROM issue_date)::INT = $2
            "#,
        )
        .bind(owner_id)
        .bind(year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count invoices", e))?;

        timer.observe_duration();

        Ok(format!("{}-{}-{:04}", prefix, year, count + 1))
    }

    /// Create an invoice with its items and computed totals.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
        number_prefix: &str,
    ) -> Result<Invoice, AppError> {
        input.validate()?;

        let rules = totals::resolve_line_rules(input.owner_id, &input.items, self).await?;
        let invoice_number = match &input.invoice_number {
            Some(number) => number.clone(),
            None => {
                self.next_invoice_number(input.owner_id, number_prefix, input.issue_date)
                    .await?
            }
        };
        let invoice = totals::build_invoice(input, invoice_number, &rules);

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, owner_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_total, total, amount_paid, amount_due,
                notes, template_id, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.owner_id)
        .bind(invoice.client_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.status.as_str())
        .bind(&invoice.currency)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.subtotal)
        .bind(invoice.tax_total)
        .bind(invoice.total)
        .bind(invoice.amount_paid)
        .bind(invoice.amount_due())
        .bind(&invoice.notes)
        .bind(invoice.template_id)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number '{}' is already in use",
                    invoice.invoice_number
                ))
            }
            _ => db_error("Failed to create invoice", e),
        })?;

        insert_line_items(&mut tx, &invoice.items).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit invoice", e))?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Get an invoice by ID, with items and payments.
    #[instrument(skip(self), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        owner_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("Failed to acquire connection", e))?;
        let invoice = fetch_invoice(&mut conn, owner_id, invoice_id, false).await?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Apply a manual edit: replace all items, recompute totals, store user fields.
    #[instrument(skip(self, update), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        owner_id: Uuid,
        invoice_id: Uuid,
        update: &InvoiceUpdate,
    ) -> Result<Invoice, AppError> {
        update.validate()?;

        let rules = totals::resolve_line_rules(owner_id, &update.items, self).await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut invoice = fetch_invoice(&mut tx, owner_id, invoice_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        totals::apply_manual_update(&mut invoice, update, &rules);

        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to clear line items", e))?;

        insert_line_items(&mut tx, &invoice.items).await?;
        write_invoice_state(&mut tx, &invoice).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit invoice update", e))?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            items = invoice.items.len(),
            total = %invoice.total,
            status = invoice.status.as_str(),
            "Invoice updated"
        );

        Ok(invoice)
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Record a payment, re-sum the ledger and re-derive status.
    #[instrument(skip(self, input), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        owner_id: Uuid,
        invoice_id: Uuid,
        input: NewPayment,
        today: NaiveDate,
    ) -> Result<(Invoice, Payment), AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut invoice = fetch_invoice(&mut tx, owner_id, invoice_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let payment = ledger::record_payment(&mut invoice, input, today);

        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, invoice_id, amount, payment_date, method, reference, notes, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to record payment", e))?;

        write_invoice_state(&mut tx, &invoice).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit payment", e))?;

        timer.observe_duration();

        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            amount_paid = %invoice.amount_paid,
            status = invoice.status.as_str(),
            "Payment recorded"
        );

        Ok((invoice, payment))
    }

    /// Remove a payment from its invoice and re-derive status.
    ///
    /// A payment belonging to a different invoice is reported as not found.
    #[instrument(skip(self), fields(owner_id = %owner_id, invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn remove_payment(
        &self,
        owner_id: Uuid,
        invoice_id: Uuid,
        payment_id: Uuid,
        today: NaiveDate,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_payment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut invoice = fetch_invoice(&mut tx, owner_id, invoice_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let removed = ledger::remove_payment(&mut invoice, payment_id, today)?;

        sqlx::query("DELETE FROM payments WHERE payment_id = $1 AND invoice_id = $2")
            .bind(removed.payment_id)
            .bind(invoice.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to remove payment", e))?;

        write_invoice_state(&mut tx, &invoice).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit payment removal", e))?;

        timer.observe_duration();

        info!(
            amount_paid = %invoice.amount_paid,
            status = invoice.status.as_str(),
            "Payment removed"
        );

        Ok(invoice)
    }

    // -------------------------------------------------------------------------
    // Salary Slip Operations
    // -------------------------------------------------------------------------

    /// Create a salary slip with normalized meta and derived amounts.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_salary_slip(&self, input: CreateSalarySlip) -> Result<SalarySlip, AppError> {
        input.validate()?;

        let slip = salary::prepare_new(input, self).await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_salary_slip"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO salary_slips (
                salary_slip_id, owner_id, employee_name, pay_period, basic_salary,
                allowance_amount, deduction_amount, net_salary, meta, template_id,
                created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(slip.salary_slip_id)
        .bind(slip.owner_id)
        .bind(&slip.employee_name)
        .bind(&slip.pay_period)
        .bind(slip.basic_salary)
        .bind(slip.allowance_amount)
        .bind(slip.deduction_amount)
        .bind(slip.net_salary)
        .bind(Json(&slip.meta))
        .bind(slip.template_id)
        .bind(slip.created_utc)
        .bind(slip.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create salary slip", e))?;

        timer.observe_duration();

        info!(
            salary_slip_id = %slip.salary_slip_id,
            net_salary = %slip.net_salary,
            "Salary slip created"
        );

        Ok(slip)
    }

    /// Get a salary slip by ID.
    #[instrument(skip(self), fields(owner_id = %owner_id, salary_slip_id = %salary_slip_id))]
    pub async fn get_salary_slip(
        &self,
        owner_id: Uuid,
        salary_slip_id: Uuid,
    ) -> Result<Option<SalarySlip>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_salary_slip"])
            .start_timer();

        let slip = sqlx::query_as::<_, SalarySlip>(
            r#"
            SELECT salary_slip_id, owner_id, employee_name, pay_period, basic_salary,
                allowance_amount, deduction_amount, net_salary, meta, template_id,
                created_utc, updated_utc
            FROM salary_slips
            WHERE owner_id = $1 AND salary_slip_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(salary_slip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get salary slip", e))?;

        timer.observe_duration();

        Ok(slip)
    }

    /// Apply a partial salary slip update.
    #[instrument(skip(self, update), fields(owner_id = %owner_id, salary_slip_id = %salary_slip_id))]
    pub async fn update_salary_slip(
        &self,
        owner_id: Uuid,
        salary_slip_id: Uuid,
        update: UpdateSalarySlip,
    ) -> Result<SalarySlip, AppError> {
        update.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_salary_slip"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut slip = sqlx::query_as::<_, SalarySlip>(
            r#"
            SELECT salary_slip_id, owner_id, employee_name, pay_period, basic_salary,
                allowance_amount, deduction_amount, net_salary, meta, template_id,
                created_utc, updated_utc
            FROM salary_slips
            WHERE owner_id = $1 AND salary_slip_id = $2
            FOR UPDATE
            "#,
        )
        .bind(owner_id)
        .bind(salary_slip_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load salary slip", e))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Salary slip not found")))?;

        salary::apply_update(&mut slip, update, self).await?;

        sqlx::query(
            r#"
            UPDATE salary_slips
            SET employee_name = $3,
                pay_period = $4,
                basic_salary = $5,
                allowance_amount = $6,
                deduction_amount = $7,
                net_salary = $8,
                meta = $9,
                template_id = $10,
                updated_utc = $11
            WHERE owner_id = $1 AND salary_slip_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(salary_slip_id)
        .bind(&slip.employee_name)
        .bind(&slip.pay_period)
        .bind(slip.basic_salary)
        .bind(slip.allowance_amount)
        .bind(slip.deduction_amount)
        .bind(slip.net_salary)
        .bind(Json(&slip.meta))
        .bind(slip.template_id)
        .bind(slip.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update salary slip", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit salary slip update", e))?;

        timer.observe_duration();

        info!(net_salary = %slip.net_salary, "Salary slip updated");

        Ok(slip)
    }

    // -------------------------------------------------------------------------
    // Template Operations
    // -------------------------------------------------------------------------

    /// Get a document template by ID.
    #[instrument(skip(self), fields(owner_id = %owner_id, template_id = %template_id))]
    pub async fn get_template(
        &self,
        owner_id: Uuid,
        template_id: Uuid,
    ) -> Result<Option<DocumentTemplate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_template"])
            .start_timer();

        let template = sqlx::query_as::<_, DocumentTemplate>(
            r#"
            SELECT template_id, owner_id, name, code, primary_color, secondary_color,
                font_family, font_size, line_height
            FROM document_templates
            WHERE owner_id = $1 AND template_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get template", e))?;

        timer.observe_duration();

        Ok(template)
    }
}

#[async_trait]
impl TaxRuleResolver for Database {
    #[instrument(skip(self, ids), fields(owner_id = %owner_id, requested = ids.len()))]
    async fn resolve(
        &self,
        owner_id: Uuid,
        ids: &HashSet<TaxRuleId>,
    ) -> Result<HashMap<TaxRuleId, TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_tax_rules"])
            .start_timer();

        let ids: Vec<Uuid> = ids.iter().copied().collect();
        let rules = sqlx::query_as::<_, TaxRule>(
            r#"
            SELECT tax_rule_id, owner_id, name, kind, value, active, created_utc
            FROM tax_rules
            WHERE owner_id = $1 AND tax_rule_id = ANY($2)
            "#,
        )
        .bind(owner_id)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to resolve tax rules", e))?;

        timer.observe_duration();

        Ok(rules
            .into_iter()
            .map(|rule| (rule.tax_rule_id, rule))
            .collect())
    }
}

#[async_trait]
impl SettingsSource for Database {
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn load_settings(&self, owner_id: Uuid) -> Result<Option<CompanySettings>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_settings"])
            .start_timer();

        let settings = sqlx::query_as::<_, CompanySettings>(
            r#"
            SELECT company_name, company_address, company_email, company_phone, logo,
                invoice_prefix, currency
            FROM company_settings
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load company settings", e))?;

        timer.observe_duration();

        Ok(settings)
    }
}

/// Load an invoice with its items and payments, optionally locking the row.
async fn fetch_invoice(
    conn: &mut PgConnection,
    owner_id: Uuid,
    invoice_id: Uuid,
    for_update: bool,
) -> Result<Option<Invoice>, AppError> {
    let sql = if for_update {
        r#"
        SELECT invoice_id, owner_id, client_id, invoice_number, status, currency,
            issue_date, due_date, subtotal, tax_total, total, amount_paid,
            notes, template_id, created_utc, updated_utc
        FROM invoices
        WHERE owner_id = $1 AND invoice_id = $2
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT invoice_id, owner_id, client_id, invoice_number, status, currency,
            issue_date, due_date, subtotal, tax_total, total, amount_paid,
            notes, template_id, created_utc, updated_utc
        FROM invoices
        WHERE owner_id = $1 AND invoice_id = $2
        "#
    };

    let Some(mut invoice) = sqlx::query_as::<_, Invoice>(sql)
        .bind(owner_id)
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to get invoice", e))?
    else {
        return Ok(None);
    };

    invoice.items = sqlx::query_as::<_, LineItem>(
        r#"
        SELECT line_item_id, invoice_id, description, quantity, unit_price, tax_kind,
            tax_rate, tax_rule_id, amount, tax_amount, line_total, sort_order
        FROM invoice_line_items
        WHERE invoice_id = $1
        ORDER BY sort_order
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to get line items", e))?;

    invoice.payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT payment_id, invoice_id, amount, payment_date, method, reference, notes, created_utc
        FROM payments
        WHERE invoice_id = $1
        ORDER BY payment_date, created_utc
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to get payments", e))?;

    Ok(Some(invoice))
}

async fn insert_line_items(conn: &mut PgConnection, items: &[LineItem]) -> Result<(), AppError> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (
                line_item_id, invoice_id, description, quantity, unit_price, tax_kind,
                tax_rate, tax_rule_id, amount, tax_amount, line_total, sort_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.line_item_id)
        .bind(item.invoice_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.tax_kind.as_str())
        .bind(item.tax_rate)
        .bind(item.tax_rule_id)
        .bind(item.amount)
        .bind(item.tax_amount)
        .bind(item.line_total)
        .bind(item.sort_order)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to insert line item", e))?;
    }
    Ok(())
}

/// Persist the engine-maintained and user-editable invoice columns.
async fn write_invoice_state(conn: &mut PgConnection, invoice: &Invoice) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET status = $2,
            due_date = $3,
            subtotal = $4,
            tax_total = $5,
            total = $6,
            amount_paid = $7,
            amount_due = $8,
            notes = $9,
            template_id = $10,
            updated_utc = $11
        WHERE invoice_id = $1
        "#,
    )
    .bind(invoice.invoice_id)
    .bind(invoice.status.as_str())
    .bind(invoice.due_date)
    .bind(invoice.subtotal)
    .bind(invoice.tax_total)
    .bind(invoice.total)
    .bind(invoice.amount_paid)
    .bind(invoice.amount_due())
    .bind(&invoice.notes)
    .bind(invoice.template_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to update invoice", e))?;
    Ok(())
}
