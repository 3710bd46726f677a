//! Engine wiring: database, storage, settings and the render preparer.

use crate::config::EngineConfig;
use crate::engine::{RenderPreparer, RenderableInvoice, RenderableSalarySlip};
use crate::models::{CreateInvoice, DocumentTemplate, Invoice};
use crate::services::{init_metrics, Database, LocalStorage, SettingsResolver};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Fully wired billing engine.
#[derive(Clone)]
pub struct BillingEngine {
    config: EngineConfig,
    db: Arc<Database>,
    settings: Arc<SettingsResolver>,
    preparer: RenderPreparer,
}

impl BillingEngine {
    /// Build the engine with the given configuration.
    pub async fn build(config: EngineConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the engine without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: EngineConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: EngineConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let settings = Arc::new(SettingsResolver::new(
            db.clone(),
            config.settings_cache_ttl,
        ));
        let storage = Arc::new(LocalStorage::new(config.storage.path.clone()));
        let preparer = RenderPreparer::new(storage, config.storage.public_url.clone());

        tracing::info!(
            storage_path = %config.storage.path.display(),
            settings_cache_ttl_secs = config.settings_cache_ttl.as_secs(),
            "Billing engine wired"
        );

        Ok(Self {
            config,
            db,
            settings,
            preparer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsResolver {
        &self.settings
    }

    pub fn preparer(&self) -> &RenderPreparer {
        &self.preparer
    }

    /// Create an invoice, numbering it from the owner's prefix when no
    /// number was supplied.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let settings = self.settings.resolve(input.owner_id).await?;
        self.db
            .create_invoice(input, &settings.invoice_prefix)
            .await
    }

    async fn template(
        &self,
        owner_id: Uuid,
        template_id: Option<Uuid>,
    ) -> Result<Option<DocumentTemplate>, AppError> {
        match template_id {
            Some(id) => self.db.get_template(owner_id, id).await,
            None => Ok(None),
        }
    }

    /// Load an invoice and prepare it for rendering.
    #[instrument(skip(self), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    pub async fn render_invoice(
        &self,
        owner_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<RenderableInvoice, AppError> {
        let invoice = self
            .db
            .get_invoice(owner_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let template = self.template(owner_id, invoice.template_id).await?;
        let company = self.settings.resolve(owner_id).await?;

        Ok(self
            .preparer
            .prepare_invoice(&invoice, template.as_ref(), &company)
            .await)
    }

    /// Load a salary slip and prepare it for rendering.
    #[instrument(skip(self), fields(owner_id = %owner_id, salary_slip_id = %salary_slip_id))]
    pub async fn render_salary_slip(
        &self,
        owner_id: Uuid,
        salary_slip_id: Uuid,
    ) -> Result<RenderableSalarySlip, AppError> {
        let slip = self
            .db
            .get_salary_slip(owner_id, salary_slip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Salary slip not found")))?;
        let template = self.template(owner_id, slip.template_id).await?;
        let company = self.settings.resolve(owner_id).await?;

        Ok(self
            .preparer
            .prepare_salary_slip(&slip, template.as_ref(), &company)
            .await)
    }
}
