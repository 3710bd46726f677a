//! Prepares finalized documents for a renderer that cannot fetch external
//! or relative resources.

use super::salary::{total_deductions, total_earnings};
use crate::models::{
    CompanySettings, DocumentTemplate, Invoice, SalaryMeta, SalarySlip, TemplateStyle,
};
use crate::services::metrics::ASSET_RESOLUTIONS_TOTAL;
use crate::services::storage::Storage;
use base64::Engine as _;
use image::ImageFormat;
use mime::Mime;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Where an asset reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// Already inline.
    DataUri,
    /// Local storage key.
    Stored(String),
    /// Anything else; passed through as-is.
    External,
}

fn storage_key(path: &str) -> String {
    let path = path.trim_start_matches('/');
    path.strip_prefix("storage/").unwrap_or(path).to_string()
}

/// Classify a signature or logo reference.
///
/// URLs under `public_storage_url` map back to local storage keys; other
/// http(s) URLs are external.
pub fn classify(reference: &str, public_storage_url: Option<&str>) -> AssetRef {
    let reference = reference.trim();
    let lower = reference.to_ascii_lowercase();

    if lower.starts_with("data:") {
        return AssetRef::DataUri;
    }

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return match public_storage_url
            .map(|base| base.trim_end_matches('/'))
            .filter(|base| !base.is_empty())
            .and_then(|base| reference.strip_prefix(base))
        {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                AssetRef::Stored(storage_key(rest))
            }
            _ => AssetRef::External,
        };
    }

    AssetRef::Stored(storage_key(reference))
}

/// MIME type of an image payload; `image/png` when it cannot be sniffed.
pub fn sniff_mime(bytes: &[u8]) -> Mime {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return mime::IMAGE_SVG;
    }

    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => mime::IMAGE_PNG,
        Ok(ImageFormat::Jpeg) => mime::IMAGE_JPEG,
        Ok(ImageFormat::Gif) => mime::IMAGE_GIF,
        Ok(ImageFormat::Bmp) => mime::IMAGE_BMP,
        Ok(ImageFormat::WebP) => "image/webp".parse().unwrap_or(mime::IMAGE_PNG),
        Ok(ImageFormat::Tiff) => "image/tiff".parse().unwrap_or(mime::IMAGE_PNG),
        Ok(ImageFormat::Ico) => "image/x-icon".parse().unwrap_or(mime::IMAGE_PNG),
        _ => mime::IMAGE_PNG,
    }
}

/// Encode bytes as a base64 data-URI with a sniffed MIME type.
pub fn to_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_mime(bytes),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Per-role signature visibility: explicit toggle, then the legacy combined
/// toggle, then visible.
pub fn signature_visible(explicit: Option<bool>, legacy: Option<bool>) -> bool {
    explicit.or(legacy).unwrap_or(true)
}

/// Salary slip ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct RenderableSalarySlip {
    pub salary_slip_id: Uuid,
    pub employee_name: String,
    pub pay_period: String,
    pub basic_salary: Decimal,
    pub allowance_amount: Decimal,
    pub deduction_amount: Decimal,
    pub net_salary: Decimal,
    pub total_earnings: Decimal,
    pub total_deductions: Decimal,
    /// Signatures inlined or nulled.
    pub meta: SalaryMeta,
    pub style: TemplateStyle,
    pub company: CompanySettings,
}

/// Invoice ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct RenderableInvoice {
    pub invoice: Invoice,
    pub amount_due: Decimal,
    pub style: TemplateStyle,
    pub company: CompanySettings,
}

/// Resolves asset references and assembles renderable documents.
#[derive(Clone)]
pub struct RenderPreparer {
    storage: Arc<dyn Storage>,
    public_storage_url: Option<String>,
}

impl RenderPreparer {
    pub fn new(storage: Arc<dyn Storage>, public_storage_url: Option<String>) -> Self {
        Self {
            storage,
            public_storage_url,
        }
    }

    /// Resolve one reference into something embeddable.
    ///
    /// Stored assets are inlined as data-URIs; unreadable ones fall back to
    /// the original reference.
    #[instrument(skip(self, reference))]
    pub async fn resolve_asset(&self, reference: &str) -> String {
        match classify(reference, self.public_storage_url.as_deref()) {
            AssetRef::DataUri => {
                ASSET_RESOLUTIONS_TOTAL.with_label_values(&["data_uri"]).inc();
                reference.to_string()
            }
            AssetRef::External => {
                debug!("Passing external asset reference through");
                ASSET_RESOLUTIONS_TOTAL.with_label_values(&["external"]).inc();
                reference.to_string()
            }
            AssetRef::Stored(key) => match self.storage.download(&key).await {
                Ok(bytes) => {
                    ASSET_RESOLUTIONS_TOTAL.with_label_values(&["inlined"]).inc();
                    to_data_uri(&bytes)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to inline stored asset, passing reference through");
                    ASSET_RESOLUTIONS_TOTAL.with_label_values(&["failed"]).inc();
                    reference.to_string()
                }
            },
        }
    }

    async fn resolve_optional(&self, reference: Option<&str>) -> Option<String> {
        let reference = reference.map(str::trim).filter(|r| !r.is_empty())?;
        Some(self.resolve_asset(reference).await)
    }

    async fn resolve_signature(
        &self,
        reference: Option<&str>,
        explicit: Option<bool>,
        legacy: Option<bool>,
    ) -> Option<String> {
        if !signature_visible(explicit, legacy) {
            if reference.is_some() {
                ASSET_RESOLUTIONS_TOTAL
                    .with_label_values(&["suppressed"])
                    .inc();
            }
            return None;
        }
        self.resolve_optional(reference).await
    }

    async fn prepare_company(&self, company: &CompanySettings) -> CompanySettings {
        let mut company = company.clone();
        company.logo = self.resolve_optional(company.logo.as_deref()).await;
        company
    }

    /// Resolve signatures and attach style and company data.
    ///
    /// A suppressed signature is removed from the output, not just hidden.
    #[instrument(skip_all, fields(salary_slip_id = %slip.salary_slip_id))]
    pub async fn prepare_salary_slip(
        &self,
        slip: &SalarySlip,
        template: Option<&DocumentTemplate>,
        company: &CompanySettings,
    ) -> RenderableSalarySlip {
        let mut meta = slip.meta.clone();

        meta.employer_signature = self
            .resolve_signature(
                meta.employer_signature.as_deref(),
                meta.show_employer_signature_in_pdf,
                meta.show_signatures_in_pdf,
            )
            .await;
        meta.employee_signature = self
            .resolve_signature(
                meta.employee_signature.as_deref(),
                meta.show_employee_signature_in_pdf,
                meta.show_signatures_in_pdf,
            )
            .await;

        if meta.company_name.is_none() {
            meta.company_name = company.company_name.clone();
        }
        if meta.company_address.is_none() {
            meta.company_address = company.company_address.clone();
        }

        RenderableSalarySlip {
            salary_slip_id: slip.salary_slip_id,
            employee_name: slip.employee_name.clone(),
            pay_period: slip.pay_period.clone(),
            basic_salary: slip.basic_salary,
            allowance_amount: slip.allowance_amount,
            deduction_amount: slip.deduction_amount,
            net_salary: slip.net_salary,
            total_earnings: total_earnings(&meta),
            total_deductions: total_deductions(&meta),
            meta,
            style: template.map(TemplateStyle::from).unwrap_or_default(),
            company: self.prepare_company(company).await,
        }
    }

    /// Attach derived amounts, style and an inlined company logo.
    #[instrument(skip_all, fields(invoice_id = %invoice.invoice_id))]
    pub async fn prepare_invoice(
        &self,
        invoice: &Invoice,
        template: Option<&DocumentTemplate>,
        company: &CompanySettings,
    ) -> RenderableInvoice {
        RenderableInvoice {
            invoice: invoice.clone(),
            amount_due: invoice.amount_due(),
            style: template.map(TemplateStyle::from).unwrap_or_default(),
            company: self.prepare_company(company).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn test_classify_references() {
        let public = Some("https://app.example.com/storage");

        assert_eq!(classify("data:image/png;base64,AAAA", public), AssetRef::DataUri);
        assert_eq!(
            classify("https://app.example.com/storage/signatures/a.png", public),
            AssetRef::Stored("signatures/a.png".into())
        );
        assert_eq!(
            classify("https://cdn.example.org/a.png", public),
            AssetRef::External
        );
        assert_eq!(
            classify("https://app.example.com/storagex/a.png", public),
            AssetRef::External
        );
        assert_eq!(
            classify("/storage/signatures/a.png", None),
            AssetRef::Stored("signatures/a.png".into())
        );
        assert_eq!(
            classify("signatures/a.png", None),
            AssetRef::Stored("signatures/a.png".into())
        );
        assert_eq!(classify("http://anything/a.png", None), AssetRef::External);
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(PNG_MAGIC), mime::IMAGE_PNG);
        assert_eq!(sniff_mime(JPEG_MAGIC), mime::IMAGE_JPEG);
        assert_eq!(sniff_mime(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"), mime::IMAGE_SVG);
        assert_eq!(sniff_mime(b"definitely not an image"), mime::IMAGE_PNG);
    }

    #[test]
    fn test_data_uri_encoding() {
        let uri = to_data_uri(JPEG_MAGIC);
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_signature_visibility_fallback() {
        assert!(signature_visible(None, None));
        assert!(!signature_visible(None, Some(false)));
        assert!(signature_visible(Some(true), Some(false)));
        assert!(!signature_visible(Some(false), Some(true)));
        assert!(signature_visible(None, Some(true)));
    }
}
