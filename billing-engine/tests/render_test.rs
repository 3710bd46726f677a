//! Render preparation integration tests for billing-engine.

use billing_engine::engine::render::RenderPreparer;
use billing_engine::models::{CompanySettings, SalaryMeta, SalarySlip};
use billing_engine::services::LocalStorage;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

fn slip(meta: serde_json::Value) -> SalarySlip {
    let meta: SalaryMeta = serde_json::from_value(meta).expect("meta should parse");
    SalarySlip {
        salary_slip_id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        employee_name: "Ada Obi".to_string(),
        pay_period: "2026-03".to_string(),
        basic_salary: Decimal::from(1000),
        allowance_amount: Decimal::ZERO,
        deduction_amount: Decimal::ZERO,
        net_salary: Decimal::from(1000),
        meta,
        template_id: None,
        created_utc: Utc::now(),
        updated_utc: Utc::now(),
    }
}

fn preparer(dir: &tempfile::TempDir) -> RenderPreparer {
    RenderPreparer::new(
        Arc::new(LocalStorage::new(dir.path())),
        Some("https://files.example.com/storage".to_string()),
    )
}

#[tokio::test]
async fn legacy_toggle_off_hides_both_signatures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slip = slip(json!({
        "employer_signature": "data:image/png;base64,AAAA",
        "employee_signature": "data:image/png;base64,BBBB",
        "show_signatures_in_pdf": false
    }));

    let prepared = preparer(&dir)
        .prepare_salary_slip(&slip, None, &CompanySettings::default())
        .await;

    assert!(prepared.meta.employer_signature.is_none());
    assert!(prepared.meta.employee_signature.is_none());
}

#[tokio::test]
async fn explicit_role_toggle_overrides_legacy_toggle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slip = slip(json!({
        "employer_signature": "data:image/png;base64,AAAA",
        "employee_signature": "data:image/png;base64,BBBB",
        "show_employer_signature_in_pdf": true,
        "show_signatures_in_pdf": "0"
    }));

    let prepared = preparer(&dir)
        .prepare_salary_slip(&slip, None, &CompanySettings::default())
        .await;

    assert_eq!(
        prepared.meta.employer_signature.as_deref(),
        Some("data:image/png;base64,AAAA")
    );
    assert!(prepared.meta.employee_signature.is_none());
}

#[tokio::test]
async fn stored_signature_is_inlined_as_data_uri() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("signatures")).expect("mkdir");
    std::fs::write(dir.path().join("signatures/boss.png"), PNG_BYTES).expect("write");

    let slip = slip(json!({
        "employer_signature": "https://files.example.com/storage/signatures/boss.png",
        "employee_signature": "/storage/signatures/boss.png"
    }));

    let prepared = preparer(&dir)
        .prepare_salary_slip(&slip, None, &CompanySettings::default())
        .await;

    for signature in [
        prepared.meta.employer_signature,
        prepared.meta.employee_signature,
    ] {
        let signature = signature.expect("signature kept");
        assert!(signature.starts_with("data:image/png;base64,"));
    }
}

#[tokio::test]
async fn unreadable_asset_passes_reference_through() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slip = slip(json!({
        "employer_signature": "signatures/missing.png",
        "employee_signature": "https://cdn.example.org/sig.png"
    }));

    let prepared = preparer(&dir)
        .prepare_salary_slip(&slip, None, &CompanySettings::default())
        .await;

    assert_eq!(
        prepared.meta.employer_signature.as_deref(),
        Some("signatures/missing.png")
    );
    assert_eq!(
        prepared.meta.employee_signature.as_deref(),
        Some("https://cdn.example.org/sig.png")
    );
}

#[tokio::test]
async fn company_details_fill_missing_meta_and_logo_is_inlined() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("logo.png"), PNG_BYTES).expect("write");
    let company = CompanySettings {
        company_name: Some("Acme Ltd".to_string()),
        company_address: Some("1 Main St".to_string()),
        logo: Some("logo.png".to_string()),
        ..CompanySettings::default()
    };

    let slip = slip(json!({ "company_name": "Acme Payroll" }));
    let prepared = preparer(&dir)
        .prepare_salary_slip(&slip, None, &company)
        .await;

    assert_eq!(prepared.meta.company_name.as_deref(), Some("Acme Payroll"));
    assert_eq!(prepared.meta.company_address.as_deref(), Some("1 Main St"));
    assert!(prepared
        .company
        .logo
        .as_deref()
        .is_some_and(|logo| logo.starts_with("data:image/png;base64,")));
    assert_eq!(prepared.style.layout, "default");
}
