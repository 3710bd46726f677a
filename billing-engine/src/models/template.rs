//! Document template model for billing-engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Visual template for a rendered document. Styling only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DocumentTemplate {
    pub template_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Identifies which rendering layout to use.
    pub code: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,
    pub font_size: i32,
    pub line_height: Decimal,
}

/// Style parameters handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStyle {
    pub layout: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,
    pub font_size: i32,
    pub line_height: Decimal,
}

impl Default for TemplateStyle {
    fn default() -> Self {
        Self {
            layout: "default".to_string(),
            primary_color: "#1f2937".to_string(),
            secondary_color: "#6b7280".to_string(),
            font_family: "Helvetica".to_string(),
            font_size: 10,
            line_height: Decimal::new(14, 1),
        }
    }
}

impl From<&DocumentTemplate> for TemplateStyle {
    fn from(t: &DocumentTemplate) -> Self {
        Self {
            layout: t.code.clone(),
            primary_color: t.primary_color.clone(),
            secondary_color: t.secondary_color.clone(),
            font_family: t.font_family.clone(),
            font_size: t.font_size,
            line_height: t.line_height,
        }
    }
}
