//! Services module for billing-engine.

pub mod database;
pub mod metrics;
pub mod settings;
pub mod storage;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use settings::{SettingsResolver, SettingsSource};
pub use storage::{LocalStorage, Storage};
