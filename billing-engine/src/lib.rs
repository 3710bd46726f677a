//! Billing Engine - invoice totals, payment ledger and salary slip computation.

pub mod config;
pub mod engine;
pub mod models;
pub mod services;
pub mod startup;
