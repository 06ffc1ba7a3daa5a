//! Reconciliation pipeline for a scraped recreational-league dataset:
//! canonical identity assignment, winner resolution from redundant per-team
//! observations, and idempotent synchronization into a persistent store.

pub mod canonical;
pub mod config;
pub mod document;
pub mod resolver;
pub mod rest_store;
pub mod sqlite_store;
pub mod store;
pub mod sync;
