//! toolvault - license back end for a game-tool storefront
//!
//! Catalog, checkout, payment-callback reconciliation, and the license
//! subsystem (issuance, validation with hardware binding, and the scheduled
//! expiry sweep), served over axum on SQLite.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod pagination;
pub mod util;
