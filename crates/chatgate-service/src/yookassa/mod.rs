//! YooKassa payment processor integration.
//!
//! REST API v3 with basic authentication (shop id / secret key) and an
//! `Idempotence-Key` header on every create.

pub mod client;
pub mod types;

pub use client::YooKassaClient;
pub use types::*;
