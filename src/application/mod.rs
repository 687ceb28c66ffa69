//! Application Layer
//!
//! Use cases composed from domain ports and replication services.

pub mod admin_service;

pub use admin_service::{ZoneAdminService, ZONE_TIMEOUT};
