//! Domain Layer
//!
//! Entities, value objects, ports and pure services of the registry
//! replication core.

pub mod entities;
pub mod ports;
pub mod services;
pub mod value_objects;
