//! Gatewiki Shared Types and Storage Ports
//!
//! This crate contains the domain types and the key-value storage
//! abstraction shared across the Gatewiki platform.

pub mod error;
pub mod kv;
pub mod types;

pub use error::*;
pub use kv::*;
pub use types::*;
