//! Gatewiki API Library
//!
//! Authentication and abuse-resistance core for the Gatewiki
//! content-gated wiki: credential storage with versioned hashes,
//! single-use verification tokens, rate limiting with account lockout,
//! stateless CSRF tokens and opaque cookie sessions, exposed over a
//! small HTTP surface.

pub mod auth;
pub mod captcha;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
