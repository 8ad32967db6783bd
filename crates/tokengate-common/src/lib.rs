//! # Tokengate Common
//!
//! Shared types, errors, and constants used across Tokengate components.
//!
//! ## Modules
//! - `types` - Identifier newtypes, security records, and HTTP wire types
//! - `error` - The `GateError` taxonomy
//! - `constants` - Ledger thresholds, CAPTCHA settings, key prefixes

pub mod constants;
pub mod error;
pub mod types;

pub use error::GateError;
pub use types::*;
