//! Shared models for lectio: configuration, errors, free-form payloads and input checks.

mod config;
mod error;
mod payload;
mod validate;

pub use config::*;
pub use error::*;
pub use payload::*;
pub use validate::*;
