//! Parley Core: configuration, shared types and the error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LlmEndpoint, OpenAiHost, ParleyConfig};
pub use error::{Error, Result};
pub use types::Role;
