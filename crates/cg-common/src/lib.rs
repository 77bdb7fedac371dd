//! # cg-common
//!
//! Shared configuration, error and token types for ChatGate.

pub mod config;
pub mod error;
pub mod token;

pub use config::AppConfig;
pub use error::{AppError, AppResult, ErrorKind, ErrorReport, FieldErrors};
