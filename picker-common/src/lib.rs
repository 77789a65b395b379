//! Picker Common - configuration, validation, errors and logging shared by
//! the stock picker crates.
//!
//! This crate provides:
//! - Configuration types and modular loading (`config.json` + `secrets.json`)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, ObservabilityConfig, ProviderConfig, ScoreWeights, ScreenerConfig, SecretsConfig,
    StorageConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
