//! Configuration validation.
//!
//! Collects every problem in one pass so a misconfigured deployment
//! reports all of them before aborting.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, ScreenerConfig, StorageConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.tushare_token().is_err() {
            errors.push(ValidationError::MissingField {
                field: "secrets.tushare_token".into(),
            });
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }

        if let Err(e) = self.storage.validate() {
            errors.push(e);
        }

        if self.storage.backend.eq_ignore_ascii_case("supabase") {
            if self.supabase_url().is_err() {
                errors.push(ValidationError::MissingField {
                    field: "secrets.supabase_url".into(),
                });
            }
            if self.supabase_key().is_err() {
                errors.push(ValidationError::MissingField {
                    field: "secrets.supabase_key".into(),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.hot_industries.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "screener.hot_industries".into(),
                reason: "must name at least one industry".into(),
            });
        }

        if self.top_k == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.top_k".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.short_ma == 0 || self.short_ma >= self.long_ma {
            return Err(ValidationError::InvalidValue {
                field: "screener.short_ma".into(),
                reason: format!("must be in 1..{}", self.long_ma),
            });
        }

        if self.min_bars < self.long_ma || self.min_bars <= self.rsi_period {
            return Err(ValidationError::InvalidValue {
                field: "screener.min_bars".into(),
                reason: "must cover the long moving average and the RSI period".into(),
            });
        }

        if self.weights.roe_scale <= 0.0 || self.weights.inflow_scale <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.weights".into(),
                reason: "scales must be positive".into(),
            });
        }

        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_backends = ["sqlite", "supabase"];
        if !valid_backends.contains(&self.backend.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "storage.backend".into(),
                reason: format!("must be one of: {}", valid_backends.join(", ")),
            });
        }

        if self.table.is_empty()
            || !self.table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ValidationError::InvalidValue {
                field: "storage.table".into(),
                reason: "must be a plain identifier".into(),
            });
        }

        Ok(())
    }
}
