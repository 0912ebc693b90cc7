//! Configuration validation for the scanner.
//!
//! Checks that thresholds are positive and that every bound pair is ordered
//! before a scan cycle starts.

use thiserror::Error;

use crate::config::{Bounds, Config, DataSourcesConfig, ObservabilityConfig, StrategyConfig, ValidationConfig};

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

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for result in [
            self.observability.validate(),
            self.sources.validate(),
            self.strategy.validate(),
            self.validation.validate(),
        ] {
            if let Err(e) = result {
                errors.push(e);
            }
        }

        collect(errors)
    }
}

impl Config {
    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

fn check_bounds(field: &str, bounds: &Bounds) -> ValidationResult<()> {
    if !bounds.min.is_finite() || !bounds.max.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: "bounds must be finite".into(),
        });
    }
    if bounds.min > bounds.max {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("min {} exceeds max {}", bounds.min, bounds.max),
        });
    }
    Ok(())
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("unknown format '{}', expected json or pretty", self.log_format),
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "observability.log_level".into(),
            });
        }
        Ok(())
    }
}

impl Validate for DataSourcesConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.batch_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "sources.batch_size".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_workers == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "sources.max_workers".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "sources.request_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        for (field, range) in [
            ("sources.call_delay", &self.call_delay),
            ("sources.batch_pause", &self.batch_pause),
        ] {
            if range.min_ms > range.max_ms {
                errors.push(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: format!("min_ms {} exceeds max_ms {}", range.min_ms, range.max_ms),
                });
            }
        }
        if self.sources.iter().any(|s| s.provider.trim().is_empty()) {
            errors.push(ValidationError::MissingField {
                field: "sources.sources[].provider".into(),
            });
        }

        collect(errors)
    }
}

impl Validate for StrategyConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !(self.min_percentage_increase.is_finite() && self.min_percentage_increase > 0.0) {
            errors.push(ValidationError::InvalidValue {
                field: "strategy.min_percentage_increase".into(),
                reason: "must be a positive number".into(),
            });
        }
        for (field, bounds) in [
            ("strategy.price_bounds", &self.price_bounds),
            ("strategy.gap_bounds", &self.gap_bounds),
            ("strategy.change_bounds", &self.change_bounds),
        ] {
            if let Err(e) = check_bounds(field, bounds) {
                errors.push(e);
            }
        }

        collect(errors)
    }
}

impl Validate for ValidationConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = check_bounds("validation.price_bounds", &self.price_bounds) {
            errors.push(e);
        }
        if self.price_bounds.min <= 0.0 {
            errors.push(ValidationError::InvalidValue {
                field: "validation.price_bounds".into(),
                reason: "lower bound must be positive".into(),
            });
        }
        if !(self.max_day_change_ratio > 0.0) {
            errors.push(ValidationError::InvalidValue {
                field: "validation.max_day_change_ratio".into(),
                reason: "must be greater than 0".into(),
            });
        }

        collect(errors)
    }
}
