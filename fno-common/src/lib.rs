//! FNO Common - Shared configuration, errors, and logging for the F&O scanner.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.fnoscan/config.json` + env overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Bounds, Config, DataSourceEntry, DataSourcesConfig, DelayRange, FyersSecrets,
    ObservabilityConfig, SecretsConfig, StrategyConfig, ValidationConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, DataSourcesConfig, StrategyConfig, ValidationConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
