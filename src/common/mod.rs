//! Common Utilities
//!
//! Shared configuration, error and logging plumbing.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, Network, SettlementConfig};
pub use error::{ErrorCategory, Result, SettlementError};
pub use logging::{init_from_config, init_logging, LogLevel, LoggingError};
