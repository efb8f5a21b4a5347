//! Structured Logging for the Settlement Service
//!
//! Provides structured logging with:
//! - JSON output on mainnet, pretty output elsewhere
//! - Correlation IDs for request tracing
//! - One record per committed settlement event
//! - One record per rejected command
//!
//! # Usage
//!
//! ```rust,ignore
//! use btc_settlement::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! tracing::info!(target: "settlement::api", "listening");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::types::LoggedEvent;

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Deposit reveals
    Deposit,
    /// Sweep settlement
    Sweep,
    /// Reservation lifecycle
    Reservation,
    /// Ledger batches
    Ledger,
    /// Wallet and vault setup
    Setup,
    /// Rejected commands
    Rejection,
    /// System events (startup, shutdown)
    System,
}

impl EventCategory {
    /// tracing target the category logs under
    pub const fn target(&self) -> &'static str {
        match self {
            EventCategory::Api => "settlement::api",
            EventCategory::Deposit => "settlement::deposit",
            EventCategory::Sweep => "settlement::sweep",
            EventCategory::Reservation => "settlement::reservation",
            EventCategory::Ledger => "settlement::ledger",
            EventCategory::Setup => "settlement::setup",
            EventCategory::Rejection => "settlement::rejection",
            EventCategory::System => "settlement::system",
        }
    }

    /// Category of a committed settlement event, by its kind tag
    pub fn for_event_kind(kind: &str) -> Self {
        match kind {
            "deposit_revealed" => EventCategory::Deposit,
            "deposit_settled" | "deposits_swept" | "main_utxo_updated" => EventCategory::Sweep,
            "wallet_registered" | "wallet_state_changed" | "vault_status_updated" => {
                EventCategory::Setup
            }
            _ => EventCategory::Reservation,
        }
    }
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for rejection events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Serialize this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": {:?}}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Settlement Event Logging
// ============================================================================

/// Log a committed settlement event
pub fn log_settlement_event(logged: &LoggedEvent) {
    let kind = logged.event.kind();
    let category = EventCategory::for_event_kind(kind);
    let data = serde_json::to_value(logged).unwrap_or(serde_json::Value::Null);
    let event = LogEvent::new(LogLevel::Info, category, kind)
        .with_correlation_id(logged.seq.to_string())
        .with_data(data);

    info_under(category, &event.to_json());
}

/// Emit an info record under the category's target
fn info_under(category: EventCategory, json: &str) {
    use EventCategory::*;
    match category {
        Api => tracing::info!(target: Api.target(), "{}", json),
        Deposit => tracing::info!(target: Deposit.target(), "{}", json),
        Sweep => tracing::info!(target: Sweep.target(), "{}", json),
        Reservation => tracing::info!(target: Reservation.target(), "{}", json),
        Ledger => tracing::info!(target: Ledger.target(), "{}", json),
        Setup => tracing::info!(target: Setup.target(), "{}", json),
        Rejection => tracing::info!(target: Rejection.target(), "{}", json),
        System => tracing::info!(target: System.target(), "{}", json),
    }
}

/// Log a rejected command
pub fn log_rejection(command: &str, code: &str, message: &str, caller: Option<&str>) {
    let event = LogEvent::new(LogLevel::Warn, EventCategory::Rejection, command)
        .with_error(code, message)
        .with_data(serde_json::json!({
            "command": command,
            "caller": caller,
        }));

    tracing::warn!(target: EventCategory::Rejection.target(), "{}", event.to_json());
}

/// Log a ledger batch applied alongside a commit
pub fn log_ledger_batch(command: &str, ops: usize, first_seq: Option<u64>) {
    let mut event = LogEvent::new(LogLevel::Debug, EventCategory::Ledger, "ledger batch applied")
        .with_data(serde_json::json!({
            "command": command,
            "ops": ops,
        }));
    if let Some(seq) = first_seq {
        event = event.with_correlation_id(seq.to_string());
    }

    tracing::debug!(target: EventCategory::Ledger.target(), "{}", event.to_json());
}

/// Log a lifecycle event of the process (startup, shutdown)
pub fn log_system_event(message: &str, data: serde_json::Value) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::System, message).with_data(data);

    info_under(EventCategory::System, &event.to_json());
}

/// Log an API request
pub fn log_api_request(method: &str, path: &str, correlation_id: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Api, format!("{} {}", method, path))
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "method": method,
            "path": path,
        }));

    info_under(EventCategory::Api, &event.to_json());
}

/// Log an API response
pub fn log_api_response(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: u64,
    correlation_id: &str,
) {
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };

    let event = LogEvent::new(
        level,
        EventCategory::Api,
        format!("{} {} -> {}", method, path, status),
    )
    .with_correlation_id(correlation_id)
    .with_duration(duration_ms)
    .with_data(serde_json::json!({
        "method": method,
        "path": path,
        "status": status
    }));

    let json = event.to_json();
    match level {
        LogLevel::Error => tracing::error!(target: EventCategory::Api.target(), "{}", json),
        LogLevel::Warn => tracing::warn!(target: EventCategory::Api.target(), "{}", json),
        _ => info_under(EventCategory::Api, &json),
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (mainnet)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let lvl = level.as_filter();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "btc_settlement={lvl},settlement={lvl},tower_http={lvl},axum={lvl}"
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from SettlementConfig
pub fn init_from_config(config: &super::config::SettlementConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == super::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

// ============================================================================
// Request ID Generation
// ============================================================================

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, SettlementEvent};

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::from("nonsense"), LogLevel::Info);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_log_event_json() {
        let event = LogEvent::new(LogLevel::Warn, EventCategory::Rejection, "settle_sweep")
            .with_correlation_id("abc")
            .with_error("UNKNOWN_SWEEP_INPUT", "input 0 unknown");

        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["category"], "rejection");
        assert_eq!(json["correlation_id"], "abc");
        assert_eq!(json["error"]["code"], "UNKNOWN_SWEEP_INPUT");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_event_categories() {
        let vault = SettlementEvent::VaultStatusUpdated {
            vault: Identity::new("v"),
            trusted: true,
        };
        assert_eq!(EventCategory::for_event_kind(vault.kind()), EventCategory::Setup);
        assert_eq!(
            EventCategory::for_event_kind("deposits_swept").target(),
            "settlement::sweep"
        );
        assert_eq!(
            EventCategory::for_event_kind("reservation_redeemed"),
            EventCategory::Reservation
        );
    }

    #[test]
    fn test_targets_are_distinct() {
        use std::collections::HashSet;
        let all = [
            EventCategory::Api,
            EventCategory::Deposit,
            EventCategory::Sweep,
            EventCategory::Reservation,
            EventCategory::Ledger,
            EventCategory::Setup,
            EventCategory::Rejection,
            EventCategory::System,
        ];
        let targets: HashSet<&str> = all.iter().map(|c| c.target()).collect();
        assert_eq!(targets.len(), all.len());
        assert!(targets.iter().all(|t| t.starts_with("settlement::")));

        // every committed event kind lands on its own category's target
        for (kind, target) in [
            ("deposit_revealed", "settlement::deposit"),
            ("main_utxo_updated", "settlement::sweep"),
            ("wallet_registered", "settlement::setup"),
            ("reservation_liquidated", "settlement::reservation"),
        ] {
            assert_eq!(EventCategory::for_event_kind(kind).target(), target);
        }
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
