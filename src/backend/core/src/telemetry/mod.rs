//! Telemetry: structured logging and metric descriptions.
//!
//! Metrics are emitted through the `metrics` facade. No exporter is bundled;
//! the host process installs whichever recorder it uses and calls
//! [`describe_metrics`] once so the recorder knows units and help text.
//!
//! # Example
//!
//! ```rust,no_run
//! use staffgate_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default(), "production").expect("Failed to initialize telemetry");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};

use metrics::{describe_counter, Unit};

/// Counter names emitted by this crate.
pub mod names {
    pub const ERRORS_TOTAL: &str = "staffgate_errors_total";
    pub const AUTHZ_DECISIONS_TOTAL: &str = "staffgate_authz_decisions_total";
    pub const RESOLVER_LOOKUPS_TOTAL: &str = "staffgate_resolver_lookups_total";
    pub const PERMISSION_CACHE_TOTAL: &str = "staffgate_permission_cache_total";

    pub const ALL: [&str; 4] = [
        ERRORS_TOTAL,
        AUTHZ_DECISIONS_TOTAL,
        RESOLVER_LOOKUPS_TOTAL,
        PERMISSION_CACHE_TOTAL,
    ];
}

/// Register help text for every counter with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        names::ERRORS_TOTAL,
        Unit::Count,
        "Errors constructed, by code and category"
    );
    describe_counter!(
        names::AUTHZ_DECISIONS_TOTAL,
        Unit::Count,
        "Access decisions, by reason"
    );
    describe_counter!(
        names::RESOLVER_LOOKUPS_TOTAL,
        Unit::Count,
        "Context resolver outcomes, by resource type and outcome"
    );
    describe_counter!(
        names::PERMISSION_CACHE_TOTAL,
        Unit::Count,
        "Permission cache lookups, by outcome"
    );
}

/// Initialize logging and describe metrics. Call once at startup.
pub fn init_telemetry(logging: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    init_logging(logging, environment)?;
    describe_metrics();
    tracing::debug!(environment, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in names::ALL {
            assert!(name.starts_with("staffgate_"));
            assert!(name.ends_with("_total"));
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
