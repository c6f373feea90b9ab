// ── Runtime controller configuration ──
//
// These values tune how the controller enumerates and schedules. They
// never touch disk: avdecc-config (or the embedding application) builds a
// `ControllerConfig` and hands it in.

use std::time::Duration;

/// Configuration for one controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Locale used to resolve localized strings (falls back to `en`).
    pub preferred_locale: String,
    /// Read every configuration's full descriptor tree, not just the active one.
    pub full_static_enumeration: bool,
    /// Treat structural sanity violations as fatal enumeration errors
    /// instead of dropping the entity's compatibility flags.
    pub strict_sanity_checks: bool,
    /// Probe for and use packed dynamic-info queries.
    pub packed_dynamic_info: bool,
    /// Maximum number of sub-queries per packed dynamic-info request.
    pub max_packed_queries: usize,
    /// Scheduler tick period.
    pub scheduler_tick: Duration,
    /// How long an identification record stays alive without a refresh.
    pub identify_window: Duration,
    /// Retry attempts for a query that failed with a transient status.
    pub max_query_retries: u32,
    /// Delay before a transient failure is retried.
    pub retry_delay: Duration,
    /// Capacity of the observer broadcast channel.
    pub event_channel_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            preferred_locale: "en-US".into(),
            full_static_enumeration: false,
            strict_sanity_checks: false,
            packed_dynamic_info: true,
            max_packed_queries: 32,
            scheduler_tick: Duration::from_millis(50),
            identify_window: Duration::from_millis(1200),
            max_query_retries: 2,
            retry_delay: Duration::from_millis(500),
            event_channel_size: 256,
        }
    }
}
