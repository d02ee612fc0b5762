//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,grading=debug,session=debug,tower_http=info").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Notes:
//! - Targets stay in the output: `saiten_backend` for startup and config,
//!   `grading` for provider calls, `session` for the practice state machine.
//! - The router's TraceLayer adds per-request spans on top of these events.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,saiten_backend=debug,grading=debug,session=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    // Unparsable or missing LOG_LEVEL falls back to the default directives.
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // JSON and pretty are different subscriber types, so each arm calls init itself.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}
