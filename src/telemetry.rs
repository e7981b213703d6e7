//! Tracing initialization (SPEC_FULL.md §3 "Logging"), matching
//! agentgateway's own `tracing_subscriber` setup: an `EnvFilter` sourced
//! from `RUST_LOG`, with an optional JSON formatter for production
//! deployments (`LOG_FORMAT=json`), plain text otherwise for local dev.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global tracing subscriber. Call once, at process start.
pub fn init() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let json_output = std::env::var("LOG_FORMAT")
		.map(|v| v.eq_ignore_ascii_case("json"))
		.unwrap_or(false);

	let registry = tracing_subscriber::registry().with(filter);
	if json_output {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}
}
