//! Process-wide configuration keystore (spec §3).
//!
//! Lookup is total: a missing key yields its declared default, never an
//! error. Sensitive keys are redacted whenever echoed back to a caller
//! (`config.get`, `health`) but stored and used in full internally.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

const MASK: &str = "****";

/// Keys whose values must never be echoed back in full.
const SENSITIVE_KEYS: &[&str] = &["JWT_SECRET", "IP_CHECK_API_KEY"];

/// Internal-only key, never listed in spec §3's table and never returned by
/// `config.get`: records the deploy instant for the init-window protocol.
/// Not stored as a string value (see `Config::deploy_instant`); this
/// constant exists only so `config.get` can assert it never leaks.
pub const DEPLOY_MONOTONIC_KEY: &str = "_DEPLOY_MONOTONIC_SECS";

#[derive(Debug, Clone, Default)]
struct Snapshot {
	values: HashMap<String, String>,
}

/// Typed, total-lookup configuration store. Readers never block; `set`
/// swaps in a new snapshot (last-writer-wins on a given key, per spec §5).
pub struct Config {
	snapshot: ArcSwap<Snapshot>,
	deploy_instant: std::time::Instant,
}

impl Config {
	/// Build the config from the process environment, optionally loading a
	/// `.env` file first (local-dev convenience; production sets real env vars).
	pub fn from_env() -> Self {
		let _ = dotenvy::dotenv();
		let mut values = HashMap::new();
		for key in KNOWN_KEYS {
			if let Ok(v) = std::env::var(key) {
				values.insert(key.to_string(), v);
			}
		}
		Config {
			snapshot: ArcSwap::from_pointee(Snapshot { values }),
			deploy_instant: std::time::Instant::now(),
		}
	}

	#[cfg(test)]
	pub fn empty() -> Self {
		Config {
			snapshot: ArcSwap::from_pointee(Snapshot::default()),
			deploy_instant: std::time::Instant::now(),
		}
	}

	/// Test helper: build a config whose deploy instant is already
	/// `elapsed` in the past, so window-expiry logic can be tested without
	/// sleeping.
	#[cfg(test)]
	pub fn empty_deployed(elapsed: std::time::Duration) -> Self {
		Config {
			snapshot: ArcSwap::from_pointee(Snapshot::default()),
			deploy_instant: std::time::Instant::now()
				.checked_sub(elapsed)
				.expect("elapsed duration too large"),
		}
	}

	/// Raw string lookup; `None` if absent (the caller applies a typed default).
	pub fn get_raw(&self, key: &str) -> Option<String> {
		self.snapshot.load().values.get(key).cloned()
	}

	/// Last-writer-wins set of a single key.
	pub fn set_raw(&self, key: &str, value: String) {
		let current = self.snapshot.load();
		let mut values = current.values.clone();
		values.insert(key.to_string(), value);
		self.snapshot.store(Arc::new(Snapshot { values }));
	}

	pub fn jwt_secret(&self) -> Option<String> {
		self.get_raw("JWT_SECRET").filter(|s| !s.is_empty())
	}

	pub fn is_configured(&self) -> bool {
		self.jwt_secret().is_some()
	}

	pub fn log_enabled(&self) -> bool {
		self
			.get_raw("LOG_ENABLED")
			.map(|v| v != "false" && v != "0")
			.unwrap_or(true)
	}

	pub fn log_sink_id(&self) -> Option<String> {
		self.get_raw("LOG_SINK_ID")
	}

	pub fn log_max_rows(&self) -> usize {
		self
			.get_raw("LOG_MAX_ROWS")
			.and_then(|v| v.parse().ok())
			.unwrap_or(5000)
	}

	pub fn ip_allowlist(&self) -> Vec<String> {
		self
			.get_raw("IP_ALLOWLIST")
			.map(|v| {
				v.split(',')
					.map(|s| s.trim().to_string())
					.filter(|s| !s.is_empty())
					.collect()
			})
			.unwrap_or_default()
	}

	pub fn ip_check_enabled(&self) -> bool {
		self
			.get_raw("IP_CHECK_ENABLED")
			.map(|v| v == "true" || v == "1")
			.unwrap_or(false)
	}

	pub fn ip_check_api_key(&self) -> Option<String> {
		self.get_raw("IP_CHECK_API_KEY").filter(|s| !s.is_empty())
	}

	pub fn ip_check_threshold(&self) -> i64 {
		self
			.get_raw("IP_CHECK_THRESHOLD")
			.and_then(|v| v.parse().ok())
			.unwrap_or(50)
	}

	pub fn security_blocked_senders(&self) -> Vec<String> {
		self
			.get_raw("SECURITY_BLOCKED_SENDERS")
			.map(|v| {
				v.split(',')
					.map(|s| s.trim().to_lowercase())
					.filter(|s| !s.is_empty())
					.collect()
			})
			.unwrap_or_else(default_blocked_senders)
	}

	pub fn security_content_regex(&self) -> String {
		self
			.get_raw("SECURITY_CONTENT_REGEX")
			.unwrap_or_else(default_content_regex)
	}

	/// Wall-clock-independent elapsed time since this process observed
	/// startup. Used by the init-window protocol so a backwards clock
	/// adjustment cannot reopen the window (spec §9 Open Question).
	pub fn elapsed_since_deploy(&self) -> std::time::Duration {
		self.deploy_instant.elapsed()
	}

	/// Snapshot of every known key (explicit value, or its typed default
	/// rendered as a string when absent), with sensitive values redacted.
	/// Suitable for `config.get` and nothing else.
	pub fn dump_redacted(&self) -> HashMap<String, String> {
		let snapshot = self.snapshot.load();
		KNOWN_KEYS
			.iter()
			.map(|k| {
				let value = match snapshot.values.get(*k) {
					Some(v) => redact(k, v),
					None => self.default_display(k),
				};
				(k.to_string(), value)
			})
			.collect()
	}

	fn default_display(&self, key: &str) -> String {
		match key {
			"LOG_ENABLED" => self.log_enabled().to_string(),
			"LOG_MAX_ROWS" => self.log_max_rows().to_string(),
			"IP_CHECK_ENABLED" => self.ip_check_enabled().to_string(),
			"IP_CHECK_THRESHOLD" => self.ip_check_threshold().to_string(),
			"JWT_SECRET" | "LOG_SINK_ID" | "IP_CHECK_API_KEY" | "IP_ALLOWLIST" => String::new(),
			"SECURITY_BLOCKED_SENDERS" => self.security_blocked_senders().join(","),
			"SECURITY_CONTENT_REGEX" => self.security_content_regex(),
			_ => String::new(),
		}
	}
}

fn redact(key: &str, value: &str) -> String {
	if SENSITIVE_KEYS.contains(&key) {
		let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
		format!("{MASK}{tail}")
	} else {
		value.to_string()
	}
}

const KNOWN_KEYS: &[&str] = &[
	"JWT_SECRET",
	"LOG_ENABLED",
	"LOG_SINK_ID",
	"LOG_MAX_ROWS",
	"IP_ALLOWLIST",
	"IP_CHECK_ENABLED",
	"IP_CHECK_API_KEY",
	"IP_CHECK_THRESHOLD",
	"SECURITY_BLOCKED_SENDERS",
	"SECURITY_CONTENT_REGEX",
];

fn default_blocked_senders() -> Vec<String> {
	[
		"no-reply@accounts.google.com",
		"noreply@accountprotection.microsoft.com",
		"account-security-noreply@accountprotection.microsoft.com",
		"security@",
		"noreply@github.com",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}

fn default_content_regex() -> String {
	r"(?i)(verification code|one.?time (passcode|password)|\botp\b|password reset|reset your password|security code|recovery code|confirm your identity|account recovery)".to_string()
}
