//! Administrative handler (spec §6 "Configuration surface"): `config.get`,
//! `config.set`, `log.status`, `log.clear`, `ip.list`, `ip.add`, `ip.remove`,
//! `health`. Routed through the ordinary dispatcher like any other service —
//! these are not a separate code path, just another `ServiceHandler`
//! (mirroring agentgateway's own `management/admin.rs`, which exposes its
//! config-dump/fallback surface as small handler types rather than bespoke
//! routing).

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::config::{Config, DEPLOY_MONOTONIC_KEY};
use crate::dispatch::{ServiceHandler, into_anyhow, require_keys};
use crate::envelope::{ErrorKind, GatewayOutcome, RequestContext};

/// Version string reported by `health`. Not read from `Cargo.toml` at
/// runtime (this binary has no use for `CARGO_PKG_VERSION` beyond this one
/// field); bump by hand alongside releases.
pub const VERSION: &str = "1.0.0";

pub struct AdminHandler {
	config: Arc<Config>,
	audit: Arc<AuditLog>,
	/// Registered service names, for `health`'s `services` field. Computed
	/// once at startup from the registry build order (spec §9 "initialize-once
	/// registry") rather than threaded back through a live `Registry` handle.
	services: Vec<String>,
}

impl AdminHandler {
	pub fn new(config: Arc<Config>, audit: Arc<AuditLog>, services: Vec<String>) -> Self {
		AdminHandler {
			config,
			audit,
			services,
		}
	}

	fn config_get(&self) -> Value {
		let mut dump = self.config.dump_redacted();
		dump.remove(DEPLOY_MONOTONIC_KEY);
		json!(dump)
	}

	fn config_set(&self, params: &HashMap<String, Value>) -> anyhow::Result<Value> {
		require_keys(params, &["key", "value"]).map_err(into_anyhow)?;
		let key = params.get("key").and_then(Value::as_str).unwrap_or_default();
		if key == DEPLOY_MONOTONIC_KEY {
			return Err(into_anyhow(GatewayOutcome::new(
				ErrorKind::InvalidRequest,
				"key is internal and cannot be set",
			)));
		}
		let value = match params.get("value") {
			Some(Value::String(s)) => s.clone(),
			Some(other) => other.to_string(),
			None => unreachable!("require_keys already rejected a missing value"),
		};
		self.config.set_raw(key, value);
		Ok(json!({"key": key, "ok": true}))
	}

	fn log_status(&self) -> Value {
		json!({
			"enabled": self.config.log_enabled(),
			"rowCount": self.audit.row_count(),
			"maxRows": self.config.log_max_rows(),
		})
	}

	fn log_clear(&self) -> Value {
		self.audit.clear();
		json!({"cleared": true})
	}

	fn ip_list(&self) -> Value {
		json!({"entries": self.config.ip_allowlist()})
	}

	fn ip_add(&self, params: &HashMap<String, Value>) -> anyhow::Result<Value> {
		require_keys(params, &["entry"]).map_err(into_anyhow)?;
		let entry = params.get("entry").and_then(Value::as_str).unwrap_or_default();
		let mut entries = self.config.ip_allowlist();
		if !entries.iter().any(|e| e == entry) {
			entries.push(entry.to_string());
		}
		self.config.set_raw("IP_ALLOWLIST", entries.join(","));
		Ok(json!({"entries": entries}))
	}

	fn ip_remove(&self, params: &HashMap<String, Value>) -> anyhow::Result<Value> {
		require_keys(params, &["entry"]).map_err(into_anyhow)?;
		let entry = params.get("entry").and_then(Value::as_str).unwrap_or_default();
		let entries: Vec<String> = self
			.config
			.ip_allowlist()
			.into_iter()
			.filter(|e| e != entry)
			.collect();
		self.config.set_raw("IP_ALLOWLIST", entries.join(","));
		Ok(json!({"entries": entries}))
	}

	fn health(&self) -> Value {
		json!({
			"status": "healthy",
			"timestamp": chrono::Utc::now(),
			"version": VERSION,
			"configured": self.config.is_configured(),
			"services": self.services,
		})
	}
}

#[async_trait]
impl ServiceHandler for AdminHandler {
	async fn handle(
		&self,
		_ctx: &RequestContext,
		action: &str,
		params: &HashMap<String, Value>,
	) -> anyhow::Result<Value> {
		match action {
			"config.get" => Ok(self.config_get()),
			"config.set" => self.config_set(params),
			"log.status" => Ok(self.log_status()),
			"log.clear" => Ok(self.log_clear()),
			"ip.list" => Ok(self.ip_list()),
			"ip.add" => self.ip_add(params),
			"ip.remove" => self.ip_remove(params),
			"health" => Ok(self.health()),
			other => Err(anyhow::anyhow!("unsupported admin action: {other}")),
		}
	}
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
