//! Dispatcher & error taxonomy (spec §4.3): a static registry mapping
//! `service -> handler`, centralizing parameter validation and the
//! exception-to-envelope mapping so handlers stay focused on upstream
//! adapter logic.
//!
//! `ServiceHandler` plays the role agentgateway's `ConfigDumpHandler` /
//! `AdminFallback` traits play in `management/admin.rs`: a small
//! `Send + Sync` trait object registered once at startup, invoked by name.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::envelope::{ErrorKind, GatewayOutcome, RequestContext};

/// A registered upstream adapter: `(action, params) -> data`. Handlers are
/// an open set (spec §1 Non-goals) — this crate ships one illustrative
/// implementation (`mail`, in `filters::mail`) plus the in-scope `admin`
/// surface (`handlers::admin`).
#[async_trait]
pub trait ServiceHandler: Send + Sync {
	async fn handle(
		&self,
		ctx: &RequestContext,
		action: &str,
		params: &HashMap<String, Value>,
	) -> anyhow::Result<Value>;
}

#[derive(Default)]
pub struct Registry {
	handlers: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl Registry {
	pub fn new() -> Self {
		Registry::default()
	}

	/// Handlers register by service key during startup; the registry is
	/// read-only after that (spec §9 Design Notes: "initialize-once registry").
	pub fn register(&mut self, service: impl Into<String>, handler: Arc<dyn ServiceHandler>) {
		self.handlers.insert(service.into().to_lowercase(), handler);
	}

	pub fn contains(&self, service: &str) -> bool {
		self.handlers.contains_key(&service.to_lowercase())
	}
}

pub struct Dispatcher {
	registry: Registry,
}

impl Dispatcher {
	pub fn new(registry: Registry) -> Self {
		Dispatcher { registry }
	}

	/// Full dispatch per spec §4.3 steps 1-3: validate shape, resolve, invoke
	/// inside a trap. Returns the handler's success data, or a [`GatewayOutcome`]
	/// already mapped onto the closed error taxonomy.
	pub async fn dispatch(
		&self,
		ctx: &RequestContext,
		service_raw: Option<&Value>,
		action_raw: Option<&Value>,
		params: &HashMap<String, Value>,
	) -> Result<Value, GatewayOutcome> {
		let service = as_nonempty_str(service_raw)
			.ok_or_else(|| GatewayOutcome::new(ErrorKind::InvalidRequest, "missing or non-string `service`"))?;
		let action = as_nonempty_str(action_raw)
			.ok_or_else(|| GatewayOutcome::new(ErrorKind::InvalidRequest, "missing or non-string `action`"))?;

		let handler = self
			.registry
			.handlers
			.get(&service.to_lowercase())
			.cloned()
			.ok_or_else(|| GatewayOutcome::new(ErrorKind::NotFound, format!("unknown service: {service}")))?;

		let invocation = AssertUnwindSafe(handler.handle(ctx, action.as_str(), params));
		match futures::FutureExt::catch_unwind(invocation).await {
			Ok(Ok(data)) => Ok(data),
			// A handler (or a built-in interceptor wrapping one, e.g. the mail
			// content filter) may already carry a precise outcome; pass it
			// through rather than flattening it into SERVICE_ERROR.
			Ok(Err(cause)) => match cause.downcast::<GatewayOutcome>() {
				Ok(outcome) => Err(outcome),
				Err(cause) => Err(map_handler_error(&service, &action, &cause.to_string())),
			},
			Err(_) => Err(map_handler_error(&service, &action, "handler panicked")),
		}
	}
}

fn map_handler_error(service: &str, action: &str, cause: &str) -> GatewayOutcome {
	if cause.to_lowercase().contains("quota") {
		return GatewayOutcome::new(ErrorKind::QuotaExceeded, cause.to_string());
	}
	GatewayOutcome::new(
		ErrorKind::ServiceError,
		format!("{service}.{action} failed: {cause}"),
	)
}

fn as_nonempty_str(value: Option<&Value>) -> Option<String> {
	match value {
		Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
		_ => None,
	}
}

/// Shared validation primitive: missing/empty required keys map to
/// `INVALID_REQUEST` (spec §4.3 "Parameter validation primitive").
pub fn require_keys(params: &HashMap<String, Value>, required: &[&str]) -> Result<(), GatewayOutcome> {
	for key in required {
		match params.get(*key) {
			Some(Value::String(s)) if s.is_empty() => {
				return Err(GatewayOutcome::new(
					ErrorKind::InvalidRequest,
					format!("missing or empty required param: {key}"),
				));
			},
			Some(Value::Null) | None => {
				return Err(GatewayOutcome::new(
					ErrorKind::InvalidRequest,
					format!("missing or empty required param: {key}"),
				));
			},
			_ => {},
		}
	}
	Ok(())
}

/// Clamp an optional positive integer param into `[1, max]`, defaulting
/// when absent (spec §4.3 "Parameter validation primitive").
pub fn clamp_positive_int(params: &HashMap<String, Value>, key: &str, default: i64, max: i64) -> i64 {
	let value = params.get(key).and_then(Value::as_i64).unwrap_or(default);
	value.clamp(1, max)
}

/// Carry a precise [`GatewayOutcome`] through the `anyhow::Result` boundary
/// handlers speak; the dispatcher recovers it via downcast instead of
/// flattening it into a generic `SERVICE_ERROR`.
pub fn into_anyhow(outcome: GatewayOutcome) -> anyhow::Error {
	anyhow::Error::new(outcome)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
