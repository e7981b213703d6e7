//! HTTP front door (spec §4.7): the single endpoint, the health probe, and
//! the pipeline that strings every other module together in the order
//! drawn in spec §2's diagram.
//!
//! Grounded in agentgateway's `management/admin.rs`, which layers a small
//! `axum` `Router` with shared state over a `hyper`/`tower` server; this
//! front door is smaller (one route, one state struct) but follows the same
//! shape: a `Router::with_state` built once in `main`, handlers that borrow
//! the state via `axum::extract::State`.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{AuditLog, AuditRow, AuditStatus};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::envelope::{ErrorKind, GatewayOutcome, RequestContext, RequestEnvelope, ResponseEnvelope};
use crate::init_window;
use crate::ipallow::IpPolicy;
use crate::token::{ReplaySet, Verifier};

/// Soft deadline, chosen to precede a 360s hard platform cap (spec §4.7).
const WATCHDOG: Duration = Duration::from_secs(330);

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub replay: Arc<ReplaySet>,
	pub http: Arc<reqwest::Client>,
	pub dispatcher: Arc<Dispatcher>,
	pub audit: Arc<AuditLog>,
}

pub fn router(state: AppState) -> Router {
	Router::new().route("/", get(health_probe).post(handle_request)).with_state(state)
}

async fn health_probe(State(state): State<AppState>) -> impl IntoResponse {
	let request_id = new_request_id();
	let data = serde_json::json!({
		"status": "healthy",
		"timestamp": chrono::Utc::now(),
		"version": crate::handlers::admin::VERSION,
		"configured": state.config.is_configured(),
	});
	Json(ResponseEnvelope::ok(request_id, data))
}

async fn handle_request(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
	let request_id = new_request_id();
	let started = Instant::now();

	let envelope: RequestEnvelope = match serde_json::from_slice(&body) {
		Ok(e) => e,
		Err(e) => {
			let outcome = GatewayOutcome::new(ErrorKind::InvalidRequest, format!("malformed request body: {e}"));
			write_audit(
				&state.audit,
				&request_id,
				"unknown",
				"unknown",
				"unknown",
				AuditStatus::Error,
				started,
				Some(outcome.kind.audit_message()),
			);
			return respond(request_id, Err(outcome));
		},
	};

	let client_ip = envelope.client_ip.clone().unwrap_or_else(|| "unknown".to_string());
	let service = display_value(envelope.service.as_ref());
	let action = display_value(envelope.action.as_ref());

	let pipeline = run_pipeline(&state, &envelope, &request_id, &client_ip);
	let result = match tokio::time::timeout(WATCHDOG, pipeline).await {
		Ok(result) => result,
		Err(_) => Err(GatewayOutcome::new(ErrorKind::Timeout, "request exceeded the soft deadline").with_retryable(true)),
	};

	let status = match &result {
		Ok(_) => AuditStatus::Ok,
		Err(outcome) => audit_status_for(outcome.kind),
	};
	write_audit(
		&state.audit,
		&request_id,
		&client_ip,
		&service,
		&action,
		status,
		started,
		result.as_ref().err().map(|o| o.kind.audit_message()),
	);

	respond(request_id, result)
}

/// Steps 2-6 of spec §2's diagram: init short-circuit, verify, IP policy,
/// dispatch. Split out from `handle_request` so the watchdog in §4.7 can
/// wrap exactly this span without also timing out JSON parsing.
async fn run_pipeline(
	state: &AppState,
	envelope: &RequestEnvelope,
	request_id: &str,
	client_ip: &str,
) -> Result<serde_json::Value, GatewayOutcome> {
	let service = as_str(envelope.service.as_ref())
		.ok_or_else(|| GatewayOutcome::new(ErrorKind::InvalidRequest, "missing or non-string `service`"))?;
	let action = as_str(envelope.action.as_ref())
		.ok_or_else(|| GatewayOutcome::new(ErrorKind::InvalidRequest, "missing or non-string `action`"))?;

	if init_window::is_init_request(&service, &action) {
		let secret = envelope.params.get("secret").and_then(|v| v.as_str());
		init_window::set_secret(&state.config, secret)?;
		return Ok(serde_json::json!({"initialized": true}));
	}

	let Some(secret) = state.config.jwt_secret() else {
		return Err(GatewayOutcome::new(ErrorKind::AuthFailed, "proxy has no configured secret"));
	};
	let Some(token) = envelope.jwt.as_deref() else {
		return Err(GatewayOutcome::new(ErrorKind::AuthFailed, "missing jwt"));
	};
	let now_sec = chrono::Utc::now().timestamp();
	Verifier::new(&secret, &state.replay)
		.verify(token, now_sec)
		.map_err(|e| GatewayOutcome::new(ErrorKind::AuthFailed, e.to_string()))?;

	IpPolicy::new(&state.config, &state.http).check(client_ip).await?;

	let ctx = RequestContext {
		request_id: request_id.to_string(),
		client_ip: client_ip.to_string(),
	};
	state
		.dispatcher
		.dispatch(&ctx, envelope.service.as_ref(), envelope.action.as_ref(), &envelope.params)
		.await
}

fn respond(request_id: String, result: Result<serde_json::Value, GatewayOutcome>) -> impl IntoResponse {
	let body = match result {
		Ok(data) => ResponseEnvelope::ok(request_id, data),
		Err(outcome) => ResponseEnvelope::err(request_id, outcome),
	};
	(StatusCode::OK, Json(body))
}

fn audit_status_for(kind: ErrorKind) -> AuditStatus {
	match kind {
		ErrorKind::AuthFailed => AuditStatus::AuthFailed,
		ErrorKind::IpBlocked => AuditStatus::IpBlocked,
		ErrorKind::Timeout => AuditStatus::Timeout,
		ErrorKind::Forbidden
		| ErrorKind::NotFound
		| ErrorKind::QuotaExceeded
		| ErrorKind::ServiceError
		| ErrorKind::InvalidRequest
		| ErrorKind::InitRejected
		| ErrorKind::InitExpired => AuditStatus::Error,
	}
}

#[allow(clippy::too_many_arguments)]
fn write_audit(
	audit: &AuditLog,
	request_id: &str,
	client_ip: &str,
	service: &str,
	action: &str,
	status: AuditStatus,
	started: Instant,
	error_message: Option<&str>,
) {
	audit.append(AuditRow {
		timestamp: chrono::Utc::now(),
		request_id: request_id.to_string(),
		client_ip_reported: client_ip.to_string(),
		service: service.to_string(),
		action: action.to_string(),
		status,
		duration_ms: started.elapsed().as_millis() as i64,
		error_message: error_message.map(str::to_string),
	});
}

fn new_request_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

fn as_str(value: Option<&serde_json::Value>) -> Option<String> {
	match value {
		Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
		_ => None,
	}
}

fn display_value(value: Option<&serde_json::Value>) -> String {
	match value {
		Some(serde_json::Value::String(s)) => s.clone(),
		Some(other) => other.to_string(),
		None => "unknown".to_string(),
	}
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
