//! Wire types shared by every phase of the pipeline: the request/response
//! envelopes and the closed set of error kinds (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Request body accepted by the single POST endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
	pub jwt: Option<String>,
	pub service: Option<Value>,
	pub action: Option<Value>,
	#[serde(default)]
	pub params: HashMap<String, Value>,
	#[serde(rename = "clientIp")]
	pub client_ip: Option<String>,
}

/// Uniform response shape for both success and failure.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
	pub ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorBody>,
	#[serde(rename = "requestId")]
	pub request_id: String,
}

impl ResponseEnvelope {
	pub fn ok(request_id: impl Into<String>, data: Value) -> Self {
		ResponseEnvelope {
			ok: true,
			data: Some(data),
			error: None,
			request_id: request_id.into(),
		}
	}

	pub fn err(request_id: impl Into<String>, error: GatewayOutcome) -> Self {
		ResponseEnvelope {
			ok: false,
			data: None,
			error: Some(ErrorBody {
				code: error.kind,
				message: error.message,
				retryable: error.retryable,
			}),
			request_id: request_id.into(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
	pub code: ErrorKind,
	pub message: String,
	pub retryable: bool,
}

/// The closed set of wire-visible error kinds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
	#[serde(rename = "INVALID_REQUEST")]
	InvalidRequest,
	#[serde(rename = "AUTH_FAILED")]
	AuthFailed,
	#[serde(rename = "IP_BLOCKED")]
	IpBlocked,
	#[serde(rename = "FORBIDDEN")]
	Forbidden,
	#[serde(rename = "NOT_FOUND")]
	NotFound,
	#[serde(rename = "QUOTA_EXCEEDED")]
	QuotaExceeded,
	#[serde(rename = "TIMEOUT")]
	Timeout,
	#[serde(rename = "SERVICE_ERROR")]
	ServiceError,
	#[serde(rename = "INIT_REJECTED")]
	InitRejected,
	#[serde(rename = "INIT_EXPIRED")]
	InitExpired,
}

impl ErrorKind {
	/// Default retryability for this kind, per spec §3. Call sites may
	/// override per-occurrence; this is the fallback used by `GatewayOutcome::new`.
	pub fn default_retryable(self) -> bool {
		matches!(
			self,
			ErrorKind::QuotaExceeded | ErrorKind::ServiceError | ErrorKind::Timeout
		)
	}

	/// Fixed, per-kind description for the audit row's `errorMessage` column.
	/// A [`GatewayOutcome::message`] may quote caller-supplied `params` (a
	/// message id, a service name) and is safe to echo back to the caller in
	/// the response envelope, but the audit row must never carry anything
	/// derived from `params` (spec §3, §8 "No-leak audit"). Using this fixed
	/// string instead of `message` on the audit path holds that invariant
	/// regardless of what a given handler chose to put in its own message.
	pub fn audit_message(self) -> &'static str {
		match self {
			ErrorKind::InvalidRequest => "invalid request",
			ErrorKind::AuthFailed => "authentication failed",
			ErrorKind::IpBlocked => "ip blocked",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::NotFound => "not found",
			ErrorKind::QuotaExceeded => "quota exceeded",
			ErrorKind::Timeout => "request exceeded the soft deadline",
			ErrorKind::ServiceError => "service error",
			ErrorKind::InitRejected => "init rejected",
			ErrorKind::InitExpired => "init window expired",
		}
	}
}

/// An error outcome on its way to becoming a [`ResponseEnvelope`] and an
/// audit row. Carries a human-readable message; never holds request params.
/// Per-request context threaded down to handlers that need to write their
/// own audit entries (the mail content-filter interceptor, §4.4) in
/// addition to the one the pipeline writes for the request as a whole.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub request_id: String,
	pub client_ip: String,
}

#[derive(Debug, Clone)]
pub struct GatewayOutcome {
	pub kind: ErrorKind,
	pub message: String,
	pub retryable: bool,
}

impl GatewayOutcome {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		let retryable = kind.default_retryable();
		GatewayOutcome {
			kind,
			message: message.into(),
			retryable,
		}
	}

	pub fn with_retryable(mut self, retryable: bool) -> Self {
		self.retryable = retryable;
		self
	}
}

impl std::fmt::Display for GatewayOutcome {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for GatewayOutcome {}
