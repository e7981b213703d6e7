//! Content-filter interceptor for the mail domain (spec §4.4).
//!
//! Wraps one illustrative upstream adapter (an in-memory fake mailbox,
//! standing in for the out-of-scope real Mail API per spec §1) the same
//! way agentgateway wraps a backend with a policy (compare
//! `http/ipallowlist.rs`'s `apply()`, which runs before the backend is
//! ever reached): classification and enforcement happen here, not inside
//! the upstream adapter, so the adapter can never be asked to bypass it.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::{AuditLog, AuditRow, AuditStatus};
use crate::dispatch::{ServiceHandler, require_keys};
use crate::envelope::{ErrorKind, GatewayOutcome, RequestContext};

#[derive(Debug, Clone)]
pub struct Message {
	pub id: String,
	pub thread_id: String,
	pub sender: String,
	pub subject: String,
	pub body: String,
	pub labels: Vec<String>,
}

impl Message {
	fn to_json(&self) -> Value {
		json!({
			"id": self.id,
			"threadId": self.thread_id,
			"sender": self.sender,
			"subject": self.subject,
			"labels": self.labels,
		})
	}
}

/// Classifies messages as security-sensitive per spec §4.4.
pub struct ContentFilter {
	blocked_senders: Vec<String>,
	content_regex: Option<Regex>,
}

impl ContentFilter {
	pub fn new(blocked_senders: Vec<String>, content_regex_src: &str) -> Self {
		let content_regex = Regex::new(content_regex_src)
			.map_err(|e| tracing::warn!(error = %e, "invalid SECURITY_CONTENT_REGEX, content matching disabled"))
			.ok();
		ContentFilter {
			blocked_senders,
			content_regex,
		}
	}

	pub fn is_sensitive(&self, msg: &Message) -> bool {
		let sender_lower = msg.sender.to_lowercase();
		if self
			.blocked_senders
			.iter()
			.any(|blocked| sender_lower.contains(blocked.as_str()))
		{
			return true;
		}
		if let Some(re) = &self.content_regex {
			if re.is_match(&msg.subject) {
				return true;
			}
			let body_prefix: String = msg.body.chars().take(500).collect();
			if re.is_match(&body_prefix) {
				return true;
			}
		}
		false
	}

	/// A thread is sensitive if any of its messages is (spec §4.4).
	pub fn is_thread_sensitive(&self, messages: &[&Message]) -> bool {
		messages.iter().any(|m| self.is_sensitive(m))
	}
}

/// The out-of-scope real adapter stub: an in-memory mailbox.
#[derive(Default)]
pub struct FakeMailbox {
	messages: Mutex<Vec<Message>>,
}

impl FakeMailbox {
	pub fn new(messages: Vec<Message>) -> Self {
		FakeMailbox {
			messages: Mutex::new(messages),
		}
	}

	fn list(&self) -> Vec<Message> {
		self.messages.lock().clone()
	}

	fn get(&self, id: &str) -> Option<Message> {
		self.messages.lock().iter().find(|m| m.id == id).cloned()
	}

	fn apply_label(&self, id: &str, label: &str) -> bool {
		let mut messages = self.messages.lock();
		if let Some(msg) = messages.iter_mut().find(|m| m.id == id) {
			if !msg.labels.contains(&label.to_string()) {
				msg.labels.push(label.to_string());
			}
			true
		} else {
			false
		}
	}
}

pub struct MailHandler {
	mailbox: Arc<FakeMailbox>,
	config: Arc<crate::config::Config>,
	audit: Arc<AuditLog>,
}

impl MailHandler {
	pub fn new(mailbox: Arc<FakeMailbox>, config: Arc<crate::config::Config>, audit: Arc<AuditLog>) -> Self {
		MailHandler {
			mailbox,
			config,
			audit,
		}
	}

	fn filter(&self) -> ContentFilter {
		ContentFilter::new(
			self.config.security_blocked_senders(),
			&self.config.security_content_regex(),
		)
	}

	fn record_intercept(&self, ctx: &RequestContext, origin_action: &str, message_id: &str) {
		self.audit.append(AuditRow {
			timestamp: chrono::Utc::now(),
			request_id: ctx.request_id.clone(),
			client_ip_reported: ctx.client_ip.clone(),
			service: "mail".to_string(),
			action: format!("security_intercept:{origin_action}"),
			status: AuditStatus::Blocked,
			duration_ms: 0,
			error_message: Some(format!("message {message_id} withheld by content policy")),
		});
	}
}

#[async_trait]
impl ServiceHandler for MailHandler {
	async fn handle(
		&self,
		ctx: &RequestContext,
		action: &str,
		params: &HashMap<String, Value>,
	) -> anyhow::Result<Value> {
		let filter = self.filter();
		match action {
			"list" | "search" => {
				let all = self.mailbox.list();
				let mut visible = Vec::new();
				for msg in &all {
					if filter.is_sensitive(msg) {
						self.record_intercept(ctx, action, &msg.id);
					} else {
						visible.push(msg.to_json());
					}
				}
				Ok(json!({"items": visible, "count": visible.len()}))
			},
			"get" | "read" => {
				require_keys(params, &["id"]).map_err(outcome_to_anyhow)?;
				let id = params.get("id").and_then(Value::as_str).unwrap_or_default();
				let Some(msg) = self.mailbox.get(id) else {
					return Err(outcome_to_anyhow(GatewayOutcome::new(
						ErrorKind::NotFound,
						format!("no such message: {id}"),
					)));
				};
				if filter.is_sensitive(&msg) {
					self.record_intercept(ctx, action, &msg.id);
					return Err(outcome_to_anyhow(GatewayOutcome::new(
						ErrorKind::Forbidden,
						"message is withheld by content policy",
					)));
				}
				Ok(msg.to_json())
			},
			"label" | "star" | "archive" | "trash" | "delete" => {
				require_keys(params, &["id"]).map_err(outcome_to_anyhow)?;
				let id = params.get("id").and_then(Value::as_str).unwrap_or_default();
				let Some(msg) = self.mailbox.get(id) else {
					return Err(outcome_to_anyhow(GatewayOutcome::new(
						ErrorKind::NotFound,
						format!("no such message: {id}"),
					)));
				};
				if filter.is_sensitive(&msg) {
					self.record_intercept(ctx, action, &msg.id);
					return Err(outcome_to_anyhow(GatewayOutcome::new(
						ErrorKind::Forbidden,
						"message is withheld by content policy",
					)));
				}
				let label = params
					.get("label")
					.and_then(Value::as_str)
					.unwrap_or(action)
					.to_string();
				self.mailbox.apply_label(id, &label);
				Ok(json!({"id": id, "labels": self.mailbox.get(id).map(|m| m.labels).unwrap_or_default()}))
			},
			other => Err(anyhow::anyhow!("unsupported mail action: {other}")),
		}
	}
}

/// Bridge a pipeline-level [`GatewayOutcome`] through the `anyhow::Result`
/// boundary handlers speak; the dispatcher recovers the original kind via
/// downcast (spec §4.3: handlers "must not report AUTH_FAILED or
/// IP_BLOCKED", but FORBIDDEN/NOT_FOUND from a built-in interceptor like
/// this one are legitimate, precise outcomes, not a generic exception).
fn outcome_to_anyhow(outcome: GatewayOutcome) -> anyhow::Error {
	anyhow::Error::new(outcome)
}

#[cfg(test)]
#[path = "mail_tests.rs"]
mod tests;
