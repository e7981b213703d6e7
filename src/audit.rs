//! Audit log (spec §4.5): a bounded rolling sink with concurrent-writer
//! safety and a content-redaction invariant.
//!
//! The sink abstraction follows agentgateway's pattern of a small `Sync +
//! Send` trait owned behind an `Arc` (e.g. `ConfigDumpHandler` /
//! `AdminFallback` in `management/admin.rs`) so the concrete backing store
//! — file, database, whatever `LOG_SINK_ID` names — stays outside the
//! core, exactly as spec §6's "Audit sink contract" requires.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Bound on how long a writer will wait for the advisory lock before the
/// entry is dropped silently (spec §4.5 Concurrency, §5 Suspension points).
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
	Ok,
	AuthFailed,
	IpBlocked,
	Blocked,
	Error,
	Timeout,
}

impl fmt::Display for AuditStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = serde_json::to_value(self).unwrap();
		write!(f, "{}", s.as_str().unwrap())
	}
}

/// Fixed eight-column schema (spec §3 Audit entry). No field derived from
/// `params` or handler result bodies is ever admitted here — this struct's
/// field list *is* the redaction invariant; widening it is a policy violation.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
	pub timestamp: DateTime<Utc>,
	#[serde(rename = "requestId")]
	pub request_id: String,
	#[serde(rename = "clientIpReported")]
	pub client_ip_reported: String,
	pub service: String,
	pub action: String,
	pub status: AuditStatus,
	#[serde(rename = "durationMs")]
	pub duration_ms: i64,
	#[serde(rename = "errorMessage")]
	pub error_message: Option<String>,
}

/// An append-only tabular store keyed by an opaque sink id (spec §6).
/// `row_count`/`trim_oldest`/`clear` model the range-delete and row-count
/// operations spec §6 requires of the concrete backing store.
pub trait AuditSink: Send + Sync {
	fn append_row(&self, row: &AuditRow);
	fn row_count(&self) -> usize;
	fn trim_oldest(&self, excess: usize);
	fn clear(&self);
	fn rows(&self) -> Vec<AuditRow>;
}

/// Default in-process sink: a `Vec` behind a mutex. Used whenever
/// `LOG_SINK_ID` names no external store, and throughout the test suite.
#[derive(Default)]
pub struct MemorySink {
	rows: Mutex<Vec<AuditRow>>,
}

impl AuditSink for MemorySink {
	fn append_row(&self, row: &AuditRow) {
		self.rows.lock().push(row.clone());
	}

	fn row_count(&self) -> usize {
		self.rows.lock().len()
	}

	fn trim_oldest(&self, excess: usize) {
		let mut rows = self.rows.lock();
		let drop_n = excess.min(rows.len());
		rows.drain(0..drop_n);
	}

	fn clear(&self) {
		self.rows.lock().clear();
	}

	fn rows(&self) -> Vec<AuditRow> {
		self.rows.lock().clone()
	}
}

/// File-backed sink: one JSON object per line (JSONL), rewritten in full on
/// trim since JSONL has no in-place range delete. Adequate at the bound of
/// a few thousand rows spec §3 allows by default.
pub struct FileSink {
	path: PathBuf,
	rows: Mutex<Vec<AuditRow>>,
}

impl FileSink {
	pub fn new(path: PathBuf) -> anyhow::Result<Self> {
		let rows = if path.exists() {
			let contents = fs_err::read_to_string(&path)?;
			contents
				.lines()
				.filter(|l| !l.is_empty())
				.filter_map(|l| serde_json::from_str(l).ok())
				.collect()
		} else {
			Vec::new()
		};
		Ok(FileSink {
			path,
			rows: Mutex::new(rows),
		})
	}

	fn flush(&self, rows: &[AuditRow]) {
		let mut file = match fs_err::File::create(&self.path) {
			Ok(f) => f,
			Err(e) => {
				tracing::warn!(error = %e, "audit sink failed to open backing file, entry dropped");
				return;
			},
		};
		for row in rows {
			if let Ok(line) = serde_json::to_string(row) {
				let _ = writeln!(file, "{line}");
			}
		}
	}
}

impl AuditSink for FileSink {
	fn append_row(&self, row: &AuditRow) {
		let mut rows = self.rows.lock();
		rows.push(row.clone());
		self.flush(&rows);
	}

	fn row_count(&self) -> usize {
		self.rows.lock().len()
	}

	fn trim_oldest(&self, excess: usize) {
		let mut rows = self.rows.lock();
		let drop_n = excess.min(rows.len());
		rows.drain(0..drop_n);
		self.flush(&rows);
	}

	fn clear(&self) {
		let mut rows = self.rows.lock();
		rows.clear();
		self.flush(&rows);
	}

	fn rows(&self) -> Vec<AuditRow> {
		self.rows.lock().clone()
	}
}

/// Facade the pipeline writes through. Owns the process-wide advisory lock
/// (spec §4.5 Concurrency); the sink itself may have its own internal
/// locking, but every caller serializes through here first.
pub struct AuditLog {
	sink: Arc<dyn AuditSink>,
	write_lock: Mutex<()>,
	max_rows: usize,
	enabled: bool,
}

impl AuditLog {
	pub fn new(sink: Arc<dyn AuditSink>, max_rows: usize, enabled: bool) -> Self {
		AuditLog {
			sink,
			write_lock: Mutex::new(()),
			max_rows,
			enabled,
		}
	}

	/// Append one entry. Never throws (spec §4.5): on lock timeout or sink
	/// failure the entry is dropped and a warning is traced, but the
	/// caller's response is never delayed or failed on its account.
	pub fn append(&self, row: AuditRow) {
		if !self.enabled {
			return;
		}
		let Some(_guard) = self.write_lock.try_lock_for(LOCK_TIMEOUT) else {
			tracing::warn!("audit lock acquisition timed out, dropping entry");
			return;
		};
		self.sink.append_row(&row);
		let total = self.sink.row_count();
		if total > self.max_rows {
			self.sink.trim_oldest(total - self.max_rows);
		}
	}

	pub fn row_count(&self) -> usize {
		self.sink.row_count()
	}

	pub fn clear(&self) {
		self.sink.clear();
	}

	pub fn rows(&self) -> Vec<AuditRow> {
		self.sink.rows()
	}
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
