//! Binary entrypoint: build the config, the registry, and the audit sink,
//! then serve the single endpoint.

use std::sync::Arc;

use opsproxy::audit::{AuditLog, FileSink, MemorySink};
use opsproxy::config::Config;
use opsproxy::dispatch::{Dispatcher, Registry};
use opsproxy::filters::mail::{FakeMailbox, MailHandler};
use opsproxy::handlers::admin::AdminHandler;
use opsproxy::http::{AppState, router};
use opsproxy::token::ReplaySet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	opsproxy::telemetry::init();

	let config = Arc::new(Config::from_env());
	if !config.is_configured() {
		tracing::warn!("JWT_SECRET is not set; only the _init.setSecret bootstrap channel will be accepted");
	}

	let sink: Arc<dyn opsproxy::audit::AuditSink> = match config.log_sink_id() {
		Some(path) => Arc::new(FileSink::new(std::path::PathBuf::from(path))?),
		None => Arc::new(MemorySink::default()),
	};
	let audit = Arc::new(AuditLog::new(sink, config.log_max_rows(), config.log_enabled()));

	// The fake mailbox stands in for the out-of-scope real Mail API (spec
	// §1); seeded empty, mutated only through the handler's own actions.
	let mailbox = Arc::new(FakeMailbox::new(Vec::new()));

	let mut registry = Registry::new();
	registry.register("mail", Arc::new(MailHandler::new(mailbox, config.clone(), audit.clone())));
	registry.register(
		"admin",
		Arc::new(AdminHandler::new(
			config.clone(),
			audit.clone(),
			vec!["admin".to_string(), "mail".to_string()],
		)),
	);
	let dispatcher = Arc::new(Dispatcher::new(registry));

	let state = AppState {
		config,
		replay: Arc::new(ReplaySet::new()),
		http: Arc::new(reqwest::Client::new()),
		dispatcher,
		audit,
	};

	let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	tracing::info!(%addr, "opsproxy listening");
	axum::serve(listener, router(state)).await?;
	Ok(())
}
