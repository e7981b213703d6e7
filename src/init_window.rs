//! Init-window protocol (spec §4.6): a time-limited unauthenticated channel
//! for one-time secret injection immediately after deploy.

use crate::config::Config;
use crate::envelope::{ErrorKind, GatewayOutcome};

/// How long after deploy the `_init.setSecret` call is accepted (spec §4.6 step 2).
const INIT_WINDOW: std::time::Duration = std::time::Duration::from_secs(5 * 60);
/// Minimum acceptable secret length (spec §4.6 step 3).
const MIN_SECRET_LEN: usize = 32;

pub const INIT_SERVICE: &str = "_init";
pub const SET_SECRET_ACTION: &str = "setSecret";

/// `true` iff `(service, action)` names the reserved bootstrap pseudo-service.
/// The front door short-circuits auth/IP-check for exactly this pair
/// (spec §2, §4.6 "the init path bypasses only auth and IP check").
pub fn is_init_request(service: &str, action: &str) -> bool {
	service == INIT_SERVICE && action == SET_SECRET_ACTION
}

/// Attempt to set the shared secret via the bootstrap channel.
pub fn set_secret(config: &Config, secret: Option<&str>) -> Result<(), GatewayOutcome> {
	if config.is_configured() {
		return Err(GatewayOutcome::new(
			ErrorKind::InitRejected,
			"proxy is already configured",
		));
	}
	if config.elapsed_since_deploy() > INIT_WINDOW {
		return Err(GatewayOutcome::new(
			ErrorKind::InitExpired,
			"init window has closed",
		));
	}
	let Some(secret) = secret else {
		return Err(GatewayOutcome::new(ErrorKind::InitRejected, "missing secret"));
	};
	if secret.len() < MIN_SECRET_LEN {
		return Err(GatewayOutcome::new(
			ErrorKind::InitRejected,
			format!("secret must be at least {MIN_SECRET_LEN} characters"),
		));
	}
	config.set_raw("JWT_SECRET", secret.to_string());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_when_already_configured() {
		let cfg = Config::empty();
		cfg.set_raw("JWT_SECRET", "x".repeat(32));
		let err = set_secret(&cfg, Some(&"y".repeat(32))).unwrap_err();
		assert_eq!(err.kind, ErrorKind::InitRejected);
	}

	#[test]
	fn rejects_short_secrets() {
		let cfg = Config::empty();
		let err = set_secret(&cfg, Some("too-short")).unwrap_err();
		assert_eq!(err.kind, ErrorKind::InitRejected);
	}

	#[test]
	fn rejects_missing_secret() {
		let cfg = Config::empty();
		let err = set_secret(&cfg, None).unwrap_err();
		assert_eq!(err.kind, ErrorKind::InitRejected);
	}

	#[test]
	fn accepts_valid_secret_within_window() {
		let cfg = Config::empty();
		assert!(set_secret(&cfg, Some(&"a".repeat(40))).is_ok());
		assert!(cfg.is_configured());
	}

	#[test]
	fn second_call_after_success_is_rejected() {
		let cfg = Config::empty();
		assert!(set_secret(&cfg, Some(&"a".repeat(40))).is_ok());
		let err = set_secret(&cfg, Some(&"b".repeat(40))).unwrap_err();
		assert_eq!(err.kind, ErrorKind::InitRejected);
	}

	#[test]
	fn rejects_after_window_closes() {
		let cfg = Config::empty_deployed(std::time::Duration::from_secs(301));
		let err = set_secret(&cfg, Some(&"a".repeat(40))).unwrap_err();
		assert_eq!(err.kind, ErrorKind::InitExpired);
	}

	#[test]
	fn accepts_right_up_to_the_window_edge() {
		let cfg = Config::empty_deployed(std::time::Duration::from_secs(299));
		assert!(set_secret(&cfg, Some(&"a".repeat(40))).is_ok());
	}

	#[test]
	fn is_init_request_matches_only_the_reserved_pair() {
		assert!(is_init_request("_init", "setSecret"));
		assert!(!is_init_request("_init", "other"));
		assert!(!is_init_request("admin", "setSecret"));
	}
}
