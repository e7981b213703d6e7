//! Token verifier (spec §4.1): symmetric HMAC-SHA256 bearer tokens with
//! replay protection and bounded clock skew.
//!
//! Structurally mirrors `agentgateway`'s `http/jwt.rs` (a `Jwt` type that
//! owns verification state and exposes `validate_claims`), but the MAC
//! itself is computed by hand against `hmac`+`sha2` rather than delegated
//! to `jsonwebtoken`, so that the constant-time compare and the replay
//! check (spec steps 4 and 6) are explicit, auditable code rather than
//! hidden inside a library's `decode()`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Permitted clock skew on `exp`/`iat`, in seconds (spec §4.1 step 5).
const CLOCK_SKEW_SECS: i64 = 30;
/// Upper bound on replay-set TTL regardless of the token's own `exp` (spec §4.1 step 6).
const MAX_TOKEN_LIFETIME_SECS: u64 = 300;

const ALG_HS256: &str = "HS256";
const TYP_JWT: &str = "JWT";

/// Grounded on agentgateway's own `TokenError`/`JwkError` (`http/jwt.rs`),
/// which derive `thiserror::Error` rather than hand-roll `Display`; the
/// message text here matches the phrasing spec §8 scenario 3 greps for
/// (`/replay/i`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
	#[error("malformed token: {0}")]
	Malformed(&'static str),
	#[error("unsupported algorithm")]
	UnsupportedAlg,
	#[error("unsupported token type")]
	UnsupportedTyp,
	#[error("signature mismatch")]
	SignatureMismatch,
	#[error("Token expired")]
	Expired,
	#[error("token issued in the future")]
	IssuedInFuture,
	#[error("token replay detected")]
	Replay,
	#[error("proxy has no configured secret")]
	Unconfigured,
}

/// Claims successfully verified; an opaque JSON object, per spec §3.
#[derive(Debug, Clone)]
pub struct Claims {
	pub inner: Map<String, Value>,
}

impl Claims {
	pub fn jti(&self) -> Option<&str> {
		self.inner.get("jti").and_then(Value::as_str)
	}
}

/// Short-lived `(jti -> present)` set with TTL eviction (spec §3 Replay record).
/// A plain `parking_lot::Mutex<HashMap<..>>` is sufficient here: the same
/// shared-mutex-with-bounded-hold-time approach agentgateway uses for its
/// own process-wide mutable caches (e.g. `crates/agentgateway/src/http/eviction.rs`'s
/// eviction bookkeeping), just without an external cache crate dependency.
#[derive(Default)]
pub struct ReplaySet {
	entries: Mutex<HashMap<String, Instant>>,
}

impl ReplaySet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Atomic check-and-insert. Returns `true` if `jti` was already present
	/// (a replay), inserting it with the given TTL either way so a legitimate
	/// retry of a *different* token is unaffected.
	fn check_and_insert(&self, jti: &str, ttl: Duration) -> bool {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		entries.retain(|_, expires_at| *expires_at > now);
		if let Some(expires_at) = entries.get(jti) {
			if *expires_at > now {
				return true;
			}
		}
		entries.insert(jti.to_string(), now + ttl);
		false
	}
}

pub struct Verifier<'a> {
	secret: &'a str,
	replay: &'a ReplaySet,
}

impl<'a> Verifier<'a> {
	pub fn new(secret: &'a str, replay: &'a ReplaySet) -> Self {
		Verifier { secret, replay }
	}

	/// Verify a three-segment token against `now_sec` (spec §4.1).
	pub fn verify(&self, token: &str, now_sec: i64) -> Result<Claims, VerifyError> {
		let parts: Vec<&str> = token.split('.').collect();
		let [header_b64, claims_b64, sig_b64] = parts.as_slice() else {
			return Err(VerifyError::Malformed("expected 3 dot-separated segments"));
		};

		let header_bytes = URL_SAFE_NO_PAD
			.decode(header_b64)
			.map_err(|_| VerifyError::Malformed("header is not valid base64url"))?;
		let header: Map<String, Value> = serde_json::from_slice(&header_bytes)
			.map_err(|_| VerifyError::Malformed("header is not a JSON object"))?;
		match header.get("alg").and_then(Value::as_str) {
			Some(ALG_HS256) => {},
			_ => return Err(VerifyError::UnsupportedAlg),
		}
		if let Some(typ) = header.get("typ").and_then(Value::as_str) {
			if typ != TYP_JWT {
				return Err(VerifyError::UnsupportedTyp);
			}
		}

		let signing_input = format!("{header_b64}.{claims_b64}");
		let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
			.expect("HMAC accepts a key of any length");
		mac.update(signing_input.as_bytes());
		let computed = mac.finalize().into_bytes();
		let computed_b64 = URL_SAFE_NO_PAD.encode(computed);

		if !constant_time_eq(computed_b64.as_bytes(), sig_b64.as_bytes()) {
			return Err(VerifyError::SignatureMismatch);
		}

		let claims_bytes = URL_SAFE_NO_PAD
			.decode(claims_b64)
			.map_err(|_| VerifyError::Malformed("claims is not valid base64url"))?;
		let claims_map: Map<String, Value> = serde_json::from_slice(&claims_bytes)
			.map_err(|_| VerifyError::Malformed("claims is not a JSON object"))?;

		if let Some(exp) = claims_map.get("exp").and_then(Value::as_i64) {
			if exp + CLOCK_SKEW_SECS < now_sec {
				return Err(VerifyError::Expired);
			}
		}
		if let Some(iat) = claims_map.get("iat").and_then(Value::as_i64) {
			if iat - CLOCK_SKEW_SECS > now_sec {
				return Err(VerifyError::IssuedInFuture);
			}
		}

		if let Some(jti) = claims_map.get("jti").and_then(Value::as_str) {
			let remaining = claims_map
				.get("exp")
				.and_then(Value::as_i64)
				.map(|exp| (exp - now_sec).max(0) as u64)
				.unwrap_or(MAX_TOKEN_LIFETIME_SECS)
				.min(MAX_TOKEN_LIFETIME_SECS);
			if self
				.replay
				.check_and_insert(jti, Duration::from_secs(remaining.max(1)))
			{
				return Err(VerifyError::Replay);
			}
		}

		Ok(Claims { inner: claims_map })
	}
}

/// Constant-time-w.r.t.-mismatched-bytes equality: reject immediately on
/// length mismatch, otherwise XOR-accumulate every byte so the number of
/// matching bytes does not influence how much work is done (spec §4.1
/// step 4, and the "constant-time" testable property in spec §8).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut diff: u8 = 0;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

/// Build an HS256 token for the given claims and secret. Exposed for tests
/// (unit and integration); production traffic always arrives with a token
/// already minted by the client.
pub fn mint(secret: &str, claims: &Map<String, Value>) -> String {
	let header = serde_json::json!({"alg": ALG_HS256, "typ": TYP_JWT});
	let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
	let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
	let signing_input = format!("{header_b64}.{claims_b64}");
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
	mac.update(signing_input.as_bytes());
	let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
	format!("{signing_input}.{sig_b64}")
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
