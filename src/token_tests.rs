use super::*;
use serde_json::json;

const SECRET: &str = "topsecret-abcdefghijklmnopqrstu"; // 32 bytes
const NOW: i64 = 1_700_000_000;

fn claims(extra: serde_json::Value) -> Map<String, Value> {
	extra.as_object().unwrap().clone()
}

#[test]
fn happy_path_verifies() {
	let replay = ReplaySet::new();
	let token = mint(
		SECRET,
		&claims(json!({"iat": NOW, "exp": NOW + 300, "jti": "u1"})),
	);
	let verifier = Verifier::new(SECRET, &replay);
	let claims = verifier.verify(&token, NOW).unwrap();
	assert_eq!(claims.jti(), Some("u1"));
}

#[test]
fn rejects_non_three_segment_token() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);
	assert_eq!(
		verifier.verify("not.a.valid.token.at.all", NOW).unwrap_err(),
		VerifyError::Malformed("expected 3 dot-separated segments")
	);
	assert!(matches!(
		verifier.verify("onlyonepart", NOW).unwrap_err(),
		VerifyError::Malformed(_)
	));
}

#[test]
fn rejects_alg_none() {
	let replay = ReplaySet::new();
	let header = serde_json::json!({"alg": "none"});
	let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
	let claims_b64 = URL_SAFE_NO_PAD.encode(
		serde_json::to_vec(&claims(json!({"iat": NOW}))).unwrap(),
	);
	let token = format!("{header_b64}.{claims_b64}.");
	let verifier = Verifier::new(SECRET, &replay);
	assert_eq!(verifier.verify(&token, NOW).unwrap_err(), VerifyError::UnsupportedAlg);
}

#[test]
fn rejects_wrong_secret() {
	let replay = ReplaySet::new();
	let token = mint(SECRET, &claims(json!({"iat": NOW})));
	let verifier = Verifier::new("a-completely-different-secret-32b", &replay);
	assert_eq!(
		verifier.verify(&token, NOW).unwrap_err(),
		VerifyError::SignatureMismatch
	);
}

#[test]
fn clock_skew_boundaries_on_exp() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);

	let accepted = mint(SECRET, &claims(json!({"exp": NOW - 30})));
	assert!(verifier.verify(&accepted, NOW).is_ok());

	let rejected = mint(SECRET, &claims(json!({"exp": NOW - 31})));
	assert_eq!(verifier.verify(&rejected, NOW).unwrap_err(), VerifyError::Expired);
}

#[test]
fn clock_skew_boundaries_on_iat() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);

	let accepted = mint(SECRET, &claims(json!({"iat": NOW + 30})));
	assert!(verifier.verify(&accepted, NOW).is_ok());

	let rejected = mint(SECRET, &claims(json!({"iat": NOW + 31})));
	assert_eq!(
		verifier.verify(&rejected, NOW).unwrap_err(),
		VerifyError::IssuedInFuture
	);
}

#[test]
fn replay_is_rejected_within_lifetime_window() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);
	let token = mint(
		SECRET,
		&claims(json!({"iat": NOW, "exp": NOW + 300, "jti": "u2"})),
	);

	assert!(verifier.verify(&token, NOW).is_ok());
	let err = verifier.verify(&token, NOW + 5).unwrap_err();
	assert_eq!(err, VerifyError::Replay);
	assert!(err.to_string().to_lowercase().contains("replay"));
}

#[test]
fn tokens_without_jti_are_not_replay_checked() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);
	let token = mint(SECRET, &claims(json!({"iat": NOW, "exp": NOW + 300})));

	assert!(verifier.verify(&token, NOW).is_ok());
	assert!(verifier.verify(&token, NOW + 1).is_ok());
}

#[test]
fn constant_time_eq_rejects_length_mismatch_first() {
	assert!(!constant_time_eq(b"abc", b"abcd"));
	assert!(constant_time_eq(b"abcd", b"abcd"));
	assert!(!constant_time_eq(b"abcd", b"abce"));
}

#[test]
fn never_panics_on_garbage_input() {
	let replay = ReplaySet::new();
	let verifier = Verifier::new(SECRET, &replay);
	for garbage in ["", ".", "..", "a.b.c", "%%%.%%%.%%%", "🦀.🦀.🦀"] {
		let _ = verifier.verify(garbage, NOW);
	}
}
