//! IP policy (spec §4.2): allow-list with CIDR support, plus an optional
//! external reputation check with fail-open semantics.
//!
//! The CIDR/single-IP matching shape mirrors agentgateway's
//! `http/ipallowlist.rs` (`IpRange::{Single,Cidr}` over `ipnet::IpNet`),
//! generalized here to the spec's opportunistic self-reported IP instead of
//! a trusted proxy-observed source, and to the spec's fail-open reputation
//! call instead of a hard deny.

use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::envelope::{ErrorKind, GatewayOutcome};

const REPUTATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum Range {
	Single(IpAddr),
	Cidr(IpNet),
}

impl Range {
	fn contains(&self, ip: IpAddr) -> bool {
		match self {
			Range::Single(allowed) => *allowed == ip,
			Range::Cidr(net) => net.contains(&ip),
		}
	}
}

impl FromStr for Range {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if let Ok(net) = IpNet::from_str(s) {
			return Ok(Range::Cidr(net));
		}
		if let Ok(ip) = IpAddr::from_str(s) {
			return Ok(Range::Single(ip));
		}
		Err(anyhow::anyhow!("invalid IP address or CIDR: {s}"))
	}
}

pub struct IpPolicy<'a> {
	config: &'a Config,
	http: &'a reqwest::Client,
}

impl<'a> IpPolicy<'a> {
	pub fn new(config: &'a Config, http: &'a reqwest::Client) -> Self {
		IpPolicy { config, http }
	}

	/// Check a self-reported client IP (spec §4.2). Opportunistic: an
	/// absent/`unknown` IP passes, since enforcement here is defense in
	/// depth, not an access-control boundary (spec §1 Non-goals).
	pub async fn check(&self, reported_ip: &str) -> Result<(), GatewayOutcome> {
		if reported_ip.is_empty() || reported_ip.eq_ignore_ascii_case("unknown") {
			return Ok(());
		}

		let allowlist = self.config.ip_allowlist();
		if !allowlist.is_empty() {
			let Ok(ip) = IpAddr::from_str(reported_ip) else {
				return Err(GatewayOutcome::new(
					ErrorKind::IpBlocked,
					format!("unparseable client IP: {reported_ip}"),
				));
			};
			let ranges: Vec<Range> = allowlist
				.iter()
				.filter_map(|entry| Range::from_str(entry).ok())
				.collect();
			if !ranges.iter().any(|r| r.contains(ip)) {
				return Err(GatewayOutcome::new(
					ErrorKind::IpBlocked,
					format!("{reported_ip} is not in the allow-list"),
				));
			}
		}

		if self.config.ip_check_enabled() {
			if let Some(api_key) = self.config.ip_check_api_key() {
				match self.reputation_score(reported_ip, &api_key).await {
					Ok(score) if score >= self.config.ip_check_threshold() => {
						return Err(GatewayOutcome::new(
							ErrorKind::IpBlocked,
							format!("reputation score {score} exceeds threshold"),
						));
					},
					Ok(_) => {},
					Err(reason) => {
						// Fail open: an unreachable or malformed reputation
						// provider must never take the proxy offline (spec §4.2 step 3).
						tracing::warn!(%reason, "ip reputation check failed, failing open");
					},
				}
			}
		}

		Ok(())
	}

	async fn reputation_score(&self, ip: &str, api_key: &str) -> Result<i64, String> {
		let endpoint = self
			.config
			.get_raw("IP_CHECK_ENDPOINT")
			.unwrap_or_else(|| "https://api.abuseipdb.com/api/v2/check".to_string());

		let resp = self
			.http
			.get(&endpoint)
			.query(&[("ipAddress", ip)])
			.header("Key", api_key)
			.timeout(REPUTATION_TIMEOUT)
			.send()
			.await
			.map_err(|e| e.to_string())?;

		let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
		body
			.get("data")
			.and_then(|d| d.get("abuseConfidenceScore"))
			.and_then(serde_json::Value::as_i64)
			.ok_or_else(|| "response missing data.abuseConfidenceScore".to_string())
	}
}

/// Parse-and-match helper used directly by tests and by `check` above.
/// Exposed standalone because spec §8's CIDR property is stated in terms
/// of a free function, `cidrMatch(ip, cidr)`.
pub fn cidr_match(ip: &str, cidr: &str) -> bool {
	let (Ok(ip), Ok(net)) = (IpAddr::from_str(ip), IpNet::from_str(cidr)) else {
		return false;
	};
	net.contains(&ip)
}

#[cfg(test)]
#[path = "ipallow_tests.rs"]
mod tests;
