//! Candidate probes: health route and sync-status route.

use std::time::{Duration, Instant};

use semver::Version;
use serde::Deserialize;
use tracing::debug;

/// What a node's `/health_check` returns.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// A healthy candidate with its advertised version and measured latency.
#[derive(Debug, Clone)]
pub struct HealthSample {
    pub endpoint: String,
    pub version: Version,
    pub latency: Duration,
}

/// Reference point for the optional sync-status stage: the wallet being
/// placed and the clock its current primary reports.
#[derive(Debug, Clone)]
pub struct SyncCheck {
    pub wallet: String,
    pub expected_clock: i64,
}

#[derive(Debug, Deserialize)]
struct SyncStatusBody {
    clock_value: i64,
}

/// Probe one candidate's health route.
///
/// Healthy means HTTP 200, `healthy: true`, and a version sharing major
/// and minor with `expected`. Anything else, including a timeout, makes
/// the candidate unhealthy.
pub async fn check_health(
    client: &reqwest::Client,
    endpoint: &str,
    expected: &Version,
    timeout: Duration,
) -> Option<HealthSample> {
    let url = format!("{}/health_check", endpoint.trim_end_matches('/'));
    let start = Instant::now();
    let response = match client.get(&url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(err) => {
            debug!(endpoint = %endpoint, "health check failed: {err}");
            return None;
        }
    };
    let latency = start.elapsed();
    if !response.status().is_success() {
        debug!(endpoint = %endpoint, status = %response.status(), "health check rejected");
        return None;
    }
    let body: HealthResponse = match response.json().await {
        Ok(b) => b,
        Err(err) => {
            debug!(endpoint = %endpoint, "health check body malformed: {err}");
            return None;
        }
    };
    if !body.healthy {
        return None;
    }
    let version = match Version::parse(&body.version) {
        Ok(v) => v,
        Err(err) => {
            debug!(endpoint = %endpoint, version = %body.version, "unparseable version: {err}");
            return None;
        }
    };
    if version.major != expected.major || version.minor != expected.minor {
        debug!(
            endpoint = %endpoint,
            got = %version,
            expected = %expected,
            "version outside expected major.minor"
        );
        return None;
    }
    Some(HealthSample {
        endpoint: endpoint.to_string(),
        version,
        latency,
    })
}

/// Probe one candidate's sync-status route for replica placement.
///
/// A candidate is eligible when it is either first-time (holds nothing for
/// the wallet and is behind the reference clock) or an existing replica
/// that is not behind. A candidate mid-sync (423) or unreachable is not
/// eligible.
pub async fn check_sync_eligibility(
    client: &reqwest::Client,
    endpoint: &str,
    check: &SyncCheck,
    timeout: Duration,
) -> bool {
    let url = format!(
        "{}/sync_status/{}",
        endpoint.trim_end_matches('/'),
        check.wallet
    );
    let response = match client.get(&url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(err) => {
            debug!(endpoint = %endpoint, "sync status probe failed: {err}");
            return false;
        }
    };
    if !response.status().is_success() {
        debug!(endpoint = %endpoint, status = %response.status(), "sync status rejected");
        return false;
    }
    let body: SyncStatusBody = match response.json().await {
        Ok(b) => b,
        Err(err) => {
            debug!(endpoint = %endpoint, "sync status body malformed: {err}");
            return false;
        }
    };
    let behind = body.clock_value < check.expected_clock;
    let configured = body.clock_value >= 0;
    (!configured && behind) || (configured && !behind)
}
