use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use semver::Version;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::health::{self, HealthSample, SyncCheck};

/// The ordered stages of one selection, as they appear in the decision
/// trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    GetAll,
    FilterAllow,
    FilterDeny,
    FilterSync,
    FilterHealth,
    Select,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStage {
    pub stage: Stage,
    pub survivors: Vec<String>,
}

/// Ordered record of every stage and its surviving endpoints. Attached to
/// the result on success and to the error when selection exhausts all
/// candidates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionTrace {
    pub stages: Vec<TraceStage>,
}

impl DecisionTrace {
    fn push(&mut self, stage: Stage, survivors: Vec<String>) {
        debug!(?stage, survivors = survivors.len(), "selection stage");
        self.stages.push(TraceStage { stage, survivors });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("no primary available after filtering {candidates} candidates")]
    NoPrimaryAvailable {
        candidates: usize,
        trace: DecisionTrace,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Per-call options layered over the selector [`Config`].
#[derive(Debug, Clone, Default)]
pub struct SelectOpts {
    pub allow_list: Option<HashSet<String>>,
    pub deny_list: Option<HashSet<String>>,
    /// When set, candidates are screened against this wallet's sync
    /// status before the health stage.
    pub sync_check: Option<SyncCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub primary: String,
    pub secondaries: Vec<String>,
    #[serde(skip)]
    pub trace: DecisionTrace,
}

/// Client-side picker of a primary + N−1 secondaries.
#[derive(Debug, Clone)]
pub struct Selector {
    client: reqwest::Client,
    config: Config,
}

impl Selector {
    pub fn new(config: Config) -> Result<Self, SelectError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SelectError::Internal(e.into()))?;
        Ok(Selector { client, config })
    }

    /// Select a replica set from `endpoints` against `expected_version`.
    ///
    /// Deterministic for a fixed candidate list with fixed health and
    /// latency: ties break on the endpoint string.
    #[tracing::instrument(skip(self, endpoints, opts), fields(candidates = endpoints.len()))]
    pub async fn select(
        &self,
        endpoints: &[String],
        expected_version: &Version,
        opts: &SelectOpts,
    ) -> Result<Selection, SelectError> {
        let mut trace = DecisionTrace::default();
        let all: Vec<String> = endpoints.to_vec();
        trace.push(Stage::GetAll, all.clone());

        let allowed: Vec<String> = match &opts.allow_list {
            Some(allow) => all.into_iter().filter(|e| allow.contains(e)).collect(),
            None => all,
        };
        trace.push(Stage::FilterAllow, allowed.clone());

        let denied: Vec<String> = match &opts.deny_list {
            Some(deny) => allowed.into_iter().filter(|e| !deny.contains(e)).collect(),
            None => allowed,
        };
        trace.push(Stage::FilterDeny, denied.clone());

        let synced = match &opts.sync_check {
            Some(check) => self.filter_sync(denied, check).await,
            None => denied,
        };
        trace.push(Stage::FilterSync, synced.clone());

        let mut healthy = self.filter_health(synced, expected_version).await;
        trace.push(
            Stage::FilterHealth,
            healthy.iter().map(|s| s.endpoint.clone()).collect(),
        );

        // highest version first, then lowest latency, then the endpoint
        // string to keep repeated selections reproducible
        healthy.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then(a.latency.cmp(&b.latency))
                .then(a.endpoint.cmp(&b.endpoint))
        });

        let Some(primary) = healthy.first().map(|s| s.endpoint.clone()) else {
            return Err(SelectError::NoPrimaryAvailable {
                candidates: endpoints.len(),
                trace,
            });
        };
        let secondaries: Vec<String> = healthy
            .iter()
            .skip(1)
            .take(self.config.replica_set_size.saturating_sub(1))
            .map(|s| s.endpoint.clone())
            .collect();

        let mut selected = vec![primary.clone()];
        selected.extend(secondaries.iter().cloned());
        trace.push(Stage::Select, selected);

        info!(primary = %primary, secondaries = secondaries.len(), "replica set selected");
        Ok(Selection {
            primary,
            secondaries,
            trace,
        })
    }

    async fn filter_sync(&self, candidates: Vec<String>, check: &SyncCheck) -> Vec<String> {
        let timeout = self.config.probe_timeout();
        stream::iter(candidates)
            .map(|endpoint| async move {
                let ok =
                    health::check_sync_eligibility(&self.client, &endpoint, check, timeout).await;
                ok.then_some(endpoint)
            })
            .buffer_unordered(self.config.probe_parallelism)
            .filter_map(|e| async { e })
            .collect()
            .await
    }

    async fn filter_health(
        &self,
        candidates: Vec<String>,
        expected: &Version,
    ) -> Vec<HealthSample> {
        let timeout = self.config.probe_timeout();
        stream::iter(candidates)
            .map(|endpoint| async move {
                health::check_health(&self.client, &endpoint, expected, timeout).await
            })
            .buffer_unordered(self.config.probe_parallelism)
            .filter_map(|s| async { s })
            .collect()
            .await
    }
}
