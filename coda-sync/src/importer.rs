//! The pull importer.
//!
//! A sync run holds the wallet's lock for its whole duration, pulls
//! bounded clock windows from the source node, validates each window
//! against the local clock, downloads every referenced blob, and applies
//! the window in one transaction. Nothing is written until every blob for
//! the window is on local disk.

use std::collections::HashMap;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use coda_store::types::{FileType, SourceKind};
use coda_store::{
    normalize_wallet, Error, ExportPayload, ExportedUser, ImportBatch, Result, Store, WithClock,
};

use crate::config::Config;
use crate::lock::SyncLock;
use crate::metrics::Metrics;

/// Phases of one sync run for one wallet. Terminal phases always release
/// the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    LockHeld,
    Fetching,
    Downloading,
    Committing,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WalletSyncResult {
    pub wallet: String,
    pub final_clock: Option<u64>,
    pub windows_applied: u32,
    pub up_to_date: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub results: Vec<WalletSyncResult>,
}

#[derive(Debug)]
enum WindowPlan {
    UpToDate,
    Apply,
}

/// Pulls export windows from a source node and applies them locally.
#[derive(Debug, Clone)]
pub struct Importer {
    store: Store,
    lock: SyncLock,
    client: reqwest::Client,
    config: Config,
    metrics: Metrics,
}

impl Importer {
    pub fn new(store: Store, lock: SyncLock, config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(Importer {
            store,
            lock,
            client,
            config,
            metrics: Metrics::default(),
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    /// Run one sync against `source_endpoint` for a set of wallets.
    ///
    /// All locks are taken up front; if any wallet is already syncing the
    /// whole run fails with [`Error::Locked`] before touching anything.
    /// Locks are released on every exit path.
    #[tracing::instrument(skip(self, wallets), fields(wallets = wallets.len(), source = %source_endpoint))]
    pub async fn run(&self, wallets: Vec<String>, source_endpoint: &str) -> Result<SyncOutcome> {
        self.metrics.syncs_started.inc();
        let wallets = wallets
            .iter()
            .map(|w| normalize_wallet(w))
            .collect::<Result<Vec<_>>>()?;
        let mut guards = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            guards.push(self.lock.acquire(wallet)?);
        }
        debug!(phase = ?SyncPhase::LockHeld, "sync locks acquired");

        let mut outcome = SyncOutcome::default();
        for wallet in &wallets {
            match self.sync_wallet(wallet, source_endpoint).await {
                Ok(result) => outcome.results.push(result),
                Err(err) => {
                    debug!(phase = ?SyncPhase::Failed, wallet = %wallet, "sync failed");
                    self.metrics.syncs_failed.inc();
                    return Err(err);
                }
            }
        }
        self.metrics.syncs_completed.inc();
        debug!(phase = ?SyncPhase::Idle, "sync complete");
        Ok(outcome)
    }

    /// Pull windows for one wallet until the source has nothing newer.
    async fn sync_wallet(&self, wallet: &str, source: &str) -> Result<WalletSyncResult> {
        let mut windows_applied = 0u32;
        loop {
            let local_max = {
                let wallet = wallet.to_string();
                self.store
                    .spawn_blocking(move |store| store.clock_value(&wallet))
                    .await?
            };
            let range_min = local_max.map_or(1, |c| c + 1);

            debug!(phase = ?SyncPhase::Fetching, wallet = %wallet, range_min, "requesting export");
            let payload = self.fetch_export(wallet, source, range_min).await?;
            self.bootstrap_peer_hints(&payload);

            let Some(exported) = validated_user(wallet, &payload)? else {
                // the source holds nothing for this wallet
                return Ok(WalletSyncResult {
                    wallet: wallet.to_string(),
                    final_clock: local_max,
                    windows_applied,
                    up_to_date: true,
                });
            };

            match validate_window(local_max, exported)? {
                WindowPlan::UpToDate => {
                    self.metrics.sync_noops.inc();
                    return Ok(WalletSyncResult {
                        wallet: wallet.to_string(),
                        final_clock: local_max,
                        windows_applied,
                        up_to_date: true,
                    });
                }
                WindowPlan::Apply => {}
            }

            debug!(phase = ?SyncPhase::Downloading, wallet = %wallet, files = exported.files.len(), "fetching blobs");
            let files = self.download_blobs(wallet, source, exported).await?;

            debug!(phase = ?SyncPhase::Committing, wallet = %wallet, "applying window");
            let batch = ImportBatch {
                wallet: wallet.to_string(),
                source_user: exported.user.clone(),
                clock_records: exported.clock_records.clone(),
                user_metas: exported.user_metas.clone(),
                tracks: exported.tracks.clone(),
                files,
            };
            let applied_clock = self
                .store
                .spawn_blocking(move |store| store.import_commit(batch))
                .await?;
            windows_applied += 1;
            self.metrics.windows_applied.inc();
            info!(wallet = %wallet, clock = applied_clock, "import window applied");

            let info = exported.clock_info;
            if info.local_clock_max > info.requested_clock_range_max {
                if applied_clock < info.requested_clock_range_max {
                    // the source promised more but the window did not
                    // advance us; looping again would never terminate
                    return Err(Error::Internal(anyhow::anyhow!(
                        "window for {wallet} stalled at clock {applied_clock}"
                    )));
                }
                continue;
            }
            return Ok(WalletSyncResult {
                wallet: wallet.to_string(),
                final_clock: Some(applied_clock),
                windows_applied,
                up_to_date: false,
            });
        }
    }

    async fn fetch_export(
        &self,
        wallet: &str,
        source: &str,
        range_min: u64,
    ) -> Result<ExportPayload> {
        let url = format!("{}/export", source.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("wallet_public_key[]", wallet),
                ("clock_range_min", &range_min.to_string()),
                ("source_endpoint", &self.config.self_endpoint),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("export request to {source} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "export from {source} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed export payload: {e}")))
    }

    /// Download every blob referenced by the window, track files and
    /// non-track files in separate bounded batches. Returns the file rows
    /// rewritten to their local storage paths.
    async fn download_blobs(
        &self,
        wallet: &str,
        source: &str,
        exported: &ExportedUser,
    ) -> Result<Vec<WithClock<coda_store::types::FileRecord>>> {
        let gateways = self.gateway_candidates(source);
        let (track_files, other_files): (Vec<_>, Vec<_>) = exported
            .files
            .iter()
            .cloned()
            .partition(|f| f.data.is_track_file());

        let mut out = Vec::with_capacity(exported.files.len());
        for batch in [other_files, track_files] {
            let fetched: Vec<_> = stream::iter(batch)
                .map(|file| self.fetch_one(&gateways, file))
                .buffer_unordered(self.config.fetch_parallelism)
                .try_collect()
                .await?;
            out.extend(fetched);
        }
        // commit expects ascending clock order regardless of download
        // completion order
        out.sort_by_key(|f| f.clock);
        debug!(wallet = %wallet, blobs = out.len(), "blobs on disk");
        Ok(out)
    }

    async fn fetch_one(
        &self,
        gateways: &[String],
        file: WithClock<coda_store::types::FileRecord>,
    ) -> Result<WithClock<coda_store::types::FileRecord>> {
        let mut record = file.data;
        let blobs = self.store.blobs();

        // directory rows have no blob payload of their own
        if record.file_type == FileType::Dir {
            record.storage_path = blobs.path_for(&record.multihash).display().to_string();
            return Ok(WithClock::new(file.clock, record));
        }

        let local_path = match (&record.dir_multihash, &record.file_name) {
            (Some(dir), Some(_)) => blobs.path_for_dir_entry(dir, &record.multihash),
            _ => blobs.path_for(&record.multihash),
        };
        if !blobs.contains(&local_path).await {
            let bytes = self.fetch_bytes(gateways, &record).await?;
            match (&record.dir_multihash, &record.file_name) {
                (Some(dir), Some(_)) => {
                    blobs.put_dir_entry(dir, &record.multihash, &bytes).await?
                }
                _ => blobs.put(&record.multihash, &bytes).await?,
            };
            self.metrics.blobs_fetched.inc();
        }
        record.storage_path = local_path.display().to_string();
        Ok(WithClock::new(file.clock, record))
    }

    async fn fetch_bytes(
        &self,
        gateways: &[String],
        record: &coda_store::types::FileRecord,
    ) -> Result<bytes::Bytes> {
        // an image inside a directory is addressed through the directory
        // CID plus its entry name
        let path = match (&record.dir_multihash, &record.file_name) {
            (Some(dir), Some(name)) => format!("ipfs/{dir}/{name}"),
            _ => format!("ipfs/{}", record.multihash),
        };
        for gateway in gateways {
            let url = format!("{gateway}/{path}");
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(bytes) => return Ok(bytes),
                        Err(err) => {
                            warn!(url = %url, "blob body read failed: {err}");
                        }
                    }
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "gateway miss");
                }
                Err(err) => {
                    debug!(url = %url, "gateway unreachable: {err}");
                }
            }
        }
        Err(Error::Upstream(format!(
            "no gateway could serve {}",
            record.multihash
        )))
    }

    /// The source first, then configured fallbacks, never ourselves.
    fn gateway_candidates(&self, source: &str) -> Vec<String> {
        let mut gateways = vec![source.trim_end_matches('/').to_string()];
        for gw in &self.config.fallback_gateways {
            let gw = gw.trim_end_matches('/').to_string();
            if !gateways.contains(&gw) {
                gateways.push(gw);
            }
        }
        let own = self.config.self_endpoint.trim_end_matches('/');
        gateways.retain(|g| g != own);
        gateways
    }

    /// Peer hints are advisory: a failed dial is logged and forgotten.
    fn bootstrap_peer_hints(&self, payload: &ExportPayload) {
        for hint in &payload.peer_info {
            let client = self.client.clone();
            let endpoint = hint.endpoint.trim_end_matches('/').to_string();
            tokio::spawn(async move {
                let url = format!("{endpoint}/health_check");
                if let Err(err) = client.get(&url).send().await {
                    debug!(endpoint = %endpoint, "peer hint bootstrap failed: {err}");
                }
            });
        }
    }
}

/// The window slice for `wallet`, after checking that the source only
/// returned wallets we asked for.
fn validated_user<'a>(wallet: &str, payload: &'a ExportPayload) -> Result<Option<&'a ExportedUser>> {
    for exported in payload.cnode_users.values() {
        if exported.user.wallet != wallet {
            return Err(Error::bad_request(format!(
                "export contains unrequested wallet {}",
                exported.user.wallet
            )));
        }
    }
    Ok(payload.user_for_wallet(wallet))
}

/// Decide whether a window can be applied on top of `local_max`.
///
/// Refuses regressions and non-contiguous windows outright: clock-record
/// uniqueness makes a gap unrepairable once accepted, so this check is the
/// safety gate for the whole replica.
fn validate_window(local_max: Option<u64>, exported: &ExportedUser) -> Result<WindowPlan> {
    let local = local_max.map_or(-1, |c| c as i64);
    let source = exported.clock_info.local_clock_max as i64;
    if source < local {
        return Err(Error::Regression { remote_clock: source, local });
    }
    if source == local {
        return Ok(WindowPlan::UpToDate);
    }

    let expected_start = local_max.map_or(1, |c| c + 1);
    let mut expected = expected_start;
    if exported.clock_records.is_empty() {
        return Err(Error::NonContiguous {
            expected: expected_start,
            got: 0,
        });
    }
    for record in &exported.clock_records {
        if record.clock != expected {
            return Err(Error::NonContiguous {
                expected,
                got: record.clock,
            });
        }
        expected += 1;
    }

    // every content row must sit on a clock record of its kind
    let kinds: HashMap<u64, SourceKind> = exported
        .clock_records
        .iter()
        .map(|r| (r.clock, r.data.source_kind))
        .collect();
    let rows = exported
        .user_metas
        .iter()
        .map(|r| (r.clock, SourceKind::UserMeta))
        .chain(exported.tracks.iter().map(|r| (r.clock, SourceKind::Track)))
        .chain(exported.files.iter().map(|r| (r.clock, SourceKind::File)));
    for (clock, kind) in rows {
        if kinds.get(&clock) != Some(&kind) {
            return Err(Error::bad_request(format!(
                "content row at clock {clock} has no matching {kind:?} clock record"
            )));
        }
    }
    Ok(WindowPlan::Apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_store::types::{ClockRecord, NodeUser, UserMeta};
    use coda_store::ClockInfo;
    use uuid::Uuid;

    fn record(clock: u64, kind: SourceKind) -> WithClock<ClockRecord> {
        WithClock::new(
            clock,
            ClockRecord {
                source_kind: kind,
                created_at: 0,
            },
        )
    }

    fn exported(local_clock_max: u64, records: Vec<WithClock<ClockRecord>>) -> ExportedUser {
        let top = records.last().map(|r| r.clock).unwrap_or(0);
        ExportedUser {
            user: NodeUser {
                user_uuid: Uuid::new_v4(),
                wallet: "0xabc".into(),
                latest_block_number: None,
                clock: top,
                created_at: 0,
            },
            clock_records: records,
            user_metas: vec![],
            tracks: vec![],
            files: vec![],
            clock_info: ClockInfo {
                requested_clock_range_min: 0,
                requested_clock_range_max: 0,
                local_clock_max,
            },
        }
    }

    #[test]
    fn test_cold_window_applies() {
        let window = exported(
            3,
            vec![
                record(1, SourceKind::UserMeta),
                record(2, SourceKind::File),
                record(3, SourceKind::File),
            ],
        );
        assert!(matches!(
            validate_window(None, &window),
            Ok(WindowPlan::Apply)
        ));
    }

    #[test]
    fn test_equal_clock_is_noop() {
        let window = exported(5, vec![]);
        assert!(matches!(
            validate_window(Some(5), &window),
            Ok(WindowPlan::UpToDate)
        ));
    }

    #[test]
    fn test_regression_refused() {
        let window = exported(3, vec![]);
        let err = validate_window(Some(5), &window).unwrap_err();
        assert!(matches!(err, Error::Regression { remote_clock: 3, local: 5 }));
    }

    #[test]
    fn test_gap_refused() {
        // local at 5, window starts at 7
        let window = exported(8, vec![record(7, SourceKind::File), record(8, SourceKind::File)]);
        let err = validate_window(Some(5), &window).unwrap_err();
        assert!(matches!(err, Error::NonContiguous { expected: 6, got: 7 }));
    }

    #[test]
    fn test_hole_inside_window_refused() {
        let window = exported(
            3,
            vec![record(1, SourceKind::UserMeta), record(3, SourceKind::File)],
        );
        let err = validate_window(None, &window).unwrap_err();
        assert!(matches!(err, Error::NonContiguous { expected: 2, got: 3 }));
    }

    #[test]
    fn test_row_without_record_refused() {
        let mut window = exported(1, vec![record(1, SourceKind::File)]);
        window.user_metas.push(WithClock::new(
            1,
            UserMeta {
                metadata_multihash: "bafym".into(),
                metadata: "{}".into(),
                blockchain_user_id: None,
            },
        ));
        assert!(validate_window(None, &window).is_err());
    }
}
