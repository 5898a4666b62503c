use std::fmt;
use std::sync::Arc;

use redb::{Database, ReadableTable, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use crate::blobs::BlobStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{ClockInfo, ExportPayload, ExportedUser, WithClock};
use crate::metrics::Metrics;
use crate::tables::{
    self, CIDS, CLOCK_RECORDS, DIR_ENTRIES, FILES, TRACKS, USERS, USER_METAS, WALLETS,
};
use crate::types::{
    now_millis, ClockRecord, FileRecord, FileType, NodeUser, SourceKind, Track, UserMeta,
};

/// The node's record store.
///
/// All writes for one user go through the per-user clock: each row is
/// inserted together with a clock record under a single write transaction,
/// so a failure can never leak a clock value. redb serializes write
/// transactions, and the append-only check on `clock-records-v0` is the
/// safety net beneath the advisory sync lock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

struct InnerStore {
    db: Database,
    blobs: BlobStore,
    max_export_range: u64,
    metrics: Metrics,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("blobs", &self.inner.blobs)
            .field("max_export_range", &self.inner.max_export_range)
            .finish_non_exhaustive()
    }
}

/// Input for a user metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserMeta {
    pub metadata_multihash: String,
    pub metadata: String,
    pub blockchain_user_id: Option<u64>,
    pub block_number: Option<u64>,
}

/// Input for a track row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrack {
    pub metadata_multihash: String,
    pub metadata: String,
    pub blockchain_track_id: Option<u64>,
    pub cover_art_multihash: Option<String>,
    pub block_number: Option<u64>,
}

/// Input for a file row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFile {
    pub multihash: String,
    pub storage_path: String,
    pub file_type: FileType,
    pub dir_multihash: Option<String>,
    pub file_name: Option<String>,
}

/// One validated export window, ready to be applied in a single
/// transaction on a secondary.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub wallet: String,
    pub source_user: NodeUser,
    pub clock_records: Vec<WithClock<ClockRecord>>,
    pub user_metas: Vec<WithClock<UserMeta>>,
    pub tracks: Vec<WithClock<Track>>,
    pub files: Vec<WithClock<FileRecord>>,
}

impl Store {
    /// Opens (or creates) the database and blob root from `config`.
    #[tracing::instrument]
    pub async fn open(config: Config) -> Result<Self> {
        let blobs = BlobStore::open(config.storage_root.clone()).await?;
        let path = config.path.clone();
        let db = task::spawn_blocking(move || -> Result<Database> {
            std::fs::create_dir_all(&path)?;
            let db = Database::create(path.join("coda.db"))?;
            let txn = db.begin_write()?;
            {
                txn.open_table(USERS)?;
                txn.open_table(WALLETS)?;
                txn.open_table(CLOCK_RECORDS)?;
                txn.open_table(USER_METAS)?;
                txn.open_table(TRACKS)?;
                txn.open_table(FILES)?;
                txn.open_table(CIDS)?;
                txn.open_table(DIR_ENTRIES)?;
            }
            txn.commit()?;
            Ok(db)
        })
        .await
        .map_err(|e| Error::Internal(e.into()))??;

        Ok(Store {
            inner: Arc::new(InnerStore {
                db,
                blobs,
                max_export_range: config.max_export_range,
                metrics: Metrics::default(),
            }),
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn max_export_range(&self) -> u64 {
        self.inner.max_export_range
    }

    /// Run a blocking store operation off the async runtime.
    pub async fn spawn_blocking<T: Send + 'static>(
        &self,
        f: impl FnOnce(Self) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let this = self.clone();
        task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| Error::Internal(e.into()))?
    }

    #[tracing::instrument(skip(self))]
    pub fn get_user(&self, wallet: &str) -> Result<Option<NodeUser>> {
        let wallet = normalize_wallet(wallet)?;
        let txn = self.inner.db.begin_read()?;
        let wallets = txn.open_table(WALLETS)?;
        let Some(uuid) = wallets.get(wallet.as_str())? else {
            return Ok(None);
        };
        let uuid = *uuid.value();
        let users = txn.open_table(USERS)?;
        match users.get(&uuid)? {
            Some(raw) => Ok(Some(tables::decode(raw.value())?)),
            None => Ok(None),
        }
    }

    /// The user's current clock, or `None` when the node holds no records
    /// for this wallet.
    pub fn clock_value(&self, wallet: &str) -> Result<Option<u64>> {
        Ok(self.get_user(wallet)?.map(|u| u.clock))
    }

    /// Append a user metadata row. Returns the allocated clock.
    #[tracing::instrument(skip(self, meta))]
    pub fn write_user_meta(&self, wallet: &str, meta: NewUserMeta) -> Result<u64> {
        let wallet = normalize_wallet(wallet)?;
        let now = now_millis();
        let txn = self.inner.db.begin_write()?;
        let clock;
        {
            let mut users = txn.open_table(USERS)?;
            let mut wallets = txn.open_table(WALLETS)?;
            let mut records = txn.open_table(CLOCK_RECORDS)?;
            let mut metas = txn.open_table(USER_METAS)?;

            let mut user = load_or_create_user(&mut users, &mut wallets, &wallet, now)?;
            clock = next_clock(&mut records, &mut user, SourceKind::UserMeta, now)?;
            let row = UserMeta {
                metadata_multihash: meta.metadata_multihash,
                metadata: meta.metadata,
                blockchain_user_id: meta.blockchain_user_id,
            };
            metas.insert(
                (user.user_uuid.as_bytes(), clock),
                tables::encode(&row)?.as_slice(),
            )?;
            bump_block_number(&mut user, meta.block_number);
            store_user(&mut users, &user)?;
        }
        txn.commit()?;
        self.inner.metrics.writes.inc();
        debug!(wallet = %wallet, clock, "wrote user meta");
        Ok(clock)
    }

    /// Append a track row plus its track files in one transaction.
    ///
    /// Clocks are allocated in insertion order (track first, then files),
    /// so an importer replaying by ascending clock reproduces the same
    /// state.
    #[tracing::instrument(skip(self, track, files))]
    pub fn write_track(
        &self,
        wallet: &str,
        track: NewTrack,
        files: Vec<NewFile>,
    ) -> Result<(u64, Vec<u64>)> {
        let wallet = normalize_wallet(wallet)?;
        let now = now_millis();
        let txn = self.inner.db.begin_write()?;
        let track_clock;
        let mut file_clocks = Vec::with_capacity(files.len());
        {
            let mut users = txn.open_table(USERS)?;
            let mut wallets = txn.open_table(WALLETS)?;
            let mut records = txn.open_table(CLOCK_RECORDS)?;
            let mut tracks = txn.open_table(TRACKS)?;
            let mut files_table = txn.open_table(FILES)?;
            let mut cids = txn.open_table(CIDS)?;
            let mut dir_entries = txn.open_table(DIR_ENTRIES)?;

            let mut user = load_or_create_user(&mut users, &mut wallets, &wallet, now)?;
            track_clock = next_clock(&mut records, &mut user, SourceKind::Track, now)?;
            let row = Track {
                metadata_multihash: track.metadata_multihash,
                metadata: track.metadata,
                blockchain_track_id: track.blockchain_track_id,
                cover_art_multihash: track.cover_art_multihash,
            };
            tracks.insert(
                (user.user_uuid.as_bytes(), track_clock),
                tables::encode(&row)?.as_slice(),
            )?;

            for file in files {
                let clock = next_clock(&mut records, &mut user, SourceKind::File, now)?;
                let record = file_record(file, Some(track_clock));
                insert_file(
                    &mut files_table,
                    &mut cids,
                    &mut dir_entries,
                    &user.user_uuid,
                    clock,
                    &record,
                )?;
                file_clocks.push(clock);
            }
            bump_block_number(&mut user, track.block_number);
            store_user(&mut users, &user)?;
        }
        txn.commit()?;
        self.inner.metrics.writes.inc();
        debug!(wallet = %wallet, track_clock, files = file_clocks.len(), "wrote track");
        Ok((track_clock, file_clocks))
    }

    /// Append file rows with no track linkage (metadata blobs, images,
    /// standalone audio). Returns the allocated clocks in insertion order.
    #[tracing::instrument(skip(self, files))]
    pub fn write_files(&self, wallet: &str, files: Vec<NewFile>) -> Result<Vec<u64>> {
        if files.is_empty() {
            return Err(Error::bad_request("no files to write"));
        }
        let wallet = normalize_wallet(wallet)?;
        let now = now_millis();
        let txn = self.inner.db.begin_write()?;
        let mut clocks = Vec::with_capacity(files.len());
        {
            let mut users = txn.open_table(USERS)?;
            let mut wallets = txn.open_table(WALLETS)?;
            let mut records = txn.open_table(CLOCK_RECORDS)?;
            let mut files_table = txn.open_table(FILES)?;
            let mut cids = txn.open_table(CIDS)?;
            let mut dir_entries = txn.open_table(DIR_ENTRIES)?;

            let mut user = load_or_create_user(&mut users, &mut wallets, &wallet, now)?;
            for file in files {
                let clock = next_clock(&mut records, &mut user, SourceKind::File, now)?;
                let record = file_record(file, None);
                insert_file(
                    &mut files_table,
                    &mut cids,
                    &mut dir_entries,
                    &user.user_uuid,
                    clock,
                    &record,
                )?;
                clocks.push(clock);
            }
            store_user(&mut users, &user)?;
        }
        txn.commit()?;
        self.inner.metrics.writes.inc();
        Ok(clocks)
    }

    /// Look up a file row by CID.
    pub fn lookup_file(&self, cid: &str) -> Result<Option<FileRecord>> {
        let txn = self.inner.db.begin_read()?;
        let cids = txn.open_table(CIDS)?;
        let Some(ptr) = cids.get(cid)? else {
            return Ok(None);
        };
        let (uuid, clock) = ptr.value();
        let uuid = *uuid;
        let files = txn.open_table(FILES)?;
        match files.get((&uuid, clock))? {
            Some(raw) => Ok(Some(tables::decode(raw.value())?)),
            None => Ok(None),
        }
    }

    /// Look up an entry row inside a directory CID by file name.
    pub fn lookup_dir_entry(&self, dir_cid: &str, file_name: &str) -> Result<Option<FileRecord>> {
        let txn = self.inner.db.begin_read()?;
        let dir_entries = txn.open_table(DIR_ENTRIES)?;
        let Some(ptr) = dir_entries.get((dir_cid, file_name))? else {
            return Ok(None);
        };
        let (uuid, clock) = ptr.value();
        let uuid = *uuid;
        let files = txn.open_table(FILES)?;
        match files.get((&uuid, clock))? {
            Some(raw) => Ok(Some(tables::decode(raw.value())?)),
            None => Ok(None),
        }
    }

    /// The newest user metadata row for a wallet, if any. The write path
    /// reads the user's replica set out of it to know which secondaries
    /// to trigger.
    pub fn latest_user_meta(&self, wallet: &str) -> Result<Option<UserMeta>> {
        let wallet = normalize_wallet(wallet)?;
        let txn = self.inner.db.begin_read()?;
        let wallets = txn.open_table(WALLETS)?;
        let Some(uuid) = wallets.get(wallet.as_str())? else {
            return Ok(None);
        };
        let uuid = *uuid.value();
        let metas = txn.open_table(USER_METAS)?;
        match metas.range((&uuid, 1)..=(&uuid, u64::MAX))?.next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(tables::decode(value.value())?))
            }
            None => Ok(None),
        }
    }

    /// All clock records for a wallet, ascending. Operator introspection
    /// and test support.
    pub fn clock_records(&self, wallet: &str) -> Result<Vec<WithClock<ClockRecord>>> {
        let wallet = normalize_wallet(wallet)?;
        let txn = self.inner.db.begin_read()?;
        let wallets = txn.open_table(WALLETS)?;
        let Some(uuid) = wallets.get(wallet.as_str())? else {
            return Ok(Vec::new());
        };
        let uuid = *uuid.value();
        let records = txn.open_table(CLOCK_RECORDS)?;
        collect_window(&records, &uuid, 1, u64::MAX)
    }

    /// Snapshot read of one clock window for a set of wallets.
    ///
    /// The whole response comes from a single read transaction. The server
    /// clamps the window to [`Config::max_export_range`]; when a user's
    /// true clock lies past the window, the returned `user.clock` is
    /// clamped and `clock_info.local_clock_max` tells the importer to come
    /// back for more.
    #[tracing::instrument(skip(self))]
    pub fn export(
        &self,
        wallets: &[String],
        clock_range_min: u64,
        clock_range_max: Option<u64>,
    ) -> Result<ExportPayload> {
        self.inner.metrics.exports.inc();
        let min = clock_range_min;
        let hard_max = min.saturating_add(self.inner.max_export_range.saturating_sub(1));
        let max = clock_range_max.map_or(hard_max, |m| m.min(hard_max));
        if min > max {
            return Err(Error::bad_request(format!(
                "clock_range_min {min} exceeds clock_range_max {max}"
            )));
        }

        let txn = self.inner.db.begin_read()?;
        let wallets_table = txn.open_table(WALLETS)?;
        let users = txn.open_table(USERS)?;
        let records = txn.open_table(CLOCK_RECORDS)?;
        let metas = txn.open_table(USER_METAS)?;
        let tracks = txn.open_table(TRACKS)?;
        let files = txn.open_table(FILES)?;

        let mut payload = ExportPayload::default();
        for wallet in wallets {
            let wallet = normalize_wallet(wallet)?;
            let Some(uuid) = wallets_table.get(wallet.as_str())? else {
                continue;
            };
            let uuid = *uuid.value();
            let Some(raw) = users.get(&uuid)? else {
                continue;
            };
            let mut user: NodeUser = tables::decode(raw.value())?;
            let local_clock_max = user.clock;
            // Window signal only: the clamp lives on the response object,
            // the stored row is untouched.
            user.clock = user.clock.min(max);

            let exported = ExportedUser {
                clock_records: collect_window(&records, &uuid, min, max)?,
                user_metas: collect_window(&metas, &uuid, min, max)?,
                tracks: collect_window(&tracks, &uuid, min, max)?,
                files: collect_window(&files, &uuid, min, max)?,
                clock_info: ClockInfo {
                    requested_clock_range_min: min,
                    requested_clock_range_max: max,
                    local_clock_max,
                },
                user,
            };
            payload.cnode_users.insert(Uuid::from_bytes(uuid), exported);
        }
        Ok(payload)
    }

    /// Apply one validated export window atomically.
    ///
    /// Insertion order satisfies the row references: user, clock records,
    /// non-track files, tracks, track files, user metas. Any failure rolls
    /// the entire window back. Returns the user's new clock.
    #[tracing::instrument(skip(self, batch), fields(wallet = %batch.wallet))]
    pub fn import_commit(&self, batch: ImportBatch) -> Result<u64> {
        let wallet = normalize_wallet(&batch.wallet)?;
        let now = now_millis();
        let txn = self.inner.db.begin_write()?;
        let new_clock;
        {
            let mut users = txn.open_table(USERS)?;
            let mut wallets = txn.open_table(WALLETS)?;
            let mut records = txn.open_table(CLOCK_RECORDS)?;
            let mut metas = txn.open_table(USER_METAS)?;
            let mut tracks = txn.open_table(TRACKS)?;
            let mut files_table = txn.open_table(FILES)?;
            let mut cids = txn.open_table(CIDS)?;
            let mut dir_entries = txn.open_table(DIR_ENTRIES)?;

            // Nodes assign user uuids independently: keep ours when the
            // user already exists, adopt the source's otherwise.
            let existing = match wallets.get(wallet.as_str())? {
                Some(uuid) => {
                    let uuid = *uuid.value();
                    users
                        .get(&uuid)?
                        .map(|raw| tables::decode::<NodeUser>(raw.value()))
                        .transpose()?
                }
                None => None,
            };
            let uuid = existing
                .as_ref()
                .map(|u| u.user_uuid)
                .unwrap_or(batch.source_user.user_uuid);

            let top_clock = batch
                .clock_records
                .last()
                .map(|r| r.clock)
                .unwrap_or(batch.source_user.clock);
            new_clock = existing.as_ref().map_or(top_clock, |u| u.clock.max(top_clock));

            let user = NodeUser {
                user_uuid: uuid,
                wallet: wallet.clone(),
                latest_block_number: max_block_number(
                    existing.as_ref().and_then(|u| u.latest_block_number),
                    batch.source_user.latest_block_number,
                ),
                clock: new_clock,
                created_at: existing.as_ref().map_or(now, |u| u.created_at),
            };
            wallets.insert(wallet.as_str(), user.user_uuid.as_bytes())?;
            store_user(&mut users, &user)?;

            for record in &batch.clock_records {
                let prev = records.insert(
                    (uuid.as_bytes(), record.clock),
                    tables::encode(&record.data)?.as_slice(),
                )?;
                if prev.is_some() {
                    return Err(Error::ClockConflict {
                        user_uuid: uuid,
                        clock: record.clock,
                    });
                }
            }
            for file in batch.files.iter().filter(|f| !f.data.is_track_file()) {
                insert_file(
                    &mut files_table,
                    &mut cids,
                    &mut dir_entries,
                    &uuid,
                    file.clock,
                    &file.data,
                )?;
            }
            for track in &batch.tracks {
                tracks.insert(
                    (uuid.as_bytes(), track.clock),
                    tables::encode(&track.data)?.as_slice(),
                )?;
            }
            for file in batch.files.iter().filter(|f| f.data.is_track_file()) {
                insert_file(
                    &mut files_table,
                    &mut cids,
                    &mut dir_entries,
                    &uuid,
                    file.clock,
                    &file.data,
                )?;
            }
            for meta in &batch.user_metas {
                metas.insert(
                    (uuid.as_bytes(), meta.clock),
                    tables::encode(&meta.data)?.as_slice(),
                )?;
            }
        }
        txn.commit()?;
        self.inner.metrics.import_commits.inc();
        debug!(wallet = %wallet, clock = new_clock, "applied import window");
        Ok(new_clock)
    }
}

/// Validate and canonicalize a wallet identifier: lowercased hex, with an
/// optional `0x` prefix.
pub fn normalize_wallet(wallet: &str) -> Result<String> {
    let wallet = wallet.trim().to_ascii_lowercase();
    let digits = wallet.strip_prefix("0x").unwrap_or(&wallet);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::bad_request(format!("invalid wallet: {wallet:?}")));
    }
    Ok(wallet)
}

fn file_record(file: NewFile, track_clock: Option<u64>) -> FileRecord {
    FileRecord {
        multihash: file.multihash,
        storage_path: file.storage_path,
        file_type: file.file_type,
        dir_multihash: file.dir_multihash,
        file_name: file.file_name,
        track_clock,
    }
}

/// Atomically reserve the next clock value for `user`.
///
/// Inserts the clock record and bumps the in-memory user row; the caller
/// persists the user row once at the end of its transaction. A record
/// already present at the computed clock means another writer got there
/// first: the caller's transaction must be abandoned.
fn next_clock(
    records: &mut Table<'_, (&'static [u8; 16], u64), &'static [u8]>,
    user: &mut NodeUser,
    source_kind: SourceKind,
    now: u64,
) -> Result<u64> {
    let clock = user.clock + 1;
    let record = ClockRecord {
        source_kind,
        created_at: now,
    };
    let prev = records.insert(
        (user.user_uuid.as_bytes(), clock),
        tables::encode(&record)?.as_slice(),
    )?;
    if prev.is_some() {
        return Err(Error::ClockConflict {
            user_uuid: user.user_uuid,
            clock,
        });
    }
    user.clock = clock;
    Ok(clock)
}

fn load_or_create_user(
    users: &mut Table<'_, &'static [u8; 16], &'static [u8]>,
    wallets: &mut Table<'_, &'static str, &'static [u8; 16]>,
    wallet: &str,
    now: u64,
) -> Result<NodeUser> {
    if let Some(uuid) = wallets.get(wallet)? {
        let uuid = *uuid.value();
        if let Some(raw) = users.get(&uuid)? {
            return tables::decode(raw.value());
        }
    }
    let user = NodeUser {
        user_uuid: Uuid::new_v4(),
        wallet: wallet.to_string(),
        latest_block_number: None,
        clock: 0,
        created_at: now,
    };
    wallets.insert(wallet, user.user_uuid.as_bytes())?;
    store_user(users, &user)?;
    Ok(user)
}

fn store_user(
    users: &mut Table<'_, &'static [u8; 16], &'static [u8]>,
    user: &NodeUser,
) -> Result<()> {
    users.insert(user.user_uuid.as_bytes(), tables::encode(user)?.as_slice())?;
    Ok(())
}

fn bump_block_number(user: &mut NodeUser, block_number: Option<u64>) {
    user.latest_block_number = max_block_number(user.latest_block_number, block_number);
}

fn max_block_number(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn insert_file(
    files: &mut Table<'_, (&'static [u8; 16], u64), &'static [u8]>,
    cids: &mut Table<'_, &'static str, (&'static [u8; 16], u64)>,
    dir_entries: &mut Table<'_, (&'static str, &'static str), (&'static [u8; 16], u64)>,
    uuid: &Uuid,
    clock: u64,
    record: &FileRecord,
) -> Result<()> {
    files.insert((uuid.as_bytes(), clock), tables::encode(record)?.as_slice())?;
    cids.insert(record.multihash.as_str(), (uuid.as_bytes(), clock))?;
    if let (Some(dir), Some(name)) = (&record.dir_multihash, &record.file_name) {
        dir_entries.insert((dir.as_str(), name.as_str()), (uuid.as_bytes(), clock))?;
    }
    Ok(())
}

fn collect_window<T: DeserializeOwned>(
    table: &impl ReadableTable<(&'static [u8; 16], u64), &'static [u8]>,
    uuid: &[u8; 16],
    min: u64,
    max: u64,
) -> Result<Vec<WithClock<T>>> {
    let mut rows = Vec::new();
    for item in table.range((uuid, min)..=(uuid, max))? {
        let (key, value) = item?;
        let (_, clock) = key.value();
        rows.push(WithClock::new(clock, tables::decode(value.value())?));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            path: dir.path().join("db"),
            storage_root: dir.path().join("blobs"),
            max_export_range: 10_000,
        };
        let store = Store::open(config).await.unwrap();
        (store, dir)
    }

    const WALLET: &str = "0xabCDef0123456789abcdef0123456789abcdef01";

    fn meta(n: u64) -> NewUserMeta {
        NewUserMeta {
            metadata_multihash: format!("bafymeta{n}"),
            metadata: format!("{{\"handle\":\"user{n}\"}}"),
            blockchain_user_id: Some(n),
            block_number: Some(n),
        }
    }

    fn file(cid: &str) -> NewFile {
        NewFile {
            multihash: cid.to_string(),
            storage_path: format!("/tmp/{cid}"),
            file_type: FileType::Metadata,
            dir_multihash: None,
            file_name: None,
        }
    }

    #[tokio::test]
    async fn test_clock_starts_at_one_and_is_contiguous() {
        let (store, _dir) = test_store().await;

        let c1 = store.write_user_meta(WALLET, meta(1)).unwrap();
        assert_eq!(c1, 1);
        let clocks = store.write_files(WALLET, vec![file("bafya"), file("bafyb")]).unwrap();
        assert_eq!(clocks, vec![2, 3]);

        let user = store.get_user(WALLET).unwrap().unwrap();
        assert_eq!(user.clock, 3);

        let records = store.clock_records(WALLET).unwrap();
        let clocks: Vec<u64> = records.iter().map(|r| r.clock).collect();
        assert_eq!(clocks, vec![1, 2, 3]);
        assert_eq!(records[0].data.source_kind, SourceKind::UserMeta);
        assert_eq!(records[1].data.source_kind, SourceKind::File);
    }

    #[tokio::test]
    async fn test_track_batch_allocates_consecutive_clocks() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();

        let track = NewTrack {
            metadata_multihash: "bafytrack".into(),
            metadata: "{\"title\":\"t\"}".into(),
            blockchain_track_id: Some(7),
            cover_art_multihash: None,
            block_number: Some(2),
        };
        let (track_clock, file_clocks) = store
            .write_track(WALLET, track, vec![file("bafyseg1"), file("bafyseg2")])
            .unwrap();
        assert_eq!(track_clock, 2);
        assert_eq!(file_clocks, vec![3, 4]);

        let rec = store.lookup_file("bafyseg1").unwrap().unwrap();
        assert_eq!(rec.track_clock, Some(track_clock));
    }

    #[tokio::test]
    async fn test_block_number_is_monotonic() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(5)).unwrap();
        // an older block must not rewind latest_block_number
        let mut older = meta(9);
        older.block_number = Some(3);
        store.write_user_meta(WALLET, older).unwrap();

        let user = store.get_user(WALLET).unwrap().unwrap();
        assert_eq!(user.latest_block_number, Some(5));
    }

    #[tokio::test]
    async fn test_wallet_normalization() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();
        // mixed case resolves to the same user
        assert_eq!(store.clock_value(&WALLET.to_uppercase().replace("0X", "0x")).unwrap(), Some(1));
        assert!(normalize_wallet("not hex").is_err());
        assert!(normalize_wallet("").is_err());
    }

    #[tokio::test]
    async fn test_export_window_is_clamped() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();
        for i in 0..9 {
            store.write_files(WALLET, vec![file(&format!("bafy{i}"))]).unwrap();
        }

        let payload = store.export(&[WALLET.to_string()], 1, Some(4)).unwrap();
        let exported = payload.user_for_wallet(&normalize_wallet(WALLET).unwrap()).unwrap();
        // no clocks outside the effective window
        assert!(exported.clock_records.iter().all(|r| (1..=4).contains(&r.clock)));
        assert_eq!(exported.user.clock, 4);
        assert_eq!(exported.clock_info.local_clock_max, 10);
        assert_eq!(exported.clock_info.requested_clock_range_max, 4);
    }

    #[tokio::test]
    async fn test_export_bad_range() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();
        let err = store.export(&[WALLET.to_string()], 5, Some(2)).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_export_unknown_wallet_is_empty() {
        let (store, _dir) = test_store().await;
        let payload = store
            .export(&["0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string()], 1, None)
            .unwrap();
        assert!(payload.cnode_users.is_empty());
    }

    #[tokio::test]
    async fn test_import_commit_rejects_duplicate_clocks() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();
        let user = store.get_user(WALLET).unwrap().unwrap();

        let batch = ImportBatch {
            wallet: WALLET.to_string(),
            source_user: user,
            clock_records: vec![WithClock::new(
                1,
                ClockRecord {
                    source_kind: SourceKind::UserMeta,
                    created_at: now_millis(),
                },
            )],
            user_metas: vec![],
            tracks: vec![],
            files: vec![],
        };
        let err = store.import_commit(batch).unwrap_err();
        assert!(matches!(err, Error::ClockConflict { clock: 1, .. }));
        // the failed window left nothing behind
        assert_eq!(store.clock_value(WALLET).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_import_commit_keeps_local_uuid() {
        let (store, _dir) = test_store().await;
        store.write_user_meta(WALLET, meta(1)).unwrap();
        let local = store.get_user(WALLET).unwrap().unwrap();

        let mut source_user = local.clone();
        source_user.user_uuid = Uuid::new_v4();
        source_user.clock = 2;
        let batch = ImportBatch {
            wallet: WALLET.to_string(),
            source_user,
            clock_records: vec![WithClock::new(
                2,
                ClockRecord {
                    source_kind: SourceKind::File,
                    created_at: now_millis(),
                },
            )],
            user_metas: vec![],
            tracks: vec![],
            files: vec![WithClock::new(
                2,
                FileRecord {
                    multihash: "bafyimported".into(),
                    storage_path: "/tmp/bafyimported".into(),
                    file_type: FileType::Metadata,
                    dir_multihash: None,
                    file_name: None,
                    track_clock: None,
                },
            )],
        };
        store.import_commit(batch).unwrap();

        let after = store.get_user(WALLET).unwrap().unwrap();
        assert_eq!(after.user_uuid, local.user_uuid);
        assert_eq!(after.clock, 2);
        assert!(store.lookup_file("bafyimported").unwrap().is_some());
    }
}
