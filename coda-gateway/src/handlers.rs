//! Request handlers for every gateway route.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::body::StreamBody;
use axum::extract::{Extension, Path, Query};
use axum::http::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use coda_store::blobs::cid_for;
use coda_store::types::{FileRecord, FileType};
use coda_store::{normalize_wallet, Error, NewFile, NewTrack, NewUserMeta, PeerHint};
use coda_sync::protocol::{SyncRequest, SyncResponse, SyncStatus, SyncStatusResponse, WalletClock};

use crate::core::State;
use crate::headers::{add_content_range_headers, add_content_type_headers, parse_range_header};
use crate::response::{insert_header, GatewayError, GatewayResponse};

// ---- replication routes ----

#[derive(Debug, Default)]
struct ExportQuery {
    wallets: Vec<String>,
    clock_range_min: u64,
    clock_range_max: Option<u64>,
    source_endpoint: Option<String>,
}

/// `wallet_public_key[]` repeats, so the query is collected as raw pairs.
fn parse_export_query(pairs: &[(String, String)]) -> Result<ExportQuery, GatewayError> {
    let mut query = ExportQuery {
        clock_range_min: 1,
        ..Default::default()
    };
    for (key, value) in pairs {
        match key.as_str() {
            "wallet_public_key[]" | "wallet_public_key" => query.wallets.push(value.clone()),
            "clock_range_min" => {
                query.clock_range_min = value
                    .parse()
                    .map_err(|_| GatewayError::bad_request("invalid clock_range_min"))?;
            }
            "clock_range_max" => {
                query.clock_range_max = Some(
                    value
                        .parse()
                        .map_err(|_| GatewayError::bad_request("invalid clock_range_max"))?,
                );
            }
            "source_endpoint" => query.source_endpoint = Some(value.clone()),
            _ => {}
        }
    }
    if query.wallets.is_empty() {
        return Err(GatewayError::bad_request("missing wallet_public_key"));
    }
    Ok(query)
}

#[tracing::instrument(skip(state, pairs))]
pub async fn get_export(
    Extension(state): Extension<Arc<State>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<coda_store::ExportPayload>, GatewayError> {
    state.metrics.requests.inc();
    let query = parse_export_query(&pairs)?;
    if let Some(source) = &query.source_endpoint {
        debug!(source = %source, "export requested");
    }

    let wallets = query.wallets.clone();
    let mut payload = state
        .store
        .spawn_blocking(move |store| {
            store.export(&wallets, query.clock_range_min, query.clock_range_max)
        })
        .await?;
    payload.peer_info = vec![PeerHint {
        endpoint: state.config.self_endpoint.clone(),
    }];
    Ok(Json(payload))
}

#[tracing::instrument(skip(state, request))]
pub async fn post_sync(
    Extension(state): Extension<Arc<State>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, GatewayError> {
    state.metrics.requests.inc();
    if request.wallet.is_empty() {
        return Err(GatewayError::bad_request("missing wallet"));
    }
    if request.creator_node_endpoint.is_empty() {
        return Err(GatewayError::bad_request("missing creator_node_endpoint"));
    }

    if request.immediate {
        let outcome = state
            .importer
            .run(request.wallet.clone(), &request.creator_node_endpoint)
            .await?;
        let results = outcome
            .results
            .into_iter()
            .map(|r| WalletClock {
                wallet: r.wallet,
                clock: r.final_clock.unwrap_or(0),
            })
            .collect();
        return Ok(Json(SyncResponse {
            status: SyncStatus::Complete,
            results,
            error: None,
        }));
    }

    let importer = state.importer.clone();
    tokio::spawn(async move {
        if let Err(err) = importer
            .run(request.wallet, &request.creator_node_endpoint)
            .await
        {
            warn!("queued sync failed: {err}");
        }
    });
    Ok(Json(SyncResponse {
        status: SyncStatus::Queued,
        results: vec![],
        error: None,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_sync_status(
    Extension(state): Extension<Arc<State>>,
    Path(wallet): Path<String>,
) -> Result<Json<SyncStatusResponse>, GatewayError> {
    state.metrics.requests.inc();
    let wallet = normalize_wallet(&wallet).map_err(GatewayError::from)?;
    if state.lock.is_held(&wallet) {
        return Err(GatewayError::from(Error::Locked(wallet)));
    }
    let lookup = wallet.clone();
    let user = state
        .store
        .spawn_blocking(move |store| store.get_user(&lookup))
        .await?;
    Ok(Json(SyncStatusResponse {
        wallet,
        latest_block_number: user.as_ref().and_then(|u| u.latest_block_number),
        clock_value: user.map_or(-1, |u| u.clock as i64),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClockStatusResponse {
    pub wallet: String,
    pub clock_value: u64,
}

#[tracing::instrument(skip(state))]
pub async fn get_clock_status(
    Extension(state): Extension<Arc<State>>,
    Path(wallet): Path<String>,
) -> Result<Json<ClockStatusResponse>, GatewayError> {
    state.metrics.requests.inc();
    let wallet = normalize_wallet(&wallet).map_err(GatewayError::from)?;
    let lookup = wallet.clone();
    let user = state
        .store
        .spawn_blocking(move |store| store.get_user(&lookup))
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("unknown wallet {wallet}")))?;
    Ok(Json(ClockStatusResponse {
        wallet,
        clock_value: user.clock,
    }))
}

// ---- content read path ----

#[tracing::instrument(skip(state, request_headers))]
pub async fn get_cid(
    Extension(state): Extension<Arc<State>>,
    Path(cid): Path<String>,
    request_headers: HeaderMap,
) -> Result<GatewayResponse, GatewayError> {
    state.metrics.requests.inc();
    let lookup = cid.clone();
    let record = state
        .store
        .spawn_blocking(move |store| store.lookup_file(&lookup))
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("no file for CID {cid}")))?;
    if record.file_type == FileType::Dir {
        return Err(GatewayError::bad_request(
            "cannot stream a directory CID, address an entry as /ipfs/:cid/:filename",
        ));
    }
    if state.denylist.is_blocked(&record.multihash).await {
        return Err(GatewayError::from(Error::Forbidden(cid)));
    }
    serve_record(&state, record, &request_headers).await
}

#[tracing::instrument(skip(state, request_headers))]
pub async fn get_dir_entry(
    Extension(state): Extension<Arc<State>>,
    Path((dir_cid, filename)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> Result<GatewayResponse, GatewayError> {
    state.metrics.requests.inc();
    let (lookup_dir, lookup_name) = (dir_cid.clone(), filename.clone());
    let record = state
        .store
        .spawn_blocking(move |store| store.lookup_dir_entry(&lookup_dir, &lookup_name))
        .await?
        .ok_or_else(|| {
            GatewayError::not_found(format!("no entry {filename} in directory {dir_cid}"))
        })?;
    if state.denylist.is_blocked(&dir_cid).await
        || state.denylist.is_blocked(&record.multihash).await
    {
        return Err(GatewayError::from(Error::Forbidden(dir_cid)));
    }
    serve_record(&state, record, &request_headers).await
}

#[derive(Debug, Deserialize)]
pub struct FileLookupQuery {
    pub cid: String,
}

/// Internal node-to-node file read, restricted to registered delegate
/// wallets.
#[tracing::instrument(skip(state, request_headers))]
pub async fn get_file_lookup(
    Extension(state): Extension<Arc<State>>,
    Query(query): Query<FileLookupQuery>,
    request_headers: HeaderMap,
) -> Result<GatewayResponse, GatewayError> {
    state.metrics.requests.inc();
    let delegate = request_headers
        .get("x-delegate-wallet")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::new(StatusCode::UNAUTHORIZED, "missing delegate wallet"))?;
    let delegate = delegate.to_ascii_lowercase();
    if !state
        .config
        .delegate_wallets
        .iter()
        .any(|w| w.eq_ignore_ascii_case(&delegate))
    {
        return Err(GatewayError::new(
            StatusCode::FORBIDDEN,
            "unregistered delegate wallet",
        ));
    }

    let lookup = query.cid.clone();
    let record = state
        .store
        .spawn_blocking(move |store| store.lookup_file(&lookup))
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("no file for CID {}", query.cid)))?;
    serve_record(&state, record, &HeaderMap::new()).await
}

/// Stream a file row's bytes, honoring a single byte range. Falls back to
/// replica peers and the content network when the blob is not on disk,
/// persisting what it recovers.
async fn serve_record(
    state: &Arc<State>,
    record: FileRecord,
    request_headers: &HeaderMap,
) -> Result<GatewayResponse, GatewayError> {
    let blobs = state.store.blobs();
    let recorded = PathBuf::from(&record.storage_path);
    let path = if blobs.contains(&recorded).await {
        state.metrics.reads_local.inc();
        recorded
    } else {
        match state.fetcher.fetch(&record).await {
            Ok((bytes, source)) => {
                match source {
                    crate::fetcher::FetchSource::Peer => state.metrics.reads_peer.inc(),
                    crate::fetcher::FetchSource::Network => state.metrics.reads_network.inc(),
                };
                match (&record.dir_multihash, &record.file_name) {
                    (Some(dir), Some(_)) => {
                        blobs.put_dir_entry(dir, &record.multihash, &bytes).await?
                    }
                    _ => blobs.put(&record.multihash, &bytes).await?,
                }
            }
            Err(err) => {
                state.metrics.reads_failed.inc();
                return Err(err.into());
            }
        }
    };

    state.rehydrator.enqueue(&record.multihash);

    let range = request_headers.get(RANGE).and_then(parse_range_header);
    stream_blob(&path, range, &record).await
}

async fn stream_blob(
    path: &FsPath,
    range: Option<std::ops::Range<u64>>,
    record: &FileRecord,
) -> Result<GatewayResponse, GatewayError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .len();

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, ACCEPT_RANGES, "bytes");
    let display_name = record
        .file_name
        .clone()
        .unwrap_or_else(|| record.multihash.clone());
    add_content_type_headers(&mut headers, &display_name);

    match range {
        Some(range) => {
            if range.start >= size {
                return Err(GatewayError::from(Error::RangeNotSatisfiable));
            }
            let end = range.end.min(size);
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            let reader = file.take(end - range.start);
            add_content_range_headers(&mut headers, range.start..end, size);
            insert_header(&mut headers, CONTENT_LENGTH, &(end - range.start).to_string());
            Ok(GatewayResponse::new(
                StatusCode::PARTIAL_CONTENT,
                axum::body::boxed(StreamBody::new(ReaderStream::new(reader))),
                headers,
            ))
        }
        None => {
            insert_header(&mut headers, CONTENT_LENGTH, &size.to_string());
            Ok(GatewayResponse::new(
                StatusCode::OK,
                axum::body::boxed(StreamBody::new(ReaderStream::new(file))),
                headers,
            ))
        }
    }
}

// ---- upload routes ----

#[derive(Debug, Deserialize)]
pub struct MetadataUpload {
    pub wallet: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct MetadataUploadResponse {
    pub metadata_multihash: String,
    pub clock: u64,
}

#[tracing::instrument(skip(state, upload))]
pub async fn post_user_metadata(
    Extension(state): Extension<Arc<State>>,
    Json(upload): Json<MetadataUpload>,
) -> Result<Json<MetadataUploadResponse>, GatewayError> {
    store_metadata_blob(&state, upload).await.map(Json)
}

#[tracing::instrument(skip(state, upload))]
pub async fn post_track_metadata(
    Extension(state): Extension<Arc<State>>,
    Json(upload): Json<MetadataUpload>,
) -> Result<Json<MetadataUploadResponse>, GatewayError> {
    store_metadata_blob(&state, upload).await.map(Json)
}

/// Shared body of the two metadata upload routes: persist the JSON blob
/// under its CID and append a metadata file row.
async fn store_metadata_blob(
    state: &Arc<State>,
    upload: MetadataUpload,
) -> Result<MetadataUploadResponse, GatewayError> {
    state.metrics.requests.inc();
    let wallet = normalize_wallet(&upload.wallet).map_err(GatewayError::from)?;
    let _guard = state.lock.acquire(&wallet).map_err(GatewayError::from)?;

    let bytes = serde_json::to_vec(&upload.metadata)
        .map_err(|e| GatewayError::bad_request(format!("unserializable metadata: {e}")))?;
    let cid = cid_for(&bytes);
    let path = state.store.blobs().put(&cid, &bytes).await?;

    let file = NewFile {
        multihash: cid.clone(),
        storage_path: path.display().to_string(),
        file_type: FileType::Metadata,
        dir_multihash: None,
        file_name: None,
    };
    let write_wallet = wallet.clone();
    let clocks = state
        .store
        .spawn_blocking(move |store| store.write_files(&write_wallet, vec![file]))
        .await?;
    state.metrics.uploads.inc();
    trigger_secondaries(state, &wallet).await;
    Ok(MetadataUploadResponse {
        metadata_multihash: cid,
        clock: clocks[0],
    })
}

#[derive(Debug, Deserialize)]
pub struct AssociateUser {
    pub wallet: String,
    pub metadata_multihash: String,
    #[serde(default)]
    pub blockchain_user_id: Option<u64>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ClockResponse {
    pub clock: u64,
}

#[tracing::instrument(skip(state, body))]
pub async fn post_user(
    Extension(state): Extension<Arc<State>>,
    Json(body): Json<AssociateUser>,
) -> Result<Json<ClockResponse>, GatewayError> {
    state.metrics.requests.inc();
    let wallet = normalize_wallet(&body.wallet).map_err(GatewayError::from)?;
    let _guard = state.lock.acquire(&wallet).map_err(GatewayError::from)?;

    let metadata = read_metadata_blob(&state, &body.metadata_multihash).await?;
    let meta = NewUserMeta {
        metadata_multihash: body.metadata_multihash,
        metadata,
        blockchain_user_id: body.blockchain_user_id,
        block_number: body.block_number,
    };
    let write_wallet = wallet.clone();
    let clock = state
        .store
        .spawn_blocking(move |store| store.write_user_meta(&write_wallet, meta))
        .await?;
    state.metrics.uploads.inc();
    trigger_secondaries(&state, &wallet).await;
    Ok(Json(ClockResponse { clock }))
}

#[derive(Debug, Deserialize)]
pub struct AssociateTrack {
    pub wallet: String,
    pub metadata_multihash: String,
    #[serde(default)]
    pub blockchain_track_id: Option<u64>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub cover_art_multihash: Option<String>,
    /// CIDs of already uploaded track content to link to this track.
    #[serde(default)]
    pub track_file_cids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub track_clock: u64,
    pub file_clocks: Vec<u64>,
}

#[tracing::instrument(skip(state, body))]
pub async fn post_track(
    Extension(state): Extension<Arc<State>>,
    Json(body): Json<AssociateTrack>,
) -> Result<Json<TrackResponse>, GatewayError> {
    state.metrics.requests.inc();
    let wallet = normalize_wallet(&body.wallet).map_err(GatewayError::from)?;
    let _guard = state.lock.acquire(&wallet).map_err(GatewayError::from)?;

    let metadata = read_metadata_blob(&state, &body.metadata_multihash).await?;

    // every linked CID must already be uploaded content
    let mut track_files = Vec::with_capacity(body.track_file_cids.len());
    for cid in &body.track_file_cids {
        let lookup = cid.clone();
        let existing = state
            .store
            .spawn_blocking(move |store| store.lookup_file(&lookup))
            .await?
            .ok_or_else(|| GatewayError::bad_request(format!("unknown track file CID {cid}")))?;
        track_files.push(NewFile {
            multihash: existing.multihash,
            storage_path: existing.storage_path,
            file_type: existing.file_type,
            dir_multihash: existing.dir_multihash,
            file_name: existing.file_name,
        });
    }

    let track = NewTrack {
        metadata_multihash: body.metadata_multihash,
        metadata,
        blockchain_track_id: body.blockchain_track_id,
        cover_art_multihash: body.cover_art_multihash,
        block_number: body.block_number,
    };
    let write_wallet = wallet.clone();
    let (track_clock, file_clocks) = state
        .store
        .spawn_blocking(move |store| store.write_track(&write_wallet, track, track_files))
        .await?;
    state.metrics.uploads.inc();
    trigger_secondaries(&state, &wallet).await;
    Ok(Json(TrackResponse {
        track_clock,
        file_clocks,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub wallet: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageUploadResponse {
    pub dir_cid: String,
    pub cid: String,
    pub clocks: Vec<u64>,
}

/// Store an image as a directory CID holding the (already processed)
/// variant, so peers can address it as `/ipfs/:dirCID/:filename`.
#[tracing::instrument(skip(state, body))]
pub async fn post_image(
    Extension(state): Extension<Arc<State>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<ImageUploadResponse>, GatewayError> {
    state.metrics.requests.inc();
    if body.is_empty() {
        return Err(GatewayError::bad_request("empty image body"));
    }
    let wallet = normalize_wallet(&query.wallet).map_err(GatewayError::from)?;
    let _guard = state.lock.acquire(&wallet).map_err(GatewayError::from)?;

    let filename = query.filename.unwrap_or_else(|| "original.jpg".to_string());
    let cid = cid_for(&body);
    let dir_cid = cid_for(format!("{filename}:{cid}").as_bytes());
    let entry_path = state
        .store
        .blobs()
        .put_dir_entry(&dir_cid, &cid, &body)
        .await?;

    let dir_row = NewFile {
        multihash: dir_cid.clone(),
        storage_path: state.store.blobs().path_for(&dir_cid).display().to_string(),
        file_type: FileType::Dir,
        dir_multihash: None,
        file_name: None,
    };
    let entry_row = NewFile {
        multihash: cid.clone(),
        storage_path: entry_path.display().to_string(),
        file_type: FileType::Image,
        dir_multihash: Some(dir_cid.clone()),
        file_name: Some(filename),
    };
    let write_wallet = wallet.clone();
    let clocks = state
        .store
        .spawn_blocking(move |store| store.write_files(&write_wallet, vec![dir_row, entry_row]))
        .await?;
    state.metrics.uploads.inc();
    trigger_secondaries(&state, &wallet).await;
    Ok(Json(ImageUploadResponse {
        dir_cid,
        cid,
        clocks,
    }))
}

#[derive(Debug, Serialize)]
pub struct TrackContentResponse {
    pub cid: String,
    pub clock: u64,
}

#[tracing::instrument(skip(state, body))]
pub async fn post_track_content(
    Extension(state): Extension<Arc<State>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<TrackContentResponse>, GatewayError> {
    state.metrics.requests.inc();
    if body.is_empty() {
        return Err(GatewayError::bad_request("empty track body"));
    }
    let wallet = normalize_wallet(&query.wallet).map_err(GatewayError::from)?;
    let _guard = state.lock.acquire(&wallet).map_err(GatewayError::from)?;

    let cid = cid_for(&body);
    let path = state.store.blobs().put(&cid, &body).await?;
    let file = NewFile {
        multihash: cid.clone(),
        storage_path: path.display().to_string(),
        file_type: FileType::Audio,
        dir_multihash: None,
        file_name: query.filename,
    };
    let write_wallet = wallet.clone();
    let clocks = state
        .store
        .spawn_blocking(move |store| store.write_files(&write_wallet, vec![file]))
        .await?;
    state.metrics.uploads.inc();
    trigger_secondaries(&state, &wallet).await;
    Ok(Json(TrackContentResponse {
        cid,
        clock: clocks[0],
    }))
}

/// Read the stored metadata blob a row will reference.
async fn read_metadata_blob(state: &Arc<State>, cid: &str) -> Result<String, GatewayError> {
    let lookup = cid.to_string();
    let record = state
        .store
        .spawn_blocking(move |store| store.lookup_file(&lookup))
        .await?
        .ok_or_else(|| GatewayError::bad_request(format!("unknown metadata CID {cid}")))?;
    tokio::fs::read_to_string(&record.storage_path)
        .await
        .map_err(|e| GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Ask the user's secondaries to pull after a successful write.
///
/// The replica set lives in the user's newest metadata under
/// `creator_node_endpoint` (comma-separated, primary first). A user with
/// no metadata yet simply has no secondaries to trigger.
async fn trigger_secondaries(state: &Arc<State>, wallet: &str) {
    let lookup = wallet.to_string();
    let meta = match state
        .store
        .spawn_blocking(move |store| store.latest_user_meta(&lookup))
        .await
    {
        Ok(meta) => meta,
        Err(err) => {
            warn!(wallet = %wallet, "replica set lookup failed: {err}");
            return;
        }
    };
    let Some(meta) = meta else {
        debug!(wallet = %wallet, "no user metadata yet, skipping secondary trigger");
        return;
    };
    let secondaries = secondaries_from_metadata(&meta.metadata, &state.config.self_endpoint);
    if secondaries.is_empty() {
        debug!(wallet = %wallet, "no secondaries in replica set");
        return;
    }
    state
        .trigger
        .enqueue(wallet, secondaries, &state.config.self_endpoint);
}

fn secondaries_from_metadata(metadata: &str, self_endpoint: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
        return Vec::new();
    };
    let Some(endpoints) = value.get("creator_node_endpoint").and_then(|v| v.as_str()) else {
        return Vec::new();
    };
    let own = self_endpoint.trim_end_matches('/');
    endpoints
        .split(',')
        .map(|e| e.trim().trim_end_matches('/'))
        .filter(|e| !e.is_empty() && *e != own)
        .map(|e| e.to_string())
        .collect()
}

// ---- service routes ----

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub service: &'static str,
}

#[tracing::instrument]
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        service: "content-node",
    })
}

pub async fn metrics_dump(
    Extension(state): Extension<Arc<State>>,
) -> Result<String, GatewayError> {
    let Some(registry) = &state.registry else {
        return Err(GatewayError::not_found("metrics not enabled"));
    };
    let registry = registry.lock().await;
    let mut out = String::new();
    prometheus_client::encoding::text::encode(&mut out, &registry)
        .map_err(|e| GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export_query() {
        let pairs = vec![
            ("wallet_public_key[]".to_string(), "0xabc".to_string()),
            ("wallet_public_key[]".to_string(), "0xdef".to_string()),
            ("clock_range_min".to_string(), "7".to_string()),
            ("clock_range_max".to_string(), "12".to_string()),
        ];
        let query = parse_export_query(&pairs).unwrap();
        assert_eq!(query.wallets, vec!["0xabc", "0xdef"]);
        assert_eq!(query.clock_range_min, 7);
        assert_eq!(query.clock_range_max, Some(12));

        assert!(parse_export_query(&[]).is_err());
        let bad = vec![("clock_range_min".to_string(), "x".to_string())];
        assert!(parse_export_query(&bad).is_err());
    }

    #[test]
    fn test_secondaries_from_metadata() {
        let metadata = r#"{
            "handle": "someone",
            "creator_node_endpoint": "http://primary:4000,http://sec1:4000/,http://sec2:4000"
        }"#;
        let secondaries = secondaries_from_metadata(metadata, "http://primary:4000");
        assert_eq!(secondaries, vec!["http://sec1:4000", "http://sec2:4000"]);

        // a secondary's own view excludes itself
        let secondaries = secondaries_from_metadata(metadata, "http://sec1:4000");
        assert_eq!(secondaries, vec!["http://primary:4000", "http://sec2:4000"]);

        assert!(secondaries_from_metadata("{}", "http://x").is_empty());
        assert!(secondaries_from_metadata("not json", "http://x").is_empty());
    }
}
