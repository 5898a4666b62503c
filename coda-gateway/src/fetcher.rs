//! Read-path fallbacks.
//!
//! A CID that is not on local disk is fetched from the user's replica
//! peers first, then from the content-addressed network's public gateway
//! under a short deadline. Fetched bytes are persisted so the next read
//! is a disk hit.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use coda_store::types::FileRecord;
use coda_store::{Error, Result};

/// Where a fallback fetch found the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Peer,
    Network,
}

/// Fetches blobs the node does not hold locally.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
    peers: Vec<String>,
    network_gateway: Option<String>,
    network_timeout: Duration,
}

impl ContentFetcher {
    pub fn new(
        peers: Vec<String>,
        network_gateway: Option<String>,
        network_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(ContentFetcher {
            client,
            peers: peers
                .into_iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .collect(),
            network_gateway: network_gateway.map(|g| g.trim_end_matches('/').to_string()),
            network_timeout,
        })
    }

    /// Try each replica peer in turn, then the content network.
    pub async fn fetch(&self, record: &FileRecord) -> Result<(Bytes, FetchSource)> {
        let path = match (&record.dir_multihash, &record.file_name) {
            (Some(dir), Some(name)) => format!("ipfs/{dir}/{name}"),
            _ => format!("ipfs/{}", record.multihash),
        };

        for peer in &self.peers {
            let url = format!("{peer}/{path}");
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(bytes) => {
                        debug!(url = %url, "blob recovered from replica peer");
                        return Ok((bytes, FetchSource::Peer));
                    }
                    Err(err) => warn!(url = %url, "peer body read failed: {err}"),
                },
                Ok(response) => {
                    trace!(url = %url, status = %response.status(), "peer miss");
                }
                Err(err) => {
                    trace!(url = %url, "peer unreachable: {err}");
                }
            }
        }

        if let Some(gateway) = &self.network_gateway {
            let url = format!("{gateway}/{path}");
            let result = self
                .client
                .get(&url)
                .timeout(self.network_timeout)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(bytes) => {
                            debug!(url = %url, "blob recovered from content network");
                            return Ok((bytes, FetchSource::Network));
                        }
                        Err(err) => warn!(url = %url, "network body read failed: {err}"),
                    }
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "network gateway miss");
                }
                Err(err) => {
                    debug!(url = %url, "network gateway failed: {err}");
                }
            }
        }

        Err(Error::Upstream(format!(
            "{} unavailable on all peers and the content network",
            record.multihash
        )))
    }
}

/// Background queue keeping the content-addressed overlay warm.
///
/// Every read hit enqueues its CID; the worker issues a best-effort warm
/// request and never blocks or fails the serving request.
#[derive(Debug, Clone)]
pub struct Rehydrator {
    tx: mpsc::UnboundedSender<String>,
}

impl Rehydrator {
    pub fn spawn(network_gateway: Option<String>, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::spawn(async move {
            let client = match reqwest::Client::builder().timeout(timeout).build() {
                Ok(client) => client,
                Err(err) => {
                    warn!("rehydration worker disabled: {err}");
                    return;
                }
            };
            let gateway = network_gateway.map(|g| g.trim_end_matches('/').to_string());
            while let Some(cid) = rx.recv().await {
                let Some(gateway) = &gateway else {
                    trace!(cid = %cid, "no overlay gateway configured, skipping rehydration");
                    continue;
                };
                let url = format!("{gateway}/ipfs/{cid}");
                match client.head(&url).send().await {
                    Ok(_) => trace!(cid = %cid, "overlay warmed"),
                    Err(err) => debug!(cid = %cid, "rehydration failed: {err}"),
                }
            }
        });
        (Rehydrator { tx }, handle)
    }

    pub fn enqueue(&self, cid: &str) {
        let _ = self.tx.send(cid.to_string());
    }
}
