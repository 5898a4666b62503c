//! Secondary sync triggers.
//!
//! After every successful primary write the node asks the user's
//! secondaries to pull. The debounced mode coalesces bursts: one pending
//! timer per wallet, reset by each new trigger, fired by the queue actor.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use coda_store::{Error, Result};

use crate::metrics::Metrics;
use crate::protocol::{SyncRequest, SyncResponse, SyncStatus};

#[derive(Debug)]
enum Msg {
    Enqueue {
        wallet: String,
        secondaries: Vec<String>,
        source: String,
    },
    Cancel {
        wallet: String,
    },
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    secondaries: Vec<String>,
    source: String,
}

/// Handle to the debounce queue actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::UnboundedSender<Msg>,
    client: reqwest::Client,
}

impl SyncTrigger {
    /// Spawn the queue actor. Dropping every handle shuts it down.
    pub fn spawn(
        debounce: Duration,
        request_timeout: Duration,
        metrics: Metrics,
    ) -> Result<(Self, JoinHandle<()>)> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(e.into()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let actor_client = client.clone();
        let handle = tokio::spawn(async move {
            run_queue(rx, actor_client, debounce, metrics).await;
        });
        Ok((SyncTrigger { tx, client }, handle))
    }

    /// Debounced trigger: (re)schedule a pull for `wallet` on each
    /// secondary. A trigger for a wallet that already has a pending timer
    /// replaces it, so at most one timer per wallet exists.
    pub fn enqueue(&self, wallet: &str, secondaries: Vec<String>, source: &str) {
        let _ = self.tx.send(Msg::Enqueue {
            wallet: wallet.to_string(),
            secondaries,
            source: source.to_string(),
        });
    }

    /// Cancel the pending timer for `wallet`, if any.
    pub fn cancel(&self, wallet: &str) {
        let _ = self.tx.send(Msg::Cancel {
            wallet: wallet.to_string(),
        });
    }

    /// Immediate trigger: ask one secondary to import now and surface its
    /// result. Used by flows that need the replica consistent before they
    /// continue.
    pub async fn sync_now(
        &self,
        secondary: &str,
        wallets: Vec<String>,
        source: &str,
    ) -> Result<SyncResponse> {
        let response = send_sync_request(&self.client, secondary, wallets, source, true).await?;
        if response.status == SyncStatus::Failed {
            return Err(Error::Upstream(format!(
                "immediate sync on {secondary} failed: {}",
                response.error.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(response)
    }
}

async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<Msg>,
    client: reqwest::Client,
    debounce: Duration,
    metrics: Metrics,
) {
    let mut pending: HashMap<String, Pending> = HashMap::new();
    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Msg::Enqueue { wallet, secondaries, source }) => {
                    metrics.triggers_enqueued.inc();
                    pending.insert(wallet, Pending {
                        deadline: Instant::now() + debounce,
                        secondaries,
                        source,
                    });
                }
                Some(Msg::Cancel { wallet }) => {
                    pending.remove(&wallet);
                }
                None => break,
            },
            _ = sleep_until_next(next_deadline), if next_deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<String> = pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .map(|(w, _)| w.clone())
                    .collect();
                for wallet in due {
                    let Some(task) = pending.remove(&wallet) else { continue };
                    metrics.triggers_fired.inc();
                    for secondary in task.secondaries {
                        let client = client.clone();
                        let wallet = wallet.clone();
                        let source = task.source.clone();
                        // best effort: a failure is carried by the next
                        // write's debounce cycle
                        tokio::spawn(async move {
                            match send_sync_request(&client, &secondary, vec![wallet.clone()], &source, false).await {
                                Ok(_) => debug!(wallet = %wallet, secondary = %secondary, "secondary sync requested"),
                                Err(err) => warn!(wallet = %wallet, secondary = %secondary, "secondary sync request failed: {err}"),
                            }
                        });
                    }
                }
            }
        }
    }
    debug!("sync trigger queue stopped");
}

async fn sleep_until_next(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn send_sync_request(
    client: &reqwest::Client,
    secondary: &str,
    wallets: Vec<String>,
    source: &str,
    immediate: bool,
) -> Result<SyncResponse> {
    let url = format!("{}/sync", secondary.trim_end_matches('/'));
    let body = SyncRequest {
        wallet: wallets,
        creator_node_endpoint: source.to_string(),
        immediate,
        sync_type: None,
    };
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("sync request to {secondary} failed: {e}")))?;
    if !response.status().is_success() {
        return Err(Error::Upstream(format!(
            "sync request to {secondary} returned {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Upstream(format!("malformed sync response: {e}")))
}
