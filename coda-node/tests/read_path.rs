//! Content read path: ranges, directory entries, denylist and fallbacks.

use std::net::TcpListener;

use coda_node::{Node, NodeConfig};
use coda_store::blobs::cid_for;
use coda_store::types::FileType;
use coda_store::{NewFile, Store};
use serde_json::json;
use tempfile::TempDir;

const WALLET: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

struct TestNode {
    store: Store,
    endpoint: String,
    _dir: TempDir,
}

async fn spawn_node(configure: impl FnOnce(&mut NodeConfig)) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint = format!("http://{addr}");

    let mut config = NodeConfig::default();
    config.store.path = dir.path().join("db");
    config.store.storage_root = dir.path().join("blobs");
    config.gateway.port = addr.port();
    config.gateway.self_endpoint = endpoint.clone();
    configure(&mut config);
    config.reconcile();

    let node = Node::build(config, None).await.unwrap();
    let store = node.store.clone();
    let router = coda_gateway::core::get_app_routes(node.core.state());
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);

    TestNode {
        store,
        endpoint,
        _dir: dir,
    }
}

/// Persist a blob and its file row, returning the CID.
async fn put_file(node: &TestNode, data: &[u8]) -> String {
    let cid = cid_for(data);
    let path = node.store.blobs().put(&cid, data).await.unwrap();
    node.store
        .write_files(
            WALLET,
            vec![NewFile {
                multihash: cid.clone(),
                storage_path: path.display().to_string(),
                file_type: FileType::Audio,
                dir_multihash: None,
                file_name: Some("blob.mp3".to_string()),
            }],
        )
        .unwrap();
    cid
}

#[tokio::test]
async fn test_serves_cid_from_disk() {
    let node = spawn_node(|_| {}).await;
    let data = b"the whole track".to_vec();
    let cid = put_file(&node, &data).await;

    let response = reqwest::get(format!("{}/ipfs/{cid}", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"]
            .to_str()
            .unwrap(),
        "audio/mpeg"
    );
    assert_eq!(response.bytes().await.unwrap(), data.as_slice());
}

#[tokio::test]
async fn test_unknown_cid_is_404() {
    let node = spawn_node(|_| {}).await;
    let response = reqwest::get(format!("{}/ipfs/bafynothere", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_byte_ranges() {
    let node = spawn_node(|_| {}).await;
    let data: Vec<u8> = (0..100).collect();
    let cid = put_file(&node, &data).await;
    let client = reqwest::Client::new();

    // satisfiable range: inclusive on the wire
    let response = client
        .get(format!("{}/ipfs/{cid}", node.endpoint))
        .header("Range", "bytes=10-19")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"].to_str().unwrap(),
        "bytes 10-19/100"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[10..20]);

    // a range ending past EOF is capped, not refused
    let response = client
        .get(format!("{}/ipfs/{cid}", node.endpoint))
        .header("Range", "bytes=90-150")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[90..]);

    // a range starting past EOF is not satisfiable
    let response = client
        .get(format!("{}/ipfs/{cid}", node.endpoint))
        .header("Range", "bytes=100-110")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.status(),
        reqwest::StatusCode::RANGE_NOT_SATISFIABLE
    );
}

#[tokio::test]
async fn test_directory_entries() {
    let node = spawn_node(|_| {}).await;
    let image = b"image bytes".to_vec();

    let response = reqwest::Client::new()
        .post(format!(
            "{}/image_upload?wallet={WALLET}&filename=cover.jpg",
            node.endpoint
        ))
        .body(image.clone())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    let dir_cid = body["dir_cid"].as_str().unwrap();

    // the entry streams through the directory route
    let response = reqwest::get(format!("{}/ipfs/{dir_cid}/cover.jpg", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap(), image.as_slice());

    // the directory CID itself is not streamable
    let response = reqwest::get(format!("{}/ipfs/{dir_cid}", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // unknown entry name
    let response = reqwest::get(format!("{}/ipfs/{dir_cid}/missing.jpg", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_denylisted_cid_is_forbidden() {
    let data = b"blocked content".to_vec();
    let cid = cid_for(&data);
    let denied = cid.clone();
    let node = spawn_node(move |c| c.gateway.denylist_cids = vec![denied]).await;
    put_file(&node, &data).await;

    let response = reqwest::get(format!("{}/ipfs/{cid}", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_disk_miss_recovers_from_replica_peer() {
    let peer = spawn_node(|_| {}).await;
    let data = b"only on the peer".to_vec();
    let cid = put_file(&peer, &data).await;

    let peer_endpoint = peer.endpoint.clone();
    let node = spawn_node(move |c| c.gateway.read_peers = vec![peer_endpoint]).await;
    // the row exists locally but its blob never landed on disk
    let missing_path = node.store.blobs().path_for(&cid);
    node.store
        .write_files(
            WALLET,
            vec![NewFile {
                multihash: cid.clone(),
                storage_path: missing_path.display().to_string(),
                file_type: FileType::Audio,
                dir_multihash: None,
                file_name: None,
            }],
        )
        .unwrap();

    let response = reqwest::get(format!("{}/ipfs/{cid}", node.endpoint))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap(), data.as_slice());

    // the recovered blob was persisted for the next read
    assert!(node.store.blobs().contains(&missing_path).await);
}

#[tokio::test]
async fn test_file_lookup_requires_registered_delegate() {
    let node = spawn_node(|c| {
        c.gateway.delegate_wallets = vec!["0xdelegate01".to_string()];
    })
    .await;
    let data = b"internal read".to_vec();
    let cid = put_file(&node, &data).await;
    let client = reqwest::Client::new();
    let url = format!("{}/file_lookup?cid={cid}", node.endpoint);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let response = client
        .get(&url)
        .header("x-delegate-wallet", "0xsomebodyelse")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    let response = client
        .get(&url)
        .header("x-delegate-wallet", "0xDELEGATE01")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap(), data.as_slice());
}

#[tokio::test]
async fn test_upload_then_associate_user() {
    let node = spawn_node(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/audius_users/metadata", node.endpoint))
        .json(&json!({
            "wallet": WALLET,
            "metadata": { "handle": "someone", "bio": "hi" },
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    let metadata_cid = body["metadata_multihash"].as_str().unwrap().to_string();
    assert_eq!(body["clock"], 1);

    let response = client
        .post(format!("{}/audius_users", node.endpoint))
        .json(&json!({
            "wallet": WALLET,
            "metadata_multihash": metadata_cid,
            "blockchain_user_id": 42,
            "block_number": 1000,
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["clock"], 2);

    let user = node.store.get_user(WALLET).unwrap().unwrap();
    assert_eq!(user.clock, 2);
    assert_eq!(user.latest_block_number, Some(1000));
    let meta = node.store.latest_user_meta(WALLET).unwrap().unwrap();
    assert!(meta.metadata.contains("someone"));
}
