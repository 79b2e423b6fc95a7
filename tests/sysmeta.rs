//! System metadata never crosses the client boundary, in either direction

mod common;

use axum::http::{HeaderMap, HeaderValue};
use common::spawn_cluster;
use reqwest::{Client, StatusCode};
use ringproxy::node::MetadataUpdate;

#[tokio::test]
async fn test_stored_sysmeta_hidden_from_clients() {
    let cluster = spawn_cluster(3, 0, true, false).await;
    let client = Client::new();
    let url = cluster.account_url("AUTH_sys");
    client.put(&url).send().await.unwrap();

    // Written by a cluster-internal service, straight onto the nodes
    let mut headers = HeaderMap::new();
    headers.insert("x-account-sysmeta-quota-bytes", HeaderValue::from_static("1000"));
    headers.insert("x-account-meta-color", HeaderValue::from_static("green"));
    let update = MetadataUpdate::from_headers(&headers);
    for store in &cluster.stores {
        assert!(store.post("AUTH_sys", &update));
    }

    for resp in [
        client.head(&url).send().await.unwrap(),
        client.get(&url).send().await.unwrap(),
    ] {
        assert!(resp.status().is_success());
        assert!(!resp.headers().contains_key("x-account-sysmeta-quota-bytes"));
        assert_eq!(resp.headers()["x-account-meta-color"], "green");
    }
}

#[tokio::test]
async fn test_client_cannot_write_sysmeta() {
    let cluster = spawn_cluster(3, 0, true, false).await;
    let client = Client::new();
    let url = cluster.account_url("AUTH_sneaky");

    let resp = client
        .put(&url)
        .header("X-Account-Sysmeta-Quota-Bytes", "999999")
        .header("X-Account-Meta-Color", "red")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(&url)
        .header("X-Container-Sysmeta-Owner", "me")
        .header("X-Remove-Account-Meta-Color", "x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    for store in &cluster.stores {
        let record = store.get("AUTH_sneaky").unwrap();
        assert!(record.metadata.keys().all(|k| !k.contains("sysmeta")));
        assert!(!record.metadata.contains_key("x-account-meta-color"));
    }
}
