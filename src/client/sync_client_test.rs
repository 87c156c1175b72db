use serde_json::json;

use super::sync_client::is_newer;
use super::*;
use crate::config::DeliveryConfig;
use crate::feed::ChangeEvent;
use crate::Error;

fn event(
    version: u64,
    seq: u64,
) -> ChangeEvent {
    ChangeEvent {
        id: "vn-a".into(),
        seq,
        version,
        value: json!(version),
        html: None,
        listener: None,
        timestamp: 0,
    }
}

#[test]
fn test_first_event_is_always_newer() {
    assert!(is_newer(&event(0, 1), None));
}

#[test]
fn test_version_orders_before_seq() {
    // A late render of an old version must not roll the value back
    assert!(!is_newer(&event(1, 9), Some(&event(2, 8))));
    assert!(is_newer(&event(2, 8), Some(&event(1, 9))));
    assert!(is_newer(&event(2, 9), Some(&event(2, 8))));
    assert!(!is_newer(&event(2, 8), Some(&event(2, 8))));
}

#[tokio::test]
async fn test_connect_rejects_unsupported_scheme() {
    let result = SyncClient::builder("ftp://example", "vn-a").connect();
    assert!(matches!(result, Err(Error::Delivery(_))));
}

#[tokio::test]
async fn test_connect_validates_delivery_config() {
    let result = SyncClient::builder("http://127.0.0.1:1", "vn-a")
        .set_config(DeliveryConfig {
            poll_interval_ms: 1,
            ..Default::default()
        })
        .connect();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_unreachable_server_goes_offline() {
    let client = SyncClient::builder("http://127.0.0.1:1", "vn-a")
        .poll_interval(std::time::Duration::from_millis(250))
        .push_enabled(false)
        .connect()
        .unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !client.is_offline() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("offline flag raised");

    assert!(client.latest().is_none());
    assert_eq!(client.channel_state(), ChannelState::Disconnected);
    client.shutdown().await.unwrap();
}
