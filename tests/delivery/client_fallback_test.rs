use notifier_sync::client::ChannelState;
use notifier_sync::client::SyncClient;
use serde_json::json;

use crate::common::delivery_timeout;
use crate::common::start_poll_only_server;
use crate::common::start_server;
use crate::common::POLL_INTERVAL_IN_MS;

#[tokio::test]
async fn test_client_uses_push_when_available() {
    let server = start_server().await;
    let counter = server.engine.notifier(0i64);

    let client = SyncClient::builder(server.base_url(), counter.id())
        .poll_interval(std::time::Duration::from_millis(POLL_INTERVAL_IN_MS))
        .connect()
        .unwrap();

    tokio::time::timeout(delivery_timeout(), async {
        while client.channel_state() != ChannelState::Open {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("push channel opens");

    counter.set(42);
    let event = tokio::time::timeout(delivery_timeout(), client.wait_for(|e| e.value == json!(42)))
        .await
        .expect("value delivered")
        .unwrap();
    assert_eq!(event.id, counter.id());

    client.shutdown().await.unwrap();
    server.stop().await;
}

/// Push upgrade refused: the client stays disconnected and follows the
/// notifier by polling alone.
#[tokio::test]
async fn test_client_falls_back_to_polling() {
    let server = start_poll_only_server().await;
    let counter = server.engine.notifier(1i64);

    let client = SyncClient::builder(server.base_url(), counter.id())
        .poll_interval(std::time::Duration::from_millis(POLL_INTERVAL_IN_MS))
        .connect()
        .unwrap();

    tokio::time::timeout(delivery_timeout(), client.wait_for(|e| e.value == json!(1)))
        .await
        .expect("initial value polled")
        .unwrap();

    counter.set(2);
    tokio::time::timeout(delivery_timeout(), client.wait_for(|e| e.value == json!(2)))
        .await
        .expect("mutation polled")
        .unwrap();

    assert_ne!(client.channel_state(), ChannelState::Open);
    assert!(!client.is_offline());

    client.shutdown().await.unwrap();
    server.stop().await;
}
