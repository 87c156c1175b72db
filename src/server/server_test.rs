use std::time::Duration;

use serde_json::json;
use serde_json::Value;

use super::push::parse_channel;
use super::push::ClientFrame;
use super::*;
use crate::config::DeliveryConfig;
use crate::config::SyncConfig;
use crate::feed::StateSnapshot;
use crate::widget::Text;

fn test_engine() -> Arc<SyncEngine> {
    SyncEngine::new(SyncConfig::default()).unwrap()
}

#[test]
fn test_parse_channel() {
    assert_eq!(parse_channel("state:vn-1").unwrap(), "vn-1");
    assert!(parse_channel("state:").is_err());
    assert!(parse_channel("vn-1").is_err());
}

#[test]
fn test_client_frame_shapes() {
    let frame: ClientFrame = serde_json::from_str(r#"{"action":"subscribe","channel":"state:vn-1"}"#).unwrap();
    assert_eq!(
        frame,
        ClientFrame::Subscribe {
            channel: "state:vn-1".into(),
            listeners: vec![],
        }
    );

    let frame: ClientFrame = serde_json::from_str(r#"{"action":"unsubscribe","channel":"state:vn-1"}"#).unwrap();
    assert_eq!(
        frame,
        ClientFrame::Unsubscribe {
            channel: "state:vn-1".into()
        }
    );

    assert!(serde_json::from_str::<ClientFrame>(r#"{"action":"shout"}"#).is_err());
}

#[tokio::test]
async fn test_poll_returns_latest_value() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    counter.set(7);

    let res = warp::test::request()
        .method("GET")
        .path(&format!("/state/{}", counter.id()))
        .reply(&routes(engine.clone()))
        .await;

    assert_eq!(res.status(), 200);
    let snapshot: StateSnapshot = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(snapshot.id, counter.id());
    assert_eq!(snapshot.value, json!(7));
    assert!(snapshot.html.is_none());
}

#[tokio::test]
async fn test_poll_unknown_notifier_is_404() {
    let engine = test_engine();
    let res = warp::test::request()
        .path("/state/vn-nope")
        .reply(&routes(engine))
        .await;

    assert_eq!(res.status(), 404);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["error"], json!("Unknown notifier: vn-nope"));
}

#[tokio::test(start_paused = true)]
async fn test_poll_with_listener_includes_current_html() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let listener = engine.listen(&counter, |v: &i64| Some(Text::new(format!("#{v}"))));
    listener.render();
    counter.set(3);
    engine.flush();
    tokio::task::yield_now().await;

    let res = warp::test::request()
        .path(&format!("/state/{}?listener={}", counter.id(), listener.id()))
        .reply(&routes(engine.clone()))
        .await;
    let snapshot: StateSnapshot = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(snapshot.value, json!(3));
    assert_eq!(snapshot.html.as_deref(), Some("#3"));
}

#[tokio::test]
async fn test_poll_since_returns_retained_events() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    counter.set(1);
    counter.set(2);

    let res = warp::test::request()
        .path(&format!("/state/{}?since=1", counter.id()))
        .reply(&routes(engine.clone()))
        .await;
    let body: PollEvents = serde_json::from_slice(res.body()).unwrap();
    let values: Vec<Value> = body.events.iter().map(|e| e.value.clone()).collect();
    assert_eq!(values, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_runtime_script_is_served() {
    let res = warp::test::request()
        .path("/notifier-sync.js")
        .reply(&script_route(&DeliveryConfig {
            poll_interval_ms: 750,
            reconnect_backoff_ms: 400,
            ..Default::default()
        }))
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["content-type"],
        "application/javascript; charset=utf-8"
    );
    let body = std::str::from_utf8(res.body()).unwrap();
    assert!(body.starts_with("window.NotifierSyncConfig="));
    assert!(body.contains("\"pollIntervalMs\":750"));
    assert!(body.contains("\"reconnectBackoffMs\":400"));
    assert!(body.contains("settings.pollIntervalMs"));
}

#[tokio::test]
async fn test_metrics_route_respects_flag() {
    let res = warp::test::request().path("/metrics").reply(&metrics_route(false)).await;
    assert_eq!(res.status(), 404);

    let res = warp::test::request().path("/metrics").reply(&metrics_route(true)).await;
    assert_eq!(res.status(), 200);
}

async fn recv_json(client: &mut warp::test::WsClient) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), client.recv())
        .await
        .expect("frame in time")
        .expect("open socket");
    serde_json::from_str(message.to_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_push_sends_snapshot_then_changes() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let channel = format!("state:{}", counter.id());

    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes(engine.clone()))
        .await
        .expect("handshake");

    client
        .send_text(json!({"action": "subscribe", "channel": channel}).to_string())
        .await;
    let snapshot = recv_json(&mut client).await;
    assert_eq!(snapshot["channel"], json!(channel));
    assert_eq!(snapshot["value"], json!(0));

    counter.set(5);
    let change = recv_json(&mut client).await;
    assert_eq!(change["value"], json!(5));
    assert_eq!(change["id"], json!(counter.id()));
    assert!(change["seq"].as_u64().unwrap() > snapshot["seq"].as_u64().unwrap());
}

#[tokio::test]
async fn test_push_rejects_bad_frames_without_closing() {
    let engine = test_engine();
    let counter = engine.notifier(true);

    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes(engine.clone()))
        .await
        .expect("handshake");

    client.send_text("not json").await;
    assert!(recv_json(&mut client).await["error"].is_string());

    client
        .send_text(json!({"action": "subscribe", "channel": "nope"}).to_string())
        .await;
    let error = recv_json(&mut client).await;
    assert!(error["error"].as_str().unwrap().contains("Invalid channel"));

    client
        .send_text(json!({"action": "subscribe", "channel": "state:vn-missing"}).to_string())
        .await;
    let error = recv_json(&mut client).await;
    assert!(error["error"].as_str().unwrap().contains("Unknown notifier"));

    // Still usable
    client
        .send_text(json!({"action": "subscribe", "channel": format!("state:{}", counter.id())}).to_string())
        .await;
    assert_eq!(recv_json(&mut client).await["value"], json!(true));
}

#[tokio::test]
async fn test_push_disconnect_releases_claimed_listeners() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let listener = engine.listen(&counter, |v: &i64| Some(Text::new(v.to_string())));
    listener.render();

    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes(engine.clone()))
        .await
        .expect("handshake");
    client
        .send_text(
            json!({
                "action": "subscribe",
                "channel": format!("state:{}", counter.id()),
                "listeners": [listener.id()],
            })
            .to_string(),
        )
        .await;
    recv_json(&mut client).await;

    drop(client);

    let registry = engine.registry().clone();
    let listener_id = listener.id().to_string();
    tokio::time::timeout(Duration::from_secs(2), async move {
        while registry.listener_info(&listener_id).map(|l| l.is_active()).unwrap_or(false) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener released after disconnect");

    assert!(!engine.registry().widget_info(listener.widget_id()).unwrap().is_active());
}

async fn subscribe_listener(
    engine: &Arc<SyncEngine>,
    notifier_id: &str,
    listener_id: &str,
) -> warp::test::WsClient {
    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes(engine.clone()))
        .await
        .expect("handshake");
    client
        .send_text(
            json!({
                "action": "subscribe",
                "channel": format!("state:{notifier_id}"),
                "listeners": [listener_id],
            })
            .to_string(),
        )
        .await;
    recv_json(&mut client).await;
    client
}

async fn wait_until_inactive(
    engine: &Arc<SyncEngine>,
    listener_id: &str,
) {
    let registry = engine.registry().clone();
    let listener_id = listener_id.to_string();
    tokio::time::timeout(Duration::from_secs(2), async move {
        while registry.listener_info(&listener_id).map(|l| l.is_active()).unwrap_or(false) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener released after disconnect");
}

#[tokio::test]
async fn test_push_reconnect_reclaims_listener() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let listener = engine.listen(&counter, |v: &i64| Some(Text::new(v.to_string())));
    listener.render();

    let first = subscribe_listener(&engine, counter.id(), listener.id()).await;
    drop(first);
    wait_until_inactive(&engine, listener.id()).await;

    let _second = subscribe_listener(&engine, counter.id(), listener.id()).await;
    let info = engine.registry().listener_info(listener.id()).unwrap();
    assert!(info.is_active());
    assert!(engine.registry().widget_info(listener.widget_id()).unwrap().is_active());

    let threshold = engine.registry().idle_threshold();
    let report = engine.sweep_at(tokio::time::Instant::now() + threshold * 2);
    assert_eq!(report.listeners_reaped, 0);

    counter.set(1);
    assert_eq!(counter.listener_count(), 1);
    assert!(engine.registry().listener_info(listener.id()).is_some());
}

#[tokio::test]
async fn test_push_claim_activates_per_request_binding() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let listener = engine
        .listener_builder()
        .notifier(counter.clone())
        .builder(|v: &i64| Some(Text::new(v.to_string())))
        .per_request()
        .build();
    listener.render();
    assert!(!engine.registry().listener_info(listener.id()).unwrap().is_active());

    let client = subscribe_listener(&engine, counter.id(), listener.id()).await;
    assert!(engine.registry().listener_info(listener.id()).unwrap().is_active());

    drop(client);
    wait_until_inactive(&engine, listener.id()).await;
}

#[tokio::test]
async fn test_poll_with_listener_touches_its_records() {
    let engine = test_engine();
    let counter = engine.notifier(0i64);
    let listener = engine
        .listener_builder()
        .notifier(counter.clone())
        .builder(|v: &i64| Some(Text::new(v.to_string())))
        .per_request()
        .build();
    listener.render();
    let before = engine.registry().listener_info(listener.id()).unwrap().last_used;

    let res = warp::test::request()
        .path(&format!("/state/{}?listener={}", counter.id(), listener.id()))
        .reply(&routes(engine.clone()))
        .await;
    assert_eq!(res.status(), 200);

    let info = engine.registry().listener_info(listener.id()).unwrap();
    assert!(info.last_used >= before);
    assert!(!info.is_active());
}
