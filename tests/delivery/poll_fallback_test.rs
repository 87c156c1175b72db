use notifier_sync::widget::Text;
use notifier_sync::StateSnapshot;
use serde_json::json;

use crate::common::start_server;

/// With push unavailable the polling endpoint still reports the last
/// mutation, read from the same change feed push subscribers use.
#[tokio::test]
async fn test_poll_reflects_last_mutation() {
    let server = start_server().await;
    let counter = server.engine.notifier(0i64);
    let listener = server
        .engine
        .listen(&counter, |v: &i64| Some(Text::new(format!("count {v}"))));
    listener.render();

    counter.set(5);
    counter.set(6);
    server.engine.flush();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let url = format!(
        "{}/state/{}?listener={}",
        server.base_url(),
        counter.id(),
        listener.id()
    );
    let snapshot: StateSnapshot = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_eq!(snapshot.value, json!(6));
    assert_eq!(snapshot.html.as_deref(), Some("count 6"));
    assert_eq!(
        snapshot.seq,
        server.engine.feed().latest(counter.id()).unwrap().seq
    );

    server.stop().await;
}

#[tokio::test]
async fn test_poll_unknown_notifier() {
    let server = start_server().await;
    let res = reqwest::get(format!("{}/state/vn-gone", server.base_url()))
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    server.stop().await;
}

#[tokio::test]
async fn test_dropped_notifier_disappears_from_poll() {
    let server = start_server().await;
    let notifier = server.engine.notifier(String::from("bye"));
    let url = format!("{}/state/{}", server.base_url(), notifier.id());

    assert!(reqwest::get(&url).await.unwrap().status().is_success());
    drop(notifier);
    assert_eq!(
        reqwest::get(&url).await.unwrap().status(),
        reqwest::StatusCode::NOT_FOUND
    );
    server.stop().await;
}
