use futures::SinkExt;
use futures::StreamExt;
use notifier_sync::widget::Text;
use notifier_sync::PushMessage;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::common::delivery_timeout;
use crate::common::start_server;

async fn next_push<S>(socket: &mut S) -> PushMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(delivery_timeout(), socket.next())
            .await
            .expect("push frame in time")
            .expect("socket open")
            .expect("frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("push message");
        }
    }
}

#[tokio::test]
async fn test_burst_arrives_as_one_render() {
    let server = start_server().await;
    let counter = server.engine.notifier(0i64);
    let listener = server
        .engine
        .listen(&counter, |v: &i64| Some(Text::new(v.to_string())));
    listener.render();

    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    let channel = format!("state:{}", counter.id());
    socket
        .send(Message::Text(
            json!({"action": "subscribe", "channel": channel, "listeners": [listener.id()]}).to_string(),
        ))
        .await
        .unwrap();

    let snapshot = next_push(&mut socket).await;
    assert_eq!(snapshot.channel, channel);
    assert_eq!(snapshot.event.value, json!(0));

    for v in 1..=5 {
        counter.set(v);
    }

    // Five value events, then exactly one render carrying the final value
    let mut renders = Vec::new();
    let mut last_value = None;
    while renders.is_empty() {
        let message = next_push(&mut socket).await;
        if message.event.listener.is_some() {
            renders.push(message.event);
        } else {
            last_value = Some(message.event.value);
        }
    }
    assert_eq!(last_value, Some(json!(5)));
    assert_eq!(renders[0].value, json!(5));
    assert_eq!(renders[0].html.as_deref(), Some("5"));

    let more = tokio::time::timeout(std::time::Duration::from_millis(200), socket.next()).await;
    assert!(more.is_err(), "no second render for the same window");

    server.stop().await;
}

#[tokio::test]
async fn test_two_clients_see_same_sequence() {
    let server = start_server().await;
    let flag = server.engine.notifier(false);
    let channel = format!("state:{}", flag.id());
    let subscribe = json!({"action": "subscribe", "channel": channel}).to_string();

    let (mut a, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    let (mut b, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    a.send(Message::Text(subscribe.clone())).await.unwrap();
    b.send(Message::Text(subscribe)).await.unwrap();
    next_push(&mut a).await;
    next_push(&mut b).await;

    flag.set(true);
    let from_a = next_push(&mut a).await;
    let from_b = next_push(&mut b).await;
    assert_eq!(from_a.event, from_b.event);
    assert_eq!(from_a.event.value, json!(true));

    server.stop().await;
}
