//! One push session per WebSocket connection.
//!
//! The socket is split: a writer task drains an unbounded queue into the
//! sink, and every subscribed channel gets a forwarder task that copies its
//! broadcast receiver into that queue. The read loop parses client frames.
//! Listeners a client claims are unregistered when the connection ends, so
//! the reclamation sweep can reap them.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use warp::ws::Message;
use warp::ws::WebSocket;

use crate::constants::CHANNEL_PREFIX;
use crate::engine::SyncEngine;
use crate::errors::DeliveryError;
use crate::feed::ChangeEvent;
use crate::feed::ChangeFeed;
use crate::feed::PushMessage;
use crate::metrics::PUSH_SUBSCRIPTIONS;
use crate::registry::ListenerId;

/// Frames a browser sends on the push channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub(crate) enum ClientFrame {
    Subscribe {
        channel: String,
        /// Listener bindings on the page that render this notifier
        #[serde(default)]
        listeners: Vec<ListenerId>,
    },
    Unsubscribe {
        channel: String,
    },
}

/// `state:{id}` -> `id`
pub(crate) fn parse_channel(channel: &str) -> Result<&str, DeliveryError> {
    match channel.strip_prefix(CHANNEL_PREFIX) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(DeliveryError::InvalidChannel(channel.to_string())),
    }
}

pub(super) async fn run_session(
    socket: WebSocket,
    engine: Arc<SyncEngine>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        let mut out_rx = UnboundedReceiverStream::new(out_rx);
        while let Some(message) = out_rx.next().await {
            if let Err(e) = ws_tx.send(message).await {
                debug!("push write failed: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut session = PushSession {
        engine,
        out: out_tx,
        channels: HashMap::new(),
        listeners: HashSet::new(),
    };
    debug!("push session opened");

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                debug!("push read failed: {}", e);
                break;
            }
        };
        if message.is_close() {
            break;
        }
        // Pings are answered by the transport, binary frames are not ours
        let Ok(text) = message.to_str() else {
            continue;
        };
        session.handle_frame(text);
    }

    session.close();
    drop(session);
    let _ = writer.await;
    debug!("push session closed");
}

struct PushSession {
    engine: Arc<SyncEngine>,
    out: mpsc::UnboundedSender<Message>,
    /// Notifier id -> forwarder task
    channels: HashMap<String, JoinHandle<()>>,
    listeners: HashSet<ListenerId>,
}

impl PushSession {
    fn handle_frame(
        &mut self,
        text: &str,
    ) {
        trace!(frame = text, "push frame");
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.send_error(&format!("malformed frame: {e}"));
                return;
            }
        };

        let result = match frame {
            ClientFrame::Subscribe { channel, listeners } => self.subscribe(&channel, listeners),
            ClientFrame::Unsubscribe { channel } => self.unsubscribe(&channel),
        };
        if let Err(e) = result {
            self.send_error(&e.to_string());
        }
    }

    fn subscribe(
        &mut self,
        channel: &str,
        listeners: Vec<ListenerId>,
    ) -> Result<(), DeliveryError> {
        let notifier_id = parse_channel(channel)?.to_string();
        let feed = self.engine.feed().clone();

        let registry = self.engine.registry();
        for listener_id in &listeners {
            // A reconnecting page claims listeners its previous session released
            if registry.reactivate_listener(listener_id) {
                self.listeners.insert(listener_id.clone());
            }
        }

        if !self.channels.contains_key(&notifier_id) {
            let receiver = feed
                .subscribe(&notifier_id)
                .ok_or_else(|| DeliveryError::UnknownNotifier(notifier_id.clone()))?;
            let forwarder = tokio::spawn(forward(
                channel.to_string(),
                notifier_id.clone(),
                receiver,
                feed.clone(),
                self.out.clone(),
            ));
            self.channels.insert(notifier_id.clone(), forwarder);
            PUSH_SUBSCRIPTIONS.inc();
            debug!(%notifier_id, "push subscription added");
        }

        // Snapshot first so the client never waits for the next change
        let snapshot = feed
            .snapshot(&notifier_id, None)
            .ok_or_else(|| DeliveryError::UnknownNotifier(notifier_id.clone()))?;
        self.send_event(channel, snapshot.into());

        for listener_id in &listeners {
            if let Some(render) = feed
                .snapshot(&notifier_id, Some(listener_id))
                .filter(|s| s.html.is_some())
            {
                let mut event: ChangeEvent = render.into();
                event.listener = Some(listener_id.clone());
                self.send_event(channel, event);
            }
        }
        Ok(())
    }

    fn unsubscribe(
        &mut self,
        channel: &str,
    ) -> Result<(), DeliveryError> {
        let notifier_id = parse_channel(channel)?;
        if let Some(forwarder) = self.channels.remove(notifier_id) {
            forwarder.abort();
            PUSH_SUBSCRIPTIONS.dec();
            debug!(%notifier_id, "push subscription removed");
        }
        Ok(())
    }

    fn send_event(
        &self,
        channel: &str,
        event: ChangeEvent,
    ) {
        let _ = send_message(
            &self.out,
            &PushMessage {
                channel: channel.to_string(),
                event,
            },
        );
    }

    fn send_error(
        &self,
        message: &str,
    ) {
        debug!("push client error: {}", message);
        let _ = self.out.send(Message::text(json!({ "error": message }).to_string()));
    }

    /// Stops forwarders and releases every listener this client claimed.
    fn close(&mut self) {
        for (_, forwarder) in self.channels.drain() {
            forwarder.abort();
            PUSH_SUBSCRIPTIONS.dec();
        }

        let registry = self.engine.registry();
        for listener_id in self.listeners.drain() {
            if let Some(info) = registry.listener_info(&listener_id) {
                registry.unregister_widget(&info.widget_id);
                registry.unregister_listener(&listener_id);
            }
        }
    }
}

fn send_message(
    out: &mpsc::UnboundedSender<Message>,
    message: &PushMessage,
) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => out.send(Message::text(text)).is_ok(),
        Err(e) => {
            warn!("push frame serialization failed: {}", e);
            true
        }
    }
}

async fn forward(
    channel: String,
    notifier_id: String,
    mut receiver: tokio::sync::broadcast::Receiver<ChangeEvent>,
    feed: Arc<ChangeFeed>,
    out: mpsc::UnboundedSender<Message>,
) {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(%notifier_id, skipped, "push subscriber lagged, resyncing");
                match feed.snapshot(&notifier_id, None) {
                    Some(snapshot) => snapshot.into(),
                    None => break,
                }
            }
            Err(RecvError::Closed) => {
                debug!(%notifier_id, "change feed closed");
                break;
            }
        };

        let message = PushMessage {
            channel: channel.clone(),
            event,
        };
        if !send_message(&out, &message) {
            break;
        }
    }
}
