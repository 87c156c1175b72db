use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use futures::SinkExt;
use futures::StreamExt;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ChannelState;
use super::DeliveryAction;
use super::DeliveryInput;
use super::DeliveryMachine;
use super::SyncClientBuilder;
use crate::config::DeliveryConfig;
use crate::constants::CHANNEL_PREFIX;
use crate::constants::PUSH_ROUTE;
use crate::constants::STATE_ROUTE;
use crate::errors::DeliveryError;
use crate::errors::SystemError;
use crate::feed::ChangeEvent;
use crate::feed::PushMessage;
use crate::feed::StateSnapshot;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connecting = BoxFuture<'static, std::result::Result<WsStream, tungstenite::Error>>;

/// Follows one notifier: push channel first, polling while it is down.
///
/// Applying an event means "set to this value"; an event older than the one
/// already applied is ignored, so double delivery over both paths is harmless.
pub struct SyncClient {
    notifier_id: String,
    latest: watch::Receiver<Option<ChangeEvent>>,
    channel: watch::Receiver<ChannelState>,
    offline: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncClient {
    pub fn builder(
        base_url: impl Into<String>,
        notifier_id: impl Into<String>,
    ) -> SyncClientBuilder {
        SyncClientBuilder::new(base_url, notifier_id)
    }

    pub(super) fn spawn(
        base_url: String,
        notifier_id: String,
        config: DeliveryConfig,
        push_enabled: bool,
    ) -> Result<Self> {
        config.validate()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let ws_base = if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            return Err(DeliveryError::PushUnavailable(format!("unsupported base url: {base_url}")).into());
        };

        let http = reqwest::Client::builder()
            .timeout(config.poll_interval())
            .build()
            .map_err(|e| DeliveryError::PollFailed(e.to_string()))?;

        let (latest_tx, latest) = watch::channel(None);
        let (channel_tx, channel) = watch::channel(ChannelState::Disconnected);
        let offline = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let driver = Driver {
            machine: DeliveryMachine::new(config.reconnect_backoff()),
            http,
            poll_url: format!("{base_url}/{STATE_ROUTE}/{notifier_id}"),
            ws_url: format!("{ws_base}/{PUSH_ROUTE}"),
            channel_name: format!("{CHANNEL_PREFIX}{notifier_id}"),
            poll_interval: config.poll_interval(),
            push_enabled,
            latest: latest_tx,
            channel: channel_tx,
            offline: offline.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(driver.run());

        Ok(Self {
            notifier_id,
            latest,
            channel,
            offline,
            cancel,
            handle,
        })
    }

    pub fn notifier_id(&self) -> &str {
        &self.notifier_id
    }

    /// Latest applied event, if any arrived yet.
    pub fn latest(&self) -> Option<ChangeEvent> {
        self.latest.borrow().clone()
    }

    /// Receiver notified every time a newer event is applied.
    pub fn subscribe(&self) -> watch::Receiver<Option<ChangeEvent>> {
        self.latest.clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.channel.borrow()
    }

    /// True while the last poll failed.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    /// Waits until an applied event satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&ChangeEvent) -> bool,
    ) -> Result<ChangeEvent> {
        let mut rx = self.latest.clone();
        let guard = rx
            .wait_for(|latest| latest.as_ref().map(&predicate).unwrap_or(false))
            .await
            .map_err(|_| DeliveryError::Closed)?;
        guard.clone().ok_or_else(|| DeliveryError::Closed.into())
    }

    /// Stops the driver and closes the push channel.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        (&mut self.handle).await.map_err(SystemError::TaskFailed)?;
        Ok(())
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    machine: DeliveryMachine,
    http: reqwest::Client,
    poll_url: String,
    ws_url: String,
    channel_name: String,
    poll_interval: Duration,
    push_enabled: bool,
    latest: watch::Sender<Option<ChangeEvent>>,
    channel: watch::Sender<ChannelState>,
    offline: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// Timers and connections the driver loop waits on; `None` never fires.
#[derive(Default)]
struct Pending {
    connecting: Option<Connecting>,
    socket: Option<WsStream>,
    poll: Option<Interval>,
    reconnect: Option<std::pin::Pin<Box<Sleep>>>,
}

impl Driver {
    async fn run(mut self) {
        let mut pending = Pending::default();

        if self.push_enabled {
            self.step(DeliveryInput::ConnectRequested, &mut pending);
        } else {
            self.apply(DeliveryAction::StartPolling, &mut pending);
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                result = wait_opt(&mut pending.connecting) => {
                    pending.connecting = None;
                    match result {
                        Ok(stream) => self.on_connected(stream, &mut pending).await,
                        Err(e) => {
                            debug!("push connect failed: {}", e);
                            self.step(DeliveryInput::Closed, &mut pending);
                        }
                    }
                }
                frame = next_frame(&mut pending.socket) => {
                    self.on_frame(frame, &mut pending);
                }
                _ = tick_opt(&mut pending.poll) => {
                    self.poll_once().await;
                }
                _ = wait_opt(&mut pending.reconnect) => {
                    pending.reconnect = None;
                    self.step(DeliveryInput::ReconnectDue, &mut pending);
                }
            }
        }

        if let Some(mut socket) = pending.socket.take() {
            let _ = socket.close(None).await;
        }
        debug!(url = %self.poll_url, "sync client stopped");
    }

    fn step(
        &mut self,
        input: DeliveryInput,
        pending: &mut Pending,
    ) {
        for action in self.machine.handle(input) {
            self.apply(action, pending);
        }
        self.channel.send_replace(self.machine.state());
    }

    fn apply(
        &mut self,
        action: DeliveryAction,
        pending: &mut Pending,
    ) {
        trace!(?action, "delivery action");
        match action {
            DeliveryAction::Connect => {
                let url = self.ws_url.clone();
                pending.connecting = Some(
                    async move { tokio_tungstenite::connect_async(url).await.map(|(stream, _)| stream) }.boxed(),
                );
            }
            DeliveryAction::StartPolling => {
                let mut interval = tokio::time::interval(self.poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                pending.poll = Some(interval);
            }
            DeliveryAction::StopPolling => {
                pending.poll = None;
                self.offline.store(false, Ordering::Relaxed);
            }
            DeliveryAction::ScheduleReconnect(backoff) => {
                pending.reconnect = Some(Box::pin(tokio::time::sleep(backoff)));
            }
        }
    }

    async fn on_connected(
        &mut self,
        mut stream: WsStream,
        pending: &mut Pending,
    ) {
        let subscribe = json!({ "action": "subscribe", "channel": self.channel_name }).to_string();
        match stream.send(Message::Text(subscribe)).await {
            Ok(()) => {
                info!(url = %self.ws_url, "push channel open");
                pending.socket = Some(stream);
                self.step(DeliveryInput::Opened, pending);
            }
            Err(e) => {
                debug!("push subscribe failed: {}", e);
                self.step(DeliveryInput::Closed, pending);
            }
        }
    }

    fn on_frame(
        &mut self,
        frame: Option<std::result::Result<Message, tungstenite::Error>>,
        pending: &mut Pending,
    ) {
        match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<PushMessage>(&text) {
                Ok(message) if message.channel == self.channel_name => {
                    self.apply_event(message.event);
                    self.step(DeliveryInput::PushReceived, pending);
                }
                Ok(_) => {}
                Err(_) => warn!("push channel error frame: {}", text),
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                warn!(url = %self.ws_url, "push channel closed, falling back to polling");
                pending.socket = None;
                self.step(DeliveryInput::Closed, pending);
            }
            Some(Ok(_)) => {}
        }
    }

    async fn poll_once(&mut self) {
        match self.fetch_snapshot().await {
            Ok(snapshot) => {
                self.offline.store(false, Ordering::Relaxed);
                self.apply_event(snapshot.into());
            }
            Err(e) => {
                if !self.offline.swap(true, Ordering::Relaxed) {
                    warn!(url = %self.poll_url, "polling failed, offline: {}", e);
                }
            }
        }
    }

    async fn fetch_snapshot(&self) -> std::result::Result<StateSnapshot, DeliveryError> {
        let response = self
            .http
            .get(&self.poll_url)
            .send()
            .await
            .map_err(|e| DeliveryError::PollFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DeliveryError::UnknownNotifier(self.poll_url.clone()));
        }
        response
            .error_for_status()
            .map_err(|e| DeliveryError::PollFailed(e.to_string()))?
            .json::<StateSnapshot>()
            .await
            .map_err(|e| DeliveryError::PollFailed(e.to_string()))
    }

    /// Applies `event` if it is newer than the current one.
    fn apply_event(
        &self,
        event: ChangeEvent,
    ) {
        self.latest.send_if_modified(|current| {
            if is_newer(&event, current.as_ref()) {
                *current = Some(event);
                true
            } else {
                false
            }
        });
    }
}

/// Newer notifier version wins; within one version the later feed entry does.
pub(crate) fn is_newer(
    event: &ChangeEvent,
    current: Option<&ChangeEvent>,
) -> bool {
    match current {
        None => true,
        Some(current) => (event.version, event.seq) > (current.version, current.seq),
    }
}

async fn wait_opt<F>(future: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match future {
        Some(f) => f.await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match socket {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}
