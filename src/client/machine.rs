//! Delivery state machine shared by the Rust client and the browser runtime.
//!
//! ```text
//!              ConnectRequested / ReconnectDue
//! Disconnected ───────────────────────────────► Connecting
//!      ▲                                            │ Opened
//!      │ Closed (schedule reconnect, poll)          ▼
//!      └─────────────────────────────────────────  Open
//! ```
//!
//! Polling runs whenever the channel is not open, and keeps running after
//! `Open` until the first push event arrives.

use std::time::Duration;

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryInput {
    ConnectRequested,
    Opened,
    PushReceived,
    Closed,
    ReconnectDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAction {
    Connect,
    StartPolling,
    StopPolling,
    ScheduleReconnect(Duration),
}

#[derive(Debug, Clone)]
pub struct DeliveryMachine {
    state: ChannelState,
    polling: bool,
    reconnect_backoff: Duration,
}

impl DeliveryMachine {
    pub fn new(reconnect_backoff: Duration) -> Self {
        Self {
            state: ChannelState::Disconnected,
            polling: false,
            reconnect_backoff,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Advances the machine. Inputs that make no sense in the current state
    /// are ignored and yield no actions.
    pub fn handle(
        &mut self,
        input: DeliveryInput,
    ) -> Vec<DeliveryAction> {
        let mut actions = Vec::new();

        match (self.state, input) {
            (ChannelState::Disconnected, DeliveryInput::ConnectRequested)
            | (ChannelState::Disconnected, DeliveryInput::ReconnectDue) => {
                self.state = ChannelState::Connecting;
                actions.push(DeliveryAction::Connect);
                self.start_polling(&mut actions);
            }
            (ChannelState::Connecting, DeliveryInput::Opened) => {
                self.state = ChannelState::Open;
            }
            (ChannelState::Open, DeliveryInput::PushReceived) => {
                if self.polling {
                    self.polling = false;
                    actions.push(DeliveryAction::StopPolling);
                }
            }
            (ChannelState::Connecting, DeliveryInput::Closed) | (ChannelState::Open, DeliveryInput::Closed) => {
                self.state = ChannelState::Disconnected;
                actions.push(DeliveryAction::ScheduleReconnect(self.reconnect_backoff));
                self.start_polling(&mut actions);
            }
            (state, input) => {
                trace!(?state, ?input, "delivery input ignored");
            }
        }

        actions
    }

    fn start_polling(
        &mut self,
        actions: &mut Vec<DeliveryAction>,
    ) {
        if !self.polling {
            self.polling = true;
            actions.push(DeliveryAction::StartPolling);
        }
    }
}
