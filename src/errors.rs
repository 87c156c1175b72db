//! Error hierarchy for the value synchronization engine
//!
//! Errors are grouped by the layer that produces them. Render paths never
//! surface these to their caller: a [`BindingError`] is turned into an inline
//! diagnostic fragment and a [`DeliveryError`] into a fallback path or an
//! HTTP status code.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Listener binding failures (missing notifier/builder, builder panics)
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Push channel and polling failures
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Infrastructure-level failures (io, serialization, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// Binding constructed without a value notifier
    #[error("listener {listener_id} has no value notifier")]
    MissingNotifier { listener_id: String },

    /// Binding constructed without a builder function
    #[error("listener {listener_id} has no builder")]
    MissingBuilder { listener_id: String },

    /// Builder ran but produced no widget
    #[error("builder of listener {listener_id} returned no widget for notifier {notifier_id}")]
    EmptyBuild {
        listener_id: String,
        notifier_id: String,
    },

    /// Builder or widget render panicked; the panic was contained
    #[error("builder of listener {listener_id} panicked: {message}")]
    BuilderPanicked {
        listener_id: String,
        message: String,
    },

    /// Current value could not be serialized for the wire
    #[error("value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BindingError {
    /// Stable identifier rendered as `data-error-kind` in diagnostic fragments.
    pub fn kind(&self) -> &'static str {
        match self {
            BindingError::MissingNotifier { .. } => "missing-notifier",
            BindingError::MissingBuilder { .. } => "missing-builder",
            BindingError::EmptyBuild { .. } => "empty-build",
            BindingError::BuilderPanicked { .. } => "builder-panic",
            BindingError::Serialization(_) => "serialization",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// No change feed exists for this notifier id
    #[error("Unknown notifier: {0}")]
    UnknownNotifier(String),

    /// Channel name is not of the form `state:{notifierID}`
    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    /// Push connection could not be opened or was lost
    #[error("Push channel unavailable: {0}")]
    PushUnavailable(String),

    /// Polling request failed
    #[error("Polling failed: {0}")]
    PollFailed(String),

    /// Receiving side was dropped
    #[error("Delivery channel closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Failed to bind server: {0}")]
    ServerBind(String),

    #[error("{0}")]
    SignalSenderClosed(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Json(e))
    }
}
