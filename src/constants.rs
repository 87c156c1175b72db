// -
// Bootstrap markup attributes

/// Notifier a listener container is bound to
pub const ATTR_NOTIFIER_ID: &str = "data-value-notifier-id";
/// Binding that produced the container
pub const ATTR_LISTENER_ID: &str = "data-listener-id";
/// Widget owning the binding
pub const ATTR_WIDGET_ID: &str = "data-widget-id";
/// JSON snapshot of the value the container was rendered with
pub const ATTR_VALUE: &str = "data-value";
/// Wire type tag of the value (`int`, `string`, `bool`, `float`, `json`)
pub const ATTR_VALUE_TYPE: &str = "data-value-type";
/// Milliseconds since epoch of the render
pub const ATTR_LAST_UPDATED: &str = "data-last-updated";
/// Diagnostic fragment error kind
pub const ATTR_ERROR_KIND: &str = "data-error-kind";

pub const LISTENER_CONTAINER_CLASS: &str = "vn-listener";
pub const ERROR_FRAGMENT_CLASS: &str = "vn-error";

// -
// Delivery channel

/// Logical push channel name is `state:{notifierID}`
pub const CHANNEL_PREFIX: &str = "state:";

/// `GET /state/{notifierID}`
pub const STATE_ROUTE: &str = "state";
/// `GET /ws` push channel upgrade
pub const PUSH_ROUTE: &str = "ws";
/// `GET /notifier-sync.js` browser runtime
pub const RUNTIME_SCRIPT_ROUTE: &str = "notifier-sync.js";
/// `GET /metrics`
pub const METRICS_ROUTE: &str = "metrics";

// -
// Ids

pub const NOTIFIER_ID_PREFIX: &str = "vn-";
pub const LISTENER_ID_PREFIX: &str = "vl-";
pub const WIDGET_ID_PREFIX: &str = "vw-";

/// Widget type recorded in the registry for listener bindings
pub const VALUE_LISTENER_WIDGET_TYPE: &str = "ValueListener";
