//! # notifier-sync
//!
//! Reactive value synchronization for server-rendered widget trees.
//!
//! A [`ValueNotifier`] holds a piece of server state. A [`ValueListener`]
//! binds it to a builder function and renders the current value into a
//! tagged container. When the value changes the binding rebuilds its
//! fragment, the [`RenderBatcher`] coalesces bursts into one flush, and the
//! [`ChangeFeed`] delivers the result to browsers over a WebSocket push
//! channel, or to pollers of `GET /state/{id}` when push is unavailable.
//!
//! ```ignore
//! let engine = SyncEngine::new(SyncConfig::new()?.validate()?)?;
//! let counter = engine.notifier(0i64);
//! let label = engine.listen(&counter, |v: &i64| Some(Text::new(format!("count: {v}"))));
//!
//! let html = label.render(); // embed in the page
//! counter.set(5);            // every connected page shows "count: 5"
//! ```

mod batcher;
mod binding;
mod change_detector;
mod config;
mod engine;
mod errors;
mod feed;
mod notifier;
mod registry;

pub mod client;
pub mod constants;
pub mod html;
pub mod metrics;
pub mod server;
pub mod utils;
pub mod widget;

pub use batcher::*;
pub use binding::*;
pub use change_detector::*;
pub use config::*;
pub use engine::*;
pub use errors::*;
pub use feed::*;
pub use notifier::*;
pub use registry::*;
