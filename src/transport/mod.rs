//! Transport adapter boundary.
//!
//! The socket engine treats the hosted pub/sub client as opaque. It only
//! needs to open one connection, subscribe and unsubscribe by channel name,
//! bind handlers to event names on a subscription, and trigger client events.
//! Framing, authentication, heartbeats and reconnection all live behind
//! these traits.
//!
//! # Architecture
//!
//! ```text
//! Transport ── connect(credential, options) ──► Connection
//!                                                   │
//!                               subscribe(name) ───►│──► Subscription
//!                                                   │        │ bind(event, handler)
//!                               unsubscribe(name) ─►│        │ unbind_all()
//!                                                            │ trigger(event, data)
//! ```
//!
//! Everything here is single-threaded: handles are shared through `Rc` and
//! handlers are plain `Fn` closures invoked on the caller's thread.

pub mod memory;

use std::rc::Rc;

use anyhow::Result;

pub use memory::MemoryTransport;

/// Event fired by the transport once the server accepts a subscription.
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";

/// Event fired by the transport when the server rejects a subscription.
pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";

/// Handler bound to a subscription event.
pub type EventHandler = Rc<dyn Fn(&serde_json::Value)>;

/// Factory for the single shared connection.
pub trait Transport {
    /// Open a connection authenticated with `credential`.
    ///
    /// `options` is the verbatim `transportOptions` value from the socket
    /// configuration.
    fn connect(&self, credential: &str, options: &serde_json::Value) -> Result<Rc<dyn Connection>>;
}

/// An open connection to the messaging service.
pub trait Connection {
    /// Issue a server-side subscription for `channel_name`.
    ///
    /// Returns immediately; success or failure is reported later through the
    /// [`SUBSCRIPTION_SUCCEEDED`] / [`SUBSCRIPTION_ERROR`] events.
    fn subscribe(&self, channel_name: &str) -> Result<Rc<dyn Subscription>>;

    /// Drop the server-side subscription for `channel_name`.
    fn unsubscribe(&self, channel_name: &str) -> Result<()>;
}

/// Handle for one server-side channel subscription.
pub trait Subscription {
    /// Channel name this subscription belongs to.
    fn name(&self) -> &str;

    /// Register `handler` for `event_name`.
    fn bind(&self, event_name: &str, handler: EventHandler);

    /// Remove every handler bound on this subscription.
    fn unbind_all(&self);

    /// Send a client event through this subscription.
    ///
    /// Returns the transport's verdict on whether the event was accepted.
    fn trigger(&self, event_name: &str, data: &serde_json::Value) -> Result<bool>;
}
