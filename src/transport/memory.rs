//! In-process loopback transport.
//!
//! [`MemoryTransport`] implements the transport traits without any network.
//! It records every call the engine makes and lets the caller play the
//! server's part by emitting events on a channel. Clones share state, so a
//! test keeps one clone for inspection and hands another to the socket.
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let socket = Socket::new(Box::new(transport.clone()), options)?;
//! socket.subscribe("ChatChannel")?;
//! transport.confirm("ChatChannel");
//! transport.emit("ChatChannel", "new_message", &json!({ "content": "Hi" }));
//! assert_eq!(transport.subscribe_calls(), vec!["ChatChannel"]);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use anyhow::{bail, Result};

use super::{Connection, EventHandler, Subscription, Transport, SUBSCRIPTION_ERROR, SUBSCRIPTION_SUCCEEDED};

/// A call made against the loopback transport, in order of arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `Transport::connect`.
    Connect {
        /// Credential passed by the engine.
        credential: String,
        /// Verbatim transport options.
        options: serde_json::Value,
    },
    /// `Connection::subscribe`.
    Subscribe(String),
    /// `Connection::unsubscribe`.
    Unsubscribe(String),
    /// `Subscription::bind`.
    Bind {
        /// Channel name.
        channel: String,
        /// Event name.
        event: String,
    },
    /// `Subscription::unbind_all`.
    UnbindAll(String),
    /// `Subscription::trigger`.
    Trigger {
        /// Channel name.
        channel: String,
        /// Event name.
        event: String,
        /// Event payload.
        data: serde_json::Value,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<TransportCall>,
    subscriptions: HashMap<String, Rc<MemorySubscription>>,
    next_subscription_id: u64,
    fail_next_connect: Option<String>,
    fail_next_subscribe: Option<String>,
}

/// Loopback transport; see the module docs.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryTransport {
    /// Create a transport with no connection and no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.borrow().calls.clone()
    }

    /// Forget the recorded call history.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Connect { .. }))
            .count()
    }

    /// Channel names passed to `subscribe`, in order.
    #[must_use]
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Subscribe(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Channel names passed to `unsubscribe`, in order.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Unsubscribe(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(channel, event, data)` for every `trigger`, in order.
    #[must_use]
    pub fn trigger_calls(&self) -> Vec<(String, String, serde_json::Value)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Trigger { channel, event, data } => {
                    Some((channel.clone(), event.clone(), data.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Whether the server side currently holds a subscription for `channel`.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.state.borrow().subscriptions.contains_key(channel)
    }

    /// Serial number of the current subscription handle for `channel`.
    ///
    /// Each `subscribe` call yields a fresh number, which lets callers tell a
    /// new handle from a stale one.
    #[must_use]
    pub fn subscription_id(&self, channel: &str) -> Option<u64> {
        self.state.borrow().subscriptions.get(channel).map(|s| s.id)
    }

    /// Event names with at least one handler on `channel`'s subscription.
    #[must_use]
    pub fn bound_events(&self, channel: &str) -> Vec<String> {
        let Some(subscription) = self.current(channel) else {
            return Vec::new();
        };
        let mut events: Vec<String> = subscription
            .handlers
            .borrow()
            .iter()
            .map(|(event, _)| event.clone())
            .collect();
        events.dedup();
        events
    }

    /// Make the next `connect` fail with `message`.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_next_connect = Some(message.into());
    }

    /// Make the next `subscribe` fail with `message`.
    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_next_subscribe = Some(message.into());
    }

    /// Deliver `event` with `data` to the handlers bound on `channel`.
    ///
    /// Returns the number of handlers invoked. Handlers are snapshotted
    /// before the first one runs, so they may freely subscribe, unsubscribe
    /// or unbind.
    pub fn emit(&self, channel: &str, event: &str, data: &serde_json::Value) -> usize {
        let Some(subscription) = self.current(channel) else {
            log::trace!("[MemoryTransport] Dropping '{event}' for unknown channel '{channel}'");
            return 0;
        };

        let handlers: Vec<EventHandler> = subscription
            .handlers
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| Rc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(data);
        }
        handlers.len()
    }

    /// Report a successful subscription for `channel`.
    pub fn confirm(&self, channel: &str) -> usize {
        self.emit(channel, SUBSCRIPTION_SUCCEEDED, &serde_json::Value::Null)
    }

    /// Report a rejected subscription for `channel`.
    pub fn reject(&self, channel: &str, status: u16) -> usize {
        self.emit(
            channel,
            SUBSCRIPTION_ERROR,
            &serde_json::json!({ "type": "AuthError", "status": status }),
        )
    }

    fn current(&self, channel: &str) -> Option<Rc<MemorySubscription>> {
        self.state.borrow().subscriptions.get(channel).map(Rc::clone)
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, credential: &str, options: &serde_json::Value) -> Result<Rc<dyn Connection>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(TransportCall::Connect {
            credential: credential.to_string(),
            options: options.clone(),
        });
        if let Some(message) = state.fail_next_connect.take() {
            bail!(message);
        }

        Ok(Rc::new(MemoryConnection {
            state: Rc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct MemoryConnection {
    state: Rc<RefCell<MemoryState>>,
}

impl Connection for MemoryConnection {
    fn subscribe(&self, channel_name: &str) -> Result<Rc<dyn Subscription>> {
        let mut state = self.state.borrow_mut();
        state
            .calls
            .push(TransportCall::Subscribe(channel_name.to_string()));
        if let Some(message) = state.fail_next_subscribe.take() {
            bail!(message);
        }

        state.next_subscription_id += 1;
        let subscription = Rc::new(MemorySubscription {
            id: state.next_subscription_id,
            name: channel_name.to_string(),
            handlers: RefCell::new(Vec::new()),
            state: Rc::downgrade(&self.state),
        });
        state
            .subscriptions
            .insert(channel_name.to_string(), Rc::clone(&subscription));

        Ok(subscription)
    }

    fn unsubscribe(&self, channel_name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state
            .calls
            .push(TransportCall::Unsubscribe(channel_name.to_string()));
        state.subscriptions.remove(channel_name);
        Ok(())
    }
}

struct MemorySubscription {
    id: u64,
    name: String,
    handlers: RefCell<Vec<(String, EventHandler)>>,
    state: Weak<RefCell<MemoryState>>,
}

impl std::fmt::Debug for MemorySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySubscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handler_count", &self.handlers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl MemorySubscription {
    fn record(&self, call: TransportCall) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().calls.push(call);
        }
    }

    fn is_current(&self) -> bool {
        self.state.upgrade().is_some_and(|state| {
            state
                .borrow()
                .subscriptions
                .get(&self.name)
                .is_some_and(|s| s.id == self.id)
        })
    }
}

impl Subscription for MemorySubscription {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, event_name: &str, handler: EventHandler) {
        self.record(TransportCall::Bind {
            channel: self.name.clone(),
            event: event_name.to_string(),
        });
        self.handlers
            .borrow_mut()
            .push((event_name.to_string(), handler));
    }

    fn unbind_all(&self) {
        self.record(TransportCall::UnbindAll(self.name.clone()));
        self.handlers.borrow_mut().clear();
    }

    fn trigger(&self, event_name: &str, data: &serde_json::Value) -> Result<bool> {
        self.record(TransportCall::Trigger {
            channel: self.name.clone(),
            event: event_name.to_string(),
            data: data.clone(),
        });
        Ok(self.is_current())
    }
}
