//! Socket engine: shared connection, channel registry and event routing.
//!
//! Many components can declare interest in the same channel name. The socket
//! keeps one transport connection, at most one transport subscription per
//! channel name, and fans every inbound event out to the registrations for
//! that name, each invoked with its own component as context.
//!
//! # Architecture
//!
//! ```text
//!   add_channel(name, descriptor, component)
//!         │
//!         ▼
//!   ChannelRegistry ── name → [Registration(uid A), Registration(uid B)]
//!   ContextCache    ── uid  → (Rc<C>, refs)
//!         │
//!   subscribe(name) ──► Connection::subscribe(name) ──► Subscription
//!                                                          │ bind(succeeded / error / custom events)
//!                                                          ▼
//!   fire_channel_event(name, event) ◄──── transport invokes handler
//!         │
//!         └─► snapshot registrations → look up context → callback(&C, ..)
//!
//!   remove_channel(name, uid) ── last one out ──► unbind_all + Connection::unsubscribe(name)
//! ```
//!
//! # Per-channel lifecycle
//!
//! ```text
//! UNREGISTERED → REGISTERED → SUBSCRIBING → SUBSCRIBED | REJECTED → UNSUBSCRIBED → UNREGISTERED
//! ```
//!
//! A rejected subscription is never retried on its own; calling
//! [`Socket::subscribe`] again replaces it with a fresh one.
//!
//! # Reentrancy
//!
//! Everything runs on one thread. No `RefCell` borrow is held while a user
//! callback or a transport method runs, so callbacks may add or remove
//! registrations, subscribe or unsubscribe. Dispatch walks a snapshot of the
//! registrations and skips any removed after the snapshot was taken. A
//! `subscribed` or `rejected` announcement stops early once a callback tears
//! down or replaces the subscription it announces.

mod context;
mod registry;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::component::{Component, ComponentId};
use crate::config::SocketOptions;
use crate::descriptor::ChannelDescriptor;
use crate::error::SocketError;
use crate::logger::{DebugLevel, Logger};
use crate::transport::{
    Connection, EventHandler, Subscription, Transport, SUBSCRIPTION_ERROR, SUBSCRIPTION_SUCCEEDED,
};

use context::ContextCache;
use registry::ChannelRegistry;

pub use registry::Registration;

/// State of the transport subscription for one channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Requested; waiting for the server's verdict.
    Subscribing,
    /// The server accepted the subscription.
    Subscribed,
    /// The server rejected the subscription.
    Rejected,
}

/// Event delivered to the registrations of a channel.
#[derive(Debug, Clone, Copy)]
pub enum ChannelEvent<'a> {
    /// Invokes `subscribed`.
    Subscribed,
    /// Invokes `unsubscribed`.
    Unsubscribed,
    /// Invokes `rejected`.
    Rejected,
    /// Invokes the handler bound to `event_name`.
    Received {
        /// Custom event name.
        event_name: &'a str,
        /// Event payload.
        data: &'a serde_json::Value,
    },
}

struct SubscriptionEntry {
    handle: Rc<dyn Subscription>,
    state: SubscriptionState,
    bound_events: HashSet<String>,
}

struct SocketInner<C> {
    transport: Box<dyn Transport>,
    options: SocketOptions,
    logger: Logger,
    connection: RefCell<Option<Rc<dyn Connection>>>,
    channels: RefCell<ChannelRegistry<C>>,
    subscriptions: RefCell<HashMap<String, SubscriptionEntry>>,
    contexts: RefCell<ContextCache<C>>,
}

/// Channel subscription multiplexer.
///
/// Cheap to clone: clones share the same engine. Create one per application
/// and hand clones to whatever needs it (see [`crate::ChannelBinding`]).
pub struct Socket<C: Component + 'static> {
    inner: Rc<SocketInner<C>>,
}

impl<C: Component + 'static> Clone for Socket<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Component + 'static> fmt::Debug for Socket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("connected", &self.is_connected())
            .field("channels", &*self.inner.channels.borrow())
            .field("subscriptions", &self.inner.subscriptions.borrow().len())
            .field("contexts", &*self.inner.contexts.borrow())
            .field("logger", &self.inner.logger)
            .finish_non_exhaustive()
    }
}

impl<C: Component + 'static> Socket<C> {
    /// Create the engine.
    ///
    /// Connects right away when `options.connect_immediately` is set;
    /// otherwise the first [`Self::subscribe`] connects.
    pub fn new(transport: Box<dyn Transport>, options: SocketOptions) -> Result<Self, SocketError> {
        let logger = options.logger();
        let socket = Self {
            inner: Rc::new(SocketInner {
                transport,
                options,
                logger,
                connection: RefCell::new(None),
                channels: RefCell::new(ChannelRegistry::default()),
                subscriptions: RefCell::new(HashMap::new()),
                contexts: RefCell::new(ContextCache::default()),
            }),
        };

        if socket.inner.options.connect_immediately {
            socket.connect()?;
        }
        Ok(socket)
    }

    /// Options the engine was created with.
    #[must_use]
    pub fn options(&self) -> &SocketOptions {
        &self.inner.options
    }

    /// Gated logger used for engine diagnostics.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Open the transport connection if it is not open yet.
    ///
    /// Fails with [`SocketError::InvalidCredential`] when the credential is
    /// missing, empty or contains whitespace.
    pub fn connect(&self) -> Result<(), SocketError> {
        self.connection().map(|_| ())
    }

    /// Whether the transport connection has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.borrow().is_some()
    }

    /// Subscribe to `channel_name` on the server.
    ///
    /// Connects first if needed. Does nothing when a live subscription for
    /// the name already exists. The call returns once the request is issued;
    /// the outcome arrives through the `subscribed` / `rejected` callbacks.
    pub fn subscribe(&self, channel_name: &str) -> Result<(), SocketError> {
        let connection = self.connection()?;

        let stale = {
            let mut subscriptions = self.inner.subscriptions.borrow_mut();
            let state = subscriptions.get(channel_name).map(|entry| entry.state);
            match state {
                Some(SubscriptionState::Rejected) => subscriptions.remove(channel_name),
                Some(_) => {
                    drop(subscriptions);
                    self.log(
                        &format!("Already subscribed to channel '{channel_name}'."),
                        DebugLevel::All,
                    );
                    return Ok(());
                }
                None => None,
            }
        };
        if let Some(entry) = stale {
            self.log(
                &format!("Replacing rejected subscription for channel '{channel_name}'."),
                DebugLevel::Info,
            );
            entry.handle.unbind_all();
            connection.unsubscribe(channel_name)?;
        }

        let handle = connection.subscribe(channel_name)?;
        self.inner.subscriptions.borrow_mut().insert(
            channel_name.to_string(),
            SubscriptionEntry {
                handle: Rc::clone(&handle),
                state: SubscriptionState::Subscribing,
                bound_events: HashSet::new(),
            },
        );

        let weak = Rc::downgrade(&self.inner);
        let name = channel_name.to_string();
        handle.bind(
            SUBSCRIPTION_SUCCEEDED,
            Rc::new(move |_: &serde_json::Value| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.channel_subscribed(&name);
                }
            }),
        );

        let weak = Rc::downgrade(&self.inner);
        let name = channel_name.to_string();
        handle.bind(
            SUBSCRIPTION_ERROR,
            Rc::new(move |data: &serde_json::Value| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.subscription_rejected(&name, data);
                }
            }),
        );

        let events = self.inner.channels.borrow().event_names(channel_name);
        self.bind_events(channel_name, &handle, events);

        self.log(
            &format!("Subscribing to channel '{channel_name}'."),
            DebugLevel::Info,
        );
        Ok(())
    }

    /// Tear down the subscription for `channel_name`.
    ///
    /// Fires `unsubscribed` on every registration for the name. Does nothing
    /// when there is no subscription. Registrations stay in place, so a
    /// later [`Self::subscribe`] picks them up again.
    pub fn unsubscribe(&self, channel_name: &str) -> Result<(), SocketError> {
        let Some(entry) = self.inner.subscriptions.borrow_mut().remove(channel_name) else {
            return Ok(());
        };

        let result = self.teardown(channel_name, &entry);
        self.fire_channel_event(channel_name, ChannelEvent::Unsubscribed);
        self.log(
            &format!("Unsubscribed from channel '{channel_name}'."),
            DebugLevel::Info,
        );
        result
    }

    /// Send a client event through the subscription for `channel_name`.
    ///
    /// Returns what the transport's `trigger` returned. Fails with
    /// [`SocketError::NotSubscribed`] when no live subscription exists; the
    /// transport is not touched in that case.
    pub fn perform(
        &self,
        channel_name: &str,
        event_name: &str,
        data: &serde_json::Value,
    ) -> Result<bool, SocketError> {
        let handle = {
            let subscriptions = self.inner.subscriptions.borrow();
            match subscriptions.get(channel_name) {
                Some(entry) if entry.state != SubscriptionState::Rejected => {
                    Rc::clone(&entry.handle)
                }
                _ => return Err(SocketError::NotSubscribed(channel_name.to_string())),
            }
        };

        let accepted = handle.trigger(event_name, data)?;
        self.log(
            &format!("Performed '{event_name}' on channel '{channel_name}'."),
            DebugLevel::Info,
        );
        Ok(accepted)
    }

    /// Register `descriptor` for `component` under `name`.
    ///
    /// A component registers at most once per name; repeating the call is a
    /// no-op. If the name is already subscribed, handlers for event names it
    /// has not seen yet are bound right away.
    pub fn add_channel(&self, name: &str, descriptor: ChannelDescriptor<C>, component: &Rc<C>) {
        let uid = component.uid();
        let registration = Rc::new(Registration::new(uid, name, descriptor));
        let events: Vec<String> = registration
            .descriptor()
            .event_names()
            .map(str::to_string)
            .collect();

        if !self.inner.channels.borrow_mut().insert(registration) {
            self.log(
                &format!("Channel '{name}' is already registered for {uid}."),
                DebugLevel::All,
            );
            return;
        }
        self.inner.contexts.borrow_mut().acquire(component);

        let live = self
            .inner
            .subscriptions
            .borrow()
            .get(name)
            .map(|entry| Rc::clone(&entry.handle));
        if let Some(handle) = live {
            self.bind_events(name, &handle, events);
        }

        self.log(
            &format!("Registered channel '{name}' for {uid}."),
            DebugLevel::All,
        );
    }

    /// Remove the registration of `uid` under `name`.
    ///
    /// Releases the component's context. When this was the last registration
    /// for the name, the subscription is torn down and the departing
    /// registration receives `unsubscribed`. Unknown pairs are a no-op.
    pub fn remove_channel(&self, name: &str, uid: ComponentId) -> Result<(), SocketError> {
        let Some((removed, now_empty)) = self.inner.channels.borrow_mut().remove(name, uid) else {
            return Ok(());
        };

        let mut result = Ok(());
        if now_empty {
            let entry = self.inner.subscriptions.borrow_mut().remove(name);
            if let Some(entry) = entry {
                result = self.teardown(name, &entry);
                self.dispatch(&removed, ChannelEvent::Unsubscribed);
                self.log(
                    &format!("Unsubscribed from channel '{name}'."),
                    DebugLevel::Info,
                );
            }
        }

        self.inner.contexts.borrow_mut().release(uid);
        self.log(
            &format!("Removed channel '{name}' for {uid}."),
            DebugLevel::All,
        );
        result
    }

    /// Deliver `event` to every registration currently under `channel_name`.
    ///
    /// Registrations whose context has been evicted, or which were removed
    /// by an earlier callback of the same dispatch, are skipped. Returns the
    /// number of callbacks invoked.
    pub fn fire_channel_event(&self, channel_name: &str, event: ChannelEvent<'_>) -> usize {
        self.fire_for(channel_name, event, None)
    }

    /// Dispatch loop behind [`Self::fire_channel_event`].
    ///
    /// With `announced` set, stops as soon as the subscription table no
    /// longer holds that handle for `channel_name`.
    fn fire_for(
        &self,
        channel_name: &str,
        event: ChannelEvent<'_>,
        announced: Option<&Rc<dyn Subscription>>,
    ) -> usize {
        let snapshot = self.inner.channels.borrow().snapshot(channel_name);

        let mut invoked = 0;
        for registration in &snapshot {
            if let Some(handle) = announced {
                if !self.holds(channel_name, handle) {
                    log::trace!(
                        "[Socket] Subscription for '{channel_name}' replaced mid-dispatch; stopping {event:?}"
                    );
                    break;
                }
            }
            if !self.inner.channels.borrow().contains(registration) {
                continue;
            }
            if self.dispatch(registration, event) {
                invoked += 1;
            }
        }
        invoked
    }

    /// Subscription state for `channel_name`, if a subscription exists.
    #[must_use]
    pub fn subscription_state(&self, channel_name: &str) -> Option<SubscriptionState> {
        self.inner
            .subscriptions
            .borrow()
            .get(channel_name)
            .map(|entry| entry.state)
    }

    /// Number of registrations under `channel_name`.
    #[must_use]
    pub fn registration_count(&self, channel_name: &str) -> usize {
        self.inner.channels.borrow().count(channel_name)
    }

    /// Channel names with at least one registration, sorted.
    #[must_use]
    pub fn registered_channels(&self) -> Vec<String> {
        self.inner.channels.borrow().names()
    }

    /// Channel names still holding a registration for `uid`, sorted.
    ///
    /// After a component has been detached this should be empty; anything
    /// left is a leaked registration.
    #[must_use]
    pub fn channels_for(&self, uid: ComponentId) -> Vec<String> {
        self.inner.channels.borrow().names_for(uid)
    }

    /// Number of registrations keeping `uid`'s context cached.
    #[must_use]
    pub fn context_refs(&self, uid: ComponentId) -> usize {
        self.inner.contexts.borrow().refs(uid)
    }

    fn upgrade(weak: &Weak<SocketInner<C>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn log(&self, message: &str, level: DebugLevel) {
        self.inner.logger.log(message, level);
    }

    fn connection(&self) -> Result<Rc<dyn Connection>, SocketError> {
        if let Some(connection) = self.inner.connection.borrow().as_ref() {
            return Ok(Rc::clone(connection));
        }

        let credential = validate_credential(self.inner.options.credential.as_deref())?;
        let connection = self
            .inner
            .transport
            .connect(credential, &self.inner.options.transport_options)?;
        *self.inner.connection.borrow_mut() = Some(Rc::clone(&connection));

        self.log("Connected to transport.", DebugLevel::Info);
        Ok(connection)
    }

    /// Bind forwarding handlers for `events` not yet bound on `channel_name`.
    fn bind_events(&self, channel_name: &str, handle: &Rc<dyn Subscription>, events: Vec<String>) {
        for event in events {
            let fresh = self
                .inner
                .subscriptions
                .borrow_mut()
                .get_mut(channel_name)
                .is_some_and(|entry| entry.bound_events.insert(event.clone()));
            if !fresh {
                continue;
            }

            let weak = Rc::downgrade(&self.inner);
            let name = channel_name.to_string();
            let event_name = event.clone();
            let handler: EventHandler = Rc::new(move |data: &serde_json::Value| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.channel_received(&name, &event_name, data);
                }
            });
            handle.bind(&event, handler);
        }
    }

    fn teardown(&self, channel_name: &str, entry: &SubscriptionEntry) -> Result<(), SocketError> {
        log::trace!("[Socket] Tearing down subscription '{}'", entry.handle.name());
        entry.handle.unbind_all();
        let connection = self.inner.connection.borrow().as_ref().map(Rc::clone);
        if let Some(connection) = connection {
            connection.unsubscribe(channel_name)?;
        }
        Ok(())
    }

    /// Whether `handle` is still the live subscription for `channel_name`.
    fn holds(&self, channel_name: &str, handle: &Rc<dyn Subscription>) -> bool {
        self.inner
            .subscriptions
            .borrow()
            .get(channel_name)
            .is_some_and(|entry| Rc::ptr_eq(&entry.handle, handle))
    }

    /// Move the entry for `channel_name` to `state`, returning its handle.
    fn transition(&self, channel_name: &str, state: SubscriptionState) -> Option<Rc<dyn Subscription>> {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let entry = subscriptions.get_mut(channel_name)?;
        entry.state = state;
        Some(Rc::clone(&entry.handle))
    }

    fn channel_subscribed(&self, channel_name: &str) {
        let Some(handle) = self.transition(channel_name, SubscriptionState::Subscribed) else {
            return;
        };

        self.fire_for(channel_name, ChannelEvent::Subscribed, Some(&handle));
        self.log(
            &format!("Successfully subscribed a channel '{channel_name}'."),
            DebugLevel::Info,
        );
    }

    fn subscription_rejected(&self, channel_name: &str, data: &serde_json::Value) {
        let Some(handle) = self.transition(channel_name, SubscriptionState::Rejected) else {
            return;
        };

        self.fire_for(channel_name, ChannelEvent::Rejected, Some(&handle));
        self.log(
            &format!("Subscription rejected for channel '{channel_name}': {data}"),
            DebugLevel::Error,
        );
    }

    fn channel_received(&self, channel_name: &str, event_name: &str, data: &serde_json::Value) {
        let invoked =
            self.fire_channel_event(channel_name, ChannelEvent::Received { event_name, data });
        self.log(
            &format!(
                "Message '{event_name}' received on channel '{channel_name}' ({invoked} handler(s))."
            ),
            DebugLevel::Info,
        );
    }

    /// Invoke the callback matching `event` on one registration.
    fn dispatch(&self, registration: &Registration<C>, event: ChannelEvent<'_>) -> bool {
        let Some(context) = self.inner.contexts.borrow().get(registration.uid()) else {
            log::trace!(
                "[Socket] Skipping {} on '{}': context evicted",
                registration.uid(),
                registration.name()
            );
            return false;
        };

        let context: &C = &context;
        let descriptor = registration.descriptor();
        let invoked = match event {
            ChannelEvent::Subscribed => descriptor.subscribed().map(|cb| cb(context)),
            ChannelEvent::Unsubscribed => descriptor.unsubscribed().map(|cb| cb(context)),
            ChannelEvent::Rejected => descriptor.rejected().map(|cb| cb(context)),
            ChannelEvent::Received { event_name, data } => descriptor
                .handler(event_name)
                .map(|handler| handler(context, data)),
        };
        invoked.is_some()
    }
}

fn validate_credential(credential: Option<&str>) -> Result<&str, SocketError> {
    match credential {
        Some(key) if !key.is_empty() && !key.chars().any(char::is_whitespace) => Ok(key),
        _ => Err(SocketError::InvalidCredential),
    }
}
