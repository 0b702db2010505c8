//! Channel declarations made by components.
//!
//! A component declares its interest in channels with a [`ChannelMap`]:
//!
//! - **static entries** map a fixed channel name to a [`ChannelDescriptor`];
//! - **computed entries** ([`ComputedChannel`]) derive the channel name from
//!   the component itself each time it is needed.
//!
//! ```ignore
//! let channels = ChannelMap::new()
//!     .channel(
//!         "ChatChannel",
//!         ChannelDescriptor::new()
//!             .on_subscribed(|chat: &ChatView| chat.online.set(true))
//!             .bind("new_message", |chat: &ChatView, data| chat.push(data))
//!             .subscribe_on_mount(true),
//!     )
//!     .computed(
//!         ComputedChannel::new(|chat: &ChatView| format!("private-room-{}", chat.room_id))
//!             .with_descriptor(ChannelDescriptor::new().bind("typing", ChatView::typing)),
//!     );
//! ```
//!
//! Computed names are evaluated at attach time and again at detach time.
//! The factory must return the same name both times (derive it from
//! identity, not from state that changes while mounted), otherwise the
//! registration made at attach time is never removed.

use std::fmt;
use std::rc::Rc;

/// Callback for subscription lifecycle events.
pub type LifecycleCallback<C> = Rc<dyn Fn(&C)>;

/// Callback for a custom channel event.
pub type EventCallback<C> = Rc<dyn Fn(&C, &serde_json::Value)>;

/// Factory deriving a channel name from the component.
pub type NameFactory<C> = Rc<dyn Fn(&C) -> String>;

/// Predicate deciding whether to subscribe when the component activates.
pub type MountPredicate<C> = Rc<dyn Fn(&C) -> bool>;

/// A component's interest in one channel.
///
/// Immutable once built; clones share the callbacks.
pub struct ChannelDescriptor<C> {
    subscribed: Option<LifecycleCallback<C>>,
    unsubscribed: Option<LifecycleCallback<C>>,
    rejected: Option<LifecycleCallback<C>>,
    bind: Vec<(String, EventCallback<C>)>,
    subscribe_on_mount: bool,
}

impl<C> Default for ChannelDescriptor<C> {
    fn default() -> Self {
        Self {
            subscribed: None,
            unsubscribed: None,
            rejected: None,
            bind: Vec::new(),
            subscribe_on_mount: false,
        }
    }
}

impl<C> Clone for ChannelDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            subscribed: self.subscribed.as_ref().map(Rc::clone),
            unsubscribed: self.unsubscribed.as_ref().map(Rc::clone),
            rejected: self.rejected.as_ref().map(Rc::clone),
            bind: self
                .bind
                .iter()
                .map(|(event, handler)| (event.clone(), Rc::clone(handler)))
                .collect(),
            subscribe_on_mount: self.subscribe_on_mount,
        }
    }
}

impl<C> fmt::Debug for ChannelDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("subscribed", &self.subscribed.is_some())
            .field("unsubscribed", &self.unsubscribed.is_some())
            .field("rejected", &self.rejected.is_some())
            .field("bind", &self.event_names().collect::<Vec<_>>())
            .field("subscribe_on_mount", &self.subscribe_on_mount)
            .finish()
    }
}

impl<C> ChannelDescriptor<C> {
    /// Descriptor with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the server accepts the subscription.
    pub fn on_subscribed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&C) + 'static,
    {
        self.subscribed = Some(Rc::new(callback));
        self
    }

    /// Called when the subscription is torn down.
    pub fn on_unsubscribed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&C) + 'static,
    {
        self.unsubscribed = Some(Rc::new(callback));
        self
    }

    /// Called when the server rejects the subscription.
    pub fn on_rejected<F>(mut self, callback: F) -> Self
    where
        F: Fn(&C) + 'static,
    {
        self.rejected = Some(Rc::new(callback));
        self
    }

    /// Handle `event_name` on this channel. A second handler for the same
    /// event replaces the first.
    pub fn bind<F>(mut self, event_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &serde_json::Value) + 'static,
    {
        let event_name = event_name.into();
        let handler: EventCallback<C> = Rc::new(handler);
        if let Some(slot) = self.bind.iter_mut().find(|(name, _)| *name == event_name) {
            slot.1 = handler;
        } else {
            self.bind.push((event_name, handler));
        }
        self
    }

    /// Subscribe automatically when the owning component activates.
    pub fn subscribe_on_mount(mut self, enabled: bool) -> Self {
        self.subscribe_on_mount = enabled;
        self
    }

    /// `subscribed` callback, if any.
    #[must_use]
    pub fn subscribed(&self) -> Option<&LifecycleCallback<C>> {
        self.subscribed.as_ref()
    }

    /// `unsubscribed` callback, if any.
    #[must_use]
    pub fn unsubscribed(&self) -> Option<&LifecycleCallback<C>> {
        self.unsubscribed.as_ref()
    }

    /// `rejected` callback, if any.
    #[must_use]
    pub fn rejected(&self) -> Option<&LifecycleCallback<C>> {
        self.rejected.as_ref()
    }

    /// Handler for `event_name`, if bound.
    #[must_use]
    pub fn handler(&self, event_name: &str) -> Option<&EventCallback<C>> {
        self.bind
            .iter()
            .find(|(name, _)| name == event_name)
            .map(|(_, handler)| handler)
    }

    /// Bound event names in declaration order.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.bind.iter().map(|(name, _)| name.as_str())
    }

    /// Whether the descriptor asks to subscribe on activation.
    #[must_use]
    pub fn subscribes_on_mount(&self) -> bool {
        self.subscribe_on_mount
    }
}

/// A descriptor whose channel name is computed from the component.
pub struct ComputedChannel<C> {
    channel_name: NameFactory<C>,
    descriptor: ChannelDescriptor<C>,
    subscribe_on_mount: Option<MountPredicate<C>>,
}

impl<C> Clone for ComputedChannel<C> {
    fn clone(&self) -> Self {
        Self {
            channel_name: Rc::clone(&self.channel_name),
            descriptor: self.descriptor.clone(),
            subscribe_on_mount: self.subscribe_on_mount.as_ref().map(Rc::clone),
        }
    }
}

impl<C> fmt::Debug for ComputedChannel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedChannel")
            .field("descriptor", &self.descriptor)
            .field("subscribe_on_mount", &self.subscribe_on_mount.is_some())
            .finish_non_exhaustive()
    }
}

impl<C> ComputedChannel<C> {
    /// Entry whose name is produced by `channel_name`.
    pub fn new<F>(channel_name: F) -> Self
    where
        F: Fn(&C) -> String + 'static,
    {
        Self {
            channel_name: Rc::new(channel_name),
            descriptor: ChannelDescriptor::new(),
            subscribe_on_mount: None,
        }
    }

    /// Callbacks for the computed channel.
    pub fn with_descriptor(mut self, descriptor: ChannelDescriptor<C>) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Decide per component whether to subscribe on activation. Overrides
    /// the descriptor's own flag.
    pub fn subscribe_on_mount_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&C) -> bool + 'static,
    {
        self.subscribe_on_mount = Some(Rc::new(predicate));
        self
    }
}

/// One declared channel.
#[derive(Debug)]
pub enum ChannelEntry<C> {
    /// Fixed channel name.
    Static {
        /// Channel name.
        name: String,
        /// Callbacks.
        descriptor: ChannelDescriptor<C>,
    },
    /// Name derived from the component.
    Computed(ComputedChannel<C>),
}

impl<C> Clone for ChannelEntry<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Static { name, descriptor } => Self::Static {
                name: name.clone(),
                descriptor: descriptor.clone(),
            },
            Self::Computed(computed) => Self::Computed(computed.clone()),
        }
    }
}

impl<C> ChannelEntry<C> {
    /// Effective channel name for `component`, evaluated now.
    pub fn resolve_name(&self, component: &C) -> String {
        match self {
            Self::Static { name, .. } => name.clone(),
            Self::Computed(computed) => (computed.channel_name)(component),
        }
    }

    /// Callbacks for this entry.
    #[must_use]
    pub fn descriptor(&self) -> &ChannelDescriptor<C> {
        match self {
            Self::Static { descriptor, .. } => descriptor,
            Self::Computed(computed) => &computed.descriptor,
        }
    }

    /// Whether to subscribe when `component` activates, evaluated now.
    pub fn subscribes_on_mount(&self, component: &C) -> bool {
        match self {
            Self::Static { descriptor, .. } => descriptor.subscribes_on_mount(),
            Self::Computed(computed) => computed
                .subscribe_on_mount
                .as_ref()
                .map_or(computed.descriptor.subscribes_on_mount(), |predicate| {
                    predicate(component)
                }),
        }
    }
}

/// Everything a component declares, in declaration order.
#[derive(Debug)]
pub struct ChannelMap<C> {
    entries: Vec<ChannelEntry<C>>,
}

impl<C> Default for ChannelMap<C> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<C> Clone for ChannelMap<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<C> ChannelMap<C> {
    /// Empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a static channel. Declaring the same name twice keeps the
    /// latest descriptor.
    pub fn channel(mut self, name: impl Into<String>, descriptor: ChannelDescriptor<C>) -> Self {
        let name = name.into();
        let existing = self.entries.iter_mut().find(
            |entry| matches!(entry, ChannelEntry::Static { name: existing, .. } if *existing == name),
        );
        match existing {
            Some(ChannelEntry::Static { descriptor: slot, .. }) => *slot = descriptor,
            _ => self.entries.push(ChannelEntry::Static { name, descriptor }),
        }
        self
    }

    /// Declare a computed channel.
    pub fn computed(mut self, computed: ComputedChannel<C>) -> Self {
        self.entries.push(ChannelEntry::Computed(computed));
        self
    }

    /// Declared entries.
    #[must_use]
    pub fn entries(&self) -> &[ChannelEntry<C>] {
        &self.entries
    }

    /// Number of declared entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Room {
        id: u32,
        hits: Cell<u32>,
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor: ChannelDescriptor<Room> = ChannelDescriptor::new()
            .on_subscribed(|room: &Room| room.hits.set(room.hits.get() + 1))
            .bind("new_message", |_: &Room, _| {})
            .bind("typing", |_: &Room, _| {})
            .subscribe_on_mount(true);

        assert!(descriptor.subscribed().is_some());
        assert!(descriptor.unsubscribed().is_none());
        assert!(descriptor.rejected().is_none());
        assert!(descriptor.subscribes_on_mount());
        assert_eq!(
            descriptor.event_names().collect::<Vec<_>>(),
            vec!["new_message", "typing"]
        );
        assert!(descriptor.handler("typing").is_some());
        assert!(descriptor.handler("missing").is_none());
    }

    #[test]
    fn test_rebinding_event_replaces_handler() {
        let room = Room { id: 1, hits: Cell::new(0) };
        let descriptor: ChannelDescriptor<Room> = ChannelDescriptor::new()
            .bind("ping", |_: &Room, _| panic!("replaced handler must not run"))
            .bind("ping", |room: &Room, _| room.hits.set(10));

        assert_eq!(descriptor.event_names().count(), 1);
        (descriptor.handler("ping").unwrap())(&room, &serde_json::Value::Null);
        assert_eq!(room.hits.get(), 10);
    }

    #[test]
    fn test_computed_name_resolves_against_component() {
        let entry: ChannelEntry<Room> = ChannelEntry::Computed(ComputedChannel::new(|room: &Room| {
            format!("private-room-{}", room.id)
        }));
        let room = Room { id: 42, hits: Cell::new(0) };
        assert_eq!(entry.resolve_name(&room), "private-room-42");
    }

    #[test]
    fn test_computed_mount_predicate_overrides_descriptor_flag() {
        let entry: ChannelEntry<Room> = ChannelEntry::Computed(
            ComputedChannel::new(|room: &Room| format!("room-{}", room.id))
                .with_descriptor(ChannelDescriptor::new().subscribe_on_mount(true))
                .subscribe_on_mount_if(|room: &Room| room.id % 2 == 0),
        );
        assert!(entry.subscribes_on_mount(&Room { id: 2, hits: Cell::new(0) }));
        assert!(!entry.subscribes_on_mount(&Room { id: 3, hits: Cell::new(0) }));

        let fallback: ChannelEntry<Room> = ChannelEntry::Computed(
            ComputedChannel::new(|room: &Room| format!("room-{}", room.id))
                .with_descriptor(ChannelDescriptor::new().subscribe_on_mount(true)),
        );
        assert!(fallback.subscribes_on_mount(&Room { id: 3, hits: Cell::new(0) }));
    }

    #[test]
    fn test_channel_map_keeps_latest_static_declaration() {
        let map: ChannelMap<Room> = ChannelMap::new()
            .channel("ChatChannel", ChannelDescriptor::new())
            .channel("ChatChannel", ChannelDescriptor::new().subscribe_on_mount(true))
            .computed(ComputedChannel::new(|room: &Room| format!("room-{}", room.id)));

        assert_eq!(map.len(), 2);
        assert!(map.entries()[0].descriptor().subscribes_on_mount());
    }
}
