//! Component binding layer.
//!
//! Translates a component's declared [`ChannelMap`] into socket calls at the
//! right lifecycle points of a host UI framework:
//!
//! ```text
//!   created   ──► on_attach(component, channels)   add_channel per entry
//!   mounted   ──► on_activate(component)           subscribe per subscribe_on_mount entry
//!   destroyed ──► on_detach(component)             remove_channel per entry
//! ```
//!
//! Computed entries are resolved against the component at every step, so a
//! factory that returns a different name at detach time than at attach time
//! leaves a registration behind. `on_detach` reports such leftovers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentId};
use crate::descriptor::ChannelMap;
use crate::error::SocketError;
use crate::logger::DebugLevel;
use crate::socket::Socket;

/// Binds component lifecycles to a shared [`Socket`].
pub struct ChannelBinding<C: Component + 'static> {
    socket: Socket<C>,
    attached: RefCell<HashMap<ComponentId, Rc<ChannelMap<C>>>>,
}

impl<C: Component + 'static> fmt::Debug for ChannelBinding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("socket", &self.socket)
            .field("attached", &self.attached.borrow().len())
            .finish()
    }
}

impl<C: Component + 'static> ChannelBinding<C> {
    /// Bind lifecycles to `socket`.
    #[must_use]
    pub fn new(socket: Socket<C>) -> Self {
        Self {
            socket,
            attached: RefCell::new(HashMap::new()),
        }
    }

    /// The socket components are bound to.
    #[must_use]
    pub fn socket(&self) -> &Socket<C> {
        &self.socket
    }

    /// Whether `uid` is currently attached.
    #[must_use]
    pub fn is_attached(&self, uid: ComponentId) -> bool {
        self.attached.borrow().contains_key(&uid)
    }

    /// Component creation: register every declared channel.
    ///
    /// Attaching an already attached component does nothing.
    pub fn on_attach(&self, component: &Rc<C>, channels: ChannelMap<C>) {
        let uid = component.uid();
        let channels = Rc::new(channels);
        {
            let mut attached = self.attached.borrow_mut();
            if attached.contains_key(&uid) {
                log::debug!("[ChannelBinding] {uid} is already attached");
                return;
            }
            attached.insert(uid, Rc::clone(&channels));
        }

        for entry in channels.entries() {
            let name = entry.resolve_name(component);
            self.socket
                .add_channel(&name, entry.descriptor().clone(), component);
        }
    }

    /// Component mount: subscribe every entry flagged for it.
    ///
    /// Computed names and predicates are evaluated against the component's
    /// current state. Does nothing for components that were never attached.
    pub fn on_activate(&self, component: &C) -> Result<(), SocketError> {
        let Some(channels) = self.channels(component.uid()) else {
            return Ok(());
        };

        for entry in channels.entries() {
            if entry.subscribes_on_mount(component) {
                self.socket.subscribe(&entry.resolve_name(component))?;
            }
        }
        Ok(())
    }

    /// Component destruction: remove every declared registration.
    ///
    /// Every entry is processed even if one fails; the first failure is
    /// returned. On success, returns the channel names that still hold a
    /// registration for the component, which is non-empty only when a
    /// computed name changed between attach and detach. Detaching twice is
    /// a no-op.
    pub fn on_detach(&self, component: &C) -> Result<Vec<String>, SocketError> {
        let uid = component.uid();
        let Some(channels) = self.attached.borrow_mut().remove(&uid) else {
            return Ok(Vec::new());
        };

        let mut first_error = None;
        for entry in channels.entries() {
            let name = entry.resolve_name(component);
            if let Err(e) = self.socket.remove_channel(&name, uid) {
                log::warn!("[ChannelBinding] Failed to remove '{name}' for {uid}: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let lingering = self.socket.channels_for(uid);
        if !lingering.is_empty() {
            self.socket.logger().log(
                &format!(
                    "Registrations leaked for {uid} after detach: {}. \
                     Computed channel names must not change while a component is attached.",
                    lingering.join(", ")
                ),
                DebugLevel::Error,
            );
        }
        Ok(lingering)
    }

    fn channels(&self, uid: ComponentId) -> Option<Rc<ChannelMap<C>>> {
        self.attached.borrow().get(&uid).map(Rc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketOptions;
    use crate::descriptor::{ChannelDescriptor, ComputedChannel};
    use crate::transport::MemoryTransport;
    use std::cell::Cell;

    struct Room {
        uid: ComponentId,
        room_id: Cell<u32>,
        public: bool,
        subscribed: Cell<u32>,
    }

    impl Component for Room {
        fn uid(&self) -> ComponentId {
            self.uid
        }
    }

    fn room(room_id: u32, public: bool) -> Rc<Room> {
        Rc::new(Room {
            uid: ComponentId::next(),
            room_id: Cell::new(room_id),
            public,
            subscribed: Cell::new(0),
        })
    }

    fn binding(transport: &MemoryTransport) -> ChannelBinding<Room> {
        let socket = Socket::new(
            Box::new(transport.clone()),
            SocketOptions::with_credential("app-key"),
        )
        .unwrap();
        ChannelBinding::new(socket)
    }

    fn counting() -> ChannelDescriptor<Room> {
        ChannelDescriptor::new().on_subscribed(|r: &Room| r.subscribed.set(r.subscribed.get() + 1))
    }

    fn channels() -> ChannelMap<Room> {
        ChannelMap::new()
            .channel("ChatChannel", counting().subscribe_on_mount(true))
            .channel("NotificationChannel", counting())
            .computed(
                ComputedChannel::new(|r: &Room| format!("room-{}", r.room_id.get()))
                    .with_descriptor(counting())
                    .subscribe_on_mount_if(|r: &Room| r.public),
            )
    }

    #[test]
    fn test_attach_registers_every_entry() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let chat = room(7, true);

        binding.on_attach(&chat, channels());

        assert!(binding.is_attached(chat.uid()));
        assert_eq!(
            binding.socket().channels_for(chat.uid()),
            vec!["ChatChannel", "NotificationChannel", "room-7"]
        );
        assert_eq!(binding.socket().context_refs(chat.uid()), 3);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_attach_twice_is_noop() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let chat = room(7, true);

        binding.on_attach(&chat, channels());
        binding.on_attach(&chat, ChannelMap::new().channel("OtherChannel", counting()));

        assert_eq!(binding.socket().context_refs(chat.uid()), 3);
        assert!(binding.socket().channels_for(chat.uid()).iter().all(|n| n != "OtherChannel"));
    }

    #[test]
    fn test_activate_subscribes_flagged_entries() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let public = room(7, true);
        let private = room(8, false);

        binding.on_attach(&public, channels());
        binding.on_attach(&private, channels());
        binding.on_activate(&public).unwrap();
        binding.on_activate(&private).unwrap();

        assert_eq!(transport.subscribe_calls(), vec!["ChatChannel", "room-7"]);

        transport.confirm("ChatChannel");
        assert_eq!(public.subscribed.get(), 1);
        assert_eq!(private.subscribed.get(), 1);
    }

    #[test]
    fn test_activate_unattached_is_noop() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        binding.on_activate(&room(1, true)).unwrap();
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_activate_propagates_credential_error() {
        let socket: Socket<Room> =
            Socket::new(Box::new(MemoryTransport::new()), SocketOptions::default()).unwrap();
        let binding = ChannelBinding::new(socket);
        let chat = room(1, true);

        binding.on_attach(&chat, channels());
        let result = binding.on_activate(&chat);
        assert!(matches!(result, Err(SocketError::InvalidCredential)));
    }

    #[test]
    fn test_detach_removes_everything() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let chat = room(7, true);

        binding.on_attach(&chat, channels());
        binding.on_activate(&chat).unwrap();
        let lingering = binding.on_detach(&chat).unwrap();

        assert!(lingering.is_empty());
        assert!(!binding.is_attached(chat.uid()));
        assert!(binding.socket().registered_channels().is_empty());
        assert_eq!(binding.socket().context_refs(chat.uid()), 0);
        assert_eq!(transport.unsubscribe_calls(), vec!["ChatChannel", "room-7"]);
    }

    #[test]
    fn test_detach_twice_is_noop() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let chat = room(7, true);

        binding.on_attach(&chat, channels());
        binding.on_activate(&chat).unwrap();
        binding.on_detach(&chat).unwrap();
        transport.clear_calls();

        assert!(binding.on_detach(&chat).unwrap().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_changed_computed_name_is_reported() {
        let transport = MemoryTransport::new();
        let binding = binding(&transport);
        let chat = room(7, true);

        binding.on_attach(&chat, channels());
        chat.room_id.set(9);
        let lingering = binding.on_detach(&chat).unwrap();

        assert_eq!(lingering, vec!["room-7"]);
        assert_eq!(binding.socket().registration_count("room-7"), 1);
        assert_eq!(binding.socket().context_refs(chat.uid()), 1);
    }
}
