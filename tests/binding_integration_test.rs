//! Integration tests for the component binding layer.

use std::cell::Cell;
use std::rc::Rc;

use cablemux::{
    ChannelBinding, ChannelDescriptor, ChannelMap, Component, ComponentId, ComputedChannel,
    MemoryTransport, Socket, SocketOptions,
};

/// A chat room view whose private channel is derived from its room id.
struct RoomView {
    uid: ComponentId,
    room_id: Cell<u32>,
    messages: Cell<u32>,
}

impl Component for RoomView {
    fn uid(&self) -> ComponentId {
        self.uid
    }
}

fn room(room_id: u32) -> Rc<RoomView> {
    Rc::new(RoomView {
        uid: ComponentId::next(),
        room_id: Cell::new(room_id),
        messages: Cell::new(0),
    })
}

fn setup() -> (ChannelBinding<RoomView>, MemoryTransport) {
    let transport = MemoryTransport::new();
    let socket = Socket::new(
        Box::new(transport.clone()),
        SocketOptions::with_credential("app-key"),
    )
    .unwrap();
    (ChannelBinding::new(socket), transport)
}

fn room_channels() -> ChannelMap<RoomView> {
    ChannelMap::new().computed(
        ComputedChannel::new(|r: &RoomView| format!("private-room-{}", r.room_id.get()))
            .with_descriptor(
                ChannelDescriptor::new()
                    .bind("new_message", |r: &RoomView, _| r.messages.set(r.messages.get() + 1))
                    .subscribe_on_mount(true),
            ),
    )
}

#[test]
fn test_stable_computed_name_cleans_up() {
    let (binding, transport) = setup();
    let view = room(42);

    binding.on_attach(&view, room_channels());
    binding.on_activate(&view).unwrap();
    transport.confirm("private-room-42");
    transport.emit("private-room-42", "new_message", &serde_json::Value::Null);
    assert_eq!(view.messages.get(), 1);

    let lingering = binding.on_detach(&view).unwrap();

    assert!(lingering.is_empty());
    assert!(binding.socket().registered_channels().is_empty());
    assert_eq!(transport.unsubscribe_calls(), vec!["private-room-42"]);
}

#[test]
fn test_changed_computed_name_is_detected_as_leak() {
    let (binding, transport) = setup();
    let view = room(42);

    binding.on_attach(&view, room_channels());
    binding.on_activate(&view).unwrap();
    view.room_id.set(43);

    let lingering = binding.on_detach(&view).unwrap();

    assert_eq!(lingering, vec!["private-room-42"]);
    assert_eq!(binding.socket().channels_for(view.uid()), vec!["private-room-42"]);
    assert!(transport.unsubscribe_calls().is_empty());
    assert!(transport.is_subscribed("private-room-42"));
}

#[test]
fn test_components_in_same_room_share_subscription() {
    let (binding, transport) = setup();
    let first = room(7);
    let second = room(7);

    binding.on_attach(&first, room_channels());
    binding.on_attach(&second, room_channels());
    binding.on_activate(&first).unwrap();
    binding.on_activate(&second).unwrap();
    assert_eq!(transport.subscribe_calls(), vec!["private-room-7"]);

    transport.emit("private-room-7", "new_message", &serde_json::Value::Null);
    assert_eq!(first.messages.get(), 1);
    assert_eq!(second.messages.get(), 1);

    binding.on_detach(&first).unwrap();
    assert!(transport.unsubscribe_calls().is_empty());

    transport.emit("private-room-7", "new_message", &serde_json::Value::Null);
    assert_eq!(first.messages.get(), 1);
    assert_eq!(second.messages.get(), 2);

    binding.on_detach(&second).unwrap();
    assert_eq!(transport.unsubscribe_calls(), vec!["private-room-7"]);
}
