//! cablemux - channel subscription multiplexer for component trees.
//!
//! Lets many UI component instances declare interest in named channels on a
//! hosted pub/sub service while sharing one transport connection and one
//! server-side subscription per channel name. Inbound events are routed to
//! every interested component's handlers, and the subscription is torn down
//! when the last interested component goes away.
//!
//! # Architecture
//!
//! - **Socket** - engine: connection, channel registry, context cache, dispatch
//! - **ChannelBinding** - maps component create/mount/destroy onto the socket
//! - **Transport** - opaque pub/sub client seam (plus an in-memory loopback)
//! - **Logger** - gated diagnostics on top of the `log` facade
//!
//! # Modules
//!
//! - [`socket`] - Subscription reference counting and event routing
//! - [`binding`] - Component lifecycle hooks
//! - [`descriptor`] - Channel declarations
//! - [`transport`] - Transport traits and the loopback implementation
//! - [`config`] - Options loading/saving

pub mod binding;
pub mod component;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logger;
pub mod socket;
pub mod transport;

// Re-export commonly used types
pub use binding::ChannelBinding;
pub use component::{Component, ComponentId};
pub use config::SocketOptions;
pub use descriptor::{ChannelDescriptor, ChannelEntry, ChannelMap, ComputedChannel};
pub use error::SocketError;
pub use logger::{DebugLevel, Logger};
pub use socket::{ChannelEvent, Registration, Socket, SubscriptionState};
pub use transport::{Connection, MemoryTransport, Subscription, Transport};
