//! Component identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a component instance (`uid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an id assigned by a host UI layer.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// A UI component that can own channel registrations.
///
/// The component value itself is the execution context handed to every
/// callback of its descriptors, so any state a callback mutates should sit
/// behind interior mutability (`Cell`, `RefCell`).
pub trait Component {
    /// Stable identity for the lifetime of the instance.
    fn uid(&self) -> ComponentId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_ids_are_unique() {
        let a = ComponentId::next();
        let b = ComponentId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_display() {
        assert_eq!(ComponentId::from_raw(7).to_string(), "component#7");
        assert_eq!(ComponentId::from_raw(7).as_u64(), 7);
    }
}
