//! Channel registry: channel name to the registrations interested in it.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::component::ComponentId;
use crate::descriptor::ChannelDescriptor;

/// A descriptor tagged with its owning component and channel name.
pub struct Registration<C> {
    uid: ComponentId,
    name: String,
    descriptor: ChannelDescriptor<C>,
}

impl<C> fmt::Debug for Registration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl<C> Registration<C> {
    pub(crate) fn new(uid: ComponentId, name: impl Into<String>, descriptor: ChannelDescriptor<C>) -> Self {
        Self {
            uid,
            name: name.into(),
            descriptor,
        }
    }

    /// Owning component.
    #[must_use]
    pub fn uid(&self) -> ComponentId {
        self.uid
    }

    /// Channel name the descriptor was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared callbacks.
    #[must_use]
    pub fn descriptor(&self) -> &ChannelDescriptor<C> {
        &self.descriptor
    }
}

/// Registrations per channel name, in registration order.
///
/// A component appears at most once per name. Names with no registrations
/// are removed entirely.
pub(crate) struct ChannelRegistry<C> {
    channels: HashMap<String, Vec<Rc<Registration<C>>>>,
}

impl<C> Default for ChannelRegistry<C> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for ChannelRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channel_count", &self.channels.len())
            .field(
                "registration_count",
                &self.channels.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl<C> ChannelRegistry<C> {
    /// Add `registration`. Returns `false` when its component is already
    /// registered under the same name.
    pub(crate) fn insert(&mut self, registration: Rc<Registration<C>>) -> bool {
        let list = self.channels.entry(registration.name.clone()).or_default();
        if list.iter().any(|r| r.uid == registration.uid) {
            return false;
        }
        list.push(registration);
        true
    }

    /// Remove the registration of `uid` under `name`.
    ///
    /// Returns the removed registration and whether `name` is now empty (in
    /// which case the name has been dropped from the registry).
    pub(crate) fn remove(&mut self, name: &str, uid: ComponentId) -> Option<(Rc<Registration<C>>, bool)> {
        let list = self.channels.get_mut(name)?;
        let idx = list.iter().position(|r| r.uid == uid)?;
        let removed = list.remove(idx);

        let now_empty = list.is_empty();
        if now_empty {
            self.channels.remove(name);
        }
        Some((removed, now_empty))
    }

    /// Clone of the current registrations for `name`.
    pub(crate) fn snapshot(&self, name: &str) -> Vec<Rc<Registration<C>>> {
        self.channels.get(name).cloned().unwrap_or_default()
    }

    /// Whether `registration` is still registered (by identity).
    pub(crate) fn contains(&self, registration: &Rc<Registration<C>>) -> bool {
        self.channels
            .get(&registration.name)
            .is_some_and(|list| list.iter().any(|r| Rc::ptr_eq(r, registration)))
    }

    /// Distinct bound event names across every registration for `name`, in
    /// first-seen order.
    pub(crate) fn event_names(&self, name: &str) -> Vec<String> {
        let mut events: Vec<String> = Vec::new();
        for registration in self.channels.get(name).into_iter().flatten() {
            for event in registration.descriptor.event_names() {
                if !events.iter().any(|e| e == event) {
                    events.push(event.to_string());
                }
            }
        }
        events
    }

    /// Number of registrations for `name`.
    pub(crate) fn count(&self, name: &str) -> usize {
        self.channels.get(name).map_or(0, Vec::len)
    }

    /// Registered channel names, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Channel names that still hold a registration for `uid`, sorted.
    pub(crate) fn names_for(&self, uid: ComponentId) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, list)| list.iter().any(|r| r.uid == uid))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
