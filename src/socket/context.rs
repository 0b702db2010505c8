//! Reference-counted cache of component contexts.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentId};

struct CachedContext<C> {
    context: Rc<C>,
    refs: usize,
}

/// Maps a component id to its context plus the number of registrations
/// pointing at it. An entry exists iff its count is above zero.
pub(crate) struct ContextCache<C> {
    entries: HashMap<ComponentId, CachedContext<C>>,
}

impl<C> Default for ContextCache<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for ContextCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(uid, cached)| (uid, cached.refs)))
            .finish()
    }
}

impl<C: Component> ContextCache<C> {
    /// Cache `component` (if needed) and take one reference.
    pub(crate) fn acquire(&mut self, component: &Rc<C>) -> usize {
        let cached = self
            .entries
            .entry(component.uid())
            .or_insert_with(|| CachedContext {
                context: Rc::clone(component),
                refs: 0,
            });
        cached.refs += 1;
        cached.refs
    }

    /// Drop one reference, evicting the entry when none remain.
    ///
    /// Returns the remaining count. Unknown ids are ignored.
    pub(crate) fn release(&mut self, uid: ComponentId) -> usize {
        let Some(cached) = self.entries.get_mut(&uid) else {
            return 0;
        };
        cached.refs = cached.refs.saturating_sub(1);
        let remaining = cached.refs;
        if remaining == 0 {
            self.entries.remove(&uid);
        }
        remaining
    }

    /// Context for `uid`, if still cached.
    pub(crate) fn get(&self, uid: ComponentId) -> Option<Rc<C>> {
        self.entries.get(&uid).map(|cached| Rc::clone(&cached.context))
    }

    /// Current reference count for `uid`.
    pub(crate) fn refs(&self, uid: ComponentId) -> usize {
        self.entries.get(&uid).map_or(0, |cached| cached.refs)
    }
}
