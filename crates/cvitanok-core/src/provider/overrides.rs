use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Capability, CapabilityKey, Factory, RawFactory};

/// Substitute factories that take precedence over the [`Registry`](super::Registry).
///
/// Only tests and the [`testing`](crate::testing) harness install overrides.
/// Writers take the lock exclusively; readers copy the factory handle out and
/// never hold the lock across an `.await`.
#[derive(Clone, Default)]
pub struct OverrideTable {
    inner: Arc<RwLock<HashMap<CapabilityKey, RawFactory>>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider of `C` until the override is removed or cleared.
    ///
    /// Takes effect for every resolution that starts after this returns,
    /// including later resolutions of requests already in flight.
    pub fn set_override<C: Capability>(&self, factory: Factory<C>) {
        tracing::debug!(capability = %C::KEY, "installing provider override");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(C::KEY, factory.into_raw());
    }

    /// Remove the override for one key. Returns `true` if one was active.
    pub fn remove(&self, key: CapabilityKey) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some()
    }

    /// Remove every override. Calling it again is a no-op.
    pub fn clear(&self) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !table.is_empty() {
            tracing::debug!(count = table.len(), "clearing provider overrides");
            table.clear();
        }
    }

    pub fn contains(&self, key: CapabilityKey) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open an override scope. The table is cleared exactly once when the
    /// scope is finished or dropped, whichever comes first, so substitutions
    /// never outlive a failing or cancelled test.
    pub fn scope(&self) -> OverrideScope {
        OverrideScope {
            table: self.clone(),
            finished: false,
        }
    }

    pub(crate) fn get(&self, key: CapabilityKey) -> Option<RawFactory> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}

impl std::fmt::Debug for OverrideTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = table.keys().copied().collect();
        keys.sort();
        f.debug_struct("OverrideTable").field("keys", &keys).finish()
    }
}

/// Guard returned by [`OverrideTable::scope`].
#[derive(Debug)]
pub struct OverrideScope {
    table: OverrideTable,
    finished: bool,
}

impl OverrideScope {
    pub fn set_override<C: Capability>(&self, factory: Factory<C>) -> &Self {
        self.table.set_override(factory);
        self
    }

    pub fn table(&self) -> &OverrideTable {
        &self.table
    }

    /// Clear the table now instead of at drop.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.table.clear();
        }
    }
}

impl Drop for OverrideScope {
    fn drop(&mut self) {
        self.close();
    }
}
