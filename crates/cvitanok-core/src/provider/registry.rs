use std::collections::HashMap;
use std::sync::Arc;

use super::dispatch::RequestScope;
use super::overrides::OverrideTable;
use super::{Capability, CapabilityKey, Factory, ProviderError, RawFactory, RequestContext};

/// Process-wide mapping from capability to factory.
///
/// Filled once at startup and shared read-only (behind an `Arc`) by every
/// request afterwards.
///
/// Cloning is cheap: clones share the same entries until one of them is
/// mutated.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<HashMap<CapabilityKey, RawFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `C`.
    ///
    /// Fails with [`ProviderError::DuplicateKey`] if `C::KEY` already has a
    /// factory; use [`replace`](Self::replace) to swap one on purpose.
    pub fn register<C: Capability>(&mut self, factory: Factory<C>) -> Result<&mut Self, ProviderError> {
        if self.entries.contains_key(&C::KEY) {
            return Err(ProviderError::DuplicateKey { key: C::KEY });
        }
        tracing::debug!(capability = %C::KEY, lifetime = ?factory.lifetime(), "registered provider");
        Arc::make_mut(&mut self.entries).insert(C::KEY, factory.into_raw());
        Ok(self)
    }

    /// Install the factory for `C`, replacing any existing one.
    ///
    /// Returns `true` when an entry was replaced.
    pub fn replace<C: Capability>(&mut self, factory: Factory<C>) -> bool {
        let replaced = Arc::make_mut(&mut self.entries)
            .insert(C::KEY, factory.into_raw())
            .is_some();
        if replaced {
            tracing::debug!(capability = %C::KEY, "replaced provider");
        }
        replaced
    }

    pub fn contains(&self, key: CapabilityKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys, sorted by name.
    pub fn keys(&self) -> Vec<CapabilityKey> {
        let mut keys: Vec<_> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    pub(crate) fn factory(&self, key: CapabilityKey) -> Option<&RawFactory> {
        self.entries.get(&key)
    }

    /// Check that every key, and everything those keys' factories declare
    /// they require, has a provider and that no requirement loops back.
    pub fn validate(&self, keys: &[CapabilityKey]) -> Result<(), ProviderError> {
        check_requirements(keys, |key| self.factory(key).cloned())
    }

    /// Resolve `C` outside of any dispatched request.
    ///
    /// Resources acquired along the way are released before this returns.
    pub async fn resolve<C: Capability>(
        &self,
        context: RequestContext,
    ) -> Result<Arc<C::Resource>, ProviderError> {
        let mut scope = RequestScope::new(context, self.clone(), OverrideTable::new());
        let resolved = scope.resolve::<C>().await;
        scope.release_all().await;
        resolved
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

/// Depth-first walk over `requires` edges starting at `roots`.
pub(crate) fn check_requirements(
    roots: &[CapabilityKey],
    lookup: impl Fn(CapabilityKey) -> Option<RawFactory>,
) -> Result<(), ProviderError> {
    fn visit(
        key: CapabilityKey,
        lookup: &dyn Fn(CapabilityKey) -> Option<RawFactory>,
        path: &mut Vec<CapabilityKey>,
        done: &mut Vec<CapabilityKey>,
    ) -> Result<(), ProviderError> {
        if done.contains(&key) {
            return Ok(());
        }
        if path.contains(&key) {
            return Err(ProviderError::Cycle {
                key,
                path: render_path(path, key),
            });
        }
        let factory = lookup(key).ok_or(ProviderError::UnresolvedDependency { key })?;
        path.push(key);
        for required in factory.requires.iter() {
            visit(*required, lookup, path, done)?;
        }
        path.pop();
        done.push(key);
        Ok(())
    }

    let mut done = Vec::new();
    for key in roots {
        visit(*key, &lookup, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

pub(crate) fn render_path(path: &[CapabilityKey], last: CapabilityKey) -> String {
    path.iter()
        .chain(std::iter::once(&last))
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(" -> ")
}
