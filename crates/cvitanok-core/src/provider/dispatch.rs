use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::Instrument;

use super::registry::{check_requirements, render_path};
use super::{
    BoxError, Capability, CapabilityKey, OverrideTable, ProviderError, RawFactory, Registry,
    ReleaseAction, RequestContext, SharedResource,
};

/// A release action that has started but not finished.
type InFlightRelease = (CapabilityKey, BoxFuture<'static, Result<(), BoxError>>);

/// Per-request dispatch lifecycle.
///
/// ```text
/// PendingResolution → Resolving → Dispatched → Releasing → Done
///                         │            │
///                         └──→ Failed ←┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    PendingResolution,
    Resolving,
    Dispatched,
    Releasing,
    Done,
    Failed,
}

impl DispatchState {
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (PendingResolution, Resolving)
                | (Resolving, Dispatched)
                | (Resolving, Failed)
                | (Dispatched, Releasing)
                | (Dispatched, Failed)
                | (Releasing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::PendingResolution => "PENDING_RESOLUTION",
            DispatchState::Resolving => "RESOLVING",
            DispatchState::Dispatched => "DISPATCHED",
            DispatchState::Releasing => "RELEASING",
            DispatchState::Done => "DONE",
            DispatchState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one dispatch and traces every transition.
#[derive(Debug)]
struct Lifecycle {
    state: DispatchState,
}

impl Lifecycle {
    fn new() -> Self {
        Lifecycle {
            state: DispatchState::PendingResolution,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal dispatch transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(from = %self.state, to = %next, "dispatch transition");
        self.state = next;
    }
}

/// The resolution state of a single request.
///
/// Factories receive a `&mut RequestScope` to read the [`RequestContext`] and
/// resolve their own sub-dependencies. Every capability is produced at most
/// once per scope; release actions are kept in acquisition order.
pub struct RequestScope {
    context: RequestContext,
    registry: Registry,
    overrides: OverrideTable,
    resolved: HashMap<CapabilityKey, SharedResource>,
    releases: Vec<(CapabilityKey, ReleaseAction)>,
    in_flight: Option<InFlightRelease>,
    resolving: Vec<CapabilityKey>,
}

impl RequestScope {
    pub(crate) fn new(context: RequestContext, registry: Registry, overrides: OverrideTable) -> Self {
        RequestScope {
            context,
            registry,
            overrides,
            resolved: HashMap::new(),
            releases: Vec::new(),
            in_flight: None,
            resolving: Vec::new(),
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Number of resources acquired so far in this scope.
    pub fn acquired(&self) -> usize {
        self.resolved.len()
    }

    /// Resolve `C`, consulting overrides first and the registry second.
    pub async fn resolve<C: Capability>(&mut self) -> Result<Arc<C::Resource>, ProviderError> {
        let expected = std::any::type_name::<C::Resource>();
        if let Some(factory) = self.lookup(C::KEY) {
            if factory.resource_type != std::any::TypeId::of::<C::Resource>() {
                return Err(ProviderError::TypeMismatch {
                    key: C::KEY,
                    expected,
                    found: factory.resource_name,
                });
            }
        }

        let resource = self.resolve_key(C::KEY).await?;
        resource
            .downcast::<C::Resource>()
            .map_err(|_| ProviderError::TypeMismatch {
                key: C::KEY,
                expected,
                found: "<unknown>",
            })
    }

    fn lookup(&self, key: CapabilityKey) -> Option<RawFactory> {
        self.overrides
            .get(key)
            .or_else(|| self.registry.factory(key).cloned())
    }

    /// Fail with the first capability among `keys` (or their declared
    /// requirements) that has no provider. Runs before any factory.
    pub(crate) fn check_declared(&self, keys: &[CapabilityKey]) -> Result<(), ProviderError> {
        check_requirements(keys, |key| self.lookup(key))
    }

    fn resolve_key(&mut self, key: CapabilityKey) -> BoxFuture<'_, Result<SharedResource, ProviderError>> {
        Box::pin(async move {
            if let Some(resource) = self.resolved.get(&key) {
                return Ok(resource.clone());
            }
            if self.resolving.contains(&key) {
                return Err(ProviderError::Cycle {
                    key,
                    path: render_path(&self.resolving, key),
                });
            }
            let factory = self
                .lookup(key)
                .ok_or(ProviderError::UnresolvedDependency { key })?;

            let resource = match factory.shared.clone() {
                Some(cell) => {
                    let scope = &mut *self;
                    let factory = &factory;
                    cell.get_or_try_init(move || async move {
                        scope
                            .invoke(key, factory)
                            .await
                            .map(|produced| produced.resource)
                    })
                    .await?
                    .clone()
                }
                None => {
                    let produced = self.invoke(key, &factory).await?;
                    if let Some(release) = produced.release {
                        self.releases.push((key, release));
                    }
                    produced.resource
                }
            };

            self.resolved.insert(key, resource.clone());
            Ok(resource)
        })
    }

    async fn invoke(
        &mut self,
        key: CapabilityKey,
        factory: &RawFactory,
    ) -> Result<super::ErasedProvided, ProviderError> {
        tracing::debug!(capability = %key, "resolving");
        self.resolving.push(key);
        let produced = (factory.call)(self).await;
        self.resolving.pop();
        produced.map_err(|source| ProviderError::unavailable(key, source))
    }

    /// Run every pending release action in reverse acquisition order.
    ///
    /// Actions leave `releases` one at a time and the running one is parked
    /// in `in_flight`, so a scope dropped mid-release still owns everything
    /// that has not finished.
    pub(crate) async fn release_all(&mut self) {
        self.resolved.clear();
        let mut failures = ReleaseFailures::default();
        while let Some((key, release)) = self.releases.pop() {
            tracing::debug!(capability = %key, "releasing");
            self.in_flight = Some((key, release()));
            if let Some((key, running)) = self.in_flight.as_mut() {
                let outcome = running.await;
                failures.record(*key, outcome);
            }
            self.in_flight = None;
        }
        failures.report();
    }
}

/// Failures are logged and never propagated: the first one at error level,
/// any further ones folded into a single warning.
#[derive(Default)]
struct ReleaseFailures {
    failures: Vec<String>,
}

impl ReleaseFailures {
    fn record(&mut self, key: CapabilityKey, outcome: Result<(), BoxError>) {
        if let Err(err) = outcome {
            if self.failures.is_empty() {
                tracing::error!(capability = %key, error = %err, "failed to release resource");
            }
            self.failures.push(format!("{key}: {err}"));
        }
    }

    fn report(self) {
        if self.failures.len() > 1 {
            tracing::warn!(
                count = self.failures.len() - 1,
                failures = ?&self.failures[1..],
                "additional release failures"
            );
        }
    }
}

/// Finish an interrupted release phase: the action that was running first,
/// then the rest in reverse acquisition order.
async fn finish_releases(
    in_flight: Option<InFlightRelease>,
    mut releases: Vec<(CapabilityKey, ReleaseAction)>,
) {
    let mut failures = ReleaseFailures::default();
    if let Some((key, running)) = in_flight {
        failures.record(key, running.await);
    }
    while let Some((key, release)) = releases.pop() {
        tracing::debug!(capability = %key, "releasing");
        failures.record(key, release().await);
    }
    failures.report();
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("request_id", &self.context.request_id())
            .field("acquired", &self.resolved.len())
            .field("pending_releases", &self.releases.len())
            .field("releasing", &self.in_flight.as_ref().map(|(key, _)| *key))
            .finish()
    }
}

/// Holds a scope until its release phase has run.
///
/// If the dispatch future is dropped mid-flight (client went away), the
/// pending releases are handed to a spawned task instead of being lost.
struct ReleaseGuard {
    scope: RequestScope,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let in_flight = self.scope.in_flight.take();
        if in_flight.is_none() && self.scope.releases.is_empty() {
            return;
        }
        let releases = std::mem::take(&mut self.scope.releases);
        let request_id = self.scope.context.request_id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(%request_id, "request cancelled, releasing in background");
                handle.spawn(finish_releases(in_flight, releases));
            }
            Err(_) => tracing::warn!(
                %request_id,
                pending = releases.len() + usize::from(in_flight.is_some()),
                "request dropped outside a runtime, resources not released"
            ),
        }
    }
}

/// A statically known set of capabilities a handler needs.
///
/// Implemented for tuples of [`Capability`] markers; the handler receives the
/// matching tuple of `Arc`ed resources.
pub trait Dependencies: Send + 'static {
    type Output: Send;

    fn keys() -> Vec<CapabilityKey>;

    fn resolve(scope: &mut RequestScope) -> BoxFuture<'_, Result<Self::Output, ProviderError>>;
}

impl Dependencies for () {
    type Output = ();

    fn keys() -> Vec<CapabilityKey> {
        Vec::new()
    }

    fn resolve(_scope: &mut RequestScope) -> BoxFuture<'_, Result<Self::Output, ProviderError>> {
        Box::pin(async { Ok(()) })
    }
}

macro_rules! impl_dependencies {
    ($($name:ident),+) => {
        impl<$($name: Capability),+> Dependencies for ($($name,)+) {
            type Output = ($(Arc<<$name as Capability>::Resource>,)+);

            fn keys() -> Vec<CapabilityKey> {
                vec![$(<$name as Capability>::KEY),+]
            }

            fn resolve(scope: &mut RequestScope) -> BoxFuture<'_, Result<Self::Output, ProviderError>> {
                Box::pin(async move { Ok(($(scope.resolve::<$name>().await?,)+)) })
            }
        }
    };
}

impl_dependencies!(A);
impl_dependencies!(A, B);
impl_dependencies!(A, B, C);
impl_dependencies!(A, B, C, D);
impl_dependencies!(A, B, C, D, E);

/// Resolves declared dependencies, runs the handler, releases resources.
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    registry: Registry,
    overrides: OverrideTable,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self::with_overrides(registry, OverrideTable::new())
    }

    pub fn with_overrides(registry: Registry, overrides: OverrideTable) -> Self {
        Dispatcher {
            registry,
            overrides,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Open a scope for manual resolution. Callers own the release phase.
    pub fn scope(&self, context: RequestContext) -> RequestScope {
        RequestScope::new(context, self.registry.clone(), self.overrides.clone())
    }

    /// Resolve `D`, run `handler` with the resources and release them.
    ///
    /// Fails with [`ProviderError::UnresolvedDependency`] before any factory
    /// runs when a declared capability (or anything it requires) has no
    /// provider. The handler's result is returned untouched by release
    /// failures.
    pub async fn dispatch<D, H, Fut, T, E>(&self, context: RequestContext, handler: H) -> Result<T, E>
    where
        D: Dependencies,
        H: FnOnce(D::Output) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ProviderError>,
    {
        let span = tracing::debug_span!(
            "dispatch",
            request_id = %context.request_id(),
            method = %context.method(),
            path = %context.path(),
        );
        async move {
            let mut lifecycle = Lifecycle::new();
            let keys = D::keys();
            let mut guard = ReleaseGuard {
                scope: self.scope(context),
            };

            lifecycle.advance(DispatchState::Resolving);
            if let Err(err) = guard.scope.check_declared(&keys) {
                lifecycle.advance(DispatchState::Failed);
                tracing::error!(error = %err, "unresolved dependency, handler not run");
                return Err(err.into());
            }
            let resources = match D::resolve(&mut guard.scope).await {
                Ok(resources) => resources,
                Err(err) => {
                    lifecycle.advance(DispatchState::Failed);
                    tracing::debug!(error = %err, "dependency resolution failed");
                    guard.scope.release_all().await;
                    return Err(err.into());
                }
            };

            lifecycle.advance(DispatchState::Dispatched);
            let outcome = handler(resources).await;
            if outcome.is_err() {
                lifecycle.advance(DispatchState::Failed);
                guard.scope.release_all().await;
                return outcome;
            }

            lifecycle.advance(DispatchState::Releasing);
            guard.scope.release_all().await;
            lifecycle.advance(DispatchState::Done);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Resolve a single capability outside of a handler.
    pub async fn resolve<C: Capability>(&self, context: RequestContext) -> Result<Arc<C::Resource>, ProviderError> {
        let mut scope = self.scope(context);
        let resolved = scope.resolve::<C>().await;
        scope.release_all().await;
        resolved
    }
}
