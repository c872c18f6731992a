//! Request-scoped resource providers.
//!
//! Handlers never build their own database sessions, users or caches. They
//! declare the *capabilities* they need and the [`Dispatcher`] resolves each
//! one for the duration of a single request:
//!
//! ```text
//! request ─→ declared capabilities ─→ OverrideTable? ─→ Registry ─→ Factory
//!                                                                     │
//!            handler(resources) ←──────────── inject ←────────────────┘
//!                 │
//!                 └─→ release (reverse acquisition order)
//! ```
//!
//! # Declaring a capability
//!
//! ```rust,ignore
//! use cvitanok_core::provider::{Capability, CapabilityKey, Factory, Provided, Registry};
//!
//! pub struct Greeting;
//!
//! impl Capability for Greeting {
//!     type Resource = String;
//!     const KEY: CapabilityKey = CapabilityKey::new("greeting");
//! }
//!
//! let mut registry = Registry::new();
//! registry.register(Factory::<Greeting>::value("hello".to_string()))?;
//! ```
//!
//! Tests swap providers through the [`OverrideTable`] without touching the
//! handlers that consume them.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod overrides;
pub mod registry;

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

pub use context::RequestContext;
pub use dispatch::{Dependencies, DispatchState, Dispatcher, RequestScope};
pub use error::{BoxError, ProviderError};
pub use overrides::{OverrideScope, OverrideTable};
pub use registry::Registry;

/// Opaque identifier naming one capability (e.g. `"db_session"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityKey(&'static str);

impl CapabilityKey {
    pub const fn new(name: &'static str) -> Self {
        CapabilityKey(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Binds a [`CapabilityKey`] to the type of resource it produces.
///
/// Implemented by zero-sized marker types. Registration and resolution are
/// typed by the marker, so a factory can only ever be installed for the
/// resource type its key promises.
pub trait Capability: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    const KEY: CapabilityKey;
}

/// How long a produced resource lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// Produced at most once per request and dropped with it.
    Request,
    /// Produced once and shared by every request of the process.
    Process,
}

type ReleaseFn<R> = Box<dyn FnOnce(Arc<R>) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

pub(crate) type ReleaseAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

pub(crate) type SharedResource = Arc<dyn Any + Send + Sync>;

/// A resource returned by a factory, optionally paired with a release action.
pub struct Provided<R> {
    resource: R,
    release: Option<ReleaseFn<R>>,
}

impl<R: Send + Sync + 'static> Provided<R> {
    pub fn new(resource: R) -> Self {
        Provided {
            resource,
            release: None,
        }
    }

    /// Run `release` once the request that acquired this resource finishes.
    pub fn on_release<F, Fut>(mut self, release: F) -> Self
    where
        F: FnOnce(Arc<R>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.release = Some(Box::new(
            move |resource: Arc<R>| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(release(resource))
            },
        ));
        self
    }

    fn erase(self) -> ErasedProvided {
        let resource = Arc::new(self.resource);
        let release = self.release.map(|release| {
            let held = resource.clone();
            Box::new(move || release(held)) as ReleaseAction
        });
        ErasedProvided {
            resource,
            release,
        }
    }
}

pub(crate) struct ErasedProvided {
    pub(crate) resource: SharedResource,
    pub(crate) release: Option<ReleaseAction>,
}

type ErasedFn =
    dyn for<'a> Fn(&'a mut RequestScope) -> BoxFuture<'a, Result<ErasedProvided, BoxError>>
        + Send
        + Sync;

fn erase_fn<F>(f: F) -> Arc<ErasedFn>
where
    F: for<'a> Fn(&'a mut RequestScope) -> BoxFuture<'a, Result<ErasedProvided, BoxError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Type-erased factory as stored by the registry and the override table.
#[derive(Clone)]
pub(crate) struct RawFactory {
    pub(crate) call: Arc<ErasedFn>,
    pub(crate) requires: Arc<[CapabilityKey]>,
    pub(crate) resource_type: TypeId,
    pub(crate) resource_name: &'static str,
    pub(crate) shared: Option<Arc<OnceCell<SharedResource>>>,
}

/// A typed factory for capability `C`.
///
/// Factories receive the [`RequestScope`] so they can read the request
/// context and resolve their own sub-dependencies:
///
/// ```rust,ignore
/// Factory::<CurrentUser>::new(|scope| Box::pin(async move {
///     let db = scope.resolve::<DbSession>().await?;
///     let user = load_user(&db, scope.context()).await?;
///     Ok(Provided::new(user))
/// }))
/// .requires(&[DbSession::KEY])
/// ```
pub struct Factory<C: Capability> {
    raw: RawFactory,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Capability> Factory<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut RequestScope,
            ) -> BoxFuture<'a, Result<Provided<C::Resource>, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        let call = erase_fn(move |scope| {
            let produced = f(scope);
            Box::pin(async move { produced.await.map(Provided::erase) })
        });
        Factory {
            raw: RawFactory {
                call,
                requires: Arc::from(Vec::new()),
                resource_type: TypeId::of::<C::Resource>(),
                resource_name: std::any::type_name::<C::Resource>(),
                shared: None,
            },
            _marker: PhantomData,
        }
    }

    /// A factory handing out clones of a fixed value.
    pub fn value(value: C::Resource) -> Self
    where
        C::Resource: Clone,
    {
        Self::new(move |_scope| {
            let value = value.clone();
            Box::pin(async move { Ok::<_, BoxError>(Provided::new(value)) })
        })
    }

    /// Declare the capabilities this factory resolves, so a missing one is
    /// reported before any factory of the request runs.
    pub fn requires(mut self, keys: &[CapabilityKey]) -> Self {
        self.raw.requires = Arc::from(keys.to_vec());
        self
    }

    /// Produce the resource once and share it across requests.
    ///
    /// Release actions of process-wide resources are not run per request.
    pub fn process_cached(mut self) -> Self {
        self.raw.shared = Some(Arc::new(OnceCell::new()));
        self
    }

    pub fn lifetime(&self) -> Lifetime {
        if self.raw.shared.is_some() {
            Lifetime::Process
        } else {
            Lifetime::Request
        }
    }

    pub fn key(&self) -> CapabilityKey {
        C::KEY
    }

    pub(crate) fn into_raw(self) -> RawFactory {
        self.raw
    }
}

impl<C: Capability> fmt::Debug for Factory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("key", &C::KEY)
            .field("resource", &self.raw.resource_name)
            .field("requires", &self.raw.requires)
            .field("lifetime", &self.lifetime())
            .finish()
    }
}
