use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::controllers::AppState;
use crate::error::AppError;
use crate::provider::{Dependencies, Dispatcher, RequestContext};

/// Declares the capabilities a handler needs.
///
/// Extraction never fails: it only captures the request context. The
/// resources are resolved by [`run`](Inject::run), which hands them to the
/// handler body and releases them once it returns.
///
/// ```rust,ignore
/// async fn protected(deps: Inject<(CurrentActiveUser,)>) -> Result<Json<MessageResponse>, AppError> {
///     deps.run(|(user,)| async move {
///         Ok(Json(MessageResponse::new(format!("Hello {}!", user.email))))
///     })
///     .await
/// }
/// ```
pub struct Inject<D> {
    dispatcher: Dispatcher,
    context: RequestContext,
    _deps: PhantomData<fn() -> D>,
}

impl<D: Dependencies> Inject<D> {
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Resolve `D`, run `body` with the resources, then release them.
    pub async fn run<H, Fut, T>(self, body: H) -> Result<T, AppError>
    where
        H: FnOnce(D::Output) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.dispatcher
            .dispatch::<D, _, _, _, _>(self.context, body)
            .await
    }
}

impl<D: Dependencies> FromRequestParts<AppState> for Inject<D> {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Inject {
            dispatcher: state.dispatcher.clone(),
            context: RequestContext::from_parts(parts),
            _deps: PhantomData,
        })
    }
}
