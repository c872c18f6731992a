use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// `?limit=&offset=` query parameters.
///
/// Malformed values fall back to the defaults instead of rejecting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Number of items to return (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Number of items to skip (default: 0)
    #[serde(default)]
    pub offset: u64,
}

pub const MAX_LIMIT: u64 = 100;

fn default_limit() -> u64 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: u64, offset: u64) -> Self {
        Pagination { limit, offset }.clamped()
    }

    /// Clamp limit to [`MAX_LIMIT`].
    pub fn clamped(self) -> Self {
        Pagination {
            limit: self.limit.min(MAX_LIMIT),
            offset: self.offset,
        }
    }
}

impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = crate::error::AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pagination = Query::<Pagination>::try_from_uri(&parts.uri)
            .map(|Query(p)| p)
            .unwrap_or_default();
        Ok(pagination.clamped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(uri: &str) -> Pagination {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        Pagination::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn defaults_and_clamping() {
        assert_eq!(extract("/x").await, Pagination::default());
        assert_eq!(extract("/x?limit=500&offset=3").await, Pagination::new(100, 3));
        assert_eq!(extract("/x?limit=abc").await, Pagination::default());
    }
}
