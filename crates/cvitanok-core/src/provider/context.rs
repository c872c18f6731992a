use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};

/// Header carrying the request id, set by the request-id layer.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Everything a factory may know about the request it is producing for.
///
/// Built once per request and threaded explicitly through resolution, the
/// handler and the release phase. Application-wide services travel in the
/// typed `extensions` map.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: String,
    method: Method,
    path: String,
    headers: HeaderMap,
    extensions: Extensions,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RequestContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            extensions: Extensions::new(),
        }
    }

    /// Build a context from the parts of an incoming request.
    ///
    /// The request's extensions are copied, so anything a middleware inserted
    /// is visible to factories.
    pub fn from_parts(parts: &Parts) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        RequestContext {
            request_id,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            extensions: parts.extensions.clone(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// The token of an `Authorization: Bearer <token>` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContext::new(Method::GET, "/")
    }
}
