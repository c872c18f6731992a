use thiserror::Error;

use super::CapabilityKey;

/// Boxed error returned by factories and release actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while registering, resolving or releasing resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("capability `{key}` is already registered")]
    DuplicateKey { key: CapabilityKey },

    #[error("no provider registered for capability `{key}`")]
    UnresolvedDependency { key: CapabilityKey },

    #[error("resource `{key}` is unavailable: {source}")]
    ResourceUnavailable {
        key: CapabilityKey,
        #[source]
        source: BoxError,
    },

    #[error("capability `{key}` produces `{found}`, but `{expected}` was requested")]
    TypeMismatch {
        key: CapabilityKey,
        expected: &'static str,
        found: &'static str,
    },

    #[error("dependency cycle while resolving `{key}`: {path}")]
    Cycle { key: CapabilityKey, path: String },
}

impl ProviderError {
    /// Wrap a factory failure.
    ///
    /// Failures that already are provider errors (a nested resolution that
    /// failed) are passed through so the innermost key is reported.
    pub fn unavailable(key: CapabilityKey, source: BoxError) -> Self {
        match source.downcast::<ProviderError>() {
            Ok(inner) => *inner,
            Err(source) => ProviderError::ResourceUnavailable { key, source },
        }
    }

    /// The capability this error is about.
    pub fn key(&self) -> CapabilityKey {
        match self {
            ProviderError::DuplicateKey { key }
            | ProviderError::UnresolvedDependency { key }
            | ProviderError::ResourceUnavailable { key, .. }
            | ProviderError::TypeMismatch { key, .. }
            | ProviderError::Cycle { key, .. } => *key,
        }
    }

    /// Errors caused by how providers were wired rather than by the request.
    pub fn is_misconfiguration(&self) -> bool {
        !matches!(self, ProviderError::ResourceUnavailable { .. })
    }
}
