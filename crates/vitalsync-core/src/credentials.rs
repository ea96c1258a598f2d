//! Single-flight credential resolution.
//!
//! Concurrent callers of [`CredentialResolver::resolve`] share one in-flight
//! lookup against the underlying [`CredentialSource`]. The shared future is
//! cleared once it completes, so the next call after completion performs a
//! fresh lookup and failures are never cached.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::debug;

use vitalsync_types::Credentials;

use crate::error::{Error, Result};
use crate::traits::CredentialSource;

type SharedResolve = Shared<BoxFuture<'static, std::result::Result<Option<Credentials>, Arc<Error>>>>;

/// Memoizing front for a [`CredentialSource`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vitalsync_core::{CredentialResolver, StaticCredentials};
/// use vitalsync_types::Credentials;
///
/// #[tokio::main]
/// async fn main() {
///     let source = StaticCredentials::new(Credentials::new("dev-1", None));
///     let resolver = CredentialResolver::new(Arc::new(source));
///     let creds = resolver.resolve().await.unwrap();
///     assert_eq!(creds.device_id.as_deref(), Some("dev-1"));
/// }
/// ```
pub struct CredentialResolver {
    source: Arc<dyn CredentialSource>,
    in_flight: Mutex<Option<SharedResolve>>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Wrap a credential source.
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(None),
        }
    }

    /// Resolve usable credentials, joining an in-flight lookup if one exists.
    ///
    /// Returns [`Error::CredentialsUnavailable`] when the source fails or
    /// yields no usable device identity.
    pub async fn resolve(&self) -> Result<Credentials> {
        let lookup = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight credential lookup");
                    existing.clone()
                }
                None => {
                    let source = Arc::clone(&self.source);
                    let fresh = async move { source.resolve().await.map_err(Arc::new) }
                        .boxed()
                        .shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let outcome = lookup.clone().await;

        {
            let mut slot = self.in_flight.lock().await;
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&lookup)) {
                *slot = None;
            }
        }

        match outcome {
            Ok(Some(credentials)) if credentials.is_usable() => Ok(credentials),
            Ok(_) => Err(Error::CredentialsUnavailable(
                "no device identity in profile".to_string(),
            )),
            Err(e) => Err(Error::CredentialsUnavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCredentials;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolves_share_one_lookup() {
        let source = Arc::new(
            MockCredentials::new(Credentials::new("dev-1", None))
                .with_latency(Duration::from_millis(200)),
        );
        let resolver = CredentialResolver::new(source.clone());

        let results = futures::future::join_all((0..8).map(|_| resolver.resolve())).await;

        assert_eq!(source.call_count(), 1);
        for result in results {
            assert_eq!(result.unwrap().device_id.as_deref(), Some("dev-1"));
        }
    }

    #[tokio::test]
    async fn test_lookup_cleared_after_completion() {
        let source = Arc::new(MockCredentials::new(Credentials::new("dev-1", None)));
        let resolver = CredentialResolver::new(source.clone());

        resolver.resolve().await.unwrap();
        resolver.resolve().await.unwrap();

        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let source = Arc::new(MockCredentials::new(Credentials::new("dev-1", None)));
        source.set_should_fail(true);
        let resolver = CredentialResolver::new(source.clone());

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::CredentialsUnavailable(_)));

        source.set_should_fail(false);
        assert!(resolver.resolve().await.is_ok());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unavailable() {
        let source = Arc::new(MockCredentials::none());
        let resolver = CredentialResolver::new(source);
        assert!(matches!(
            resolver.resolve().await,
            Err(Error::CredentialsUnavailable(_))
        ));

        let blank = Arc::new(MockCredentials::new(Credentials::default()));
        let resolver = CredentialResolver::new(blank);
        assert!(resolver.resolve().await.is_err());
    }
}
