//! Memoized asynchronous wallet properties.
//!
//! A [`LazyField`] runs its resolver on first access and caches the value for
//! every later access. Concurrent first accesses share the one in-flight
//! resolution; a failed resolution leaves the field unresolved so the next
//! access tries again.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use tracing::debug;

use super::errors::WalletError;

type Resolver<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, WalletError>> + Send + Sync>;

/// Observable state of a lazy field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Unresolved,
    Resolving,
    Resolved,
}

pub struct LazyField<T> {
    name: &'static str,
    cell: OnceCell<T>,
    resolving: AtomicBool,
    resolver: Option<Resolver<T>>,
}

/// Clears the resolving flag even if the resolving future is dropped.
struct ResolvingGuard<'a>(&'a AtomicBool);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Clone + Send + Sync + 'static> LazyField<T> {
    pub fn new<F, Fut>(name: &'static str, resolver: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, WalletError>> + Send + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            resolving: AtomicBool::new(false),
            resolver: Some(Box::new(move || resolver().boxed())),
        }
    }

    /// A field whose value is known at construction.
    pub fn resolved(name: &'static str, value: T) -> Self {
        Self {
            name,
            cell: OnceCell::new_with(Some(value)),
            resolving: AtomicBool::new(false),
            resolver: None,
        }
    }

    /// A field the wallet kind does not have. Every access fails.
    pub fn unavailable(name: &'static str) -> Self {
        Self { name, cell: OnceCell::new(), resolving: AtomicBool::new(false), resolver: None }
    }

    pub fn state(&self) -> CellState {
        if self.cell.initialized() {
            CellState::Resolved
        } else if self.resolving.load(Ordering::SeqCst) {
            CellState::Resolving
        } else {
            CellState::Unresolved
        }
    }

    /// Returns the cached value, resolving it first if needed.
    pub async fn get(&self) -> Result<T, WalletError> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            WalletError::validation(self.name, "is not available for this wallet type")
        })?;
        let value = self
            .cell
            .get_or_try_init(|| async {
                self.resolving.store(true, Ordering::SeqCst);
                let _guard = ResolvingGuard(&self.resolving);
                debug!(field = self.name, "resolving lazy wallet field");
                resolver().await
            })
            .await?;
        Ok(value.clone())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazyField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyField").field("name", &self.name).field("value", &self.cell.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting_field(calls: Arc<AtomicUsize>) -> LazyField<String> {
        LazyField::new("address", move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("0xabc".to_string())
            }
        })
    }

    #[tokio::test]
    async fn test_resolves_once_and_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let field = counting_field(calls.clone());
        assert_eq!(field.state(), CellState::Unresolved);

        assert_eq!(field.get().await.unwrap(), "0xabc");
        assert_eq!(field.get().await.unwrap(), "0xabc");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(field.state(), CellState::Resolved);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_shares_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let field = counting_field(calls.clone());

        let (a, b) = tokio::join!(field.get(), field.get());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_stays_unresolved() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let field: LazyField<String> = LazyField::new("publicKey", move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(WalletError::Crypto("device busy".into()))
                } else {
                    Ok("0x04ab".to_string())
                }
            }
        });

        assert!(field.get().await.is_err());
        assert_eq!(field.state(), CellState::Unresolved);
        assert_eq!(field.get().await.unwrap(), "0x04ab");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prefilled_and_unavailable_fields() {
        let field = LazyField::resolved("derivationPath", "m/44'/60'/0'/0/0".to_string());
        assert_eq!(field.state(), CellState::Resolved);
        assert_eq!(field.get().await.unwrap(), "m/44'/60'/0'/0/0");

        let missing: LazyField<String> = LazyField::unavailable("derivationPath");
        let err = missing.get().await.unwrap_err();
        assert!(matches!(err, WalletError::Validation { field: "derivationPath", .. }));
    }
}
