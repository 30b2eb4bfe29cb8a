//! Stock Decrementer
//!
//! Takes ordered units out of a product's per-size stock. The remote store
//! only offers read-then-write, so decrements of the same product are queued
//! behind a per-product lock. That covers concurrent checkouts in this process
//! but not other clients writing the same row.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use storefront::{ids::ProductId, stock::StockError};
use thiserror::Error;
use tracing::info;

use crate::remote::{RemoteError, RemoteStore};

/// Errors raised by stock decrements.
#[derive(Debug, Error)]
pub enum StockDecrementError {
    /// Not enough units, or no stock record.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// The stock row could not be read or written.
    #[error("stock storage error")]
    Remote(#[source] RemoteError),
}

/// Per-size stock decrements.
#[automock]
#[async_trait]
pub trait StockDecrementer: Send + Sync {
    /// Take `units` of `size` from `product`, returning what remains of that size.
    async fn decrement(
        &self,
        product: ProductId,
        size: String,
        units: u32,
    ) -> Result<u32, StockDecrementError>;
}

type ProductLocks = Mutex<FxHashMap<ProductId, Arc<tokio::sync::Mutex<()>>>>;

/// [`StockDecrementer`] over the remote store.
#[derive(Clone)]
pub struct RemoteStockDecrementer {
    remote: Arc<dyn RemoteStore>,
    locks: Arc<ProductLocks>,
}

impl fmt::Debug for RemoteStockDecrementer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStockDecrementer")
            .finish_non_exhaustive()
    }
}

impl RemoteStockDecrementer {
    /// Decrementer over `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            locks: Arc::default(),
        }
    }

    /// Lock of `product`, created on first use.
    fn lock_for(&self, product: ProductId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(product)
            .or_default()
            .clone()
    }

    /// Hand back a lock taken with [`Self::lock_for`], forgetting it once no
    /// other decrement holds it. Clones are only made under the map lock, so
    /// the count cannot grow while it is checked.
    fn release(&self, product: ProductId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        drop(lock);

        if locks
            .get(&product)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(&product);
        }
    }

    #[cfg(test)]
    fn tracked_products(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn take(
        &self,
        product: ProductId,
        size: &str,
        units: u32,
    ) -> Result<u32, StockDecrementError> {
        let mut stock = self
            .remote
            .fetch_stock(product)
            .await
            .map_err(|error| not_found_as(product, error))?;

        let remaining = stock.decrement(size, units)?;

        self.remote
            .update_stock(product, stock)
            .await
            .map_err(|error| not_found_as(product, error))?;

        Ok(remaining)
    }
}

#[async_trait]
impl StockDecrementer for RemoteStockDecrementer {
    #[tracing::instrument(
        name = "stock.decrementer.decrement",
        skip(self),
        fields(product_id = %product),
        err
    )]
    async fn decrement(
        &self,
        product: ProductId,
        size: String,
        units: u32,
    ) -> Result<u32, StockDecrementError> {
        let lock = self.lock_for(product);

        let result = {
            let _guard = lock.lock().await;

            self.take(product, &size, units).await
        };

        self.release(product, lock);

        let remaining = result?;

        info!(remaining, "decremented stock");

        Ok(remaining)
    }
}

fn not_found_as(product: ProductId, error: RemoteError) -> StockDecrementError {
    match error {
        RemoteError::NotFound => StockError::ProductNotFound(product).into(),
        error => StockDecrementError::Remote(error),
    }
}

#[cfg(test)]
mod tests {
    use storefront::stock::StockRecord;
    use testresult::TestResult;

    use crate::remote::InMemoryRemoteStore;

    use super::*;

    #[tokio::test]
    async fn decrement_leaves_other_sizes_alone() -> TestResult {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let product = ProductId::new();
        remote.seed_stock(product, [("S", 4), ("M", 3)].into_iter().collect());

        let decrementer = RemoteStockDecrementer::new(remote.clone());

        assert_eq!(decrementer.decrement(product, "M".to_string(), 2).await?, 1);

        let stock = remote.stock(product).unwrap_or_default();

        assert_eq!(stock.available("S"), Some(4));
        assert_eq!(stock.available("M"), Some(1));

        Ok(())
    }

    #[tokio::test]
    async fn insufficient_stock_is_not_written() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let product = ProductId::new();
        let stock: StockRecord = [("M", 1)].into_iter().collect();
        remote.seed_stock(product, stock.clone());

        let decrementer = RemoteStockDecrementer::new(remote.clone());

        let result = decrementer.decrement(product, "M".to_string(), 2).await;

        assert!(
            matches!(
                result,
                Err(StockDecrementError::Stock(StockError::InsufficientStock { .. }))
            ),
            "expected InsufficientStock, got {result:?}"
        );
        assert_eq!(remote.stock(product), Some(stock));
    }

    #[tokio::test]
    async fn unknown_products_are_reported() {
        let decrementer = RemoteStockDecrementer::new(Arc::new(InMemoryRemoteStore::new()));
        let product = ProductId::new();

        let result = decrementer.decrement(product, "M".to_string(), 1).await;

        assert!(
            matches!(
                result,
                Err(StockDecrementError::Stock(StockError::ProductNotFound(id))) if id == product
            ),
            "expected ProductNotFound, got {result:?}"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decrements_of_one_product_are_serialised() -> TestResult {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let product = ProductId::new();
        remote.seed_stock(product, [("M", 10)].into_iter().collect());

        let decrementer = RemoteStockDecrementer::new(remote.clone());

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let decrementer = decrementer.clone();
                tokio::spawn(async move { decrementer.decrement(product, "M".to_string(), 1).await })
            })
            .collect();

        for task in tasks {
            task.await??;
        }

        assert_eq!(remote.stock(product).and_then(|s| s.available("M")), Some(0));
        assert_eq!(decrementer.tracked_products(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn locks_are_forgotten_after_each_decrement() -> TestResult {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let decrementer = RemoteStockDecrementer::new(remote.clone());

        for _ in 0..3 {
            let product = ProductId::new();
            remote.seed_stock(product, [("M", 1)].into_iter().collect());

            decrementer.decrement(product, "M".to_string(), 1).await?;
        }

        let failed = decrementer
            .decrement(ProductId::new(), "M".to_string(), 1)
            .await;

        assert!(failed.is_err(), "expected an unknown product, got {failed:?}");
        assert_eq!(decrementer.tracked_products(), 0);

        Ok(())
    }
}
