//! Store interfaces for the catalog and for orders.
//!
//! The reservation engine and the order lifecycle only ever talk to these
//! traits. Every capacity mutation goes through [`CatalogStore::conditional_decrement`],
//! [`CatalogStore::increment`] or [`CatalogStore::release_line`], each of which
//! must be a single atomic operation in the backing store.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use lessonbook_catalog::{Quantity, Slot, SlotPatch, SlotQuery};
use lessonbook_core::{OrderId, SlotId};
use lessonbook_orders::Order;

pub use in_memory::{InMemoryCatalogStore, InMemoryOrderStore};
pub use postgres::{PostgresCatalogStore, PostgresOrderStore};

/// Store operation error.
///
/// These are infrastructure failures (unreachable store, timeouts, rows that
/// cannot be decoded), never business outcomes: "not enough space" and
/// "not found" are expressed as `Ok(None)` / `Ok(false)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Filter for order listings. Results are always newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Case-insensitive customer-name prefix.
    pub name_prefix: Option<String>,
    pub limit: Option<usize>,
}

/// Identifies one order line's hand-back during cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReleaseKey {
    pub order_id: OrderId,
    pub line_no: u32,
}

/// Result of [`CatalogStore::release_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRelease {
    /// Key recorded and space credited; the slot as it is after the increment.
    Restored(Slot),
    /// The key was recorded by an earlier call. Nothing changed.
    AlreadyReleased,
    /// Key recorded, but the slot no longer exists so nothing was credited.
    SlotMissing,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError>;

    async fn list(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn insert(&self, slot: Slot) -> Result<(), StoreError>;

    /// Edit descriptive fields. `Ok(None)` if the slot does not exist.
    async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> Result<Option<Slot>, StoreError>;

    /// Atomically decrement `space` by `quantity` iff `space >= quantity`.
    ///
    /// Returns the slot as it is right after the decrement (price and
    /// remaining space as of the claim), or `Ok(None)` when nothing matched
    /// (slot missing or not enough space).
    async fn conditional_decrement(
        &self,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<Option<Slot>, StoreError>;

    /// Atomically increment `space` by `quantity`. `Ok(None)` if the slot does not exist.
    async fn increment(&self, id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError>;

    /// Record `key` and increment `id` by `quantity` as one atomic unit.
    ///
    /// Keys are kept after the order is deleted, so a given line is credited at
    /// most once no matter how many cancellations race or retry. If this
    /// returns an error, neither the key nor the increment took effect.
    async fn release_line(
        &self,
        key: ReleaseKey,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<LineRelease, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<OrderId, StoreError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn delete_by_id(&self, id: OrderId) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn list(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        (**self).list(query).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        (**self).count().await
    }

    async fn insert(&self, slot: Slot) -> Result<(), StoreError> {
        (**self).insert(slot).await
    }

    async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> Result<Option<Slot>, StoreError> {
        (**self).update_details(id, patch).await
    }

    async fn conditional_decrement(
        &self,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<Option<Slot>, StoreError> {
        (**self).conditional_decrement(id, quantity).await
    }

    async fn increment(&self, id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError> {
        (**self).increment(id, quantity).await
    }

    async fn release_line(
        &self,
        key: ReleaseKey,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<LineRelease, StoreError> {
        (**self).release_line(key, id, quantity).await
    }
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn insert(&self, order: Order) -> Result<OrderId, StoreError> {
        (**self).insert(order).await
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        (**self).list(filter).await
    }

    async fn delete_by_id(&self, id: OrderId) -> Result<u64, StoreError> {
        (**self).delete_by_id(id).await
    }
}
