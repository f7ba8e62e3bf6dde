//! In-memory stores for tests/dev.
//!
//! Each capacity mutation runs its check and its update under one write lock,
//! which is what makes `conditional_decrement` and `release_line` atomic here. Locks are never
//! held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use lessonbook_catalog::{Quantity, Slot, SlotPatch, SlotQuery};
use lessonbook_core::{OrderId, SlotId};
use lessonbook_orders::Order;

use super::{CatalogStore, LineRelease, OrderFilter, OrderStore, ReleaseKey, StoreError};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[derive(Debug, Default)]
struct CatalogState {
    slots: HashMap<SlotId, Slot>,
    released: HashSet<ReleaseKey>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            state: RwLock::new(CatalogState {
                slots: slots.into_iter().map(|s| (s.id, s)).collect(),
                released: HashSet::new(),
            }),
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.slots.get(&id).cloned())
    }

    async fn list(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(query.apply(state.slots.values().cloned()))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.slots.len() as u64)
    }

    async fn insert(&self, slot: Slot) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.slots.insert(slot.id, slot);
        Ok(())
    }

    async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> Result<Option<Slot>, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state.slots.get_mut(&id).map(|slot| {
            patch.apply_to(slot);
            slot.clone()
        }))
    }

    async fn conditional_decrement(
        &self,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<Option<Slot>, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state
            .slots
            .get_mut(&id)
            .filter(|slot| slot.has_space_for(quantity))
            .map(|slot| {
                slot.try_claim(quantity);
                slot.clone()
            }))
    }

    async fn increment(&self, id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state.slots.get_mut(&id).map(|slot| {
            slot.restore(quantity);
            slot.clone()
        }))
    }

    async fn release_line(
        &self,
        key: ReleaseKey,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<LineRelease, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.released.insert(key) {
            return Ok(LineRelease::AlreadyReleased);
        }
        Ok(match state.slots.get_mut(&id) {
            Some(slot) => {
                slot.restore(quantity);
                LineRelease::Restored(slot.clone())
            }
            None => LineRelease::SlotMissing,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<OrderId, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let id = order.id_typed();
        if orders.contains_key(&id) {
            return Err(StoreError::Corrupt(format!("duplicate order id {id}")));
        }
        orders.insert(id, order);
        Ok(id)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).cloned())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        let mut out: Vec<Order> = orders
            .values()
            .filter(|o| match &filter.name_prefix {
                Some(prefix) => o.customer_name_starts_with(prefix),
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn delete_by_id(&self, id: OrderId) -> Result<u64, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        Ok(u64::from(orders.remove(&id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lessonbook_orders::{Customer, OrderLine};

    fn slot(space: i64) -> Slot {
        Slot::new(SlotId::new(), "Math", "Hendon", 100, space, "math.png").unwrap()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn order(name: &str) -> Order {
        Order::place(
            OrderId::new(),
            Customer::parse(name, "07700900123").unwrap(),
            vec![OrderLine::new(1, SlotId::new(), qty(1), 10)],
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn conditional_decrement_reports_no_match_without_mutation() {
        let s = slot(2);
        let id = s.id;
        let store = InMemoryCatalogStore::with_slots([s]);

        assert!(store.conditional_decrement(id, qty(3)).await.unwrap().is_none());
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().space, 2);

        let after = store.conditional_decrement(id, qty(2)).await.unwrap().unwrap();
        assert_eq!(after.space, 0);
    }

    #[tokio::test]
    async fn missing_slots_never_match() {
        let store = InMemoryCatalogStore::new();
        assert!(store.conditional_decrement(SlotId::new(), qty(1)).await.unwrap().is_none());
        assert!(store.increment(SlotId::new(), qty(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_line_credits_each_key_once() {
        let s = slot(2);
        let id = s.id;
        let store = InMemoryCatalogStore::with_slots([s]);
        let key = ReleaseKey {
            order_id: OrderId::new(),
            line_no: 1,
        };

        let first = store.release_line(key, id, qty(3)).await.unwrap();
        assert!(matches!(first, LineRelease::Restored(slot) if slot.space == 5));
        assert_eq!(store.release_line(key, id, qty(3)).await.unwrap(), LineRelease::AlreadyReleased);
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().space, 5);

        let other_line = ReleaseKey { line_no: 2, ..key };
        assert!(matches!(
            store.release_line(other_line, id, qty(1)).await.unwrap(),
            LineRelease::Restored(slot) if slot.space == 6
        ));
    }

    #[tokio::test]
    async fn release_line_on_missing_slot_is_recorded() {
        let store = InMemoryCatalogStore::new();
        let key = ReleaseKey {
            order_id: OrderId::new(),
            line_no: 1,
        };
        let gone = SlotId::new();

        assert_eq!(store.release_line(key, gone, qty(1)).await.unwrap(), LineRelease::SlotMissing);
        assert_eq!(store.release_line(key, gone, qty(1)).await.unwrap(), LineRelease::AlreadyReleased);
    }

    #[tokio::test]
    async fn list_filters_by_prefix_newest_first() {
        let store = InMemoryOrderStore::new();
        let first = store.insert(order("Ada Lovelace")).await.unwrap();
        let second = store.insert(order("Adam Smith")).await.unwrap();
        store.insert(order("Grace Hopper")).await.unwrap();

        let found = store
            .list(&OrderFilter {
                name_prefix: Some("ADA".into()),
                limit: None,
            })
            .await
            .unwrap();
        let ids: Vec<OrderId> = found.iter().map(|o| o.id_typed()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first) && ids.contains(&second));
        assert!(found[0].created_at() >= found[1].created_at());
    }

    #[tokio::test]
    async fn delete_reports_count() {
        let store = InMemoryOrderStore::new();
        let id = store.insert(order("Ada Lovelace")).await.unwrap();
        assert_eq!(store.delete_by_id(id).await.unwrap(), 1);
        assert_eq!(store.delete_by_id(id).await.unwrap(), 0);
    }
}
