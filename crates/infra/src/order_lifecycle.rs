//! Order creation and compensating cancellation.
//!
//! Creation: validate, check each lesson exists, claim through the
//! [`ReservationEngine`], then persist the order with the claimed quantities
//! and frozen prices. Cancellation: hand back each line's quantity exactly
//! once through [`CatalogStore::release_line`], which records the line's key
//! and credits the lesson atomically, then delete the order. The delete is
//! the commit point and only happens when every line was handled.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use lessonbook_catalog::Quantity;
use lessonbook_core::{OrderId, SlotId};
use lessonbook_orders::{Order, OrderLine, OrderRequest};

use crate::error::{BookingError, BookingResult};
use crate::reservation::{ClaimRequest, Reservation, ReservationEngine};
use crate::store::{CatalogStore, LineRelease, OrderStore, ReleaseKey, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSpace {
    pub slot_id: SlotId,
    pub space: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub total: u64,
    /// Remaining space of each touched lesson after the claim, in request order.
    pub updated: Vec<SlotSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    /// An earlier cancellation attempt already handed this line back.
    AlreadyReleased,
    /// The lesson no longer exists; nothing to credit.
    SlotMissing,
}

impl RestoreOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RestoreOutcome::Restored => "restored",
            RestoreOutcome::AlreadyReleased => "already_released",
            RestoreOutcome::SlotMissing => "slot_missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoredLine {
    pub slot_id: SlotId,
    pub quantity: Quantity,
    pub outcome: RestoreOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationReport {
    pub order_id: OrderId,
    pub restored: Vec<RestoredLine>,
    pub deleted_count: u64,
}

pub struct OrderLifecycle<C, O> {
    engine: ReservationEngine<C>,
    orders: O,
}

impl<C, O> OrderLifecycle<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    pub fn new(catalog: C, orders: O) -> Self {
        Self {
            engine: ReservationEngine::new(catalog),
            orders,
        }
    }

    pub fn engine(&self) -> &ReservationEngine<C> {
        &self.engine
    }

    pub fn catalog(&self) -> &C {
        self.engine.catalog()
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: &OrderRequest) -> BookingResult<CreatedOrder> {
        let validated = request.validate()?;

        // Separate lookup so a missing lesson reads as 404, not as "no space".
        for item in &validated.items {
            if self.catalog().find_by_id(item.slot_id).await?.is_none() {
                return Err(BookingError::SlotNotFound(item.slot_id));
            }
        }

        let claims: Vec<ClaimRequest> = validated
            .items
            .iter()
            .map(|item| ClaimRequest {
                slot_id: item.slot_id,
                quantity: item.quantity,
            })
            .collect();
        let reservation = self.engine.claim(&claims).await?;

        let lines: Vec<OrderLine> = reservation
            .claims()
            .iter()
            .zip(1u32..)
            .map(|(claim, line_no)| OrderLine::new(line_no, claim.slot_id, claim.quantity, claim.unit_price))
            .collect();

        let order = match Order::place(OrderId::new(), validated.customer, lines, Utc::now()) {
            Ok(order) => order,
            Err(err) => {
                self.abandon(&reservation).await;
                return Err(err.into());
            }
        };
        let total = order.total();

        let order_id = match self.orders.insert(order).await {
            Ok(id) => id,
            Err(err) => {
                error!(error = %err, "failed to persist order, releasing its reservation");
                self.abandon(&reservation).await;
                return Err(err.into());
            }
        };

        info!(order_id = %order_id, total, "order created");
        Ok(CreatedOrder {
            order_id,
            total,
            updated: touched_slots(&reservation),
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> BookingResult<CancellationReport> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(BookingError::OrderNotFound(order_id))?;

        let mut restored = Vec::with_capacity(order.lines().len());
        let mut failure: Option<StoreError> = None;

        for line in order.lines() {
            match self.release_line(order_id, line).await {
                Ok(outcome) => restored.push(RestoredLine {
                    slot_id: line.slot_id,
                    quantity: line.quantity,
                    outcome,
                }),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "cancellation incomplete, order kept for retry");
            return Err(err.into());
        }

        let deleted_count = self.orders.delete_by_id(order_id).await?;
        if deleted_count == 0 {
            // A concurrent cancellation committed first.
            return Err(BookingError::OrderNotFound(order_id));
        }

        info!(lines = restored.len(), "order cancelled");
        Ok(CancellationReport {
            order_id,
            restored,
            deleted_count,
        })
    }

    /// Hand one line's quantity back to its lesson, at most once across attempts.
    async fn release_line(&self, order_id: OrderId, line: &OrderLine) -> Result<RestoreOutcome, StoreError> {
        let key = ReleaseKey {
            order_id,
            line_no: line.line_no,
        };
        match self.catalog().release_line(key, line.slot_id, line.quantity).await {
            Ok(LineRelease::Restored(_)) => Ok(RestoreOutcome::Restored),
            Ok(LineRelease::AlreadyReleased) => Ok(RestoreOutcome::AlreadyReleased),
            Ok(LineRelease::SlotMissing) => {
                warn!(slot_id = %line.slot_id, quantity = %line.quantity, "lesson missing on restore, skipping");
                Ok(RestoreOutcome::SlotMissing)
            }
            Err(err) => {
                error!(
                    slot_id = %line.slot_id,
                    line_no = line.line_no,
                    error = %err,
                    "restore failed, line left for retry"
                );
                Err(err)
            }
        }
    }

    async fn abandon(&self, reservation: &Reservation) {
        let failed = self.engine.release(reservation).await;
        if failed > 0 {
            error!(failed, "reservation only partially released");
        }
    }
}

/// One entry per distinct lesson, carrying the space left after its last claim.
fn touched_slots(reservation: &Reservation) -> Vec<SlotSpace> {
    let mut updated: Vec<SlotSpace> = Vec::new();
    for claim in reservation.claims() {
        match updated.iter_mut().find(|s| s.slot_id == claim.slot_id) {
            Some(existing) => existing.space = claim.remaining,
            None => updated.push(SlotSpace {
                slot_id: claim.slot_id,
                space: claim.remaining,
            }),
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use lessonbook_catalog::{Slot, SlotPatch, SlotQuery};
    use lessonbook_orders::{Customer, QuantityInput, RequestedItem};
    use tokio::sync::Notify;

    use super::*;
    use crate::reservation::tests::{FlakyCatalog, qty, slot, space_of};
    use crate::store::{InMemoryCatalogStore, InMemoryOrderStore, OrderFilter};

    fn request(items: &[(SlotId, i64)]) -> OrderRequest {
        OrderRequest {
            name: "Ada Lovelace".into(),
            phone: "07700 900123".into(),
            items: items
                .iter()
                .map(|(id, q)| RequestedItem {
                    slot_id: Some(id.to_string()),
                    quantity: Some(QuantityInput::Whole(*q)),
                })
                .collect(),
        }
    }

    fn lifecycle(slots: Vec<Slot>) -> OrderLifecycle<InMemoryCatalogStore, InMemoryOrderStore> {
        OrderLifecycle::new(InMemoryCatalogStore::with_slots(slots), InMemoryOrderStore::new())
    }

    #[tokio::test]
    async fn booking_scenario_claim_reject_cancel() {
        let l1 = slot("Math", 100, 5);
        let svc = lifecycle(vec![l1.clone()]);

        let created = svc.create_order(&request(&[(l1.id, 3)])).await.unwrap();
        assert_eq!(created.total, 300);
        assert_eq!(created.updated, vec![SlotSpace { slot_id: l1.id, space: 2 }]);

        let err = svc.create_order(&request(&[(l1.id, 3)])).await.unwrap_err();
        assert_eq!(err, BookingError::CapacityExhausted { slot_id: l1.id });
        assert!(err.to_string().contains(&l1.id.to_string()));
        assert_eq!(space_of(svc.catalog(), l1.id).await, 2);

        let report = svc.cancel_order(created.order_id).await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.restored[0].outcome, RestoreOutcome::Restored);
        assert_eq!(space_of(svc.catalog(), l1.id).await, 5);
    }

    #[tokio::test]
    async fn second_item_without_space_rejects_whole_order() {
        let a = slot("Math", 100, 5);
        let b = slot("Art", 70, 0);
        let svc = lifecycle(vec![a.clone(), b.clone()]);

        let err = svc.create_order(&request(&[(a.id, 2), (b.id, 1)])).await.unwrap_err();

        assert_eq!(err, BookingError::CapacityExhausted { slot_id: b.id });
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
        assert!(svc.orders().list(&OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found_and_touches_nothing() {
        let a = slot("Math", 100, 5);
        let ghost = SlotId::new();
        let svc = lifecycle(vec![a.clone()]);

        let err = svc.create_order(&request(&[(a.id, 1), (ghost, 1)])).await.unwrap_err();

        assert_eq!(err, BookingError::SlotNotFound(ghost));
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn validation_runs_before_any_store_access() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);

        let mut bad = request(&[(a.id, 1), (SlotId::new(), 0)]);
        let err = svc.create_order(&bad).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(msg) if msg.contains("invalid quantity")));

        bad = request(&[(a.id, 1)]);
        bad.phone = "call me".into();
        assert!(matches!(svc.create_order(&bad).await, Err(BookingError::Validation(_))));
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn price_is_frozen_at_claim_time() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);
        let created = svc.create_order(&request(&[(a.id, 2)])).await.unwrap();

        let patch = SlotPatch {
            price: Some(999),
            ..SlotPatch::default()
        };
        svc.catalog().update_details(a.id, &patch).await.unwrap();

        let stored = svc.orders().find_by_id(created.order_id).await.unwrap().unwrap();
        assert_eq!(stored.total(), 200);
        assert_eq!(stored.lines()[0].unit_price, 100);
    }

    #[tokio::test]
    async fn duplicate_lessons_stay_separate_lines() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);

        let created = svc.create_order(&request(&[(a.id, 1), (a.id, 2)])).await.unwrap();

        assert_eq!(created.total, 300);
        assert_eq!(created.updated, vec![SlotSpace { slot_id: a.id, space: 2 }]);
        let stored = svc.orders().find_by_id(created.order_id).await.unwrap().unwrap();
        assert_eq!(stored.lines().len(), 2);

        svc.cancel_order(created.order_id).await.unwrap();
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn restore_is_exact_after_external_changes() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);
        let created = svc.create_order(&request(&[(a.id, 3)])).await.unwrap();

        // Someone else books the remaining two in the meantime.
        svc.engine().claim(&[ClaimRequest { slot_id: a.id, quantity: qty(2) }]).await.unwrap();
        svc.cancel_order(created.order_id).await.unwrap();

        assert_eq!(space_of(svc.catalog(), a.id).await, 3);
    }

    #[tokio::test]
    async fn second_cancellation_is_not_found_and_changes_nothing() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);
        let created = svc.create_order(&request(&[(a.id, 3)])).await.unwrap();

        svc.cancel_order(created.order_id).await.unwrap();
        let err = svc.cancel_order(created.order_id).await.unwrap_err();

        assert_eq!(err, BookingError::OrderNotFound(created.order_id));
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancellations_credit_once() {
        let a = slot("Math", 100, 5);
        let svc = Arc::new(lifecycle(vec![a.clone()]));
        let created = svc.create_order(&request(&[(a.id, 4)])).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.cancel_order(created.order_id).await.is_ok() })
            })
            .collect();
        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn failed_restore_keeps_order_and_retry_does_not_double_credit() {
        let a = slot("Math", 100, 5);
        let b = slot("Art", 70, 5);
        let flaky = FlakyCatalog::wrapping(InMemoryCatalogStore::with_slots([a.clone(), b.clone()]));
        let svc = OrderLifecycle::new(flaky, InMemoryOrderStore::new());
        let created = svc.create_order(&request(&[(a.id, 2), (b.id, 3)])).await.unwrap();

        svc.catalog().fail_increment_for.lock().unwrap().insert(b.id);
        let err = svc.cancel_order(created.order_id).await.unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));
        assert!(svc.orders().find_by_id(created.order_id).await.unwrap().is_some());
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
        assert_eq!(space_of(svc.catalog(), b.id).await, 2);

        svc.catalog().fail_increment_for.lock().unwrap().clear();
        let report = svc.cancel_order(created.order_id).await.unwrap();

        let outcomes: Vec<_> = report.restored.iter().map(|l| l.outcome).collect();
        assert_eq!(outcomes, vec![RestoreOutcome::AlreadyReleased, RestoreOutcome::Restored]);
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
        assert_eq!(space_of(svc.catalog(), b.id).await, 5);
    }

    #[tokio::test]
    async fn missing_lesson_on_cancel_is_skipped_and_reported() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);
        let gone = SlotId::new();
        let order = Order::place(
            OrderId::new(),
            Customer::parse("Ada Lovelace", "07700 900123").unwrap(),
            vec![OrderLine::new(1, gone, qty(1), 50), OrderLine::new(2, a.id, qty(1), 100)],
            Utc::now(),
        )
        .unwrap();
        let id = svc.orders().insert(order).await.unwrap();

        let report = svc.cancel_order(id).await.unwrap();

        assert_eq!(report.restored[0].outcome, RestoreOutcome::SlotMissing);
        assert_eq!(report.restored[1].outcome, RestoreOutcome::Restored);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(space_of(svc.catalog(), a.id).await, 6);
    }

    /// Order store double whose inserts can be made to fail.
    #[derive(Default)]
    struct BrokenOrders {
        inner: InMemoryOrderStore,
        fail_insert: AtomicBool,
    }

    #[async_trait]
    impl OrderStore for BrokenOrders {
        async fn insert(&self, order: Order) -> Result<OrderId, StoreError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected outage".into()));
            }
            self.inner.insert(order).await
        }

        async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
            self.inner.list(filter).await
        }

        async fn delete_by_id(&self, id: OrderId) -> Result<u64, StoreError> {
            self.inner.delete_by_id(id).await
        }
    }

    #[tokio::test]
    async fn failed_persist_releases_the_claim() {
        let a = slot("Math", 100, 5);
        let orders = BrokenOrders::default();
        orders.fail_insert.store(true, Ordering::SeqCst);
        let svc = OrderLifecycle::new(InMemoryCatalogStore::with_slots([a.clone()]), orders);

        let err = svc.create_order(&request(&[(a.id, 3)])).await.unwrap_err();

        assert!(matches!(err, BookingError::Store(_)));
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn overflowing_total_releases_the_claim() {
        let a = slot("Math", u64::MAX, 5);
        let svc = lifecycle(vec![a.clone()]);

        let err = svc.create_order(&request(&[(a.id, 2)])).await.unwrap_err();

        assert!(matches!(err, BookingError::Validation(msg) if msg.contains("total")));
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn retry_after_a_committed_restore_does_not_double_credit() {
        let a = slot("Math", 100, 5);
        let svc = lifecycle(vec![a.clone()]);
        let created = svc.create_order(&request(&[(a.id, 3)])).await.unwrap();

        // An earlier attempt credited the line and stopped before deleting the order.
        let key = ReleaseKey {
            order_id: created.order_id,
            line_no: 1,
        };
        svc.catalog().release_line(key, a.id, qty(3)).await.unwrap();
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);

        let report = svc.cancel_order(created.order_id).await.unwrap();

        assert_eq!(report.restored[0].outcome, RestoreOutcome::AlreadyReleased);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    /// Catalog double whose next `release_line` parks until opened, then fails with no effect.
    #[derive(Default)]
    struct GatedCatalog {
        inner: InMemoryCatalogStore,
        armed: AtomicBool,
        entered: Notify,
        open: Notify,
    }

    #[async_trait]
    impl CatalogStore for GatedCatalog {
        async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn list(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
            self.inner.list(query).await
        }

        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }

        async fn insert(&self, slot: Slot) -> Result<(), StoreError> {
            self.inner.insert(slot).await
        }

        async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> Result<Option<Slot>, StoreError> {
            self.inner.update_details(id, patch).await
        }

        async fn conditional_decrement(
            &self,
            id: SlotId,
            quantity: Quantity,
        ) -> Result<Option<Slot>, StoreError> {
            self.inner.conditional_decrement(id, quantity).await
        }

        async fn increment(&self, id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError> {
            self.inner.increment(id, quantity).await
        }

        async fn release_line(
            &self,
            key: ReleaseKey,
            id: SlotId,
            quantity: Quantity,
        ) -> Result<LineRelease, StoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.open.notified().await;
                return Err(StoreError::Unavailable("injected outage".into()));
            }
            self.inner.release_line(key, id, quantity).await
        }
    }

    #[tokio::test]
    async fn cancel_racing_a_failing_restore_never_loses_capacity() {
        let a = slot("Math", 100, 5);
        let catalog = GatedCatalog {
            inner: InMemoryCatalogStore::with_slots([a.clone()]),
            ..GatedCatalog::default()
        };
        let svc = Arc::new(OrderLifecycle::new(catalog, InMemoryOrderStore::new()));
        let created = svc.create_order(&request(&[(a.id, 3)])).await.unwrap();
        svc.catalog().armed.store(true, Ordering::SeqCst);

        let stalled = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.cancel_order(created.order_id).await })
        };
        svc.catalog().entered.notified().await;

        let report = svc.cancel_order(created.order_id).await.unwrap();
        assert_eq!(report.restored[0].outcome, RestoreOutcome::Restored);

        svc.catalog().open.notify_one();
        let stalled = stalled.await.unwrap();
        assert!(matches!(stalled, Err(BookingError::Store(_))));

        assert!(svc.orders().find_by_id(created.order_id).await.unwrap().is_none());
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }

    #[tokio::test]
    async fn failed_restore_leaves_line_for_a_later_cancel() {
        let a = slot("Math", 100, 5);
        let catalog = GatedCatalog {
            inner: InMemoryCatalogStore::with_slots([a.clone()]),
            ..GatedCatalog::default()
        };
        let svc = OrderLifecycle::new(catalog, InMemoryOrderStore::new());
        let created = svc.create_order(&request(&[(a.id, 3)])).await.unwrap();
        svc.catalog().armed.store(true, Ordering::SeqCst);
        svc.catalog().open.notify_one();

        let err = svc.cancel_order(created.order_id).await.unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));
        assert_eq!(space_of(svc.catalog(), a.id).await, 2);

        let report = svc.cancel_order(created.order_id).await.unwrap();
        assert_eq!(report.restored[0].outcome, RestoreOutcome::Restored);
        assert_eq!(space_of(svc.catalog(), a.id).await, 5);
    }
}
