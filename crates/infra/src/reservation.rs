//! Multi-slot capacity reservation.
//!
//! A claim walks the requested items in order and issues one conditioned
//! decrement per item. There is no cross-slot transaction: if any item fails,
//! every item already claimed by the same call is restored before the error
//! is returned, so callers only ever observe "all claimed" or "no net effect".

use thiserror::Error;
use tracing::{error, instrument, warn};

use lessonbook_catalog::{Quantity, Slot};
use lessonbook_core::SlotId;

use crate::store::{CatalogStore, StoreError};

/// One `(slot, quantity)` pair to claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    pub slot_id: SlotId,
    pub quantity: Quantity,
}

/// A successfully claimed item, with the price in effect at the moment of the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedSlot {
    pub slot_id: SlotId,
    pub quantity: Quantity,
    pub unit_price: u64,
    /// Space left on the slot right after this claim.
    pub remaining: i64,
}

/// The result of a fully successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    claims: Vec<ClaimedSlot>,
}

impl Reservation {
    pub fn claims(&self) -> &[ClaimedSlot] {
        &self.claims
    }

    /// Σ(unit_price × quantity), or `None` on overflow.
    pub fn total(&self) -> Option<u64> {
        self.claims.iter().try_fold(0u64, |acc, c| {
            acc.checked_add(c.unit_price.checked_mul(u64::from(c.quantity.get()))?)
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReservationError {
    /// The conditioned decrement matched nothing: the slot is missing or has too little space.
    #[error("not enough space for lesson {slot_id}")]
    Unavailable { slot_id: SlotId },

    #[error("store failure while claiming lesson {slot_id}: {source}")]
    Store {
        slot_id: SlotId,
        #[source]
        source: StoreError,
    },
}

impl ReservationError {
    pub fn slot_id(&self) -> SlotId {
        match self {
            ReservationError::Unavailable { slot_id } | ReservationError::Store { slot_id, .. } => {
                *slot_id
            }
        }
    }
}

pub struct ReservationEngine<C> {
    catalog: C,
}

impl<C: CatalogStore> ReservationEngine<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Claim every request or none of them.
    #[instrument(skip(self, requests), fields(items = requests.len()))]
    pub async fn claim(&self, requests: &[ClaimRequest]) -> Result<Reservation, ReservationError> {
        let mut claims = Vec::with_capacity(requests.len());

        for request in requests {
            let outcome = self
                .catalog
                .conditional_decrement(request.slot_id, request.quantity)
                .await;

            let failure = match outcome {
                Ok(Some(slot)) => {
                    claims.push(claimed(request.quantity, &slot));
                    continue;
                }
                Ok(None) => ReservationError::Unavailable {
                    slot_id: request.slot_id,
                },
                Err(source) => ReservationError::Store {
                    slot_id: request.slot_id,
                    source,
                },
            };

            if !claims.is_empty() {
                warn!(
                    failed_slot = %request.slot_id,
                    rolled_back = claims.len(),
                    "claim failed, rolling back earlier items"
                );
                self.compensate(&claims).await;
            }
            return Err(failure);
        }

        Ok(Reservation { claims })
    }

    /// Atomically add `quantity` back to a slot. `Ok(None)` if the slot no longer exists.
    pub async fn restore(&self, slot_id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError> {
        self.catalog.increment(slot_id, quantity).await
    }

    /// Undo a whole reservation. Returns the number of items that could not be restored.
    pub async fn release(&self, reservation: &Reservation) -> usize {
        self.compensate(&reservation.claims).await
    }

    async fn compensate(&self, claims: &[ClaimedSlot]) -> usize {
        let mut failed = 0;
        for claim in claims.iter().rev() {
            match self.restore(claim.slot_id, claim.quantity).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(slot_id = %claim.slot_id, quantity = %claim.quantity, "lesson vanished before rollback");
                }
                Err(err) => {
                    failed += 1;
                    error!(
                        slot_id = %claim.slot_id,
                        quantity = %claim.quantity,
                        error = %err,
                        "rollback restore failed; capacity is under-reported"
                    );
                }
            }
        }
        failed
    }
}

fn claimed(quantity: Quantity, slot: &Slot) -> ClaimedSlot {
    ClaimedSlot {
        slot_id: slot.id,
        quantity,
        unit_price: slot.price,
        remaining: slot.space,
    }
}
