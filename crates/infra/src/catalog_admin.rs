//! Catalog browsing and administrative edits.
//!
//! Space adjustments reuse the claim/restore primitives so there is still
//! exactly one path that changes capacity.

use tracing::{info, instrument};

use lessonbook_catalog::{Quantity, Slot, SlotPatch, SlotQuery};
use lessonbook_core::SlotId;

use crate::error::{BookingError, BookingResult};
use crate::store::CatalogStore;

pub struct CatalogAdmin<C> {
    catalog: C,
}

impl<C: CatalogStore> CatalogAdmin<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub async fn list(&self, query: &SlotQuery) -> BookingResult<Vec<Slot>> {
        Ok(self.catalog.list(query).await?)
    }

    #[instrument(skip(self, patch), fields(slot_id = %id))]
    pub async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> BookingResult<Slot> {
        patch.validate()?;
        self.catalog
            .update_details(id, patch)
            .await?
            .ok_or(BookingError::SlotNotFound(id))
    }

    /// Add (positive) or remove (negative) space. Removal never drives space below zero.
    #[instrument(skip(self), fields(slot_id = %id))]
    pub async fn adjust_space(&self, id: SlotId, delta: i64) -> BookingResult<Slot> {
        if delta == 0 {
            return Err(BookingError::Validation("delta must be a non-zero integer".into()));
        }
        let quantity = Quantity::new(delta.saturating_abs())
            .map_err(|e| BookingError::Validation(format!("invalid delta: {}", e.message())))?;

        let updated = if delta > 0 {
            self.catalog
                .increment(id, quantity)
                .await?
                .ok_or(BookingError::SlotNotFound(id))?
        } else {
            match self.catalog.conditional_decrement(id, quantity).await? {
                Some(slot) => slot,
                None if self.catalog.find_by_id(id).await?.is_none() => {
                    return Err(BookingError::SlotNotFound(id));
                }
                None => return Err(BookingError::CapacityExhausted { slot_id: id }),
            }
        };

        info!(delta, space = updated.space, "lesson space adjusted");
        Ok(updated)
    }
}
