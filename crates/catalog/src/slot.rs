use serde::{Deserialize, Serialize};

use lessonbook_core::{DomainError, DomainResult, Entity, SlotId};

use crate::quantity::Quantity;

/// A bookable catalog entry with a finite remaining capacity.
///
/// `space` is only ever changed through [`Slot::try_claim`] and
/// [`Slot::restore`]; stores call them while holding whatever guarantee makes
/// the check-and-update atomic for them (a write lock, a single `UPDATE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub topic: String,
    pub location: String,
    /// Price per place, in currency-agnostic minor units.
    pub price: u64,
    /// Remaining capacity.
    pub space: i64,
    pub image: String,
}

impl Slot {
    pub fn new(
        id: SlotId,
        topic: impl Into<String>,
        location: impl Into<String>,
        price: u64,
        space: i64,
        image: impl Into<String>,
    ) -> DomainResult<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(DomainError::validation("topic cannot be empty"));
        }
        if space < 0 {
            return Err(DomainError::validation("space cannot be negative"));
        }
        Ok(Self {
            id,
            topic,
            location: location.into(),
            price,
            space,
            image: image.into(),
        })
    }

    pub fn has_space_for(&self, quantity: Quantity) -> bool {
        self.space >= quantity.as_i64()
    }

    /// Conditioned decrement: succeeds only if enough space remains.
    ///
    /// Returns `false` and leaves the slot untouched otherwise.
    pub fn try_claim(&mut self, quantity: Quantity) -> bool {
        if !self.has_space_for(quantity) {
            return false;
        }
        self.space -= quantity.as_i64();
        true
    }

    /// Unconditional increment, used to reverse a prior claim.
    pub fn restore(&mut self, quantity: Quantity) {
        self.space = self.space.saturating_add(quantity.as_i64());
    }
}

impl Entity for Slot {
    type Id = SlotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
