//! Order-request validation.
//!
//! Runs before any store access. Items are checked in request order: the
//! lesson id format first, then the quantity. Slot existence is not checked
//! here; that needs the catalog.

use lessonbook_catalog::Quantity;
use lessonbook_core::{DomainError, DomainResult, SlotId};

use crate::customer::Customer;

/// Quantity exactly as the caller supplied it, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantityInput {
    Whole(i64),
    Fractional(f64),
    /// Present but not a number (string, bool, object...). Holds a rendering for messages.
    NotANumber(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestedItem {
    pub slot_id: Option<String>,
    pub quantity: Option<QuantityInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub name: String,
    pub phone: String,
    pub items: Vec<RequestedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedItem {
    pub slot_id: SlotId,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub customer: Customer,
    pub items: Vec<ValidatedItem>,
}

impl OrderRequest {
    pub fn validate(&self) -> DomainResult<ValidatedOrder> {
        let customer = Customer::parse(&self.name, &self.phone)?;

        if self.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }

        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| item.validate(idx + 1))
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(ValidatedOrder { customer, items })
    }
}

impl RequestedItem {
    fn validate(&self, position: usize) -> DomainResult<ValidatedItem> {
        let raw_id = self
            .slot_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DomainError::validation(format!("item {position} is missing a lesson id")))?;

        let slot_id: SlotId = raw_id
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid lesson id: {raw_id}")))?;

        let quantity = match &self.quantity {
            None => {
                return Err(DomainError::validation(format!(
                    "missing quantity for lesson {slot_id}"
                )));
            }
            Some(QuantityInput::Whole(n)) => Quantity::new(*n).map_err(|e| {
                DomainError::validation(format!("invalid quantity for lesson {slot_id}: {}", e.message()))
            })?,
            Some(QuantityInput::Fractional(f)) => {
                return Err(DomainError::validation(format!(
                    "invalid quantity for lesson {slot_id}: {f} is not a whole number"
                )));
            }
            Some(QuantityInput::NotANumber(raw)) => {
                return Err(DomainError::validation(format!(
                    "invalid quantity for lesson {slot_id}: {raw} is not a number"
                )));
            }
        };

        Ok(ValidatedItem { slot_id, quantity })
    }
}
