//! Service-level error taxonomy for booking operations.

use thiserror::Error;

use lessonbook_core::{DomainError, OrderId, SlotId};

use crate::reservation::ReservationError;
use crate::store::StoreError;

/// Errors returned by the order lifecycle, order queries and catalog administration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed input, rejected before any store mutation.
    #[error("{0}")]
    Validation(String),

    #[error("lesson {0} not found")]
    SlotNotFound(SlotId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// A conditioned decrement found too little space.
    #[error("not enough space for lesson {slot_id}")]
    CapacityExhausted { slot_id: SlotId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl From<DomainError> for BookingError {
    fn from(err: DomainError) -> Self {
        BookingError::Validation(err.message().to_string())
    }
}

impl From<ReservationError> for BookingError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Unavailable { slot_id } => BookingError::CapacityExhausted { slot_id },
            ReservationError::Store { source, .. } => BookingError::Store(source),
        }
    }
}
