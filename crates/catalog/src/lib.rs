//! Catalog domain module.
//!
//! This crate contains the business rules for bookable slots ("lessons"),
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Stores apply these rules under their own atomicity guarantees.

pub mod quantity;
pub mod query;
pub mod slot;

pub use quantity::Quantity;
pub use query::{SlotPatch, SlotQuery, SortDirection, SortKey};
pub use slot::Slot;
