//! Orders domain module.
//!
//! Customer validation, order-request validation and the order record itself.
//! Everything here is deterministic domain logic; reservation and persistence
//! live in `lessonbook-infra`.

pub mod customer;
pub mod order;
pub mod request;

pub use customer::{Customer, CustomerName, PhoneNumber};
pub use order::{Order, OrderLine};
pub use request::{OrderRequest, QuantityInput, RequestedItem, ValidatedItem, ValidatedOrder};
