//! Infrastructure layer: stores, the reservation engine, order services, config.

pub mod catalog_admin;
pub mod config;
pub mod error;
pub mod order_lifecycle;
pub mod order_queries;
pub mod reservation;
pub mod seed;
pub mod store;

pub use catalog_admin::CatalogAdmin;
pub use config::{AppConfig, DatabaseConfig};
pub use error::{BookingError, BookingResult};
pub use order_lifecycle::{CancellationReport, CreatedOrder, OrderLifecycle, RestoreOutcome, RestoredLine, SlotSpace};
pub use order_queries::{OrderQueries, SummaryRow};
pub use reservation::{ClaimRequest, ClaimedSlot, Reservation, ReservationEngine, ReservationError};
