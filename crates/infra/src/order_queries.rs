//! Read-side order lookups: listing, name search and per-line summaries.

use serde::Serialize;
use tracing::instrument;

use lessonbook_orders::Order;

use crate::error::{BookingError, BookingResult};
use crate::store::{CatalogStore, OrderFilter, OrderStore};

/// Shortest accepted customer-name prefix for search and summary.
pub const MIN_PREFIX_LEN: usize = 2;

/// Maximum orders returned by a name search.
pub const SEARCH_LIMIT: usize = 50;

/// One booked line, resolved to the lesson's current topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub customer: String,
    pub lesson: String,
    pub spaces_booked: u32,
}

pub struct OrderQueries<C, O> {
    catalog: C,
    orders: O,
}

impl<C, O> OrderQueries<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    pub fn new(catalog: C, orders: O) -> Self {
        Self { catalog, orders }
    }

    /// Every order, newest first.
    pub async fn list(&self) -> BookingResult<Vec<Order>> {
        Ok(self.orders.list(&OrderFilter::default()).await?)
    }

    /// Orders whose customer name starts with `name` (case-insensitive), newest first.
    ///
    /// An empty result is returned as-is; the HTTP layer decides how to render it.
    #[instrument(skip(self))]
    pub async fn search(&self, name: &str) -> BookingResult<Vec<Order>> {
        let prefix = checked_prefix(name)?;
        let filter = OrderFilter {
            name_prefix: Some(prefix),
            limit: Some(SEARCH_LIMIT),
        };
        Ok(self.orders.list(&filter).await?)
    }

    /// One row per order line for matching customers. Lines whose lesson is gone are skipped.
    #[instrument(skip(self))]
    pub async fn summary(&self, name: &str) -> BookingResult<Vec<SummaryRow>> {
        let filter = OrderFilter {
            name_prefix: Some(checked_prefix(name)?),
            limit: None,
        };
        let orders = self.orders.list(&filter).await?;

        let mut rows = Vec::new();
        for order in &orders {
            for line in order.lines() {
                let Some(slot) = self.catalog.find_by_id(line.slot_id).await? else {
                    continue;
                };
                rows.push(SummaryRow {
                    customer: order.customer().name.to_string(),
                    lesson: slot.topic,
                    spaces_booked: line.quantity.get(),
                });
            }
        }
        Ok(rows)
    }
}

fn checked_prefix(name: &str) -> BookingResult<String> {
    let prefix = name.trim();
    if prefix.chars().count() < MIN_PREFIX_LEN {
        return Err(BookingError::Validation(format!(
            "name must be at least {MIN_PREFIX_LEN} characters"
        )));
    }
    Ok(prefix.to_string())
}
