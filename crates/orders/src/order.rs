use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lessonbook_catalog::Quantity;
use lessonbook_core::{DomainError, DomainResult, Entity, OrderId, SlotId};

use crate::customer::Customer;

/// One claimed line of an order.
///
/// `quantity` is the quantity actually claimed and `unit_price` the slot price
/// in effect at claim time; neither changes after the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub slot_id: SlotId,
    pub quantity: Quantity,
    pub unit_price: u64,
}

impl OrderLine {
    pub fn new(line_no: u32, slot_id: SlotId, quantity: Quantity, unit_price: u64) -> Self {
        Self {
            line_no,
            slot_id,
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> Option<u64> {
        self.unit_price.checked_mul(u64::from(self.quantity.get()))
    }
}

/// A placed order. Only ever created from a fully successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer: Customer,
    lines: Vec<OrderLine>,
    total: u64,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order from claimed lines, freezing the total.
    pub fn place(
        id: OrderId,
        customer: Customer,
        lines: Vec<OrderLine>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        let total = total_of(&lines).ok_or_else(|| {
            DomainError::validation("order total exceeds the supported range")
        })?;
        Ok(Self {
            id,
            customer,
            lines,
            total,
            created_at,
        })
    }

    /// Rehydrate a persisted order without recomputing its frozen total.
    pub fn restore(
        id: OrderId,
        customer: Customer,
        lines: Vec<OrderLine>,
        total: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer,
            lines,
            total,
            created_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Case-insensitive customer-name prefix match.
    pub fn customer_name_starts_with(&self, prefix: &str) -> bool {
        self.customer
            .name
            .as_str()
            .to_lowercase()
            .starts_with(&prefix.to_lowercase())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn total_of(lines: &[OrderLine]) -> Option<u64> {
    lines
        .iter()
        .try_fold(0u64, |acc, line| acc.checked_add(line.subtotal()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_customer() -> Customer {
        Customer::parse("Ada Lovelace", "+44 7946 0958").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn line(no: u32, qty: i64, price: u64) -> OrderLine {
        OrderLine::new(no, SlotId::new(), Quantity::new(qty).unwrap(), price)
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let order = Order::place(
            OrderId::new(),
            test_customer(),
            vec![line(1, 3, 100), line(2, 2, 80)],
            test_time(),
        )
        .unwrap();
        assert_eq!(order.total(), 460);
    }

    #[test]
    fn empty_orders_are_rejected() {
        let err = Order::place(OrderId::new(), test_customer(), vec![], test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn overflowing_total_is_a_validation_error() {
        let id = OrderId::new();
        let err = Order::place(id, test_customer(), vec![line(1, 2, u64::MAX)], test_time())
            .unwrap_err();
        assert!(matches!(&err, DomainError::Validation(msg) if msg.contains("total")));
        assert!(!err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn restore_keeps_frozen_total() {
        let order = Order::restore(
            OrderId::new(),
            test_customer(),
            vec![line(1, 1, 100)],
            90,
            test_time(),
        );
        assert_eq!(order.total(), 90);
    }

    #[test]
    fn name_prefix_match_ignores_case() {
        let order = Order::place(OrderId::new(), test_customer(), vec![line(1, 1, 1)], test_time())
            .unwrap();
        assert!(order.customer_name_starts_with("ada l"));
        assert!(!order.customer_name_starts_with("lovelace"));
    }

    proptest! {
        #[test]
        fn total_matches_line_subtotals(
            items in prop::collection::vec((1i64..100, 0u64..10_000), 1..10)
        ) {
            let lines: Vec<OrderLine> = items
                .iter()
                .enumerate()
                .map(|(i, (q, p))| line(i as u32 + 1, *q, *p))
                .collect();
            let expected: u64 = items.iter().map(|(q, p)| *q as u64 * *p).sum();
            let order = Order::place(OrderId::new(), test_customer(), lines, test_time()).unwrap();
            prop_assert_eq!(order.total(), expected);
        }
    }
}
