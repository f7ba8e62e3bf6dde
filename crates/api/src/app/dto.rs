use serde::{Deserialize, Serialize};
use serde_json::Value;

use lessonbook_catalog::{Slot, SlotPatch};
use lessonbook_infra::{CancellationReport, CreatedOrder};
use lessonbook_orders::{Order, OrderRequest, QuantityInput, RequestedItem};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CustomerBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// `POST /api/orders`. The customer may be nested or given as top-level `name`/`phone`.
#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    #[serde(default)]
    pub customer: Option<CustomerBody>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemBody>,
}

/// Kept as raw JSON so validation can say exactly what was wrong with each field.
#[derive(Debug, Deserialize)]
pub struct OrderItemBody {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub qty: Value,
}

impl CreateOrderBody {
    pub fn into_request(self) -> OrderRequest {
        let customer = self.customer.unwrap_or_default();
        OrderRequest {
            name: customer.name.or(self.name).unwrap_or_default(),
            phone: customer.phone.or(self.phone).unwrap_or_default(),
            items: self
                .items
                .into_iter()
                .map(|item| RequestedItem {
                    slot_id: id_text(&item.id),
                    quantity: quantity_input(&item.qty),
                })
                .collect(),
        }
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn quantity_input(value: &Value) -> Option<QuantityInput> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
            (Some(whole), _) => QuantityInput::Whole(whole),
            // `2.0` is still a whole number; the cast saturates out-of-range values.
            (None, Some(f)) if f.fract() == 0.0 => QuantityInput::Whole(f as i64),
            (None, Some(f)) => QuantityInput::Fractional(f),
            (None, None) => QuantityInput::NotANumber(n.to_string()),
        }),
        other => Some(QuantityInput::NotANumber(other.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LessonListParams {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

/// `PUT /api/lessons/:id`. Capacity is not editable here.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLessonBody {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub image: Option<String>,
}

impl UpdateLessonBody {
    pub fn into_patch(self) -> Result<SlotPatch, String> {
        let price = match self.price {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| "price must be a non-negative number".to_string())?,
            ),
        };
        Ok(SlotPatch {
            topic: self.subject,
            location: self.location,
            price,
            image: self.image,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustSpacesBody {
    #[serde(default)]
    pub delta: Value,
}

impl AdjustSpacesBody {
    pub fn delta(&self) -> Result<i64, String> {
        self.delta
            .as_i64()
            .ok_or_else(|| "delta (integer) is required".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    pub name: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub id: String,
    pub subject: String,
    pub location: String,
    pub price: u64,
    pub spaces: i64,
    pub image: String,
}

impl From<&Slot> for LessonResponse {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id.to_string(),
            subject: slot.topic.clone(),
            location: slot.location.clone(),
            price: slot.price,
            spaces: slot.space,
            image: slot.image.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub lesson_id: String,
    pub qty: u32,
    pub unit_price: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub items: Vec<OrderItemResponse>,
    pub total: u64,
    pub created_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed().to_string(),
            name: order.customer().name.to_string(),
            phone: order.customer().phone.to_string(),
            items: order
                .lines()
                .iter()
                .map(|line| OrderItemResponse {
                    lesson_id: line.slot_id.to_string(),
                    qty: line.quantity.get(),
                    unit_price: line.unit_price,
                })
                .collect(),
            total: order.total(),
            created_at: order.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpaceUpdate {
    pub id: String,
    pub space: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub total: u64,
    pub updated: Vec<SpaceUpdate>,
}

impl From<CreatedOrder> for CreateOrderResponse {
    fn from(created: CreatedOrder) -> Self {
        Self {
            order_id: created.order_id.to_string(),
            total: created.total,
            updated: created
                .updated
                .into_iter()
                .map(|s| SpaceUpdate {
                    id: s.slot_id.to_string(),
                    space: s.space,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredSpace {
    pub lesson_id: String,
    pub space_delta: u32,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
    pub message: &'static str,
    pub order_id: String,
    pub restored_spaces: Vec<RestoredSpace>,
    pub deleted_count: u64,
}

impl From<CancellationReport> for CancelOrderResponse {
    fn from(report: CancellationReport) -> Self {
        Self {
            message: "Order deleted and lesson spaces restored",
            order_id: report.order_id.to_string(),
            restored_spaces: report
                .restored
                .iter()
                .map(|line| RestoredSpace {
                    lesson_id: line.slot_id.to_string(),
                    space_delta: line.quantity.get(),
                    outcome: line.outcome.as_str(),
                })
                .collect(),
            deleted_count: report.deleted_count,
        }
    }
}
