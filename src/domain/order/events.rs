use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{CourierId, CustomerId, OrderId, OrderStatus};

// ============================================================================
// Order Events - Facts produced by accepted commands
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    Paid,
    Cancelled { from: OrderStatus },
    CourierAssigned { courier_id: CourierId },
    Delivered { from: OrderStatus },
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::Paid => "OrderPaid",
            OrderEvent::Cancelled { .. } => "OrderCancelled",
            OrderEvent::CourierAssigned { .. } => "OrderGivenToCourier",
            OrderEvent::Delivered { .. } => "OrderDelivered",
        }
    }

    /// Status the order holds once this event is applied
    pub fn resulting_status(&self) -> OrderStatus {
        match self {
            OrderEvent::Created(_) => OrderStatus::Created,
            OrderEvent::Paid => OrderStatus::Paid,
            OrderEvent::Cancelled { .. } => OrderStatus::Cancelled,
            OrderEvent::CourierAssigned { .. } => OrderStatus::GivenToCourier,
            OrderEvent::Delivered { .. } => OrderStatus::Delivered,
        }
    }

    /// Courier written alongside the status, if any
    pub fn assigned_courier(&self) -> Option<CourierId> {
        match self {
            OrderEvent::CourierAssigned { courier_id } => Some(*courier_id),
            _ => None,
        }
    }
}

/// Order Created - initial event in the order lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total_price: Decimal,
    pub line_count: usize,
    pub created_at: DateTime<Utc>,
}
