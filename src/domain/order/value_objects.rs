use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Order identifier, assigned once on creation (UUID v7, time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

external_id!(
    /// Customer (client) reference, owned by the account service
    CustomerId
);
external_id!(
    /// Dish reference, owned by the catalog
    DishId
);
external_id!(
    /// Courier reference, owned by the courier registry
    CourierId
);

// ============================================================================
// Order Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Paid,
    GivenToCourier,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::GivenToCourier,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::GivenToCourier => "given_to_courier",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Line Items & Collaborator Snapshots
// ============================================================================

/// Dish entry frozen into an order at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub dish_id: DishId,
    pub dish_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl OrderLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// One line of a customer's cart as the cart store reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub dish_id: DishId,
    pub quantity: i32,
}

/// Current name and price of a dish as resolved from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishSnapshot {
    pub name: String,
    pub price: Decimal,
}

/// Longest delivery address the orders table accepts
pub const MAX_DELIVERY_ADDRESS_LEN: usize = 200;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let item = OrderLineItem {
            dish_id: DishId(1),
            dish_name: "Borscht".to_string(),
            unit_price: Decimal::new(1050, 2),
            quantity: 3,
        };

        assert_eq!(item.line_total(), Decimal::new(3150, 2));
    }

    #[test]
    fn test_status_storage_names_parse_back() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result = "Created".parse::<OrderStatus>();
        assert_eq!(result, Err(UnknownStatus("Created".to_string())));
    }

    #[test]
    fn test_external_ids_serialize_transparently() {
        let json = serde_json::to_string(&CourierId(999)).unwrap();
        assert_eq!(json, "999");
    }
}
