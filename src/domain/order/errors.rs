use super::commands::OrderCommand;
use super::value_objects::{CourierId, CustomerId, DishId, OrderId, OrderStatus};
use crate::storage::StorageError;
use crate::utils::IsTransient;

// ============================================================================
// Order Lifecycle Errors
// ============================================================================
//
// Every variant is an expected outcome at the engine boundary. None of them
// leaves partial state behind.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Cart of customer {0} is empty")]
    EmptyCart(CustomerId),

    #[error("Cannot {command} order {order_id} in status {from}")]
    IllegalTransition {
        order_id: OrderId,
        from: OrderStatus,
        command: OrderCommand,
    },

    /// The cart was edited between being read and being converted
    #[error("Cart of customer {0} changed during checkout")]
    CartChanged(CustomerId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Dish not found: {0}")]
    DishNotFound(DishId),

    #[error("Courier not found: {0}")]
    CourierNotFound(CourierId),

    #[error("Invalid delivery address: {0}")]
    InvalidDeliveryAddress(String),

    #[error("Invalid quantity {quantity} for dish {dish_id}")]
    InvalidQuantity { dish_id: DishId, quantity: i32 },

    #[error("Storage fault: {0}")]
    Storage(#[from] StorageError),
}

impl OrderError {
    /// Label used for failure metrics
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::EmptyCart(_) => "empty_cart",
            OrderError::CartChanged(_) => "cart_changed",
            OrderError::IllegalTransition { .. } => "illegal",
            OrderError::OrderNotFound(_)
            | OrderError::DishNotFound(_)
            | OrderError::CourierNotFound(_) => "not_found",
            OrderError::InvalidDeliveryAddress(_) | OrderError::InvalidQuantity { .. } => {
                "invalid_input"
            }
            OrderError::Storage(_) => "storage_fault",
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::Storage(e) if e.is_transient())
    }
}
