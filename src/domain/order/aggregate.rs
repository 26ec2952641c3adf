use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::{OrderCreated, OrderEvent};
use super::state_machine::TransitionPolicy;
use super::value_objects::{
    CartLine, CourierId, CustomerId, DishSnapshot, OrderId, OrderLineItem, OrderStatus,
    MAX_DELIVERY_ADDRESS_LEN,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub order_id: OrderId,
    pub customer_id: CustomerId,

    // Lifecycle
    pub status: OrderStatus,
    pub courier_id: Option<CourierId>,

    // Frozen at creation
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub delivery_address: String,
    pub line_items: Vec<OrderLineItem>,
}

impl Order {
    /// Build a new `Created` order from resolved cart lines.
    ///
    /// Names and prices are copied out of the catalog snapshots so later
    /// catalog changes never reach this order. Repeated dish ids are merged
    /// into the first line carrying them.
    pub fn from_cart(
        order_id: OrderId,
        customer_id: CustomerId,
        delivery_address: &str,
        lines: Vec<(CartLine, DishSnapshot)>,
        created_at: DateTime<Utc>,
    ) -> Result<(Self, OrderEvent), OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyCart(customer_id));
        }
        let delivery_address = validate_address(delivery_address)?;

        let mut line_items: Vec<OrderLineItem> = Vec::with_capacity(lines.len());
        for (line, dish) in lines {
            if line.quantity < 1 {
                return Err(OrderError::InvalidQuantity {
                    dish_id: line.dish_id,
                    quantity: line.quantity,
                });
            }

            match line_items.iter_mut().find(|item| item.dish_id == line.dish_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                        OrderError::InvalidQuantity {
                            dish_id: line.dish_id,
                            quantity: line.quantity,
                        },
                    )?;
                }
                None => line_items.push(OrderLineItem {
                    dish_id: line.dish_id,
                    dish_name: dish.name,
                    unit_price: dish.price,
                    quantity: line.quantity,
                }),
            }
        }

        let total_price = line_items.iter().map(OrderLineItem::line_total).sum();

        let order = Self {
            order_id,
            customer_id,
            status: OrderStatus::Created,
            courier_id: None,
            total_price,
            created_at,
            delivery_address,
            line_items,
        };

        let event = OrderEvent::Created(OrderCreated {
            order_id,
            customer_id,
            total_price,
            line_count: order.line_items.len(),
            created_at,
        });

        Ok((order, event))
    }

    /// Validate `command` against the current status and emit the event it
    /// would produce. Never mutates the order.
    pub fn handle_command(
        &self,
        command: &OrderCommand,
        policy: &TransitionPolicy,
    ) -> Result<OrderEvent, OrderError> {
        if policy.next_status(self.status, command).is_none() {
            return Err(OrderError::IllegalTransition {
                order_id: self.order_id,
                from: self.status,
                command: *command,
            });
        }

        Ok(match command {
            OrderCommand::Pay => OrderEvent::Paid,
            OrderCommand::Cancel => OrderEvent::Cancelled { from: self.status },
            OrderCommand::AssignCourier { courier_id } => OrderEvent::CourierAssigned {
                courier_id: *courier_id,
            },
            OrderCommand::Deliver => OrderEvent::Delivered { from: self.status },
        })
    }

    /// Apply an accepted event to this snapshot
    pub fn apply_event(&mut self, event: &OrderEvent) {
        self.status = event.resulting_status();
        if let Some(courier_id) = event.assigned_courier() {
            self.courier_id = Some(courier_id);
        }
    }
}

fn validate_address(raw: &str) -> Result<String, OrderError> {
    let address = raw.trim();
    if address.is_empty() {
        return Err(OrderError::InvalidDeliveryAddress(
            "address must not be blank".to_string(),
        ));
    }
    if address.chars().count() > MAX_DELIVERY_ADDRESS_LEN {
        return Err(OrderError::InvalidDeliveryAddress(format!(
            "address exceeds {} characters",
            MAX_DELIVERY_ADDRESS_LEN
        )));
    }
    Ok(address.to_string())
}

// ============================================================================
// Unit Tests
// ============================================================================
