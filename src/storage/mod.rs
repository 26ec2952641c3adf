// ============================================================================
// Storage Layer - Order Repository and Collaborator Contracts
// ============================================================================
//
// The lifecycle engine only talks to these traits:
// - CartStore        - per-customer pre-order lines (external)
// - Catalog          - current dish name and price (external)
// - CourierRegistry  - courier existence check (external)
// - OrderRepository  - durable order aggregates (owned by this crate)
//
// Implementations:
// - memory/   - single-lock in-process store, used by tests and the demo
// - postgres/ - sqlx-backed store, one transaction per multi-step write
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::order::{
    CartLine, CourierId, CustomerId, DishId, DishSnapshot, Order, OrderId, OrderStatus,
};
use crate::utils::IsTransient;

pub use memory::{FaultPoint, InMemoryStore};
pub use postgres::PgStore;

/// Persistence failure surfaced by any store implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data cannot be mapped back into the domain model
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl IsTransient for StorageError {
    fn is_transient(&self) -> bool {
        !matches!(self, StorageError::Corrupt(_))
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, StorageError>;

    async fn clear_cart(&self, customer_id: CustomerId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn dish(&self, dish_id: DishId) -> Result<Option<DishSnapshot>, StorageError>;
}

#[async_trait]
pub trait CourierRegistry: Send + Sync {
    async fn courier_exists(&self, courier_id: CourierId) -> Result<bool, StorageError>;
}

/// Result of persisting a freshly converted order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// Order written and the consumed cart lines removed in one commit
    Placed,
    /// The cart was already empty when the write ran; nothing was written
    CartAlreadyEmpty,
    /// The cart no longer holds the lines the order was built from; nothing
    /// was written
    CartChanged,
}

/// Whether `current` holds exactly the `consumed` lines, in any order
pub(crate) fn cart_matches(consumed: &[CartLine], current: &[CartLine]) -> bool {
    let normalize = |lines: &[CartLine]| {
        let mut pairs: Vec<(DishId, i32)> =
            lines.iter().map(|line| (line.dish_id, line.quantity)).collect();
        pairs.sort_unstable();
        pairs
    };
    normalize(consumed) == normalize(current)
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert `order` and delete the `consumed` cart lines of
    /// `order.customer_id` as a single atomic unit. Writes nothing unless the
    /// cart still holds exactly `consumed`. On any error neither write is
    /// visible.
    async fn place_order(
        &self,
        order: &Order,
        consumed: &[CartLine],
    ) -> Result<PlaceOutcome, StorageError>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StorageError>;

    /// Orders of one customer, newest first
    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StorageError>;

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StorageError>;

    /// Write `new_status` (and `courier_id`, when given) only if the stored
    /// status is still `expected`. Returns whether the swap happened.
    async fn compare_and_swap_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        courier_id: Option<CourierId>,
    ) -> Result<bool, StorageError>;
}
