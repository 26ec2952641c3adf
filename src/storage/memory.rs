use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    cart_matches, CartStore, Catalog, CourierRegistry, OrderRepository, PlaceOutcome, StorageError,
};
use crate::domain::order::{
    CartLine, CourierId, CustomerId, DishId, DishSnapshot, Order, OrderId, OrderStatus,
};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Orders, carts, dishes and couriers behind ONE lock. Every trait method holds
// the lock for its whole body, so multi-step writes are atomic and the status
// compare-and-swap cannot interleave with another writer.
//
// Faults can be armed to exercise rollback paths; each armed fault fires once.
//
// ============================================================================

/// Place where an armed fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// After the order row is staged, before the cart is cleared
    AfterOrderInsert,
    /// On the next status compare-and-swap
    StatusUpdate,
    /// On the next order read (get / list)
    Read,
}

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    carts: HashMap<CustomerId, Vec<CartLine>>,
    dishes: HashMap<DishId, DishSnapshot>,
    couriers: HashSet<CourierId>,
    armed_faults: Vec<FaultPoint>,
}

impl State {
    fn take_fault(&mut self, point: FaultPoint) -> bool {
        match self.armed_faults.iter().position(|armed| *armed == point) {
            Some(index) => {
                self.armed_faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn check_read(&mut self) -> Result<(), StorageError> {
        if self.take_fault(FaultPoint::Read) {
            return Err(StorageError::Unavailable("injected read fault".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- catalog / courier seeding ---

    pub async fn upsert_dish(&self, dish_id: DishId, name: &str, price: Decimal) {
        let mut state = self.state.lock().await;
        state.dishes.insert(
            dish_id,
            DishSnapshot {
                name: name.to_string(),
                price,
            },
        );
    }

    pub async fn add_courier(&self, courier_id: CourierId) {
        self.state.lock().await.couriers.insert(courier_id);
    }

    // --- cart maintenance ---

    /// Put `dish_id` into the cart with `quantity`, replacing any quantity
    /// already there. A quantity below 1 removes the line.
    pub async fn add_to_cart(&self, customer_id: CustomerId, dish_id: DishId, quantity: i32) {
        let mut state = self.state.lock().await;
        let cart = state.carts.entry(customer_id).or_default();
        match cart.iter_mut().find(|line| line.dish_id == dish_id) {
            Some(line) => line.quantity = quantity,
            None => cart.push(CartLine { dish_id, quantity }),
        }
        cart.retain(|line| line.quantity > 0);
    }

    /// Change the quantity of a line already in the cart; `<= 0` removes it.
    /// Missing lines are left alone.
    pub async fn update_quantity(&self, customer_id: CustomerId, dish_id: DishId, quantity: i32) {
        let mut state = self.state.lock().await;
        if let Some(cart) = state.carts.get_mut(&customer_id) {
            if let Some(line) = cart.iter_mut().find(|line| line.dish_id == dish_id) {
                line.quantity = quantity;
            }
            cart.retain(|line| line.quantity > 0);
        }
    }

    pub async fn remove_from_cart(&self, customer_id: CustomerId, dish_id: DishId) {
        let mut state = self.state.lock().await;
        if let Some(cart) = state.carts.get_mut(&customer_id) {
            cart.retain(|line| line.dish_id != dish_id);
        }
    }

    // --- fault injection ---

    pub async fn inject_fault(&self, point: FaultPoint) {
        self.state.lock().await.armed_faults.push(point);
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.carts.get(&customer_id).cloned().unwrap_or_default())
    }

    async fn clear_cart(&self, customer_id: CustomerId) -> Result<(), StorageError> {
        self.state.lock().await.carts.remove(&customer_id);
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn dish(&self, dish_id: DishId) -> Result<Option<DishSnapshot>, StorageError> {
        Ok(self.state.lock().await.dishes.get(&dish_id).cloned())
    }
}

#[async_trait]
impl CourierRegistry for InMemoryStore {
    async fn courier_exists(&self, courier_id: CourierId) -> Result<bool, StorageError> {
        Ok(self.state.lock().await.couriers.contains(&courier_id))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn place_order(
        &self,
        order: &Order,
        consumed: &[CartLine],
    ) -> Result<PlaceOutcome, StorageError> {
        let mut state = self.state.lock().await;

        if state.orders.contains_key(&order.order_id) {
            return Err(StorageError::Database(format!(
                "duplicate order id {}",
                order.order_id
            )));
        }

        let current = state.carts.get(&order.customer_id).cloned().unwrap_or_default();
        if current.is_empty() {
            return Ok(PlaceOutcome::CartAlreadyEmpty);
        }
        if !cart_matches(consumed, &current) {
            return Ok(PlaceOutcome::CartChanged);
        }

        state.orders.insert(order.order_id, order.clone());

        if state.take_fault(FaultPoint::AfterOrderInsert) {
            state.orders.remove(&order.order_id);
            return Err(StorageError::Unavailable(
                "injected fault after order insert".to_string(),
            ));
        }

        let emptied = match state.carts.get_mut(&order.customer_id) {
            Some(cart) => {
                cart.retain(|line| !consumed.iter().any(|used| used.dish_id == line.dish_id));
                cart.is_empty()
            }
            None => false,
        };
        if emptied {
            state.carts.remove(&order.customer_id);
        }

        Ok(PlaceOutcome::Placed)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
        let mut state = self.state.lock().await;
        state.check_read()?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StorageError> {
        let mut state = self.state.lock().await;
        state.check_read()?;

        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        Ok(orders)
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StorageError> {
        let mut state = self.state.lock().await;
        state.check_read()?;

        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.status == status)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(orders)
    }

    async fn compare_and_swap_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        courier_id: Option<CourierId>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;

        if state.take_fault(FaultPoint::StatusUpdate) {
            return Err(StorageError::Unavailable("injected status update fault".to_string()));
        }

        match state.orders.get_mut(&order_id) {
            Some(order) if order.status == expected => {
                order.status = new_status;
                if courier_id.is_some() {
                    order.courier_id = courier_id;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn soup_line() -> Vec<CartLine> {
        vec![CartLine { dish_id: DishId(1), quantity: 1 }]
    }

    fn order_for(customer_id: CustomerId, minutes_ago: i64) -> Order {
        let (order, _) = Order::from_cart(
            OrderId::generate(),
            customer_id,
            "addr",
            vec![(
                CartLine { dish_id: DishId(1), quantity: 1 },
                DishSnapshot { name: "Soup".to_string(), price: Decimal::new(300, 2) },
            )],
            Utc::now() - Duration::minutes(minutes_ago),
        )
        .unwrap();
        order
    }

    #[tokio::test]
    async fn test_add_existing_dish_replaces_quantity() {
        let store = InMemoryStore::new();
        let customer = CustomerId(1);

        store.add_to_cart(customer, DishId(1), 2).await;
        store.add_to_cart(customer, DishId(1), 1).await;

        let lines = store.cart_items(customer).await.unwrap();
        assert_eq!(lines, vec![CartLine { dish_id: DishId(1), quantity: 1 }]);
    }

    #[tokio::test]
    async fn test_update_quantity_to_zero_removes_line() {
        let store = InMemoryStore::new();
        let customer = CustomerId(1);

        store.add_to_cart(customer, DishId(1), 2).await;
        store.add_to_cart(customer, DishId(2), 1).await;
        store.update_quantity(customer, DishId(1), 0).await;
        store.update_quantity(customer, DishId(2), -3).await;

        assert!(store.cart_items(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear_cart() {
        let store = InMemoryStore::new();
        let customer = CustomerId(1);

        store.add_to_cart(customer, DishId(1), 2).await;
        store.add_to_cart(customer, DishId(2), 4).await;
        store.remove_from_cart(customer, DishId(1)).await;
        assert_eq!(store.cart_items(customer).await.unwrap().len(), 1);

        store.clear_cart(customer).await.unwrap();
        assert!(store.cart_items(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_clears_cart() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);
        store.add_to_cart(customer, DishId(1), 1).await;

        let order = order_for(customer, 0);
        let outcome = store.place_order(&order, &soup_line()).await.unwrap();

        assert_eq!(outcome, PlaceOutcome::Placed);
        assert!(store.cart_items(customer).await.unwrap().is_empty());
        assert_eq!(store.get(order.order_id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_place_order_with_empty_cart_writes_nothing() {
        let store = InMemoryStore::new();
        let order = order_for(CustomerId(5), 0);

        let outcome = store.place_order(&order, &soup_line()).await.unwrap();

        assert_eq!(outcome, PlaceOutcome::CartAlreadyEmpty);
        assert_eq!(store.get(order.order_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_place_order_rejects_cart_that_moved_on() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);
        store.add_to_cart(customer, DishId(1), 1).await;
        store.add_to_cart(customer, DishId(2), 4).await;

        let order = order_for(customer, 0);
        let outcome = store.place_order(&order, &soup_line()).await.unwrap();

        assert_eq!(outcome, PlaceOutcome::CartChanged);
        assert_eq!(store.get(order.order_id).await.unwrap(), None);
        assert_eq!(store.cart_items(customer).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_place_order_rejects_changed_quantity() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);
        store.add_to_cart(customer, DishId(1), 3).await;

        let order = order_for(customer, 0);
        let outcome = store.place_order(&order, &soup_line()).await.unwrap();

        assert_eq!(outcome, PlaceOutcome::CartChanged);
        assert_eq!(
            store.cart_items(customer).await.unwrap(),
            vec![CartLine { dish_id: DishId(1), quantity: 3 }]
        );
    }

    #[tokio::test]
    async fn test_fault_after_insert_rolls_back() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);
        store.add_to_cart(customer, DishId(1), 1).await;
        store.inject_fault(FaultPoint::AfterOrderInsert).await;

        let order = order_for(customer, 0);
        assert!(store.place_order(&order, &soup_line()).await.is_err());

        assert_eq!(store.get(order.order_id).await.unwrap(), None);
        assert_eq!(store.cart_items(customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap_requires_expected_status() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);
        store.add_to_cart(customer, DishId(1), 1).await;
        let order = order_for(customer, 0);
        store.place_order(&order, &soup_line()).await.unwrap();

        let stale = store
            .compare_and_swap_status(order.order_id, OrderStatus::Paid, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert!(!stale);

        let swapped = store
            .compare_and_swap_status(order.order_id, OrderStatus::Created, OrderStatus::Paid, None)
            .await
            .unwrap();
        assert!(swapped);
        assert_eq!(store.get(order.order_id).await.unwrap().unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_compare_and_swap_on_missing_order() {
        let store = InMemoryStore::new();
        let swapped = store
            .compare_and_swap_status(OrderId::generate(), OrderStatus::Created, OrderStatus::Paid, None)
            .await
            .unwrap();
        assert!(!swapped);
    }

    #[tokio::test]
    async fn test_customer_orders_newest_first() {
        let store = InMemoryStore::new();
        let customer = CustomerId(5);

        let mut placed = Vec::new();
        for minutes_ago in [30, 10, 20] {
            store.add_to_cart(customer, DishId(1), 1).await;
            let order = order_for(customer, minutes_ago);
            store.place_order(&order, &soup_line()).await.unwrap();
            placed.push(order);
        }
        store.add_to_cart(CustomerId(6), DishId(1), 1).await;
        store.place_order(&order_for(CustomerId(6), 0), &soup_line()).await.unwrap();

        let listed = store.list_for_customer(customer).await.unwrap();
        let ids: Vec<OrderId> = listed.iter().map(|order| order.order_id).collect();
        assert_eq!(ids, vec![placed[1].order_id, placed[2].order_id, placed[0].order_id]);
    }

    #[tokio::test]
    async fn test_read_fault_fires_once() {
        let store = InMemoryStore::new();
        store.inject_fault(FaultPoint::Read).await;

        assert!(store.get(OrderId::generate()).await.is_err());
        assert!(store.get(OrderId::generate()).await.is_ok());
    }
}
