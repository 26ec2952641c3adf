use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use futures_util::future::try_join_all;

use crate::metrics::Metrics;
use crate::storage::{
    CartStore, Catalog, CourierRegistry, OrderRepository, PlaceOutcome, StorageError,
};
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::state_machine::TransitionPolicy;
use super::value_objects::{CourierId, CustomerId, OrderId, OrderStatus};

// ============================================================================
// Order Lifecycle Engine
// ============================================================================
//
// Orchestrates: Command → Aggregate → Event → Repository (compare-and-swap)
//
// The only component that writes an order's status or courier. Creation is
// one atomic repository call; a transition is one compare-and-swap on the
// status it read, so two racing commands on the same order cannot both win.
//
// ============================================================================

pub struct OrderLifecycleEngine {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn Catalog>,
    couriers: Arc<dyn CourierRegistry>,
    orders: Arc<dyn OrderRepository>,
    policy: TransitionPolicy,
    read_retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl OrderLifecycleEngine {
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn Catalog>,
        couriers: Arc<dyn CourierRegistry>,
        orders: Arc<dyn OrderRepository>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            carts,
            catalog,
            couriers,
            orders,
            policy: TransitionPolicy::default(),
            read_retry: RetryConfig::default(),
            metrics,
        }
    }

    /// Engine over a single store that serves every collaborator contract
    pub fn from_store<S>(store: S, metrics: Arc<Metrics>) -> Self
    where
        S: CartStore + Catalog + CourierRegistry + OrderRepository + Clone + 'static,
    {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            metrics,
        )
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_read_retry(mut self, read_retry: RetryConfig) -> Self {
        self.read_retry = read_retry;
        self
    }

    // ------------------------------------------------------------------------
    // Cart → Order
    // ------------------------------------------------------------------------

    /// Convert the customer's cart into a `Created` order and empty the cart
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        delivery_address: &str,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.convert_cart(customer_id, delivery_address).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok((order, event)) => {
                self.metrics.record_order_created(elapsed);
                tracing::info!(
                    order_id = %order.order_id,
                    customer_id = %customer_id,
                    total_price = %order.total_price,
                    line_items = order.line_items.len(),
                    event_type = event.event_type(),
                    "Order created from cart"
                );
                Ok(order)
            }
            Err(error) => {
                self.metrics.record_creation_failure(error.kind(), elapsed);
                match &error {
                    OrderError::Storage(_) => tracing::error!(
                        customer_id = %customer_id,
                        error = %error,
                        "Order creation rolled back"
                    ),
                    _ => tracing::warn!(
                        customer_id = %customer_id,
                        error = %error,
                        "Order creation rejected"
                    ),
                }
                Err(error)
            }
        }
    }

    async fn convert_cart(
        &self,
        customer_id: CustomerId,
        delivery_address: &str,
    ) -> Result<(Order, OrderEvent), OrderError> {
        let lines = self.carts.cart_items(customer_id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart(customer_id));
        }

        let lookups = lines.iter().copied().map(|line| {
            let catalog = Arc::clone(&self.catalog);
            async move {
                let dish = catalog
                    .dish(line.dish_id)
                    .await?
                    .ok_or(OrderError::DishNotFound(line.dish_id))?;
                Ok::<_, OrderError>((line, dish))
            }
        });
        let resolved = try_join_all(lookups).await?;

        let (order, event) = Order::from_cart(
            OrderId::generate(),
            customer_id,
            delivery_address,
            resolved,
            // TIMESTAMPTZ keeps microseconds
            Utc::now().trunc_subsecs(6),
        )?;

        match self.orders.place_order(&order, &lines).await? {
            PlaceOutcome::Placed => Ok((order, event)),
            PlaceOutcome::CartAlreadyEmpty => Err(OrderError::EmptyCart(customer_id)),
            PlaceOutcome::CartChanged => Err(OrderError::CartChanged(customer_id)),
        }
    }

    // ------------------------------------------------------------------------
    // Status transitions
    // ------------------------------------------------------------------------

    pub async fn pay(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.handle(order_id, OrderCommand::Pay).await
    }

    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.handle(order_id, OrderCommand::Cancel).await
    }

    pub async fn assign_courier(
        &self,
        order_id: OrderId,
        courier_id: CourierId,
    ) -> Result<Order, OrderError> {
        self.handle(order_id, OrderCommand::AssignCourier { courier_id }).await
    }

    pub async fn deliver(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.handle(order_id, OrderCommand::Deliver).await
    }

    /// Apply `command` to the order and return the updated snapshot
    pub async fn handle(
        &self,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.apply_command(order_id, command).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(order) => {
                self.metrics.record_transition(command.name(), "applied", elapsed);
                tracing::info!(
                    order_id = %order_id,
                    command = %command,
                    status = ?order.status,
                    "Order transition applied"
                );
            }
            Err(error) => {
                self.metrics.record_transition(command.name(), error.kind(), elapsed);
                match error {
                    OrderError::Storage(_) => tracing::error!(
                        order_id = %order_id,
                        command = %command,
                        error = %error,
                        "Order transition failed"
                    ),
                    _ => tracing::warn!(
                        order_id = %order_id,
                        command = %command,
                        error = %error,
                        "Order transition rejected"
                    ),
                }
            }
        }

        result
    }

    async fn apply_command(
        &self,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Order, OrderError> {
        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let event = order.handle_command(&command, &self.policy)?;

        if let OrderCommand::AssignCourier { courier_id } = command {
            if !self.couriers.courier_exists(courier_id).await? {
                return Err(OrderError::CourierNotFound(courier_id));
            }
        }

        let swapped = self
            .orders
            .compare_and_swap_status(
                order_id,
                order.status,
                event.resulting_status(),
                event.assigned_courier(),
            )
            .await?;

        if !swapped {
            // Lost the race: report against what is stored now
            let current = self
                .orders
                .get(order_id)
                .await?
                .map_or(order.status, |stored| stored.status);
            return Err(OrderError::IllegalTransition {
                order_id,
                from: current,
                command,
            });
        }

        order.apply_event(&event);
        Ok(order)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let orders = &self.orders;
        let found = self.read("get_order", || orders.get(order_id)).await?;

        tracing::debug!(order_id = %order_id, found = found.is_some(), "Fetched order");
        found.ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Newest first
    pub async fn list_orders_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, OrderError> {
        let orders = &self.orders;
        let found = self
            .read("list_orders_for_customer", || orders.list_for_customer(customer_id))
            .await?;

        tracing::debug!(customer_id = %customer_id, count = found.len(), "Listed customer orders");
        Ok(found)
    }

    pub async fn list_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<Order>, OrderError> {
        let orders = &self.orders;
        let found = self
            .read("list_orders_by_status", || orders.list_by_status(status))
            .await?;

        tracing::debug!(status = ?status, count = found.len(), "Listed orders by status");
        Ok(found)
    }

    async fn read<T, F, Fut>(&self, operation: &'static str, mut query: F) -> Result<T, OrderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        retry_on_transient(&self.read_retry, |attempt| {
            if attempt > 1 {
                self.metrics.record_read_retry(operation);
            }
            let pending = query();
            async move { pending.await.map_err(OrderError::from) }
        })
        .await
        .into_result()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
