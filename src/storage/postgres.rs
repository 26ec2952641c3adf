use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{
    cart_matches, CartStore, Catalog, CourierRegistry, OrderRepository, PlaceOutcome, StorageError,
};
use crate::config::PostgresConfig;
use crate::domain::order::{
    CartLine, CourierId, CustomerId, DishId, DishSnapshot, Order, OrderId, OrderLineItem,
    OrderStatus,
};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Tables (see migrations/):
// - orders            - order header, keyed by order_id
// - order_line_items  - frozen snapshots, keyed by (order_id, dish_id)
// - cart_items        - collaborator table, cleared inside place_order
// - dishes / couriers - collaborator tables, read only
//
// place_order runs in ONE transaction. It locks the customer's cart rows,
// writes nothing unless they still match the lines the order was built from,
// and deletes only those lines. Dropping the transaction on any `?` exit
// rolls it back, so an error never leaves an order without its cart cleared
// or a cleared cart without its order.
//
// ============================================================================

const ORDER_COLUMNS: &str =
    "order_id, customer_id, status, total_price, created_at, delivery_address, courier_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("migration failed: {}", e)))?;

        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn load_line_items(
        &self,
        order_ids: &[Uuid],
    ) -> Result<Vec<LineItemRow>, StorageError> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, LineItemRow>(
            "SELECT order_id, dish_id, dish_name, unit_price, quantity
             FROM order_line_items
             WHERE order_id = ANY($1)
             ORDER BY order_id, position",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StorageError> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.order_id).collect();
        let items = self.load_line_items(&ids).await?;
        assemble_orders(rows, items)
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct OrderRow {
    order_id: Uuid,
    customer_id: i64,
    status: String,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    delivery_address: String,
    courier_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LineItemRow {
    order_id: Uuid,
    dish_id: i64,
    dish_name: String,
    unit_price: Decimal,
    quantity: i32,
}

/// Join header rows with their line items, keeping the header order
fn assemble_orders(
    rows: Vec<OrderRow>,
    items: Vec<LineItemRow>,
) -> Result<Vec<Order>, StorageError> {
    let mut items_by_order: HashMap<Uuid, Vec<OrderLineItem>> = HashMap::new();
    for item in items {
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderLineItem {
                dish_id: DishId(item.dish_id),
                dish_name: item.dish_name,
                unit_price: item.unit_price,
                quantity: item.quantity,
            });
    }

    rows.into_iter()
        .map(|row| {
            let status: OrderStatus = row
                .status
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("order {}: {}", row.order_id, e)))?;

            let line_items = items_by_order.remove(&row.order_id).unwrap_or_default();
            if line_items.is_empty() {
                return Err(StorageError::Corrupt(format!(
                    "order {} has no line items",
                    row.order_id
                )));
            }

            Ok(Order {
                order_id: OrderId::from_uuid(row.order_id),
                customer_id: CustomerId(row.customer_id),
                status,
                courier_id: row.courier_id.map(CourierId),
                total_price: row.total_price,
                created_at: row.created_at,
                delivery_address: row.delivery_address,
                line_items,
            })
        })
        .collect()
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::Corrupt(error.to_string())
            }
            other => StorageError::Database(other.to_string()),
        }
    }
}

// ============================================================================
// Collaborator Tables
// ============================================================================

#[async_trait]
impl CartStore for PgStore {
    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, StorageError> {
        let rows: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT dish_id, quantity FROM cart_items WHERE customer_id = $1 ORDER BY dish_id",
        )
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(dish_id, quantity)| CartLine {
                dish_id: DishId(dish_id),
                quantity,
            })
            .collect())
    }

    async fn clear_cart(&self, customer_id: CustomerId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
            .bind(customer_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn dish(&self, dish_id: DishId) -> Result<Option<DishSnapshot>, StorageError> {
        let row: Option<(String, Decimal)> =
            sqlx::query_as("SELECT name, price FROM dishes WHERE dish_id = $1")
                .bind(dish_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(name, price)| DishSnapshot { name, price }))
    }
}

#[async_trait]
impl CourierRegistry for PgStore {
    async fn courier_exists(&self, courier_id: CourierId) -> Result<bool, StorageError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM couriers WHERE courier_id = $1)")
                .bind(courier_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

// ============================================================================
// Order Repository
// ============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn place_order(
        &self,
        order: &Order,
        consumed: &[CartLine],
    ) -> Result<PlaceOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Row locks keep quantities stable until commit; lines added later are
        // not in `consumed` and survive the delete below.
        let locked: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT dish_id, quantity FROM cart_items WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(order.customer_id.0)
        .fetch_all(&mut *tx)
        .await?;
        let current: Vec<CartLine> = locked
            .into_iter()
            .map(|(dish_id, quantity)| CartLine {
                dish_id: DishId(dish_id),
                quantity,
            })
            .collect();

        if current.is_empty() || !cart_matches(consumed, &current) {
            tx.rollback().await?;
            let outcome = if current.is_empty() {
                PlaceOutcome::CartAlreadyEmpty
            } else {
                PlaceOutcome::CartChanged
            };
            tracing::warn!(
                order_id = %order.order_id,
                customer_id = %order.customer_id,
                outcome = ?outcome,
                "Cart changed since it was read, order not written"
            );
            return Ok(outcome);
        }

        sqlx::query(
            "INSERT INTO orders (
                order_id, customer_id, status, total_price, created_at, delivery_address, courier_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.order_id.as_uuid())
        .bind(order.customer_id.0)
        .bind(order.status.as_str())
        .bind(order.total_price)
        .bind(order.created_at)
        .bind(&order.delivery_address)
        .bind(order.courier_id.map(|c| c.0))
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.line_items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line_items (
                    order_id, dish_id, position, dish_name, unit_price, quantity
                ) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.order_id.as_uuid())
            .bind(item.dish_id.0)
            .bind(position as i32)
            .bind(&item.dish_name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let mut dish_ids: Vec<i64> = consumed.iter().map(|line| line.dish_id.0).collect();
        dish_ids.sort_unstable();
        dish_ids.dedup();

        let cleared = sqlx::query(
            "DELETE FROM cart_items WHERE customer_id = $1 AND dish_id = ANY($2)",
        )
        .bind(order.customer_id.0)
        .bind(&dish_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if cleared != dish_ids.len() as u64 {
            tx.rollback().await?;
            tracing::warn!(
                order_id = %order.order_id,
                customer_id = %order.customer_id,
                cleared,
                expected = dish_ids.len(),
                "Cart rows vanished mid-transaction, order insert rolled back"
            );
            return Ok(PlaceOutcome::CartChanged);
        }

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.order_id,
            line_items = order.line_items.len(),
            cart_rows_cleared = cleared,
            "Committed order and cart clear"
        );

        Ok(PlaceOutcome::Placed)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE order_id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, order_id DESC",
            ORDER_COLUMNS
        ))
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = $1 ORDER BY created_at, order_id",
            ORDER_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn compare_and_swap_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        courier_id: Option<CourierId>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE orders
             SET status = $3, courier_id = COALESCE($4, courier_id)
             WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(new_status.as_str())
        .bind(courier_id.map(|c| c.0))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Queries need a live PostgreSQL instance; only the row mapping is covered
// here.
//
// ============================================================================
