use std::sync::Arc;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use food_delivery_orders::config::AppConfig;
use food_delivery_orders::domain::order::{
    CourierId, CustomerId, DishId, OrderLifecycleEngine, OrderStatus,
};
use food_delivery_orders::metrics::{self, Metrics};
use food_delivery_orders::storage::{InMemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,food_delivery_orders=debug")),
        )
        .init();

    tracing::info!("Starting food delivery order lifecycle service");

    let config = AppConfig::from_env();
    tracing::debug!(?config, "Loaded configuration");

    // === 1. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        families = metrics.registry().gather().len(),
        "Metrics registry created"
    );

    // Metrics HTTP server runs on its own runtime thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.server.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build metrics runtime");
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    });

    // === 2. Choose a store ===
    match &config.postgres {
        Some(postgres) => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(postgres).await?;
            store.migrate().await?;

            let engine = OrderLifecycleEngine::from_store(store, Arc::clone(&metrics))
                .with_policy(config.policy)
                .with_read_retry(config.read_retry.to_retry_config());

            let awaiting_courier = engine.list_orders_by_status(OrderStatus::Paid).await?;
            tracing::info!(
                awaiting_courier = awaiting_courier.len(),
                "Order lifecycle engine ready"
            );

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
        }
        None => {
            tracing::info!("DATABASE_URL not set, running lifecycle demo on the in-memory store");
            let store = seed_demo_store().await;
            let engine = OrderLifecycleEngine::from_store(store.clone(), Arc::clone(&metrics))
                .with_policy(config.policy)
                .with_read_retry(config.read_retry.to_retry_config());

            run_demo(&engine, &store).await?;
        }
    }

    Ok(())
}

const DEMO_CUSTOMER: CustomerId = CustomerId(1);
const DEMO_COURIER: CourierId = CourierId(7);

async fn seed_demo_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.upsert_dish(DishId(1), "Margherita", Decimal::new(1000, 2)).await;
    store.upsert_dish(DishId(2), "Tom Yum", Decimal::new(500, 2)).await;
    store.add_courier(DEMO_COURIER).await;
    store
}

async fn run_demo(engine: &OrderLifecycleEngine, store: &InMemoryStore) -> anyhow::Result<()> {
    store.add_to_cart(DEMO_CUSTOMER, DishId(1), 2).await;
    store.add_to_cart(DEMO_CUSTOMER, DishId(2), 1).await;

    // === Delivered path ===
    let order = engine.create_order(DEMO_CUSTOMER, "12 Baker Street").await?;
    tracing::info!(order_id = %order.order_id, total_price = %order.total_price, "Demo order created");

    engine.pay(order.order_id).await?;

    // Rejected: already paid
    if let Err(e) = engine.pay(order.order_id).await {
        tracing::info!(error = %e, "Second payment rejected as expected");
    }

    engine.assign_courier(order.order_id, DEMO_COURIER).await?;
    let delivered = engine.deliver(order.order_id).await?;
    tracing::info!(order_id = %delivered.order_id, status = %delivered.status, "Demo order delivered");

    // === Cancelled path ===
    store.add_to_cart(DEMO_CUSTOMER, DishId(2), 3).await;
    let second = engine.create_order(DEMO_CUSTOMER, "12 Baker Street").await?;
    let cancelled = engine.cancel(second.order_id).await?;
    tracing::info!(order_id = %cancelled.order_id, status = %cancelled.status, "Demo order cancelled");

    // Rejected: nothing left in the cart
    if let Err(e) = engine.create_order(DEMO_CUSTOMER, "12 Baker Street").await {
        tracing::info!(error = %e, "Checkout of an empty cart rejected as expected");
    }

    let history = engine.list_orders_for_customer(DEMO_CUSTOMER).await?;
    for order in &history {
        tracing::info!(
            order_id = %order.order_id,
            status = %order.status,
            total_price = %order.total_price,
            "Customer order"
        );
    }

    tracing::info!(orders = history.len(), "Demo complete");
    Ok(())
}
