use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use prometheus::{Encoder, Registry, TextEncoder};

const SERVICE_NAME: &str = "food-delivery-orders";

/// Serve `/metrics` and `/health` until the server stops.
///
/// Runs its own actix system; start it on a dedicated thread and runtime.
pub async fn start_metrics_server(registry: Arc<Registry>, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "Metrics server listening on /metrics and /health");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(Arc::clone(&registry)))
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(scrape))
        .route("/health", web::get().to(health));
}

/// Prometheus text exposition of every registered family
fn render(registry: &Registry) -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&registry.gather())
}

async fn scrape(registry: web::Data<Registry>) -> HttpResponse {
    match render(&registry) {
        Ok(body) => HttpResponse::Ok()
            .content_type(TextEncoder::new().format_type())
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health(registry: web::Data<Registry>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "metric_families": registry.gather().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, test};

    fn app_data(metrics: &crate::metrics::Metrics) -> web::Data<Registry> {
        web::Data::new(metrics.registry().clone())
    }

    #[::core::prelude::v1::test]
    fn test_render_includes_recorded_counters() {
        let metrics = crate::metrics::Metrics::new().unwrap();
        metrics.record_transition("pay", "illegal", 0.002);

        let text = render(metrics.registry()).unwrap();
        assert!(text.contains(r#"order_transitions_total{command="pay",outcome="illegal"} 1"#));
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_registry() {
        let metrics = crate::metrics::Metrics::new().unwrap();
        metrics.record_order_created(0.01);

        let app = test::init_service(App::new().app_data(app_data(&metrics)).configure(routes)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert!(response.status().is_success());

        let body = to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("orders_created_total 1"));
    }

    #[actix_web::test]
    async fn test_health_reports_service_and_families() {
        let metrics = crate::metrics::Metrics::new().unwrap();
        let app = test::init_service(App::new().app_data(app_data(&metrics)).configure(routes)).await;

        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
        assert!(body["metric_families"].as_u64().unwrap() > 0);
    }
}
