//! Example x402 server using Axum.
//!
//! This example demonstrates how to put a paid endpoint behind a [`PaymentHandler`].
//!
//! Run with:
//! ```bash
//! cargo run --example server
//! ```
//!
//! Environment variables (a `.env` file is read when present):
//! - X402_PAY_TO: Treasury address receiving payments
//! - X402_FACILITATOR_URL: URL of the facilitator service
//! - X402_NETWORK, X402_PROTOCOL_VERSION, ...: see `PaymentConfig::from_env`
//! - PORT: Server port (default: 3000)

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use x402_solana::server::{PaymentConfig, PaymentHandler, PaymentOutcome, RouteConfig};

struct AppState {
    payments: PaymentHandler,
    weather_route: RouteConfig,
    public_url: String,
}

/// Protected endpoint that requires payment.
async fn weather_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let resource_url = format!("{}{}", state.public_url, uri.path());
    let outcome = state
        .payments
        .process(&headers, &state.weather_route, &resource_url, || async {
            json!({
                "location": "San Francisco",
                "temperature": 68,
                "conditions": "Sunny",
                "humidity": 65,
            })
        })
        .await;

    match outcome {
        Ok(PaymentOutcome::PaymentRequired(response)) => response.map(Body::from).into_response(),
        Ok(PaymentOutcome::Served(served)) => {
            let mut response = Json(&served.value).into_response();
            served.apply_headers(response.headers_mut());
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Payment processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Health check endpoint (no payment required).
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "protocol": "x402",
    }))
}

/// Root endpoint with information.
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.payments.config();
    Json(json!({
        "message": "x402 Example Server",
        "endpoints": {
            "/weather": "Weather data (requires $0.01 payment)",
            "/health": "Health check (free)"
        },
        "network": config.network_id(),
        "version": config.protocol_version.value(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()?;
    let config = PaymentConfig::from_env()?.with_description("Weather API access");

    tracing::info!(
        network = %config.network,
        pay_to = %config.pay_to,
        facilitator = %config.facilitator_url,
        port,
        "Starting x402 example server"
    );

    let payments = PaymentHandler::new(config)?.on_settlement_failure(|failure| {
        tracing::error!(
            reason = %failure.reason,
            amount = %failure.requirement.amount,
            "Served a request whose payment did not settle"
        );
    });
    let state = Arc::new(AppState {
        payments,
        weather_route: RouteConfig::new("$0.01").with_description("Current weather"),
        public_url: format!("http://localhost:{port}"),
    });

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/weather", get(weather_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
