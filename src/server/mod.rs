//! Read-only status server: instruments, trades, market hours and account value.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tower_http::services::ServeDir;
use tracing::info;

use crate::execution::{AccountMonitor, MarketHours, TradeLedger};
use crate::registry::InstrumentRegistry;

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<InstrumentRegistry>,
    pub ledger: TradeLedger,
    pub hours: Arc<MarketHours>,
    pub account: Arc<AccountMonitor>,
}

/// JSON endpoints plus static files from `static_dir` for everything else.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/stocks", get(get_stocks))
        .route("/trades", get(get_trades))
        .route("/hours", get(get_hours))
        .route("/value", get(get_value))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .with_state(state)
}

async fn get_stocks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.snapshot())
}

async fn get_trades(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ledger.list_newest_first())
}

async fn get_hours(State(state): State<AppState>) -> Response {
    match state.hours.view() {
        Some(view) => Json(view).into_response(),
        None => not_yet_observed("market hours"),
    }
}

async fn get_value(State(state): State<AppState>) -> Response {
    match state.account.view() {
        Some(view) => Json(view).into_response(),
        None => not_yet_observed("account value"),
    }
}

fn not_yet_observed(what: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": format!("{} not yet observed", what) })),
    )
        .into_response()
}

pub async fn run(state: AppState, port: u16, static_dir: impl AsRef<Path>) -> crate::Result<()> {
    let app = router(state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🌐 Status server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Resolution, Trade, TradeSide};
    use crate::registry::TrackedInstrument;
    use crate::testing::MockBroker;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn state() -> AppState {
        let broker = Arc::new(MockBroker::open());
        let instrument = TrackedInstrument::new("AAPL", 10, Resolution::Minute, 2, 3);
        instrument.seed(&[1.0, 2.0, 3.0]);

        AppState {
            registry: Arc::new(InstrumentRegistry::from_instruments(vec![instrument]).unwrap()),
            ledger: TradeLedger::new(),
            hours: Arc::new(MarketHours::new(broker.clone(), Duration::from_secs(30))),
            account: Arc::new(AccountMonitor::new(broker, None)),
        }
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = router(state, "public")
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_stocks_lists_instruments() {
        let (status, body) = get(state(), "/stocks").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["symbol"], "AAPL");
        assert_eq!(body[0]["target_quantity"], 10);
        assert_eq!(body[0]["short_average"], 2.5);
        assert_eq!(body[0]["last_order_side"], "SOLD");
    }

    #[tokio::test]
    async fn test_trades_newest_first() {
        let state = state();
        for (side, price) in [(TradeSide::Bought, 10.0), (TradeSide::Sold, 12.0)] {
            state.ledger.append(Trade {
                id: Uuid::new_v4(),
                symbol: "AAPL".to_string(),
                side,
                quantity: 10,
                price,
                timestamp: Utc::now(),
                order_id: "ord".to_string(),
            });
        }

        let (status, body) = get(state, "/trades").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["side"], "SOLD");
        assert_eq!(body[1]["price"], 10.0);
    }

    #[tokio::test]
    async fn test_hours_and_value_unavailable_until_observed() {
        let state = state();

        let (status, _) = get(state.clone(), "/hours").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = get(state.clone(), "/value").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("account value"));

        state.hours.refresh().await.unwrap();
        state.account.refresh().await.unwrap();

        let (status, body) = get(state.clone(), "/hours").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currently_open"], true);
        let (status, body) = get(state, "/value").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["equity"], 100_000.0);
        assert_eq!(body["gain_loss_percent"], 0.0);
    }
}
