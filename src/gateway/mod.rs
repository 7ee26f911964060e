//! HTTP gateway
//!
//! Thin proxy endpoints for a frontend: public market/position reads
//! forwarded to the venue, plus the `/sign` trust boundary that keeps
//! long-lived API secret material server-side.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::clob::signing::l2_signature;
use crate::positions::DUST_THRESHOLD;
use crate::types::ApiCredentials;

/// Server-held state for the proxy routes.
pub struct GatewayState {
    pub client: reqwest::Client,
    pub gamma_url: String,
    pub data_api_url: String,
    /// Static credential material for `/sign`; absent means the route 500s.
    pub credentials: Option<ApiCredentials>,
}

/// Create the gateway router with all endpoints
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/markets", get(get_markets))
        .route("/market-by-token", get(get_market_by_token))
        .route("/positions", get(get_positions))
        .route("/sign", post(post_sign))
        .with_state(state)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn upstream_error(err: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    warn!(%err, "gateway upstream call failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

async fn fetch_market_page(
    state: &GatewayState,
    limit: usize,
) -> Result<Vec<Value>, (StatusCode, Json<Value>)> {
    let url = format!(
        "{}/markets?active=true&closed=false&limit={}&order=volume24hr&ascending=false",
        state.gamma_url.trim_end_matches('/'),
        limit
    );
    let response = state
        .client
        .get(&url)
        .send()
        .await
        .map_err(upstream_error)?;

    if !response.status().is_success() {
        return Err(upstream_error(format!(
            "markets upstream returned {}",
            response.status()
        )));
    }

    let raw: Value = response.json().await.map_err(upstream_error)?;
    match raw {
        Value::Array(markets) => Ok(markets),
        other => Err(upstream_error(format!(
            "unexpected markets payload shape: {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
struct MarketsQuery {
    limit: Option<usize>,
}

/// GET /markets - Active markets by trailing-24h volume
async fn get_markets(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<MarketsQuery>,
) -> impl IntoResponse {
    match fetch_market_page(&state, query.limit.unwrap_or(20)).await {
        Ok(markets) => (StatusCode::OK, Json(Value::Array(markets))),
        Err(err) => err,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketByTokenQuery {
    token_id: Option<String>,
}

/// GET /market-by-token - First active market carrying the token id
async fn get_market_by_token(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<MarketByTokenQuery>,
) -> impl IntoResponse {
    let token_id = match query.token_id {
        Some(token_id) if !token_id.is_empty() => token_id,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "tokenId query parameter is required" })),
            )
        }
    };

    let markets = match fetch_market_page(&state, 100).await {
        Ok(markets) => markets,
        Err(err) => return err,
    };

    // clobTokenIds arrives as a JSON-encoded string array.
    let matched = markets.into_iter().find(|market| {
        market
            .get("clobTokenIds")
            .and_then(|v| v.as_str())
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .map(|ids| ids.contains(&token_id))
            .unwrap_or(false)
    });

    match matched {
        Some(market) => (StatusCode::OK, Json(market)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no market found for token" })),
        ),
    }
}

#[derive(Deserialize)]
struct PositionsQuery {
    user: Option<String>,
}

/// GET /positions - Positions for a wallet, dust pre-filtered upstream
async fn get_positions(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PositionsQuery>,
) -> impl IntoResponse {
    let user = match query.user {
        Some(user) if !user.is_empty() => user,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                HeaderMap::new(),
                Json(json!({ "error": "user query parameter is required" })),
            )
        }
    };

    let url = format!(
        "{}/positions?user={}&sizeThreshold={}&limit=500",
        state.data_api_url.trim_end_matches('/'),
        user,
        DUST_THRESHOLD
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );

    let result: Result<Value, _> = async {
        let response = state.client.get(&url).send().await?;
        response.error_for_status()?.json().await
    }
    .await;

    match result {
        Ok(positions) => (StatusCode::OK, headers, Json(positions)),
        Err(err) => {
            let (status, body) = upstream_error(err);
            (status, headers, body)
        }
    }
}

#[derive(Deserialize)]
struct SignRequest {
    method: Option<String>,
    path: Option<String>,
    body: Option<String>,
}

/// POST /sign - Timestamped HMAC over a venue request
async fn post_sign(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<SignRequest>,
) -> impl IntoResponse {
    let (method, path) = match (request.method, request.path) {
        (Some(method), Some(path)) if !method.is_empty() && !path.is_empty() => (method, path),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "method and path are required" })),
            )
        }
    };

    let credentials = match &state.credentials {
        Some(credentials) if credentials.is_valid() => credentials,
        _ => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "signing credentials are not configured" })),
            )
        }
    };

    let timestamp = Utc::now().timestamp();
    match l2_signature(
        &credentials.secret,
        timestamp,
        &method,
        &path,
        request.body.as_deref(),
    ) {
        Ok(signature) => (
            StatusCode::OK,
            Json(json!({
                "signature": signature,
                "timestamp": timestamp,
                "apiKey": credentials.key,
                "passphrase": credentials.passphrase,
            })),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}
