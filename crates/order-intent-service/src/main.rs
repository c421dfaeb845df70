use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use order_intent_api::{OrderIntentApi, API_CONTRACT_VERSION};
use order_intent_core::{
    DisabledOracle, MenuItemDraft, OrderId, OrderStatus, VerificationOracle,
};
use order_intent_oracle::{ChatOracle, OracleConfig, DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

const DEFAULT_ORDER_LIST_LIMIT: usize = 50;
const DEFAULT_TOP_ITEMS_LIMIT: usize = 10;
const DEFAULT_ANALYTICS_DAYS: u32 = 7;

#[derive(Clone)]
struct ServiceState {
    api: Arc<OrderIntentApi>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct UtteranceRequest {
    utterance: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SuggestRequest {
    utterance: String,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct SuggestReply {
    suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SetActiveRequest {
    active: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SetStatusRequest {
    status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct ListOrdersQuery {
    status: Option<OrderStatus>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct MenuQuery {
    include_inactive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct DaysQuery {
    days: Option<u32>,
}

#[derive(Debug, Parser)]
#[command(name = "order-intent-service")]
#[command(about = "Local HTTP service for the order intent engine")]
struct Args {
    #[arg(long, default_value = "./order_intent.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    /// Chat-completions endpoint; without one the oracle is disabled.
    #[arg(long)]
    oracle_endpoint: Option<String>,
    #[arg(long, default_value = DEFAULT_ORACLE_MODEL)]
    oracle_model: String,
    #[arg(long)]
    oracle_api_key: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ORACLE_TIMEOUT_MS)]
    oracle_timeout_ms: u64,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        (status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(message: impl Into<String>) -> ServiceError {
        ServiceError { service_contract_version: SERVICE_CONTRACT_VERSION, error: message.into() }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn build_oracle(args: &Args) -> Box<dyn VerificationOracle + Send + Sync> {
    let endpoint = args
        .oracle_endpoint
        .clone()
        .or_else(|| std::env::var("ORDER_INTENT_ORACLE_ENDPOINT").ok());
    let Some(endpoint) = endpoint else {
        return Box::new(DisabledOracle);
    };
    let mut config = OracleConfig::new(endpoint, args.oracle_model.clone());
    config.api_key = args
        .oracle_api_key
        .clone()
        .or_else(|| std::env::var("ORDER_INTENT_ORACLE_API_KEY").ok());
    config.timeout_ms = args.oracle_timeout_ms;
    Box::new(ChatOracle::new(config))
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi.yaml", get(openapi))
        .route("/v1/orders/resolve", post(orders_resolve))
        .route("/v1/orders/suggest", post(orders_suggest))
        .route("/v1/orders", post(orders_place).get(orders_list))
        .route("/v1/orders/:id/status", post(orders_set_status))
        .route("/v1/menu", get(menu_list).post(menu_add))
        .route("/v1/menu/:id/active", post(menu_set_active))
        .route("/v1/menu/reload", post(menu_reload))
        .route("/v1/analytics/summary", get(analytics_summary))
        .route("/v1/analytics/top-items", get(analytics_top_items))
        .route("/v1/analytics/daily-sales", get(analytics_daily_sales))
        .route("/v1/analytics/order-stats", get(analytics_order_stats))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let oracle = build_oracle(&args);
    let state = ServiceState { api: Arc::new(OrderIntentApi::new(args.db, oracle)) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    println!("order-intent-service listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn orders_resolve(
    State(state): State<ServiceState>,
    Json(request): Json<UtteranceRequest>,
) -> Result<Json<ServiceEnvelope<order_intent_api::ResolutionReport>>, ServiceError> {
    let report = state
        .api
        .resolve(&request.utterance)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(report)))
}

async fn orders_suggest(
    State(state): State<ServiceState>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<ServiceEnvelope<SuggestReply>>, ServiceError> {
    let suggestions = state
        .api
        .suggest(&request.utterance, request.limit)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(SuggestReply { suggestions })))
}

async fn orders_place(
    State(state): State<ServiceState>,
    Json(request): Json<UtteranceRequest>,
) -> Result<Json<ServiceEnvelope<order_intent_api::PlaceOrderResult>>, ServiceError> {
    let placed = state
        .api
        .place_order(&request.utterance)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(placed)))
}

async fn orders_list(
    State(state): State<ServiceState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ServiceEnvelope<Vec<order_intent_core::OrderRecord>>>, ServiceError> {
    let orders = state
        .api
        .list_orders(query.status, query.limit.unwrap_or(DEFAULT_ORDER_LIST_LIMIT))
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(orders)))
}

async fn orders_set_status(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<ServiceEnvelope<order_intent_api::OrderStatusUpdate>>, ServiceError> {
    let order_id =
        OrderId::from_string(&id).map_err(|err| ServiceState::error(err.to_string()))?;
    let update = state
        .api
        .update_order_status(order_id, request.status)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(update)))
}

async fn menu_list(
    State(state): State<ServiceState>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<ServiceEnvelope<order_intent_api::MenuView>>, ServiceError> {
    let menu = state
        .api
        .menu(query.include_inactive.unwrap_or(false))
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(menu)))
}

async fn menu_add(
    State(state): State<ServiceState>,
    Json(draft): Json<MenuItemDraft>,
) -> Result<Json<ServiceEnvelope<order_intent_core::MenuItem>>, ServiceError> {
    let item =
        state.api.add_menu_item(draft).map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(item)))
}

async fn menu_set_active(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ServiceEnvelope<order_intent_api::SnapshotInfo>>, ServiceError> {
    let item_id = order_intent_core::MenuItemId::from_string(&id)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    let info = state
        .api
        .set_item_active(item_id, request.active)
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(info)))
}

async fn menu_reload(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<order_intent_api::SnapshotInfo>>, ServiceError> {
    let info = state.api.reload_snapshot().map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(info)))
}

async fn analytics_summary(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<order_intent_store_sqlite::AnalyticsSummary>>, ServiceError> {
    let summary =
        state.api.analytics_summary().map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(summary)))
}

async fn analytics_top_items(
    State(state): State<ServiceState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ServiceEnvelope<Vec<order_intent_store_sqlite::TopItem>>>, ServiceError> {
    let items = state
        .api
        .top_items(query.limit.unwrap_or(DEFAULT_TOP_ITEMS_LIMIT))
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(items)))
}

async fn analytics_daily_sales(
    State(state): State<ServiceState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<ServiceEnvelope<Vec<order_intent_store_sqlite::DailySales>>>, ServiceError> {
    let sales = state
        .api
        .daily_sales(query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS))
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(sales)))
}

async fn analytics_order_stats(
    State(state): State<ServiceState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<ServiceEnvelope<order_intent_store_sqlite::OrderStats>>, ServiceError> {
    let stats = state
        .api
        .order_stats(query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS))
        .map_err(|err| ServiceState::error(err.to_string()))?;
    Ok(Json(envelope(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use http::Request;
    use tower::ServiceExt;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("orderintent-service-{}.sqlite3", ulid::Ulid::new()))
    }

    fn seeded_state(db_path: &std::path::Path) -> ServiceState {
        let api = OrderIntentApi::with_disabled_oracle(db_path.to_path_buf());
        if let Err(err) = api.bootstrap() {
            panic!("failed to bootstrap service fixture: {err}");
        }
        ServiceState { api: Arc::new(api) }
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(payload) => builder
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string())),
            None => builder.body(axum::body::Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request: {err}"));
        match router.oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let state =
            ServiceState { api: Arc::new(OrderIntentApi::with_disabled_oracle(unique_temp_db_path())) };
        let router = app(state);

        let response = send(router, "GET", "/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(serde_json::Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(
            value.get("api_contract_version").and_then(serde_json::Value::as_str),
            Some(API_CONTRACT_VERSION)
        );
    }

    #[tokio::test]
    async fn openapi_endpoint_returns_versioned_artifact() {
        let state =
            ServiceState { api: Arc::new(OrderIntentApi::with_disabled_oracle(unique_temp_db_path())) };
        let router = app(state);

        let response = send(router, "GET", "/v1/openapi.yaml", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        assert!(body.contains("openapi: 3.1.0"));
        assert!(body.contains("version: service.v1"));
        assert!(body.contains("/v1/orders/resolve"));
        assert!(body.contains("/v1/analytics/summary"));
    }

    #[test]
    fn openapi_document_parses_as_yaml() {
        let value: serde_yaml::Value = match serde_yaml::from_str(OPENAPI_YAML) {
            Ok(value) => value,
            Err(err) => panic!("embedded openapi document is not valid YAML: {err}"),
        };
        assert_eq!(value["openapi"].as_str(), Some("3.1.0"));
        assert_eq!(value["info"]["version"].as_str(), Some("service.v1"));
        assert!(value["paths"].as_mapping().is_some_and(|paths| paths.len() >= 12));
    }

    #[tokio::test]
    async fn resolve_endpoint_reports_path_and_confidence() {
        let db_path = unique_temp_db_path();
        let router = app(seeded_state(&db_path));

        let response = send(
            router,
            "POST",
            "/v1/orders/resolve",
            Some(serde_json::json!({"utterance": "ข้าวกะเพราหมู"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        let data = &value["data"];
        assert_eq!(data["path"].as_str(), Some("auto_accept"));
        assert_eq!(data["confidence"].as_u64(), Some(98));
        assert_eq!(data["ruleset_version"].as_str(), Some("resolution.v1"));
        assert_eq!(data["outcome"]["kind"].as_str(), Some("resolved"));
        assert_eq!(data["outcome"]["item"]["name"].as_str(), Some("ข้าวกะเพราหมู"));

        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn place_list_and_update_order_flow() {
        let db_path = unique_temp_db_path();
        let router = app(seeded_state(&db_path));

        let place_response = send(
            router.clone(),
            "POST",
            "/v1/orders",
            Some(serde_json::json!({"utterance": "เอาข้าวกะเพราหมูไข่ดาว"})),
        )
        .await;
        assert_eq!(place_response.status(), StatusCode::OK);
        let place_value = response_json(place_response).await;
        let order_id = place_value["data"]["order_id"]
            .as_str()
            .unwrap_or_else(|| panic!("missing data.order_id in response: {place_value}"))
            .to_string();

        let list_response = send(router.clone(), "GET", "/v1/orders?limit=10", None).await;
        assert_eq!(list_response.status(), StatusCode::OK);
        let list_value = response_json(list_response).await;
        let orders = list_value["data"]
            .as_array()
            .unwrap_or_else(|| panic!("expected data array in response: {list_value}"));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["item_name"].as_str(), Some("ข้าวกะเพราหมู"));
        assert_eq!(orders[0]["total_price"].as_u64(), Some(60));

        let status_response = send(
            router.clone(),
            "POST",
            &format!("/v1/orders/{order_id}/status"),
            Some(serde_json::json!({"status": "completed"})),
        )
        .await;
        assert_eq!(status_response.status(), StatusCode::OK);
        let status_value = response_json(status_response).await;
        assert_eq!(status_value["data"]["status"].as_str(), Some("completed"));

        let filtered_response =
            send(router.clone(), "GET", "/v1/orders?status=completed&limit=10", None).await;
        let filtered_value = response_json(filtered_response).await;
        assert_eq!(filtered_value["data"].as_array().map(Vec::len), Some(1));

        let summary_response = send(router, "GET", "/v1/analytics/summary", None).await;
        let summary_value = response_json(summary_response).await;
        assert_eq!(summary_value["data"]["today"]["orders"].as_u64(), Some(1));
        assert_eq!(summary_value["data"]["today"]["revenue"].as_u64(), Some(60));

        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn menu_set_active_updates_the_snapshot() {
        let db_path = unique_temp_db_path();
        let router = app(seeded_state(&db_path));

        let menu_response = send(router.clone(), "GET", "/v1/menu", None).await;
        assert_eq!(menu_response.status(), StatusCode::OK);
        let menu_value = response_json(menu_response).await;
        let items = menu_value["data"]["items"]
            .as_array()
            .unwrap_or_else(|| panic!("expected data.items array in response: {menu_value}"));
        assert_eq!(items.len(), 49);
        let item_id = items[0]["id"]
            .as_str()
            .unwrap_or_else(|| panic!("missing item id in response: {menu_value}"))
            .to_string();

        let toggle_response = send(
            router.clone(),
            "POST",
            &format!("/v1/menu/{item_id}/active"),
            Some(serde_json::json!({"active": false})),
        )
        .await;
        assert_eq!(toggle_response.status(), StatusCode::OK);
        let toggle_value = response_json(toggle_response).await;
        assert_eq!(toggle_value["data"]["active_items"].as_u64(), Some(48));
        assert_eq!(toggle_value["data"]["inactive_items"].as_u64(), Some(1));

        let full_response = send(router, "GET", "/v1/menu?include_inactive=true", None).await;
        let full_value = response_json(full_response).await;
        assert_eq!(full_value["data"]["items"].as_array().map(Vec::len), Some(49));

        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn malformed_order_id_is_rejected_with_an_error_body() {
        let db_path = unique_temp_db_path();
        let router = app(seeded_state(&db_path));

        let response = send(
            router,
            "POST",
            "/v1/orders/not-a-ulid/status",
            Some(serde_json::json!({"status": "completed"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let value = response_json(response).await;
        assert!(value["error"]
            .as_str()
            .is_some_and(|message| message.contains("invalid ULID")));

        let _ = std::fs::remove_file(&db_path);
    }
}
