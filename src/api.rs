// 🌐 HTTP API - JSON over axum for the web dashboard
//
// Every response uses the {success, data, error} envelope, including
// malformed bodies and query strings rejected by the extractors. One SQLite
// connection is shared behind a mutex; handlers hold the lock only for the
// duration of a single engine call.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::aggregator::{DistributionSlice, Granularity, TrendPoint};
use crate::config::AppConfig;
use crate::dashboard::{resolve_window, DashboardSnapshot, PlatformStats};
use crate::db::SqliteStore;
use crate::error::CarbonError;
use crate::ingest::submit_emission;
use crate::ledger::LedgerSummary;
use crate::models::{
    Company, CreditTransaction, DateRange, EmissionRecord, EmissionSubmission, RatingAssessment,
    SubScores, TransactionKind,
};
use crate::rating::{RatingEngine, RatingSummary};
use crate::store::RecordStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<SqliteStore>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: SqliteStore, config: AppConfig) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
        self.store.lock().map_err(|_| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "record store lock poisoned".to_string(),
        })
    }
}

// ============================================================================
// Envelope & errors
// ============================================================================

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<CarbonError> for ApiError {
    fn from(err: CarbonError) -> Self {
        let status = match &err {
            CarbonError::NotFound { .. } => StatusCode::NOT_FOUND,
            CarbonError::InvalidStateTransition { .. } | CarbonError::Duplicate(_) => {
                StatusCode::CONFLICT
            }
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub granularity: Option<String>,
}

impl WindowQuery {
    fn window(&self) -> Result<DateRange, ApiError> {
        Ok(resolve_window(self.from, self.to, Utc::now().date_naive())?)
    }
}

#[derive(Debug, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub industry: String,
    pub location: String,
    #[serde(default)]
    pub registration_number: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub credits: f64,
    /// Defaults to the configured market price
    pub price_per_credit: Option<f64>,
    pub transaction_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct NewAssessment {
    pub knowledge: f64,
    pub compliance: f64,
    pub reduction: f64,
    pub assessment_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub window: DateRange,
    pub granularity: Granularity,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub window: DateRange,
    pub total: f64,
    pub slices: Vec<DistributionSlice>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/companies
async fn list_companies(State(state): State<AppState>) -> ApiResult<Vec<Company>> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(store.list_companies()?)))
}

/// POST /api/companies
async fn create_company(
    State(state): State<AppState>,
    body: Result<Json<NewCompany>, JsonRejection>,
) -> Created<Company> {
    let Json(input) = body?;
    let mut company = Company::new(&input.name, &input.industry, &input.location);
    company.registration_number = input.registration_number;
    company.contact_email = input.contact_email;
    company.contact_phone = input.contact_phone;

    let mut store = state.store()?;
    created(store.insert_company(&company)?)
}

/// GET /api/companies/:id/emissions/trend?from&to&granularity
async fn emissions_trend(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<TrendResponse> {
    let Query(query) = query?;
    let window = query.window()?;
    let mut aggregator = state.config.aggregator();
    if let Some(raw) = &query.granularity {
        aggregator.granularity = raw.parse::<Granularity>().map_err(|message| ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message,
        })?;
    }

    let store = state.store()?;
    let summary = aggregator.summarize(&*store, &company_id, &window)?;

    Ok(Json(ApiResponse::ok(TrendResponse {
        window,
        granularity: summary.granularity,
        points: summary.trend_points(),
    })))
}

/// GET /api/companies/:id/emissions/distribution?from&to
async fn emissions_distribution(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<DistributionResponse> {
    let Query(query) = query?;
    let window = query.window()?;

    let store = state.store()?;
    let summary = state
        .config
        .aggregator()
        .summarize(&*store, &company_id, &window)?;

    Ok(Json(ApiResponse::ok(DistributionResponse {
        window,
        total: summary.total,
        slices: summary.distribution,
    })))
}

/// POST /api/companies/:id/emissions
async fn create_emission(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    body: Result<Json<EmissionSubmission>, JsonRejection>,
) -> Created<EmissionRecord> {
    let Json(submission) = body?;
    let mut store = state.store()?;
    created(submit_emission(&mut *store, &company_id, &submission)?)
}

/// GET /api/companies/:id/ledger
async fn ledger_summary(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<LedgerSummary> {
    let store = state.store()?;
    let summary = state.config.ledger().summary(&*store, &company_id)?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/companies/:id/transactions
async fn list_transactions(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<Vec<CreditTransaction>> {
    let store = state.store()?;
    let history = state.config.ledger().history(&*store, &company_id)?;
    Ok(Json(ApiResponse::ok(history)))
}

/// POST /api/companies/:id/transactions
async fn record_transaction(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    body: Result<Json<NewTransaction>, JsonRejection>,
) -> Created<CreditTransaction> {
    let Json(input) = body?;
    let ledger = state.config.ledger();
    let price = input
        .price_per_credit
        .unwrap_or(ledger.market().price_per_credit);
    let date = input
        .transaction_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let mut store = state.store()?;
    created(ledger.record_transaction(&mut *store, &company_id, input.kind, input.credits, price, date)?)
}

/// POST /api/transactions/:id/settle
async fn settle_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<CreditTransaction> {
    let mut store = state.store()?;
    let tx = state.config.ledger().settle(&mut *store, &transaction_id)?;
    Ok(Json(ApiResponse::ok(tx)))
}

/// POST /api/transactions/:id/cancel
async fn cancel_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<CreditTransaction> {
    let mut store = state.store()?;
    let tx = state.config.ledger().cancel(&mut *store, &transaction_id)?;
    Ok(Json(ApiResponse::ok(tx)))
}

/// GET /api/companies/:id/rating - data is null before the first assessment
async fn rating_summary(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<Option<RatingSummary>> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(RatingEngine::summary(&*store, &company_id)?)))
}

/// POST /api/companies/:id/assessments
async fn create_assessment(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    body: Result<Json<NewAssessment>, JsonRejection>,
) -> Created<RatingAssessment> {
    let Json(input) = body?;
    let engine = state.config.rating_engine()?;
    let scores = SubScores {
        knowledge: input.knowledge,
        compliance: input.compliance,
        reduction: input.reduction,
    };
    let date = input
        .assessment_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let mut store = state.store()?;
    created(engine.assess(&mut *store, &company_id, scores, date, input.notes)?)
}

/// GET /api/companies/:id/dashboard?from&to
async fn dashboard(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<DashboardSnapshot> {
    let Query(query) = query?;
    let window = query.window()?;
    let store = state.store()?;
    let snapshot = DashboardSnapshot::build(&*store, &state.config, &company_id, &window)?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

/// GET /api/platform/stats - totals across every registered company
async fn platform_stats(State(state): State<AppState>) -> ApiResult<PlatformStats> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(PlatformStats::build(&*store, &state.config)?)))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/platform/stats", get(platform_stats))
        .route("/companies", get(list_companies).post(create_company))
        .route("/companies/:id/emissions", post(create_emission))
        .route("/companies/:id/emissions/trend", get(emissions_trend))
        .route("/companies/:id/emissions/distribution", get(emissions_distribution))
        .route("/companies/:id/ledger", get(ledger_summary))
        .route(
            "/companies/:id/transactions",
            get(list_transactions).post(record_transaction),
        )
        .route("/transactions/:id/settle", post(settle_transaction))
        .route("/transactions/:id/cancel", post(cancel_transaction))
        .route("/companies/:id/rating", get(rating_summary))
        .route("/companies/:id/assessments", post(create_assessment))
        .route("/companies/:id/dashboard", get(dashboard));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(SqliteStore::open_in_memory().unwrap(), AppConfig::default())
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let raw = body.map(|json| json.to_string()).unwrap_or_default();
        call_raw(state, method, uri, raw).await
    }

    async fn call_raw(state: &AppState, method: &str, uri: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn register(state: &AppState) -> String {
        let (status, body) = call(
            state,
            "POST",
            "/api/companies",
            Some(json!({ "name": "Acme Industries Ltd.", "industry": "Textiles", "location": "Indore" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&test_state(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_emissions_trend_and_distribution() {
        let state = test_state();
        let id = register(&state).await;

        for (date, amount) in [("2025-01-03", 40), ("2025-01-14", 35), ("2025-01-28", 45)] {
            let (status, _) = call(
                &state,
                "POST",
                &format!("/api/companies/{}/emissions", id),
                Some(json!({ "date": date, "pollutant": "CO2", "amount": amount, "source": "Boiler" })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        // A second reading that matches the first one is still counted
        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/emissions", id),
            Some(json!({ "date": "2025-01-03", "pollutant": "CO2", "amount": 40, "source": "Boiler", "notes": "evening" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);

        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/emissions", id),
            Some(json!({ "date": "2025-01-05", "pollutant": "Ozone", "amount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/companies/{}/emissions/trend?from=2025-01-01&to=2025-02-28", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let points = body["data"]["points"].as_array().unwrap();
        assert_eq!(points.len(), 2 * 6);
        assert_eq!(points[0]["period"], "2025-01");
        assert_eq!(points[0]["pollutant"], "CO2");
        assert_eq!(points[0]["total"], 160.0);

        let (status, _) = call(
            &state,
            "GET",
            &format!("/api/companies/{}/emissions/trend?from=2025-01-01&to=2025-02-28&granularity=weekly", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = call(
            &state,
            "GET",
            &format!("/api/companies/{}/emissions/distribution?from=2025-01-01&to=2025-01-31", id),
            None,
        )
        .await;
        assert_eq!(body["data"]["total"], 160.0);
        assert_eq!(body["data"]["slices"][0]["share"], 1.0);
    }

    #[tokio::test]
    async fn test_transaction_lifecycle() {
        let state = test_state();
        let id = register(&state).await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/transactions", id),
            Some(json!({ "kind": "purchase", "credits": 10, "transaction_date": "2025-03-10" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["total_amount"], 25000.0);
        let tx_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&state, "POST", &format!("/api/transactions/{}/settle", tx_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");

        let (status, body) = call(&state, "POST", &format!("/api/transactions/{}/cancel", tx_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("completed"));

        let (_, body) = call(&state, "GET", &format!("/api/companies/{}/ledger", id), None).await;
        assert_eq!(body["data"]["balance"], 10.0);
        assert_eq!(body["data"]["marketPrice"], 2500.0);

        let (_, body) = call(&state, "GET", &format!("/api/companies/{}/transactions", id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rating_and_dashboard() {
        let state = test_state();
        let id = register(&state).await;

        let (status, body) = call(&state, "GET", &format!("/api/companies/{}/rating", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());

        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/assessments", id),
            Some(json!({ "knowledge": 85, "compliance": 90, "reduction": 80, "assessment_date": "2025-06-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["grade"], "B+");

        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/assessments", id),
            Some(json!({ "knowledge": 120, "compliance": 90, "reduction": 80 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = call(&state, "GET", &format!("/api/companies/{}/rating", id), None).await;
        assert_eq!(body["data"]["overall"], 85.0);
        assert_eq!(body["data"]["percentile"]["rank"], 1);

        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/companies/{}/dashboard?from=2025-01-01&to=2025-06-30", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["overview"]["grade"], "B+");
        assert_eq!(body["data"]["emissions"]["buckets"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_entities_are_not_found() {
        let state = test_state();

        let (status, body) = call(&state, "GET", "/api/companies/ghost/ledger", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(&state, "POST", "/api/transactions/ghost/settle", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, "GET", "/api/companies/ghost/dashboard", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&state, "GET", "/api/companies/ghost/rating", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_rejected_input_keeps_envelope() {
        let state = test_state();
        let id = register(&state).await;

        // Not JSON at all
        let (status, body) = call_raw(
            &state,
            "POST",
            &format!("/api/companies/{}/transactions", id),
            "{ credits: ten".to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());

        // Valid JSON missing a required field
        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/emissions", id),
            Some(json!({ "date": "2025-01-03", "amount": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("pollutant"));

        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/companies/{}/dashboard?from=last-spring", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_platform_stats() {
        let state = test_state();

        let (status, body) = call(&state, "GET", "/api/platform/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registeredCompanies"], 0);

        let id = register(&state).await;
        call(
            &state,
            "POST",
            &format!("/api/companies/{}/emissions", id),
            Some(json!({ "date": "2025-02-03", "pollutant": "CO2", "amount": 1500, "unit": "kg" })),
        )
        .await;
        let (_, body) = call(
            &state,
            "POST",
            &format!("/api/companies/{}/transactions", id),
            Some(json!({ "kind": "sale", "credits": 4, "transaction_date": "2025-03-10" })),
        )
        .await;
        let tx_id = body["data"]["id"].as_str().unwrap().to_string();
        call(&state, "POST", &format!("/api/transactions/{}/settle", tx_id), None).await;

        let (status, body) = call(&state, "GET", "/api/platform/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registeredCompanies"], 1);
        assert_eq!(body["data"]["co2Tracked"], 1.5);
        assert_eq!(body["data"]["creditsTraded"]["credits"], 4.0);
        assert_eq!(body["data"]["creditsTraded"]["value"], 10000.0);
        assert_eq!(body["data"]["currency"], "INR");
    }
}
