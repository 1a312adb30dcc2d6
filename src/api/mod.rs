use axum::{
    Router,
    extract::{Json, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::advisor::GeminiAdvisor;
use crate::config::{
    CliGoalKind, ServeArgs, SimulationArgs, build_simulation_request, default_simulation_args,
};
use crate::core::tracking::{self, summarize};
use crate::core::{
    Etf, InvestmentTheme, PortfolioMonitorData, PortfolioScenario, PurchasePlan, RiskProfile,
    RiskTier, SimulationProjection, SimulationResult, TickerMap, TrackingSummary, plan_purchase,
};
use crate::error::{ApiError, TrackingError};
use crate::planner::{Planner, SimulationOutcome, SimulationRequest};
use crate::store::{AppState, FileStore, ImportReport, KeyValueStore, MemoryStore};

#[derive(Clone)]
pub struct ApiState {
    state: Arc<Mutex<AppState>>,
    planner: Planner,
}

impl ApiState {
    pub fn new(state: AppState, planner: Planner) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            planner,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGoalKind {
    #[serde(alias = "dividend", alias = "targetDividend")]
    TargetDividend,
    #[serde(alias = "asset", alias = "targetAssets")]
    TargetAssets,
    #[serde(alias = "investment", alias = "fixedContribution")]
    FixedContribution,
}

impl From<ApiGoalKind> for CliGoalKind {
    fn from(value: ApiGoalKind) -> Self {
        match value {
            ApiGoalKind::TargetDividend => CliGoalKind::TargetDividend,
            ApiGoalKind::TargetAssets => CliGoalKind::TargetAssets,
            ApiGoalKind::FixedContribution => CliGoalKind::FixedContribution,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    goal: Option<ApiGoalKind>,
    amount: Option<f64>,
    years: Option<u32>,
    inflation_rate: Option<f64>,
    risk_profile: Option<RiskProfile>,
    theme: Option<InvestmentTheme>,
    start_age: Option<u32>,
}

#[derive(Debug)]
struct ApiSimulation {
    request: SimulationRequest,
    start_age: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultResponse {
    #[serde(flatten)]
    result: SimulationResult,
    /// Non-finite amounts serialize as null; this says why.
    reachable: bool,
    projection: SimulationProjection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    results: Vec<ResultResponse>,
    ai_scenario_id: Option<String>,
    notice: Option<String>,
    pool: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogResponse {
    etfs: Vec<Etf>,
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtfPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    pros: String,
    #[serde(default)]
    cons: String,
    #[serde(rename = "yield")]
    dividend_yield: f64,
    growth: f64,
    #[serde(default)]
    risk: RiskTier,
    #[serde(default)]
    category: String,
}

impl EtfPayload {
    fn into_etf(self, ticker: &str) -> Etf {
        Etf {
            ticker: ticker.trim().to_uppercase(),
            name: self.name,
            desc: self.desc,
            pros: self.pros,
            cons: self.cons,
            dividend_yield: self.dividend_yield,
            growth: self.growth,
            risk: self.risk,
            category: self.category,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupPayload {
    ticker: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyPayload {
    #[serde(default)]
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    api_key_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoptPayload {
    scenario: PortfolioScenario,
    monthly_contribution: f64,
    #[serde(default)]
    projection: Option<SimulationProjection>,
}

/// One edit of a tracked record. Amounts are in currency units, weights are
/// percentages and months are 1-based.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
enum EditPayload {
    #[serde(rename_all = "camelCase")]
    Contribution {
        month: usize,
        ticker: String,
        amount: f64,
    },
    #[serde(rename_all = "camelCase")]
    Adjustment { ticker: String, amount: f64 },
    #[serde(rename_all = "camelCase")]
    Weight { ticker: String, weight: f64 },
    #[serde(rename_all = "camelCase")]
    RenameTicker { from: String, to: String },
    AddEtf,
    #[serde(rename_all = "camelCase")]
    RemoveEtf { ticker: String },
    #[serde(rename_all = "camelCase")]
    SelectYear { year: i32 },
    #[serde(rename_all = "camelCase")]
    Details {
        child_name: Option<String>,
        target_monthly_investment: Option<f64>,
        current_total_value: Option<f64>,
        monthly_dividend_received: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchasePayload {
    total_contribution: f64,
    #[serde(default)]
    prices: TickerMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct YearResponse {
    year: i32,
    record: PortfolioMonitorData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedResponse {
    deleted: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    etfs: usize,
    portfolios: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store: Box<dyn KeyValueStore> = if args.ephemeral {
        info!("keeping state in memory only");
        Box::new(MemoryStore::new())
    } else {
        info!("storing state under {}", args.data_dir.display());
        Box::new(FileStore::open(&args.data_dir)?)
    };
    let state = AppState::load(store)?.with_fallback_api_key(args.api_key.clone());
    let advisor = GeminiAdvisor::new(args.model.clone(), args.advisor_timeout());
    let planner = Planner::new(Arc::new(advisor), args.advisor_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let app = router(ApiState::new(state, planner));
    let listener = TcpListener::bind(addr).await?;
    info!("ETF planner API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{}/api/health", args.port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(api: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/etfs", get(list_etfs_handler))
        .route("/api/etfs/reset", post(reset_etfs_handler))
        .route("/api/etfs/lookup", post(lookup_etf_handler))
        .route(
            "/api/etfs/:ticker",
            put(upsert_etf_handler).delete(delete_etf_handler),
        )
        .route("/api/settings", get(settings_handler))
        .route("/api/settings/api-key", put(api_key_handler))
        .route("/api/simulate", post(simulate_handler))
        .route(
            "/api/portfolios",
            get(list_portfolios_handler)
                .post(adopt_handler)
                .delete(reset_portfolios_handler),
        )
        .route("/api/portfolios/export", get(export_handler))
        .route("/api/portfolios/import", post(import_handler))
        .route(
            "/api/portfolios/:id",
            get(get_portfolio_handler)
                .put(replace_portfolio_handler)
                .delete(delete_portfolio_handler),
        )
        .route("/api/portfolios/:id/clone", post(clone_portfolio_handler))
        .route("/api/portfolios/:id/years", post(add_year_handler))
        .route("/api/portfolios/:id/edit", post(edit_portfolio_handler))
        .route("/api/portfolios/:id/summary", get(summary_handler))
        .route(
            "/api/portfolios/:id/purchase-plan",
            post(purchase_plan_handler),
        )
        .fallback(not_found_handler)
        .with_state(api)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn health_handler(State(api): State<ApiState>) -> Response {
    let state = api.state.lock().await;
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            etfs: state.catalog().len(),
            portfolios: state.portfolios().len(),
        },
    )
}

async fn list_etfs_handler(State(api): State<ApiState>) -> Response {
    let state = api.state.lock().await;
    json_response(StatusCode::OK, catalog_response(&state))
}

async fn upsert_etf_handler(
    State(api): State<ApiState>,
    Path(ticker): Path<String>,
    Json(payload): Json<EtfPayload>,
) -> Result<Response, ApiError> {
    let etf = payload.into_etf(&ticker);
    let ticker = etf.ticker.clone();
    let mut state = api.state.lock().await;
    state.upsert_etf(etf)?;
    let stored = state
        .catalog()
        .get(&ticker)
        .cloned()
        .ok_or_else(|| ApiError::Internal(format!("ETF {ticker} was not stored")))?;
    Ok(json_response(StatusCode::OK, stored))
}

async fn delete_etf_handler(
    State(api): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let removed = state.remove_etf(&ticker.trim().to_uppercase())?;
    Ok(json_response(StatusCode::OK, removed))
}

async fn reset_etfs_handler(State(api): State<ApiState>) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    state.reset_catalog()?;
    Ok(json_response(StatusCode::OK, catalog_response(&state)))
}

/// Drafts an entry for an unknown ticker. Nothing is saved; the client
/// reviews the draft and stores it with a PUT.
async fn lookup_etf_handler(
    State(api): State<ApiState>,
    Json(payload): Json<LookupPayload>,
) -> Result<Response, ApiError> {
    let ticker = payload.ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ApiError::BadRequest("ticker must not be empty".to_string()));
    }

    let (api_key, categories) = {
        let state = api.state.lock().await;
        (
            state.api_key().map(str::to_string).unwrap_or_default(),
            state.catalog().categories(),
        )
    };
    let draft = api
        .planner
        .with_timeout(api.planner.advisor().describe_etf(&api_key, &ticker, &categories))
        .await?;
    Ok(json_response(StatusCode::OK, draft))
}

async fn settings_handler(State(api): State<ApiState>) -> Response {
    let state = api.state.lock().await;
    json_response(
        StatusCode::OK,
        SettingsResponse {
            api_key_configured: state.api_key().is_some(),
        },
    )
}

async fn api_key_handler(
    State(api): State<ApiState>,
    Json(payload): Json<ApiKeyPayload>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    state.set_api_key(&payload.api_key)?;
    Ok(json_response(
        StatusCode::OK,
        SettingsResponse {
            api_key_configured: state.api_key().is_some(),
        },
    ))
}

async fn simulate_handler(
    State(api): State<ApiState>,
    Json(payload): Json<SimulatePayload>,
) -> Result<Response, ApiError> {
    let simulation = api_simulation_from_payload(payload)?;

    let (catalog, api_key) = {
        let state = api.state.lock().await;
        (state.catalog().clone(), state.api_key().map(str::to_string))
    };
    let mut rng = StdRng::from_entropy();
    let outcome = api
        .planner
        .simulate(api_key.as_deref(), &catalog, &simulation.request, &mut rng)
        .await?;

    Ok(json_response(
        StatusCode::OK,
        build_simulate_response(outcome, simulation.start_age),
    ))
}

async fn list_portfolios_handler(State(api): State<ApiState>) -> Response {
    let state = api.state.lock().await;
    json_response(StatusCode::OK, state.portfolios())
}

async fn get_portfolio_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let state = api.state.lock().await;
    Ok(json_response(StatusCode::OK, state.portfolio(&id)?))
}

async fn adopt_handler(
    State(api): State<ApiState>,
    Json(payload): Json<AdoptPayload>,
) -> Result<Response, ApiError> {
    validate_adoption(&payload)?;
    let mut state = api.state.lock().await;
    let record = state.adopt(
        payload.scenario,
        payload.monthly_contribution,
        payload.projection,
    )?;
    Ok(json_response(StatusCode::CREATED, record))
}

async fn reset_portfolios_handler(State(api): State<ApiState>) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let deleted = state.portfolios().len();
    state.reset_portfolios()?;
    Ok(json_response(StatusCode::OK, DeletedResponse { deleted }))
}

async fn replace_portfolio_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let record = state.replace_portfolio(&id, &raw)?;
    Ok(json_response(StatusCode::OK, record))
}

async fn delete_portfolio_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    state.delete_portfolio(&id)?;
    Ok(json_response(StatusCode::OK, DeletedResponse { deleted: 1 }))
}

async fn clone_portfolio_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let copy = state.clone_portfolio(&id)?;
    Ok(json_response(StatusCode::CREATED, copy))
}

async fn add_year_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let (year, record) =
        state.update_portfolio(&id, |record| Ok(tracking::add_tracking_year(record)))?;
    Ok(json_response(StatusCode::OK, YearResponse { year, record }))
}

async fn edit_portfolio_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
    Json(edit): Json<EditPayload>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let catalog = state.catalog().clone();
    let ((), record) = state.update_portfolio(&id, |record| apply_edit(record, edit, &catalog))?;
    Ok(json_response(StatusCode::OK, record))
}

async fn summary_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let state = api.state.lock().await;
    let summary: TrackingSummary = summarize(state.portfolio(&id)?);
    Ok(json_response(StatusCode::OK, summary))
}

async fn purchase_plan_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<PurchasePayload>,
) -> Result<Response, ApiError> {
    if !payload.total_contribution.is_finite() || payload.total_contribution < 0.0 {
        return Err(ApiError::BadRequest(
            "totalContribution must be >= 0".to_string(),
        ));
    }
    let state = api.state.lock().await;
    let record = state.portfolio(&id)?;
    let plan: PurchasePlan = plan_purchase(
        &record.portfolio,
        payload.total_contribution,
        &payload.prices,
    );
    Ok(json_response(StatusCode::OK, plan))
}

async fn export_handler(State(api): State<ApiState>) -> Result<Response, ApiError> {
    let state = api.state.lock().await;
    let body = state.export_portfolios()?;
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"portfolios.json\"",
            ),
        ],
        body,
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

async fn import_handler(
    State(api): State<ApiState>,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let mut state = api.state.lock().await;
    let report: ImportReport = state.import_portfolios(&raw)?;
    info!(
        "imported {} portfolios, skipped {}",
        report.imported, report.skipped
    );
    Ok(json_response(StatusCode::OK, report))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }
        error_response(status, &self.to_string())
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn catalog_response(state: &AppState) -> CatalogResponse {
    CatalogResponse {
        etfs: state.catalog().to_vec(),
        categories: state.catalog().categories(),
    }
}

#[cfg(test)]
fn api_simulation_from_json(json: &str) -> Result<ApiSimulation, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_simulation_from_payload(payload)
}

fn api_simulation_from_payload(payload: SimulatePayload) -> Result<ApiSimulation, String> {
    let mut args: SimulationArgs = default_simulation_args();

    if let Some(v) = payload.goal {
        args.goal = v.into();
    }
    if let Some(v) = payload.amount {
        args.amount = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.risk_profile {
        args.risk_profile = v.into();
    }
    if let Some(v) = payload.theme {
        args.theme = v.into();
    }

    let request = build_simulation_request(args).map_err(|msg| to_payload_key(&msg))?;
    Ok(ApiSimulation {
        request,
        start_age: payload.start_age,
    })
}

/// Rewrites a `--flag-name` message in terms of the JSON key `flagName`.
fn to_payload_key(msg: &str) -> String {
    let Some(rest) = msg.strip_prefix("--") else {
        return msg.to_string();
    };
    let (flag, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    let mut key = String::with_capacity(flag.len());
    let mut upper = false;
    for c in flag.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            key.extend(c.to_uppercase());
            upper = false;
        } else {
            key.push(c);
        }
    }
    if tail.is_empty() {
        key
    } else {
        format!("{key} {tail}")
    }
}

fn validate_adoption(payload: &AdoptPayload) -> Result<(), ApiError> {
    if !payload.monthly_contribution.is_finite() || payload.monthly_contribution < 0.0 {
        return Err(ApiError::BadRequest(
            "monthlyContribution must be a finite amount >= 0".to_string(),
        ));
    }
    if payload.scenario.weights.is_empty() {
        return Err(ApiError::BadRequest(
            "scenario must hold at least one ETF".to_string(),
        ));
    }
    Ok(())
}

fn apply_edit(
    record: &mut PortfolioMonitorData,
    edit: EditPayload,
    catalog: &crate::core::EtfCatalog,
) -> Result<(), TrackingError> {
    match edit {
        EditPayload::Contribution {
            month,
            ticker,
            amount,
        } => {
            let index = month
                .checked_sub(1)
                .ok_or(TrackingError::MonthOutOfRange(month))?;
            tracking::set_monthly_contribution(record, index, &ticker, amount)
        }
        EditPayload::Adjustment { ticker, amount } => {
            tracking::set_yearly_adjustment(record, &ticker, amount)
        }
        EditPayload::Weight { ticker, weight } => {
            tracking::set_weight(record, &ticker, weight / 100.0)
        }
        EditPayload::RenameTicker { from, to } => tracking::rename_ticker(record, &from, &to),
        EditPayload::AddEtf => tracking::add_etf(record, catalog).map(|_| ()),
        EditPayload::RemoveEtf { ticker } => tracking::remove_etf(record, &ticker),
        EditPayload::SelectYear { year } => tracking::select_tracking_year(record, year),
        EditPayload::Details {
            child_name,
            target_monthly_investment,
            current_total_value,
            monthly_dividend_received,
        } => {
            let amounts = [
                target_monthly_investment,
                current_total_value,
                monthly_dividend_received,
            ];
            if amounts.iter().flatten().any(|v| !v.is_finite()) {
                return Err(TrackingError::NonFiniteAmount);
            }
            if let Some(name) = child_name {
                record.child_name = name.trim().to_string();
            }
            if let Some(v) = target_monthly_investment {
                record.target_monthly_investment = v;
            }
            if let Some(v) = current_total_value {
                record.current_total_value = v;
            }
            if let Some(v) = monthly_dividend_received {
                record.monthly_dividend_received = v;
            }
            Ok(())
        }
    }
}

fn build_simulate_response(outcome: SimulationOutcome, start_age: Option<u32>) -> SimulateResponse {
    SimulateResponse {
        results: outcome
            .results
            .into_iter()
            .map(|result| ResultResponse {
                reachable: !result.is_unreachable(),
                projection: result.projection(start_age),
                result,
            })
            .collect(),
        ai_scenario_id: outcome.ai_scenario_id,
        notice: outcome.notice,
        pool: outcome.pool,
    }
}
