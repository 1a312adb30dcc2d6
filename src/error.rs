//! Error types shared across the planner.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("portfolio record is not a JSON object")]
    NotAnObject,

    #[error("portfolio record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("portfolio record field `{field}` is malformed: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl MigrationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("scenario references tickers missing from the ETF catalog: {}", .0.join(", "))]
    UnknownTickers(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("ETF {0} has a non-finite yield or growth rate")]
    InvalidRates(String),

    #[error("ETF {0} is not in the catalog")]
    UnknownTicker(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("tracking record {0} not found")]
    UnknownRecord(String),

    #[error("ticker {0} is not part of the portfolio")]
    UnknownTicker(String),

    #[error("ticker {0} is already part of the portfolio")]
    DuplicateTicker(String),

    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("weight for {0} must be a non-negative number")]
    InvalidWeight(String),

    #[error("no catalog ETF left to add to the portfolio")]
    NoTickerAvailable,

    #[error("month index {0} is out of range (expected 0..12)")]
    MonthOutOfRange(usize),

    #[error("year {0} is not tracked")]
    UnknownYear(i32),

    #[error("portfolio weights must sum to 100% (currently {0:.1}%)")]
    WeightSum(f64),

    #[error("amount must be a finite number")]
    NonFiniteAmount,
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("no API key configured for the portfolio advisor")]
    MissingApiKey,

    #[error("advisor request failed: {0}")]
    Http(String),

    #[error("advisor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("advisor returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("advisor proposed no tickers from the provided ETF pool")]
    NoUsableTickers,

    #[error("advisor did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("an API key is required to generate an AI portfolio")]
    MissingApiKey,

    #[error("ETF data has not been loaded")]
    EmptyCatalog,

    #[error("only {0} ETFs match the selected theme; at least 4 are needed to build a portfolio")]
    InsufficientPool(usize),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// What an HTTP handler reports. Each variant maps to one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    GatewayTimeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::UnknownRecord(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownTicker(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Store(err) => ApiError::Internal(err.to_string()),
            StateError::Catalog(err) => err.into(),
            StateError::Tracking(err) => err.into(),
            StateError::Migration(err) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<AdvisorError> for ApiError {
    fn from(err: AdvisorError) -> Self {
        match err {
            AdvisorError::MissingApiKey => ApiError::BadRequest(err.to_string()),
            AdvisorError::Timeout(_) => ApiError::GatewayTimeout(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<String> for ApiError {
    fn from(msg: String) -> Self {
        ApiError::BadRequest(msg)
    }
}
