mod catalog;
mod curation;
mod engine;
mod migrate;
mod purchase;
mod ranking;
pub mod tracking;
mod types;

pub use catalog::{EtfCatalog, category};
pub use curation::{MAX_POOL_SIZE, TierQuota, curate, sample_by_risk, tier_quota};
pub use engine::{
    BlendedRates, DIVIDEND_TAX_RATE, ProjectionOptions, UnknownTickerPolicy, WEIGHT_SUM_TOLERANCE,
    annuity_factor, blended_rates, normalized_weights, project, project_with, unknown_tickers,
};
pub use migrate::{
    DEFAULT_CHILD_NAME, LEGACY_FIELDS, migrate, migrate_for_year, new_tracking_history,
};
pub use purchase::{PurchaseLine, PurchasePlan, plan_purchase};
pub use ranking::{candidate_scenarios, fallback_scenario, fallback_scenarios, rank_results};
pub use tracking::{AllocationRow, DriftBand, TrackingSummary};
pub use types::{
    Etf, InvestmentTheme, MonthlyEntry, PortfolioMonitorData, PortfolioScenario, RiskProfile,
    RiskTier, SimulationGoal, SimulationProjection, SimulationResult, TickerMap,
};
