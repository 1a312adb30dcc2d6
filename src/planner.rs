//! One simulation run: curate a pool, ask the advisor, score every candidate
//! scenario and rank the results.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use rand::Rng;
use serde::Serialize;

use crate::advisor::{AdvisorRequest, PortfolioAdvisor, sanitize_proposal};
use crate::core::{
    Etf, EtfCatalog, InvestmentTheme, PortfolioScenario, RiskProfile, SimulationGoal,
    SimulationResult, candidate_scenarios, curate, project, rank_results, unknown_tickers,
};
use crate::error::{AdvisorError, PlannerError};

/// Smallest pool the advisor can build a portfolio from.
pub const MIN_POOL_SIZE: usize = 4;

pub const DEFAULT_ADVISOR_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    pub goal: SimulationGoal,
    pub horizon_years: u32,
    /// Annual inflation as a fraction.
    pub annual_inflation_rate: f64,
    pub profile: RiskProfile,
    pub theme: InvestmentTheme,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub results: Vec<SimulationResult>,
    pub ai_scenario_id: Option<String>,
    /// Set when the advisor failed and only the fixed scenarios were scored.
    pub notice: Option<String>,
    pub pool: Vec<String>,
}

/// Themed requests are curated as aggressive; only the open-ended theme
/// uses the investor's own profile.
pub fn effective_profile(profile: RiskProfile, theme: InvestmentTheme) -> RiskProfile {
    match theme {
        InvestmentTheme::AiRecommended => profile,
        _ => RiskProfile::Aggressive,
    }
}

pub fn prepare_pool<R: Rng + ?Sized>(
    catalog: &EtfCatalog,
    profile: RiskProfile,
    theme: InvestmentTheme,
    rng: &mut R,
) -> Result<Vec<Etf>, PlannerError> {
    if catalog.is_empty() {
        return Err(PlannerError::EmptyCatalog);
    }
    let pool = curate(
        &catalog.to_vec(),
        effective_profile(profile, theme),
        theme,
        rng,
    );
    if pool.len() < MIN_POOL_SIZE {
        return Err(PlannerError::InsufficientPool(pool.len()));
    }
    Ok(pool)
}

pub fn score_scenarios(
    scenarios: &[PortfolioScenario],
    request: &SimulationRequest,
    catalog: &EtfCatalog,
    ai_scenario_id: Option<&str>,
) -> Vec<SimulationResult> {
    let mut results: Vec<SimulationResult> = scenarios
        .iter()
        .map(|scenario| {
            let missing = unknown_tickers(scenario, catalog);
            if !missing.is_empty() {
                warn!(
                    "scenario {} holds tickers missing from the catalog: {}",
                    scenario.id,
                    missing.join(", ")
                );
            }
            project(
                request.goal,
                request.horizon_years,
                scenario,
                catalog,
                request.annual_inflation_rate,
            )
        })
        .collect();
    rank_results(&mut results, ai_scenario_id, request.profile);
    results
}

/// Scores only the fixed scenarios. Used when no advisor is available.
pub fn simulate_offline(request: &SimulationRequest, catalog: &EtfCatalog) -> SimulationOutcome {
    SimulationOutcome {
        results: score_scenarios(&candidate_scenarios(None), request, catalog, None),
        ai_scenario_id: None,
        notice: None,
        pool: Vec::new(),
    }
}

#[derive(Clone)]
pub struct Planner {
    advisor: Arc<dyn PortfolioAdvisor>,
    timeout: Duration,
}

impl Planner {
    pub fn new(advisor: Arc<dyn PortfolioAdvisor>, timeout: Duration) -> Self {
        Self { advisor, timeout }
    }

    pub fn advisor(&self) -> &dyn PortfolioAdvisor {
        self.advisor.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn with_timeout<T, F>(&self, call: F) -> Result<T, AdvisorError>
    where
        F: std::future::Future<Output = Result<T, AdvisorError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(AdvisorError::Timeout(self.timeout)))
    }

    pub async fn simulate<R: Rng + Send + ?Sized>(
        &self,
        api_key: Option<&str>,
        catalog: &EtfCatalog,
        request: &SimulationRequest,
        rng: &mut R,
    ) -> Result<SimulationOutcome, PlannerError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(PlannerError::MissingApiKey)?;
        let pool = prepare_pool(catalog, request.profile, request.theme, rng)?;
        info!(
            "simulating {} over {} years with a pool of {} ETFs",
            request.theme.as_str(),
            request.horizon_years,
            pool.len()
        );

        let advisor_request = AdvisorRequest {
            api_key: api_key.to_string(),
            profile: request.profile,
            theme: request.theme,
            pool,
        };
        let proposal = self
            .with_timeout(self.advisor.propose_portfolio(&advisor_request))
            .await;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let ai_scenario = proposal.and_then(|proposal| {
            sanitize_proposal(
                proposal,
                &advisor_request.pool,
                request.profile,
                request.theme,
                timestamp,
            )
        });

        let (ai_scenario, notice) = match ai_scenario {
            Ok(scenario) => (Some(scenario), None),
            Err(err) => {
                warn!("advisor failed, falling back to default scenarios: {err}");
                let notice = format!(
                    "AI portfolio generation failed ({err}). Showing the default scenarios instead."
                );
                (None, Some(notice))
            }
        };

        let ai_scenario_id = ai_scenario.as_ref().map(|s| s.id.clone());
        let scenarios = candidate_scenarios(ai_scenario.as_ref());
        Ok(SimulationOutcome {
            results: score_scenarios(&scenarios, request, catalog, ai_scenario_id.as_deref()),
            ai_scenario_id,
            notice,
            pool: advisor_request.pool.into_iter().map(|etf| etf.ticker).collect(),
        })
    }
}
