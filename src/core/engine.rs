use super::catalog::EtfCatalog;
use super::types::{PortfolioScenario, SimulationGoal, SimulationResult, TickerMap};
use crate::error::ProjectionError;

pub const DIVIDEND_TAX_RATE: f64 = 0.154;

/// Relative drift from a unit weight sum that is tolerated before weights are
/// rescaled.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum UnknownTickerPolicy {
    /// Tickers missing from the catalog contribute zero yield and growth.
    #[default]
    Ignore,
    /// Tickers missing from the catalog fail the projection.
    Reject,
}

#[derive(Copy, Clone, Debug)]
pub struct ProjectionOptions {
    pub unknown_tickers: UnknownTickerPolicy,
    pub dividend_tax_rate: f64,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            unknown_tickers: UnknownTickerPolicy::Ignore,
            dividend_tax_rate: DIVIDEND_TAX_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendedRates {
    pub dividend_yield: f64,
    pub total_return: f64,
}

/// Weighted yield and total return. Weights are used as given, so a scenario
/// whose weights sum to 0.9 projects 90% of the blended rates.
pub fn blended_rates(scenario: &PortfolioScenario, catalog: &EtfCatalog) -> BlendedRates {
    let mut dividend_yield = 0.0;
    let mut total_return = 0.0;
    for (ticker, weight) in &scenario.weights {
        if let Some(etf) = catalog.get(ticker) {
            dividend_yield += weight * etf.dividend_yield;
            total_return += weight * etf.total_return();
        }
    }
    BlendedRates {
        dividend_yield,
        total_return,
    }
}

pub fn unknown_tickers(scenario: &PortfolioScenario, catalog: &EtfCatalog) -> Vec<String> {
    scenario
        .weights
        .keys()
        .filter(|ticker| !catalog.contains(ticker))
        .cloned()
        .collect()
}

/// Rescales weights to sum to one when they drift by more than
/// [`WEIGHT_SUM_TOLERANCE`]. Weights summing to zero are returned unchanged.
pub fn normalized_weights(weights: &TickerMap) -> TickerMap {
    let total: f64 = weights.values().sum();
    if total <= 0.0 || (total - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
        return weights.clone();
    }
    weights
        .iter()
        .map(|(ticker, weight)| (ticker.clone(), weight / total))
        .collect()
}

/// Future value of a level contribution paid at the end of each of `months`
/// periods at `monthly_rate`.
pub fn annuity_factor(monthly_rate: f64, months: u32) -> f64 {
    if monthly_rate != 0.0 {
        ((1.0 + monthly_rate).powi(months as i32) - 1.0) / monthly_rate
    } else {
        months as f64
    }
}

pub fn project(
    goal: SimulationGoal,
    horizon_years: u32,
    scenario: &PortfolioScenario,
    catalog: &EtfCatalog,
    annual_inflation_rate: f64,
) -> SimulationResult {
    let rates = blended_rates(scenario, catalog);
    run_projection(
        goal,
        horizon_years,
        scenario,
        rates,
        annual_inflation_rate,
        DIVIDEND_TAX_RATE,
    )
}

pub fn project_with(
    goal: SimulationGoal,
    horizon_years: u32,
    scenario: &PortfolioScenario,
    catalog: &EtfCatalog,
    annual_inflation_rate: f64,
    options: &ProjectionOptions,
) -> Result<SimulationResult, ProjectionError> {
    if options.unknown_tickers == UnknownTickerPolicy::Reject {
        let missing = unknown_tickers(scenario, catalog);
        if !missing.is_empty() {
            return Err(ProjectionError::UnknownTickers(missing));
        }
    }
    let rates = blended_rates(scenario, catalog);
    Ok(run_projection(
        goal,
        horizon_years,
        scenario,
        rates,
        annual_inflation_rate,
        options.dividend_tax_rate,
    ))
}

fn run_projection(
    goal: SimulationGoal,
    horizon_years: u32,
    scenario: &PortfolioScenario,
    rates: BlendedRates,
    annual_inflation_rate: f64,
    dividend_tax_rate: f64,
) -> SimulationResult {
    let post_tax_yield = rates.dividend_yield * (1.0 - dividend_tax_rate);
    let months = horizon_years * 12;
    let monthly_rate = rates.total_return / 12.0;
    let fva = annuity_factor(monthly_rate, months);
    let inflation_index = (1.0 + annual_inflation_rate).powi(horizon_years as i32);

    let required_terminal_assets = match goal {
        SimulationGoal::FixedContribution { .. } => None,
        SimulationGoal::TargetDividend { amount } => {
            let annual_dividend = amount * inflation_index * 12.0;
            Some(if post_tax_yield > 0.0 {
                annual_dividend / post_tax_yield
            } else {
                f64::INFINITY
            })
        }
        SimulationGoal::TargetAssets { amount } => Some(amount * inflation_index),
    };

    if required_terminal_assets.is_some_and(|assets| !assets.is_finite()) {
        return SimulationResult {
            scenario: scenario.clone(),
            period_years: horizon_years,
            monthly_contribution: f64::INFINITY,
            required_terminal_assets: f64::INFINITY,
            blended_yield: rates.dividend_yield,
            blended_total_return: rates.total_return,
            post_tax_yield,
            asset_growth: Vec::new(),
            dividend_growth: Vec::new(),
            terminal_assets: f64::INFINITY,
            terminal_monthly_dividend: 0.0,
            inflation_adjusted_terminal_assets: f64::INFINITY,
            inflation_adjusted_monthly_dividend: 0.0,
        };
    }

    let monthly_contribution = match (goal, required_terminal_assets) {
        (SimulationGoal::FixedContribution { amount }, _) => amount,
        (_, Some(required)) => {
            let contribution = if fva > 0.0 { required / fva } else { 0.0 };
            contribution.max(0.0)
        }
        (_, None) => 0.0,
    };

    let mut asset_growth = Vec::with_capacity(months as usize + 1);
    let mut dividend_growth = Vec::with_capacity(months as usize + 1);
    let mut assets = 0.0;
    for month in 0..=months {
        if month > 0 {
            assets = assets * (1.0 + monthly_rate) + monthly_contribution;
        }
        asset_growth.push(assets);
        dividend_growth.push(assets * post_tax_yield / 12.0);
    }

    let terminal_assets = assets;
    let terminal_monthly_dividend = dividend_growth.last().copied().unwrap_or(0.0);

    SimulationResult {
        scenario: scenario.clone(),
        period_years: horizon_years,
        monthly_contribution,
        required_terminal_assets: required_terminal_assets.unwrap_or(terminal_assets),
        blended_yield: rates.dividend_yield,
        blended_total_return: rates.total_return,
        post_tax_yield,
        asset_growth,
        dividend_growth,
        terminal_assets,
        terminal_monthly_dividend,
        inflation_adjusted_terminal_assets: terminal_assets / inflation_index,
        inflation_adjusted_monthly_dividend: terminal_monthly_dividend / inflation_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Etf, RiskTier};
    use proptest::prelude::{prop_assert, proptest};
    use std::collections::BTreeMap;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_rel(actual: f64, expected: f64, rel: f64) {
        assert!(
            (actual - expected).abs() <= expected.abs() * rel,
            "expected {expected}, got {actual}, relative tolerance {rel}"
        );
    }

    fn etf(ticker: &str, dividend_yield: f64, growth: f64) -> Etf {
        Etf {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            desc: String::new(),
            pros: String::new(),
            cons: String::new(),
            dividend_yield,
            growth,
            risk: RiskTier::Neutral,
            category: String::new(),
        }
    }

    fn catalog_of(etfs: &[Etf]) -> EtfCatalog {
        let mut catalog = EtfCatalog::default();
        for e in etfs {
            catalog.upsert(e.clone()).expect("valid etf");
        }
        catalog
    }

    fn scenario(weights: &[(&str, f64)]) -> PortfolioScenario {
        PortfolioScenario {
            id: "test".to_string(),
            name: "Test".to_string(),
            desc: String::new(),
            risk: RiskTier::Neutral,
            weights: weights
                .iter()
                .map(|(t, w)| (t.to_string(), *w))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn ab_catalog() -> EtfCatalog {
        catalog_of(&[etf("A", 0.03, 0.05), etf("B", 0.01, 0.09)])
    }

    #[test]
    fn regression_vector_for_target_assets_goal() {
        let catalog = ab_catalog();
        let s = scenario(&[("A", 0.5), ("B", 0.5)]);
        let result = project(
            SimulationGoal::TargetAssets {
                amount: 100_000_000.0,
            },
            10,
            &s,
            &catalog,
            0.0,
        );

        assert_approx(result.blended_yield, 0.02);
        assert_approx(result.blended_total_return, 0.09);
        assert_approx(result.post_tax_yield, 0.02 * (1.0 - 0.154));
        assert_rel(annuity_factor(0.09 / 12.0, 120), 193.514_277_083_308_17, 1e-12);
        assert_rel(result.monthly_contribution, 516_757.737_502_488_5, 1e-10);
        assert_rel(result.terminal_assets, 100_000_000.0, 1e-10);
        assert_eq!(result.asset_growth.len(), 121);
        assert_eq!(result.dividend_growth.len(), 121);
        assert_eq!(result.asset_growth[0], 0.0);
        assert!(!result.is_unreachable());
    }

    #[test]
    fn dividend_goal_requires_assets_that_pay_the_inflated_dividend() {
        let catalog = ab_catalog();
        let s = scenario(&[("A", 0.5), ("B", 0.5)]);
        let result = project(
            SimulationGoal::TargetDividend { amount: 1_000_000.0 },
            10,
            &s,
            &catalog,
            0.0,
        );

        assert_rel(result.required_terminal_assets, 12_000_000.0 / 0.01692, 1e-12);
        assert_rel(result.monthly_contribution, 3_664_948.492_925_45, 1e-9);
        assert_rel(result.terminal_monthly_dividend, 1_000_000.0, 1e-9);
    }

    #[test]
    fn inflation_raises_the_nominal_target_and_deflates_the_outcome() {
        let catalog = ab_catalog();
        let s = scenario(&[("A", 0.5), ("B", 0.5)]);
        let goal = SimulationGoal::TargetAssets {
            amount: 50_000_000.0,
        };
        let flat = project(goal, 15, &s, &catalog, 0.0);
        let inflated = project(goal, 15, &s, &catalog, 0.03);

        let index = 1.03_f64.powi(15);
        assert_rel(inflated.monthly_contribution, flat.monthly_contribution * index, 1e-10);
        assert_rel(inflated.terminal_assets, 50_000_000.0 * index, 1e-9);
        assert_rel(inflated.inflation_adjusted_terminal_assets, 50_000_000.0, 1e-9);
    }

    #[test]
    fn zero_return_portfolio_accumulates_linearly() {
        let catalog = catalog_of(&[etf("CASH", 0.0, 0.0)]);
        let s = scenario(&[("CASH", 1.0)]);
        let result = project(
            SimulationGoal::FixedContribution { amount: 1_000.0 },
            10,
            &s,
            &catalog,
            0.02,
        );

        assert_eq!(annuity_factor(0.0, 120), 120.0);
        assert_eq!(result.monthly_contribution * 120.0, result.terminal_assets);
        assert_eq!(result.terminal_monthly_dividend, 0.0);

        let target = project(
            SimulationGoal::TargetAssets {
                amount: 1_200_000.0,
            },
            10,
            &s,
            &catalog,
            0.0,
        );
        assert_eq!(target.monthly_contribution, 10_000.0);
        assert_eq!(target.monthly_contribution * 120.0, target.terminal_assets);
    }

    #[test]
    fn zero_yield_dividend_goal_is_unreachable() {
        let catalog = catalog_of(&[etf("GROW", 0.0, 0.12)]);
        let s = scenario(&[("GROW", 1.0)]);
        let result = project(
            SimulationGoal::TargetDividend { amount: 500_000.0 },
            20,
            &s,
            &catalog,
            0.025,
        );

        assert!(result.is_unreachable());
        assert!(result.required_terminal_assets.is_infinite());
        assert!(result.monthly_contribution.is_infinite());
        assert!(result.asset_growth.is_empty());
        assert!(!result.terminal_monthly_dividend.is_nan());
    }

    #[test]
    fn unknown_tickers_contribute_nothing_unless_rejected() {
        let catalog = ab_catalog();
        let s = scenario(&[("A", 0.5), ("ZZZ", 0.5)]);

        let rates = blended_rates(&s, &catalog);
        assert_approx(rates.dividend_yield, 0.015);
        assert_approx(rates.total_return, 0.04);
        assert_eq!(unknown_tickers(&s, &catalog), vec!["ZZZ".to_string()]);

        let options = ProjectionOptions {
            unknown_tickers: UnknownTickerPolicy::Reject,
            ..ProjectionOptions::default()
        };
        let err = project_with(
            SimulationGoal::FixedContribution { amount: 100.0 },
            5,
            &s,
            &catalog,
            0.0,
            &options,
        )
        .expect_err("unknown ticker must be rejected");
        assert_eq!(err, ProjectionError::UnknownTickers(vec!["ZZZ".to_string()]));

        let lenient = project_with(
            SimulationGoal::FixedContribution { amount: 100.0 },
            5,
            &s,
            &catalog,
            0.0,
            &ProjectionOptions::default(),
        )
        .expect("ignored by default");
        assert_approx(lenient.blended_total_return, 0.04);
    }

    #[test]
    fn unnormalized_weights_are_used_as_given() {
        let catalog = ab_catalog();
        let drifted = scenario(&[("A", 0.6), ("B", 0.6)]);
        let rates = blended_rates(&drifted, &catalog);
        assert_approx(rates.total_return, 0.6 * 0.08 + 0.6 * 0.10);

        let normalized = normalized_weights(&drifted.weights);
        assert_approx(normalized["A"], 0.5);
        assert_approx(normalized["B"], 0.5);

        let within_tolerance = scenario(&[("A", 0.505), ("B", 0.5)]);
        assert_eq!(normalized_weights(&within_tolerance.weights), within_tolerance.weights);
    }

    #[test]
    fn negative_return_still_produces_positive_annuity_factor() {
        let catalog = catalog_of(&[etf("DOWN", 0.0, -0.05)]);
        let s = scenario(&[("DOWN", 1.0)]);
        let result = project(
            SimulationGoal::TargetAssets {
                amount: 1_000_000.0,
            },
            5,
            &s,
            &catalog,
            0.0,
        );
        assert!(annuity_factor(-0.05 / 12.0, 60) > 0.0);
        assert!(result.monthly_contribution > 1_000_000.0 / 60.0);
        assert_rel(result.terminal_assets, 1_000_000.0, 1e-9);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_zero_inflation_keeps_present_value_equal_to_nominal(
            contribution in 1u32..5_000_000,
            horizon in 1u32..40,
            yield_a_bp in 0u32..1500,
            growth_a_bp in 0u32..2500,
            yield_b_bp in 0u32..1500,
            growth_b_bp in 0u32..2500,
            weight_a_pct in 0u32..101
        ) {
            let catalog = catalog_of(&[
                etf("A", yield_a_bp as f64 / 10_000.0, growth_a_bp as f64 / 10_000.0),
                etf("B", yield_b_bp as f64 / 10_000.0, growth_b_bp as f64 / 10_000.0),
            ]);
            let weight_a = weight_a_pct as f64 / 100.0;
            let s = scenario(&[("A", weight_a), ("B", 1.0 - weight_a)]);
            let result = project(
                SimulationGoal::FixedContribution { amount: contribution as f64 },
                horizon,
                &s,
                &catalog,
                0.0,
            );
            prop_assert!(result.terminal_assets == result.inflation_adjusted_terminal_assets);
            prop_assert!(result.terminal_monthly_dividend == result.inflation_adjusted_monthly_dividend);
            prop_assert!(result.asset_growth.len() == (horizon * 12 + 1) as usize);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_longer_horizon_needs_smaller_contribution(
            target in 1_000_000u32..2_000_000_000,
            horizon in 1u32..40,
            extra in 1u32..10,
            yield_bp in 0u32..1000,
            growth_bp in 0u32..2000,
            inflation_bp in 0u32..600
        ) {
            let catalog = catalog_of(&[etf("X", yield_bp as f64 / 10_000.0, growth_bp as f64 / 10_000.0)]);
            let s = scenario(&[("X", 1.0)]);
            let goal = SimulationGoal::TargetAssets { amount: target as f64 };
            let inflation = inflation_bp as f64 / 10_000.0;
            let short = project(goal, horizon, &s, &catalog, inflation);
            let long = project(goal, horizon + extra, &s, &catalog, inflation);
            let total_return = (yield_bp + growth_bp) as f64 / 10_000.0;
            // Only meaningful when compounding outpaces the inflated target.
            if total_return >= inflation {
                prop_assert!(long.monthly_contribution < short.monthly_contribution);
            }
        }
    }
}
