//! Edits and derived figures for tracked portfolios.
//!
//! Every operation keeps the record in the shape the migrator produces: each
//! held ticker has an entry in every tracked month and every adjustment year.

use serde::Serialize;

use super::catalog::EtfCatalog;
use super::migrate::{zeroed_months, zeroed_tickers};
use super::types::{PortfolioMonitorData, PortfolioScenario, SimulationProjection, TickerMap};
use crate::error::TrackingError;

/// Allowed distance between the target weights' sum and 1 when saving.
pub const SAVE_WEIGHT_TOLERANCE: f64 = 0.001;

const GREEN_BAND_PP: f64 = 2.0;
const YELLOW_BAND_PP: f64 = 5.0;

pub fn record_id_at(timestamp_millis: i64) -> String {
    format!("portfolio_{timestamp_millis}")
}

pub fn adopt_scenario(
    scenario: PortfolioScenario,
    target_monthly_investment: f64,
    simulation_projection: Option<SimulationProjection>,
    year: i32,
    timestamp_millis: i64,
) -> PortfolioMonitorData {
    let adjustments = zeroed_tickers(&scenario.weights);
    let months = zeroed_months(&scenario.weights);
    PortfolioMonitorData {
        id: record_id_at(timestamp_millis),
        child_name: super::migrate::DEFAULT_CHILD_NAME.to_string(),
        target_monthly_investment,
        current_total_value: 0.0,
        monthly_dividend_received: 0.0,
        yearly_adjustments: [(year, adjustments)].into_iter().collect(),
        current_tracking_year: year,
        tracking_history: [(year, months)].into_iter().collect(),
        simulation_projection,
        portfolio: scenario,
    }
}

pub fn clone_record(record: &PortfolioMonitorData, timestamp_millis: i64) -> PortfolioMonitorData {
    let mut copy = record.clone();
    copy.id = record_id_at(timestamp_millis);
    copy.child_name = format!("{} (copy)", record.child_name);
    copy
}

fn finite(amount: f64) -> Result<f64, TrackingError> {
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(TrackingError::NonFiniteAmount)
    }
}

fn require_ticker(record: &PortfolioMonitorData, ticker: &str) -> Result<(), TrackingError> {
    if record.portfolio.weights.contains_key(ticker) {
        Ok(())
    } else {
        Err(TrackingError::UnknownTicker(ticker.to_string()))
    }
}

/// Records a contribution for `ticker` in month `month_index` (0-based) of
/// the current tracking year.
pub fn set_monthly_contribution(
    record: &mut PortfolioMonitorData,
    month_index: usize,
    ticker: &str,
    amount: f64,
) -> Result<(), TrackingError> {
    let amount = finite(amount)?;
    require_ticker(record, ticker)?;
    let year = record.current_tracking_year;
    let months = record
        .tracking_history
        .get_mut(&year)
        .ok_or(TrackingError::UnknownYear(year))?;
    let entry = months
        .get_mut(month_index)
        .ok_or(TrackingError::MonthOutOfRange(month_index))?;
    entry.investments.insert(ticker.to_string(), amount);
    Ok(())
}

pub fn set_yearly_adjustment(
    record: &mut PortfolioMonitorData,
    ticker: &str,
    amount: f64,
) -> Result<(), TrackingError> {
    let amount = finite(amount)?;
    require_ticker(record, ticker)?;
    record
        .yearly_adjustments
        .entry(record.current_tracking_year)
        .or_default()
        .insert(ticker.to_string(), amount);
    Ok(())
}

/// Sets a target weight as a fraction. The sum is only checked on save.
pub fn set_weight(
    record: &mut PortfolioMonitorData,
    ticker: &str,
    weight: f64,
) -> Result<(), TrackingError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(TrackingError::InvalidWeight(ticker.to_string()));
    }
    let slot = record
        .portfolio
        .weights
        .get_mut(ticker)
        .ok_or_else(|| TrackingError::UnknownTicker(ticker.to_string()))?;
    *slot = weight;
    Ok(())
}

/// Replaces `old` with `new` in the weights, every month and every
/// adjustment year, keeping the recorded amounts.
pub fn rename_ticker(
    record: &mut PortfolioMonitorData,
    old: &str,
    new: &str,
) -> Result<(), TrackingError> {
    let new = new.trim().to_uppercase();
    if new.is_empty() {
        return Err(TrackingError::EmptyTicker);
    }
    require_ticker(record, old)?;
    if new == old {
        return Ok(());
    }
    if record.portfolio.weights.contains_key(&new) {
        return Err(TrackingError::DuplicateTicker(new));
    }

    move_key(&mut record.portfolio.weights, old, &new);
    for months in record.tracking_history.values_mut() {
        for entry in months.iter_mut() {
            move_key(&mut entry.investments, old, &new);
        }
    }
    for adjustments in record.yearly_adjustments.values_mut() {
        move_key(adjustments, old, &new);
    }
    Ok(())
}

fn move_key(map: &mut TickerMap, old: &str, new: &str) {
    if let Some(value) = map.remove(old) {
        map.insert(new.to_string(), value);
    }
}

/// Adds the first catalog ETF not already held, at zero weight.
pub fn add_etf(
    record: &mut PortfolioMonitorData,
    catalog: &EtfCatalog,
) -> Result<String, TrackingError> {
    let ticker = catalog
        .tickers()
        .find(|t| !record.portfolio.weights.contains_key(*t))
        .ok_or(TrackingError::NoTickerAvailable)?
        .to_string();

    record.portfolio.weights.insert(ticker.clone(), 0.0);
    for months in record.tracking_history.values_mut() {
        for entry in months.iter_mut() {
            entry.investments.insert(ticker.clone(), 0.0);
        }
    }
    for adjustments in record.yearly_adjustments.values_mut() {
        adjustments.insert(ticker.clone(), 0.0);
    }
    Ok(ticker)
}

pub fn remove_etf(record: &mut PortfolioMonitorData, ticker: &str) -> Result<(), TrackingError> {
    record
        .portfolio
        .weights
        .remove(ticker)
        .ok_or_else(|| TrackingError::UnknownTicker(ticker.to_string()))?;
    for months in record.tracking_history.values_mut() {
        for entry in months.iter_mut() {
            entry.investments.remove(ticker);
        }
    }
    for adjustments in record.yearly_adjustments.values_mut() {
        adjustments.remove(ticker);
    }
    Ok(())
}

/// Opens the year after the latest tracked one and makes it current.
pub fn add_tracking_year(record: &mut PortfolioMonitorData) -> i32 {
    let year = record
        .tracking_history
        .keys()
        .next_back()
        .map_or(record.current_tracking_year, |latest| latest + 1);

    record
        .tracking_history
        .insert(year, zeroed_months(&record.portfolio.weights));
    record
        .yearly_adjustments
        .insert(year, zeroed_tickers(&record.portfolio.weights));
    record.current_tracking_year = year;
    year
}

pub fn select_tracking_year(
    record: &mut PortfolioMonitorData,
    year: i32,
) -> Result<(), TrackingError> {
    if !record.tracking_history.contains_key(&year) {
        return Err(TrackingError::UnknownYear(year));
    }
    record.current_tracking_year = year;
    Ok(())
}

pub fn validate_weights(scenario: &PortfolioScenario) -> Result<(), TrackingError> {
    let sum = scenario.weight_sum();
    if (sum - 1.0).abs() > SAVE_WEIGHT_TOLERANCE || !sum.is_finite() {
        return Err(TrackingError::WeightSum(sum * 100.0));
    }
    Ok(())
}

/// How far the actual allocation of a ticker sits from its target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftBand {
    Green,
    Yellow,
    Red,
}

impl DriftBand {
    pub fn classify(target_pct: f64, actual_pct: f64) -> Self {
        let gap = (target_pct - actual_pct).abs();
        if gap <= GREEN_BAND_PP {
            DriftBand::Green
        } else if gap <= YELLOW_BAND_PP {
            DriftBand::Yellow
        } else {
            DriftBand::Red
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRow {
    pub ticker: String,
    pub target_pct: f64,
    /// Share of cumulative principal.
    pub actual_pct: f64,
    /// Share of the current year's contributions and adjustments.
    pub year_pct: f64,
    pub band: DriftBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSummary {
    pub cumulative_principal: TickerMap,
    pub total_principal: f64,
    pub profit: f64,
    pub return_rate_pct: f64,
    pub tracking_year: i32,
    pub tracked_years: Vec<i32>,
    pub monthly_totals: Vec<f64>,
    pub year_contributions: TickerMap,
    pub year_contribution_total: f64,
    pub year_adjustments: TickerMap,
    pub year_adjustment_total: f64,
    pub year_totals: TickerMap,
    pub year_grand_total: f64,
    pub weight_sum_pct: f64,
    pub allocation: Vec<AllocationRow>,
}

pub fn summarize(record: &PortfolioMonitorData) -> TrackingSummary {
    let held = record.portfolio.tickers_by_weight();
    let amount = |map: &TickerMap, ticker: &str| map.get(ticker).copied().unwrap_or(0.0);

    let mut cumulative_principal: TickerMap =
        held.iter().map(|(t, _)| (t.to_string(), 0.0)).collect();
    for (ticker, total) in cumulative_principal.iter_mut() {
        for entry in record.tracking_history.values().flatten() {
            *total += amount(&entry.investments, ticker);
        }
        for adjustments in record.yearly_adjustments.values() {
            *total += amount(adjustments, ticker);
        }
    }
    let total_principal: f64 = cumulative_principal.values().sum();
    let profit = record.current_total_value - total_principal;
    let return_rate_pct = if total_principal > 0.0 {
        profit / total_principal * 100.0
    } else {
        0.0
    };

    let year = record.current_tracking_year;
    let months = record
        .tracking_history
        .get(&year)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let monthly_totals: Vec<f64> = months
        .iter()
        .map(|entry| held.iter().map(|(t, _)| amount(&entry.investments, t)).sum())
        .collect();

    let year_contributions: TickerMap = held
        .iter()
        .map(|(t, _)| {
            let sum = months.iter().map(|e| amount(&e.investments, t)).sum();
            (t.to_string(), sum)
        })
        .collect();
    let year_contribution_total: f64 = year_contributions.values().sum();

    let year_adjustments = record.yearly_adjustments.get(&year).cloned().unwrap_or_default();
    let year_adjustment_total: f64 = year_adjustments.values().sum();

    let year_totals: TickerMap = held
        .iter()
        .map(|(t, _)| {
            let total = amount(&year_contributions, t) + amount(&year_adjustments, t);
            (t.to_string(), total)
        })
        .collect();
    let year_grand_total = year_contribution_total + year_adjustment_total;

    let share = |part: f64, whole: f64| if whole > 0.0 { part / whole * 100.0 } else { 0.0 };
    let allocation = held
        .iter()
        .map(|(ticker, weight)| {
            let target_pct = weight * 100.0;
            let actual_pct = share(amount(&cumulative_principal, ticker), total_principal);
            AllocationRow {
                ticker: ticker.to_string(),
                target_pct,
                actual_pct,
                year_pct: share(amount(&year_totals, ticker), year_grand_total),
                band: DriftBand::classify(target_pct, actual_pct),
            }
        })
        .collect();

    TrackingSummary {
        cumulative_principal,
        total_principal,
        profit,
        return_rate_pct,
        tracking_year: year,
        tracked_years: record.tracking_history.keys().copied().collect(),
        monthly_totals,
        year_contributions,
        year_contribution_total,
        year_adjustments,
        year_adjustment_total,
        year_totals,
        year_grand_total,
        weight_sum_pct: record.portfolio.weight_sum() * 100.0,
        allocation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::migrate::migrate_for_year;
    use crate::core::types::RiskTier;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn scenario() -> PortfolioScenario {
        PortfolioScenario {
            id: "balanced".to_string(),
            name: "Balanced".to_string(),
            desc: String::new(),
            risk: RiskTier::Neutral,
            weights: [("VOO".to_string(), 0.6), ("SCHD".to_string(), 0.4)]
                .into_iter()
                .collect(),
        }
    }

    fn adopted() -> PortfolioMonitorData {
        adopt_scenario(scenario(), 1_000_000.0, None, 2025, 1_700_000_000_000)
    }

    fn assert_shape(record: &PortfolioMonitorData) {
        for (year, months) in &record.tracking_history {
            assert_eq!(months.len(), 12);
            for ticker in record.portfolio.weights.keys() {
                assert!(record.yearly_adjustments[year].contains_key(ticker));
                assert!(months.iter().all(|m| m.investments.contains_key(ticker)));
            }
        }
    }

    #[test]
    fn adopted_record_matches_migrated_shape() {
        let record = adopted();
        assert_eq!(record.id, "portfolio_1700000000000");
        assert_shape(&record);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(migrate_for_year(&value, 2030).unwrap(), record);
    }

    #[test]
    fn monthly_contribution_goes_to_current_year() {
        let mut record = adopted();
        set_monthly_contribution(&mut record, 2, "VOO", 600_000.0).unwrap();
        assert_eq!(record.tracking_history[&2025][2].investments["VOO"], 600_000.0);

        assert_eq!(
            set_monthly_contribution(&mut record, 12, "VOO", 1.0),
            Err(TrackingError::MonthOutOfRange(12))
        );
        assert_eq!(
            set_monthly_contribution(&mut record, 0, "QQQ", 1.0),
            Err(TrackingError::UnknownTicker("QQQ".to_string()))
        );
        assert_eq!(
            set_monthly_contribution(&mut record, 0, "VOO", f64::NAN),
            Err(TrackingError::NonFiniteAmount)
        );
    }

    #[test]
    fn rename_moves_history_and_adjustments() {
        let mut record = adopted();
        set_monthly_contribution(&mut record, 0, "SCHD", 400_000.0).unwrap();
        set_yearly_adjustment(&mut record, "SCHD", 50_000.0).unwrap();

        rename_ticker(&mut record, "SCHD", "vig").unwrap();
        assert_eq!(record.portfolio.weights.get("VIG"), Some(&0.4));
        assert!(!record.portfolio.weights.contains_key("SCHD"));
        assert_eq!(record.tracking_history[&2025][0].investments["VIG"], 400_000.0);
        assert_eq!(record.yearly_adjustments[&2025]["VIG"], 50_000.0);
        assert_shape(&record);

        assert_eq!(
            rename_ticker(&mut record, "VIG", "VOO"),
            Err(TrackingError::DuplicateTicker("VOO".to_string()))
        );
    }

    #[test]
    fn add_and_remove_etf_keep_the_shape() {
        let mut record = adopted();
        add_tracking_year(&mut record);
        let catalog = EtfCatalog::builtin();

        let added = add_etf(&mut record, &catalog).unwrap();
        assert!(catalog.contains(&added));
        assert_eq!(record.portfolio.weights[&added], 0.0);
        assert_shape(&record);

        remove_etf(&mut record, "VOO").unwrap();
        assert!(
            record
                .tracking_history
                .values()
                .flatten()
                .all(|m| !m.investments.contains_key("VOO"))
        );
        assert!(record.yearly_adjustments.values().all(|a| !a.contains_key("VOO")));
        assert_eq!(
            remove_etf(&mut record, "VOO"),
            Err(TrackingError::UnknownTicker("VOO".to_string()))
        );
    }

    #[test]
    fn new_year_follows_the_latest_and_becomes_current() {
        let mut record = adopted();
        select_tracking_year(&mut record, 2025).unwrap();
        assert_eq!(add_tracking_year(&mut record), 2026);
        assert_eq!(record.current_tracking_year, 2026);
        assert_shape(&record);

        select_tracking_year(&mut record, 2025).unwrap();
        assert_eq!(add_tracking_year(&mut record), 2027);
        assert_eq!(
            select_tracking_year(&mut record, 2030),
            Err(TrackingError::UnknownYear(2030))
        );
    }

    #[test]
    fn weights_must_sum_to_one_within_a_tenth_of_a_point() {
        let mut record = adopted();
        assert!(validate_weights(&record.portfolio).is_ok());

        set_weight(&mut record, "VOO", 0.6005).unwrap();
        assert!(validate_weights(&record.portfolio).is_ok());

        set_weight(&mut record, "VOO", 0.65).unwrap();
        let Err(TrackingError::WeightSum(pct)) = validate_weights(&record.portfolio) else {
            panic!("expected a weight sum error");
        };
        assert_approx(pct, 105.0);

        assert_eq!(
            set_weight(&mut record, "VOO", -0.1),
            Err(TrackingError::InvalidWeight("VOO".to_string()))
        );
    }

    #[test]
    fn clone_gets_new_id_and_same_ledger() {
        let mut record = adopted();
        record.child_name = "Mina".to_string();
        let copy = clone_record(&record, 42);
        assert_eq!(copy.id, "portfolio_42");
        assert_eq!(copy.child_name, "Mina (copy)");
        assert_eq!(copy.tracking_history, record.tracking_history);
    }

    #[test]
    fn summary_totals_and_drift_bands() {
        let mut record = adopted();
        for month in 0..3 {
            set_monthly_contribution(&mut record, month, "VOO", 600_000.0).unwrap();
            set_monthly_contribution(&mut record, month, "SCHD", 400_000.0).unwrap();
        }
        set_yearly_adjustment(&mut record, "SCHD", 500_000.0).unwrap();
        add_tracking_year(&mut record);
        set_monthly_contribution(&mut record, 0, "VOO", 1_000_000.0).unwrap();
        record.current_total_value = 5_500_000.0;

        let summary = summarize(&record);
        assert_approx(summary.cumulative_principal["VOO"], 2_800_000.0);
        assert_approx(summary.cumulative_principal["SCHD"], 1_700_000.0);
        assert_approx(summary.total_principal, 4_500_000.0);
        assert_approx(summary.profit, 1_000_000.0);
        assert_approx(summary.return_rate_pct, 1_000_000.0 / 4_500_000.0 * 100.0);

        assert_eq!(summary.tracking_year, 2026);
        assert_eq!(summary.tracked_years, vec![2025, 2026]);
        assert_approx(summary.monthly_totals[0], 1_000_000.0);
        assert_approx(summary.year_grand_total, 1_000_000.0);

        assert_eq!(summary.allocation[0].ticker, "VOO");
        assert_approx(summary.allocation[0].actual_pct, 2_800_000.0 / 4_500_000.0 * 100.0);
        assert_eq!(summary.allocation[0].band, DriftBand::Yellow);
        assert_approx(summary.allocation[0].year_pct, 100.0);
        assert_approx(summary.weight_sum_pct, 100.0);
    }

    #[test]
    fn empty_ledger_has_zero_return() {
        let summary = summarize(&adopted());
        assert_eq!(summary.total_principal, 0.0);
        assert_eq!(summary.return_rate_pct, 0.0);
        assert!(summary.allocation.iter().all(|row| row.actual_pct == 0.0));
    }

    #[test]
    fn drift_band_edges() {
        assert_eq!(DriftBand::classify(50.0, 52.0), DriftBand::Green);
        assert_eq!(DriftBand::classify(50.0, 45.0), DriftBand::Yellow);
        assert_eq!(DriftBand::classify(50.0, 44.9), DriftBand::Red);
    }
}
