use serde::Serialize;

use super::types::{PortfolioScenario, TickerMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLine {
    pub ticker: String,
    pub weight: f64,
    pub target_amount: f64,
    /// Zero when no usable price was supplied.
    pub price: f64,
    pub shares: f64,
    pub actual_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePlan {
    pub total_contribution: f64,
    pub lines: Vec<PurchaseLine>,
    pub total_actual_cost: f64,
    pub residual_cash: f64,
}

/// Splits a contribution across the scenario's weights. Fractional shares
/// are allowed; tickers without a positive price buy nothing.
pub fn plan_purchase(
    scenario: &PortfolioScenario,
    total_contribution: f64,
    prices: &TickerMap,
) -> PurchasePlan {
    let lines: Vec<PurchaseLine> = scenario
        .tickers_by_weight()
        .into_iter()
        .map(|(ticker, weight)| {
            let price = prices
                .get(ticker)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0)
                .unwrap_or(0.0);
            let target_amount = total_contribution * weight;
            let shares = if price > 0.0 { target_amount / price } else { 0.0 };
            PurchaseLine {
                ticker: ticker.to_string(),
                weight,
                target_amount,
                price,
                shares,
                actual_cost: shares * price,
            }
        })
        .collect();

    let total_actual_cost: f64 = lines.iter().map(|line| line.actual_cost).sum();
    PurchasePlan {
        total_contribution,
        lines,
        total_actual_cost,
        residual_cash: total_contribution - total_actual_cost,
    }
}
