use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Weight or amount per ticker. Ordered so serialized records are stable.
pub type TickerMap = BTreeMap<String, f64>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[serde(alias = "낮음")]
    Low,
    #[default]
    #[serde(alias = "중립", alias = "medium")]
    Neutral,
    #[serde(alias = "높음")]
    High,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Balanced => "balanced",
            RiskProfile::Aggressive => "aggressive",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvestmentTheme {
    #[serde(alias = "ai-comprehensive")]
    AiRecommended,
    DividendFocused,
    TechFocused,
    CryptoFocused,
    MaxGrowth,
    #[serde(rename = "2x-growth")]
    LeveragedGrowth,
}

impl InvestmentTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            InvestmentTheme::AiRecommended => "ai-recommended",
            InvestmentTheme::DividendFocused => "dividend-focused",
            InvestmentTheme::TechFocused => "tech-focused",
            InvestmentTheme::CryptoFocused => "crypto-focused",
            InvestmentTheme::MaxGrowth => "max-growth",
            InvestmentTheme::LeveragedGrowth => "2x-growth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Etf {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub pros: String,
    #[serde(default)]
    pub cons: String,
    #[serde(rename = "yield")]
    pub dividend_yield: f64,
    pub growth: f64,
    #[serde(default)]
    pub risk: RiskTier,
    #[serde(default)]
    pub category: String,
}

impl Etf {
    pub fn total_return(&self) -> f64 {
        self.dividend_yield + self.growth
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioScenario {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub risk: RiskTier,
    pub weights: TickerMap,
}

impl PortfolioScenario {
    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn tickers_by_weight(&self) -> Vec<(&str, f64)> {
        let mut tickers: Vec<(&str, f64)> = self
            .weights
            .iter()
            .map(|(ticker, weight)| (ticker.as_str(), *weight))
            .collect();
        tickers.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tickers
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SimulationGoal {
    /// Monthly post-tax dividend to reach, in today's money.
    #[serde(alias = "dividend")]
    TargetDividend { amount: f64 },
    /// Terminal portfolio value to reach, in today's money.
    #[serde(alias = "asset")]
    TargetAssets { amount: f64 },
    /// Known monthly contribution; the engine only projects it forward.
    #[serde(alias = "investment")]
    FixedContribution { amount: f64 },
}

impl SimulationGoal {
    pub fn amount(self) -> f64 {
        match self {
            SimulationGoal::TargetDividend { amount }
            | SimulationGoal::TargetAssets { amount }
            | SimulationGoal::FixedContribution { amount } => amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub scenario: PortfolioScenario,
    pub period_years: u32,
    pub monthly_contribution: f64,
    /// Nominal assets needed at the horizon; `f64::INFINITY` when the goal
    /// cannot be reached with this scenario.
    pub required_terminal_assets: f64,
    pub blended_yield: f64,
    pub blended_total_return: f64,
    pub post_tax_yield: f64,
    pub asset_growth: Vec<f64>,
    pub dividend_growth: Vec<f64>,
    pub terminal_assets: f64,
    pub terminal_monthly_dividend: f64,
    pub inflation_adjusted_terminal_assets: f64,
    pub inflation_adjusted_monthly_dividend: f64,
}

impl SimulationResult {
    pub fn is_unreachable(&self) -> bool {
        !self.required_terminal_assets.is_finite()
    }

    pub fn projection(&self, start_age: Option<u32>) -> SimulationProjection {
        SimulationProjection {
            period_years: self.period_years,
            target_assets: self.terminal_assets,
            final_monthly_dividend: self.terminal_monthly_dividend,
            inflation_adjusted_target_assets: self.inflation_adjusted_terminal_assets,
            inflation_adjusted_monthly_dividend: self.inflation_adjusted_monthly_dividend,
            start_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEntry {
    pub month: u32,
    #[serde(default)]
    pub investments: TickerMap,
}

/// The projection a record was adopted with, kept for display next to actuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationProjection {
    pub period_years: u32,
    #[serde(deserialize_with = "null_as_infinity")]
    pub target_assets: f64,
    #[serde(deserialize_with = "null_as_infinity")]
    pub final_monthly_dividend: f64,
    #[serde(default, deserialize_with = "null_as_infinity")]
    pub inflation_adjusted_target_assets: f64,
    #[serde(default, deserialize_with = "null_as_infinity")]
    pub inflation_adjusted_monthly_dividend: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_age: Option<u32>,
}

// JSON writes non-finite floats as null, so an unreachable projection comes
// back that way.
fn null_as_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMonitorData {
    pub id: String,
    pub portfolio: PortfolioScenario,
    pub child_name: String,
    pub target_monthly_investment: f64,
    pub current_total_value: f64,
    pub monthly_dividend_received: f64,
    pub yearly_adjustments: BTreeMap<i32, TickerMap>,
    pub current_tracking_year: i32,
    pub tracking_history: BTreeMap<i32, Vec<MonthlyEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_projection: Option<SimulationProjection>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn unreachable_projection_reads_back_from_null() {
        let projection: SimulationProjection = serde_json::from_value(json!({
            "periodYears": 10,
            "targetAssets": null,
            "finalMonthlyDividend": null,
            "inflationAdjustedTargetAssets": null
        }))
        .unwrap();
        assert_eq!(projection.target_assets, f64::INFINITY);
        assert_eq!(projection.final_monthly_dividend, f64::INFINITY);
        assert_eq!(projection.inflation_adjusted_target_assets, f64::INFINITY);
        assert_eq!(projection.inflation_adjusted_monthly_dividend, 0.0);

        let written = serde_json::to_value(&projection).unwrap();
        assert_eq!(written["targetAssets"], Value::Null);
        let again: SimulationProjection = serde_json::from_value(written).unwrap();
        assert_eq!(again, projection);
    }
}
