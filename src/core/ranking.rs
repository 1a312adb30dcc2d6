use std::cmp::Ordering;

use super::types::{PortfolioScenario, RiskProfile, RiskTier, SimulationResult};

/// The fixed scenario offered for each risk profile, used alongside the AI
/// proposal and on its own when the advisor fails.
pub fn fallback_scenario(profile: RiskProfile) -> PortfolioScenario {
    let (name, desc, risk, weights): (&str, &str, RiskTier, &[(&str, f64)]) = match profile {
        RiskProfile::Conservative => (
            "Stability-First Portfolio",
            "Prioritises capital preservation and a steady dividend stream while keeping market volatility low.",
            RiskTier::Low,
            &[("SCHD", 0.50), ("JEPI", 0.30), ("VIG", 0.10), ("VOO", 0.10)],
        ),
        RiskProfile::Balanced => (
            "Balanced Growth Portfolio",
            "Balances stable dividends with asset growth, accepting moderate risk for long-term returns.",
            RiskTier::Neutral,
            &[("VOO", 0.35), ("SCHD", 0.30), ("QQQ", 0.20), ("JEPI", 0.15)],
        ),
        RiskProfile::Aggressive => (
            "Aggressive Growth Portfolio",
            "Focuses on capital growth over dividends and uses market volatility to maximise returns.",
            RiskTier::High,
            &[("QQQ", 0.40), ("VOO", 0.30), ("SMH", 0.20), ("JEPQ", 0.10)],
        ),
    };

    PortfolioScenario {
        id: profile.as_str().to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
        risk,
        weights: weights
            .iter()
            .map(|(ticker, weight)| (ticker.to_string(), *weight))
            .collect(),
    }
}

pub fn fallback_scenarios() -> Vec<PortfolioScenario> {
    [
        RiskProfile::Conservative,
        RiskProfile::Balanced,
        RiskProfile::Aggressive,
    ]
    .into_iter()
    .map(fallback_scenario)
    .collect()
}

/// The AI scenario, if any, followed by every fallback whose id it does not
/// already use.
pub fn candidate_scenarios(ai_scenario: Option<&PortfolioScenario>) -> Vec<PortfolioScenario> {
    let mut scenarios: Vec<PortfolioScenario> = ai_scenario.into_iter().cloned().collect();
    for fallback in fallback_scenarios() {
        if !scenarios.iter().any(|s| s.id == fallback.id) {
            scenarios.push(fallback);
        }
    }
    scenarios
}

/// Orders results for presentation: the AI scenario first, then the
/// scenario matching the selected profile, then by descending nominal
/// terminal assets. The sort is stable.
pub fn rank_results(
    results: &mut [SimulationResult],
    ai_scenario_id: Option<&str>,
    profile: RiskProfile,
) {
    let group = |result: &SimulationResult| -> u8 {
        if ai_scenario_id == Some(result.scenario.id.as_str()) {
            0
        } else if result.scenario.id == profile.as_str() {
            1
        } else {
            2
        }
    };

    results.sort_by(|a, b| {
        let (ga, gb) = (group(a), group(b));
        match ga.cmp(&gb) {
            Ordering::Equal if ga == 2 => b.terminal_assets.total_cmp(&a.terminal_assets),
            other => other,
        }
    });
}
