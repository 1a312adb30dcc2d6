//! The generative-model collaborator that proposes portfolios and drafts
//! ETF entries.

mod gemini;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::{
    Etf, InvestmentTheme, PortfolioScenario, RiskProfile, RiskTier, TickerMap,
    WEIGHT_SUM_TOLERANCE, normalized_weights,
};
use crate::error::AdvisorError;

pub use gemini::{DEFAULT_MODEL, GeminiAdvisor};

#[derive(Debug, Clone)]
pub struct AdvisorRequest {
    pub api_key: String,
    pub profile: RiskProfile,
    pub theme: InvestmentTheme,
    pub pool: Vec<Etf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedWeight {
    pub ticker: String,
    pub weight: f64,
}

/// Raw answer from the model, before any of it is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorProposal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub weights: Vec<ProposedWeight>,
}

#[async_trait]
pub trait PortfolioAdvisor: Send + Sync {
    async fn propose_portfolio(
        &self,
        request: &AdvisorRequest,
    ) -> Result<AdvisorProposal, AdvisorError>;

    async fn describe_etf(
        &self,
        api_key: &str,
        ticker: &str,
        categories: &[String],
    ) -> Result<Etf, AdvisorError>;
}

/// Risk label shown on an AI scenario. It follows the theme, and the profile
/// only for the open-ended theme.
pub fn display_risk(profile: RiskProfile, theme: InvestmentTheme) -> RiskTier {
    match theme {
        InvestmentTheme::DividendFocused => RiskTier::Low,
        InvestmentTheme::TechFocused
        | InvestmentTheme::CryptoFocused
        | InvestmentTheme::MaxGrowth
        | InvestmentTheme::LeveragedGrowth => RiskTier::High,
        InvestmentTheme::AiRecommended => match profile {
            RiskProfile::Conservative => RiskTier::Low,
            RiskProfile::Balanced => RiskTier::Neutral,
            RiskProfile::Aggressive => RiskTier::High,
        },
    }
}

pub fn ai_scenario_id(timestamp_millis: i64) -> String {
    format!("ai-custom-{timestamp_millis}")
}

/// Turns a proposal into a scenario restricted to `pool`.
///
/// Entries with an empty ticker or a negative or non-finite weight are
/// skipped, and a ticker listed twice keeps its last weight. Tickers outside
/// the pool are dropped, then the weights are rescaled when their sum is off
/// by more than [`WEIGHT_SUM_TOLERANCE`].
pub fn sanitize_proposal(
    proposal: AdvisorProposal,
    pool: &[Etf],
    profile: RiskProfile,
    theme: InvestmentTheme,
    timestamp_millis: i64,
) -> Result<PortfolioScenario, AdvisorError> {
    let mut weights = TickerMap::new();
    for ProposedWeight { ticker, weight } in proposal.weights {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() || !weight.is_finite() || weight < 0.0 {
            continue;
        }
        if !pool.iter().any(|etf| etf.ticker == ticker) {
            warn!("advisor proposed {ticker}, which is not in the pool; dropping it");
            continue;
        }
        weights.insert(ticker, weight);
    }

    let sum: f64 = weights.values().sum();
    if weights.is_empty() || sum <= 0.0 {
        return Err(AdvisorError::NoUsableTickers);
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warn!("advisor weights sum to {sum:.4}; normalizing");
        weights = normalized_weights(&weights);
    }

    Ok(PortfolioScenario {
        id: ai_scenario_id(timestamp_millis),
        name: proposal.name,
        desc: proposal.desc,
        risk: display_risk(profile, theme),
        weights,
    })
}

fn profile_label(profile: RiskProfile) -> &'static str {
    match profile {
        RiskProfile::Conservative => "stability seeking",
        RiskProfile::Balanced => "balanced growth",
        RiskProfile::Aggressive => "aggressive growth",
    }
}

fn theme_label(theme: InvestmentTheme) -> &'static str {
    match theme {
        InvestmentTheme::AiRecommended => "your own overall judgement",
        InvestmentTheme::DividendFocused => "stable high dividends",
        InvestmentTheme::TechFocused => "future technology",
        InvestmentTheme::CryptoFocused => "crypto assets",
        InvestmentTheme::MaxGrowth => "maximum growth with minimal dividends",
        InvestmentTheme::LeveragedGrowth => "2x leveraged growth",
    }
}

#[derive(Serialize)]
struct PromptEtf<'a> {
    ticker: &'a str,
    name: &'a str,
    #[serde(rename = "yield")]
    dividend_yield: f64,
    growth: f64,
    risk: RiskTier,
    category: &'a str,
}

pub(crate) fn portfolio_prompt(request: &AdvisorRequest) -> String {
    let pool: Vec<PromptEtf<'_>> = request
        .pool
        .iter()
        .map(|etf| PromptEtf {
            ticker: &etf.ticker,
            name: &etf.name,
            dividend_yield: etf.dividend_yield,
            growth: etf.growth,
            risk: etf.risk,
            category: &etf.category,
        })
        .collect();
    let pool_json = serde_json::to_string_pretty(&pool).unwrap_or_default();

    format!(
        "You are a portfolio manager. The investor's risk profile is '{profile}' and the \
         chosen theme is '{theme}'.\n\
         Build one portfolio that fits both, using only ETFs from the list below.\n\
         Rules:\n\
         - Hold between 4 and 8 different ETFs.\n\
         - Use only tickers from the list.\n\
         - Weights are fractions and must sum to 1.\n\
         - Give the portfolio a short descriptive name and a one-sentence strategy \
           description. For leveraged or crypto themes, say plainly that the portfolio is \
           volatile; do not call it balanced or stable.\n\
         - Dividend themes favour high yield with low or neutral risk. Growth themes favour \
           high growth and low yield. Crypto and 2x themes draw mainly from the Crypto and \
           2X categories.\n\
         - Reply with the JSON object only.\n\n\
         ETF list:\n{pool_json}\n",
        profile = profile_label(request.profile),
        theme = theme_label(request.theme),
    )
}

pub(crate) fn describe_prompt(ticker: &str, categories: &[String]) -> String {
    let categories = serde_json::to_string(categories).unwrap_or_default();
    format!(
        "You are a financial data analyst. Describe the US-listed ETF {ticker}.\n\
         Fields:\n\
         - name: full official name\n\
         - desc: one sentence on its strategy\n\
         - pros: key strengths\n\
         - cons: key risks or drawbacks\n\
         - yield: expected annual dividend yield as a fraction (0.035 for 3.5%)\n\
         - growth: expected annual price growth as a fraction, excluding yield\n\
         - risk: one of low, neutral, high\n\
         - category: the best match from {categories}, or a new short category name\n\
         Reply with the JSON object only.\n",
        ticker = ticker.trim().to_uppercase(),
    )
}
