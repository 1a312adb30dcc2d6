use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::advisor::DEFAULT_MODEL;
use crate::core::{InvestmentTheme, RiskProfile, SimulationGoal};
use crate::planner::{DEFAULT_ADVISOR_TIMEOUT, SimulationRequest};

#[derive(Parser, Debug)]
#[command(
    name = "etf-planner",
    about = "ETF savings planner: AI-assisted portfolio scenarios, compound-growth projections and contribution tracking"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Log at debug level")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve(ServeArgs),
    /// Score the default scenarios offline and print the ranked results.
    Simulate(SimulationArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "ETF_PLANNER_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "ETF_PLANNER_DATA_DIR", default_value = ".etf-planner")]
    pub data_dir: PathBuf,
    #[arg(long, help = "Keep all state in memory; nothing is written to disk")]
    pub ephemeral: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_ADVISOR_TIMEOUT.as_secs(),
        help = "Seconds to wait for the portfolio advisor before falling back"
    )]
    pub advisor_timeout_secs: u64,
    #[arg(long, env = "ETF_PLANNER_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(
        long,
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        help = "Advisor API key used when none has been saved"
    )]
    pub api_key: Option<String>,
}

impl ServeArgs {
    pub fn advisor_timeout(&self) -> Duration {
        Duration::from_secs(self.advisor_timeout_secs)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGoalKind {
    TargetDividend,
    TargetAssets,
    FixedContribution,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliRiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

impl From<CliRiskProfile> for RiskProfile {
    fn from(value: CliRiskProfile) -> Self {
        match value {
            CliRiskProfile::Conservative => RiskProfile::Conservative,
            CliRiskProfile::Balanced => RiskProfile::Balanced,
            CliRiskProfile::Aggressive => RiskProfile::Aggressive,
        }
    }
}

impl From<RiskProfile> for CliRiskProfile {
    fn from(value: RiskProfile) -> Self {
        match value {
            RiskProfile::Conservative => CliRiskProfile::Conservative,
            RiskProfile::Balanced => CliRiskProfile::Balanced,
            RiskProfile::Aggressive => CliRiskProfile::Aggressive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliTheme {
    AiRecommended,
    DividendFocused,
    TechFocused,
    CryptoFocused,
    MaxGrowth,
    #[value(name = "2x-growth")]
    LeveragedGrowth,
}

impl From<CliTheme> for InvestmentTheme {
    fn from(value: CliTheme) -> Self {
        match value {
            CliTheme::AiRecommended => InvestmentTheme::AiRecommended,
            CliTheme::DividendFocused => InvestmentTheme::DividendFocused,
            CliTheme::TechFocused => InvestmentTheme::TechFocused,
            CliTheme::CryptoFocused => InvestmentTheme::CryptoFocused,
            CliTheme::MaxGrowth => InvestmentTheme::MaxGrowth,
            CliTheme::LeveragedGrowth => InvestmentTheme::LeveragedGrowth,
        }
    }
}

impl From<InvestmentTheme> for CliTheme {
    fn from(value: InvestmentTheme) -> Self {
        match value {
            InvestmentTheme::AiRecommended => CliTheme::AiRecommended,
            InvestmentTheme::DividendFocused => CliTheme::DividendFocused,
            InvestmentTheme::TechFocused => CliTheme::TechFocused,
            InvestmentTheme::CryptoFocused => CliTheme::CryptoFocused,
            InvestmentTheme::MaxGrowth => CliTheme::MaxGrowth,
            InvestmentTheme::LeveragedGrowth => CliTheme::LeveragedGrowth,
        }
    }
}

/// Simulation inputs as entered. Rates are percentages here and fractions
/// once built into a [`SimulationRequest`].
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SimulationArgs {
    #[arg(long, value_enum, default_value_t = CliGoalKind::TargetDividend)]
    pub goal: CliGoalKind,
    #[arg(
        long,
        default_value_t = 1_000_000.0,
        help = "Goal amount in today's money: monthly dividend, terminal assets or monthly contribution"
    )]
    pub amount: f64,
    #[arg(long, default_value_t = 15, help = "Investment horizon in years")]
    pub years: u32,
    #[arg(long, default_value_t = 2.5, help = "Expected annual inflation in percent")]
    pub inflation_rate: f64,
    #[arg(long, value_enum, default_value_t = CliRiskProfile::Balanced)]
    pub risk_profile: CliRiskProfile,
    #[arg(long, value_enum, default_value_t = CliTheme::AiRecommended)]
    pub theme: CliTheme,
}

pub const MAX_HORIZON_YEARS: u32 = 100;

pub fn default_simulation_args() -> SimulationArgs {
    SimulationArgs {
        goal: CliGoalKind::TargetDividend,
        amount: 1_000_000.0,
        years: 15,
        inflation_rate: 2.5,
        risk_profile: CliRiskProfile::Balanced,
        theme: CliTheme::AiRecommended,
    }
}

pub fn build_simulation_request(args: SimulationArgs) -> Result<SimulationRequest, String> {
    if !args.amount.is_finite() || args.amount <= 0.0 {
        return Err("--amount must be > 0".to_string());
    }

    if args.years == 0 || args.years > MAX_HORIZON_YEARS {
        return Err(format!("--years must be between 1 and {MAX_HORIZON_YEARS}"));
    }

    if !args.inflation_rate.is_finite() || !(-50.0..=100.0).contains(&args.inflation_rate) {
        return Err("--inflation-rate must be between -50 and 100".to_string());
    }

    let amount = args.amount;
    let goal = match args.goal {
        CliGoalKind::TargetDividend => SimulationGoal::TargetDividend { amount },
        CliGoalKind::TargetAssets => SimulationGoal::TargetAssets { amount },
        CliGoalKind::FixedContribution => SimulationGoal::FixedContribution { amount },
    };

    Ok(SimulationRequest {
        goal,
        horizon_years: args.years,
        annual_inflation_rate: args.inflation_rate / 100.0,
        profile: args.risk_profile.into(),
        theme: args.theme.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_flags_parse_into_a_request() {
        let cli = Cli::try_parse_from([
            "etf-planner",
            "simulate",
            "--goal",
            "target-assets",
            "--amount",
            "100000000",
            "--years",
            "10",
            "--inflation-rate",
            "0",
            "--theme",
            "2x-growth",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected the simulate subcommand");
        };
        let request = build_simulation_request(args).unwrap();
        assert_eq!(
            request.goal,
            SimulationGoal::TargetAssets {
                amount: 100_000_000.0
            }
        );
        assert_eq!(request.horizon_years, 10);
        assert_eq!(request.annual_inflation_rate, 0.0);
        assert_eq!(request.theme, InvestmentTheme::LeveragedGrowth);
        assert_eq!(request.profile, RiskProfile::Balanced);
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "etf-planner",
            "serve",
            "--port",
            "9000",
            "--ephemeral",
            "--advisor-timeout-secs",
            "5",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Serve(args) = cli.command else {
            panic!("expected the serve subcommand");
        };
        assert_eq!(args.port, 9000);
        assert!(args.ephemeral);
        assert_eq!(args.advisor_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn defaults_match_clap_defaults() {
        let cli = Cli::try_parse_from(["etf-planner", "simulate"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected the simulate subcommand");
        };
        assert_eq!(args, default_simulation_args());
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        let mut args = default_simulation_args();
        args.amount = 0.0;
        assert_eq!(
            build_simulation_request(args).unwrap_err(),
            "--amount must be > 0"
        );

        let mut args = default_simulation_args();
        args.years = 0;
        assert!(build_simulation_request(args).is_err());

        let mut args = default_simulation_args();
        args.inflation_rate = f64::NAN;
        assert!(build_simulation_request(args).is_err());
    }

    #[test]
    fn inflation_is_converted_to_a_fraction() {
        let request = build_simulation_request(default_simulation_args()).unwrap();
        assert!((request.annual_inflation_rate - 0.025).abs() < 1e-12);
    }
}
