use rand::Rng;
use rand::seq::SliceRandom;

use super::catalog::category;
use super::types::{Etf, InvestmentTheme, RiskProfile, RiskTier};

pub const MAX_POOL_SIZE: usize = 25;

const HIGH_GROWTH_SECTOR_TICKERS: &[&str] = &["XLK", "VGT", "SMH", "BOTZ", "FDIS"];
const TECH_TICKERS: &[&str] = &["VGT", "XLK", "QQQ", "SMH", "BOTZ", "ARKK"];
const GROWTH_CATEGORIES: &[&str] = &[category::GROWTH, category::THEMATIC];
const DIVIDEND_CATEGORIES: &[&str] = &[
    category::DIVIDEND_GROWTH,
    category::HIGH_DIVIDEND,
    category::COVERED_CALL,
    category::REIT,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TierQuota {
    pub low: usize,
    pub neutral: usize,
    pub high: usize,
}

pub fn tier_quota(profile: RiskProfile) -> TierQuota {
    match profile {
        RiskProfile::Conservative => TierQuota {
            low: 15,
            neutral: 7,
            high: 3,
        },
        RiskProfile::Balanced => TierQuota {
            low: 8,
            neutral: 10,
            high: 7,
        },
        RiskProfile::Aggressive => TierQuota {
            low: 3,
            neutral: 7,
            high: 15,
        },
    }
}

pub fn curate<R: Rng + ?Sized>(
    all: &[Etf],
    profile: RiskProfile,
    theme: InvestmentTheme,
    rng: &mut R,
) -> Vec<Etf> {
    let Some(predicate) = theme_predicate(theme) else {
        return sample_by_risk(all, profile, rng);
    };

    let mut themed: Vec<Etf> = all.iter().filter(|etf| predicate(etf)).cloned().collect();
    if themed.is_empty() {
        return sample_by_risk(all, profile, rng);
    }
    if themed.len() > MAX_POOL_SIZE {
        themed.shuffle(rng);
        themed.truncate(MAX_POOL_SIZE);
    }
    themed
}

fn theme_predicate(theme: InvestmentTheme) -> Option<fn(&Etf) -> bool> {
    match theme {
        InvestmentTheme::MaxGrowth => Some(|etf| {
            (GROWTH_CATEGORIES.contains(&etf.category.as_str())
                || HIGH_GROWTH_SECTOR_TICKERS.contains(&etf.ticker.as_str())
                || etf.category == category::CRYPTO)
                && etf.growth >= 0.10
                && etf.dividend_yield < 0.03
        }),
        InvestmentTheme::TechFocused => Some(|etf| TECH_TICKERS.contains(&etf.ticker.as_str())),
        InvestmentTheme::DividendFocused => {
            Some(|etf| DIVIDEND_CATEGORIES.contains(&etf.category.as_str()))
        }
        InvestmentTheme::CryptoFocused => Some(|etf| etf.category == category::CRYPTO),
        InvestmentTheme::AiRecommended | InvestmentTheme::LeveragedGrowth => None,
    }
}

/// Draws up to the profile's quota from each risk tier, then shuffles the
/// combined draw and caps it.
pub fn sample_by_risk<R: Rng + ?Sized>(all: &[Etf], profile: RiskProfile, rng: &mut R) -> Vec<Etf> {
    let quota = tier_quota(profile);
    let mut selection = Vec::with_capacity(quota.low + quota.neutral + quota.high);
    for (tier, take) in [
        (RiskTier::Low, quota.low),
        (RiskTier::Neutral, quota.neutral),
        (RiskTier::High, quota.high),
    ] {
        let mut bucket: Vec<&Etf> = all.iter().filter(|etf| etf.risk == tier).collect();
        bucket.shuffle(rng);
        selection.extend(bucket.into_iter().take(take).cloned());
    }
    selection.shuffle(rng);
    selection.truncate(MAX_POOL_SIZE);
    selection
}
