use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Etf, RiskTier};
use crate::error::CatalogError;

pub mod category {
    pub const MARKET_INDEX: &str = "Market Index";
    pub const DIVIDEND_GROWTH: &str = "Dividend Growth";
    pub const HIGH_DIVIDEND: &str = "High Dividend";
    pub const COVERED_CALL: &str = "Covered Call";
    pub const GROWTH: &str = "Growth";
    pub const SECTOR: &str = "Sector";
    pub const THEMATIC: &str = "Thematic";
    pub const CRYPTO: &str = "Crypto";
    pub const REIT: &str = "REIT";
    pub const LEVERAGED_2X: &str = "2X";
}

use category::*;

/// Category labels written by the browser build, mapped to the labels above.
const LEGACY_CATEGORIES: &[(&str, &str)] = &[
    ("시장 대표", MARKET_INDEX),
    ("배당 성장", DIVIDEND_GROWTH),
    ("고배당", HIGH_DIVIDEND),
    ("커버드콜", COVERED_CALL),
    ("성장주", GROWTH),
    ("섹터", SECTOR),
    ("테마", THEMATIC),
    ("가상자산", CRYPTO),
    ("리츠", REIT),
];

type Row = (&'static str, &'static str, f64, f64, RiskTier, &'static str);

const DEFAULT_ETFS: &[Row] = &[
    ("VIG", "Vanguard Dividend Appreciation ETF", 0.018, 0.08, RiskTier::Low, DIVIDEND_GROWTH),
    ("SCHD", "Schwab US Dividend Equity ETF", 0.035, 0.07, RiskTier::Low, DIVIDEND_GROWTH),
    ("HDV", "iShares Core High Dividend ETF", 0.042, 0.04, RiskTier::Low, HIGH_DIVIDEND),
    ("SDY", "SPDR S&P Dividend ETF", 0.028, 0.05, RiskTier::Low, HIGH_DIVIDEND),
    ("FUTY", "Fidelity MSCI Utilities Index ETF", 0.033, 0.04, RiskTier::Low, SECTOR),
    ("VNQ", "Vanguard Real Estate ETF", 0.045, 0.03, RiskTier::Neutral, SECTOR),
    ("VHT", "Vanguard Health Care ETF", 0.013, 0.09, RiskTier::Neutral, SECTOR),
    ("XLK", "Technology Select Sector SPDR Fund", 0.008, 0.12, RiskTier::High, SECTOR),
    ("IYK", "iShares U.S. Consumer Staples ETF", 0.025, 0.06, RiskTier::Low, SECTOR),
    ("XLF", "Financial Select Sector SPDR Fund", 0.016, 0.07, RiskTier::Neutral, SECTOR),
    ("FDIS", "Fidelity MSCI Consumer Discretionary Index ETF", 0.007, 0.11, RiskTier::High, SECTOR),
    ("VUG", "Vanguard Growth ETF", 0.006, 0.12, RiskTier::Neutral, GROWTH),
    ("QQQ", "Invesco QQQ Trust", 0.006, 0.13, RiskTier::High, GROWTH),
    ("ARKK", "ARK Innovation ETF", 0.0, 0.15, RiskTier::High, GROWTH),
    ("IWF", "iShares Russell 1000 Growth ETF", 0.007, 0.11, RiskTier::Neutral, GROWTH),
    ("FBGRX", "Fidelity Blue Chip Growth Fund", 0.001, 0.12, RiskTier::Neutral, GROWTH),
    ("VGT", "Vanguard Information Technology ETF", 0.007, 0.13, RiskTier::High, GROWTH),
    ("ICLN", "iShares Global Clean Energy ETF", 0.01, 0.09, RiskTier::High, THEMATIC),
    ("BOTZ", "Global X Robotics & Artificial Intelligence ETF", 0.002, 0.14, RiskTier::High, THEMATIC),
    ("SMH", "VanEck Semiconductor ETF", 0.005, 0.16, RiskTier::High, THEMATIC),
    ("IBIT", "iShares Bitcoin Trust", 0.0, 0.20, RiskTier::High, CRYPTO),
    ("FBTC", "Fidelity Wise Origin Bitcoin Fund", 0.0, 0.20, RiskTier::High, CRYPTO),
    ("BITO", "ProShares Bitcoin Strategy ETF", 0.0, 0.18, RiskTier::High, CRYPTO),
    ("DAM", "VanEck Digital Assets Mining ETF", 0.005, 0.22, RiskTier::High, CRYPTO),
    ("BITS", "Global X Blockchain & Bitcoin Strategy ETF", 0.01, 0.19, RiskTier::High, CRYPTO),
    ("CONY", "YieldMax COIN Option Income Strategy ETF", 0.73, -0.1, RiskTier::High, CRYPTO),
    ("YBTC", "Roundhill Bitcoin Covered Call Strategy ETF", 0.56, -0.05, RiskTier::High, CRYPTO),
    ("JEPI", "JPMorgan Equity Premium Income ETF", 0.08, 0.02, RiskTier::Neutral, COVERED_CALL),
    ("QYLD", "Global X Nasdaq 100 Covered Call ETF", 0.12, -0.02, RiskTier::High, COVERED_CALL),
    ("XYLD", "Global X S&P 500 Covered Call ETF", 0.11, 0.0, RiskTier::Neutral, COVERED_CALL),
    ("JEPQ", "JPMorgan Nasdaq Equity Premium Income ETF", 0.095, 0.03, RiskTier::High, COVERED_CALL),
    ("RYLD", "Global X Russell 2000 Covered Call ETF", 0.12, -0.03, RiskTier::High, COVERED_CALL),
    ("NUSI", "Nationwide Nasdaq-100 Risk-Managed Income ETF", 0.07, 0.01, RiskTier::Neutral, COVERED_CALL),
    ("RYLA", "Global X Russell 2000 Covered Call & Growth ETF", 0.06, 0.04, RiskTier::High, COVERED_CALL),
    ("VOO", "Vanguard S&P 500 ETF", 0.015, 0.085, RiskTier::Neutral, MARKET_INDEX),
    ("QLD", "ProShares Ultra QQQ", 0.0, 0.26, RiskTier::High, LEVERAGED_2X),
    ("SSO", "ProShares Ultra S&P500", 0.0, 0.17, RiskTier::High, LEVERAGED_2X),
    ("DDM", "ProShares Ultra Dow30", 0.0, 0.14, RiskTier::High, LEVERAGED_2X),
    ("USD", "ProShares Ultra Semiconductors", 0.0, 0.28, RiskTier::High, LEVERAGED_2X),
    ("ROM", "ProShares Ultra Technology", 0.0, 0.24, RiskTier::High, LEVERAGED_2X),
    ("RXL", "ProShares Ultra Health Care", 0.0, 0.16, RiskTier::High, LEVERAGED_2X),
    ("DIG", "ProShares Ultra Oil & Gas", 0.0, 0.15, RiskTier::High, LEVERAGED_2X),
    ("UYG", "ProShares Ultra Financials", 0.0, 0.12, RiskTier::High, LEVERAGED_2X),
    ("UWM", "ProShares Ultra Russell2000", 0.0, 0.18, RiskTier::High, LEVERAGED_2X),
    ("BITX", "2x Bitcoin Strategy ETF", 0.0, 0.30, RiskTier::High, LEVERAGED_2X),
    ("ETHU", "2x Ether Strategy ETF", 0.0, 0.32, RiskTier::High, LEVERAGED_2X),
    ("SOLT", "2x Solana Strategy ETF", 0.0, 0.35, RiskTier::High, LEVERAGED_2X),
    ("XXRP", "2x XRP Strategy ETF", 0.0, 0.28, RiskTier::High, LEVERAGED_2X),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EtfCatalog {
    etfs: BTreeMap<String, Etf>,
}

impl EtfCatalog {
    pub fn builtin() -> Self {
        let etfs = DEFAULT_ETFS
            .iter()
            .map(|&(ticker, name, dividend_yield, growth, risk, category)| {
                let etf = Etf {
                    ticker: ticker.to_string(),
                    name: name.to_string(),
                    desc: String::new(),
                    pros: String::new(),
                    cons: String::new(),
                    dividend_yield,
                    growth,
                    risk,
                    category: category.to_string(),
                };
                (etf.ticker.clone(), etf)
            })
            .collect();
        Self { etfs }
    }

    /// Builds a catalog from a user-edited table, mapping legacy category
    /// labels and keying every entry by its own upper-cased ticker.
    pub fn from_user_table(table: BTreeMap<String, Etf>) -> Self {
        let etfs = table
            .into_iter()
            .map(|(key, mut etf)| {
                if etf.ticker.trim().is_empty() {
                    etf.ticker = key;
                }
                etf.ticker = etf.ticker.trim().to_uppercase();
                etf.category = canonical_category(&etf.category);
                (etf.ticker.clone(), etf)
            })
            .collect();
        Self { etfs }
    }

    pub fn get(&self, ticker: &str) -> Option<&Etf> {
        self.etfs.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.etfs.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.etfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.etfs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Etf> {
        self.etfs.values()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.etfs.keys().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<Etf> {
        self.etfs.values().cloned().collect()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.etfs.values().map(|e| e.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn upsert(&mut self, mut etf: Etf) -> Result<(), CatalogError> {
        let ticker = etf.ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(CatalogError::EmptyTicker);
        }
        if !etf.dividend_yield.is_finite() || !etf.growth.is_finite() {
            return Err(CatalogError::InvalidRates(ticker));
        }
        etf.ticker = ticker.clone();
        etf.category = canonical_category(&etf.category);
        self.etfs.insert(ticker, etf);
        Ok(())
    }

    pub fn remove(&mut self, ticker: &str) -> Result<Etf, CatalogError> {
        self.etfs
            .remove(ticker)
            .ok_or_else(|| CatalogError::UnknownTicker(ticker.to_string()))
    }
}

fn canonical_category(raw: &str) -> String {
    let trimmed = raw.trim();
    LEGACY_CATEGORIES
        .iter()
        .find(|(legacy, _)| *legacy == trimmed)
        .map(|(_, current)| current.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
