//! Normalization of persisted tracking records.
//!
//! Stored records come from older schema versions and from hand-edited import
//! files, so nothing about them is trusted. [`migrate`] turns an arbitrary JSON
//! value into a canonical [`PortfolioMonitorData`] or explains why it cannot.

use std::collections::BTreeMap;

use chrono::Datelike;
use log::debug;
use serde_json::{Map, Value};

use super::types::{MonthlyEntry, PortfolioMonitorData, PortfolioScenario, SimulationProjection, TickerMap};
use crate::error::MigrationError;

/// Top-level fields from earlier schema versions that are never carried over.
pub const LEGACY_FIELDS: &[&str] = &["principalAdjustment"];

pub const DEFAULT_CHILD_NAME: &str = "Child";

pub const MONTHS_PER_YEAR: u32 = 12;

pub fn migrate(raw: &Value) -> Result<PortfolioMonitorData, MigrationError> {
    migrate_for_year(raw, chrono::Local::now().year())
}

/// Same as [`migrate`] with the calendar year used for defaults supplied by
/// the caller.
pub fn migrate_for_year(
    raw: &Value,
    current_year: i32,
) -> Result<PortfolioMonitorData, MigrationError> {
    let record = raw.as_object().ok_or(MigrationError::NotAnObject)?;

    let id = record_id(record.get("id"))?;
    let portfolio = scenario(record.get("portfolio"), &id)?;

    for field in LEGACY_FIELDS {
        if record.contains_key(*field) {
            debug!("dropping legacy field `{field}` from portfolio record {id}");
        }
    }

    let child_name = match record.get("childName").filter(|v| truthy(v)) {
        None => DEFAULT_CHILD_NAME.to_string(),
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(MigrationError::invalid(
                "childName",
                format!("expected a string, found {other}"),
            ));
        }
    };

    let current_tracking_year = match record.get("currentTrackingYear").filter(|v| truthy(v)) {
        None => current_year,
        Some(value) => year(value, "currentTrackingYear")?,
    };

    let mut tracking_history = match record.get("trackingHistory").filter(|v| truthy(v)) {
        None => new_tracking_history(&portfolio, current_year),
        Some(value) => tracking_history(value)?,
    };

    let mut yearly_adjustments = match record.get("yearlyAdjustments").filter(|v| truthy(v)) {
        None => BTreeMap::new(),
        Some(value) => yearly_adjustments(value)?,
    };

    for (year, months) in tracking_history.iter_mut() {
        backfill_months(months, &portfolio.weights);
        let adjustments = yearly_adjustments.entry(*year).or_default();
        for ticker in portfolio.weights.keys() {
            adjustments.entry(ticker.clone()).or_insert(0.0);
        }
    }

    let simulation_projection = match record.get("simulationProjection") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<SimulationProjection>(value.clone()) {
            Ok(projection) => Some(projection),
            Err(err) => {
                debug!("dropping unreadable simulation projection from record {id}: {err}");
                None
            }
        },
    };

    Ok(PortfolioMonitorData {
        target_monthly_investment: amount(record, "targetMonthlyInvestment")?,
        current_total_value: amount(record, "currentTotalValue")?,
        monthly_dividend_received: amount(record, "monthlyDividendReceived")?,
        id,
        portfolio,
        child_name,
        yearly_adjustments,
        current_tracking_year,
        tracking_history,
        simulation_projection,
    })
}

pub fn new_tracking_history(
    scenario: &PortfolioScenario,
    year: i32,
) -> BTreeMap<i32, Vec<MonthlyEntry>> {
    BTreeMap::from([(year, zeroed_months(&scenario.weights))])
}

pub fn zeroed_months(weights: &TickerMap) -> Vec<MonthlyEntry> {
    (1..=MONTHS_PER_YEAR)
        .map(|month| MonthlyEntry {
            month,
            investments: zeroed_tickers(weights),
        })
        .collect()
}

pub fn zeroed_tickers(weights: &TickerMap) -> TickerMap {
    weights.keys().map(|ticker| (ticker.clone(), 0.0)).collect()
}

/// Mirrors JavaScript truthiness, which is what the stored records relied on
/// for their defaults.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn record_id(value: Option<&Value>) -> Result<String, MigrationError> {
    match value.filter(|v| truthy(v)) {
        None => Err(MigrationError::MissingField("id")),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(MigrationError::invalid(
            "id",
            format!("expected a string or number, found {other}"),
        )),
    }
}

/// A scenario without an id of its own takes the record's; absent or null
/// descriptive fields fall back to their defaults.
fn scenario(
    value: Option<&Value>,
    record_id: &str,
) -> Result<PortfolioScenario, MigrationError> {
    const FIELD: &str = "portfolio";
    let value = value
        .filter(|v| truthy(v))
        .ok_or(MigrationError::MissingField(FIELD))?;
    let Value::Object(fields) = value else {
        return Err(MigrationError::invalid(
            FIELD,
            format!("expected an object, found {value}"),
        ));
    };
    let Some(weights) = fields.get("weights").filter(|v| truthy(v)) else {
        return Err(MigrationError::MissingField("portfolio.weights"));
    };

    let mut fields = fields.clone();
    fields.retain(|key, value| key == "weights" || truthy(value));
    fields.insert(
        "weights".to_string(),
        serde_json::to_value(ticker_amounts(weights, "portfolio.weights")?)
            .map_err(|err| MigrationError::invalid(FIELD, err.to_string()))?,
    );
    match fields.get("id").cloned() {
        None => {
            fields.insert("id".to_string(), Value::String(record_id.to_string()));
        }
        Some(Value::Number(n)) => {
            fields.insert("id".to_string(), Value::String(n.to_string()));
        }
        Some(_) => {}
    }
    serde_json::from_value(Value::Object(fields))
        .map_err(|err| MigrationError::invalid(FIELD, err.to_string()))
}

fn number(value: &Value, field: &'static str) -> Result<f64, MigrationError> {
    let parsed = match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| MigrationError::invalid(field, format!("expected a number, found {value}")))
}

fn amount(record: &Map<String, Value>, field: &'static str) -> Result<f64, MigrationError> {
    match record.get(field).filter(|v| truthy(v)) {
        None => Ok(0.0),
        Some(value) => number(value, field),
    }
}

fn year(value: &Value, field: &'static str) -> Result<i32, MigrationError> {
    let year = number(value, field)?;
    if year.fract() != 0.0 || year < i32::MIN as f64 || year > i32::MAX as f64 {
        return Err(MigrationError::invalid(field, format!("{year} is not a year")));
    }
    Ok(year as i32)
}

fn year_key(key: &str, field: &'static str) -> Result<i32, MigrationError> {
    key.trim()
        .parse::<i32>()
        .map_err(|_| MigrationError::invalid(field, format!("`{key}` is not a year")))
}

/// Amounts that do not read as a number count as zero.
fn ticker_amounts(value: &Value, field: &'static str) -> Result<TickerMap, MigrationError> {
    let Value::Object(map) = value else {
        return Err(MigrationError::invalid(field, "expected an object of ticker amounts"));
    };
    Ok(map
        .iter()
        .map(|(ticker, amount)| {
            let amount = number(amount, field).unwrap_or_else(|err| {
                debug!("zeroing {ticker}: {err}");
                0.0
            });
            (ticker.clone(), amount)
        })
        .collect())
}

fn tracking_history(value: &Value) -> Result<BTreeMap<i32, Vec<MonthlyEntry>>, MigrationError> {
    const FIELD: &str = "trackingHistory";
    let Value::Object(years) = value else {
        return Err(MigrationError::invalid(FIELD, "expected an object keyed by year"));
    };

    let mut history = BTreeMap::new();
    for (key, months) in years {
        let year = year_key(key, FIELD)?;
        let Value::Array(entries) = months else {
            return Err(MigrationError::invalid(
                FIELD,
                format!("year {year} is not a list of months"),
            ));
        };

        let mut parsed: Vec<MonthlyEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            let month = entry
                .get("month")
                .ok_or_else(|| MigrationError::invalid(FIELD, format!("year {year} has an entry without a month")))
                .and_then(|m| number(m, FIELD))?;
            if month.fract() != 0.0 || !(1.0..=MONTHS_PER_YEAR as f64).contains(&month) {
                return Err(MigrationError::invalid(
                    FIELD,
                    format!("year {year} has an invalid month {month}"),
                ));
            }
            let month = month as u32;
            if parsed.iter().any(|e| e.month == month) {
                debug!("ignoring duplicate month {month} in tracked year {year}");
                continue;
            }
            let investments = match entry.get("investments") {
                None | Some(Value::Null) => TickerMap::new(),
                Some(amounts) => ticker_amounts(amounts, FIELD)?,
            };
            parsed.push(MonthlyEntry { month, investments });
        }
        history.insert(year, parsed);
    }
    Ok(history)
}

/// Years whose value is not a plain object are left out, so reconciliation
/// rebuilds them from zero.
fn yearly_adjustments(value: &Value) -> Result<BTreeMap<i32, TickerMap>, MigrationError> {
    const FIELD: &str = "yearlyAdjustments";
    let Value::Object(years) = value else {
        debug!("discarding yearly adjustments that are not keyed by year");
        return Ok(BTreeMap::new());
    };

    let mut adjustments = BTreeMap::new();
    for (key, amounts) in years {
        let year = match year_key(key, FIELD) {
            Ok(year) => year,
            Err(err) => {
                debug!("skipping adjustments: {err}");
                continue;
            }
        };
        if amounts.is_object() {
            adjustments.insert(year, ticker_amounts(amounts, FIELD)?);
        } else {
            debug!("resetting malformed adjustments for year {year}");
        }
    }
    Ok(adjustments)
}

fn backfill_months(months: &mut Vec<MonthlyEntry>, weights: &TickerMap) {
    for month in 1..=MONTHS_PER_YEAR {
        if !months.iter().any(|e| e.month == month) {
            months.push(MonthlyEntry {
                month,
                investments: TickerMap::new(),
            });
        }
    }
    months.sort_by_key(|e| e.month);
    for entry in months.iter_mut() {
        for ticker in weights.keys() {
            entry.investments.entry(ticker.clone()).or_insert(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{Just, Strategy, prop, prop_assert_eq, prop_oneof, proptest};
    use serde_json::json;

    const YEAR: i32 = 2025;

    fn minimal() -> Value {
        json!({
            "id": "portfolio_1",
            "portfolio": {
                "id": "balanced",
                "name": "Balanced",
                "weights": { "VOO": 0.6, "SCHD": 0.4 }
            }
        })
    }

    #[test]
    fn rejects_non_objects_and_missing_fields() {
        assert_eq!(migrate_for_year(&json!([1, 2]), YEAR), Err(MigrationError::NotAnObject));
        assert_eq!(migrate_for_year(&Value::Null, YEAR), Err(MigrationError::NotAnObject));
        assert_eq!(
            migrate_for_year(&json!({ "portfolio": { "id": "x", "weights": {} } }), YEAR),
            Err(MigrationError::MissingField("id"))
        );
        assert_eq!(
            migrate_for_year(&json!({ "id": "", "portfolio": {} }), YEAR),
            Err(MigrationError::MissingField("id"))
        );
        assert_eq!(
            migrate_for_year(&json!({ "id": "a" }), YEAR),
            Err(MigrationError::MissingField("portfolio"))
        );
        assert_eq!(
            migrate_for_year(&json!({ "id": "a", "portfolio": { "id": "x" } }), YEAR),
            Err(MigrationError::MissingField("portfolio.weights"))
        );
    }

    #[test]
    fn fills_defaults_for_a_minimal_record() {
        let record = migrate_for_year(&minimal(), YEAR).unwrap();
        assert_eq!(record.child_name, DEFAULT_CHILD_NAME);
        assert_eq!(record.target_monthly_investment, 0.0);
        assert_eq!(record.current_tracking_year, YEAR);
        assert_eq!(record.tracking_history.len(), 1);

        let months = &record.tracking_history[&YEAR];
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].month, 1);
        assert_eq!(months[11].month, 12);
        assert_eq!(months[5].investments.get("VOO"), Some(&0.0));
        assert_eq!(record.yearly_adjustments[&YEAR].len(), 2);
        assert!(record.simulation_projection.is_none());
    }

    #[test]
    fn numeric_id_is_accepted() {
        let mut raw = minimal();
        raw["id"] = json!(1_700_000_000_000u64);
        assert_eq!(migrate_for_year(&raw, YEAR).unwrap().id, "1700000000000");
    }

    #[test]
    fn array_adjustments_are_replaced_and_objects_backfilled() {
        let mut raw = minimal();
        raw["trackingHistory"] = json!({
            "2023": [{ "month": 1, "investments": { "VOO": 100.0 } }],
            "2024": []
        });
        raw["yearlyAdjustments"] = json!({
            "2023": [5, 6],
            "2024": { "VOO": 250.0 },
            "2019": { "OLD": 1.0 }
        });

        let record = migrate_for_year(&raw, YEAR).unwrap();
        let adj = &record.yearly_adjustments;
        assert_eq!(adj[&2023], TickerMap::from([("SCHD".into(), 0.0), ("VOO".into(), 0.0)]));
        assert_eq!(adj[&2024], TickerMap::from([("SCHD".into(), 0.0), ("VOO".into(), 250.0)]));
        assert_eq!(adj[&2019], TickerMap::from([("OLD".into(), 1.0)]));

        let year_2023 = &record.tracking_history[&2023];
        assert_eq!(year_2023.len(), 12);
        assert_eq!(year_2023[0].investments["VOO"], 100.0);
        assert_eq!(year_2023[0].investments["SCHD"], 0.0);
        assert_eq!(record.tracking_history[&2024].len(), 12);
    }

    #[test]
    fn legacy_fields_are_dropped() {
        let mut raw = minimal();
        raw["principalAdjustment"] = json!({ "VOO": 10 });
        let record = migrate_for_year(&raw, YEAR).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("principalAdjustment").is_none());
    }

    #[test]
    fn malformed_history_is_a_validation_error() {
        let mut raw = minimal();
        raw["trackingHistory"] = json!({ "2024": "nope" });
        assert!(matches!(
            migrate_for_year(&raw, YEAR),
            Err(MigrationError::InvalidField { field: "trackingHistory", .. })
        ));

        raw["trackingHistory"] = json!({ "2024": [{ "month": 13 }] });
        assert!(migrate_for_year(&raw, YEAR).is_err());
    }

    #[test]
    fn falsy_values_take_defaults() {
        let mut raw = minimal();
        raw["childName"] = json!("");
        raw["currentTrackingYear"] = json!(0);
        raw["targetMonthlyInvestment"] = Value::Null;
        raw["currentTotalValue"] = json!("1500000");
        let record = migrate_for_year(&raw, YEAR).unwrap();
        assert_eq!(record.child_name, DEFAULT_CHILD_NAME);
        assert_eq!(record.current_tracking_year, YEAR);
        assert_eq!(record.target_monthly_investment, 0.0);
        assert_eq!(record.current_total_value, 1_500_000.0);
    }

    #[test]
    fn projection_is_kept_when_readable() {
        let mut raw = minimal();
        raw["simulationProjection"] = json!({
            "periodYears": 15,
            "targetAssets": 250000000.0,
            "finalMonthlyDividend": 400000.0
        });
        let record = migrate_for_year(&raw, YEAR).unwrap();
        assert_eq!(record.simulation_projection.unwrap().period_years, 15);
    }

    #[test]
    fn bare_portfolio_takes_the_record_id() {
        let raw = json!({ "id": "x", "portfolio": { "weights": { "VOO": 1.0 } } });
        let record = migrate_for_year(&raw, YEAR).unwrap();
        assert_eq!(record.portfolio.id, "x");
        assert_eq!(record.portfolio.name, "");
        assert_eq!(record.portfolio.weights["VOO"], 1.0);

        let raw = json!({
            "id": 17,
            "portfolio": { "id": 3, "name": null, "weights": { "VOO": "0.7", "SCHD": 0.3 } }
        });
        let record = migrate_for_year(&raw, YEAR).unwrap();
        assert_eq!(record.portfolio.id, "3");
        assert_eq!(record.portfolio.weights["VOO"], 0.7);
    }

    #[test]
    fn unreadable_amounts_and_adjustment_years_are_tolerated() {
        let mut raw = minimal();
        raw["trackingHistory"] = json!({
            "2024": [{ "month": 1, "investments": { "VOO": "lots", "SCHD": 50 } }]
        });
        raw["yearlyAdjustments"] = json!({
            "2024": { "VOO": "abc", "SCHD": 25 },
            "someday": { "VOO": 1.0 }
        });
        let record = migrate_for_year(&raw, YEAR).unwrap();
        let january = &record.tracking_history[&2024][0].investments;
        assert_eq!(january["VOO"], 0.0);
        assert_eq!(january["SCHD"], 50.0);
        assert_eq!(
            record.yearly_adjustments,
            BTreeMap::from([(
                2024,
                TickerMap::from([("SCHD".into(), 25.0), ("VOO".into(), 0.0)])
            )])
        );
    }

    fn arbitrary_record() -> impl Strategy<Value = Value> {
        let tickers = prop::sample::subsequence(vec!["VOO", "SCHD", "QQQ", "JEPI"], 1..=4);
        let adjustment = prop_oneof![
            Just(json!([])),
            Just(json!(null)),
            Just(json!({ "VOO": 12.5 })),
            Just(json!({})),
        ];
        let months = prop::collection::btree_set(1u32..=12, 0..12);
        (tickers, adjustment, months, prop::option::of("[a-z]{0,6}"), 2018i32..2030)
            .prop_map(|(tickers, adjustment, months, child, year)| {
                let weights: Map<String, Value> =
                    tickers.iter().map(|t| (t.to_string(), json!(0.25))).collect();
                let entries: Vec<Value> = months
                    .iter()
                    .map(|m| json!({ "month": m, "investments": { tickers[0]: 10.0 * *m as f64 } }))
                    .collect();
                let mut raw = json!({
                    "id": "rec",
                    "portfolio": { "id": "p", "weights": weights },
                    "trackingHistory": { year.to_string(): entries },
                    "yearlyAdjustments": { year.to_string(): adjustment },
                    "principalAdjustment": 3
                });
                if let Some(child) = child {
                    raw["childName"] = json!(child);
                }
                raw
            })
    }

    proptest! {
        #[test]
        fn prop_migration_is_idempotent(raw in arbitrary_record()) {
            let once = migrate_for_year(&raw, YEAR).unwrap();
            let twice = migrate_for_year(&serde_json::to_value(&once).unwrap(), YEAR).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_every_year_covers_every_ticker(raw in arbitrary_record()) {
            let record = migrate_for_year(&raw, YEAR).unwrap();
            for (year, months) in &record.tracking_history {
                prop_assert_eq!(months.len(), 12);
                for ticker in record.portfolio.weights.keys() {
                    prop_assert_eq!(record.yearly_adjustments[year].contains_key(ticker), true);
                    for entry in months {
                        prop_assert_eq!(entry.investments.contains_key(ticker), true);
                    }
                }
            }
        }
    }
}
