//! Persistence boundary and the application state it backs.
//!
//! The store is an opaque key-value map of JSON strings. [`AppState`] reads it
//! once when loading and writes the affected key after every mutation.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Datelike;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::core::tracking::{self, adopt_scenario, clone_record, validate_weights};
use crate::core::{
    Etf, EtfCatalog, PortfolioMonitorData, PortfolioScenario, SimulationProjection, migrate,
};
use crate::error::{StateError, StoreError, TrackingError};

pub const API_KEY: &str = "googleApiKey";
pub const TRACKED_PORTFOLIOS: &str = "trackedPortfolios";
pub const USER_ETF_DATA: &str = "userEtfData";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Migrates every record of an array, or a single legacy record, skipping
/// the ones that fail.
pub fn migrate_records(value: &Value) -> (Vec<PortfolioMonitorData>, usize) {
    let raw: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for item in raw {
        match migrate(item) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!("skipping invalid portfolio record: {err}");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

pub struct AppState {
    store: Box<dyn KeyValueStore>,
    catalog: EtfCatalog,
    portfolios: Vec<PortfolioMonitorData>,
    api_key: Option<String>,
}

impl AppState {
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let catalog = match store.get(USER_ETF_DATA)? {
            None => EtfCatalog::builtin(),
            Some(raw) => match serde_json::from_str::<BTreeMap<String, Etf>>(&raw) {
                Ok(table) => EtfCatalog::from_user_table(table),
                Err(err) => {
                    warn!("ignoring unreadable user ETF table: {err}");
                    EtfCatalog::builtin()
                }
            },
        };

        let portfolios = match store.get(TRACKED_PORTFOLIOS)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => migrate_records(&value).0,
                Err(err) => {
                    warn!("ignoring unreadable tracked portfolios: {err}");
                    Vec::new()
                }
            },
        };

        let api_key = store.get(API_KEY)?.filter(|key| !key.trim().is_empty());
        info!(
            "loaded {} ETFs and {} tracked portfolios",
            catalog.len(),
            portfolios.len()
        );
        Ok(Self {
            store,
            catalog,
            portfolios,
            api_key,
        })
    }

    pub fn catalog(&self) -> &EtfCatalog {
        &self.catalog
    }

    pub fn portfolios(&self) -> &[PortfolioMonitorData] {
        &self.portfolios
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Uses `key` for this session only, unless a key is already stored.
    pub fn with_fallback_api_key(mut self, key: Option<String>) -> Self {
        if self.api_key.is_none() {
            self.api_key = key.filter(|k| !k.trim().is_empty());
        }
        self
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<(), StateError> {
        let key = key.trim();
        if key.is_empty() {
            self.store.remove(API_KEY)?;
            self.api_key = None;
        } else {
            self.store.set(API_KEY, key)?;
            self.api_key = Some(key.to_string());
        }
        Ok(())
    }

    // Mutations build the next value, write it, and only then swap it in,
    // so a failed write leaves memory matching the store.
    fn commit_catalog(&mut self, catalog: EtfCatalog) -> Result<(), StateError> {
        let json = serde_json::to_string(&catalog).map_err(StoreError::from)?;
        self.store.set(USER_ETF_DATA, &json)?;
        self.catalog = catalog;
        Ok(())
    }

    fn commit_portfolios(
        &mut self,
        portfolios: Vec<PortfolioMonitorData>,
    ) -> Result<(), StateError> {
        let json = serde_json::to_string(&portfolios).map_err(StoreError::from)?;
        self.store.set(TRACKED_PORTFOLIOS, &json)?;
        debug!("saved {} tracked portfolios", portfolios.len());
        self.portfolios = portfolios;
        Ok(())
    }

    pub fn upsert_etf(&mut self, etf: Etf) -> Result<(), StateError> {
        let mut catalog = self.catalog.clone();
        catalog.upsert(etf)?;
        self.commit_catalog(catalog)
    }

    pub fn remove_etf(&mut self, ticker: &str) -> Result<Etf, StateError> {
        let mut catalog = self.catalog.clone();
        let removed = catalog.remove(ticker)?;
        self.commit_catalog(catalog)?;
        Ok(removed)
    }

    pub fn reset_catalog(&mut self) -> Result<(), StateError> {
        self.store.remove(USER_ETF_DATA)?;
        self.catalog = EtfCatalog::builtin();
        Ok(())
    }

    /// Milliseconds since the epoch, bumped until no record id collides.
    fn fresh_timestamp(&self) -> i64 {
        let mut timestamp = chrono::Utc::now().timestamp_millis();
        while self
            .portfolios
            .iter()
            .any(|p| p.id == tracking::record_id_at(timestamp))
        {
            timestamp += 1;
        }
        timestamp
    }

    pub fn portfolio(&self, id: &str) -> Result<&PortfolioMonitorData, TrackingError> {
        self.portfolios
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| TrackingError::UnknownRecord(id.to_string()))
    }

    fn position(&self, id: &str) -> Result<usize, TrackingError> {
        self.portfolios
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| TrackingError::UnknownRecord(id.to_string()))
    }

    pub fn adopt(
        &mut self,
        scenario: PortfolioScenario,
        target_monthly_investment: f64,
        projection: Option<SimulationProjection>,
    ) -> Result<PortfolioMonitorData, StateError> {
        let year = chrono::Local::now().year();
        let record = adopt_scenario(
            scenario,
            target_monthly_investment,
            projection,
            year,
            self.fresh_timestamp(),
        );
        let mut portfolios = self.portfolios.clone();
        portfolios.push(record.clone());
        self.commit_portfolios(portfolios)?;
        info!("tracking new portfolio {}", record.id);
        Ok(record)
    }

    /// Replaces a record with an edited copy. The copy goes through the
    /// migrator and must carry weights summing to 1.
    pub fn replace_portfolio(
        &mut self,
        id: &str,
        raw: &Value,
    ) -> Result<PortfolioMonitorData, StateError> {
        let index = self.position(id)?;
        let mut record = migrate(raw)?;
        record.id = id.to_string();
        validate_weights(&record.portfolio)?;
        let mut portfolios = self.portfolios.clone();
        portfolios[index] = record.clone();
        self.commit_portfolios(portfolios)?;
        Ok(record)
    }

    /// Applies `edit` to a copy of the record and keeps it only on success.
    pub fn update_portfolio<T>(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut PortfolioMonitorData) -> Result<T, TrackingError>,
    ) -> Result<(T, PortfolioMonitorData), StateError> {
        let index = self.position(id)?;
        let mut record = self.portfolios[index].clone();
        let value = edit(&mut record)?;
        let mut portfolios = self.portfolios.clone();
        portfolios[index] = record.clone();
        self.commit_portfolios(portfolios)?;
        Ok((value, record))
    }

    pub fn clone_portfolio(&mut self, id: &str) -> Result<PortfolioMonitorData, StateError> {
        let copy = clone_record(self.portfolio(id)?, self.fresh_timestamp());
        let mut portfolios = self.portfolios.clone();
        portfolios.push(copy.clone());
        self.commit_portfolios(portfolios)?;
        Ok(copy)
    }

    pub fn delete_portfolio(&mut self, id: &str) -> Result<(), StateError> {
        let index = self.position(id)?;
        let mut portfolios = self.portfolios.clone();
        let removed = portfolios.remove(index);
        self.commit_portfolios(portfolios)?;
        info!("deleted tracked portfolio {}", removed.id);
        Ok(())
    }

    pub fn reset_portfolios(&mut self) -> Result<(), StateError> {
        self.commit_portfolios(Vec::new())
    }

    pub fn export_portfolios(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(&self.portfolios).map_err(StoreError::from)?)
    }

    /// Merges imported records: an id already tracked is replaced, a new id
    /// is appended.
    pub fn import_portfolios(&mut self, value: &Value) -> Result<ImportReport, StateError> {
        let (records, skipped) = migrate_records(value);
        let imported = records.len();
        if imported > 0 {
            let mut portfolios = self.portfolios.clone();
            for record in records {
                match portfolios.iter_mut().find(|p| p.id == record.id) {
                    Some(existing) => *existing = record,
                    None => portfolios.push(record),
                }
            }
            self.commit_portfolios(portfolios)?;
        }
        Ok(ImportReport { imported, skipped })
    }
}
