//! Universe configuration: category-organized ticker lists.
//!
//! A universe maps a category (index sector or theme) to its member
//! tickers. It can be stored as TOML or pulled from NSE's published index
//! constituent CSVs; flattening it gives the symbol set a scan covers.

use crate::domain::{normalize_tickers, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// NSE sector index constituent lists.
pub const SECTOR_SOURCES: &[(&str, &str)] = &[
    ("Nifty 50", "https://archives.nseindia.com/content/indices/ind_nifty50list.csv"),
    ("Bank Nifty", "https://archives.nseindia.com/content/indices/ind_niftybanklist.csv"),
    ("Auto", "https://archives.nseindia.com/content/indices/ind_niftyautolist.csv"),
    (
        "Financial Services",
        "https://archives.nseindia.com/content/indices/ind_niftyfinancialserviceslist.csv",
    ),
    ("FMCG", "https://archives.nseindia.com/content/indices/ind_niftyfmcglist.csv"),
    ("IT", "https://archives.nseindia.com/content/indices/ind_niftyitlist.csv"),
    ("Pharma", "https://archives.nseindia.com/content/indices/ind_niftypharmalist.csv"),
    ("Oil & Gas", "https://archives.nseindia.com/content/indices/ind_niftyoilgaslist.csv"),
    ("PSU Bank", "https://archives.nseindia.com/content/indices/ind_niftypsubanklist.csv"),
    ("Realty", "https://archives.nseindia.com/content/indices/ind_niftyrealtylist.csv"),
    ("Energy", "https://archives.nseindia.com/content/indices/ind_niftyenergylist.csv"),
    (
        "Infrastructure",
        "https://archives.nseindia.com/content/indices/ind_niftyinfrastructurelist.csv",
    ),
    ("Cement", "https://archives.nseindia.com/content/indices/ind_niftycementlist.csv"),
    ("Railway", "https://archives.nseindia.com/content/indices/ind_niftyrailwaylist.csv"),
    ("Defence", "https://archives.nseindia.com/content/indices/ind_niftydefencelist.csv"),
];

/// Thematic index lists, stored under a shorter category name.
pub const THEMATIC_SOURCES: &[(&str, &str)] = &[(
    "Railways PSU",
    "https://www.niftyindices.com/IndexConstituent/ind_niftyIndiaRailwaysPSU_list.csv",
)];

/// Used when no category could be loaded at all.
pub const FALLBACK_TICKERS: &[&str] = &[
    "RELIANCE.NS",
    "TCS.NS",
    "INFY.NS",
    "HDFCBANK.NS",
    "ICICIBANK.NS",
];

pub const FALLBACK_CATEGORY: &str = "Fallback";

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{category}: HTTP {status}")]
    Http { category: String, status: u16 },

    #[error("{category}: {message}")]
    Network { category: String, message: String },

    #[error("{category}: bad CSV: {source}")]
    Csv {
        category: String,
        #[source]
        source: csv::Error,
    },

    #[error("{category}: no SYMBOL column (got {columns:?})")]
    NoSymbolColumn {
        category: String,
        columns: Vec<String>,
    },
}

/// The complete universe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize the universe to TOML.
    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The five-ticker universe used when nothing else loads.
    pub fn fallback() -> Self {
        let mut sectors = BTreeMap::new();
        sectors.insert(
            FALLBACK_CATEGORY.to_string(),
            FALLBACK_TICKERS.iter().map(|s| s.to_string()).collect(),
        );
        Self { sectors }
    }

    /// Flatten every category into the normalized, sorted, deduplicated
    /// symbol set. Blank entries are dropped.
    pub fn symbol_set(&self, suffix: &str) -> Vec<Ticker> {
        normalize_tickers(
            self.sectors.values().flat_map(|t| t.iter().map(String::as_str)),
            suffix,
        )
    }

    /// Total number of entries (before dedup across categories).
    pub fn ticker_count(&self) -> usize {
        self.sectors.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.values().all(|v| v.is_empty())
    }
}

/// Result of a universe load: what loaded and which categories didn't.
#[derive(Debug, Default)]
pub struct UniverseLoad {
    pub universe: Universe,
    pub failed: Vec<(String, UniverseError)>,
}

/// Source of the scan universe.
///
/// Loading never aborts on a single category; failures come back in
/// [`UniverseLoad::failed`].
pub trait UniverseProvider {
    fn load(&self) -> UniverseLoad;
}

/// A universe read from TOML (or built in memory).
pub struct StaticUniverse(pub Universe);

impl UniverseProvider for StaticUniverse {
    fn load(&self) -> UniverseLoad {
        UniverseLoad {
            universe: self.0.clone(),
            failed: Vec::new(),
        }
    }
}

/// Downloads NSE index constituent CSVs.
pub struct NseIndexProvider {
    client: reqwest::blocking::Client,
    sources: Vec<(String, String)>,
    suffix: String,
}

impl NseIndexProvider {
    /// Provider over every sector and thematic list.
    pub fn new(timeout: Duration, suffix: &str) -> Result<Self, UniverseError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| UniverseError::Network {
                category: "client".into(),
                message: e.to_string(),
            })?;

        let sources = SECTOR_SOURCES
            .iter()
            .chain(THEMATIC_SOURCES)
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect();

        Ok(Self {
            client,
            sources,
            suffix: suffix.to_string(),
        })
    }

    /// Replace the category → URL list.
    pub fn with_sources(mut self, sources: Vec<(String, String)>) -> Self {
        self.sources = sources;
        self
    }

    fn fetch_category(&self, category: &str, url: &str) -> Result<Vec<String>, UniverseError> {
        let resp = self.client.get(url).send().map_err(|e| UniverseError::Network {
            category: category.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UniverseError::Http {
                category: category.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| UniverseError::Network {
            category: category.to_string(),
            message: e.to_string(),
        })?;

        let symbols = parse_constituents_csv(category, &body)?;
        Ok(symbols
            .into_iter()
            .filter_map(|s| Ticker::with_suffix(&s, &self.suffix).ok())
            .map(|t| t.as_str().to_string())
            .collect())
    }
}

impl UniverseProvider for NseIndexProvider {
    fn load(&self) -> UniverseLoad {
        let mut load = UniverseLoad::default();

        for (category, url) in &self.sources {
            match self.fetch_category(category, url) {
                Ok(tickers) => {
                    debug!("{category}: {} constituents", tickers.len());
                    load.universe.sectors.insert(category.clone(), tickers);
                }
                Err(UniverseError::Http { status: 404, .. }) => {
                    debug!("{category}: list not published (404), skipped");
                }
                Err(e) => {
                    warn!("universe category failed: {e}");
                    load.failed.push((category.clone(), e));
                }
            }
        }

        if load.universe.is_empty() {
            warn!("no universe category loaded; using fallback tickers");
            load.universe = Universe::fallback();
        } else {
            info!(
                "universe loaded: {} categories, {} entries",
                load.universe.sectors.len(),
                load.universe.ticker_count()
            );
        }
        load
    }
}

/// Read the `SYMBOL` column of an index constituent CSV.
///
/// Header names are trimmed and upper-cased before matching; blank symbols
/// are skipped.
pub fn parse_constituents_csv(category: &str, body: &str) -> Result<Vec<String>, UniverseError> {
    let csv_err = |source| UniverseError::Csv {
        category: category.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_uppercase())
        .collect();

    let idx = headers
        .iter()
        .position(|h| h == "SYMBOL")
        .ok_or_else(|| UniverseError::NoSymbolColumn {
            category: category.to_string(),
            columns: headers.clone(),
        })?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        if let Some(sym) = record.get(idx).map(str::trim).filter(|s| !s.is_empty()) {
            symbols.push(sym.to_string());
        }
    }
    Ok(symbols)
}
