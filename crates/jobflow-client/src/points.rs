//! Points cost table with a TTL cache
//!
//! The table is informational: a failed fetch never fails the caller. It
//! falls back to the last fetched table, however old, and then to built-in
//! defaults.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use jobflow_core::Cached;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::PointsFetcher;
use crate::error::{JobError, Result};
use crate::operation::Operation;

/// Points charged per operation, keyed by backend feature name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTable {
    #[serde(default)]
    pub configs: BTreeMap<String, u32>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

impl PointsTable {
    /// Costs used when the backend table has never been fetched
    pub fn defaults() -> Self {
        let configs = [
            ("inpaint", 50),
            ("segmentation", 10),
            ("scale", 10),
            ("chatbot", 0),
            ("music_generation", 300),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            configs,
            descriptions: BTreeMap::new(),
        }
    }

    pub fn cost(&self, key: &str) -> Option<u32> {
        self.configs.get(key).copied()
    }

    /// Cost of an operation, falling back to the built-in default when the
    /// table has no entry for it
    pub fn cost_of(&self, operation: Operation) -> Option<u32> {
        let key = operation.points_key();
        self.cost(key).or_else(|| Self::defaults().cost(key))
    }
}

/// Parse `{configs, descriptions}` or `{code: 0, data: {configs, descriptions}}`
pub fn parse_points_response(body: &Value) -> Result<PointsTable> {
    let table = if body.get("configs").is_some() {
        body
    } else if body.get("code").and_then(Value::as_i64) == Some(0) {
        body.get("data")
            .filter(|data| data.get("configs").is_some())
            .ok_or_else(|| JobError::ParseError("points response has no configs".into()))?
    } else {
        return Err(JobError::ParseError(
            "unrecognized points response".into(),
        ));
    };

    serde_json::from_value(table.clone()).map_err(|e| JobError::ParseError(e.to_string()))
}

/// Where a looked-up table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsSource {
    /// Cached and within the TTL
    Cache,
    /// Fetched just now
    Fresh,
    /// Fetch failed; an expired cached table was served
    Stale,
    /// Fetch failed with nothing cached
    Defaults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsLookup {
    pub table: PointsTable,
    pub source: PointsSource,
}

/// Caches the points table for a fixed TTL
#[derive(Debug)]
pub struct PointsCatalog {
    ttl: Duration,
    cache: Mutex<Option<Cached<PointsTable>>>,
}

impl PointsCatalog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop the cached table
    pub fn clear(&self) {
        *self.cache.lock() = None;
    }

    /// Look up the table, refreshing it when expired or when forced
    pub async fn get<F: PointsFetcher + ?Sized>(
        &self,
        fetcher: &F,
        force_refresh: bool,
    ) -> PointsLookup {
        if !force_refresh {
            if let Some(cached) = self.cache.lock().as_ref() {
                if !cached.is_stale(Instant::now(), self.ttl) {
                    debug!("Serving points table from cache");
                    return PointsLookup {
                        table: cached.value().clone(),
                        source: PointsSource::Cache,
                    };
                }
            }
        }

        let fetched = match fetcher.fetch_points().await {
            Ok(body) => parse_points_response(&body),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(table) => {
                *self.cache.lock() = Some(Cached::fresh(table.clone()));
                PointsLookup {
                    table,
                    source: PointsSource::Fresh,
                }
            }
            Err(e) => {
                warn!("Failed to fetch points table: {}", e);
                match self.cache.lock().as_ref() {
                    Some(cached) => PointsLookup {
                        table: cached.value().clone(),
                        source: PointsSource::Stale,
                    },
                    None => PointsLookup {
                        table: PointsTable::defaults(),
                        source: PointsSource::Defaults,
                    },
                }
            }
        }
    }
}
