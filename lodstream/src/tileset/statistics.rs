//! Per-attribute statistics referenced by a tileset document.
//!
//! I3S layers list one statistics resource per attribute under
//! `statisticsInfo`. The resources are small JSON documents fetched on
//! demand; [`StatisticsCache`] keeps each one after its first fetch.

use crate::loader::{FetchError, Fetcher};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// An attribute's statistics resource, already resolved against the
/// document location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatisticsRef {
    pub attribute: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub stddev: Option<f64>,
    pub count: Option<f64>,
    pub sum: Option<f64>,
    pub variance: Option<f64>,
    pub histogram: Option<Histogram>,
    pub most_frequent_values: Vec<ValueCount>,
}

impl AttributeStatistics {
    /// `(min, max)` when both are present, finite and ordered.
    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min.is_finite() && max.is_finite() && min <= max => {
                Some((min, max))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Histogram {
    pub minimum: f64,
    pub maximum: f64,
    pub counts: Vec<u64>,
}

/// One entry of a most-frequent-values list. Values may be numbers or
/// strings depending on the attribute type.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ValueCount {
    pub value: serde_json::Value,
    pub count: u64,
}

#[derive(Deserialize)]
struct StatisticsDocument {
    stats: AttributeStatistics,
}

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("failed to fetch attribute statistics: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed attribute statistics: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a statistics resource (`{ "stats": { ... } }`).
pub fn parse_statistics(bytes: &[u8]) -> Result<AttributeStatistics, StatisticsError> {
    let document: StatisticsDocument = serde_json::from_slice(bytes)?;
    Ok(document.stats)
}

/// Statistics fetched so far, keyed by resolved URL.
#[derive(Debug, Default)]
pub struct StatisticsCache {
    entries: DashMap<String, Arc<AttributeStatistics>>,
}

impl StatisticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<AttributeStatistics>> {
        self.entries.get(url).map(|e| Arc::clone(e.value()))
    }

    /// Returns the cached statistics for `reference`, fetching them first if
    /// this URL has not been seen. Failures are not cached.
    pub async fn fetch<F>(
        &self,
        reference: &StatisticsRef,
        token: Option<&str>,
        fetcher: &F,
    ) -> Result<Arc<AttributeStatistics>, StatisticsError>
    where
        F: Fetcher + ?Sized,
    {
        if let Some(hit) = self.get(&reference.url) {
            return Ok(hit);
        }

        let bytes = fetcher.fetch(&reference.url, token).await?;
        let stats = Arc::new(parse_statistics(&bytes)?);
        debug!(attribute = %reference.attribute, url = %reference.url, "Fetched attribute statistics");

        // A concurrent fetch of the same URL may have won; keep the first
        Ok(Arc::clone(
            self.entries
                .entry(reference.url.clone())
                .or_insert(stats)
                .value(),
        ))
    }

    /// Drops the entries for `references` (their layer went away).
    pub fn forget<'a>(&self, references: impl IntoIterator<Item = &'a StatisticsRef>) {
        for reference in references {
            self.entries.remove(&reference.url);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
