//! Per-(class, predicate) value cardinality.
//!
//! The store reports how many values each instance carries for a predicate;
//! the distribution is summarized here as min/max/avg and a linearly
//! interpolated 95th percentile.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{ErrorContext, Result};
use crate::profile::ProfileData;
use crate::store::{ReadContext, TripleStore};

/// Distribution of per-subject value counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardinalityStats {
    pub subjects_count: u64,
    pub min_values: u64,
    pub max_values: u64,
    pub avg_values: f64,
    pub p95_values: f64,
}

impl CardinalityStats {
    /// Summarizes per-subject value counts; `None` when there are none.
    pub fn from_counts(counts: &[u64]) -> Option<Self> {
        if counts.is_empty() {
            return None;
        }
        let mut sorted = counts.to_vec();
        sorted.sort_unstable();
        let total: u64 = sorted.iter().sum();
        Some(Self {
            subjects_count: sorted.len() as u64,
            min_values: sorted[0],
            max_values: sorted[sorted.len() - 1],
            avg_values: total as f64 / sorted.len() as f64,
            p95_values: percentile_cont(&sorted, 0.95),
        })
    }

    /// Whether some subject carries more than one value.
    pub fn is_multi_valued(&self) -> bool {
        self.max_values > 1
    }
}

/// Continuous percentile over sorted values, interpolating between neighbours.
pub fn percentile_cont(sorted: &[u64], fraction: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let position = fraction.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let weight = position - lower as f64;
            sorted[lower] as f64 + (sorted[upper] as f64 - sorted[lower] as f64) * weight
        }
    }
}

/// Cardinality of one class's predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassCardinality {
    pub class_name: String,
    pub instance_count: u64,
    pub predicates: BTreeMap<String, CardinalityStats>,
}

/// Cardinality statistics keyed by class URI, then predicate URI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardinalityIndex {
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassCardinality>,
}

impl CardinalityIndex {
    pub fn get(&self, class_uri: &str, predicate_uri: &str) -> Option<&CardinalityStats> {
        self.classes
            .get(class_uri)
            .and_then(|class| class.predicates.get(predicate_uri))
    }

    /// Largest `max_values` of a predicate over several classes, `None` when
    /// none of them has data for it.
    pub fn max_values_across<'a>(
        &self,
        class_uris: impl IntoIterator<Item = &'a str>,
        predicate_uri: &str,
    ) -> Option<u64> {
        class_uris
            .into_iter()
            .filter_map(|class_uri| self.get(class_uri, predicate_uri))
            .map(|stats| stats.max_values)
            .max()
    }

    pub fn insert(&mut self, class_uri: impl Into<String>, class: ClassCardinality) {
        self.classes.insert(class_uri.into(), class);
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading cardinality data from {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

/// Computes [`CardinalityStats`] from the triple store.
#[derive(Debug, Clone)]
pub struct CardinalityAnalyzer {
    type_predicate: String,
}

impl CardinalityAnalyzer {
    /// `type_predicate` is excluded from analysis; it is never a column.
    pub fn new(type_predicate: impl Into<String>) -> Self {
        Self {
            type_predicate: type_predicate.into(),
        }
    }

    /// Stats for each predicate carried by at least one instance of the class.
    #[instrument(skip(self, store, ctx, predicate_uris), fields(predicates = predicate_uris.len()))]
    pub async fn analyze(
        &self,
        store: &dyn TripleStore,
        ctx: &ReadContext,
        class_uri: &str,
        predicate_uris: &[String],
    ) -> Result<BTreeMap<String, CardinalityStats>> {
        if predicate_uris.is_empty() {
            return Ok(BTreeMap::new());
        }
        let counts = ctx
            .read("count_values_per_subject", move || {
                store.count_values_per_subject(class_uri, predicate_uris)
            })
            .await?;

        let stats: BTreeMap<String, CardinalityStats> = counts
            .into_iter()
            .filter_map(|(predicate, counts)| {
                CardinalityStats::from_counts(&counts).map(|stats| (predicate, stats))
            })
            .collect();
        debug!(
            class = class_uri,
            analyzed = stats.len(),
            multi_valued = stats.values().filter(|s| s.is_multi_valued()).count(),
            "Computed cardinality"
        );
        Ok(stats)
    }

    /// Analyzes every profiled class. Classes left with no predicates are omitted.
    #[instrument(skip_all, fields(classes = profiles.len()))]
    pub async fn analyze_profiles(
        &self,
        store: &dyn TripleStore,
        ctx: &ReadContext,
        profiles: &[ProfileData],
    ) -> Result<CardinalityIndex> {
        let mut index = CardinalityIndex::default();
        for profile in profiles {
            let predicates: Vec<String> = profile
                .predicates
                .iter()
                .filter(|p| p.predicate_uri != self.type_predicate)
                .map(|p| p.predicate_uri.clone())
                .collect();
            if predicates.is_empty() {
                continue;
            }
            let stats = self
                .analyze(store, ctx, &profile.class_uri, &predicates)
                .await?;
            index.insert(
                profile.class_uri.clone(),
                ClassCardinality {
                    class_name: profile.class_name.clone(),
                    instance_count: profile.instance_count,
                    predicates: stats,
                },
            );
        }
        index.metadata.insert(
            "timestamp".to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );
        info!(classes = index.classes.len(), "Cardinality analysis complete");
        Ok(index)
    }
}
