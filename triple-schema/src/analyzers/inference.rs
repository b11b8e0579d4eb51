//! Storage type inference from sampled object values.
//!
//! Samples are tested against an ordered list of patterns and the first
//! pattern every sample matches decides the type:
//!
//! 1. ISO-8601 timestamp → `TIMESTAMP WITH TIME ZONE`
//! 2. ISO-8601 date → `DATE`
//! 3. `true`/`false`/`1`/`0` (any case) → `BOOLEAN`
//! 4. integers → `SMALLINT`, `INTEGER` or `BIGINT` by largest magnitude
//! 5. decimal numbers → `DOUBLE PRECISION`
//! 6. `http(s)://` URIs → `TEXT`
//! 7. anything else → `TEXT`
//!
//! Sampling is not statistical: with deterministic sampling the first N values
//! ordered by (subject, object) are used, otherwise the first N the store returns.
//!
//! # Example
//!
//! ```rust
//! use triple_schema::analyzers::inference::{InferenceBasis, TypeInferencer};
//! use triple_schema::sql::SqlType;
//!
//! let inferencer = TypeInferencer::new();
//! let samples = vec!["10".to_string(), "20".to_string(), "30.5".to_string()];
//! let info = inferencer.classify(&samples);
//! assert_eq!(info.postgresql_type, SqlType::DoublePrecision);
//! assert_eq!(info.inference_basis, InferenceBasis::AllSamplesAreNumeric);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{ErrorContext, Result};
use crate::sql::SqlType;
use crate::store::{ReadContext, TripleStore};

/// Why a type was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBasis {
    NoSamplesFound,
    AllSamplesMatchTimestampPattern,
    AllSamplesMatchDatePattern,
    AllSamplesAreBooleanValues,
    AllSamplesAreIntegers,
    AllSamplesAreNumeric,
    AllSamplesAreUris,
    MixedOrTextValues,
}

/// Measurements taken while classifying samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDetails {
    /// Largest absolute integer value; only set when every sample is an integer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_int_value: Option<u64>,
    /// Longest sample, in characters
    #[serde(default)]
    pub max_string_length: usize,
}

/// Inferred type of one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateTypeInfo {
    pub postgresql_type: SqlType,
    pub samples_analyzed: usize,
    pub inference_basis: InferenceBasis,
    #[serde(default)]
    pub details: TypeDetails,
}

/// Inferred types keyed by predicate URI.
///
/// A predicate missing from the map is treated as `TEXT` downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub types: BTreeMap<String, PredicateTypeInfo>,
}

impl TypeInfo {
    pub fn get(&self, predicate_uri: &str) -> Option<&PredicateTypeInfo> {
        self.types.get(predicate_uri)
    }

    /// Inferred storage type, if the predicate was analyzed.
    pub fn type_of(&self, predicate_uri: &str) -> Option<SqlType> {
        self.get(predicate_uri).map(|info| info.postgresql_type)
    }

    pub fn insert(&mut self, predicate_uri: impl Into<String>, info: PredicateTypeInfo) {
        self.types.insert(predicate_uri.into(), info);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a previously written type document.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading type info from {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

struct Patterns {
    timestamp: Regex,
    date: Regex,
    integer: Regex,
    float: Regex,
    uri: Regex,
}

// Hard-coded patterns, known to compile
#[allow(clippy::unwrap_used)]
static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    timestamp: Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}").unwrap(),
    date: Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap(),
    integer: Regex::new(r"^[+-]?[0-9]+$").unwrap(),
    float: Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap(),
    uri: Regex::new(r"^https?://").unwrap(),
});

/// Running "every sample so far matches" flags.
struct SampleStats {
    all_timestamps: bool,
    all_dates: bool,
    all_booleans: bool,
    all_integers: bool,
    all_floats: bool,
    all_uris: bool,
    max_int_value: u64,
    max_string_length: usize,
}

impl SampleStats {
    fn new() -> Self {
        Self {
            all_timestamps: true,
            all_dates: true,
            all_booleans: true,
            all_integers: true,
            all_floats: true,
            all_uris: true,
            max_int_value: 0,
            max_string_length: 0,
        }
    }

    fn observe(&mut self, raw: &str) {
        let value = raw.trim();
        self.max_string_length = self.max_string_length.max(value.chars().count());

        self.all_timestamps &= PATTERNS.timestamp.is_match(value);
        self.all_dates &= PATTERNS.date.is_match(value);
        self.all_booleans &= matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "false" | "1" | "0"
        );
        self.all_uris &= PATTERNS.uri.is_match(value);
        self.all_floats &= PATTERNS.float.is_match(value);

        if self.all_integers {
            // Values beyond i64 cannot be stored in BIGINT; they fall through to DOUBLE PRECISION.
            match value.parse::<i64>() {
                Ok(n) if PATTERNS.integer.is_match(value) => {
                    self.max_int_value = self.max_int_value.max(n.unsigned_abs());
                }
                _ => self.all_integers = false,
            }
        }
    }

    fn decide(&self) -> (SqlType, InferenceBasis) {
        if self.all_timestamps {
            (SqlType::TimestampTz, InferenceBasis::AllSamplesMatchTimestampPattern)
        } else if self.all_dates {
            (SqlType::Date, InferenceBasis::AllSamplesMatchDatePattern)
        } else if self.all_booleans {
            (SqlType::Boolean, InferenceBasis::AllSamplesAreBooleanValues)
        } else if self.all_integers {
            (
                SqlType::integer_for_magnitude(self.max_int_value),
                InferenceBasis::AllSamplesAreIntegers,
            )
        } else if self.all_floats {
            (SqlType::DoublePrecision, InferenceBasis::AllSamplesAreNumeric)
        } else if self.all_uris {
            (SqlType::Text, InferenceBasis::AllSamplesAreUris)
        } else {
            (SqlType::Text, InferenceBasis::MixedOrTextValues)
        }
    }
}

/// Samples predicate values and infers their storage type.
#[derive(Debug, Clone)]
pub struct TypeInferencer {
    sample_size: usize,
    deterministic: bool,
}

impl Default for TypeInferencer {
    fn default() -> Self {
        Self {
            sample_size: 100,
            deterministic: true,
        }
    }
}

impl TypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Order samples by (subject, object) so reruns see the same values.
    pub fn deterministic(mut self, enabled: bool) -> Self {
        self.deterministic = enabled;
        self
    }

    /// Classifies already sampled values.
    pub fn classify(&self, samples: &[String]) -> PredicateTypeInfo {
        if samples.is_empty() {
            return PredicateTypeInfo {
                postgresql_type: SqlType::Text,
                samples_analyzed: 0,
                inference_basis: InferenceBasis::NoSamplesFound,
                details: TypeDetails::default(),
            };
        }

        let mut stats = SampleStats::new();
        for sample in samples {
            stats.observe(sample);
        }
        let (postgresql_type, inference_basis) = stats.decide();
        PredicateTypeInfo {
            postgresql_type,
            samples_analyzed: samples.len(),
            inference_basis,
            details: TypeDetails {
                max_int_value: stats.all_integers.then_some(stats.max_int_value),
                max_string_length: stats.max_string_length,
            },
        }
    }

    /// Samples one predicate from the store and classifies it.
    #[instrument(skip(self, store, ctx))]
    pub async fn infer(
        &self,
        store: &dyn TripleStore,
        ctx: &ReadContext,
        predicate_uri: &str,
    ) -> Result<PredicateTypeInfo> {
        let (limit, ordered) = (self.sample_size, self.deterministic);
        let samples = ctx
            .read("sample_objects", move || {
                store.sample_objects(predicate_uri, limit, ordered)
            })
            .await?;
        let info = self.classify(&samples);
        debug!(
            predicate = predicate_uri,
            samples = info.samples_analyzed,
            inferred = %info.postgresql_type,
            basis = ?info.inference_basis,
            "Inferred predicate type"
        );
        Ok(info)
    }

    /// Infers every predicate, in sorted order.
    #[instrument(skip_all, fields(sample_size = self.sample_size))]
    pub async fn infer_all<'p>(
        &self,
        store: &dyn TripleStore,
        ctx: &ReadContext,
        predicate_uris: impl IntoIterator<Item = &'p str>,
    ) -> Result<TypeInfo> {
        let mut predicates: Vec<&str> = predicate_uris.into_iter().collect();
        predicates.sort_unstable();
        predicates.dedup();

        let mut type_info = TypeInfo::default();
        for predicate_uri in &predicates {
            let info = self.infer(store, ctx, predicate_uri).await?;
            type_info.insert(*predicate_uri, info);
        }

        type_info.metadata.insert(
            "timestamp".to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );
        type_info
            .metadata
            .insert("sample_size".to_string(), self.sample_size.into());
        type_info
            .metadata
            .insert("total_predicates".to_string(), predicates.len().into());
        info!(predicates = predicates.len(), "Type inference complete");
        Ok(type_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::DataFusionTripleStore;

    fn classify(values: &[&str]) -> PredicateTypeInfo {
        let samples: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        TypeInferencer::new().classify(&samples)
    }

    #[test]
    fn test_no_samples() {
        let info = classify(&[]);
        assert_eq!(info.postgresql_type, SqlType::Text);
        assert_eq!(info.inference_basis, InferenceBasis::NoSamplesFound);
        assert_eq!(info.samples_analyzed, 0);
    }

    #[test]
    fn test_temporal_patterns() {
        let ts = classify(&["2021-03-04T10:11:12Z", "2020-01-01T00:00:00.000+01:00"]);
        assert_eq!(ts.postgresql_type, SqlType::TimestampTz);
        let date = classify(&["2021-03-04", "1999-12-31"]);
        assert_eq!(date.postgresql_type, SqlType::Date);
        let mixed = classify(&["2021-03-04", "2021-03-04T10:11:12Z"]);
        assert_eq!(mixed.postgresql_type, SqlType::Text);
    }

    #[test]
    fn test_boolean_beats_integer() {
        let info = classify(&["1", "0", "TRUE", "false"]);
        assert_eq!(info.postgresql_type, SqlType::Boolean);
        let only_digits = classify(&["1", "0", "1"]);
        assert_eq!(only_digits.postgresql_type, SqlType::Boolean);
    }

    #[test]
    fn test_integer_widths() {
        let small = classify(&["12", "45", "7"]);
        assert!(small.postgresql_type.is_integer());
        assert_eq!(small.postgresql_type, SqlType::SmallInt);
        assert_eq!(small.details.max_int_value, Some(45));

        assert_eq!(classify(&["-40000"]).postgresql_type, SqlType::Integer);
        assert_eq!(classify(&["3000000000"]).postgresql_type, SqlType::BigInt);
        assert_eq!(
            classify(&["99999999999999999999"]).postgresql_type,
            SqlType::DoublePrecision
        );
    }

    #[test]
    fn test_numeric_and_text() {
        let info = classify(&["10", "20", "30.5"]);
        assert_eq!(info.postgresql_type, SqlType::DoublePrecision);
        assert_eq!(info.details.max_int_value, None);

        let uris = classify(&["http://a/1", "https://b/2"]);
        assert_eq!(uris.inference_basis, InferenceBasis::AllSamplesAreUris);
        assert_eq!(uris.postgresql_type, SqlType::Text);

        let text = classify(&["abc", "12"]);
        assert_eq!(text.inference_basis, InferenceBasis::MixedOrTextValues);
        assert_eq!(text.details.max_string_length, 3);
    }

    #[test]
    fn test_non_ascii_digits_stay_text() {
        // Full-width and Arabic-Indic digits do not cast to numeric types.
        let full_width = classify(&["１２", "４５"]);
        assert_eq!(full_width.postgresql_type, SqlType::Text);
        assert_eq!(full_width.inference_basis, InferenceBasis::MixedOrTextValues);

        let arabic = classify(&["٣.٥"]);
        assert_eq!(arabic.postgresql_type, SqlType::Text);

        let date = classify(&["２０２１-０３-０４"]);
        assert_eq!(date.postgresql_type, SqlType::Text);
    }

    #[test]
    fn test_type_info_json_shape() {
        let mut type_info = TypeInfo::default();
        type_info.insert("http://x/p", classify(&["12", "45", "7"]));
        let json: serde_json::Value =
            serde_json::from_str(&type_info.to_json_string().unwrap()).unwrap();
        let entry = &json["types"]["http://x/p"];
        assert_eq!(entry["postgresql_type"], "SMALLINT");
        assert_eq!(entry["inference_basis"], "all_samples_are_integers");
        assert_eq!(entry["details"]["max_int_value"], 45);

        let parsed = TypeInfo::from_json_str(&json.to_string()).unwrap();
        assert_eq!(parsed.type_of("http://x/p"), Some(SqlType::SmallInt));
        assert_eq!(parsed.type_of("http://x/q"), None);
    }

    #[tokio::test]
    async fn test_infer_all_from_store() {
        let triples = vec![
            ("s1", "http://x/rows", "12"),
            ("s2", "http://x/rows", "45"),
            ("s3", "http://x/rows", "7"),
            ("s1", "http://x/when", "2020-01-01"),
        ];
        let store = DataFusionTripleStore::from_triples(triples, &StoreConfig::default()).unwrap();
        let ctx = ReadContext::default();
        let info = TypeInferencer::new()
            .infer_all(&store, &ctx, ["http://x/rows", "http://x/when", "http://x/none"])
            .await
            .unwrap();
        assert_eq!(info.len(), 3);
        assert!(info.type_of("http://x/rows").unwrap().is_integer());
        assert_eq!(info.type_of("http://x/when"), Some(SqlType::Date));
        assert_eq!(
            info.get("http://x/none").unwrap().inference_basis,
            InferenceBasis::NoSamplesFound
        );
        assert_eq!(info.metadata["total_predicates"], 3);
    }
}
