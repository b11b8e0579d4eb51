//! Class profile data model.

use serde::{Deserialize, Serialize};

use crate::merge::MergeConfig;

/// Usage statistics of one predicate within one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateUsage {
    pub predicate_uri: String,
    pub predicate_short: String,
    #[serde(default)]
    pub namespace: String,
    pub usage_count: u64,
    /// Percentage of class instances carrying the predicate, in `[0, 100]`.
    pub coverage_percentage: f64,
}

/// One predicate contributing to a reference edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePredicate {
    pub predicate_uri: String,
    pub predicate_short: String,
    pub count: u64,
}

/// Directed reference from the profiled class to another class (or the reverse
/// for `referenced_by`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    #[serde(rename = "class_uri")]
    pub target_class_uri: String,
    #[serde(rename = "class_name")]
    pub target_class_name: String,
    /// Sum of the predicate counts.
    #[serde(default)]
    pub reference_count: u64,
    pub predicates: Vec<EdgePredicate>,
}

impl ReferenceEdge {
    /// Recomputes `reference_count` from the predicate counts.
    pub fn recount(&mut self) {
        self.reference_count = self.predicates.iter().map(|p| p.count).sum();
    }
}

/// Profile of a single RDF class as produced by profiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub class_uri: String,
    pub class_name: String,
    pub instance_count: u64,
    #[serde(default)]
    pub predicates: Vec<PredicateUsage>,
    #[serde(default)]
    pub references_to: Vec<ReferenceEdge>,
    #[serde(default)]
    pub referenced_by: Vec<ReferenceEdge>,
}

/// Union of several class profiles under one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedProfile {
    /// Combined statistics; `class_uri` is that of the first member.
    pub data: ProfileData,
    /// Exact class names of the members that were present, in configured order.
    pub merged_from: Vec<String>,
    /// Class URIs of the members, parallel to `merged_from`.
    pub member_class_uris: Vec<String>,
    pub merge_config: MergeConfig,
}

/// A class profile, either as profiled or synthesized by merging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassProfile {
    Simple(ProfileData),
    Merged(MergedProfile),
}

impl ClassProfile {
    pub fn data(&self) -> &ProfileData {
        match self {
            ClassProfile::Simple(data) => data,
            ClassProfile::Merged(merged) => &merged.data,
        }
    }

    pub fn class_uri(&self) -> &str {
        &self.data().class_uri
    }

    pub fn class_name(&self) -> &str {
        &self.data().class_name
    }

    pub fn instance_count(&self) -> u64 {
        self.data().instance_count
    }

    pub fn predicates(&self) -> &[PredicateUsage] {
        &self.data().predicates
    }

    pub fn references_to(&self) -> &[ReferenceEdge] {
        &self.data().references_to
    }

    pub fn referenced_by(&self) -> &[ReferenceEdge] {
        &self.data().referenced_by
    }

    pub fn merge_config(&self) -> Option<&MergeConfig> {
        match self {
            ClassProfile::Simple(_) => None,
            ClassProfile::Merged(merged) => Some(&merged.merge_config),
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, ClassProfile::Merged(_))
    }

    /// Original class URIs whose instances populate this profile's table.
    pub fn source_class_uris(&self) -> Vec<&str> {
        match self {
            ClassProfile::Simple(data) => vec![data.class_uri.as_str()],
            ClassProfile::Merged(merged) => {
                merged.member_class_uris.iter().map(String::as_str).collect()
            }
        }
    }

    /// `(class_name, class_uri)` pairs of the original classes.
    pub fn source_classes(&self) -> Vec<(&str, &str)> {
        match self {
            ClassProfile::Simple(data) => vec![(data.class_name.as_str(), data.class_uri.as_str())],
            ClassProfile::Merged(merged) => merged
                .merged_from
                .iter()
                .zip(&merged.member_class_uris)
                .map(|(name, uri)| (name.as_str(), uri.as_str()))
                .collect(),
        }
    }

    pub fn predicate(&self, predicate_uri: &str) -> Option<&PredicateUsage> {
        self.predicates()
            .iter()
            .find(|p| p.predicate_uri == predicate_uri)
    }
}
