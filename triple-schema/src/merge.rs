//! Merging related classes into discriminated union tables.
//!
//! The merge groups are static configuration compiled into the crate
//! ([`default_merge_groups`]); they are never inferred from data. Each group
//! names a union table, its member classes and the discriminator column that
//! records which member a row came from.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Result, SchemaError};
use crate::profile::{
    ClassProfile, EdgePredicate, MergedProfile, PredicateUsage, ProfileData, ReferenceEdge,
};
use crate::security::SqlSecurity;

/// Configuration of one union table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub union_table_name: String,
    /// Member class names, general before specific.
    pub member_class_names: Vec<String>,
    pub type_column: String,
    /// Class name to discriminator value.
    pub type_values: BTreeMap<String, String>,
    /// Discriminator used when a row's class is unknown.
    pub default_type: String,
}

impl MergeConfig {
    /// Creates a config whose default discriminator is the first member's value.
    pub fn new(
        union_table_name: impl Into<String>,
        type_column: impl Into<String>,
        members: &[(&str, &str)],
    ) -> Self {
        let default_type = members
            .first()
            .map(|(_, value)| value.to_string())
            .unwrap_or_default();
        Self {
            union_table_name: union_table_name.into(),
            member_class_names: members.iter().map(|(name, _)| name.to_string()).collect(),
            type_column: type_column.into(),
            type_values: members
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            default_type,
        }
    }

    pub fn with_default_type(mut self, default_type: impl Into<String>) -> Self {
        self.default_type = default_type.into();
        self
    }

    /// Discriminator for a member class; falls back to the default.
    pub fn discriminator_for(&self, class_name: &str) -> &str {
        self.type_values
            .get(class_name)
            .map(String::as_str)
            .unwrap_or(&self.default_type)
    }

    /// Allowed discriminator values in member order, without duplicates.
    pub fn allowed_values(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.member_class_names
            .iter()
            .map(|name| self.discriminator_for(name))
            .chain(std::iter::once(self.default_type.as_str()))
            .filter(|value| seen.insert(*value))
            .collect()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.member_class_names.iter().any(|n| n == class_name)
    }

    /// Checks identifiers and that every discriminator is a configured value.
    pub fn validate(&self) -> Result<()> {
        SqlSecurity::validate_identifier(&self.union_table_name)?;
        SqlSecurity::validate_identifier(&self.type_column)?;
        if self.member_class_names.is_empty() {
            return Err(SchemaError::configuration(format!(
                "Merge group '{}' has no member classes",
                self.union_table_name
            )));
        }
        let configured: HashSet<&str> = self.type_values.values().map(String::as_str).collect();
        if !configured.contains(self.default_type.as_str()) {
            return Err(SchemaError::configuration(format!(
                "Merge group '{}': default type '{}' is not one of the configured type values",
                self.union_table_name, self.default_type
            )));
        }
        if let Some(stray) = self
            .type_values
            .keys()
            .find(|name| !self.contains(name.as_str()))
        {
            return Err(SchemaError::configuration(format!(
                "Merge group '{}': type value given for non-member class '{stray}'",
                self.union_table_name
            )));
        }
        Ok(())
    }
}

/// The compiled-in merge groups.
pub fn default_merge_groups() -> Vec<MergeConfig> {
    vec![
        MergeConfig::new(
            "ct_object_specs",
            "spec_type",
            &[
                ("cpmeta:SimpleObjectSpec", "simple"),
                ("cpmeta:DataObjectSpec", "data"),
            ],
        ),
        MergeConfig::new(
            "ct_spatial_coverages",
            "coverage_type",
            &[
                ("cpmeta:SpatialCoverage", "spatial"),
                ("cpmeta:LatLonBox", "latlon"),
                ("cpmeta:Position", "position"),
            ],
        ),
        MergeConfig::new(
            "ct_organizations",
            "org_type",
            &[
                ("cpmeta:Organization", "organization"),
                ("cpmeta:TC", "thematic_center"),
                ("cpmeta:Facility", "central_facility"),
            ],
        ),
        MergeConfig::new(
            "ct_stations",
            "station_type",
            &[
                ("cpmeta:Station", "station"),
                ("cpmeta:AS", "as"),
                ("cpmeta:ES", "es"),
                ("cpmeta:OS", "os"),
                ("cpmeta:SailDrone", "saildrone"),
                ("cpmeta:IngosStation", "ingos"),
                ("cpmeta:AtmoStation", "atmo"),
            ],
        ),
        MergeConfig::new(
            "ct_dataset_specs",
            "dataset_type",
            &[
                ("cpmeta:DatasetSpec", "dataset"),
                ("cpmeta:TabularDatasetSpec", "tabular"),
            ],
        ),
    ]
}

/// Applies merge groups to a set of class profiles.
#[derive(Debug, Clone)]
pub struct ClassMerger {
    configs: Vec<MergeConfig>,
}

impl Default for ClassMerger {
    fn default() -> Self {
        Self {
            configs: default_merge_groups(),
        }
    }
}

impl ClassMerger {
    /// Creates a merger after validating every config.
    ///
    /// A class may belong to at most one group.
    pub fn new(configs: Vec<MergeConfig>) -> Result<Self> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for config in &configs {
            config.validate()?;
            for member in &config.member_class_names {
                if let Some(previous) = owner.insert(member.as_str(), config.union_table_name.as_str()) {
                    return Err(SchemaError::configuration(format!(
                        "Class '{member}' is listed in both '{previous}' and '{}'",
                        config.union_table_name
                    )));
                }
            }
        }
        Ok(Self { configs })
    }

    pub fn configs(&self) -> &[MergeConfig] {
        &self.configs
    }

    /// Unions member profiles into one [`MergedProfile`] per group.
    ///
    /// Groups with no member present are skipped. Profiles that belong to no
    /// group pass through unchanged, after the merged ones.
    #[instrument(skip_all, fields(profiles = profiles.len(), groups = self.configs.len()))]
    pub fn merge(&self, profiles: &[ProfileData]) -> Vec<ClassProfile> {
        let by_name: HashMap<&str, &ProfileData> = profiles
            .iter()
            .map(|p| (p.class_name.as_str(), p))
            .collect();

        let mut consumed: HashSet<&str> = HashSet::new();
        let mut result = Vec::with_capacity(profiles.len());

        for config in &self.configs {
            let members: Vec<&ProfileData> = config
                .member_class_names
                .iter()
                .filter_map(|name| by_name.get(name.as_str()).copied())
                .collect();
            if members.is_empty() {
                debug!(table = %config.union_table_name, "No members present, skipping merge group");
                continue;
            }
            consumed.extend(members.iter().map(|m| m.class_name.as_str()));

            let merged = merge_members(config, &members);
            info!(
                table = %config.union_table_name,
                members = ?merged.merged_from,
                instances = merged.data.instance_count,
                predicates = merged.data.predicates.len(),
                "Merged classes into union table"
            );
            result.push(ClassProfile::Merged(merged));
        }

        result.extend(
            profiles
                .iter()
                .filter(|p| !consumed.contains(p.class_name.as_str()))
                .cloned()
                .map(ClassProfile::Simple),
        );
        result
    }
}

fn merge_members(config: &MergeConfig, members: &[&ProfileData]) -> MergedProfile {
    let first = members[0];
    let instance_count: u64 = members.iter().map(|m| m.instance_count).sum();

    // Predicates keyed by URI, first-seen order preserved.
    let mut predicates: Vec<PredicateUsage> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for member in members {
        for usage in &member.predicates {
            match index.get(&usage.predicate_uri) {
                Some(&i) => predicates[i].usage_count += usage.usage_count,
                None => {
                    index.insert(usage.predicate_uri.clone(), predicates.len());
                    predicates.push(usage.clone());
                }
            }
        }
    }
    for usage in &mut predicates {
        usage.coverage_percentage = coverage(usage.usage_count, instance_count);
    }

    MergedProfile {
        data: ProfileData {
            class_uri: first.class_uri.clone(),
            class_name: format!("MERGED:{}", config.union_table_name),
            instance_count,
            predicates,
            references_to: merge_edges(members.iter().map(|m| m.references_to.as_slice())),
            referenced_by: merge_edges(members.iter().map(|m| m.referenced_by.as_slice())),
        },
        merged_from: members.iter().map(|m| m.class_name.clone()).collect(),
        member_class_uris: members.iter().map(|m| m.class_uri.clone()).collect(),
        merge_config: config.clone(),
    }
}

/// Percentage rounded to one decimal, capped at 100.
pub(crate) fn coverage(usage_count: u64, instance_count: u64) -> f64 {
    if instance_count == 0 {
        return 0.0;
    }
    let pct = usage_count as f64 / instance_count as f64 * 100.0;
    ((pct * 10.0).round() / 10.0).min(100.0)
}

/// Unions edges by target class URI, then by predicate URI, summing counts.
fn merge_edges<'a>(edge_lists: impl Iterator<Item = &'a [ReferenceEdge]>) -> Vec<ReferenceEdge> {
    let mut merged: Vec<ReferenceEdge> = Vec::new();
    let mut by_target: HashMap<String, usize> = HashMap::new();

    for edges in edge_lists {
        for edge in edges {
            let slot = *by_target
                .entry(edge.target_class_uri.clone())
                .or_insert_with(|| {
                    merged.push(ReferenceEdge {
                        target_class_uri: edge.target_class_uri.clone(),
                        target_class_name: edge.target_class_name.clone(),
                        reference_count: 0,
                        predicates: Vec::new(),
                    });
                    merged.len() - 1
                });
            let target = &mut merged[slot];
            for pred in &edge.predicates {
                match target
                    .predicates
                    .iter_mut()
                    .find(|p| p.predicate_uri == pred.predicate_uri)
                {
                    Some(existing) => existing.count += pred.count,
                    None => target.predicates.push(EdgePredicate {
                        predicate_uri: pred.predicate_uri.clone(),
                        predicate_short: pred.predicate_short.clone(),
                        count: pred.count,
                    }),
                }
            }
        }
    }

    for edge in &mut merged {
        edge.recount();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(uri: &str, count: u64, coverage: f64) -> PredicateUsage {
        PredicateUsage {
            predicate_uri: uri.to_string(),
            predicate_short: uri.to_string(),
            namespace: "cpmeta".to_string(),
            usage_count: count,
            coverage_percentage: coverage,
        }
    }

    fn edge(target: &str, pred: &str, count: u64) -> ReferenceEdge {
        ReferenceEdge {
            target_class_uri: target.to_string(),
            target_class_name: target.to_string(),
            reference_count: count,
            predicates: vec![EdgePredicate {
                predicate_uri: pred.to_string(),
                predicate_short: pred.to_string(),
                count,
            }],
        }
    }

    fn profile(name: &str, uri: &str, instances: u64) -> ProfileData {
        ProfileData {
            class_uri: uri.to_string(),
            class_name: name.to_string(),
            instance_count: instances,
            predicates: vec![],
            references_to: vec![],
            referenced_by: vec![],
        }
    }

    #[test]
    fn test_default_groups_are_valid() {
        let merger = ClassMerger::new(default_merge_groups()).unwrap();
        assert_eq!(merger.configs().len(), 5);
        let stations = &merger.configs()[3];
        assert_eq!(stations.discriminator_for("cpmeta:AS"), "as");
        assert_eq!(stations.discriminator_for("cpmeta:Unknown"), "station");
        assert_eq!(stations.allowed_values().len(), 7);
    }

    #[test]
    fn test_invalid_default_type_rejected() {
        let config = MergeConfig::new("ct_x", "x_type", &[("cpmeta:A", "a")])
            .with_default_type("nope");
        assert!(ClassMerger::new(vec![config]).is_err());
    }

    #[test]
    fn test_class_in_two_groups_rejected() {
        let a = MergeConfig::new("ct_x", "x_type", &[("cpmeta:A", "a")]);
        let b = MergeConfig::new("ct_y", "y_type", &[("cpmeta:A", "a")]);
        assert!(ClassMerger::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_merge_sums_predicates_and_edges() {
        let mut station = profile("cpmeta:Station", "http://x/Station", 10);
        station.predicates = vec![usage("http://x/hasName", 10, 100.0)];
        station.references_to = vec![edge("http://x/Org", "http://x/hasOwner", 4)];

        let mut atmo = profile("cpmeta:AS", "http://x/AS", 30);
        atmo.predicates = vec![
            usage("http://x/hasName", 30, 100.0),
            usage("http://x/hasElevation", 15, 50.0),
        ];
        atmo.references_to = vec![
            edge("http://x/Org", "http://x/hasOwner", 6),
            edge("http://x/Org", "http://x/hasFunder", 2),
        ];

        let other = profile("cpmeta:DataObject", "http://x/DataObject", 5);

        let merger = ClassMerger::default();
        let merged = merger.merge(&[station, atmo, other]);
        assert_eq!(merged.len(), 2);

        let ClassProfile::Merged(stations) = &merged[0] else {
            panic!("expected merged profile first");
        };
        assert_eq!(stations.data.class_name, "MERGED:ct_stations");
        assert_eq!(stations.merged_from, vec!["cpmeta:Station", "cpmeta:AS"]);
        assert_eq!(stations.member_class_uris, vec!["http://x/Station", "http://x/AS"]);
        assert_eq!(stations.data.instance_count, 40);

        let name = stations
            .data
            .predicates
            .iter()
            .find(|p| p.predicate_uri == "http://x/hasName")
            .unwrap();
        assert_eq!(name.usage_count, 40);
        assert_eq!(name.coverage_percentage, 100.0);

        assert_eq!(stations.data.references_to.len(), 1);
        let org = &stations.data.references_to[0];
        assert_eq!(org.reference_count, 12);
        let owner = org
            .predicates
            .iter()
            .find(|p| p.predicate_uri == "http://x/hasOwner")
            .unwrap();
        assert_eq!(owner.count, 10);

        assert!(matches!(&merged[1], ClassProfile::Simple(p) if p.class_name == "cpmeta:DataObject"));
    }

    #[test]
    fn test_groups_without_members_are_skipped() {
        let merged = ClassMerger::default().merge(&[profile("cpmeta:Thing", "http://x/Thing", 1)]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_merged());
    }
}
