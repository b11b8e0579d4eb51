//! Property-based tests for naming, cardinality statistics and the array decision.
//!
//! - Column naming never maps two predicates of one table to one column
//!   silently: it either yields distinct names or reports the collision.
//! - Percentiles stay within the observed range.
//! - A column is an array exactly when it is not functional and some
//!   contributing class has a subject with more than one value.
//! - `prefix || id` reproduces every URI, whatever prefixes a table knows.

mod common;

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;
use triple_schema::analyzers::{
    percentile_cont, CardinalityIndex, CardinalityStats, ClassCardinality, TypeInfo,
};
use triple_schema::naming::ColumnNamer;
use triple_schema::prelude::*;
use triple_schema::profile::PredicateUsage;

const NAMESPACES: [(&str, &str); 3] = [
    ("cpmeta", "http://meta.icos-cp.eu/ontologies/cpmeta/"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
];

/// `(uri, short)` predicate names, adversarial in case and punctuation.
fn predicate() -> impl Strategy<Value = (String, String)> {
    (0..NAMESPACES.len(), "[a-zA-Z][a-zA-Z0-9_.-]{0,10}").prop_map(|(ns, local)| {
        let (prefix, base) = NAMESPACES[ns];
        (format!("{base}{local}"), format!("{prefix}:{local}"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Functional,
    NonFunctional,
    Unknown,
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::Functional),
        Just(Kind::NonFunctional),
        Just(Kind::Unknown)
    ]
}

const KEYWORD: &str = "http://meta.icos-cp.eu/ontologies/cpmeta/hasKeyword";

fn usage(instances: u64) -> PredicateUsage {
    PredicateUsage {
        predicate_uri: KEYWORD.to_string(),
        predicate_short: "cpmeta:hasKeyword".to_string(),
        namespace: "cpmeta".to_string(),
        usage_count: instances,
        coverage_percentage: 100.0,
    }
}

fn profile(local: &str, instances: u64) -> ProfileData {
    ProfileData {
        class_uri: format!("http://meta.icos-cp.eu/ontologies/cpmeta/{local}"),
        class_name: format!("cpmeta:{local}"),
        instance_count: instances,
        predicates: vec![usage(instances)],
        references_to: vec![],
        referenced_by: vec![],
    }
}

fn cardinality_of(entries: &[(&ProfileData, &[u64])]) -> CardinalityIndex {
    let mut index = CardinalityIndex::default();
    for (profile, counts) in entries {
        let mut predicates = BTreeMap::new();
        if let Some(stats) = CardinalityStats::from_counts(counts) {
            predicates.insert(KEYWORD.to_string(), stats);
        }
        index.insert(
            profile.class_uri.clone(),
            ClassCardinality {
                class_name: profile.class_name.clone(),
                instance_count: profile.instance_count,
                predicates,
            },
        );
    }
    index
}

fn ontology_for(kind: Kind) -> OntologyProperties {
    let none: Vec<String> = Vec::new();
    match kind {
        Kind::Functional => OntologyProperties::new(vec![KEYWORD.to_string()], none),
        Kind::NonFunctional => OntologyProperties::new(none, vec![KEYWORD.to_string()]),
        Kind::Unknown => OntologyProperties::new(none.clone(), none),
    }
}

fn keyword_is_array(
    profiles: &[ProfileData],
    cardinality: &CardinalityIndex,
    kind: Kind,
    table: &str,
) -> bool {
    let ontology = ontology_for(kind);
    let prefixes = PrefixMap::new();
    let pipeline =
        SchemaPipeline::new(PipelineConfig::default(), &ontology, &prefixes).unwrap();
    let build = pipeline
        .build(profiles, &TypeInfo::default(), cardinality)
        .unwrap();
    build
        .table(table)
        .and_then(|t| t.column("has_keyword"))
        .expect("keyword column planned")
        .is_array
}

fn known_prefixes() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("https?://x/[ab'é]{0,2}/?", 0..5)
}

fn uris() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("(https?://x/)?[ab'é/]{0,5}", 1..20)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prefix_and_id_round_trip_every_uri(prefixes in known_prefixes(), uris in uris()) {
        let refs: Vec<&str> = prefixes.iter().map(String::as_str).collect();
        let strategy = common::strategy(&refs);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let rows = runtime.block_on(common::split_uris(&strategy, &uris));

        prop_assert_eq!(rows.len(), uris.len());
        for row in &rows {
            prop_assert!(row.round_trips(), "{:?}", row);
            prop_assert!(row.prefix.is_empty() || strategy.prefixes().contains(&row.prefix.as_str()));
            // The longest matching prefix is the one stored.
            let longest = strategy
                .prefixes()
                .into_iter()
                .filter(|p| row.uri.starts_with(p))
                .map(|p| p.chars().count())
                .max()
                .unwrap_or(0);
            prop_assert_eq!(row.prefix.chars().count(), longest);
        }
    }
}

proptest! {
    #[test]
    fn column_names_are_injective_or_collide(
        predicates in prop::collection::vec(predicate(), 1..12)
    ) {
        let pairs: Vec<(&str, &str)> = predicates
            .iter()
            .map(|(uri, short)| (uri.as_str(), short.as_str()))
            .collect();
        let distinct: HashSet<&str> = pairs.iter().map(|(uri, _)| *uri).collect();

        match ColumnNamer::new("ct_things", None).assign(&pairs) {
            Ok(names) => {
                prop_assert_eq!(names.len(), distinct.len());
                let columns: HashSet<&str> = names.values().map(|c| c.as_str()).collect();
                prop_assert_eq!(columns.len(), names.len());
                for column in columns {
                    prop_assert!(!["id", "rdf_subject", "prefix"].contains(&column));
                }
            }
            Err(SchemaError::ColumnNameCollision { first_predicate, second_predicate, .. }) => {
                prop_assert_ne!(first_predicate, second_predicate);
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    #[test]
    fn percentile_stays_within_range(
        mut counts in prop::collection::vec(0u64..1_000, 1..200),
        fraction in 0.0f64..=1.0,
    ) {
        counts.sort_unstable();
        let value = percentile_cont(&counts, fraction);
        prop_assert!(value >= counts[0] as f64);
        prop_assert!(value <= counts[counts.len() - 1] as f64);

        let stats = CardinalityStats::from_counts(&counts).unwrap();
        prop_assert!(stats.p95_values <= stats.max_values as f64);
        prop_assert!(stats.avg_values >= stats.min_values as f64);
        prop_assert!(stats.avg_values <= stats.max_values as f64);
    }

    #[test]
    fn array_decision_follows_ontology_and_max_cardinality(
        counts in prop::collection::vec(1u64..4, 0..30),
        kind in kind(),
    ) {
        let sensors = profile("Sensor", counts.len().max(1) as u64);
        let cardinality = cardinality_of(&[(&sensors, counts.as_slice())]);
        let max = counts.iter().copied().max().unwrap_or(0);

        let expected = kind != Kind::Functional && max > 1;
        prop_assert_eq!(
            keyword_is_array(&[sensors], &cardinality, kind, "ct_sensors"),
            expected
        );
    }

    #[test]
    fn union_array_decision_takes_max_over_members(
        station_counts in prop::collection::vec(1u64..3, 0..10),
        as_counts in prop::collection::vec(1u64..3, 0..10),
        kind in kind(),
    ) {
        let station = profile("Station", 10);
        let atmosphere = profile("AS", 10);
        let cardinality = cardinality_of(&[
            (&station, station_counts.as_slice()),
            (&atmosphere, as_counts.as_slice()),
        ]);
        let max = station_counts.iter().chain(&as_counts).copied().max().unwrap_or(0);

        let expected = kind != Kind::Functional && max > 1;
        prop_assert_eq!(
            keyword_is_array(&[station, atmosphere], &cardinality, kind, "ct_stations"),
            expected
        );
    }
}
