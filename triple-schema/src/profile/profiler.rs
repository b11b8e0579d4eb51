//! Computes class profiles from a triple store.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::merge::coverage;
use crate::namespaces::{namespace_of, shorten_uri};
use crate::profile::types::{EdgePredicate, PredicateUsage, ProfileData, ReferenceEdge};
use crate::store::{EdgeCount, ReadContext, TripleStore};

/// Builds [`ProfileData`] for every class found in a store.
pub struct ClassProfiler<'a> {
    store: &'a dyn TripleStore,
    ctx: &'a ReadContext,
}

impl<'a> ClassProfiler<'a> {
    pub fn new(store: &'a dyn TripleStore, ctx: &'a ReadContext) -> Self {
        Self { store, ctx }
    }

    /// Profiles every class used as a type, in class URI order.
    #[instrument(skip(self))]
    pub async fn profile_all(&self) -> Result<Vec<ProfileData>> {
        let store = self.store;
        let classes = self
            .ctx
            .read("class_uris", move || store.class_uris())
            .await?;
        info!(classes = classes.len(), "Profiling classes");

        let mut profiles = Vec::with_capacity(classes.len());
        for class_uri in &classes {
            profiles.push(self.profile_class(class_uri).await?);
        }
        Ok(profiles)
    }

    /// Profiles one class.
    #[instrument(skip(self))]
    pub async fn profile_class(&self, class_uri: &str) -> Result<ProfileData> {
        let store = self.store;
        let instance_count = self
            .ctx
            .read("count_instances", move || store.count_instances(class_uri))
            .await?;
        let usage = self
            .ctx
            .read("predicate_usage", move || store.predicate_usage(class_uri))
            .await?;
        let outgoing = self
            .ctx
            .read("outgoing_references", move || {
                store.outgoing_references(class_uri)
            })
            .await?;
        let incoming = self
            .ctx
            .read("incoming_references", move || {
                store.incoming_references(class_uri)
            })
            .await?;

        let predicates = usage
            .into_iter()
            .map(|(predicate_uri, usage_count)| PredicateUsage {
                predicate_short: shorten_uri(&predicate_uri),
                namespace: namespace_of(&predicate_uri).to_string(),
                coverage_percentage: coverage(usage_count, instance_count),
                predicate_uri,
                usage_count,
            })
            .collect::<Vec<_>>();

        let profile = ProfileData {
            class_uri: class_uri.to_string(),
            class_name: shorten_uri(class_uri),
            instance_count,
            predicates,
            references_to: group_edges(outgoing),
            referenced_by: group_edges(incoming),
        };
        debug!(
            class = %profile.class_name,
            instances = instance_count,
            predicates = profile.predicates.len(),
            references_to = profile.references_to.len(),
            referenced_by = profile.referenced_by.len(),
            "Profiled class"
        );
        Ok(profile)
    }
}

/// Groups per-predicate edge counts by class, heaviest edge first.
fn group_edges(counts: Vec<EdgeCount>) -> Vec<ReferenceEdge> {
    let mut by_class: BTreeMap<String, ReferenceEdge> = BTreeMap::new();
    for count in counts {
        let edge = by_class
            .entry(count.class_uri.clone())
            .or_insert_with(|| ReferenceEdge {
                target_class_name: shorten_uri(&count.class_uri),
                target_class_uri: count.class_uri.clone(),
                reference_count: 0,
                predicates: Vec::new(),
            });
        edge.predicates.push(EdgePredicate {
            predicate_short: shorten_uri(&count.predicate_uri),
            predicate_uri: count.predicate_uri,
            count: count.count,
        });
    }
    let mut edges: Vec<ReferenceEdge> = by_class
        .into_values()
        .map(|mut edge| {
            edge.recount();
            edge.predicates.sort_by(|a, b| b.count.cmp(&a.count));
            edge
        })
        .collect();
    edges.sort_by(|a, b| b.reference_count.cmp(&a.reference_count));
    edges
}
