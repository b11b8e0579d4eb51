//! Foreign-key target resolution.
//!
//! A reference column whose predicate points at instances of several tables
//! keeps a single target: the one with the highest aggregated reference count.
//! Equal counts go to the lexicographically smallest table name. The dropped
//! targets are reported as [`Diagnostic::AmbiguousForeignKey`].

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::naming::NamingPlan;
use crate::profile::ClassProfile;
use crate::sql::Ident;

/// The target chosen for one reference column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedForeignKey {
    pub target_table: Ident,
    /// References counted toward the chosen target
    pub count: u64,
    pub predicate_uri: String,
}

/// Resolved targets keyed by `(table, column)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignKeyMap {
    entries: BTreeMap<(Ident, Ident), ResolvedForeignKey>,
}

impl ForeignKeyMap {
    pub fn get(&self, table: &Ident, column: &Ident) -> Option<&ResolvedForeignKey> {
        self.entries.get(&(table.clone(), column.clone()))
    }

    /// Resolved columns of one table, ordered by column name.
    pub fn for_table<'a>(
        &'a self,
        table: &'a Ident,
    ) -> impl Iterator<Item = (&'a Ident, &'a ResolvedForeignKey)> + 'a {
        self.entries
            .iter()
            .filter(move |((t, _), _)| t == table)
            .map(|((_, column), fk)| (column, fk))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Ident, Ident), &ResolvedForeignKey)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct Candidate<'a> {
    count: u64,
    predicate_uri: &'a str,
}

/// Picks one target table per reference column.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignKeyResolver;

impl ForeignKeyResolver {
    /// Resolves every `references_to` edge of `profiles`, named by `naming`.
    ///
    /// Edges toward classes without a table and predicates without a column
    /// (the typing predicate) are skipped.
    #[instrument(skip_all, fields(profiles = profiles.len()))]
    pub fn resolve(
        &self,
        profiles: &[ClassProfile],
        naming: &NamingPlan,
        diagnostics: &mut Diagnostics,
    ) -> ForeignKeyMap {
        let mut candidates: BTreeMap<(Ident, Ident), BTreeMap<Ident, Candidate<'_>>> =
            BTreeMap::new();

        for (index, profile) in profiles.iter().enumerate() {
            let Some(names) = naming.for_profile(index) else {
                continue;
            };
            for edge in profile.references_to() {
                let Some(target) = naming.table_for_class(&edge.target_class_uri) else {
                    debug!(
                        table = %names.table,
                        target = %edge.target_class_uri,
                        "Reference target has no table, skipping"
                    );
                    continue;
                };
                for predicate in &edge.predicates {
                    let Some(column) = names.column_for(&predicate.predicate_uri) else {
                        continue;
                    };
                    let candidate = candidates
                        .entry((names.table.clone(), column.clone()))
                        .or_default()
                        .entry(target.clone())
                        .or_default();
                    if candidate.predicate_uri.is_empty() {
                        candidate.predicate_uri = &predicate.predicate_uri;
                    }
                    candidate.count += predicate.count;
                }
            }
        }

        let mut resolved = ForeignKeyMap::default();
        for ((table, column), targets) in candidates {
            // On equal counts the smaller table name compares greater.
            let Some((chosen, best)) = targets.iter().max_by(|(a_name, a), (b_name, b)| {
                a.count.cmp(&b.count).then_with(|| b_name.cmp(a_name))
            }) else {
                continue;
            };

            if targets.len() > 1 {
                diagnostics.push(Diagnostic::AmbiguousForeignKey {
                    table: table.to_string(),
                    column: column.to_string(),
                    chosen: chosen.to_string(),
                    chosen_count: best.count,
                    discarded: targets
                        .iter()
                        .filter(|(name, _)| *name != chosen)
                        .map(|(name, candidate)| (name.to_string(), candidate.count))
                        .collect(),
                });
            }
            resolved.entries.insert(
                (table, column),
                ResolvedForeignKey {
                    target_table: chosen.clone(),
                    count: best.count,
                    predicate_uri: best.predicate_uri.to_string(),
                },
            );
        }
        info!(foreign_keys = resolved.len(), "Resolved foreign key targets");
        resolved
    }
}
