//! Table and column names derived from class and predicate names.
//!
//! Names are computed once per run into a [`NamingPlan`] so that the
//! foreign-key resolver and the column planner agree on every column name.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::namespaces::{split_short_name, DEFAULT_NAMESPACE};
use crate::profile::ClassProfile;
use crate::security::RESERVED_WORDS;
use crate::sql::Ident;

/// Columns every generated table carries.
pub const ID_COLUMN: &str = "id";
pub const SUBJECT_COLUMN: &str = "rdf_subject";
pub const PREFIX_COLUMN: &str = "prefix";

/// Prefix shared by all generated tables.
pub const TABLE_PREFIX: &str = "ct_";

const MERGED_MARKER: &str = "MERGED:";

// Hard-coded patterns, known to compile
#[allow(clippy::unwrap_used)]
static CAMEL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
#[allow(clippy::unwrap_used)]
static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
#[allow(clippy::unwrap_used)]
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());
#[allow(clippy::unwrap_used)]
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

/// `hasObjectSpec` → `has_object_spec`
pub fn camel_to_snake(name: &str) -> String {
    let name = CAMEL_WORD.replace_all(name, "${1}_${2}");
    CAMEL_BOUNDARY.replace_all(&name, "${1}_${2}").to_lowercase()
}

/// Replaces everything but `[a-zA-Z0-9_]` with `_`, collapsing and trimming underscores.
pub fn clean_identifier(name: &str) -> String {
    let name = NON_WORD.replace_all(name, "_");
    UNDERSCORES
        .replace_all(&name, "_")
        .trim_matches('_')
        .to_string()
}

fn pluralize(name: &str) -> String {
    if name.ends_with('s') {
        return name.to_string();
    }
    let mut chars = name.chars().rev();
    let last = chars.next();
    let before_last = chars.next();
    match (last, before_last) {
        (Some('y'), Some(c)) if name.chars().count() > 2 && !"aeiou".contains(c) => {
            format!("{}ies", &name[..name.len() - 1])
        }
        _ if name.ends_with(['x', 'z']) || name.ends_with("ch") || name.ends_with("sh") => {
            format!("{name}es")
        }
        _ => format!("{name}s"),
    }
}

/// Table name for a class name such as `cpmeta:DataObject` or `MERGED:ct_stations`.
///
/// ```rust
/// use triple_schema::naming::table_name_for;
///
/// assert_eq!(table_name_for("cpmeta:DataObject").unwrap().as_str(), "ct_data_objects");
/// assert_eq!(table_name_for("prov:Activity").unwrap().as_str(), "ct_prov_activities");
/// assert_eq!(table_name_for("MERGED:ct_stations").unwrap().as_str(), "ct_stations");
/// ```
pub fn table_name_for(class_name: &str) -> Result<Ident> {
    if let Some(table) = class_name.strip_prefix(MERGED_MARKER) {
        return Ident::new(table);
    }
    let (namespace, local) = split_short_name(class_name);
    let mut name = pluralize(&camel_to_snake(local));
    if !namespace.is_empty() && namespace != DEFAULT_NAMESPACE {
        name = format!("{namespace}_{name}");
    }
    let mut name = clean_identifier(&name).to_lowercase();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("t_{name}");
    }
    if RESERVED_WORDS.contains(name.as_str()) {
        name = format!("tbl_{name}");
    }
    Ident::derived(&[&format!("{TABLE_PREFIX}{name}")])
}

/// Column name of a predicate before per-table disambiguation.
///
/// ```rust
/// use triple_schema::naming::column_base_name;
///
/// assert_eq!(column_base_name("prov:endedAtTime"), "ended_at_time");
/// assert_eq!(column_base_name("cpmeta:hasObjectSpec"), "has_object_spec");
/// ```
pub fn column_base_name(predicate_short: &str) -> String {
    let (_, local) = split_short_name(predicate_short);
    clean_identifier(&camel_to_snake(local)).to_lowercase()
}

fn finish_column_name(name: &str, system: &HashSet<&str>) -> Result<Ident> {
    let mut name = if name.is_empty() {
        "col".to_string()
    } else {
        name.to_string()
    };
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("col_{name}");
    }
    if RESERVED_WORDS.contains(name.as_str()) || system.contains(name.as_str()) {
        name = format!("{name}_value");
    }
    Ident::derived(&[&name])
}

/// Names the columns of one table.
///
/// Predicates sharing a local name across namespaces are told apart by
/// qualifying the non-default namespaces (`prov_has_name`). Names clashing
/// with system columns or reserved words get a `_value` suffix. Any clash that
/// remains is a [`SchemaError::ColumnNameCollision`].
pub struct ColumnNamer<'a> {
    table: &'a str,
    system: HashSet<&'a str>,
}

impl<'a> ColumnNamer<'a> {
    pub fn new(table: &'a str, discriminator: Option<&'a str>) -> Self {
        let mut system: HashSet<&str> = [ID_COLUMN, SUBJECT_COLUMN, PREFIX_COLUMN].into();
        system.extend(discriminator);
        Self { table, system }
    }

    /// Assigns a column to each `(predicate_uri, predicate_short)` pair.
    pub fn assign(&self, predicates: &[(&str, &str)]) -> Result<BTreeMap<String, Ident>> {
        let bases: Vec<String> = predicates
            .iter()
            .map(|(_, short)| column_base_name(short))
            .collect();

        let mut namespaces_by_base: HashMap<&str, HashSet<&str>> = HashMap::new();
        for ((_, short), base) in predicates.iter().zip(&bases) {
            namespaces_by_base
                .entry(base.as_str())
                .or_default()
                .insert(split_short_name(short).0);
        }

        let mut names: BTreeMap<String, Ident> = BTreeMap::new();
        let mut owners: HashMap<Ident, &str> = HashMap::new();
        for ((uri, short), base) in predicates.iter().zip(&bases) {
            let namespace = split_short_name(short).0;
            let shared_across_namespaces = namespaces_by_base
                .get(base.as_str())
                .is_some_and(|namespaces| namespaces.len() > 1);
            let raw = if shared_across_namespaces
                && !namespace.is_empty()
                && namespace != DEFAULT_NAMESPACE
            {
                clean_identifier(&format!("{namespace}_{base}")).to_lowercase()
            } else {
                base.clone()
            };
            let column = finish_column_name(&raw, &self.system)?;

            if let Some(first) = owners.get(&column) {
                if first != uri {
                    return Err(SchemaError::ColumnNameCollision {
                        table: self.table.to_string(),
                        column: column.to_string(),
                        first_predicate: first.to_string(),
                        second_predicate: uri.to_string(),
                    });
                }
                continue;
            }
            owners.insert(column.clone(), uri);
            names.insert(uri.to_string(), column);
        }
        Ok(names)
    }
}

/// Names for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableNaming {
    pub table: Ident,
    /// Discriminator column of a union table
    pub discriminator: Option<Ident>,
    columns: BTreeMap<String, Ident>,
}

impl TableNaming {
    pub fn column_for(&self, predicate_uri: &str) -> Option<&Ident> {
        self.columns.get(predicate_uri)
    }
}

/// Table and column names for every profile of a run.
#[derive(Debug, Clone, Default)]
pub struct NamingPlan {
    tables: Vec<TableNaming>,
    /// Every source class URI (merge members included) to its table
    by_class_uri: HashMap<String, usize>,
}

impl NamingPlan {
    /// Names every profile's table and columns. The typing predicate gets no column.
    pub fn build(profiles: &[ClassProfile], type_predicate: &str) -> Result<Self> {
        let mut plan = Self::default();
        let mut table_owner: HashMap<Ident, &str> = HashMap::new();

        for (index, profile) in profiles.iter().enumerate() {
            let table = table_name_for(profile.class_name())?;
            if let Some(first) = table_owner.insert(table.clone(), profile.class_name()) {
                return Err(SchemaError::TableNameCollision {
                    table: table.to_string(),
                    first_class: first.to_string(),
                    second_class: profile.class_name().to_string(),
                });
            }
            let discriminator = profile
                .merge_config()
                .map(|config| Ident::new(config.type_column.as_str()))
                .transpose()?;

            let predicates: Vec<(&str, &str)> = profile
                .predicates()
                .iter()
                .filter(|p| p.predicate_uri != type_predicate)
                .map(|p| (p.predicate_uri.as_str(), p.predicate_short.as_str()))
                .collect();
            let columns = ColumnNamer::new(
                table.as_str(),
                discriminator.as_ref().map(Ident::as_str),
            )
            .assign(&predicates)?;
            debug!(table = %table, columns = columns.len(), "Named table columns");

            for class_uri in profile.source_class_uris() {
                plan.by_class_uri.insert(class_uri.to_string(), index);
            }
            plan.tables.push(TableNaming {
                table,
                discriminator,
                columns,
            });
        }
        Ok(plan)
    }

    /// Names of the profile at `index`, in the order given to [`NamingPlan::build`].
    pub fn for_profile(&self, index: usize) -> Option<&TableNaming> {
        self.tables.get(index)
    }

    /// Table holding instances of a class, merged or not.
    pub fn table_for_class(&self, class_uri: &str) -> Option<&Ident> {
        self.by_class_uri
            .get(class_uri)
            .map(|&index| &self.tables[index].table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableNaming> {
        self.tables.iter()
    }
}
