//! Splitting subject URIs into a stored `prefix` and a surrogate `id`.
//!
//! Each table gets a [`PrefixStrategy`] from the URI prefixes known for it.
//! Every strategy keeps `prefix || id` equal to the original URI, including
//! URIs that carry none of the known prefixes: those keep the whole URI as
//! `id` under an empty `prefix`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, Result};
use crate::sql::{Expr, Literal};

/// Source of candidate URI prefixes per table.
pub trait PrefixSource: Send + Sync {
    /// Prefix to number of subjects carrying it. Empty when unknown.
    fn prefixes_for_table(&self, table: &str) -> BTreeMap<String, u64>;
}

/// Prefixes per table loaded from JSON: `{"ct_stations": {"http://...": 12}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixMap {
    tables: BTreeMap<String, BTreeMap<String, u64>>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, prefix: impl Into<String>, count: u64) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(prefix.into(), count);
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading table prefixes from {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

impl PrefixSource for PrefixMap {
    fn prefixes_for_table(&self, table: &str) -> BTreeMap<String, u64> {
        self.tables.get(table).cloned().unwrap_or_default()
    }
}

/// How a table derives `id` and `prefix` from a URI.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefixStrategy {
    /// No prefix known: `prefix = ''`, `id` is the whole URI.
    None,
    /// One known prefix; URIs without it fall back to `prefix = ''`.
    Single(Literal),
    /// Several prefixes, longest first; ties ordered lexicographically.
    Multi(Vec<Literal>),
}

impl PrefixStrategy {
    /// Builds the strategy from a table's prefix counts. Empty prefixes are ignored.
    pub fn from_prefixes(prefixes: &BTreeMap<String, u64>) -> Result<Self> {
        let mut candidates: Vec<&str> = prefixes
            .keys()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .collect();
        candidates.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        match candidates.as_slice() {
            [] => Ok(PrefixStrategy::None),
            [single] => Ok(PrefixStrategy::Single(Literal::new(*single)?)),
            many => Ok(PrefixStrategy::Multi(
                many.iter()
                    .map(|p| Literal::new(*p))
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PrefixStrategy::None)
    }

    /// Prefixes in match order.
    pub fn prefixes(&self) -> Vec<&str> {
        match self {
            PrefixStrategy::None => Vec::new(),
            PrefixStrategy::Single(prefix) => vec![prefix.value()],
            PrefixStrategy::Multi(prefixes) => prefixes.iter().map(Literal::value).collect(),
        }
    }

    fn candidates(&self) -> &[Literal] {
        match self {
            PrefixStrategy::None => &[],
            PrefixStrategy::Single(prefix) => std::slice::from_ref(prefix),
            PrefixStrategy::Multi(prefixes) => prefixes,
        }
    }

    /// `id` of `uri`: the URI with the first matching prefix removed, or the
    /// whole URI when none matches.
    pub fn id_expr(&self, uri: Expr) -> Result<Expr> {
        if self.is_none() {
            return Ok(uri);
        }
        Ok(Expr::case(
            self.candidates()
                .iter()
                .map(|p| {
                    (
                        starts_with(uri.clone(), p),
                        uri.clone().substring_from(p.char_len() + 1),
                    )
                })
                .collect(),
            Some(uri),
        ))
    }

    /// Stored `prefix` of `uri`: the first matching prefix, or `''`.
    pub fn prefix_expr(&self, uri: Expr) -> Result<Expr> {
        if self.is_none() {
            return Expr::string("");
        }
        Ok(Expr::case(
            self.candidates()
                .iter()
                .map(|p| (starts_with(uri.clone(), p), Expr::lit(p.clone())))
                .collect(),
            Some(Expr::string("")?),
        ))
    }
}

fn starts_with(uri: Expr, prefix: &Literal) -> Expr {
    uri.left(prefix.char_len()).eq(Expr::lit(prefix.clone()))
}
