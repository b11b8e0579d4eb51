//! Functional and non-functional property sets from the ontology.
//!
//! The ontology itself is parsed elsewhere; this module consumes the
//! resulting property lists as JSON:
//!
//! ```json
//! {"functional": ["http://..."], "non_functional": ["http://..."]}
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Result, SchemaError};

/// How the ontology declares a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// At most one value per subject
    Functional,
    /// Possibly many values per subject
    NonFunctional,
    /// Not declared either way
    Unknown,
}

/// Source of the ontology's property declarations.
pub trait OntologySource: Send + Sync {
    fn functional_properties(&self) -> &BTreeSet<String>;

    fn non_functional_properties(&self) -> &BTreeSet<String>;

    /// Functional takes precedence when a predicate is listed in both sets.
    fn classify(&self, predicate_uri: &str) -> PropertyKind {
        if self.functional_properties().contains(predicate_uri) {
            PropertyKind::Functional
        } else if self.non_functional_properties().contains(predicate_uri) {
            PropertyKind::NonFunctional
        } else {
            PropertyKind::Unknown
        }
    }
}

/// Property sets loaded from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyProperties {
    #[serde(default)]
    pub functional: BTreeSet<String>,
    #[serde(default)]
    pub non_functional: BTreeSet<String>,
}

impl OntologyProperties {
    pub fn new(
        functional: impl IntoIterator<Item = impl Into<String>>,
        non_functional: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            functional: functional.into_iter().map(Into::into).collect(),
            non_functional: non_functional.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let properties: Self = serde_json::from_str(json)?;
        let overlap = properties
            .functional
            .intersection(&properties.non_functional)
            .count();
        if overlap > 0 {
            warn!(overlap, "Predicates declared both functional and non-functional; treating them as functional");
        }
        Ok(properties)
    }

    /// Loads the property document. A missing or unreadable file is fatal.
    #[instrument]
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            warn!(error = %err, "Cannot read ontology properties");
            SchemaError::MissingOntologyFile {
                path: path.display().to_string(),
            }
        })?;
        let properties = Self::from_json_str(&text)?;
        info!(
            functional = properties.functional.len(),
            non_functional = properties.non_functional.len(),
            "Loaded ontology properties"
        );
        Ok(properties)
    }
}

impl OntologySource for OntologyProperties {
    fn functional_properties(&self) -> &BTreeSet<String> {
        &self.functional
    }

    fn non_functional_properties(&self) -> &BTreeSet<String> {
        &self.non_functional
    }
}
