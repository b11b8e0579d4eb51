//! Read-only collection of class profiles, loaded from the profiling document.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{ErrorContext, Result, SchemaError};
use crate::profile::types::ProfileData;

/// Slack allowed for rounded coverage values just outside `[0, 100]`.
const COVERAGE_TOLERANCE: f64 = 0.05;

/// On-disk layout of the profiling document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub classes: Vec<ProfileData>,
}

/// Immutable snapshot of every profiled class.
#[derive(Debug, Clone, Default)]
pub struct ClassProfileStore {
    profiles: Vec<ProfileData>,
    by_name: HashMap<String, usize>,
    by_uri: HashMap<String, usize>,
}

impl ClassProfileStore {
    /// Builds a store, validating each profile.
    ///
    /// Coverage values within rounding distance of the bounds are clamped;
    /// anything further out is rejected, as are duplicate class URIs.
    pub fn new(profiles: Vec<ProfileData>) -> Result<Self> {
        let mut store = Self::default();
        for mut profile in profiles {
            validate_profile(&mut profile)?;
            if store.by_uri.contains_key(&profile.class_uri) {
                return Err(SchemaError::Parse(format!(
                    "Class <{}> is profiled more than once",
                    profile.class_uri
                )));
            }
            let idx = store.profiles.len();
            store.by_name.insert(profile.class_name.clone(), idx);
            store.by_uri.insert(profile.class_uri.clone(), idx);
            store.profiles.push(profile);
        }
        Ok(store)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: ProfileDocument = serde_json::from_str(json)?;
        Self::new(document.classes)
    }

    /// Loads the profiling document from disk.
    #[instrument]
    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading class profiles from {}", path.display()))?;
        let store = Self::from_json_str(&text)?;
        info!(classes = store.len(), "Loaded class profiles");
        Ok(store)
    }

    pub fn to_document(&self) -> ProfileDocument {
        ProfileDocument {
            metadata: serde_json::Map::new(),
            classes: self.profiles.clone(),
        }
    }

    pub fn profiles(&self) -> &[ProfileData] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn by_name(&self, class_name: &str) -> Option<&ProfileData> {
        self.by_name.get(class_name).map(|&i| &self.profiles[i])
    }

    pub fn by_uri(&self, class_uri: &str) -> Option<&ProfileData> {
        self.by_uri.get(class_uri).map(|&i| &self.profiles[i])
    }

    /// Class URI for a short class name such as `cpmeta:Station`.
    pub fn class_uri_for(&self, class_name: &str) -> Option<&str> {
        self.by_name(class_name).map(|p| p.class_uri.as_str())
    }
}

fn validate_profile(profile: &mut ProfileData) -> Result<()> {
    for usage in &mut profile.predicates {
        let pct = usage.coverage_percentage;
        if !pct.is_finite()
            || pct < -COVERAGE_TOLERANCE
            || pct > 100.0 + COVERAGE_TOLERANCE
        {
            return Err(SchemaError::Parse(format!(
                "Coverage {pct} of <{}> in class '{}' is outside [0, 100]",
                usage.predicate_uri, profile.class_name
            )));
        }
        if !(0.0..=100.0).contains(&pct) {
            warn!(
                class = %profile.class_name,
                predicate = %usage.predicate_uri,
                coverage = pct,
                "Clamping coverage into [0, 100]"
            );
            usage.coverage_percentage = pct.clamp(0.0, 100.0);
        }
    }
    for edge in profile
        .references_to
        .iter_mut()
        .chain(profile.referenced_by.iter_mut())
    {
        if edge.reference_count == 0 {
            edge.recount();
        }
    }
    Ok(())
}
