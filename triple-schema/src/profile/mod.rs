//! Per-class predicate usage and reference statistics.
//!
//! Profiles are either loaded from a profiling document through
//! [`ClassProfileStore`] or computed from a triple store with [`ClassProfiler`].

pub mod profiler;
pub mod store;
pub mod types;

pub use profiler::ClassProfiler;
pub use store::{ClassProfileStore, ProfileDocument};
pub use types::{
    ClassProfile, EdgePredicate, MergedProfile, PredicateUsage, ProfileData, ReferenceEdge,
};
