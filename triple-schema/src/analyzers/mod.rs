//! Store-backed analyses feeding the column planner.
//!
//! - [`inference`]: storage type of each predicate from sampled values
//! - [`cardinality`]: per-subject value-count distribution of each (class, predicate)
//!
//! Both results serialize to JSON documents, so a run can reuse analyses
//! computed earlier instead of querying the store again.

pub mod cardinality;
pub mod inference;

pub use cardinality::{
    percentile_cont, CardinalityAnalyzer, CardinalityIndex, CardinalityStats, ClassCardinality,
};
pub use inference::{InferenceBasis, PredicateTypeInfo, TypeDetails, TypeInferencer, TypeInfo};
