//! # triple-schema - Relational schemas from RDF triples
//!
//! triple-schema profiles a set of RDF triples, infers a typed relational
//! schema from the data actually present, and generates the SQL that creates
//! the tables, pivots the triples into them, adds foreign keys and builds
//! indexes. Reads go through [`DataFusion`](datafusion) when the triples are
//! held in process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use triple_schema::prelude::*;
//!
//! # async fn example() -> triple_schema::error::Result<()> {
//! let config = PipelineConfig::builder()
//!     .min_coverage(1.0)
//!     .exclude_namespace("rdfs")
//!     .build()?;
//!
//! let store = DataFusionTripleStore::from_triples(
//!     [
//!         ("http://ex/s/1", RDF_TYPE, "http://ex/Station"),
//!         ("http://ex/s/1", "http://ex/hasName", "Hyltemossa"),
//!     ],
//!     &config.store,
//! )?;
//! let ontology = OntologyProperties::load("ontology.json".as_ref()).await?;
//! let prefixes = PrefixMap::from_path("prefixes.json".as_ref()).await?;
//!
//! let pipeline = SchemaPipeline::new(config, &ontology, &prefixes)?;
//! let build = pipeline.run(&store).await?;
//! build.write_artifacts("out").await?;
//!
//! for diagnostic in build.report.diagnostics.entries() {
//!     println!("{diagnostic}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! 1. [`profile`]: per-class predicate coverage and reference edges
//! 2. [`analyzers`]: predicate storage types from sampled values, and
//!    per-subject value counts deciding scalar versus array columns
//! 3. [`merge`]: folds configured class groups into one union table with a
//!    discriminator column
//! 4. [`naming`] and [`foreign_keys`]: table and column names, and one
//!    reference target per column
//! 5. [`planner`]: the column set of every table
//! 6. [`codegen`]: four [`sql::SqlDocument`]s, applied in order by
//!    [`executor::PhaseExecutor`]
//!
//! Missing inputs for a single predicate or table degrade to a default and
//! are recorded in [`diagnostics::Diagnostics`]; structural conflicts such as
//! two predicates claiming one column name fail the build.
//!
//! ## Inputs computed elsewhere
//!
//! [`analyzers::TypeInfo`], [`analyzers::CardinalityIndex`] and
//! [`profile::ClassProfileStore`] all load from JSON, so
//! [`pipeline::SchemaPipeline::build`] can run without a triple store.
//!
//! ## Logging
//!
//! Every stage logs through `tracing`. Install a subscriber with
//! [`logging::setup::init_logging`] or bring your own.

pub mod analyzers;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod foreign_keys;
pub mod logging;
pub mod merge;
pub mod namespaces;
pub mod naming;
pub mod ontology;
pub mod pipeline;
pub mod planner;
pub mod prefixes;
pub mod prelude;
pub mod profile;
pub mod security;
pub mod sql;
pub mod store;
