//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use triple_schema::prefixes::PrefixStrategy;
use triple_schema::prelude::*;
use triple_schema::sql::{Expr, Ident};

pub const CPMETA: &str = "http://meta.icos-cp.eu/ontologies/cpmeta/";
pub const OBJECTS: &str = "http://meta.icos-cp.eu/objects/";
pub const RESOURCES: &str = "http://meta.icos-cp.eu/resources/";

pub fn cp(local: &str) -> String {
    format!("{CPMETA}{local}")
}

pub fn object(id: &str) -> String {
    format!("{OBJECTS}{id}")
}

pub fn resource(id: &str) -> String {
    format!("{RESOURCES}{id}")
}

/// Triples accumulated for one test store.
#[derive(Debug, Default, Clone)]
pub struct Triples(Vec<(String, String, String)>);

impl Triples {
    pub fn new() -> Self {
        Self::default()
    }

    /// `subject rdf:type cpmeta:<class>`
    pub fn typed(mut self, subject: &str, class: &str) -> Self {
        self.0.push((subject.to_string(), RDF_TYPE.to_string(), cp(class)));
        self
    }

    /// `subject cpmeta:<predicate> object`
    pub fn value(mut self, subject: &str, predicate: &str, object: &str) -> Self {
        self.0
            .push((subject.to_string(), cp(predicate), object.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn store(&self) -> DataFusionTripleStore {
        DataFusionTripleStore::from_triples(self.0.clone(), &StoreConfig::default())
            .expect("triples register")
    }
}

pub fn ontology(functional: &[&str], non_functional: &[&str]) -> OntologyProperties {
    OntologyProperties::new(
        functional.iter().map(|p| cp(p)),
        non_functional.iter().map(|p| cp(p)),
    )
}

pub fn prefixes(entries: &[(&str, &str)]) -> PrefixMap {
    let mut map = PrefixMap::new();
    for (table, prefix) in entries {
        map.insert(*table, *prefix, 1);
    }
    map
}

/// Runs the whole pipeline with default config.
pub async fn build(
    triples: &Triples,
    ontology: &OntologyProperties,
    prefixes: &PrefixMap,
) -> SchemaBuild {
    let pipeline = SchemaPipeline::new(PipelineConfig::default(), ontology, prefixes)
        .expect("default config is valid");
    pipeline
        .run(&triples.store())
        .await
        .expect("pipeline runs")
}

/// Data objects carrying `hasNumberOfRows` 12, 45 and 7.
pub fn data_objects() -> Triples {
    let mut triples = Triples::new();
    for (id, rows) in [("d1", "12"), ("d2", "45"), ("d3", "7")] {
        let subject = object(id);
        triples = triples
            .typed(&subject, "DataObject")
            .value(&subject, "hasNumberOfRows", rows);
    }
    triples
}

/// A URI with the `prefix` and `id` a table stores for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitUri {
    pub uri: String,
    pub prefix: String,
    pub id: String,
}

impl SplitUri {
    pub fn round_trips(&self) -> bool {
        format!("{}{}", self.prefix, self.id) == self.uri
    }
}

/// Evaluates the generated `prefix` and `id` expressions over `uris` in DataFusion.
pub async fn split_uris(strategy: &PrefixStrategy, uris: &[String]) -> Vec<SplitUri> {
    let schema = Arc::new(Schema::new(vec![Field::new("subj", DataType::Utf8, false)]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from(uris.to_vec())) as ArrayRef],
    )
    .unwrap();
    let ctx = SessionContext::new();
    ctx.register_table(
        "uris",
        Arc::new(MemTable::try_new(schema, vec![vec![batch]]).unwrap()),
    )
    .unwrap();

    let subj = Expr::col(Ident::new("subj").unwrap());
    let sql = format!(
        "SELECT subj, {} AS prefix, {} AS id FROM uris",
        strategy.prefix_expr(subj.clone()).unwrap(),
        strategy.id_expr(subj).unwrap()
    );
    let batches = ctx.sql(&sql).await.unwrap().collect().await.unwrap();

    let mut rows = Vec::new();
    for batch in batches {
        let columns: Vec<ArrayRef> = batch
            .columns()
            .iter()
            .map(|c| cast(c, &DataType::Utf8).unwrap())
            .collect();
        let text = |i: usize| {
            columns[i]
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("utf8 column")
        };
        for row in 0..batch.num_rows() {
            rows.push(SplitUri {
                uri: text(0).value(row).to_string(),
                prefix: text(1).value(row).to_string(),
                id: text(2).value(row).to_string(),
            });
        }
    }
    rows
}

pub fn strategy(prefixes: &[&str]) -> PrefixStrategy {
    let map = prefixes.iter().map(|p| (p.to_string(), 1)).collect();
    PrefixStrategy::from_prefixes(&map).unwrap()
}
