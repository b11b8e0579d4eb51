//! In-process triple store backed by a DataFusion table.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, Int64Array, LargeStringArray, StringArray, StringViewArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{debug, instrument};

use super::{EdgeCount, TripleStore};
use crate::config::StoreConfig;
use crate::error::{Result, SchemaError};
use crate::log_store_op;
use crate::logging::{truncate_field, LogConfig};
use crate::namespaces::RDF_TYPE;
use crate::sql::Literal;

const TABLE: &str = "triples";

/// Arrow schema of the triples table: three non-null Utf8 columns.
pub fn triples_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("subj", DataType::Utf8, false),
        Field::new("pred", DataType::Utf8, false),
        Field::new("obj", DataType::Utf8, false),
    ]))
}

/// [`TripleStore`] over `(subj, pred, obj)` rows held in memory.
pub struct DataFusionTripleStore {
    ctx: SessionContext,
    type_predicate: String,
    log_config: LogConfig,
}

impl std::fmt::Debug for DataFusionTripleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionTripleStore")
            .field("type_predicate", &self.type_predicate)
            .finish_non_exhaustive()
    }
}

impl DataFusionTripleStore {
    /// Builds a store from `(subject, predicate, object)` tuples.
    pub fn from_triples<I, S>(triples: I, config: &StoreConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: AsRef<str>,
    {
        let mut subjects = Vec::new();
        let mut predicates = Vec::new();
        let mut objects = Vec::new();
        for (s, p, o) in triples {
            subjects.push(s.as_ref().to_string());
            predicates.push(p.as_ref().to_string());
            objects.push(o.as_ref().to_string());
        }
        let batch = RecordBatch::try_new(
            triples_schema(),
            vec![
                Arc::new(StringArray::from_iter_values(subjects)),
                Arc::new(StringArray::from_iter_values(predicates)),
                Arc::new(StringArray::from_iter_values(objects)),
            ],
        )?;
        Self::from_batches(vec![batch], config)
    }

    /// Builds a store from record batches with `subj`, `pred` and `obj` string columns.
    pub fn from_batches(batches: Vec<RecordBatch>, config: &StoreConfig) -> Result<Self> {
        let schema = match batches.first() {
            Some(batch) => batch.schema(),
            None => triples_schema(),
        };
        for column in ["subj", "pred", "obj"] {
            let field = schema.field_with_name(column).map_err(|_| {
                SchemaError::configuration(format!("Triple batches lack a '{column}' column"))
            })?;
            if !matches!(
                field.data_type(),
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ) {
                return Err(SchemaError::configuration(format!(
                    "Triple column '{column}' must be a string column, found {}",
                    field.data_type()
                )));
            }
        }

        let session = SessionConfig::new()
            .with_target_partitions(config.target_partitions)
            .with_batch_size(config.batch_size);
        let ctx = SessionContext::new_with_config(session);
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        let table = MemTable::try_new(schema, vec![batches])?;
        ctx.register_table(TABLE, Arc::new(table))?;
        debug!(rows, "Registered triples table");

        Ok(Self {
            ctx,
            type_predicate: RDF_TYPE.to_string(),
            log_config: LogConfig::default(),
        })
    }

    /// Uses another predicate than `rdf:type` for class membership.
    pub fn with_type_predicate(mut self, predicate_uri: impl Into<String>) -> Self {
        self.type_predicate = predicate_uri.into();
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        log_store_op!(
            self.log_config,
            sql = %truncate_field(sql, self.log_config.max_field_length),
            "Querying triples"
        );
        let frame = self.ctx.sql(sql).await?;
        Ok(frame.collect().await?)
    }

    /// `SELECT subj` of every instance of the class.
    fn instances_of(&self, class_uri: &str) -> Result<String> {
        Ok(format!(
            "SELECT subj FROM {TABLE} WHERE pred = {} AND obj = {}",
            Literal::new(self.type_predicate.as_str())?,
            Literal::new(class_uri)?
        ))
    }

    async fn edges(&self, sql: &str) -> Result<Vec<EdgeCount>> {
        let mut edges = Vec::new();
        for batch in self.query(sql).await? {
            for row in 0..batch.num_rows() {
                edges.push(EdgeCount {
                    class_uri: string_at(batch.column(0).as_ref(), row)?,
                    predicate_uri: string_at(batch.column(1).as_ref(), row)?,
                    count: count_at(batch.column(2).as_ref(), row)?,
                });
            }
        }
        edges.sort_by(|a, b| {
            (&a.class_uri, &a.predicate_uri).cmp(&(&b.class_uri, &b.predicate_uri))
        });
        Ok(edges)
    }
}

#[async_trait]
impl TripleStore for DataFusionTripleStore {
    #[instrument(skip(self))]
    async fn sample_objects(
        &self,
        predicate_uri: &str,
        limit: usize,
        ordered: bool,
    ) -> Result<Vec<String>> {
        let order = if ordered { " ORDER BY subj, obj" } else { "" };
        let sql = format!(
            "SELECT obj FROM {TABLE} WHERE pred = {}{order} LIMIT {limit}",
            Literal::new(predicate_uri)?
        );
        let mut samples = Vec::new();
        for batch in self.query(&sql).await? {
            let column = batch.column(0);
            for row in 0..batch.num_rows() {
                if !column.is_null(row) {
                    samples.push(string_at(column.as_ref(), row)?);
                }
            }
        }
        Ok(samples)
    }

    #[instrument(skip(self, predicate_uris), fields(predicates = predicate_uris.len()))]
    async fn count_values_per_subject(
        &self,
        class_uri: &str,
        predicate_uris: &[String],
    ) -> Result<HashMap<String, Vec<u64>>> {
        if predicate_uris.is_empty() {
            return Ok(HashMap::new());
        }
        let predicates = predicate_uris
            .iter()
            .map(|p| Literal::new(p.as_str()).map(|l| l.to_string()))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "SELECT pred, subj, COUNT(*) AS value_count FROM {TABLE} \
             WHERE pred IN ({predicates}) AND subj IN ({}) \
             GROUP BY pred, subj",
            self.instances_of(class_uri)?
        );
        let mut counts: HashMap<String, Vec<u64>> = HashMap::new();
        for batch in self.query(&sql).await? {
            for row in 0..batch.num_rows() {
                let predicate = string_at(batch.column(0).as_ref(), row)?;
                let count = count_at(batch.column(2).as_ref(), row)?;
                counts.entry(predicate).or_default().push(count);
            }
        }
        Ok(counts)
    }

    #[instrument(skip(self))]
    async fn class_uris(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT obj FROM {TABLE} WHERE pred = {} ORDER BY obj",
            Literal::new(self.type_predicate.as_str())?
        );
        let mut classes = Vec::new();
        for batch in self.query(&sql).await? {
            for row in 0..batch.num_rows() {
                classes.push(string_at(batch.column(0).as_ref(), row)?);
            }
        }
        Ok(classes)
    }

    #[instrument(skip(self))]
    async fn count_instances(&self, class_uri: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT subj) AS instances FROM ({}) AS members",
            self.instances_of(class_uri)?
        );
        let batches = self.query(&sql).await?;
        match batches.iter().find(|b| b.num_rows() > 0) {
            Some(batch) => count_at(batch.column(0).as_ref(), 0),
            None => Ok(0),
        }
    }

    #[instrument(skip(self))]
    async fn predicate_usage(&self, class_uri: &str) -> Result<Vec<(String, u64)>> {
        let sql = format!(
            "SELECT pred, COUNT(DISTINCT subj) AS subjects FROM {TABLE} \
             WHERE subj IN ({}) GROUP BY pred ORDER BY pred",
            self.instances_of(class_uri)?
        );
        let mut usage = Vec::new();
        for batch in self.query(&sql).await? {
            for row in 0..batch.num_rows() {
                usage.push((
                    string_at(batch.column(0).as_ref(), row)?,
                    count_at(batch.column(1).as_ref(), row)?,
                ));
            }
        }
        Ok(usage)
    }

    #[instrument(skip(self))]
    async fn outgoing_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>> {
        let type_predicate = Literal::new(self.type_predicate.as_str())?;
        let class = Literal::new(class_uri)?;
        let sql = format!(
            "SELECT t.obj AS class_uri, r.pred AS predicate_uri, COUNT(*) AS refs \
             FROM {TABLE} r JOIN {TABLE} t ON r.obj = t.subj \
             WHERE t.pred = {type_predicate} AND t.obj <> {class} \
             AND r.pred <> {type_predicate} AND r.subj IN ({}) \
             GROUP BY t.obj, r.pred",
            self.instances_of(class_uri)?
        );
        self.edges(&sql).await
    }

    #[instrument(skip(self))]
    async fn incoming_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>> {
        let type_predicate = Literal::new(self.type_predicate.as_str())?;
        let class = Literal::new(class_uri)?;
        let sql = format!(
            "SELECT s.obj AS class_uri, r.pred AS predicate_uri, COUNT(*) AS refs \
             FROM {TABLE} r JOIN {TABLE} s ON r.subj = s.subj \
             WHERE s.pred = {type_predicate} AND s.obj <> {class} \
             AND r.pred <> {type_predicate} AND r.obj IN ({}) \
             GROUP BY s.obj, r.pred",
            self.instances_of(class_uri)?
        );
        self.edges(&sql).await
    }
}

fn string_at(column: &dyn Array, row: usize) -> Result<String> {
    if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
        Ok(arr.value(row).to_string())
    } else if let Some(arr) = column.as_any().downcast_ref::<StringViewArray>() {
        Ok(arr.value(row).to_string())
    } else if let Some(arr) = column.as_any().downcast_ref::<LargeStringArray>() {
        Ok(arr.value(row).to_string())
    } else {
        Err(SchemaError::store_query_fatal(format!(
            "Expected a string column, found {}",
            column.data_type()
        )))
    }
}

fn count_at(column: &dyn Array, row: usize) -> Result<u64> {
    if let Some(arr) = column.as_any().downcast_ref::<Int64Array>() {
        u64::try_from(arr.value(row))
            .map_err(|_| SchemaError::internal("negative count returned by the store"))
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt64Array>() {
        Ok(arr.value(row))
    } else {
        Err(SchemaError::store_query_fatal(format!(
            "Expected an integer count column, found {}",
            column.data_type()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://meta.icos-cp.eu/ontologies/cpmeta/";

    fn uri(local: &str) -> String {
        format!("{NS}{local}")
    }

    fn store() -> DataFusionTripleStore {
        let triples = vec![
            ("http://x/s1".to_string(), RDF_TYPE.to_string(), uri("Station")),
            ("http://x/s2".to_string(), RDF_TYPE.to_string(), uri("Station")),
            ("http://x/o1".to_string(), RDF_TYPE.to_string(), uri("Organization")),
            ("http://x/s1".to_string(), uri("hasName"), "Alpha".to_string()),
            ("http://x/s2".to_string(), uri("hasName"), "Beta".to_string()),
            ("http://x/s1".to_string(), uri("hasTag"), "a".to_string()),
            ("http://x/s1".to_string(), uri("hasTag"), "b".to_string()),
            ("http://x/s1".to_string(), uri("hasTag"), "c".to_string()),
            ("http://x/s2".to_string(), uri("hasOwner"), "http://x/o1".to_string()),
        ];
        DataFusionTripleStore::from_triples(triples, &StoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_sample_objects_ordered() {
        let store = store();
        let samples = store.sample_objects(&uri("hasTag"), 2, true).await.unwrap();
        assert_eq!(samples, vec!["a", "b"]);
        let none = store.sample_objects(&uri("missing"), 10, true).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_classes_and_instances() {
        let store = store();
        assert_eq!(
            store.class_uris().await.unwrap(),
            vec![uri("Organization"), uri("Station")]
        );
        assert_eq!(store.count_instances(&uri("Station")).await.unwrap(), 2);
        assert_eq!(store.count_instances(&uri("Nothing")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_values_per_subject() {
        let store = store();
        let counts = store
            .count_values_per_subject(
                &uri("Station"),
                &[uri("hasTag"), uri("hasName"), uri("missing")],
            )
            .await
            .unwrap();
        assert_eq!(counts[&uri("hasTag")], vec![3]);
        let mut names = counts[&uri("hasName")].clone();
        names.sort();
        assert_eq!(names, vec![1, 1]);
        assert!(!counts.contains_key(&uri("missing")));
    }

    #[tokio::test]
    async fn test_predicate_usage_counts_distinct_subjects() {
        let store = store();
        let usage = store.predicate_usage(&uri("Station")).await.unwrap();
        let tags = usage.iter().find(|(p, _)| *p == uri("hasTag")).unwrap();
        assert_eq!(tags.1, 1);
        let types = usage.iter().find(|(p, _)| p == RDF_TYPE).unwrap();
        assert_eq!(types.1, 2);
    }

    #[tokio::test]
    async fn test_reference_edges() {
        let store = store();
        let outgoing = store.outgoing_references(&uri("Station")).await.unwrap();
        assert_eq!(
            outgoing,
            vec![EdgeCount {
                class_uri: uri("Organization"),
                predicate_uri: uri("hasOwner"),
                count: 1,
            }]
        );
        let incoming = store
            .incoming_references(&uri("Organization"))
            .await
            .unwrap();
        assert_eq!(incoming[0].class_uri, uri("Station"));
    }

    #[test]
    fn test_rejects_batches_without_triple_columns() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from_iter_values(["x"]))],
        )
        .unwrap();
        assert!(DataFusionTripleStore::from_batches(vec![batch], &StoreConfig::default()).is_err());
    }
}
