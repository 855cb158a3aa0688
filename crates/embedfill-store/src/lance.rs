//! LanceDB-backed source and destination store.
//!
//! Records live in one table (`id`, `text`), embeddings in another keyed by
//! `(source_record_id, embedding_type)`. Writes go through `merge_insert` with
//! `when_not_matched_insert_all`, which makes every insert an insert-if-absent.

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table};
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

use embedfill_core::config::StoreConfig;
use embedfill_core::error::StoreError;
use embedfill_core::traits::{DestinationStore, SourceStore};
use embedfill_core::types::{
    EmbeddingRecord, EmbeddingType, InsertOutcome, PersistOutcome, RecordId, SourceRecord, StoreStats,
};

use crate::schema::{build_embeddings_schema, build_records_schema};
use crate::table::{ensure_embeddings_table, ensure_records_table, open_db, sql_literal};

/// Upper bound on ids per `IN (...)` filter.
const FILTER_CHUNK: usize = 500;

fn read_err(e: impl Display) -> StoreError {
    StoreError::Read(e.to_string())
}

fn write_err(e: impl Display) -> StoreError {
    StoreError::Write(e.to_string())
}

pub struct LanceStore {
    db: Connection,
    records_table: String,
    embeddings_table: String,
    dim: usize,
}

impl LanceStore {
    /// Connects and makes sure the embeddings table exists. The records table
    /// belongs to the upstream writer and is only read.
    pub async fn open(uri: &str, records_table: &str, embeddings_table: &str, dim: usize) -> Result<Self, StoreError> {
        let db = open_db(uri).await.map_err(read_err)?;
        ensure_embeddings_table(&db, embeddings_table, dim).await.map_err(write_err)?;
        info!(uri, records_table, embeddings_table, dim, "opened lancedb store");
        Ok(Self { db, records_table: records_table.to_string(), embeddings_table: embeddings_table.to_string(), dim })
    }

    pub async fn from_config(cfg: &StoreConfig, dim: usize) -> Result<Self, StoreError> {
        let uri = cfg.resolved_uri();
        Self::open(&uri.to_string_lossy(), &cfg.records_table, &cfg.embeddings_table, dim).await
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Append source records, creating the records table on first use.
    pub async fn append_records(&self, records: &[SourceRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_records_table(&self.db, &self.records_table).await.map_err(write_err)?;
        let schema = build_records_schema();
        let ids: Vec<String> = records.iter().map(|r| r.id.as_str().to_string()).collect();
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(ids)), Arc::new(StringArray::from(texts))],
        )
        .map_err(write_err)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let t = self.records().await.map_err(write_err)?;
        t.add(reader).execute().await.map_err(write_err)?;
        Ok(())
    }

    /// Every stored embedding of `embedding_type`, in scan order.
    pub async fn list_embeddings(&self, embedding_type: EmbeddingType) -> Result<Vec<EmbeddingRecord>, StoreError> {
        let t = self.embeddings().await.map_err(read_err)?;
        let filter = format!("embedding_type = {}", sql_literal(embedding_type.as_str()));
        let mut stream = t.query().only_if(filter).execute().await.map_err(read_err)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(read_err)? {
            let ids = string_column(&batch, "source_record_id")?;
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| read_err("embeddings.vector column missing"))?;
            let created = timestamp_column(&batch, "created_at")?;
            for i in 0..batch.num_rows() {
                let values = vectors.value(i).as_primitive::<Float32Type>().values().to_vec();
                let created_at = DateTime::<Utc>::from_timestamp_millis(created.value(i)).unwrap_or_default();
                out.push(EmbeddingRecord::new(
                    RecordId::from(ids.value(i)),
                    embedding_type,
                    values.into(),
                    created_at,
                ));
            }
        }
        Ok(out)
    }

    async fn records(&self) -> lancedb::Result<Table> {
        self.db.open_table(&self.records_table).execute().await
    }

    async fn embeddings(&self) -> lancedb::Result<Table> {
        self.db.open_table(&self.embeddings_table).execute().await
    }

    fn check_dim(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        if record.vector.dim() != self.dim {
            return Err(StoreError::Rejected(format!(
                "vector for {} has dim {} (expected {})",
                record.source_record_id,
                record.vector.dim(),
                self.dim
            )));
        }
        Ok(())
    }

    /// Inserts the rows whose key is absent and returns how many landed.
    async fn merge_insert(&self, records: &[&EmbeddingRecord]) -> Result<usize, StoreError> {
        let schema = build_embeddings_schema(self.dim);
        let created_at = records.iter().map(|r| r.created_at.timestamp_millis()).collect::<Vec<_>>();
        let mut ids = Vec::with_capacity(records.len());
        let mut types = Vec::with_capacity(records.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
        for r in records {
            ids.push(r.source_record_id.as_str().to_string());
            types.push(r.embedding_type.as_str().to_string());
            vectors.push(Some(r.vector.as_slice().iter().map(|&x| Some(x)).collect()));
        }
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(types)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), self.dim as i32)),
                Arc::new(TimestampMillisecondArray::from(created_at)),
            ],
        )
        .map_err(|e| StoreError::Rejected(e.to_string()))?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let t = self.embeddings().await.map_err(write_err)?;
        let mut mi = t.merge_insert(&["source_record_id", "embedding_type"]);
        mi.when_not_matched_insert_all();
        let res = mi.execute(reader).await.map_err(write_err)?;
        Ok(res.num_inserted_rows as usize)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| read_err(format!("{name} column missing")))
}

fn timestamp_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a TimestampMillisecondArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| read_err(format!("{name} column missing")))
}

#[async_trait]
impl SourceStore for LanceStore {
    async fn count_unembedded(&self, embedding_type: EmbeddingType) -> Result<u64, StoreError> {
        let records = self.records().await.map_err(read_err)?;
        let total = records.count_rows(None).await.map_err(read_err)?;
        debug!(total, %embedding_type, "counted candidate records");
        Ok(total as u64)
    }

    /// Pages by `offset`/`limit` over the table's scan order. That order is
    /// stable only while the records table is append-only; compaction or
    /// deletes between pages can shift rows across page boundaries.
    async fn fetch_page(&self, offset: u64, limit: usize) -> Result<Vec<SourceRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let t = self.records().await.map_err(read_err)?;
        let offset = usize::try_from(offset).map_err(read_err)?;
        let mut stream = t
            .query()
            .select(Select::columns(&["id", "text"]))
            .offset(offset)
            .limit(limit)
            .execute()
            .await
            .map_err(read_err)?;
        let mut out = Vec::with_capacity(limit);
        while let Some(batch) = stream.try_next().await.map_err(read_err)? {
            let ids = string_column(&batch, "id")?;
            let texts = string_column(&batch, "text")?;
            for i in 0..batch.num_rows() {
                let text = if texts.is_null(i) { "" } else { texts.value(i) };
                out.push(SourceRecord::new(ids.value(i), text));
            }
        }
        Ok(out)
    }

    async fn check_existing(
        &self,
        ids: &[RecordId],
        embedding_type: EmbeddingType,
    ) -> Result<HashSet<RecordId>, StoreError> {
        let mut found = HashSet::new();
        if ids.is_empty() {
            return Ok(found);
        }
        let t = self.embeddings().await.map_err(read_err)?;
        for chunk in ids.chunks(FILTER_CHUNK) {
            let list = chunk.iter().map(|id| sql_literal(id.as_str())).collect::<Vec<_>>().join(",");
            let filter = format!(
                "embedding_type = {} AND source_record_id IN ({})",
                sql_literal(embedding_type.as_str()),
                list
            );
            let mut stream = t
                .query()
                .only_if(filter)
                .select(Select::columns(&["source_record_id"]))
                .execute()
                .await
                .map_err(read_err)?;
            while let Some(batch) = stream.try_next().await.map_err(read_err)? {
                let col = string_column(&batch, "source_record_id")?;
                for i in 0..batch.num_rows() {
                    found.insert(RecordId::from(col.value(i)));
                }
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl DestinationStore for LanceStore {
    async fn insert_many(&self, records: &[EmbeddingRecord]) -> Result<PersistOutcome, StoreError> {
        if records.is_empty() {
            return Ok(PersistOutcome::default());
        }
        for record in records {
            self.check_dim(record)?;
        }
        // the merge is the authority on presence; a concurrent writer that
        // lands a key first shows up here as a row not inserted
        let mut seen = HashSet::new();
        let fresh: Vec<&EmbeddingRecord> = records.iter().filter(|r| seen.insert(r.key())).collect();
        let inserted = self.merge_insert(&fresh).await?;
        let outcome = PersistOutcome {
            written_count: inserted,
            already_present: records.len() - inserted,
            failed_ids: Vec::new(),
        };
        debug!(written = outcome.written_count, already = outcome.already_present, "embeddings persisted");
        Ok(outcome)
    }

    async fn insert_one(&self, record: &EmbeddingRecord) -> Result<InsertOutcome, StoreError> {
        self.check_dim(record)?;
        match self.merge_insert(&[record]).await? {
            0 => Ok(InsertOutcome::AlreadyExists),
            _ => Ok(InsertOutcome::Inserted),
        }
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let t = self.embeddings().await.map_err(read_err)?;
        let mut stats = StoreStats { total: t.count_rows(None).await.map_err(read_err)? as u64, ..Default::default() };
        for ty in EmbeddingType::ALL {
            let n = t
                .count_rows(Some(format!("embedding_type = {}", sql_literal(ty.as_str()))))
                .await
                .map_err(read_err)?;
            stats.by_type.insert(ty, n as u64);
        }
        let today = Utc::now().date_naive();
        let mut stream = t
            .query()
            .select(Select::columns(&["created_at"]))
            .execute()
            .await
            .map_err(read_err)?;
        while let Some(batch) = stream.try_next().await.map_err(read_err)? {
            let created = timestamp_column(&batch, "created_at")?;
            stats.today += (0..batch.num_rows())
                .filter_map(|i| DateTime::<Utc>::from_timestamp_millis(created.value(i)))
                .filter(|ts| ts.date_naive() == today)
                .count() as u64;
        }
        Ok(stats)
    }
}
