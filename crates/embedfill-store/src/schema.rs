use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Source records: `id` is the stable paging key, `text` may be null or blank.
pub fn build_records_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, true),
    ]))
}

pub fn build_embeddings_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("source_record_id", DataType::Utf8, false),
        Field::new("embedding_type", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}
