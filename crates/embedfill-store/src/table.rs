//! LanceDB connection and table helpers.

use arrow_array::RecordBatchIterator;
use arrow_schema::Schema;
use lancedb::{connect, Connection};
use std::sync::Arc;

use crate::schema::{build_embeddings_schema, build_records_schema};

pub async fn open_db(uri: &str) -> lancedb::Result<Connection> {
    connect(uri).execute().await
}

pub async fn table_exists(conn: &Connection, name: &str) -> lancedb::Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> lancedb::Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

pub async fn ensure_records_table(conn: &Connection, name: &str) -> lancedb::Result<()> {
    ensure_table(conn, name, build_records_schema()).await
}

pub async fn ensure_embeddings_table(conn: &Connection, name: &str, dim: usize) -> lancedb::Result<()> {
    ensure_table(conn, name, build_embeddings_schema(dim)).await
}

/// Quote a value for use inside a LanceDB filter expression.
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
