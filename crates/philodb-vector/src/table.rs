//! LanceDB connection and housekeeping helpers.

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};

use crate::schema::{build_chunks_schema, vector_dim};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

/// Open `name` if it exists.
pub async fn open_table_if_exists(conn: &Connection, name: &str) -> Result<Option<Table>> {
    if !table_exists(conn, name).await? {
        return Ok(None);
    }
    Ok(Some(conn.open_table(name).execute().await?))
}

/// Open the chunk table, creating it empty when missing. An existing table
/// whose vector width differs from `dim` is rejected.
pub async fn ensure_chunks_table(conn: &Connection, name: &str, dim: usize) -> Result<Table> {
    if let Some(table) = open_table_if_exists(conn, name).await? {
        let schema = table.schema().await?;
        match vector_dim(&schema) {
            Some(d) if d as usize == dim => return Ok(table),
            Some(d) => return Err(anyhow!("table '{}' stores {}-d vectors but the embedder produces {}-d", name, d, dim)),
            None => return Err(anyhow!("table '{}' has no vector column", name)),
        }
    }
    let schema = build_chunks_schema(i32::try_from(dim)?);
    Ok(conn.create_empty_table(name, schema).execute().await?)
}

/// Scan rows matching `filter` (all rows when `None`), projecting `columns`.
pub async fn scan(table: &Table, filter: Option<&str>, columns: &[&str]) -> Result<Vec<RecordBatch>> {
    let rows = table.count_rows(filter.map(str::to_string)).await?;
    if rows == 0 {
        return Ok(Vec::new());
    }
    let mut query = table.query().select(Select::columns(columns)).limit(rows);
    if let Some(f) = filter {
        query = query.only_if(f);
    }
    let stream = query.execute().await?;
    Ok(stream.try_collect::<Vec<_>>().await?)
}

/// SQL string literal for a LanceDB filter.
pub fn sql_literal(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

pub fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

/// Row `i` of the fixed-size-list vector column.
pub fn vector_at(batch: &RecordBatch, name: &str, i: usize) -> Result<Vec<f32>> {
    let list = batch
        .column_by_name(name)
        .and_then(|c| c.as_fixed_size_list_opt())
        .ok_or_else(|| anyhow!("{} column missing", name))?;
    if list.is_null(i) {
        return Err(anyhow!("{} is null at row {}", name, i));
    }
    let values = list.value(i);
    let floats = values
        .as_primitive_opt::<arrow_array::types::Float32Type>()
        .ok_or_else(|| anyhow!("{} is not a float32 list", name))?;
    Ok(floats.values().to_vec())
}
