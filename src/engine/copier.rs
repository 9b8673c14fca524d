// ABOUTME: Streaming batch copier for one table
// ABOUTME: Streams rows from the source and writes fixed-size multi-row inserts

use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::utils::quote_ident;
use futures::{pin_mut, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Copy every row of `table` from the source transaction into the target
/// scope, returning the number of rows written.
///
/// Rows are streamed from the source (never fully materialized) and flushed
/// as multi-row INSERTs of at most `batch_size` rows. Values travel in text
/// form and are cast back to the column's declared type on the target, so
/// the copier works for any column type with a textual representation.
///
/// The caller owns the transactional scope: on error, rows already flushed
/// in this call are the caller's to roll back.
pub async fn copy_table(
    source: &Transaction<'_>,
    target: &Transaction<'_>,
    table: &TableDescriptor,
    batch_size: usize,
) -> Result<u64, tokio_postgres::Error> {
    let columns = table.insert_columns();
    if columns.is_empty() {
        tracing::warn!(
            "Table {} has only generated columns, nothing to copy",
            table.label()
        );
        return Ok(0);
    }

    let rows_per_flush = rows_per_batch(batch_size, columns.len());
    let select_sql = select_sql(table, &columns);
    let insert_template = insert_sql(table, &columns, rows_per_flush);

    let no_params = std::iter::empty::<&(dyn ToSql + Sync)>();
    let stream = source.query_raw(select_sql.as_str(), no_params).await?;
    pin_mut!(stream);

    let mut copied: u64 = 0;
    let mut batch: Vec<Vec<Option<String>>> = Vec::with_capacity(rows_per_flush);

    while let Some(row) = stream.try_next().await? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(row.try_get::<_, Option<String>>(idx)?);
        }
        batch.push(values);

        if batch.len() >= rows_per_flush {
            target.execute(insert_template.as_str(), &param_refs(&batch)).await?;
            copied += batch.len() as u64;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        let remainder_sql = insert_sql(table, &columns, batch.len());
        target.execute(remainder_sql.as_str(), &param_refs(&batch)).await?;
        copied += batch.len() as u64;
    }

    Ok(copied)
}

/// Effective rows per flush: the configured batch size, shrunk for wide
/// tables so one statement stays under the bind parameter limit.
fn rows_per_batch(batch_size: usize, column_count: usize) -> usize {
    batch_size.min(MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// `SELECT "a"::text, "b"::text FROM "s"."t"` over the insertable columns.
///
/// Generated columns are never read back; their values are recomputed by the
/// target on insert.
fn select_sql(table: &TableDescriptor, columns: &[&ColumnDescriptor]) -> String {
    let projection = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", projection, table.qualified_name())
}

/// Multi-row INSERT with one placeholder per value, each cast from text back
/// to the column's declared type: `($1::text::integer, $2::text::text), ...`.
fn insert_sql(table: &TableDescriptor, columns: &[&ColumnDescriptor], rows: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholder = 0;
    let tuples = (0..rows)
        .map(|_| {
            let tuple = columns
                .iter()
                .map(|c| {
                    placeholder += 1;
                    format!("${}::text::{}", placeholder, c.sql_type)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", tuple)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.qualified_name(),
        column_list,
        tuples
    )
}

/// Flatten a batch into the borrowed parameter slice `execute` expects.
fn param_refs(batch: &[Vec<Option<String>>]) -> Vec<&(dyn ToSql + Sync)> {
    let mut params: Vec<&(dyn ToSql + Sync)> =
        Vec::with_capacity(batch.len() * batch.first().map_or(0, Vec::len));
    for row in batch {
        for value in row {
            params.push(value);
        }
    }
    params
}
