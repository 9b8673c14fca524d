// ABOUTME: Row-count verification after a clone run
// ABOUTME: Re-counts every copied table on both sides and fails loudly on mismatch

use crate::error::{CloneError, Result};
use crate::schema::TableDescriptor;
use tokio_postgres::GenericClient;

/// Exact row count of one table.
pub async fn count_rows<C: GenericClient>(client: &C, table: &TableDescriptor) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.qualified_name());
    let row = client.query_one(sql.as_str(), &[]).await?;
    Ok(row.get(0))
}

/// Compare source and target row counts for every copied table.
///
/// Catches copy bugs that succeed at the statement level but silently drop
/// or duplicate rows. The first mismatch ends the run; the caller rolls the
/// whole outer transaction back.
pub async fn verify_row_counts<S, T>(
    source: &S,
    target: &T,
    tables: &[&TableDescriptor],
) -> Result<()>
where
    S: GenericClient,
    T: GenericClient,
{
    for table in tables {
        let source_count = count_rows(source, table).await?;
        let target_count = count_rows(target, table).await?;

        if source_count != target_count {
            return Err(CloneError::CountMismatch {
                table: table.label(),
                source_count,
                target_count,
            });
        }
        tracing::info!(
            "  - {}: verified ({} row(s))",
            table.label(),
            target_count
        );
    }

    Ok(())
}
