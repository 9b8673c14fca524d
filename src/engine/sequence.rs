// ABOUTME: Sequence resynchronization after a table copy
// ABOUTME: Advances serial/identity sequences past the copied maximum values

use crate::schema::TableDescriptor;
use crate::utils::quote_ident;
use tokio_postgres::Transaction;

/// Bring every sequence backing an integer column of `table` in line with
/// the copied data, so the next generated value never collides with a
/// copied row.
///
/// Integer-likeness only pre-filters which columns are probed;
/// `pg_get_serial_sequence` is the authoritative test for "has a backing
/// sequence" and covers both `serial` and identity columns. Columns without
/// one are skipped.
///
/// Callers treat this as best-effort: the returned error is logged and
/// discarded, never escalated. Sequence drift is repairable after the fact;
/// aborting a committed table copy over it is not worth it.
pub async fn resync_sequences(
    target: &Transaction<'_>,
    table: &TableDescriptor,
) -> Result<(), tokio_postgres::Error> {
    let table_ref = table.qualified_name();

    for column in table.columns.iter().filter(|c| c.is_integer) {
        let row = target
            .query_one(
                "SELECT pg_get_serial_sequence($1, $2)",
                &[&table_ref, &column.name],
            )
            .await?;
        let sequence: Option<String> = row.get(0);
        let Some(sequence) = sequence else {
            continue;
        };

        // MAX over the copied data on the target, widened so int2/int4
        // columns decode uniformly
        let max_sql = format!(
            "SELECT MAX({})::int8 FROM {}",
            quote_ident(&column.name),
            table_ref
        );
        let row = target.query_one(max_sql.as_str(), &[]).await?;
        let max_value: Option<i64> = row.get(0);

        // Empty table: park the sequence at 1 with is_called=false so the
        // first generated value is 1. Otherwise the next value is max+1.
        let (next_value, is_called) = match max_value {
            Some(max) => (max, true),
            None => (1, false),
        };

        target
            .query_one(
                "SELECT setval($1::text::regclass, $2, $3)",
                &[&sequence, &next_value, &is_called],
            )
            .await?;

        tracing::debug!(
            "Sequence {} set to {} (is_called={}) for {}.{}",
            sequence,
            next_value,
            is_called,
            table.label(),
            column.name
        );
    }

    Ok(())
}
