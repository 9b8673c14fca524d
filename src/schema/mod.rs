// ABOUTME: Schema introspection for clone planning
// ABOUTME: Discovers user schemas, tables, and column shapes from the catalog

use crate::error::{CloneError, Result};
use crate::utils::quote_ident;
use tokio_postgres::GenericClient;

/// System schemas that never take part in a clone.
const SKIP_SCHEMAS: [&str; 3] = ["information_schema", "pg_catalog", "pg_toast"];

/// One column of a table, as the copier needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// SQL type in castable form, e.g. `integer`, `character varying(255)`.
    pub sql_type: String,
    /// True for int2/int4/int8 columns; only these are probed for sequences.
    pub is_integer: bool,
    /// Generated columns are excluded from insert payloads.
    pub is_generated: bool,
}

/// A table identified by (schema, name) with its ordered columns.
///
/// Immutable for the duration of a run; produced once by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Human-readable `schema.table` label used in logs and error reports.
    pub fn label(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Fully quoted `"schema"."table"` form for statement interpolation.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// Columns that participate in insert payloads (generated columns excluded).
    pub fn insert_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.is_generated).collect()
    }
}

/// List user-visible schemas, excluding system and temporary namespaces
pub async fn list_user_schemas<C: GenericClient>(client: &C) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT nspname FROM pg_catalog.pg_namespace ORDER BY nspname",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| row.get(0))
        .filter(|schema: &String| !is_system_schema(schema))
        .collect())
}

/// Reflect every ordinary table in the given schemas, ordered by
/// (schema, name) so runs are deterministic regardless of catalog order.
pub async fn reflect_tables<C: GenericClient>(
    client: &C,
    schemas: &[String],
) -> Result<Vec<TableDescriptor>> {
    let rows = client
        .query(
            "SELECT schemaname, tablename
             FROM pg_catalog.pg_tables
             WHERE schemaname = ANY($1)
             ORDER BY schemaname, tablename",
            &[&schemas],
        )
        .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let schema: String = row.get(0);
        let name: String = row.get(1);
        let columns = reflect_columns(client, &schema, &name).await?;
        if columns.is_empty() {
            return Err(CloneError::Schema(format!(
                "table {}.{} has no columns",
                schema, name
            )));
        }
        tables.push(TableDescriptor {
            schema,
            name,
            columns,
        });
    }

    Ok(tables)
}

/// Read the column shape of one table from pg_attribute.
///
/// `format_type` yields the exact castable type spelling the copier needs;
/// `attgenerated` marks stored generated columns.
async fn reflect_columns<C: GenericClient>(
    client: &C,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let rows = client
        .query(
            "SELECT a.attname,
                    pg_catalog.format_type(a.atttypid, a.atttypmod),
                    t.typname IN ('int2', 'int4', 'int8'),
                    a.attgenerated <> ''
             FROM pg_catalog.pg_attribute a
             JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
             WHERE n.nspname = $1
               AND c.relname = $2
               AND a.attnum > 0
               AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&schema, &table],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| ColumnDescriptor {
            name: row.get(0),
            sql_type: row.get(1),
            is_integer: row.get(2),
            is_generated: row.get(3),
        })
        .collect())
}

/// True if the schema should never be cloned (system or temporary namespace).
pub fn is_system_schema(schema: &str) -> bool {
    SKIP_SCHEMAS.contains(&schema)
        || schema.starts_with("pg_temp_")
        || schema.starts_with("pg_toast_temp_")
}
