// ABOUTME: Error types for the clone engine
// ABOUTME: Closed taxonomy separating retryable constraint failures from fatal errors

use thiserror::Error;

/// Terminal failures of a clone run.
///
/// Constraint violations never appear here directly: they are deferred and
/// retried by the scheduler. Only failures that end the run are modeled.
#[derive(Error, Debug)]
pub enum CloneError {
    /// A pass made no progress while tables were still pending.
    #[error("unable to resolve table insert order due to unresolved constraints:\n{}", format_unresolved(.tables))]
    Unresolved {
        /// Stuck tables with their most recent deferral reason.
        tables: Vec<(String, String)>,
    },

    /// Post-copy row counts disagree for a table that nominally succeeded.
    #[error("row count mismatch for {table}: source={source_count}, target={target_count}")]
    CountMismatch {
        table: String,
        source_count: i64,
        target_count: i64,
    },

    /// Any non-constraint database failure (connectivity, permissions, types).
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// Schema introspection failed or found nothing to copy.
    #[error("schema error: {0}")]
    Schema(String),
}

fn format_unresolved(tables: &[(String, String)]) -> String {
    tables
        .iter()
        .map(|(label, reason)| format!("  {} -> {}", label, reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// True if the error is an integrity constraint violation (SQLSTATE class 23).
///
/// Uniqueness and foreign-key violations are the cases the retry scheduler
/// expects during normal resolution; the rest of class 23 (not-null, check)
/// is deferred on the same basis since retrying is harmless and an
/// unresolvable violation surfaces as livelock with its reason attached.
pub fn is_constraint_violation(err: &tokio_postgres::Error) -> bool {
    err.code()
        .map(|state| state.code().starts_with("23"))
        .unwrap_or(false)
}

/// Short human-readable reason for a deferral, taken from the server's
/// primary message when available.
pub fn deferral_reason(err: &tokio_postgres::Error) -> String {
    if let Some(db_err) = err.as_db_error() {
        return db_err.message().to_string();
    }
    err.to_string()
        .lines()
        .next()
        .unwrap_or("integrity constraint violation")
        .trim()
        .to_string()
}

pub type Result<T> = std::result::Result<T, CloneError>;
