// ABOUTME: Verify command implementation - standalone row-count comparison
// ABOUTME: Re-counts every user table on both sides without copying anything

use crate::engine::verify::count_rows;
use crate::{postgres, schema, utils};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Compare row counts between source and target databases
///
/// Useful after a clone, or on its own to check whether a target has
/// drifted. Counts are exact (`COUNT(*)`), not estimates, so this can take
/// a while on very large tables.
///
/// # Errors
///
/// Returns an error if either database is unreachable, if the source has no
/// tables, or if any table's counts disagree.
pub async fn verify(source_url: &str, target_url: &str) -> Result<()> {
    let source_url = utils::normalize_database_url(source_url)
        .context("Invalid source connection string")?;
    let target_url = utils::normalize_database_url(target_url)
        .context("Invalid target connection string")?;

    tracing::info!("Connecting to source database...");
    let source = postgres::connect_with_retry(&source_url)
        .await
        .context("Failed to connect to source database")?;

    tracing::info!("Connecting to target database...");
    let target = postgres::connect_with_retry(&target_url)
        .await
        .context("Failed to connect to target database")?;

    tracing::info!("Discovering tables...");
    let schemas = schema::list_user_schemas(&source).await?;
    let tables = schema::reflect_tables(&source, &schemas).await?;
    if tables.is_empty() {
        bail!("No tables found on source database.");
    }

    tracing::info!("Comparing row counts for {} table(s)...", tables.len());
    let progress = ProgressBar::new(tables.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut mismatches: Vec<String> = Vec::new();
    for table in &tables {
        let source_count = count_rows(&source, table).await?;
        let target_count = count_rows(&target, table).await?;

        if source_count == target_count {
            tracing::debug!("  - {}: {} row(s), match", table.label(), source_count);
        } else {
            mismatches.push(format!(
                "{}: source={}, target={}",
                table.label(),
                source_count,
                target_count
            ));
        }
        progress.inc(1);
        progress.set_message(format!("Checked {}", table.label()));
    }
    progress.finish_with_message("Verification complete");

    if mismatches.is_empty() {
        tracing::info!("✓ All {} table(s) match between source and target", tables.len());
        Ok(())
    } else {
        for line in &mismatches {
            tracing::error!("  ✗ {}", line);
        }
        bail!("{} table(s) failed verification", mismatches.len());
    }
}
