// ABOUTME: Constraint-resilient copy engine
// ABOUTME: Pass-based scheduler that retries tables until FK insert order resolves

pub mod copier;
pub mod sequence;
pub mod verify;

use crate::error::{deferral_reason, is_constraint_violation, CloneError, Result};
use crate::schema::TableDescriptor;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tokio_postgres::{Client, IsolationLevel};

/// Tunables for a clone run.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Rows per multi-row INSERT flush. Larger batches cut round-trips but
    /// raise memory use and widen the blast radius of a mid-batch constraint
    /// failure, since the whole batch is rejected atomically.
    pub batch_size: usize,
    /// Re-count rows on both sides after all tables succeed.
    pub verify: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            batch_size: 2000,
            verify: true,
        }
    }
}

/// Summary of a completed clone run.
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub passes: u32,
    pub tables_copied: usize,
    pub total_rows: u64,
    pub duration_seconds: f64,
}

/// Outcome of one table's attempt within a pass.
#[derive(Debug)]
enum AttemptOutcome {
    Copied(u64),
    Deferred(String),
}

/// What the scheduler does after a pass ends.
#[derive(Debug, PartialEq, Eq)]
enum PassDecision {
    /// At least one table succeeded and some remain: run another pass.
    Continue,
    /// Nothing pending: move on to verification.
    Done,
    /// Zero progress with tables still pending: the constraint graph cannot
    /// be satisfied by iterative retry.
    Livelock(Vec<(String, String)>),
}

/// Mutable run state of the retry scheduler.
///
/// Owns the pending set and the unresolved-error log so the pass loop stays
/// reentrant: all state lives here, none of it is process-wide. Indices refer
/// into the caller's table list; labels are kept for reporting.
struct Scheduler {
    labels: Vec<String>,
    pending: Vec<usize>,
    deferred: Vec<usize>,
    copied: Vec<usize>,
    /// Most recent deferral reason per table label; entries are removed when
    /// a table later succeeds, so the final report only names genuinely
    /// unresolved tables.
    unresolved: HashMap<String, String>,
    progressed: bool,
    pass: u32,
    total_rows: u64,
}

impl Scheduler {
    fn new(labels: Vec<String>) -> Self {
        let pending = (0..labels.len()).collect();
        Self {
            labels,
            pending,
            deferred: Vec::new(),
            copied: Vec::new(),
            unresolved: HashMap::new(),
            progressed: false,
            pass: 0,
            total_rows: 0,
        }
    }

    /// Start the next pass, returning the attempt order for it.
    fn begin_pass(&mut self) -> Vec<usize> {
        self.pass += 1;
        self.progressed = false;
        self.deferred.clear();
        self.pending.clone()
    }

    fn record(&mut self, idx: usize, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Copied(rows) => {
                self.total_rows += rows;
                self.copied.push(idx);
                self.progressed = true;
                self.unresolved.remove(&self.labels[idx]);
            }
            AttemptOutcome::Deferred(reason) => {
                self.deferred.push(idx);
                self.unresolved.insert(self.labels[idx].clone(), reason);
            }
        }
    }

    fn end_pass(&mut self) -> PassDecision {
        if self.deferred.is_empty() {
            self.pending.clear();
            return PassDecision::Done;
        }
        if !self.progressed {
            let stuck = self
                .deferred
                .iter()
                .map(|&idx| {
                    let label = self.labels[idx].clone();
                    let reason = self
                        .unresolved
                        .get(&label)
                        .cloned()
                        .unwrap_or_else(|| "unknown error".to_string());
                    (label, reason)
                })
                .collect();
            return PassDecision::Livelock(stuck);
        }
        self.pending = std::mem::take(&mut self.deferred);
        PassDecision::Continue
    }

    fn pass(&self) -> u32 {
        self.pass
    }

    fn copied(&self) -> &[usize] {
        &self.copied
    }
}

/// Copy every table from source to target, discovering a valid insertion
/// order by iterative retry.
///
/// The source is read inside a single read-only REPEATABLE READ transaction,
/// so every pass sees one consistent snapshot no matter how many passes the
/// scheduler needs. The target holds one outer transaction for the whole
/// run; each table attempt runs in a savepoint so a failing table's partial
/// rows can be undone without discarding tables committed earlier in the
/// run. Any terminal failure rolls the whole outer transaction back, leaving
/// the target untouched.
pub async fn run_clone(
    source: &mut Client,
    target: &mut Client,
    tables: &[TableDescriptor],
    options: &CloneOptions,
) -> Result<CloneReport> {
    if tables.is_empty() {
        return Err(CloneError::Schema(
            "no tables found on the source database".to_string(),
        ));
    }

    let started = Instant::now();

    let src_tx = source
        .build_transaction()
        .isolation_level(IsolationLevel::RepeatableRead)
        .read_only(true)
        .start()
        .await?;
    let mut dst_tx = target.transaction().await?;

    let mut scheduler = Scheduler::new(tables.iter().map(|t| t.label()).collect());

    loop {
        let attempt_order = scheduler.begin_pass();
        if attempt_order.is_empty() {
            break;
        }
        tracing::info!(
            "Pass {}: attempting {} table(s)...",
            scheduler.pass(),
            attempt_order.len()
        );

        for idx in attempt_order {
            let table = &tables[idx];
            let sp = dst_tx.savepoint(format!("copy_table_{}", idx)).await?;

            match copier::copy_table(&src_tx, &sp, table, options.batch_size).await {
                Ok(rows) => {
                    // Releasing the savepoint makes this table's rows visible
                    // to later tables in the same pass, which lets
                    // order-sensitive tables resolve without a topological
                    // sort
                    sp.commit().await?;
                    if let Err(e) = sequence::resync_sequences(&dst_tx, table).await {
                        tracing::warn!(
                            "Sequence resync failed for {} (ignored): {}",
                            table.label(),
                            e
                        );
                    }
                    tracing::info!("  - {}: {} row(s)", table.label(), rows);
                    scheduler.record(idx, AttemptOutcome::Copied(rows));
                }
                Err(e) if is_constraint_violation(&e) => {
                    // No partial rows from this table may leak into the run
                    sp.rollback().await?;
                    let reason = deferral_reason(&e);
                    tracing::info!("  - {}: deferred ({})", table.label(), reason);
                    scheduler.record(idx, AttemptOutcome::Deferred(reason));
                }
                Err(e) => {
                    // Connectivity, permission, and type errors are not
                    // fixable by retry; stop before attempting more tables
                    sp.rollback().await?;
                    return Err(CloneError::Db(e));
                }
            }
        }

        match scheduler.end_pass() {
            PassDecision::Continue => {}
            PassDecision::Done => break,
            PassDecision::Livelock(stuck) => {
                return Err(CloneError::Unresolved { tables: stuck });
            }
        }
    }

    if options.verify {
        tracing::info!("Verifying row counts...");
        let copied: Vec<&TableDescriptor> =
            scheduler.copied().iter().map(|&idx| &tables[idx]).collect();
        verify::verify_row_counts(&src_tx, &dst_tx, &copied).await?;
    }

    dst_tx.commit().await?;
    src_tx.commit().await?;

    Ok(CloneReport {
        passes: scheduler.pass(),
        tables_copied: scheduler.copied().len(),
        total_rows: scheduler.total_rows,
        duration_seconds: started.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_tables_succeed_first_pass() {
        let mut sched = Scheduler::new(labels(&["public.a", "public.b"]));

        let order = sched.begin_pass();
        assert_eq!(order, vec![0, 1]);
        sched.record(0, AttemptOutcome::Copied(10));
        sched.record(1, AttemptOutcome::Copied(5));

        assert_eq!(sched.end_pass(), PassDecision::Done);
        assert_eq!(sched.total_rows, 15);
        assert_eq!(sched.copied(), &[0, 1]);
        assert!(sched.begin_pass().is_empty());
    }

    #[test]
    fn test_deferred_table_retried_next_pass() {
        let mut sched = Scheduler::new(labels(&["public.employees", "public.departments"]));

        sched.begin_pass();
        sched.record(
            0,
            AttemptOutcome::Deferred("violates foreign key constraint".to_string()),
        );
        sched.record(1, AttemptOutcome::Copied(3));
        assert_eq!(sched.end_pass(), PassDecision::Continue);

        // Pending shrank to exactly the deferred table
        let order = sched.begin_pass();
        assert_eq!(order, vec![0]);
        sched.record(0, AttemptOutcome::Copied(7));
        assert_eq!(sched.end_pass(), PassDecision::Done);

        assert_eq!(sched.pass(), 2);
        assert_eq!(sched.total_rows, 10);
        // A later success clears the table's unresolved entry
        assert!(sched.unresolved.is_empty());
    }

    #[test]
    fn test_pending_set_is_monotonically_non_increasing() {
        let mut sched = Scheduler::new(labels(&["t.a", "t.b", "t.c"]));

        let first = sched.begin_pass().len();
        sched.record(0, AttemptOutcome::Copied(1));
        sched.record(1, AttemptOutcome::Deferred("fk".to_string()));
        sched.record(2, AttemptOutcome::Deferred("fk".to_string()));
        assert_eq!(sched.end_pass(), PassDecision::Continue);

        let second = sched.begin_pass().len();
        assert!(second < first);
        sched.record(1, AttemptOutcome::Copied(1));
        sched.record(2, AttemptOutcome::Deferred("fk".to_string()));
        assert_eq!(sched.end_pass(), PassDecision::Continue);

        let third = sched.begin_pass().len();
        assert!(third < second);
    }

    #[test]
    fn test_true_cycle_reports_livelock_with_reasons() {
        let mut sched = Scheduler::new(labels(&["public.a", "public.b", "public.c"]));

        // Pass 1: c copies, a and b form a genuine cycle
        sched.begin_pass();
        sched.record(0, AttemptOutcome::Deferred("a needs b".to_string()));
        sched.record(1, AttemptOutcome::Deferred("b needs a".to_string()));
        sched.record(2, AttemptOutcome::Copied(1));
        assert_eq!(sched.end_pass(), PassDecision::Continue);

        // Pass 2: zero progress terminates, never loops forever
        sched.begin_pass();
        sched.record(0, AttemptOutcome::Deferred("a needs b".to_string()));
        sched.record(1, AttemptOutcome::Deferred("b needs a".to_string()));

        match sched.end_pass() {
            PassDecision::Livelock(stuck) => {
                assert_eq!(
                    stuck,
                    vec![
                        ("public.a".to_string(), "a needs b".to_string()),
                        ("public.b".to_string(), "b needs a".to_string()),
                    ]
                );
            }
            other => panic!("expected livelock, got {:?}", other),
        }
    }

    #[test]
    fn test_latest_deferral_reason_wins() {
        let mut sched = Scheduler::new(labels(&["public.a", "public.b"]));

        sched.begin_pass();
        sched.record(0, AttemptOutcome::Deferred("first reason".to_string()));
        sched.record(1, AttemptOutcome::Copied(1));
        sched.end_pass();

        sched.begin_pass();
        sched.record(0, AttemptOutcome::Deferred("second reason".to_string()));

        match sched.end_pass() {
            PassDecision::Livelock(stuck) => {
                assert_eq!(stuck[0].1, "second reason");
            }
            other => panic!("expected livelock, got {:?}", other),
        }
    }

    #[test]
    fn test_default_options() {
        let options = CloneOptions::default();
        assert_eq!(options.batch_size, 2000);
        assert!(options.verify);
    }
}
