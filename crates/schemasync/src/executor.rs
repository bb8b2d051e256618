//! Migration executor.
//!
//! Applies a [`MigrationPlan`] batch by batch against a live database and
//! reports every failure instead of stopping at the first one when asked to.

use std::fmt;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use schemasync_core::model::Database;
use schemasync_core::planner::{Batch, MigrationPlan, Phase, Step, Unit};
use schemasync_core::platform::PlatformInfo;
use schemasync_core::sql::SqlBuilder;
use schemasync_core::state::ModelState;
use schemasync_core::SyncError;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionPool, SqlConnection};
use crate::error::{DbError, Result};

const BACKFILL_SAVEPOINT: &str = "schemasync_backfill";

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Keep going after a failed change or batch.
    pub continue_on_error: bool,
    /// Send data statements in chunks of `batch_size`.
    pub use_batch_mode: bool,
    pub batch_size: usize,
    /// Upper bound on concurrently running units.
    pub max_threads: usize,
    pub statement_timeout: Option<Duration>,
    /// Record statements without executing them.
    pub dry_run: bool,
}

impl ExecutorOptions {
    /// Defaults for a platform.
    #[must_use]
    pub const fn for_platform(platform: &PlatformInfo) -> Self {
        Self {
            continue_on_error: false,
            use_batch_mode: false,
            batch_size: platform.default_batch_size,
            max_threads: 1,
            statement_timeout: None,
            dry_run: false,
        }
    }

    /// Sets whether failures are collected instead of stopping the run.
    #[must_use]
    pub const fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Enables chunked data statements.
    #[must_use]
    pub const fn batch_mode(mut self, batch_size: usize) -> Self {
        self.use_batch_mode = true;
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of concurrently running units.
    #[must_use]
    pub const fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Sets the per-statement timeout.
    #[must_use]
    pub const fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The platform cannot express the change.
    UnsupportedChange,
    /// A given or generated identifier is too long.
    IdentifierTooLong,
    /// The change could not be rendered for another reason.
    Render,
    /// The database rejected a statement.
    StatementExecution,
    /// A constraint or trigger could not be switched back on.
    ConstraintReenable,
}

/// How bad a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// The run result is still consistent (e.g. a failed backfill).
    Warning,
    Normal,
    /// The database may be left without integrity checks.
    High,
}

/// One failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub severity: Severity,
    /// Description of the change (or guard object) concerned.
    pub change: String,
    pub table: Option<String>,
    pub column: Option<String>,
    pub statement: Option<String>,
    /// Driver or renderer message.
    pub message: String,
    pub retryable: bool,
}

impl ExecutionFailure {
    fn render(step: &Step, error: &SyncError) -> Self {
        let kind = match error {
            SyncError::UnsupportedChange { .. } => FailureKind::UnsupportedChange,
            SyncError::IdentifierTooLong { .. } => FailureKind::IdentifierTooLong,
            _ => FailureKind::Render,
        };
        Self {
            kind,
            severity: Severity::Normal,
            change: step.description(),
            table: step.table().map(str::to_string),
            column: step.column().map(str::to_string),
            statement: None,
            message: error.to_string(),
            retryable: false,
        }
    }

    fn statement(step: &Step, sql: &str, error: &DbError) -> Self {
        Self {
            kind: FailureKind::StatementExecution,
            severity: if step.is_recoverable() {
                Severity::Warning
            } else {
                Severity::Normal
            },
            change: step.description(),
            table: step.table().map(str::to_string),
            column: step.column().map(str::to_string),
            statement: Some(sql.to_string()),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    fn guard(change: String, table: Option<String>, sql: Option<&str>, message: String) -> Self {
        Self {
            kind: FailureKind::StatementExecution,
            severity: Severity::Normal,
            change,
            table,
            column: None,
            statement: sql.map(str::to_string),
            message,
            retryable: false,
        }
    }

    fn transaction(phase: Phase, table: Option<&str>, sql: &str, error: &DbError) -> Self {
        Self {
            kind: FailureKind::StatementExecution,
            severity: Severity::Normal,
            change: format!("{sql} of {phase} batch"),
            table: table.map(str::to_string),
            column: None,
            statement: Some(sql.to_string()),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    fn reenable(table: &str, object: &str, sql: Option<&str>, message: String) -> Self {
        Self {
            kind: FailureKind::ConstraintReenable,
            severity: Severity::High,
            change: format!("Re-enable {object}"),
            table: Some(table.to_string()),
            column: None,
            statement: sql.map(str::to_string),
            message,
            retryable: false,
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.change, self.message)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Steps applied to the database.
    pub applied_count: usize,
    pub failures: Vec<ExecutionFailure>,
    /// The current model advanced past every applied step.
    pub model: Database,
    /// Statements sent (or, in dry-run mode, that would be sent).
    pub statements: Vec<String>,
}

impl ExecutionReport {
    /// Returns whether the run had no failures beyond warnings.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.iter().all(|f| f.severity == Severity::Warning)
    }

    /// Failures above warning level.
    pub fn errors(&self) -> impl Iterator<Item = &ExecutionFailure> {
        self.failures.iter().filter(|f| f.severity > Severity::Warning)
    }

    /// Warnings only.
    pub fn warnings(&self) -> impl Iterator<Item = &ExecutionFailure> {
        self.failures.iter().filter(|f| f.severity == Severity::Warning)
    }
}

/// What a batch or unit left behind.
#[derive(Default)]
struct Outcome<'a> {
    applied: Vec<&'a Step>,
    failures: Vec<ExecutionFailure>,
    statements: Vec<String>,
    aborted: bool,
}

impl<'a> Outcome<'a> {
    fn merge(&mut self, other: Self) {
        self.applied.extend(other.applied);
        self.failures.extend(other.failures);
        self.statements.extend(other.statements);
        self.aborted |= other.aborted;
    }
}

/// Executes migration plans against a pool.
pub struct MigrationExecutor<P: ConnectionPool> {
    pool: P,
    builder: SqlBuilder,
    options: ExecutorOptions,
}

impl<P: ConnectionPool> MigrationExecutor<P> {
    /// Creates an executor with the platform's default options.
    pub fn new(pool: P, platform: PlatformInfo) -> Self {
        let options = ExecutorOptions::for_platform(&platform);
        Self {
            pool,
            builder: SqlBuilder::new(platform),
            options,
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Applies `plan` to the database whose model is `current`.
    ///
    /// Without `continue_on_error` the run stops after the first failed
    /// batch; with it, every batch is attempted and all failures are
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns an error only when no connection can be obtained. Failures
    /// of individual statements are part of the report.
    pub async fn execute(&self, plan: &MigrationPlan, current: Database) -> Result<ExecutionReport> {
        info!(
            batches = plan.batches.len(),
            steps = plan.step_count(),
            dry_run = self.options.dry_run,
            "Executing migration plan"
        );

        let mut state = ModelState::new(current);
        let mut applied_count = 0;
        let mut failures = Vec::new();
        let mut statements = Vec::new();

        for batch in &plan.batches {
            let outcome = self.run_batch(batch).await?;
            for step in &outcome.applied {
                if let Err(e) = step.apply_to(&mut state) {
                    warn!(step = %step.description(), error = %e, "Could not replay step on model");
                }
            }
            applied_count += outcome.applied.len();
            statements.extend(outcome.statements);
            let failed = outcome.aborted || outcome.failures.iter().any(|f| f.severity > Severity::Warning);
            failures.extend(outcome.failures);

            if failed && !self.options.continue_on_error {
                warn!(phase = %batch.phase, "Batch failed, stopping");
                break;
            }
        }

        if failures.is_empty() {
            info!(applied = applied_count, "Migration applied successfully");
        } else {
            warn!(
                applied = applied_count,
                failures = failures.len(),
                "Migration finished with failures"
            );
        }
        Ok(ExecutionReport {
            applied_count,
            failures,
            model: state.into_model(),
            statements,
        })
    }

    fn transactional(&self) -> bool {
        self.builder.platform().transactional_ddl && !self.options.dry_run
    }

    async fn run_batch<'a>(&self, batch: &'a Batch) -> Result<Outcome<'a>> {
        info!(
            phase = %batch.phase,
            units = batch.units.len(),
            destructive = batch.destructive,
            "Running batch"
        );
        let mut conn = self.pool.acquire().await?;
        let mut outcome = Outcome::default();

        self.disable_guard(&mut conn, batch, &mut outcome).await;

        if !outcome.aborted {
            let parallel =
                batch.parallel_eligible && self.options.max_threads > 1 && batch.units.len() > 1;
            if parallel {
                debug!(threads = self.options.max_threads, "Running units concurrently");
                let results: Vec<Outcome<'a>> = stream::iter(&batch.units)
                    .map(|unit| self.run_isolated(unit, batch.phase))
                    .buffer_unordered(self.options.max_threads)
                    .collect()
                    .await;
                for result in results {
                    outcome.merge(result);
                }
            } else {
                let transactional =
                    self.transactional() && self.begin(&mut conn, batch.phase, None, &mut outcome).await;
                for unit in &batch.units {
                    if outcome.aborted {
                        break;
                    }
                    let mut unit_outcome = self.run_unit(&mut conn, unit, batch.phase).await;
                    if unit_outcome.aborted && !transactional && self.options.continue_on_error {
                        // Without a transaction the other units stay independent.
                        unit_outcome.aborted = false;
                        outcome.merge(unit_outcome);
                        continue;
                    }
                    let aborted = unit_outcome.aborted;
                    outcome.merge(unit_outcome);
                    if aborted {
                        break;
                    }
                }
                if transactional {
                    self.end(&mut conn, batch.phase, None, &mut outcome).await;
                }
            }
        }

        // Attempted even after a failed batch.
        self.enable_guard(&mut conn, batch, &mut outcome).await;
        Ok(outcome)
    }

    /// Runs a unit on its own connection and transaction.
    async fn run_isolated<'a>(&self, unit: &'a Unit, phase: Phase) -> Outcome<'a> {
        let table = unit.table.as_deref();
        let mut outcome = Outcome::default();
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(phase = %phase, error = %e, "Cannot acquire connection");
                outcome
                    .failures
                    .push(ExecutionFailure::transaction(phase, table, "CONNECT", &e));
                outcome.aborted = true;
                return outcome;
            }
        };
        let transactional =
            self.transactional() && self.begin(&mut conn, phase, table, &mut outcome).await;
        if outcome.aborted {
            return outcome;
        }
        outcome.merge(self.run_unit(&mut conn, unit, phase).await);
        if transactional {
            self.end(&mut conn, phase, table, &mut outcome).await;
        }
        outcome
    }

    /// Opens a transaction. A failure aborts the batch.
    async fn begin(
        &self,
        conn: &mut P::Conn,
        phase: Phase,
        table: Option<&str>,
        outcome: &mut Outcome<'_>,
    ) -> bool {
        match conn.begin().await {
            Ok(()) => true,
            Err(e) => {
                error!(phase = %phase, error = %e, "Cannot open transaction");
                outcome
                    .failures
                    .push(ExecutionFailure::transaction(phase, table, "BEGIN", &e));
                outcome.aborted = true;
                false
            }
        }
    }

    /// Commits, or rolls back an aborted batch. Nothing counts as applied
    /// unless the commit succeeds.
    async fn end(
        &self,
        conn: &mut P::Conn,
        phase: Phase,
        table: Option<&str>,
        outcome: &mut Outcome<'_>,
    ) {
        if !outcome.aborted {
            match conn.commit().await {
                Ok(()) => return,
                Err(e) => {
                    error!(phase = %phase, error = %e, "Commit failed");
                    outcome
                        .failures
                        .push(ExecutionFailure::transaction(phase, table, "COMMIT", &e));
                    outcome.aborted = true;
                }
            }
        }
        warn!(phase = %phase, "Rolling back batch");
        outcome.applied.clear();
        if let Err(e) = conn.rollback().await {
            error!(phase = %phase, error = %e, "Rollback failed");
            outcome
                .failures
                .push(ExecutionFailure::transaction(phase, table, "ROLLBACK", &e));
        }
    }

    async fn run_unit<'a>(&self, conn: &mut P::Conn, unit: &'a Unit, phase: Phase) -> Outcome<'a> {
        if phase == Phase::Data && self.options.use_batch_mode && self.options.batch_size > 1 {
            return self.run_unit_chunked(conn, unit).await;
        }

        let mut outcome = Outcome::default();
        for step in &unit.steps {
            let statements = match self.builder.render(step) {
                Ok(statements) => statements,
                Err(e) => {
                    warn!(change = %step.description(), error = %e, "Cannot render change");
                    outcome.failures.push(ExecutionFailure::render(step, &e));
                    if self.options.continue_on_error {
                        continue;
                    }
                    outcome.aborted = true;
                    break;
                }
            };
            if self.run_step(conn, step, &statements, &mut outcome).await {
                outcome.applied.push(step);
            } else if !step.is_recoverable() {
                outcome.aborted = true;
                break;
            }
        }
        outcome
    }

    /// Runs the statements of one step. Returns whether all succeeded.
    ///
    /// A failed recoverable step is undone to a savepoint so the
    /// surrounding transaction stays usable.
    async fn run_step(
        &self,
        conn: &mut P::Conn,
        step: &Step,
        statements: &[String],
        outcome: &mut Outcome<'_>,
    ) -> bool {
        let savepoint = step.is_recoverable() && self.transactional();
        if savepoint {
            if let Err(e) = conn.execute(&format!("SAVEPOINT {BACKFILL_SAVEPOINT}")).await {
                outcome.failures.push(ExecutionFailure::statement(step, "SAVEPOINT", &e));
                return false;
            }
        }

        for sql in statements {
            match self.run_statement(conn, sql).await {
                Ok(()) => outcome.statements.push(sql.clone()),
                Err(e) => {
                    if step.is_recoverable() {
                        warn!(change = %step.description(), error = %e, "Backfill failed");
                    } else {
                        error!(change = %step.description(), error = %e, "Statement failed");
                    }
                    outcome.failures.push(ExecutionFailure::statement(step, sql, &e));
                    if savepoint {
                        let undo = format!("ROLLBACK TO SAVEPOINT {BACKFILL_SAVEPOINT}");
                        if let Err(e) = conn.execute(&undo).await {
                            outcome.failures.push(ExecutionFailure::statement(step, &undo, &e));
                            outcome.aborted = true;
                        }
                    }
                    return false;
                }
            }
        }

        if savepoint {
            let release = format!("RELEASE SAVEPOINT {BACKFILL_SAVEPOINT}");
            if let Err(e) = conn.execute(&release).await {
                outcome.failures.push(ExecutionFailure::statement(step, &release, &e));
                return false;
            }
        }
        true
    }

    /// Sends the row statements of a unit in chunks of `batch_size`.
    async fn run_unit_chunked<'a>(&self, conn: &mut P::Conn, unit: &'a Unit) -> Outcome<'a> {
        let mut outcome = Outcome::default();
        let mut pending: Vec<(&'a Step, String)> = Vec::new();

        for step in &unit.steps {
            match self.builder.render(step) {
                Ok(statements) => {
                    pending.extend(statements.into_iter().map(|sql| (step, sql)));
                }
                Err(e) => {
                    outcome.failures.push(ExecutionFailure::render(step, &e));
                    if !self.options.continue_on_error {
                        outcome.aborted = true;
                        break;
                    }
                }
            }
            if pending.len() >= self.options.batch_size
                && !self.flush_chunk(conn, &mut pending, &mut outcome).await
            {
                return outcome;
            }
        }
        if !outcome.aborted {
            self.flush_chunk(conn, &mut pending, &mut outcome).await;
        }
        outcome
    }

    async fn flush_chunk<'a>(
        &self,
        conn: &mut P::Conn,
        pending: &mut Vec<(&'a Step, String)>,
        outcome: &mut Outcome<'a>,
    ) -> bool {
        if pending.is_empty() {
            return true;
        }
        let statements: Vec<&str> = pending.iter().map(|(_, sql)| sql.as_str()).collect();
        let chunk = self.chunk_sql(&statements);
        debug!(statements = statements.len(), "Sending data chunk");

        let result = self.run_statement(conn, &chunk).await;
        let steps: Vec<&'a Step> = pending.drain(..).map(|(step, _)| step).collect();
        match result {
            Ok(()) => {
                outcome.statements.push(chunk);
                for step in steps {
                    if !outcome.applied.last().is_some_and(|last| std::ptr::eq(*last, step)) {
                        outcome.applied.push(step);
                    }
                }
                true
            }
            Err(e) => {
                error!(statements = steps.len(), error = %e, "Data chunk failed");
                let mut failure = ExecutionFailure::statement(steps[0], &chunk, &e);
                failure.change = format!("{} row changes starting with: {}", steps.len(), failure.change);
                outcome.failures.push(failure);
                outcome.aborted = true;
                false
            }
        }
    }

    /// Joins statements into one round trip.
    fn chunk_sql(&self, statements: &[&str]) -> String {
        match statements {
            [single] => (*single).to_string(),
            _ if self.builder.platform().is_oracle() => {
                let body: String = statements.iter().map(|s| format!("  {s};\n")).collect();
                format!("BEGIN\n{body}END;")
            }
            _ => statements.join(";\n"),
        }
    }

    async fn disable_guard<'a>(&self, conn: &mut P::Conn, batch: &Batch, outcome: &mut Outcome<'a>) {
        if batch.guard.is_empty() {
            return;
        }
        let statements = match self.builder.disable_guard(&batch.guard) {
            Ok(statements) => statements,
            Err(e) => {
                outcome.failures.push(ExecutionFailure::guard(
                    format!("Disable constraints for {} batch", batch.phase),
                    None,
                    None,
                    e.to_string(),
                ));
                outcome.aborted = true;
                return;
            }
        };
        debug!(count = statements.len(), "Disabling constraints");
        for sql in statements {
            match self.run_statement(conn, &sql).await {
                Ok(()) => outcome.statements.push(sql),
                Err(e) => {
                    error!(sql = %sql, error = %e, "Cannot disable constraint");
                    outcome.failures.push(ExecutionFailure::guard(
                        format!("Disable constraints for {} batch", batch.phase),
                        None,
                        Some(&sql),
                        e.to_string(),
                    ));
                    outcome.aborted = true;
                    return;
                }
            }
        }
    }

    async fn enable_guard<'a>(&self, conn: &mut P::Conn, batch: &Batch, outcome: &mut Outcome<'a>) {
        if batch.guard.is_empty() {
            return;
        }
        let statements = match self.builder.enable_guard(&batch.guard) {
            Ok(statements) => statements,
            Err(e) => {
                let tables: Vec<String> = batch.tables().into_iter().collect();
                outcome.failures.push(ExecutionFailure::reenable(
                    &tables.join(", "),
                    "constraints",
                    None,
                    e.to_string(),
                ));
                return;
            }
        };
        for (table, object, sql) in statements {
            match self.run_statement(conn, &sql).await {
                Ok(()) => outcome.statements.push(sql),
                Err(e) => {
                    error!(table = %table, object = %object, error = %e, "Cannot re-enable constraint");
                    outcome
                        .failures
                        .push(ExecutionFailure::reenable(&table, &object, Some(&sql), e.to_string()));
                }
            }
        }
    }

    async fn run_statement(&self, conn: &mut P::Conn, sql: &str) -> Result<()> {
        if sql.trim_start().starts_with("--") {
            warn!(comment = %sql, "Skipping comment");
            return Ok(());
        }
        if self.options.dry_run {
            debug!(sql = %sql, "Dry run");
            return Ok(());
        }
        match self.options.statement_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, conn.execute(sql))
                    .await
                    .map_err(|_| DbError::Timeout(limit))??;
            }
            None => {
                conn.execute(sql).await?;
            }
        }
        Ok(())
    }
}
