//! Batch Runner
//!
//! Runs the pipeline over every pending row of a table with a bounded
//! worker pool and checkpoints the table through a [`ResultSink`].
//!
//! ## Flow
//!
//! 1. Rows whose value cell already parses as a number are skipped
//! 2. Up to `workers` subjects run concurrently (`buffer_unordered`)
//! 3. Each worker stores its [`SubjectOutcome`] in the [`ResultRegistry`]
//!    under its own row index
//! 4. Every `batch_size` completions the registry is drained into the table
//!    and the sink rewrites it; once more at the end
//!
//! A per-subject failure only marks that row. A sink failure aborts the run.
//! Setting the cancel flag (see [`BatchRunner::cancel_on_ctrl_c`]) stops new
//! subjects from starting; in-flight ones finish and are saved.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use futures::{StreamExt, future};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ColumnConfig, Config};
use crate::constants::batch::ERROR_MARKER;
use crate::parse::sanitize_number;
use crate::pipeline::{Orchestrator, PipelineResult};
use crate::table::{ResultSink, Table};
use crate::types::{Result, Subject, SubjectId};

/// Result slot of one row
#[derive(Debug, Clone)]
pub enum SubjectOutcome {
    Completed(Box<PipelineResult>),
    Failed(String),
}

impl SubjectOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            SubjectOutcome::Completed(result) => result.extracted_value,
            SubjectOutcome::Failed(_) => None,
        }
    }

    /// Text stored in the transcript column
    pub fn transcript_cell(&self) -> String {
        match self {
            SubjectOutcome::Completed(result) => result.transcript.to_string(),
            SubjectOutcome::Failed(message) => format!("{} {}", ERROR_MARKER, message),
        }
    }
}

/// Lock-free outcome registry keyed by row
///
/// Each key is written by exactly one worker.
#[derive(Debug, Default)]
pub struct ResultRegistry {
    outcomes: DashMap<SubjectId, SubjectOutcome>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: SubjectId, outcome: SubjectOutcome) {
        if self.outcomes.insert(id, outcome).is_some() {
            warn!(%id, "Outcome recorded twice for the same row");
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Remove every stored outcome, ordered by row
    pub fn take_all(&self) -> Vec<(SubjectId, SubjectOutcome)> {
        let mut ids: Vec<SubjectId> = self.outcomes.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.outcomes.remove(&id))
            .collect()
    }
}

/// Totals of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Rows in the table
    pub total: usize,
    /// Rows that already had a value
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded rows with an extracted value
    pub with_value: usize,
    pub mean_value: Option<f64>,
    /// Stopped early by the cancel flag
    pub interrupted: bool,
    #[serde(skip)]
    value_sum: f64,
}

impl BatchReport {
    fn record(&mut self, outcome: &SubjectOutcome) {
        match outcome {
            SubjectOutcome::Completed(result) => {
                self.succeeded += 1;
                if let Some(value) = result.extracted_value {
                    self.with_value += 1;
                    self.value_sum += value;
                    self.mean_value = Some(self.value_sum / self.with_value as f64);
                }
            }
            SubjectOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Column indices resolved against a concrete table
#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    name: usize,
    description: Option<usize>,
    value: usize,
    transcript: usize,
}

impl ColumnLayout {
    fn resolve(table: &mut Table, columns: &ColumnConfig) -> Result<Self> {
        Ok(Self {
            name: table.require_column(&columns.subject_name)?,
            description: table.column(&columns.subject_description),
            value: table.ensure_column(&columns.extracted_value),
            transcript: table.ensure_column(&columns.transcript),
        })
    }
}

/// Pool size, checkpoint interval and optional row cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub workers: usize,
    pub batch_size: usize,
    /// Process at most this many pending rows
    pub limit: Option<usize>,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.batch.workers.max(1),
            batch_size: config.batch.batch_size.max(1),
            limit: None,
        }
    }
}

pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    columns: ColumnConfig,
    options: BatchOptions,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, columns: ColumnConfig, options: BatchOptions) -> Self {
        Self {
            orchestrator,
            columns,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        Self::new(
            orchestrator,
            config.columns.clone(),
            BatchOptions::from_config(config),
        )
    }

    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Shared flag; once set no further subjects are started
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Set the cancel flag on the first Ctrl-C; a second one exits the process
    pub fn cancel_on_ctrl_c(&self) {
        self.cancel_on(
            || async { tokio::signal::ctrl_c().await.is_ok() },
            || std::process::exit(130),
        );
    }

    /// First `signal` stops new subjects from starting, a second one calls `abort`
    fn cancel_on<S, Fut, A>(&self, mut signal: S, abort: A) -> tokio::task::JoinHandle<()>
    where
        S: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
        A: FnOnce() + Send + 'static,
    {
        let flag = self.cancel_flag();
        tokio::spawn(async move {
            if !signal().await {
                return;
            }
            warn!(
                "Interrupt received: finishing in-flight subjects, no new ones will start \
                 (interrupt again to abort)"
            );
            flag.store(true, Ordering::SeqCst);

            if signal().await {
                error!("Second interrupt: aborting, rows saved at the last checkpoint are kept");
                abort();
            }
        })
    }

    /// Rows still lacking a value, with their subjects (or why none could be built)
    fn pending_rows(
        &self,
        table: &Table,
        layout: &ColumnLayout,
    ) -> Vec<(SubjectId, Result<Subject>)> {
        (0..table.len())
            .filter(|&row| {
                table
                    .get(row, layout.value)
                    .and_then(sanitize_number)
                    .is_none()
            })
            .map(|row| {
                let name = table.get(row, layout.name).unwrap_or_default();
                let description = layout
                    .description
                    .and_then(|col| table.get(row, col))
                    .unwrap_or_default();
                (SubjectId::new(row), Subject::new(name, description))
            })
            .take(self.options.limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn apply(
        table: &mut Table,
        layout: &ColumnLayout,
        id: SubjectId,
        outcome: &SubjectOutcome,
    ) -> Result<()> {
        let value = outcome.value().map(|v| v.to_string()).unwrap_or_default();
        table.set(id.row(), layout.value, value)?;
        table.set(id.row(), layout.transcript, outcome.transcript_cell())
    }

    /// Drain finished outcomes into the table and persist it
    fn checkpoint(
        table: &mut Table,
        layout: &ColumnLayout,
        registry: &ResultRegistry,
        report: &mut BatchReport,
        sink: &mut dyn ResultSink,
    ) -> Result<()> {
        for (id, outcome) in &registry.take_all() {
            Self::apply(table, layout, *id, outcome)?;
            report.record(outcome);
        }
        sink.save(table)
    }

    /// Process all pending rows of `table`, saving through `sink`
    #[instrument(skip_all, fields(rows = table.len(), workers = self.options.workers))]
    pub async fn run(&self, table: &mut Table, sink: &mut dyn ResultSink) -> Result<BatchReport> {
        let layout = ColumnLayout::resolve(table, &self.columns)?;
        let pending = self.pending_rows(table, &layout);

        let mut report = BatchReport {
            total: table.len(),
            skipped: (0..table.len())
                .filter(|&row| {
                    table
                        .get(row, layout.value)
                        .and_then(sanitize_number)
                        .is_some()
                })
                .count(),
            ..BatchReport::default()
        };

        if report.skipped > 0 {
            info!("Batch: skipping {} already processed rows", report.skipped);
        }
        if pending.is_empty() {
            info!("Batch: nothing to do");
            return Ok(report);
        }

        let to_process = pending.len();
        info!(
            "Batch: processing {} rows (workers={}, batch_size={})",
            to_process, self.options.workers, self.options.batch_size
        );

        let registry = Arc::new(ResultRegistry::new());
        let cancel = Arc::clone(&self.cancel);

        let mut stream = futures::stream::iter(pending)
            .take_while(move |_| future::ready(!cancel.load(Ordering::SeqCst)))
            .map(|(id, subject)| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let registry = Arc::clone(&registry);
                async move {
                    let outcome = match subject {
                        Ok(subject) => match orchestrator.run(&subject).await {
                            Ok(result) => SubjectOutcome::Completed(Box::new(result)),
                            Err(e) => {
                                warn!(%id, subject = %subject, error = %e, "Subject failed");
                                SubjectOutcome::Failed(e.to_string())
                            }
                        },
                        Err(e) => {
                            warn!(%id, error = %e, "Row has no usable subject");
                            SubjectOutcome::Failed(e.to_string())
                        }
                    };
                    let summary = (outcome.value(), matches!(outcome, SubjectOutcome::Failed(_)));
                    registry.insert(id, outcome);
                    (id, summary)
                }
            })
            .buffer_unordered(self.options.workers);

        let mut completed = 0;
        let mut unsaved = 0;

        while let Some((id, (value, failed))) = stream.next().await {
            completed += 1;
            unsaved += 1;
            info!(
                "Batch: [{}/{}] {} {}",
                completed,
                to_process,
                id,
                match (failed, value) {
                    (true, _) => "failed".to_string(),
                    (false, Some(v)) => format!("cf_value={}", v),
                    (false, None) => "no value".to_string(),
                }
            );

            if unsaved >= self.options.batch_size {
                Self::checkpoint(table, &layout, &registry, &mut report, sink)?;
                debug!("Batch: checkpoint after {} rows to {}", completed, sink.location());
                unsaved = 0;
            }
        }
        drop(stream);

        if !registry.is_empty() {
            Self::checkpoint(table, &layout, &registry, &mut report, sink)?;
        }

        report.interrupted = completed < to_process;
        if report.interrupted {
            warn!(
                "Batch: interrupted after {} of {} rows; rerun to continue",
                completed, to_process
            );
        }

        info!(
            "Batch: complete ({} succeeded, {} failed, {} with value) saved to {}",
            report.succeeded,
            report.failed,
            report.with_value,
            sink.location()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GenerationRequest, LlmResponse, TextGenerator};
    use crate::pipeline::prompts;
    use crate::types::{ErrorCategory, LlmError, PcfError};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Answers with `*cf_value: N` for subjects named `item-N`; fails for `fail-*`
    #[derive(Default)]
    struct EchoGenerator {
        calls: AtomicUsize,
    }

    fn product_name(request: &GenerationRequest) -> String {
        let first = request.turns.first().map(|t| t.text.as_str()).unwrap_or("");
        let first = first.rsplit("User Prompt:\n").next().unwrap_or(first);
        first
            .lines()
            .find_map(|l| l.strip_prefix("Product Name: "))
            .unwrap_or("")
            .to_string()
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> crate::types::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = product_name(request);
            if name.starts_with("fail-") {
                return Err(LlmError::new(ErrorCategory::Auth, "denied").into());
            }
            let text = match request.system_instruction.as_str() {
                prompts::GUIDANCE_SYSTEM => format!("guidance for {}", name),
                prompts::ANALYST_SYSTEM => {
                    let n = name.trim_start_matches("item-");
                    format!("{} estimate\n*cf_value: {}", name, n)
                }
                _ => "*rating: Pass".to_string(),
            };
            Ok(LlmResponse::text_only(text))
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }
    }

    #[derive(Default)]
    struct MemorySink {
        saves: Vec<Table>,
        fail: bool,
    }

    impl ResultSink for MemorySink {
        fn save(&mut self, table: &Table) -> Result<()> {
            if self.fail {
                return Err(PcfError::Sink("disk full".to_string()));
            }
            self.saves.push(table.clone());
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn runner(generator: Arc<EchoGenerator>, workers: usize, batch_size: usize) -> BatchRunner {
        let config = Config::default();
        let orchestrator = Arc::new(Orchestrator::from_config(generator, &config));
        BatchRunner::new(
            orchestrator,
            config.columns.clone(),
            BatchOptions {
                workers,
                batch_size,
                limit: None,
            },
        )
    }

    fn table(names: &[&str]) -> Table {
        let mut table = Table::new(vec!["id".to_string(), "subject_name".to_string()]);
        for (i, name) in names.iter().enumerate() {
            table.push_row(vec![format!("r{}", i), name.to_string()]);
        }
        table
    }

    #[tokio::test]
    async fn test_second_interrupt_aborts() {
        let runner = runner(Arc::new(EchoGenerator::default()), 1, 1);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let aborted = Arc::new(AtomicBool::new(false));

        let handle = runner.cancel_on(
            move || {
                let rx = Arc::clone(&rx);
                async move { rx.lock().await.recv().await.is_some() }
            },
            {
                let aborted = Arc::clone(&aborted);
                move || aborted.store(true, Ordering::SeqCst)
            },
        );

        tx.send(()).unwrap();
        let flag = runner.cancel_flag();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !flag.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!aborted.load(Ordering::SeqCst));

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_signal_source_closed_does_nothing() {
        let runner = runner(Arc::new(EchoGenerator::default()), 1, 1);
        let handle = runner.cancel_on(|| async { false }, || panic!("must not abort"));
        handle.await.unwrap();
        assert!(!runner.cancel_flag().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_every_row_gets_its_own_result() {
        let names = ["item-1", "item-2", "fail-3", "item-4", "", "item-6", "fail-7"];
        let mut table = table(&names);
        let mut sink = MemorySink::default();

        let report = runner(Arc::new(EchoGenerator::default()), 3, 2)
            .run(&mut table, &mut sink)
            .await
            .unwrap();

        assert_eq!(report.total, 7);
        assert_eq!(report.processed(), 7);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 3);
        assert_eq!(report.with_value, 4);
        assert_eq!(report.mean_value, Some((1.0 + 2.0 + 4.0 + 6.0) / 4.0));
        assert!(!report.interrupted);

        let value = table.column("extracted_value").unwrap();
        let transcript = table.column("transcript").unwrap();
        for (row, name) in names.iter().enumerate() {
            let cell = table.get(row, transcript).unwrap();
            if let Some(n) = name.strip_prefix("item-") {
                assert_eq!(table.get(row, value), Some(n));
                assert!(cell.contains(&format!("{} estimate", name)));
            } else {
                assert_eq!(table.get(row, value), Some(""));
                assert!(cell.starts_with("Error: "), "row {row}: {cell}");
            }
        }
        // untouched column survives
        assert_eq!(table.get(6, 0), Some("r6"));

        // checkpoints after 2, 4, 6 completions plus the final one
        assert_eq!(sink.saves.len(), 4);
        assert_eq!(sink.saves.last(), Some(&table));
    }

    #[tokio::test]
    async fn test_empty_name_makes_no_calls() {
        let generator = Arc::new(EchoGenerator::default());
        let mut table = table(&["   "]);
        let mut sink = MemorySink::default();

        let report = runner(generator.clone(), 2, 10)
            .run(&mut table, &mut sink)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        let transcript = table.column("transcript").unwrap();
        assert!(table.get(0, transcript).unwrap().contains("Invalid subject"));
    }

    #[tokio::test]
    async fn test_rows_with_values_are_skipped() {
        let generator = Arc::new(EchoGenerator::default());
        let mut table = Table::new(vec![
            "subject_name".to_string(),
            "extracted_value".to_string(),
        ]);
        table.push_row(vec!["item-1".to_string(), "42.5".to_string()]);
        table.push_row(vec!["item-2".to_string(), String::new()]);
        table.push_row(vec!["item-3".to_string(), "Error: old".to_string()]);
        let mut sink = MemorySink::default();

        let report = runner(generator.clone(), 2, 10)
            .run(&mut table, &mut sink)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(table.get(0, 1), Some("42.5"));
        assert_eq!(table.get(1, 1), Some("2"));
        assert_eq!(table.get(2, 1), Some("3"));
    }

    #[tokio::test]
    async fn test_all_processed_is_noop() {
        let mut table = Table::new(vec![
            "subject_name".to_string(),
            "extracted_value".to_string(),
        ]);
        table.push_row(vec!["item-1".to_string(), "1".to_string()]);
        let mut sink = MemorySink::default();

        let report = runner(Arc::new(EchoGenerator::default()), 2, 10)
            .run(&mut table, &mut sink)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed(), 0);
        assert!(sink.saves.is_empty());
    }

    #[tokio::test]
    async fn test_limit_caps_pending_rows() {
        let mut table = table(&["item-1", "item-2", "item-3"]);
        let mut sink = MemorySink::default();
        let mut runner = runner(Arc::new(EchoGenerator::default()), 2, 10);
        runner.options.limit = Some(2);

        let report = runner.run(&mut table, &mut sink).await.unwrap();
        assert_eq!(report.processed(), 2);
        assert!(!report.interrupted);
        assert_eq!(table.get(2, 2), Some(""));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let generator = Arc::new(EchoGenerator::default());
        let mut table = table(&["item-1", "item-2"]);
        let mut sink = MemorySink::default();
        let runner = runner(generator.clone(), 2, 10);
        runner.cancel_flag().store(true, Ordering::SeqCst);

        let report = runner.run(&mut table, &mut sink).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.processed(), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let mut table = table(&["item-1"]);
        let mut sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };

        let err = runner(Arc::new(EchoGenerator::default()), 1, 1)
            .run(&mut table, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PcfError::Sink(_)));
    }

    #[tokio::test]
    async fn test_missing_name_column() {
        let mut table = Table::new(vec!["product".to_string()]);
        let mut sink = MemorySink::default();
        let result = runner(Arc::new(EchoGenerator::default()), 1, 1)
            .run(&mut table, &mut sink)
            .await;
        assert!(matches!(result, Err(PcfError::Table(_))));
    }

    #[test]
    fn test_registry_take_all_orders_rows() {
        let registry = ResultRegistry::new();
        registry.insert(SubjectId::new(5), SubjectOutcome::Failed("a".into()));
        registry.insert(SubjectId::new(1), SubjectOutcome::Failed("b".into()));
        let rows: Vec<_> = registry.take_all().into_iter().map(|(id, _)| id.row()).collect();
        assert_eq!(rows, vec![1, 5]);
        assert!(registry.is_empty());
    }
}
