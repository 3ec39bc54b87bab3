//! Orchestrator: record stream → limiter → executor → sink → checkpoint

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use rustc_hash::FxHashSet;
use sharegen_core::{
    CheckpointStore, ProgressContext, RateLimiter, RecordProgress, SharedProgress, Tally,
    TerminalOutcome, TerminalSet, WorkQueue, checkpoint_path, shutdown_flag,
};

use crate::api::{SumsubClient, TokenApi};
use crate::config::Config;
use crate::executor::RequestExecutor;
use crate::output::{OutputRow, ResultSink, output_keys};
use crate::record::{InputRecord, read_records};
use crate::state::{ProcessingOutcome, RunMode};
use crate::stats::RunSummary;

/// Main entry point: read the input, wire up the pipeline, run it.
pub fn run(config: &Config, progress: SharedProgress) -> anyhow::Result<RunSummary> {
    log::info!(
        "sharegen starting: mode={}, input={}, output={}, workers={}, rate={}/{:.1}s",
        config.mode,
        config.input.display(),
        config.output.display(),
        config.workers,
        config.rate_limit,
        config.rate_window.as_secs_f64()
    );

    let records = read_records(&config.input)
        .with_context(|| format!("Invalid input {}", config.input.display()))?;

    let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window));
    let client = SumsubClient::new(
        config.credentials.clone(),
        config.client.clone(),
        config.workers,
    )
    .context("Failed to build HTTP client")?;
    let executor = RequestExecutor::new(client, limiter, config.retry.clone());

    let summary = Orchestrator::new(executor, &config.output)
        .workers(config.workers)
        .progress(progress.clone())
        .run(records, config.mode)?;

    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(summary)
}

/// Output sink and checkpoint, updated together under one lock
struct Journal {
    sink: ResultSink,
    checkpoint: CheckpointStore,
}

impl Journal {
    /// Row first, then checkpoint: a crash in between reprocesses the record.
    fn record(&mut self, row: &OutputRow, outcome: &TerminalOutcome) -> std::io::Result<()> {
        self.sink.append(row)?;
        self.checkpoint.commit(&row.external_id, outcome)
    }
}

/// State shared by the workers of one live run
struct RunState {
    queue: WorkQueue<InputRecord>,
    journal: Mutex<Journal>,
    tally: Mutex<Tally>,
    bar: RecordProgress,
    /// Set on a fatal outcome or a journal failure; no further records are claimed
    stop: AtomicBool,
    interrupted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    io_error: Mutex<Option<std::io::Error>>,
}

/// Drives one bounded collection of records to terminal outcomes.
pub struct Orchestrator<A> {
    executor: RequestExecutor<A>,
    output: PathBuf,
    workers: usize,
    shutdown: &'static AtomicBool,
    progress: SharedProgress,
}

impl<A: TokenApi> Orchestrator<A> {
    pub fn new(executor: RequestExecutor<A>, output: &Path) -> Self {
        Self {
            executor,
            output: output.to_path_buf(),
            workers: 1,
            shutdown: shutdown_flag(),
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    /// Records in flight at once (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Flag polled before each record is claimed (defaults to the process-wide one)
    pub fn shutdown_on(mut self, flag: &'static AtomicBool) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn executor(&self) -> &RequestExecutor<A> {
        &self.executor
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Process `records` under `mode` and report what happened.
    ///
    /// Per-record failures land in the output; only I/O failures on the
    /// output or checkpoint are returned as errors.
    pub fn run(&self, records: Vec<InputRecord>, mode: RunMode) -> anyhow::Result<RunSummary> {
        let started = Instant::now();
        let ckpt_path = checkpoint_path(&self.output);

        let (terminal, orphans) = if mode.resume {
            self.reconcile(&ckpt_path)?
        } else {
            Default::default()
        };
        let (queue, skipped) =
            WorkQueue::filtered(records, |r| !terminal.contains_key(&r.external_id));
        if mode.resume {
            log::info!(
                "Resuming: {skipped} records already terminal, {} remaining",
                queue.total()
            );
        }

        let mut summary = RunSummary {
            total: queue.total(),
            skipped,
            dry_run: mode.dry_run,
            ..Default::default()
        };

        if mode.dry_run {
            self.plan(&queue, &mut summary);
        } else if mode.resume && queue.total() == 0 {
            log::info!("Nothing to do, every record is already terminal");
        } else {
            self.execute_all(queue, &terminal, &orphans, mode, &ckpt_path, &mut summary)?;
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Checkpointed keys that still have an output row.
    ///
    /// An entry without a row (output lost or recreated after the entry
    /// was written) does not count as done; those keys come back as orphans.
    fn reconcile(&self, ckpt_path: &Path) -> anyhow::Result<(TerminalSet, FxHashSet<String>)> {
        let mut terminal = CheckpointStore::load(ckpt_path)
            .with_context(|| format!("Cannot read checkpoint {}", ckpt_path.display()))?;
        let rows = output_keys(&self.output)
            .with_context(|| format!("Cannot read output {}", self.output.display()))?;

        let mut orphans = FxHashSet::default();
        terminal.retain(|key, _| {
            let has_row = rows.contains(key);
            if !has_row {
                log::warn!("{key}: checkpointed but missing from output, reprocessing");
                orphans.insert(key.clone());
            }
            has_row
        });
        if !orphans.is_empty() {
            log::warn!(
                "{} checkpoint entries have no output row and will be redone",
                orphans.len()
            );
        }
        Ok((terminal, orphans))
    }

    /// Dry run: describe each planned request, touch nothing
    fn plan(&self, queue: &WorkQueue<InputRecord>, summary: &mut RunSummary) {
        log::info!("DRY-RUN: {} requests planned, nothing will be sent", queue.total());
        let bar = self.progress.records("planned", queue.total());
        let mut tally = Tally::default();
        while let Some(record) = queue.next() {
            log::info!(
                "[dry-run] {}: {}",
                record.external_id,
                self.executor.api().describe(&record.applicant_id)
            );
            tally.done += 1;
            tally.ok += 1;
            bar.update(tally);
        }
        bar.finish();
        summary.succeeded = tally.ok;
    }

    fn execute_all(
        &self,
        queue: WorkQueue<InputRecord>,
        terminal: &TerminalSet,
        orphans: &FxHashSet<String>,
        mode: RunMode,
        ckpt_path: &Path,
        summary: &mut RunSummary,
    ) -> anyhow::Result<()> {
        // Checkpoint before output: an entry must never outlive its row
        let mut checkpoint = CheckpointStore::open(ckpt_path, mode.resume)
            .with_context(|| format!("Cannot open checkpoint {}", ckpt_path.display()))?;
        if !orphans.is_empty() {
            checkpoint
                .retain(|key| !orphans.contains(key))
                .with_context(|| format!("Cannot rewrite checkpoint {}", ckpt_path.display()))?;
        }
        let sink = ResultSink::open(&self.output, mode.resume)
            .with_context(|| format!("Cannot open output {}", self.output.display()))?;

        for record in queue.items() {
            if sink.existing_keys().contains(&record.external_id)
                && !terminal.contains_key(&record.external_id)
            {
                log::warn!(
                    "{}: output row present without checkpoint entry, reprocessing",
                    record.external_id
                );
            }
        }

        let bar = self.progress.records("tokens", queue.total());
        let state = RunState {
            queue,
            journal: Mutex::new(Journal { sink, checkpoint }),
            tally: Mutex::new(Tally::default()),
            bar,
            stop: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            io_error: Mutex::new(None),
        };

        if self.workers == 1 {
            self.work(&state);
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .context("Failed to create thread pool")?;
            pool.scope(|s| {
                for _ in 0..self.workers {
                    s.spawn(|_| self.work(&state));
                }
            });
        }
        state.bar.finish();

        let tally = *state.tally.lock().expect("worker thread panicked");
        summary.succeeded = tally.ok;
        summary.failed = tally.failed;
        summary.not_attempted = summary.total - tally.done;
        summary.interrupted = state.interrupted.load(Ordering::Relaxed);
        summary.abort_reason = state
            .abort_reason
            .lock()
            .expect("worker thread panicked")
            .take();
        summary.aborted = summary.abort_reason.is_some();

        if let Some(e) = state.io_error.lock().expect("worker thread panicked").take() {
            return Err(anyhow::Error::new(e).context(format!(
                "Cannot persist results to {}",
                self.output.display()
            )));
        }
        if summary.interrupted {
            log::warn!(
                "Shutdown requested, {} records not attempted",
                summary.not_attempted
            );
        }
        Ok(())
    }

    /// Worker loop: claim, execute, journal, until the queue drains or the run stops
    fn work(&self, state: &RunState) {
        loop {
            if state.stop.load(Ordering::Relaxed) {
                break;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                state.interrupted.store(true, Ordering::Relaxed);
                break;
            }
            let Some(record) = state.queue.next() else {
                break;
            };

            let outcome = self.executor.execute(record);
            let (row, terminal) = match (OutputRow::new(record, &outcome), outcome.terminal()) {
                (Some(row), Some(terminal)) => (row, terminal),
                _ => {
                    state.stop.store(true, Ordering::Relaxed);
                    if let ProcessingOutcome::Aborted { reason } = outcome {
                        log::error!(
                            "{}: authentication rejected, stopping the run",
                            record.external_id
                        );
                        state
                            .abort_reason
                            .lock()
                            .expect("worker thread panicked")
                            .get_or_insert(reason);
                    }
                    break;
                }
            };

            let persisted = state
                .journal
                .lock()
                .expect("worker thread panicked")
                .record(&row, &terminal);
            if let Err(e) = persisted {
                log::error!("{}: failed to persist outcome: {e}", record.external_id);
                state.stop.store(true, Ordering::Relaxed);
                state
                    .io_error
                    .lock()
                    .expect("worker thread panicked")
                    .get_or_insert(e);
                break;
            }

            let tally = {
                let mut tally = state.tally.lock().expect("worker thread panicked");
                tally.done += 1;
                if outcome.is_success() {
                    tally.ok += 1;
                } else {
                    tally.failed += 1;
                }
                *tally
            };
            state.bar.update(tally);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ShareToken};
    use crate::testing::{ScriptedApi, fast_policy, http_err, token};
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator<A: TokenApi>(api: A, output: &Path) -> Orchestrator<A> {
        let limiter = Arc::new(RateLimiter::new(1000, Duration::from_secs(1)));
        let executor = RequestExecutor::new(api, limiter, fast_policy(3));
        // Never set, so these tests ignore the process-wide flag
        static NEVER: AtomicBool = AtomicBool::new(false);
        Orchestrator::new(executor, output).shutdown_on(&NEVER)
    }

    fn records(n: usize) -> Vec<InputRecord> {
        (1..=n)
            .map(|i| InputRecord::new(format!("a{i}"), format!("e{i}"), "levelKyc"))
            .collect()
    }

    /// Raises `flag` while issuing for `at`, as a signal arriving mid-request would
    struct InterruptAt {
        inner: ScriptedApi,
        at: &'static str,
        flag: &'static AtomicBool,
    }

    impl TokenApi for InterruptAt {
        fn issue(&self, applicant_id: &str) -> Result<ShareToken, ApiError> {
            if applicant_id == self.at {
                self.flag.store(true, Ordering::Relaxed);
            }
            self.inner.issue(applicant_id)
        }
    }

    fn row_keys(output: &Path) -> FxHashSet<String> {
        let rows: Vec<csv::StringRecord> = csv::Reader::from_path(output)
            .unwrap()
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(rows.iter().all(|r| r.len() == 6), "malformed row in {rows:?}");
        let keys: FxHashSet<String> = rows.iter().map(|r| r[1].to_string()).collect();
        assert_eq!(keys.len(), rows.len(), "duplicate rows in {rows:?}");
        keys
    }

    fn checkpoint_keys(output: &Path) -> FxHashSet<String> {
        CheckpointStore::load(&checkpoint_path(output))
            .unwrap()
            .into_keys()
            .collect()
    }

    fn keys(ids: &[&str]) -> FxHashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn data_rows(output: &Path) -> Vec<String> {
        std::fs::read_to_string(output)
            .unwrap()
            .lines()
            .skip(1)
            .map(String::from)
            .collect()
    }

    #[test]
    fn success_and_not_found() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let api = ScriptedApi::new()
            .respond("a1", vec![Ok(token("tok-a1"))])
            .respond("bad", vec![Err(http_err(404))]);
        let orch = orchestrator(api, &output);

        let input = vec![
            InputRecord::new("a1", "e1", "levelKyc"),
            InputRecord::new("bad", "e2", "levelKyc"),
        ];
        let summary = orch.run(input, RunMode::FRESH).unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.aborted);
        assert_eq!(
            data_rows(&output),
            vec![
                "a1,e1,levelKyc,tok-a1,client-1,".to_string(),
                "bad,e2,levelKyc,,,Applicant not found".to_string(),
            ]
        );
        let ckpt = CheckpointStore::load(&checkpoint_path(&output)).unwrap();
        assert_eq!(ckpt.get("e1"), Some(&TerminalOutcome::Success));
        assert!(matches!(
            ckpt.get("e2"),
            Some(TerminalOutcome::PermanentFailure { .. })
        ));
    }

    #[test]
    fn second_resume_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");

        let first = orchestrator(
            ScriptedApi::new().respond("a2", vec![Err(http_err(404))]),
            &output,
        );
        first.run(records(3), RunMode::FRESH).unwrap();

        let second = orchestrator(ScriptedApi::new(), &output);
        let summary = second.run(records(3), RunMode::RESUME).unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.skipped, 3);
        assert!(second.executor().api().calls().is_empty());
        assert_eq!(data_rows(&output).len(), 3);
    }

    #[test]
    fn resume_processes_only_remaining() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");

        orchestrator(ScriptedApi::new(), &output)
            .run(records(2), RunMode::FRESH)
            .unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(4), RunMode::RESUME).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(orch.executor().api().calls(), vec!["a3", "a4"]);

        let rows = data_rows(&output);
        assert_eq!(rows.len(), 4);
        for i in 1..=4 {
            assert_eq!(rows.iter().filter(|r| r.contains(&format!(",e{i},"))).count(), 1);
        }
    }

    #[test]
    fn fresh_run_ignores_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(ScriptedApi::new(), &output)
            .run(records(2), RunMode::FRESH)
            .unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(2), RunMode::FRESH).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(orch.executor().api().calls().len(), 2);
        assert_eq!(data_rows(&output).len(), 2);
        assert_eq!(CheckpointStore::load(&checkpoint_path(&output)).unwrap().len(), 2);
    }

    #[test]
    fn uncheckpointed_row_is_reprocessed() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(ScriptedApi::new(), &output)
            .run(records(1), RunMode::FRESH)
            .unwrap();
        // Crash between row write and checkpoint commit
        std::fs::write(checkpoint_path(&output), "").unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(1), RunMode::RESUME).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(orch.executor().api().calls_for("a1"), 1);
        assert_eq!(data_rows(&output).len(), 2);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let orch = orchestrator(ScriptedApi::new(), &output);

        let summary = orch.run(records(3), RunMode::DRY_RUN).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert!(orch.executor().api().calls().is_empty());
        assert!(!output.exists());
        assert!(!checkpoint_path(&output).exists());
    }

    #[test]
    fn fatal_stops_admission() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let api = ScriptedApi::new().respond("a3", vec![Err(http_err(401))]);
        let orch = orchestrator(api, &output);

        let summary = orch.run(records(5), RunMode::FRESH).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.abort_reason.as_deref(), Some("HTTP 401"));
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.not_attempted, 3);
        assert_eq!(orch.executor().api().calls(), vec!["a1", "a2", "a3"]);

        let rows = data_rows(&output);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("a1,e1,"));
        assert!(rows[1].starts_with("a2,e2,"));
        let ckpt = CheckpointStore::load(&checkpoint_path(&output)).unwrap();
        assert_eq!(ckpt.len(), 2);
        assert!(!ckpt.contains_key("e3"));
    }

    #[test]
    fn shutdown_before_start_processes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        static STOP: AtomicBool = AtomicBool::new(true);
        let orch = orchestrator(ScriptedApi::new(), &output).shutdown_on(&STOP);

        let summary = orch.run(records(3), RunMode::FRESH).unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.not_attempted, 3);
        assert!(orch.executor().api().calls().is_empty());
        assert!(data_rows(&output).is_empty());
    }

    #[test]
    fn shutdown_mid_run_finishes_in_flight_record() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        static STOP: AtomicBool = AtomicBool::new(false);
        let api = InterruptAt {
            inner: ScriptedApi::new(),
            at: "a3",
            flag: &STOP,
        };
        let orch = orchestrator(api, &output).shutdown_on(&STOP);

        let summary = orch.run(records(5), RunMode::FRESH).unwrap();
        assert!(summary.interrupted);
        assert!(!summary.aborted);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.not_attempted, 2);
        assert_eq!(orch.executor().api().inner.calls(), vec!["a1", "a2", "a3"]);

        assert_eq!(row_keys(&output), keys(&["e1", "e2", "e3"]));
        assert_eq!(checkpoint_keys(&output), keys(&["e1", "e2", "e3"]));
    }

    #[test]
    fn fatal_with_workers_journals_in_flight_records() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let api = ScriptedApi::new().respond("a5", vec![Err(http_err(401))]);
        let orch = orchestrator(api, &output).workers(4);

        let summary = orch.run(records(20), RunMode::FRESH).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.succeeded + summary.not_attempted, 20);

        // Every call other than the rejected one finished and was journaled
        let rows = row_keys(&output);
        let calls = orch.executor().api().calls();
        assert_eq!(calls.len(), rows.len() + 1);
        assert_eq!(rows.len(), summary.succeeded);
        assert!(!rows.contains("e5"));
        assert_eq!(checkpoint_keys(&output), rows);
    }

    #[test]
    fn resume_replaces_torn_row() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(ScriptedApi::new(), &output)
            .run(records(1), RunMode::FRESH)
            .unwrap();
        // Crash while writing the second row
        let mut content = std::fs::read_to_string(&output).unwrap();
        content.push_str("a2,e2,lev");
        std::fs::write(&output, content).unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(2), RunMode::RESUME).unwrap();
        assert_eq!((summary.total, summary.skipped), (1, 1));
        assert_eq!(row_keys(&output), keys(&["e1", "e2"]));
        assert_eq!(checkpoint_keys(&output), keys(&["e1", "e2"]));
    }

    #[test]
    fn resume_redoes_checkpointed_records_without_rows() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(
            ScriptedApi::new().respond("a2", vec![Err(http_err(404))]),
            &output,
        )
        .run(records(3), RunMode::FRESH)
        .unwrap();
        // Output recreated (header only) while the checkpoint survived
        let header = std::fs::read_to_string(&output).unwrap();
        let header = header.lines().next().unwrap().to_string();
        std::fs::write(&output, format!("{header}\n")).unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(3), RunMode::RESUME).unwrap();
        assert_eq!((summary.total, summary.skipped), (3, 0));
        assert_eq!(summary.succeeded, 3);
        assert_eq!(orch.executor().api().calls(), vec!["a1", "a2", "a3"]);

        let expected = keys(&["e1", "e2", "e3"]);
        assert_eq!(row_keys(&output), expected);
        assert_eq!(checkpoint_keys(&output), expected);
        // The redone outcome replaces the stale entry
        let ckpt = CheckpointStore::load(&checkpoint_path(&output)).unwrap();
        assert_eq!(ckpt["e2"], TerminalOutcome::Success);
    }

    #[test]
    fn resume_with_missing_output_redoes_everything() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(ScriptedApi::new(), &output)
            .run(records(2), RunMode::FRESH)
            .unwrap();
        std::fs::remove_file(&output).unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        let summary = orch.run(records(2), RunMode::RESUME).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(row_keys(&output), keys(&["e1", "e2"]));
        assert_eq!(checkpoint_keys(&output), keys(&["e1", "e2"]));
    }

    #[test]
    fn fresh_run_keeps_output_when_checkpoint_cannot_open() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        orchestrator(ScriptedApi::new(), &output)
            .run(records(2), RunMode::FRESH)
            .unwrap();
        let before = std::fs::read_to_string(&output).unwrap();
        let ckpt = checkpoint_path(&output);
        std::fs::remove_file(&ckpt).unwrap();
        std::fs::create_dir(&ckpt).unwrap();

        let orch = orchestrator(ScriptedApi::new(), &output);
        assert!(orch.run(records(2), RunMode::FRESH).is_err());
        assert!(orch.executor().api().calls().is_empty());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), before);
    }

    #[test]
    fn exhausted_retries_fill_error_column() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let orch = orchestrator(ScriptedApi::new().fallback(Err(http_err(503))), &output);

        let summary = orch.run(records(1), RunMode::FRESH).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(orch.executor().api().calls_for("a1"), 3);
        let rows = data_rows(&output);
        assert!(rows[0].starts_with("a1,e1,levelKyc,,,"), "{}", rows[0]);
        assert!(rows[0].contains("gave up after 3 attempts"));
    }

    #[test]
    fn workers_process_each_record_once() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let orch = orchestrator(ScriptedApi::new(), &output).workers(4);

        let summary = orch.run(records(40), RunMode::FRESH).unwrap();
        assert_eq!(summary.succeeded, 40);

        let mut calls = orch.executor().api().calls();
        calls.sort();
        calls.dedup();
        assert_eq!(calls.len(), 40);
        assert_eq!(orch.executor().api().calls().len(), 40);

        let rows = data_rows(&output);
        assert_eq!(rows.len(), 40);
        assert_eq!(CheckpointStore::load(&checkpoint_path(&output)).unwrap().len(), 40);
    }

    #[test]
    fn empty_input() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let summary = orchestrator(ScriptedApi::new(), &output)
            .run(Vec::new(), RunMode::FRESH)
            .unwrap();
        assert_eq!(summary, RunSummary { elapsed: summary.elapsed, ..Default::default() });
        assert!(data_rows(&output).is_empty());
    }
}
