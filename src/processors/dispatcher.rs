use crate::models::FitResult;
use crate::processors::site_year_processor::SiteYearProcessor;
use crate::utils::constants::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL_MS};
use crate::utils::progress::ProgressReporter;
use crossbeam::channel::{bounded, Receiver};
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

/// Work a dispatcher runs for each site-year file.
pub trait SiteYearTask: Sync {
    fn process(&self, path: &Path) -> FitResult;

    /// Bad row recorded when processing `path` did not complete
    fn failed(&self, path: &Path, reason: &str) -> FitResult;
}

impl SiteYearTask for SiteYearProcessor {
    fn process(&self, path: &Path) -> FitResult {
        self.process_file(path)
    }

    fn failed(&self, path: &Path, reason: &str) -> FitResult {
        self.bad_row_for_path(path, reason)
    }
}

/// A worker's completed partial table
struct WorkerReport {
    worker: usize,
    rows: Vec<FitResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub files: usize,
    pub rows: usize,
    pub good: usize,
    pub bad: usize,
    pub workers: usize,
    /// Rows written for files whose worker died before reporting
    pub backfilled: usize,
    pub panicked: usize,
    pub elapsed_seconds: f64,
}

impl DispatchSummary {
    /// Every input file produced exactly one row
    pub fn is_balanced(&self) -> bool {
        self.rows == self.files && self.good + self.bad == self.rows
    }
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub rows: Vec<FitResult>,
    pub summary: DispatchSummary,
}

/// Split `items` into `workers` contiguous chunks of equal size; the last
/// chunk takes the remainder. Never returns empty chunks.
pub fn partition<T>(items: &[T], workers: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());
    let chunk_size = items.len() / workers;

    (0..workers)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == workers - 1 {
                items.len()
            } else {
                start + chunk_size
            };
            &items[start..end]
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs site-year tasks on a fixed pool of share-nothing worker threads.
/// Each worker processes its chunk sequentially and reports one partial
/// table over a bounded channel that the dispatcher drains continuously.
pub struct ParallelDispatcher {
    workers: usize,
    channel_capacity: usize,
    poll_interval: Duration,
}

impl ParallelDispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every file and return one row per file.
    ///
    /// Built on scoped threads rather than a rayon pool: results flow through
    /// a bounded channel that is drained while workers run, and each worker's
    /// `JoinHandle::is_finished` is polled between receives so a dead worker's
    /// chunk can be backfilled. A parallel iterator exposes neither the
    /// channel nor per-worker liveness.
    pub fn run<T: SiteYearTask>(
        &self,
        files: &[PathBuf],
        task: &T,
        progress: &ProgressReporter,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let chunks = partition(files, self.workers);
        info!(
            files = files.len(),
            workers = chunks.len(),
            "Dispatching site-years"
        );

        let (tx, rx) = bounded::<WorkerReport>(self.channel_capacity);
        let mut panicked = 0;

        let (reports, crashed) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(chunks.len());
            for (worker, chunk) in chunks.iter().copied().enumerate() {
                let tx = tx.clone();
                handles.push(scope.spawn(move || {
                    let span = info_span!("worker", id = worker);
                    let _enter = span.enter();
                    debug!(files = chunk.len(), "Worker started");

                    let mut rows = Vec::with_capacity(chunk.len());
                    let mut panics = 0;
                    for path in chunk {
                        let row = match panic::catch_unwind(AssertUnwindSafe(|| task.process(path)))
                        {
                            Ok(row) => row,
                            Err(payload) => {
                                panics += 1;
                                let message = panic_message(payload.as_ref());
                                error!(path = %path.display(), "Site-year panicked: {}", message);
                                task.failed(path, &format!("panic: {}", message))
                            }
                        };
                        rows.push(row);
                        progress.increment(1);
                    }

                    if tx.send(WorkerReport { worker, rows }).is_err() {
                        warn!("Result channel closed before worker could report");
                    }
                    panics
                }));
            }
            drop(tx);

            let reports = self.drain(&rx, &handles);

            let mut crashed = Vec::new();
            for (worker, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(panics) => panicked += panics,
                    Err(payload) => {
                        error!(worker, "Worker crashed: {}", panic_message(payload.as_ref()));
                        crashed.push(worker);
                    }
                }
            }
            (reports, crashed)
        });

        let reported: HashSet<usize> = reports.iter().map(|r| r.worker).collect();
        let mut rows: Vec<FitResult> = reports.into_iter().flat_map(|r| r.rows).collect();

        // best-effort supervision: a worker that died without reporting
        // still accounts for every file of its chunk
        let mut backfilled = 0;
        for (worker, chunk) in chunks.iter().enumerate() {
            if reported.contains(&worker) {
                continue;
            }
            warn!(worker, files = chunk.len(), "Backfilling bad rows for unreported chunk");
            let reason = format!("worker {} crashed before reporting", worker);
            for path in chunk.iter() {
                rows.push(task.failed(path, &reason));
                backfilled += 1;
            }
        }
        if !crashed.is_empty() {
            warn!(?crashed, "Workers crashed during dispatch");
        }

        let good = rows.iter().filter(|r| r.is_good()).count();
        let summary = DispatchSummary {
            files: files.len(),
            rows: rows.len(),
            good,
            bad: rows.len() - good,
            workers: chunks.len(),
            backfilled,
            panicked,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        if !summary.is_balanced() {
            error!(
                files = summary.files,
                rows = summary.rows,
                "Row count does not match input file count"
            );
        }
        info!(
            good = summary.good,
            bad = summary.bad,
            elapsed = summary.elapsed_seconds,
            "Dispatch complete"
        );

        DispatchOutcome { rows, summary }
    }

    /// Collect reports while any worker is alive, then whatever is left.
    fn drain(
        &self,
        rx: &Receiver<WorkerReport>,
        handles: &[thread::ScopedJoinHandle<'_, usize>],
    ) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(handles.len());
        loop {
            let running = handles.iter().any(|h| !h.is_finished());
            while let Ok(report) = rx.try_recv() {
                reports.push(report);
            }
            if !running {
                break;
            }
            if let Ok(report) = rx.recv_timeout(self.poll_interval) {
                reports.push(report);
            }
        }
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        reports
    }
}
