//! Multi-threaded driver for parameter sweeps.
//!
//! A sweep file expands into independent runs. Each run gets its own
//! UI-description file and its own copy of the store, so runs never share a
//! store handle. Runs execute on a rayon pool; failures are collected rather
//! than stopping the sweep.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;

use geoinv_options::sweep::{expand, write_runs, ExpandedRun};
use geoinv_options::{FieldValue, SweepFile, UiJson};

use crate::driver::{store_path, DriverError, InversionDriver, RunOutcome};
use crate::engine::InversionEngine;
use crate::store::StoreOpener;

// ============================================================================
// Job Errors
// ============================================================================

/// Error of a single sweep run.
#[derive(Debug)]
pub struct JobError {
    /// Run index (matches ExpandedRun.index)
    pub index: usize,

    pub name: String,

    pub message: String,
}

// ============================================================================
// Pre-Run Report
// ============================================================================

/// Formatted pre-run report for display.
#[derive(Debug, Clone)]
pub struct PreRunReport {
    lines: Vec<String>,
}

impl PreRunReport {
    pub fn build(file: &SweepFile, runs: &[ExpandedRun], threads: usize) -> Self {
        let mut lines = Vec::new();

        lines.push(String::from("╭─────────────────────────────────────────────────╮"));
        lines.push(String::from("│            Geophysical Inversion Sweep          │"));
        lines.push(String::from("╰─────────────────────────────────────────────────╯"));
        lines.push(String::new());

        lines.push(format!("  Runs: {}  │  Threads: {}", runs.len(), threads));
        lines.push(String::new());
        lines.push(format!("  Base: {}", file.sweep.base.display()));

        if let Some(first) = runs.first() {
            let mut fixed = Vec::new();
            if let Some(kind) = first.ui.inversion_type() {
                fixed.push(format!("inversion_type={}", kind));
            }
            fixed.push(format!("forward_only={}", first.ui.forward_only()));
            lines.push(format!("  Fixed: {}", fixed.join(", ")));
        }

        let swept: Vec<String> = file
            .sweep
            .ranges
            .iter()
            .filter_map(|range| {
                let values = range.values().ok()?;
                let first = values.first()?;
                let last = values.last()?;
                Some(format!("{}: {}→{} ({})", range.field, first, last, values.len()))
            })
            .collect();
        if !swept.is_empty() {
            lines.push(format!("  Swept: {}", swept.join(", ")));
        }

        lines.push(format!("  Output: {}", file.sweep.output_dir.display()));
        lines.push(String::new());

        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        for line in &self.lines {
            println!("{}", line);
        }
        let _ = io::stdout().flush();
    }
}

// ============================================================================
// Sweep Driver
// ============================================================================

pub struct SweepDriver {
    file: SweepFile,
    runs: Vec<ExpandedRun>,
    /// Store of the base file; every run works on a copy.
    source_store: Option<PathBuf>,
    threads: usize,
}

impl SweepDriver {
    /// Expand `file`. Thread count: `requested`, then the file's `threads`,
    /// then the number of physical cores.
    pub fn new(file: SweepFile, requested_threads: Option<usize>) -> Result<Self, DriverError> {
        let base = UiJson::from_file(&file.sweep.base)?;
        let base_dir = file.sweep.base.parent().unwrap_or_else(|| Path::new("."));
        let source_store = store_path(&base, base_dir).ok();
        if source_store.is_none() {
            warn!("{} names no geoh5 store", file.sweep.base.display());
        }

        let mut runs = expand(&base, &file.stem(), &file.sweep.ranges)?;
        for run in &mut runs {
            run.ui.set_value("generate_sweep", FieldValue::Bool(false));
            if let Some(store) = &source_store {
                let copy = run_store_name(store, &run.name);
                run.ui.set_value("geoh5", FieldValue::Text(copy));
            }
        }

        let threads = requested_threads
            .or(file.sweep.threads)
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus::get_physical);

        Ok(Self {
            file,
            runs,
            source_store,
            threads,
        })
    }

    pub fn from_file(path: &Path, requested_threads: Option<usize>) -> Result<Self, DriverError> {
        Self::new(SweepFile::from_file(path)?, requested_threads)
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn runs(&self) -> &[ExpandedRun] {
        &self.runs
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn output_dir(&self) -> &Path {
        &self.file.sweep.output_dir
    }

    /// Write the run files and `lookup.json`, and give each run its own
    /// copy of the store.
    pub fn prepare<O: StoreOpener>(&self, opener: &O) -> Result<Vec<PathBuf>, DriverError> {
        let dir = self.output_dir();
        std::fs::create_dir_all(dir)?;
        if let Some(source) = &self.source_store {
            for run in &self.runs {
                let dest = dir.join(run_store_name(source, &run.name));
                opener.fork(source, &dest)?;
            }
            debug!("forked {} into {} run store(s)", source.display(), self.runs.len());
        }
        Ok(write_runs(&self.runs, dir)?)
    }

    /// Count and describe the runs without writing or executing anything.
    pub fn dry_run(&self) -> DryRunStats {
        let param_counts = self
            .file
            .sweep
            .ranges
            .iter()
            .map(|range| {
                let count = range.values().map(|v| v.len()).unwrap_or(0);
                (range.field.clone(), count)
            })
            .collect();

        DryRunStats {
            total_runs: self.runs.len(),
            threads: self.threads,
            param_counts,
            report: PreRunReport::build(&self.file, &self.runs, self.threads),
        }
    }

    /// Prepare and execute every run through `driver`.
    pub fn run<E, S>(&self, driver: &InversionDriver<E, S>) -> Result<DriverStats, DriverError>
    where
        E: InversionEngine,
        S: StoreOpener,
    {
        if self.runs.is_empty() {
            warn!("no runs to execute (sweep ranges resulted in zero configurations)");
            return Ok(DriverStats::default());
        }

        PreRunReport::build(&self.file, &self.runs, self.threads).print();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| DriverError::ThreadPoolError(e.to_string()))?;

        let paths = self.prepare(driver.opener())?;

        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let pb = ProgressBar::new(self.runs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .map_err(|e| DriverError::ConfigError(e.to_string()))?
                .progress_chars("█▓░"),
        );

        let start_time = Instant::now();

        pool.install(|| {
            self.runs
                .par_iter()
                .zip(paths.par_iter())
                .for_each(|(run, path)| {
                    match execute_run(driver, run, path) {
                        Ok(_) => {
                            completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            errors.lock().push(e);
                        }
                    }
                    pb.inc(1);
                });
        });

        pb.finish_and_clear();

        let total_time = start_time.elapsed();
        let completed_count = completed.load(Ordering::Relaxed);
        let failed_count = failed.load(Ordering::Relaxed);

        println!();
        if failed_count == 0 {
            println!(
                "✓ {} runs completed in {:.2}s",
                completed_count,
                total_time.as_secs_f64()
            );
        } else {
            println!(
                "⚠ {}/{} runs completed, {} failed in {:.2}s",
                completed_count,
                self.runs.len(),
                failed_count,
                total_time.as_secs_f64()
            );
        }

        let mut errors = Arc::try_unwrap(errors).unwrap_or_default().into_inner();
        errors.sort_by_key(|e: &JobError| e.index);
        if failed_count > 0 {
            for err in errors.iter().take(5) {
                error!("run {} failed: {}", err.name, err.message);
            }
            if errors.len() > 5 {
                error!("... and {} more errors", errors.len() - 5);
            }
        }

        Ok(DriverStats {
            total_runs: self.runs.len(),
            completed: completed_count,
            failed: failed_count,
            total_time,
            errors,
        })
    }
}

/// File name of a run's store copy: `<run>.<ext of the source>`.
fn run_store_name(source: &Path, run: &str) -> String {
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("geoh5"));
    format!("{}.{}", run, ext)
}

fn execute_run<E, S>(
    driver: &InversionDriver<E, S>,
    run: &ExpandedRun,
    path: &Path,
) -> Result<RunOutcome, JobError>
where
    E: InversionEngine,
    S: StoreOpener,
{
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| driver.run_file(path)));

    let message = match result {
        Ok(Ok(outcome)) => {
            info!("run {} done", run.name);
            return Ok(outcome);
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => {
            if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        }
    };

    Err(JobError {
        index: run.index,
        name: run.name.clone(),
        message,
    })
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics from sweep execution.
#[derive(Debug, Default)]
pub struct DriverStats {
    /// Total number of runs
    pub total_runs: usize,

    /// Number of successfully completed runs
    pub completed: usize,

    /// Number of failed runs
    pub failed: usize,

    /// Total execution time
    pub total_time: Duration,

    /// Errors encountered, in run order
    pub errors: Vec<JobError>,
}

/// Statistics from a dry run.
#[derive(Debug)]
pub struct DryRunStats {
    /// Total number of runs that would be executed
    pub total_runs: usize,

    pub threads: usize,

    /// Count of values for each swept field, in declaration order
    pub param_counts: Vec<(String, usize)>,

    pub report: PreRunReport,
}

impl DryRunStats {
    /// Print a rich report for dry run.
    pub fn print_report(&self) {
        self.report.print();

        println!("  [DRY RUN - no runs will be executed]");
        println!();

        if !self.param_counts.is_empty() {
            println!("Parameter sweep details:");
            for (param, count) in &self.param_counts {
                println!("  {}: {} values", param, count);
            }
        }
    }
}

impl std::fmt::Display for DryRunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dry Run Statistics")?;
        writeln!(f, "==================")?;
        writeln!(f, "Total runs: {}", self.total_runs)?;
        writeln!(f, "Threads: {}", self.threads)?;
        writeln!(f, "\nSwept parameters:")?;
        for (param, count) in &self.param_counts {
            writeln!(f, "  {}: {} values", param, count)?;
        }
        Ok(())
    }
}
