//! Parallel processing of independent workbooks.
use crate::error::ContainerError;
use crate::error::ContainerResult;
use crate::error::IndexerError;
use crate::indexer::pipeline::ProcessOptions;
use crate::indexer::pipeline::ProcessReport;
use crate::indexer::provider::ExcelToolsProvider;
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use tracing::warn;

/// Shared flag that stops jobs from starting. A job already running always
/// finishes.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One workbook to process
#[derive(Clone, Debug, PartialEq)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Result of one job
#[derive(Debug)]
pub struct BatchOutcome {
    pub job: BatchJob,
    pub result: Result<ProcessReport, IndexerError>,
}

/// Processes every job in parallel, each on its own workbook.
///
/// The codebook of a matching run is loaded once and shared by all jobs.
/// Outcomes come back in job order.
///
/// # Errors
/// Only a codebook that cannot be loaded fails the batch as a whole.
pub fn run_batch(
    jobs: &[BatchJob],
    provider: &dyn ExcelToolsProvider,
    options: &ProcessOptions,
    cancel: &CancellationToken,
) -> Result<Vec<BatchOutcome>, IndexerError> {
    let options = options.clone().with_loaded_codebook()?;
    info!(jobs = jobs.len(), "batch started");
    let outcomes = jobs
        .par_iter()
        .map(|job| BatchOutcome {
            job: job.clone(),
            result: run_job(job, provider, &options, cancel),
        })
        .collect::<Vec<_>>();
    let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
    info!(jobs = jobs.len(), failed, "batch finished");
    Ok(outcomes)
}

fn run_job(
    job: &BatchJob,
    provider: &dyn ExcelToolsProvider,
    options: &ProcessOptions,
    cancel: &CancellationToken,
) -> Result<ProcessReport, IndexerError> {
    let name = job.input.display().to_string();
    if cancel.is_cancelled() {
        return Err(IndexerError::Cancelled(name));
    }
    let bytes = fs::read(&job.input).map_err(ContainerError::from).on_read()?;
    let output = provider.process(&bytes, options).inspect_err(|error| {
        warn!(input = %name, error = %error, "job failed");
    })?;
    fs::write(&job.output, &output.bytes).map_err(ContainerError::from).on_write()?;
    info!(input = %name, output = %job.output.display(), "job finished");
    Ok(output.report)
}
