//! Capability interface of the indexing tools, independent of where they run.
use crate::error::IndexerError;
use crate::indexer::pipeline;
use crate::indexer::pipeline::ProcessOptions;
use crate::indexer::pipeline::ProcessOutput;
use tracing::debug;

/// Environment variable naming the provider
pub const PROVIDER_ENV: &str = "SHEET_INDEXER_PROVIDER";

/// The operations a caller may invoke on a workbook
pub trait ExcelToolsProvider: Send + Sync {
    /// Sheet names in workbook order
    fn analyze(&self, bytes: &[u8]) -> Result<Vec<String>, IndexerError>;

    /// Runs the configured pipeline and returns the processed workbook
    fn process(&self, bytes: &[u8], options: &ProcessOptions) -> Result<ProcessOutput, IndexerError>;

    /// Whether the provider can take work
    fn check_health(&self) -> bool;
}

/// Runs the tools in the calling process
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalProvider;

impl ExcelToolsProvider for LocalProvider {
    fn analyze(&self, bytes: &[u8]) -> Result<Vec<String>, IndexerError> {
        pipeline::analyze(bytes)
    }

    fn process(&self, bytes: &[u8], options: &ProcessOptions) -> Result<ProcessOutput, IndexerError> {
        pipeline::process(bytes, options)
    }

    fn check_health(&self) -> bool {
        true
    }
}

/// Creates a provider by name. `local` is the only one available.
pub fn provider_by_name(name: &str) -> Result<Box<dyn ExcelToolsProvider>, IndexerError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "local" => Ok(Box::new(LocalProvider)),
        other => Err(IndexerError::UnsupportedProvider(other.to_owned())),
    }
}

/// Creates the provider named by `SHEET_INDEXER_PROVIDER`, the local one when
/// the variable is not set
pub fn provider_from_env() -> Result<Box<dyn ExcelToolsProvider>, IndexerError> {
    let name = std::env::var(PROVIDER_ENV).unwrap_or_default();
    debug!(provider = %name, "selecting provider");
    provider_by_name(&name)
}
