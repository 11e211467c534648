use thiserror::Error;

/// Errors raised while reading or writing the xlsx container.
/// Aggregates errors from the standard library, the zip and XML dependencies,
/// and the internal helper modules.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing package part '{0}'")]
    MissingPart(String),
}

/// Main error type of the indexer.
///
/// Structural failures (`InvalidPosition`, `MissingColumn`, `MissingSheet` and
/// the container errors) abort the run for a workbook and produce no output.
/// Per-row anomalies are never errors, see [`crate::indexer::Diagnostic`].
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Column position {position} is outside 1..={upper}")]
    InvalidPosition { position: u32, upper: u32 },

    #[error("Column '{column}' not found in sheet '{sheet}'")]
    MissingColumn { sheet: String, column: String },

    #[error("Sheet '{0}' not found")]
    MissingSheet(String),

    #[error("Read spreadsheet failed: {0}")]
    ContainerReadError(#[source] ContainerError),

    #[error("Write spreadsheet failed: {0}")]
    ContainerWriteError(#[source] ContainerError),

    #[error("Invalid column reference '{0}'")]
    InvalidColumnRef(String),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Unknown column role '{0}' in header mapping")]
    UnknownRole(String),

    #[error("Unsupported provider '{0}'")]
    UnsupportedProvider(String),

    #[error("Cancelled before '{0}' was started")]
    Cancelled(String),
}

impl IndexerError {
    /// Whether this error aborts the pipeline for a workbook.
    /// Every variant does, except cancellation which merely skips it.
    pub fn is_structural(&self) -> bool {
        !matches!(self, IndexerError::Cancelled(_))
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, ContainerError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| ContainerError::WithContextError(format!("{}: {}", message, e)))
    }
}

/// Converts container errors into the read or write side of the taxonomy.
pub(crate) trait ContainerResult<T> {
    fn on_read(self) -> Result<T, IndexerError>;

    fn on_write(self) -> Result<T, IndexerError>;
}

impl<T> ContainerResult<T> for Result<T, ContainerError> {
    fn on_read(self) -> Result<T, IndexerError> {
        self.map_err(IndexerError::ContainerReadError)
    }

    fn on_write(self) -> Result<T, IndexerError> {
        self.map_err(IndexerError::ContainerWriteError)
    }
}
