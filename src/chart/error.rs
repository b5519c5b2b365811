use std::path::PathBuf;
use thiserror::Error;

/// Structural chart failures.
///
/// Recoverable data defects (malformed tokens, unknown channels, dangling
/// long notes, resolution overflow) never reach this type: the compiler
/// logs them and substitutes a safe value. Only failures that leave no
/// usable timeline are surfaced.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to read chart file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse structured chart: {0}")]
    StructuredParse(#[from] serde_json::Error),

    #[error("chart contains no usable timeline: {0}")]
    EmptyChart(String),

    #[error("unsupported chart format: {extension}")]
    UnsupportedFormat { extension: String },
}
