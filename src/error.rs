//! Error taxonomy for the scan pipeline

use thiserror::Error;

/// Errors raised by the metric pipeline.
///
/// Severity is decided by the caller: metric loops treat soft-skip variants
/// as per-channel no-ops, semantic-precondition variants as fatal to the
/// current channel or pair, and everything else as fatal to the metric.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("model file {path}: line {line}: expected 2 fields, got {fields}")]
    MalformedModel {
        path: String,
        line: usize,
        fields: usize,
    },

    #[error("bad channel id '{0}': expected \"LOC,CODE\"")]
    BadChannelId(String),

    #[error("argument '{0}' is not recognized")]
    UnknownArgument(String),

    #[error("sample rate mismatch: {x} Hz vs {y} Hz")]
    SampleRateMismatch { x: f64, y: f64 },

    #[error("invalid response for channel {0}")]
    InvalidResponse(String),

    #[error("frequency response requested for polynomial channel {0}")]
    UnsupportedForPolynomial(String),

    #[error("unknown pole-zero transfer type '{0}'")]
    UnknownStageType(char),

    #[error("stage 1 input units are unknown, cannot convert response")]
    UnknownUnits,

    #[error("zero response magnitude at frequency bin {0}")]
    ZeroResponse(usize),

    #[error("band [{low} - {high}] s contains no periods to average")]
    EmptyBand { low: f64, high: f64 },

    #[error("no waveform data for {0}")]
    MissingData(String),

    #[error("no metadata for channel {0}")]
    MissingMetadata(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Missing inputs are logged and skipped without failing the channel.
    pub fn is_soft_skip(&self) -> bool {
        matches!(self, Self::MissingData(_) | Self::MissingMetadata(_))
    }
}
