use thiserror::Error;

/// Structural failures that abort a batch. Per-row resolution misses are not
/// errors; see `resolver::ResolutionResult`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("threshold {name} must be within 0..=100 (got {value})")]
    InvalidThreshold { name: &'static str, value: u32 },

    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
}
