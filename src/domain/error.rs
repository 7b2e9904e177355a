//! Domain error types

use thiserror::Error;

/// Errors that can occur during spectral analysis
///
/// Tracking-loop divergence is never reported here — the tracker recovers
/// on its own by demoting its acquisition state.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transform plan unavailable for length {0}")]
    AllocationFailed(usize),

    #[error("No significant harmonic found")]
    NoSignificantFound,

    #[error("Spectrum calculation failed: {0}")]
    SpectrumCalculationFailed(String),
}

/// Result type alias for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
