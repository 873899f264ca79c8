use thiserror::Error;

/// Failure taxonomy for the enrichment pipeline.
///
/// `Validation`, `State` and `Parse` propagate to the caller as a failed
/// stage invocation. `Synthesis` is recovered inside swatch assembly by
/// skipping the malformed fragment; it never aborts an export.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("no prior stage output: run {expected} first")]
    State { expected: &'static str },

    #[error("cannot read sheet \"{sheet}\" at row offset {offset}: {reason}")]
    Parse {
        sheet: String,
        offset: usize,
        reason: String,
    },

    #[error("swatch synthesis failed for attribute \"{attribute}\": {reason}")]
    Synthesis { attribute: String, reason: String },

    #[error("failed to render delimited output: {0}")]
    Render(#[from] csv::Error),
}

impl PipelineError {
    pub(crate) fn parse(sheet: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        PipelineError::Parse {
            sheet: sheet.into(),
            offset,
            reason: reason.into(),
        }
    }
}
