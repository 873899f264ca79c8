//! The stateful enrichment stages of the migration pipeline.
//!
//! [`identity`] discovers product identity and variant structure from the
//! first upload; the [`enrich`] family overlays later uploads onto the
//! accumulated record set. Stages are pure functions over the current
//! record set; the caller swaps session state only on success.

pub mod enrich;
pub mod identity;

use crate::error::PipelineError;
use crate::record::ProductRecord;

/// Enforces stage ordering: every enrichment stage requires a record set
/// produced by identity discovery.
pub(crate) fn require_prior_stage(records: &[ProductRecord]) -> Result<(), PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::State {
            expected: "identity discovery",
        });
    }
    Ok(())
}
