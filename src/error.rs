//! Error types for the facility network pipeline.
//!
//! Data-quality problems (blank fields, unmatched licenses, colliding
//! license numbers) are reported as data, never as errors. These variants
//! cover callers breaking the input contract.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("Facility at position {index} has an empty id")]
    EmptyFacilityId {
        index: usize,
    },

    #[error("Facility id '{id}' appears more than once")]
    DuplicateFacilityId {
        id: String,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
