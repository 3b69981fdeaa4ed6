//! # HiZ Error Types
//!
//! All errors that can occur while allocating, building or binding a pyramid.

use thiserror::Error;

use crate::geometry::Extent;
use crate::sync::SlotIndex;

/// Errors that can occur in the depth pyramid system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HizError {
    /// The device could not allocate a pyramid texture or counter buffer.
    ///
    /// Fatal to the pyramid. Never retried here.
    #[error("failed to allocate {resource}: {reason}")]
    ResourceAllocation {
        /// What was being allocated.
        resource: &'static str,
        /// Backend-provided reason.
        reason: String,
    },

    /// An operation was called out of order (programming error).
    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    /// A pyramid slot was read before any build wrote it.
    #[error("content of {slot} pyramid is undefined: no build has written it yet")]
    UndefinedContent {
        /// The slot that was read.
        slot: SlotIndex,
    },

    /// The bound source does not match the synced pyramid geometry.
    #[error("source extent {actual} does not match synced extent {expected}")]
    SourceMismatch {
        /// Extent the pyramid was synced for.
        expected: Extent,
        /// Extent of the bound source.
        actual: Extent,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pyramid operations.
pub type HizResult<T> = Result<T, HizError>;
