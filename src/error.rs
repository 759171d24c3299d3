//! Error taxonomy for the montage search.
//!
//! Configuration and resource errors (`MissingElectrode`, `ShapeMismatch`,
//! `CorruptArtifact`, pool/current validation) are fatal and surface before
//! the search loop starts.  `EmptyRoi` and `DegenerateRegion` are
//! per-combination scoring errors: the orchestrator catches them, records the
//! offending montage, and keeps going.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The leadfield artifact disagrees with itself (tensor shapes, electrode
    /// count vs. row count, non-finite volumes).
    #[error("corrupt leadfield artifact: {0}")]
    CorruptArtifact(String),

    /// An electrode name was requested that the leadfield does not contain.
    #[error("electrode '{0}' not present in leadfield")]
    MissingElectrode(String),

    /// Two arrays that must share the node indexing do not.
    #[error("shape mismatch: expected {expected} nodes, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// A candidate pool is empty or contains a repeated electrode.
    #[error("invalid candidate pool '{slot}': {reason}")]
    InvalidPool { slot: &'static str, reason: String },

    /// total_current / channel_limit / current_step do not describe a valid
    /// ratio set.
    #[error("invalid current parameters: {0}")]
    InvalidCurrents(String),

    /// The ROI mask selects no node with positive weight.
    #[error("ROI mask has no overlap with the field domain")]
    EmptyRoi,

    /// A statistics denominator (reference-region weighted mean) is zero.
    #[error("degenerate reference region: weighted mean is zero")]
    DegenerateRegion,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact header error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// True for errors that invalidate one scored combination but not the
    /// whole search run.
    pub fn is_per_combination(&self) -> bool {
        matches!(self, SearchError::EmptyRoi | SearchError::DegenerateRegion)
    }
}
