//! Shared data model: failures, root causes, and the durable history.

pub mod failure;
pub mod history;
pub mod root_cause;

pub use failure::{Failure, FailureKind};
pub use history::{FailureStatus, HistoryData, TrackedFailure};
pub use root_cause::{
    AnalysisMetadata, Confidence, FailureDetails, FailureReason, GroupingStrategy, RootCause,
    UpstreamChange,
};
