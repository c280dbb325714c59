//! Run monitoring
//!
//! Safety and quality instruments that observe the collection without
//! driving it: the structural circuit breaker, the volume estimator with its
//! stop strategy, failed-request evidence and run health metrics.

mod evidence;
mod health;
mod structural;
mod volume;

pub use evidence::{redact_headers, EvidenceRecorder, FailedRequest};
pub use health::{grade_volume, health_score, HealthInputs, VolumeGrade, REVIEW_FLAG};
pub use structural::{FailureContext, FailureKind, StructuralBreaker};
pub use volume::{FixedTargetStrategy, VolumeDecision, VolumeEstimator, VolumeStrategy};
