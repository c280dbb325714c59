//! Run quality metrics written on finalization

/// Score below which a run is flagged for technical review
pub const REVIEW_THRESHOLD: u32 = 70;

pub const REVIEW_FLAG: &str = "technical_review_needed";

/// Volume tier reached by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeGrade {
    /// Target met
    A,
    /// Minimum acceptable volume met
    B,
    /// Below minimum
    C,
}

impl VolumeGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            Self::A => "target_met",
            Self::B => "minimum_met",
            Self::C => "below_minimum",
        }
    }
}

pub fn grade_volume(total_comments: u64, target: u64, minimum: u64) -> VolumeGrade {
    if total_comments >= target {
        VolumeGrade::A
    } else if total_comments >= minimum {
        VolumeGrade::B
    } else {
        VolumeGrade::C
    }
}

/// Signals that lower the health score
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    /// Share of records that re-collected an id already seen in the run
    pub duplicate_rate: f64,
    /// Records whose authored-at value could not be normalized
    pub timestamp_anomalies: u64,
    /// Collected volume fell below the acceptable minimum
    pub total_mismatch: bool,
}

/// Computes the 0-100 health score and whether the run needs review
pub fn health_score(inputs: &HealthInputs) -> (u32, bool) {
    let mut score: i64 = 100;
    score -= (inputs.duplicate_rate.clamp(0.0, 1.0) * 40.0) as i64;
    score -= inputs.timestamp_anomalies.saturating_mul(5).min(20) as i64;
    if inputs.total_mismatch {
        score -= 30;
    }

    let score = score.max(0) as u32;
    (score, score < REVIEW_THRESHOLD)
}
