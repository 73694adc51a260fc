use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RetentionError, RetentionResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GpaTrend {
    Increasing,
    Stable,
    Decreasing,
    /// Any other stored value; scores as no trend risk.
    Unrecognized(String),
}

impl GpaTrend {
    pub fn as_str(&self) -> &str {
        match self {
            GpaTrend::Increasing => "increasing",
            GpaTrend::Stable => "stable",
            GpaTrend::Decreasing => "decreasing",
            GpaTrend::Unrecognized(raw) => raw,
        }
    }

    /// Numeric encoding kept in prediction snapshots.
    pub fn encoded(&self) -> i8 {
        match self {
            GpaTrend::Increasing => 1,
            GpaTrend::Stable => 0,
            _ => -1,
        }
    }
}

impl From<String> for GpaTrend {
    fn from(value: String) -> Self {
        match value.as_str() {
            "increasing" => GpaTrend::Increasing,
            "stable" => GpaTrend::Stable,
            "decreasing" => GpaTrend::Decreasing,
            _ => GpaTrend::Unrecognized(value),
        }
    }
}

impl From<GpaTrend> for String {
    fn from(value: GpaTrend) -> Self {
        match value {
            GpaTrend::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeeStatus {
    Paid,
    Pending,
    Overdue,
    /// Any other stored value; scores like `Paid`.
    Unrecognized(String),
}

impl FeeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FeeStatus::Paid => "paid",
            FeeStatus::Pending => "pending",
            FeeStatus::Overdue => "overdue",
            FeeStatus::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for FeeStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "paid" => FeeStatus::Paid,
            "pending" => FeeStatus::Pending,
            "overdue" => FeeStatus::Overdue,
            _ => FeeStatus::Unrecognized(value),
        }
    }
}

impl From<FeeStatus> for String {
    fn from(value: FeeStatus) -> Self {
        match value {
            FeeStatus::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub semester: i32,
    pub attendance_percentage: f64,
    pub gpa: f64,
    pub gpa_trend: GpaTrend,
    pub fee_status: FeeStatus,
    pub fee_due_days: i32,
    pub risk_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub last_updated: DateTime<Utc>,
}

/// One roster row as it arrives from an import or the development seed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub semester: i32,
    pub attendance_percentage: f64,
    pub gpa: f64,
    pub gpa_trend: String,
    pub fee_status: String,
    #[serde(default)]
    pub fee_due_days: i32,
}

impl StudentRecord {
    pub fn validate(&self) -> RetentionResult<()> {
        let reason = if self.student_id.trim().is_empty() {
            Some("student_id is empty".to_string())
        } else if self.fee_due_days < 0 {
            Some(format!("fee_due_days must be >= 0, got {}", self.fee_due_days))
        } else if !(0.0..=100.0).contains(&self.attendance_percentage) {
            Some(format!(
                "attendance_percentage must be within 0-100, got {}",
                self.attendance_percentage
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RetentionError::InvalidRecord {
                student_id: self.student_id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Scoring input captured from a student at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub attendance_percentage: f64,
    pub gpa: f64,
    pub gpa_trend: GpaTrend,
    pub fee_status: FeeStatus,
    pub fee_due_days: i32,
}

impl FeatureVector {
    pub fn snapshot(&self) -> PredictionFeatures {
        PredictionFeatures {
            attendance_percentage: self.attendance_percentage,
            gpa: self.gpa,
            fee_due_days: self.fee_due_days,
            assessment_average: self.gpa * 25.0,
            gpa_trend: self.gpa_trend.encoded(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeatures {
    pub attendance_percentage: f64,
    pub gpa: f64,
    pub fee_due_days: i32,
    pub assessment_average: f64,
    pub gpa_trend: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: Uuid,
    pub student_id: String,
    pub risk_score: f64,
    pub features: PredictionFeatures,
    pub model_version: String,
    pub predicted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub student_id: String,
    pub risk_score: f64,
    pub alert_type: String,
    pub message: String,
    pub is_read: bool,
    pub assigned_mentor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub is_read: Option<bool>,
    pub alert_type: Option<String>,
    pub assigned_mentor_id: Option<String>,
}

/// Fresh values for a student's cached risk fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPatch {
    pub student_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub student_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskDistribution {
    pub fn tally<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = RiskLevel>,
    {
        let mut distribution = RiskDistribution::default();
        for level in levels {
            match level {
                RiskLevel::Low => distribution.low += 1,
                RiskLevel::Medium => distribution.medium += 1,
                RiskLevel::High => distribution.high += 1,
            }
        }
        distribution
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ScoreResult>,
    pub distribution: RiskDistribution,
}
