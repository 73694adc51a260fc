//! Per-student recompute: extract features, score, classify, record the
//! prediction and raise an alert when warranted.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RetentionError, RetentionResult};
use crate::models::{
    Alert, BatchOutcome, FeatureVector, Prediction, RiskDistribution, RiskLevel, RiskPatch,
    ScoreResult, Student,
};
use crate::repository::{RecomputeUnit, StudentRepository};
use crate::risk;

pub const HIGH_RISK_ALERT: &str = "high_risk";

pub fn extract_features(student: &Student) -> FeatureVector {
    FeatureVector {
        attendance_percentage: student.attendance_percentage,
        gpa: student.gpa,
        gpa_trend: student.gpa_trend.clone(),
        fee_status: student.fee_status.clone(),
        fee_due_days: student.fee_due_days,
    }
}

/// Builds the immutable prediction row and the matching cache patch.
/// Both carry the same score and timestamp.
pub fn record_prediction(
    student_id: &str,
    features: &FeatureVector,
    score: f64,
    now: DateTime<Utc>,
) -> (Prediction, RiskPatch) {
    let prediction = Prediction {
        id: Uuid::new_v4(),
        student_id: student_id.to_string(),
        risk_score: score,
        features: features.snapshot(),
        model_version: risk::MODEL_VERSION.to_string(),
        predicted_at: now,
    };
    let patch = RiskPatch {
        student_id: student_id.to_string(),
        risk_score: score,
        risk_level: risk::classify(score),
        last_updated: now,
    };
    (prediction, patch)
}

pub fn maybe_emit_alert(
    student_id: &str,
    score: f64,
    student_name: &str,
    now: DateTime<Utc>,
) -> Option<Alert> {
    if !risk::should_alert(score) {
        return None;
    }

    Some(Alert {
        id: Uuid::new_v4(),
        student_id: student_id.to_string(),
        risk_score: score,
        alert_type: HIGH_RISK_ALERT.to_string(),
        message: alert_message(student_name, score),
        is_read: false,
        assigned_mentor_id: None,
        created_at: now,
        resolved_at: None,
    })
}

pub fn alert_message(student_name: &str, score: f64) -> String {
    format!(
        "Student {} has been flagged as high risk ({}% dropout probability)",
        student_name,
        risk::as_percent(score)
    )
}

pub struct BatchRunner<'a, R> {
    repo: &'a R,
}

impl<'a, R: StudentRepository> BatchRunner<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    pub async fn run_one(&self, student_id: &str) -> RetentionResult<ScoreResult> {
        let student = self
            .repo
            .get_student(student_id)
            .await?
            .ok_or_else(|| RetentionError::student_not_found(student_id))?;
        self.process(&student).await
    }

    /// Scores every student in the snapshot taken at call time. The first
    /// failure stops the run; students already processed stay committed.
    pub async fn run_all(&self) -> RetentionResult<BatchOutcome> {
        let students = self.repo.list_students().await?;
        let mut results = Vec::with_capacity(students.len());

        for student in students.iter() {
            results.push(self.process(student).await?);
        }

        let distribution = RiskDistribution::tally(results.iter().map(|result| result.risk_level));
        info!(
            processed = results.len(),
            low = distribution.low,
            medium = distribution.medium,
            high = distribution.high,
            "recomputed risk scores"
        );

        Ok(BatchOutcome {
            results,
            distribution,
        })
    }

    async fn process(&self, student: &Student) -> RetentionResult<ScoreResult> {
        let features = extract_features(student);
        let score = risk::score(&features);
        let now = Utc::now();

        let (prediction, patch) = record_prediction(&student.student_id, &features, score, now);
        let risk_level: RiskLevel = patch.risk_level;
        let alert = maybe_emit_alert(&student.student_id, score, &student.name, now);

        let alert_message = alert.as_ref().map(|alert| alert.message.clone());
        debug!(
            student_id = %student.student_id,
            prediction_id = %prediction.id,
            "committing recompute"
        );

        self.repo
            .commit(RecomputeUnit {
                patch,
                prediction,
                alert,
            })
            .await?;

        info!(student_id = %student.student_id, score, level = %risk_level, "scored student");
        if let Some(message) = alert_message {
            warn!(student_id = %student.student_id, score, "{message}");
        }

        Ok(ScoreResult {
            student_id: student.student_id.clone(),
            risk_score: score,
            risk_level,
        })
    }
}
