use std::io::Read;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AccessPolicy, Action, Caller, Role};
use crate::error::{RetentionError, RetentionResult};
use crate::models::{
    Alert, AlertFilter, BatchOutcome, Prediction, RiskDistribution, ScoreResult, Student,
    StudentRecord,
};
use crate::pipeline::{self, BatchRunner};
use crate::repository::{AlertRepository, StudentRepository};
use crate::risk;

/// Caller-facing operations. Every call clears the access policy before
/// touching the store.
pub struct RetentionService<R, P> {
    repo: R,
    policy: P,
}

impl<R, P> RetentionService<R, P>
where
    R: StudentRepository + AlertRepository,
    P: AccessPolicy,
{
    pub fn new(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn authorize(&self, caller: Option<&Caller>, action: Action) -> RetentionResult<()> {
        self.policy.authorize(caller, action)
    }

    pub async fn compute_one(
        &self,
        caller: Option<&Caller>,
        student_id: &str,
    ) -> RetentionResult<ScoreResult> {
        self.authorize(caller, Action::ComputeOne)?;
        BatchRunner::new(&self.repo).run_one(student_id).await
    }

    pub async fn compute_all(&self, caller: Option<&Caller>) -> RetentionResult<BatchOutcome> {
        self.authorize(caller, Action::ComputeAll)?;
        BatchRunner::new(&self.repo).run_all().await
    }

    /// Mentors only ever see alerts assigned to them.
    pub async fn list_alerts(
        &self,
        caller: Option<&Caller>,
        mut filter: AlertFilter,
    ) -> RetentionResult<Vec<Alert>> {
        self.authorize(caller, Action::ReadAlerts)?;
        if let Some(caller) = caller.filter(|caller| caller.role == Role::Mentor) {
            filter.assigned_mentor_id = Some(caller.user_id.clone());
        }
        self.repo.list_alerts(&filter).await
    }

    /// Raises an alert by hand, optionally routed to a mentor. The score
    /// is the student's cached one, or a fresh evaluation if never scored.
    pub async fn create_alert(
        &self,
        caller: Option<&Caller>,
        student_id: &str,
        alert_type: &str,
        message: &str,
        assigned_mentor_id: Option<&str>,
    ) -> RetentionResult<Alert> {
        self.authorize(caller, Action::UpdateAlert)?;
        let student = self
            .repo
            .get_student(student_id)
            .await?
            .ok_or_else(|| RetentionError::student_not_found(student_id))?;
        let risk_score = student
            .risk_score
            .unwrap_or_else(|| risk::score(&pipeline::extract_features(&student)));

        let alert = Alert {
            id: Uuid::new_v4(),
            student_id: student.student_id.clone(),
            risk_score,
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            is_read: false,
            assigned_mentor_id: assigned_mentor_id.map(str::to_string),
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.repo.create_alert(alert.clone()).await?;
        info!(alert_id = %alert.id, student_id, "alert created");
        Ok(alert)
    }

    pub async fn assign_alert(
        &self,
        caller: Option<&Caller>,
        alert_id: Uuid,
        mentor_id: &str,
    ) -> RetentionResult<()> {
        self.authorize(caller, Action::UpdateAlert)?;
        self.repo.assign_alert(alert_id, mentor_id).await
    }

    pub async fn mark_alert_read(
        &self,
        caller: Option<&Caller>,
        alert_id: Uuid,
    ) -> RetentionResult<()> {
        self.authorize(caller, Action::UpdateAlert)?;
        self.repo.mark_alert_read(alert_id).await
    }

    pub async fn resolve_alert(
        &self,
        caller: Option<&Caller>,
        alert_id: Uuid,
    ) -> RetentionResult<()> {
        self.authorize(caller, Action::UpdateAlert)?;
        self.repo.resolve_alert(alert_id).await
    }

    /// Tallies cached levels; students never scored are left out.
    pub async fn risk_distribution(
        &self,
        caller: Option<&Caller>,
    ) -> RetentionResult<RiskDistribution> {
        self.authorize(caller, Action::ReadDashboard)?;
        let students = self.repo.list_students().await?;
        Ok(RiskDistribution::tally(
            students.iter().filter_map(|student| student.risk_level),
        ))
    }

    pub async fn high_risk_students(
        &self,
        caller: Option<&Caller>,
    ) -> RetentionResult<Vec<Student>> {
        self.authorize(caller, Action::ReadDashboard)?;
        let mut students: Vec<Student> = self
            .repo
            .list_students()
            .await?
            .into_iter()
            .filter(|student| student.risk_score.is_some_and(risk::should_alert))
            .collect();
        students.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(students)
    }

    /// Upserts every CSV row. All rows are parsed and checked before the
    /// first write, so a bad row leaves the roster untouched.
    pub async fn import_students<Rd: Read>(
        &self,
        caller: Option<&Caller>,
        source: Rd,
    ) -> RetentionResult<usize> {
        self.authorize(caller, Action::ImportStudents)?;

        let mut reader = csv::Reader::from_reader(source);
        let mut records = Vec::new();
        for result in reader.deserialize::<StudentRecord>() {
            let record = result?;
            record.validate()?;
            records.push(record);
        }

        for record in records.iter() {
            self.repo.upsert_student(record).await?;
        }
        info!(upserted = records.len(), "imported students");
        Ok(records.len())
    }

    pub async fn prediction_history(
        &self,
        caller: Option<&Caller>,
        student_id: &str,
    ) -> RetentionResult<Vec<Prediction>> {
        self.authorize(caller, Action::ReadDashboard)?;
        if self.repo.get_student(student_id).await?.is_none() {
            return Err(RetentionError::student_not_found(student_id));
        }
        self.repo.list_predictions(student_id).await
    }
}
