use std::future::Future;

use uuid::Uuid;

use crate::error::RetentionResult;
use crate::models::{Alert, AlertFilter, Prediction, RiskPatch, Student, StudentRecord};

/// Everything one student's recompute writes. Stores apply a unit as a
/// single transaction: either all of it lands or none of it does.
#[derive(Debug, Clone)]
pub struct RecomputeUnit {
    pub patch: RiskPatch,
    pub prediction: Prediction,
    pub alert: Option<Alert>,
}

pub trait StudentRepository {
    fn get_student(
        &self,
        student_id: &str,
    ) -> impl Future<Output = RetentionResult<Option<Student>>> + Send;

    fn list_students(&self) -> impl Future<Output = RetentionResult<Vec<Student>>> + Send;

    /// Fails with `NotFound` and writes nothing when the student is gone.
    fn commit(&self, unit: RecomputeUnit) -> impl Future<Output = RetentionResult<()>> + Send;

    /// Inserts or refreshes roster fields. The risk cache is left untouched.
    fn upsert_student(
        &self,
        record: &StudentRecord,
    ) -> impl Future<Output = RetentionResult<()>> + Send;

    /// Newest first.
    fn list_predictions(
        &self,
        student_id: &str,
    ) -> impl Future<Output = RetentionResult<Vec<Prediction>>> + Send;
}

pub trait AlertRepository {
    fn list_alerts(
        &self,
        filter: &AlertFilter,
    ) -> impl Future<Output = RetentionResult<Vec<Alert>>> + Send;

    fn create_alert(&self, alert: Alert) -> impl Future<Output = RetentionResult<()>> + Send;

    fn assign_alert(
        &self,
        alert_id: Uuid,
        mentor_id: &str,
    ) -> impl Future<Output = RetentionResult<()>> + Send;

    fn mark_alert_read(&self, alert_id: Uuid) -> impl Future<Output = RetentionResult<()>> + Send;

    fn resolve_alert(&self, alert_id: Uuid) -> impl Future<Output = RetentionResult<()>> + Send;
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{AlertRepository, RecomputeUnit, StudentRepository};
    use crate::error::{RetentionError, RetentionResult};
    use crate::models::{Alert, AlertFilter, Prediction, Student, StudentRecord};

    #[derive(Debug, Default)]
    struct Tables {
        students: Vec<Student>,
        predictions: Vec<Prediction>,
        alerts: Vec<Alert>,
    }

    /// Vec-backed store for tests. Commits hold the lock for the whole unit.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        tables: Mutex<Tables>,
        fail_on: Option<String>,
    }

    impl MemoryStore {
        pub fn with_students(students: Vec<Student>) -> Self {
            MemoryStore {
                tables: Mutex::new(Tables {
                    students,
                    ..Tables::default()
                }),
                fail_on: None,
            }
        }

        /// Commits for `student_id` fail with a storage error.
        pub fn failing_on(mut self, student_id: &str) -> Self {
            self.fail_on = Some(student_id.to_string());
            self
        }

        pub fn predictions(&self) -> Vec<Prediction> {
            self.tables.lock().unwrap().predictions.clone()
        }

        pub fn alerts(&self) -> Vec<Alert> {
            self.tables.lock().unwrap().alerts.clone()
        }

        pub fn student(&self, student_id: &str) -> Option<Student> {
            self.tables
                .lock()
                .unwrap()
                .students
                .iter()
                .find(|student| student.student_id == student_id)
                .cloned()
        }

        pub fn push_alert(&self, alert: Alert) {
            self.tables.lock().unwrap().alerts.push(alert);
        }
    }

    fn matches_filter(filter: &AlertFilter, alert: &Alert) -> bool {
        filter.is_read.map_or(true, |is_read| alert.is_read == is_read)
            && filter
                .alert_type
                .as_deref()
                .map_or(true, |kind| alert.alert_type == kind)
            && filter
                .assigned_mentor_id
                .as_deref()
                .map_or(true, |mentor| alert.assigned_mentor_id.as_deref() == Some(mentor))
    }

    impl StudentRepository for MemoryStore {
        async fn get_student(&self, student_id: &str) -> RetentionResult<Option<Student>> {
            Ok(self.student(student_id))
        }

        async fn list_students(&self) -> RetentionResult<Vec<Student>> {
            Ok(self.tables.lock().unwrap().students.clone())
        }

        async fn commit(&self, unit: RecomputeUnit) -> RetentionResult<()> {
            if self.fail_on.as_deref() == Some(unit.patch.student_id.as_str()) {
                return Err(RetentionError::Storage(sqlx::Error::PoolTimedOut));
            }

            let mut tables = self.tables.lock().unwrap();
            let student = tables
                .students
                .iter_mut()
                .find(|student| student.student_id == unit.patch.student_id)
                .ok_or_else(|| RetentionError::student_not_found(&unit.patch.student_id))?;

            student.risk_score = Some(unit.patch.risk_score);
            student.risk_level = Some(unit.patch.risk_level);
            student.last_updated = unit.patch.last_updated;

            tables.predictions.push(unit.prediction);
            if let Some(alert) = unit.alert {
                tables.alerts.push(alert);
            }
            Ok(())
        }

        async fn upsert_student(&self, record: &StudentRecord) -> RetentionResult<()> {
            let mut tables = self.tables.lock().unwrap();
            let existing = tables
                .students
                .iter_mut()
                .find(|student| student.student_id == record.student_id);

            match existing {
                Some(student) => {
                    student.name = record.name.clone();
                    student.email = record.email.clone();
                    student.department = record.department.clone();
                    student.semester = record.semester;
                    student.attendance_percentage = record.attendance_percentage;
                    student.gpa = record.gpa;
                    student.gpa_trend = record.gpa_trend.clone().into();
                    student.fee_status = record.fee_status.clone().into();
                    student.fee_due_days = record.fee_due_days;
                    student.last_updated = Utc::now();
                }
                None => tables.students.push(Student {
                    student_id: record.student_id.clone(),
                    name: record.name.clone(),
                    email: record.email.clone(),
                    department: record.department.clone(),
                    semester: record.semester,
                    attendance_percentage: record.attendance_percentage,
                    gpa: record.gpa,
                    gpa_trend: record.gpa_trend.clone().into(),
                    fee_status: record.fee_status.clone().into(),
                    fee_due_days: record.fee_due_days,
                    risk_score: None,
                    risk_level: None,
                    last_updated: Utc::now(),
                }),
            }
            Ok(())
        }

        async fn list_predictions(&self, student_id: &str) -> RetentionResult<Vec<Prediction>> {
            let mut predictions: Vec<Prediction> = self
                .tables
                .lock()
                .unwrap()
                .predictions
                .iter()
                .filter(|prediction| prediction.student_id == student_id)
                .cloned()
                .collect();
            predictions.sort_by(|a, b| b.predicted_at.cmp(&a.predicted_at));
            Ok(predictions)
        }
    }

    impl AlertRepository for MemoryStore {
        async fn list_alerts(&self, filter: &AlertFilter) -> RetentionResult<Vec<Alert>> {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .alerts
                .iter()
                .filter(|alert| matches_filter(filter, alert))
                .cloned()
                .collect())
        }

        async fn create_alert(&self, alert: Alert) -> RetentionResult<()> {
            self.tables.lock().unwrap().alerts.push(alert);
            Ok(())
        }

        async fn assign_alert(&self, alert_id: Uuid, mentor_id: &str) -> RetentionResult<()> {
            let mut tables = self.tables.lock().unwrap();
            let alert = tables
                .alerts
                .iter_mut()
                .find(|alert| alert.id == alert_id)
                .ok_or_else(|| RetentionError::alert_not_found(alert_id))?;
            alert.assigned_mentor_id = Some(mentor_id.to_string());
            Ok(())
        }

        async fn mark_alert_read(&self, alert_id: Uuid) -> RetentionResult<()> {
            let mut tables = self.tables.lock().unwrap();
            let alert = tables
                .alerts
                .iter_mut()
                .find(|alert| alert.id == alert_id)
                .ok_or_else(|| RetentionError::alert_not_found(alert_id))?;
            alert.is_read = true;
            Ok(())
        }

        async fn resolve_alert(&self, alert_id: Uuid) -> RetentionResult<()> {
            let mut tables = self.tables.lock().unwrap();
            let alert = tables
                .alerts
                .iter_mut()
                .find(|alert| alert.id == alert_id)
                .ok_or_else(|| RetentionError::alert_not_found(alert_id))?;
            alert.is_read = true;
            alert.resolved_at = Some(Utc::now());
            Ok(())
        }
    }
}
