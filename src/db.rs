use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RetentionError, RetentionResult};
use crate::models::{
    Alert, AlertFilter, Prediction, PredictionFeatures, RiskLevel, RiskPatch, Student,
    StudentRecord,
};
use crate::repository::{AlertRepository, RecomputeUnit, StudentRepository};

const STUDENT_COLUMNS: &str = "student_id, name, email, department, semester, \
     attendance_percentage, gpa, gpa_trend, fee_status, fee_due_days, \
     risk_score, risk_level, last_updated";

const ALERT_COLUMNS: &str = "id, student_id, risk_score, alert_type, message, is_read, \
     assigned_mentor_id, created_at, resolved_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn student_from_row(row: &PgRow) -> RetentionResult<Student> {
    let risk_level: Option<String> = row.try_get("risk_level")?;
    let risk_level = risk_level
        .map(|value| value.parse::<RiskLevel>().map_err(RetentionError::Decode))
        .transpose()?;

    Ok(Student {
        student_id: row.try_get("student_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        semester: row.try_get("semester")?,
        attendance_percentage: row.try_get("attendance_percentage")?,
        gpa: row.try_get("gpa")?,
        gpa_trend: row.try_get::<String, _>("gpa_trend")?.into(),
        fee_status: row.try_get::<String, _>("fee_status")?.into(),
        fee_due_days: row.try_get("fee_due_days")?,
        risk_score: row.try_get("risk_score")?,
        risk_level,
        last_updated: row.try_get("last_updated")?,
    })
}

fn prediction_from_row(row: &PgRow) -> RetentionResult<Prediction> {
    let features: Json<PredictionFeatures> = row.try_get("features")?;
    Ok(Prediction {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_score: row.try_get("risk_score")?,
        features: features.0,
        model_version: row.try_get("model_version")?,
        predicted_at: row.try_get("predicted_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> RetentionResult<Alert> {
    Ok(Alert {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_score: row.try_get("risk_score")?,
        alert_type: row.try_get("alert_type")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        assigned_mentor_id: row.try_get("assigned_mentor_id")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

/// Last writer wins; no version check on the cached fields.
pub async fn patch_student(conn: &mut PgConnection, patch: &RiskPatch) -> RetentionResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE student_retention.students
        SET risk_score = $2, risk_level = $3, last_updated = $4
        WHERE student_id = $1
        "#,
    )
    .bind(&patch.student_id)
    .bind(patch.risk_score)
    .bind(patch.risk_level.as_str())
    .bind(patch.last_updated)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RetentionError::student_not_found(&patch.student_id));
    }
    Ok(())
}

pub async fn insert_prediction(
    conn: &mut PgConnection,
    prediction: &Prediction,
) -> RetentionResult<()> {
    sqlx::query(
        r#"
        INSERT INTO student_retention.predictions
        (id, student_id, risk_score, features, model_version, predicted_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(prediction.id)
    .bind(&prediction.student_id)
    .bind(prediction.risk_score)
    .bind(Json(&prediction.features))
    .bind(&prediction.model_version)
    .bind(prediction.predicted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_alert(conn: &mut PgConnection, alert: &Alert) -> RetentionResult<()> {
    sqlx::query(
        r#"
        INSERT INTO student_retention.alerts
        (id, student_id, risk_score, alert_type, message, is_read,
         assigned_mentor_id, created_at, resolved_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(alert.id)
    .bind(&alert.student_id)
    .bind(alert.risk_score)
    .bind(&alert.alert_type)
    .bind(&alert.message)
    .bind(alert.is_read)
    .bind(&alert.assigned_mentor_id)
    .bind(alert.created_at)
    .bind(alert.resolved_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl StudentRepository for PgStore {
    async fn get_student(&self, student_id: &str) -> RetentionResult<Option<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM student_retention.students WHERE student_id = $1"
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn list_students(&self) -> RetentionResult<Vec<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM student_retention.students ORDER BY student_id"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(student_from_row).collect()
    }

    async fn commit(&self, unit: RecomputeUnit) -> RetentionResult<()> {
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` on any early return rolls the whole unit back.
        patch_student(&mut tx, &unit.patch).await?;
        insert_prediction(&mut tx, &unit.prediction).await?;
        if let Some(alert) = &unit.alert {
            insert_alert(&mut tx, alert).await?;
        }

        tx.commit().await?;
        debug!(
            student_id = %unit.patch.student_id,
            alerted = unit.alert.is_some(),
            "recompute committed"
        );
        Ok(())
    }

    async fn upsert_student(&self, record: &StudentRecord) -> RetentionResult<()> {
        sqlx::query(
            r#"
            INSERT INTO student_retention.students
            (student_id, name, email, department, semester, attendance_percentage,
             gpa, gpa_trend, fee_status, fee_due_days, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
            ON CONFLICT (student_id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                department = EXCLUDED.department,
                semester = EXCLUDED.semester,
                attendance_percentage = EXCLUDED.attendance_percentage,
                gpa = EXCLUDED.gpa,
                gpa_trend = EXCLUDED.gpa_trend,
                fee_status = EXCLUDED.fee_status,
                fee_due_days = EXCLUDED.fee_due_days,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&record.student_id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.department)
        .bind(record.semester)
        .bind(record.attendance_percentage)
        .bind(record.gpa)
        .bind(&record.gpa_trend)
        .bind(&record.fee_status)
        .bind(record.fee_due_days)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_predictions(&self, student_id: &str) -> RetentionResult<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, risk_score, features, model_version, predicted_at
            FROM student_retention.predictions
            WHERE student_id = $1
            ORDER BY predicted_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(prediction_from_row).collect()
    }
}

impl AlertRepository for PgStore {
    async fn list_alerts(&self, filter: &AlertFilter) -> RetentionResult<Vec<Alert>> {
        let query = format!(
            "SELECT {ALERT_COLUMNS} FROM student_retention.alerts \
             WHERE ($1::BOOLEAN IS NULL OR is_read = $1) \
             AND ($2::TEXT IS NULL OR alert_type = $2) \
             AND ($3::TEXT IS NULL OR assigned_mentor_id = $3) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(filter.is_read)
            .bind(filter.alert_type.as_deref())
            .bind(filter.assigned_mentor_id.as_deref())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn create_alert(&self, alert: Alert) -> RetentionResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_alert(&mut conn, &alert).await
    }

    async fn assign_alert(&self, alert_id: Uuid, mentor_id: &str) -> RetentionResult<()> {
        let result = sqlx::query(
            "UPDATE student_retention.alerts SET assigned_mentor_id = $2 WHERE id = $1",
        )
        .bind(alert_id)
        .bind(mentor_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RetentionError::alert_not_found(alert_id));
        }
        Ok(())
    }

    async fn mark_alert_read(&self, alert_id: Uuid) -> RetentionResult<()> {
        let result =
            sqlx::query("UPDATE student_retention.alerts SET is_read = TRUE WHERE id = $1")
                .bind(alert_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RetentionError::alert_not_found(alert_id));
        }
        Ok(())
    }

    async fn resolve_alert(&self, alert_id: Uuid) -> RetentionResult<()> {
        let result = sqlx::query(
            "UPDATE student_retention.alerts SET is_read = TRUE, resolved_at = now() WHERE id = $1",
        )
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RetentionError::alert_not_found(alert_id));
        }
        Ok(())
    }
}

pub async fn seed(store: &PgStore) -> RetentionResult<usize> {
    let students = [
        ("STU001", "Avery Lee", "Computer Science", 4, 92.0, 3.6, "increasing", "paid", 0),
        ("STU002", "Jules Moreno", "Mathematics", 2, 68.0, 2.4, "stable", "pending", 0),
        ("STU003", "Kiara Patel", "Physics", 6, 60.0, 2.0, "decreasing", "overdue", 21),
        ("STU004", "Noah Rodriguez", "Chemistry", 1, 40.0, 1.0, "decreasing", "overdue", 45),
        ("STU005", "Ruby Harris", "Biology", 3, 30.0, 0.5, "decreasing", "overdue", 58),
        ("STU006", "Sam Clark", "Mathematics", 5, 77.0, 2.9, "stable", "paid", 0),
    ];

    for (student_id, name, department, semester, attendance, gpa, trend, fee, due_days) in
        students
    {
        let record = StudentRecord {
            student_id: student_id.to_string(),
            name: name.to_string(),
            email: format!("{}@university.edu", name.to_lowercase().replace(' ', ".")),
            department: department.to_string(),
            semester,
            attendance_percentage: attendance,
            gpa,
            gpa_trend: trend.to_string(),
            fee_status: fee.to_string(),
            fee_due_days: due_days,
        };
        store.upsert_student(&record).await?;
    }

    Ok(students.len())
}
