use crate::auth::Action;

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("not authenticated")]
    Authentication,

    #[error("user {user_id} is not authorized to {action}")]
    Authorization { user_id: String, action: Action },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("invalid student record {student_id}: {reason}")]
    InvalidRecord { student_id: String, reason: String },

    #[error("invalid stored record: {0}")]
    Decode(String),

    #[error("import failed: {0}")]
    Import(#[from] csv::Error),
}

impl RetentionError {
    pub fn student_not_found(student_id: &str) -> Self {
        RetentionError::NotFound {
            kind: "student",
            id: student_id.to_string(),
        }
    }

    pub fn alert_not_found(alert_id: uuid::Uuid) -> Self {
        RetentionError::NotFound {
            kind: "alert",
            id: alert_id.to_string(),
        }
    }
}

pub type RetentionResult<T> = Result<T, RetentionError>;
