use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Alert, RiskDistribution, Student};

#[derive(Debug, Clone)]
pub struct DepartmentSummary {
    pub department: String,
    pub scored: usize,
    pub avg_score: f64,
}

/// Average cached score per department, busiest first. Unscored students
/// are skipped.
pub fn summarize_by_department(students: &[Student]) -> Vec<DepartmentSummary> {
    let mut map: std::collections::HashMap<String, (usize, f64)> =
        std::collections::HashMap::new();

    for student in students {
        let Some(score) = student.risk_score else {
            continue;
        };
        let entry = map.entry(student.department.clone()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += score;
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(department, (scored, total_score))| DepartmentSummary {
            department,
            scored,
            avg_score: if scored == 0 {
                0.0
            } else {
                total_score / scored as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.scored.cmp(&a.scored).then(a.department.cmp(&b.department)));
    summaries
}

pub fn build_report(
    generated_at: DateTime<Utc>,
    distribution: &RiskDistribution,
    students: &[Student],
    high_risk: &[Student],
    unread_alerts: &[Alert],
) -> String {
    let summaries = summarize_by_department(students);
    let mut output = String::new();

    let _ = writeln!(output, "# Student Retention Risk Report");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");

    if distribution.total() == 0 {
        let _ = writeln!(output, "No students have been scored yet.");
    } else {
        let _ = writeln!(output, "- low: {}", distribution.low);
        let _ = writeln!(output, "- medium: {}", distribution.medium);
        let _ = writeln!(output, "- high: {}", distribution.high);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");

    if summaries.is_empty() {
        let _ = writeln!(output, "No scored students.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} scored (avg risk {:.2})",
                summary.department, summary.scored, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if high_risk.is_empty() {
        let _ = writeln!(output, "No students above the alert threshold.");
    } else {
        for student in high_risk.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}, {} semester {}) score {:.2}, attendance {:.0}%, GPA {:.2}, fees {}",
                student.name,
                student.student_id,
                student.email,
                student.department,
                student.semester,
                student.risk_score.unwrap_or_default(),
                student.attendance_percentage,
                student.gpa,
                student.fee_status.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Unread Alerts");

    if unread_alerts.is_empty() {
        let _ = writeln!(output, "No unread alerts.");
    } else {
        for alert in unread_alerts.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                alert.student_id,
                alert.created_at.format("%Y-%m-%d"),
                alert.message
            );
        }
    }

    output
}
