use crate::models::{FeatureVector, FeeStatus, GpaTrend, RiskLevel};

pub const MODEL_VERSION: &str = "v1.0";

pub const MEDIUM_RISK_FLOOR: f64 = 0.3;
pub const HIGH_RISK_FLOOR: f64 = 0.7;
/// Alerts fire strictly above this score, so a score of exactly 0.7 is
/// classified high but raises no alert.
pub const ALERT_THRESHOLD: f64 = 0.7;

const ATTENDANCE_TARGET: f64 = 80.0;
const GPA_TARGET: f64 = 3.0;

const ATTENDANCE_WEIGHT: f64 = 0.4;
const GPA_WEIGHT: f64 = 0.3;
const FEE_WEIGHT: f64 = 0.2;
const TREND_WEIGHT: f64 = 0.1;

// Weighted sums are rounded here before thresholds are applied.
const SCORE_PRECISION: f64 = 1e12;

pub fn score(features: &FeatureVector) -> f64 {
    let raw = attendance_risk(features.attendance_percentage) * ATTENDANCE_WEIGHT
        + gpa_risk(features.gpa) * GPA_WEIGHT
        + fee_risk(&features.fee_status) * FEE_WEIGHT
        + trend_risk(&features.gpa_trend) * TREND_WEIGHT;

    // `max`/`min` rather than `clamp` so NaN collapses to zero.
    ((raw * SCORE_PRECISION).round() / SCORE_PRECISION)
        .max(0.0)
        .min(1.0)
}

pub fn attendance_risk(attendance_percentage: f64) -> f64 {
    ((ATTENDANCE_TARGET - attendance_percentage) / ATTENDANCE_TARGET).max(0.0)
}

pub fn gpa_risk(gpa: f64) -> f64 {
    ((GPA_TARGET - gpa) / GPA_TARGET).max(0.0)
}

pub fn fee_risk(status: &FeeStatus) -> f64 {
    match status {
        FeeStatus::Overdue => 1.0,
        FeeStatus::Pending => 0.5,
        FeeStatus::Paid | FeeStatus::Unrecognized(_) => 0.0,
    }
}

pub fn trend_risk(trend: &GpaTrend) -> f64 {
    match trend {
        GpaTrend::Decreasing => 1.0,
        GpaTrend::Stable => 0.3,
        GpaTrend::Increasing | GpaTrend::Unrecognized(_) => 0.0,
    }
}

pub fn classify(score: f64) -> RiskLevel {
    if score < MEDIUM_RISK_FLOOR {
        RiskLevel::Low
    } else if score < HIGH_RISK_FLOOR {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn should_alert(score: f64) -> bool {
    score > ALERT_THRESHOLD
}

/// Whole-number percentage used in alert messages.
pub fn as_percent(score: f64) -> i64 {
    (score * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(attendance: f64, gpa: f64, fee: FeeStatus, trend: GpaTrend) -> FeatureVector {
        FeatureVector {
            attendance_percentage: attendance,
            gpa,
            gpa_trend: trend,
            fee_status: fee,
            fee_due_days: 0,
        }
    }

    #[test]
    fn scenario_a_is_medium() {
        let value = score(&features(60.0, 2.0, FeeStatus::Overdue, GpaTrend::Decreasing));
        assert!((value - 0.5).abs() < 1e-9);
        assert_eq!(classify(value), RiskLevel::Medium);
        assert!(!should_alert(value));
    }

    #[test]
    fn scenario_b_lands_exactly_on_boundary() {
        let value = score(&features(40.0, 1.0, FeeStatus::Overdue, GpaTrend::Decreasing));
        assert_eq!(value, 0.7);
        assert_eq!(classify(value), RiskLevel::High);
        assert!(!should_alert(value));
    }

    #[test]
    fn scenario_c_alerts_at_eighty_percent() {
        let value = score(&features(30.0, 0.5, FeeStatus::Overdue, GpaTrend::Decreasing));
        assert!((value - 0.8).abs() < 1e-9);
        assert_eq!(classify(value), RiskLevel::High);
        assert!(should_alert(value));
        assert_eq!(as_percent(value), 80);
    }

    #[test]
    fn strong_student_scores_zero() {
        let value = score(&features(95.0, 3.8, FeeStatus::Paid, GpaTrend::Increasing));
        assert_eq!(value, 0.0);
        assert_eq!(classify(value), RiskLevel::Low);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let extremes = [
            features(0.0, -2.0, FeeStatus::Overdue, GpaTrend::Decreasing),
            features(100.0, 4.0, FeeStatus::Paid, GpaTrend::Increasing),
            features(-50.0, 0.0, FeeStatus::Pending, GpaTrend::Stable),
            features(150.0, 10.0, FeeStatus::Unrecognized("waived".into()), GpaTrend::Stable),
            features(f64::NAN, f64::NAN, FeeStatus::Overdue, GpaTrend::Decreasing),
        ];
        for vector in extremes.iter() {
            let value = score(vector);
            assert!((0.0..=1.0).contains(&value), "{value} out of range");
        }
    }

    #[test]
    fn lower_attendance_never_lowers_score() {
        let mut previous = f64::MIN;
        for attendance in (0..=100).rev() {
            let value = score(&features(attendance as f64, 2.5, FeeStatus::Paid, GpaTrend::Stable));
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn lower_gpa_never_lowers_score() {
        let mut previous = f64::MIN;
        for step in (0..=40).rev() {
            let gpa = step as f64 / 10.0;
            let value = score(&features(70.0, gpa, FeeStatus::Pending, GpaTrend::Increasing));
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn fee_and_trend_orderings_are_monotone() {
        let by_fee: Vec<f64> = [FeeStatus::Paid, FeeStatus::Pending, FeeStatus::Overdue]
            .into_iter()
            .map(|fee| score(&features(75.0, 2.8, fee, GpaTrend::Stable)))
            .collect();
        assert!(by_fee.windows(2).all(|pair| pair[0] <= pair[1]));

        let by_trend: Vec<f64> = [GpaTrend::Increasing, GpaTrend::Stable, GpaTrend::Decreasing]
            .into_iter()
            .map(|trend| score(&features(75.0, 2.8, FeeStatus::Pending, trend)))
            .collect();
        assert!(by_trend.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn unrecognized_values_carry_no_risk() {
        assert_eq!(fee_risk(&FeeStatus::Unrecognized("waived".into())), 0.0);
        assert_eq!(trend_risk(&GpaTrend::Unrecognized("n/a".into())), 0.0);
    }

    #[test]
    fn classifier_boundaries_are_half_open() {
        assert_eq!(classify(0.29999), RiskLevel::Low);
        assert_eq!(classify(0.3), RiskLevel::Medium);
        assert_eq!(classify(0.69999), RiskLevel::Medium);
        assert_eq!(classify(0.7), RiskLevel::High);
    }

    #[test]
    fn alert_threshold_is_strict() {
        assert!(!should_alert(0.7));
        assert!(should_alert(0.70001));
    }
}
