// src/engine/expiry.rs

use chrono::{DateTime, Utc};

use crate::models::{
    attempt::{Attempt, AttemptStatus},
    evaluation::Evaluation,
};

/// Outcome of the deadline guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Deadline {
    /// Still within time; carries whole minutes elapsed since start.
    Open { attempt: Attempt, elapsed_minutes: i64 },
    /// Over time. The attempt is now EXPIRED and must be persisted before rejecting.
    Passed(Attempt),
}

/// Whole minutes between `started_at` and `now`, truncated.
pub fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_minutes().max(0)
}

/// Flips an over-time attempt to EXPIRED.
///
/// Only time-limited evaluations expire, and only once more than `duration_minutes`
/// whole minutes have passed. Expiry records the elapsed time; `completed_at` stays unset.
pub fn check_and_expire(mut attempt: Attempt, evaluation: &Evaluation, now: DateTime<Utc>) -> Deadline {
    let elapsed = elapsed_minutes(attempt.started_at, now);

    if evaluation.time_limit_enabled && elapsed > evaluation.duration_minutes as i64 {
        attempt.status = AttemptStatus::Expired;
        attempt.time_spent_minutes = Some(clamp_minutes(elapsed));
        return Deadline::Passed(attempt);
    }

    Deadline::Open {
        attempt,
        elapsed_minutes: elapsed,
    }
}

pub(crate) fn clamp_minutes(minutes: i64) -> i32 {
    minutes.clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evaluation::EvaluationStatus;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn evaluation(time_limit_enabled: bool, duration_minutes: i32) -> Evaluation {
        Evaluation {
            id: 1,
            title: "Safety".to_string(),
            description: None,
            duration_minutes,
            passing_score: 70,
            max_attempts: 1,
            time_limit_enabled,
            status: EvaluationStatus::Active,
            prerequisite_evaluation_id: None,
            show_results_immediately: true,
            created_at: Utc::now(),
        }
    }

    fn attempt(started_at: DateTime<Utc>) -> Attempt {
        Attempt {
            id: 1,
            user_id: 1,
            evaluation_id: 1,
            attempt_number: 1,
            status: AttemptStatus::InProgress,
            started_at,
            completed_at: None,
            time_spent_minutes: None,
            score: 0,
            max_score: 20,
            percentage: Decimal::ZERO,
            passed: false,
            certified: false,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_within_limit_stays_open() {
        let start = Utc::now();
        let now = start + Duration::minutes(30) + Duration::seconds(59);
        match check_and_expire(attempt(start), &evaluation(true, 30), now) {
            Deadline::Open {
                attempt,
                elapsed_minutes,
            } => {
                assert_eq!(elapsed_minutes, 30);
                assert_eq!(attempt.status, AttemptStatus::InProgress);
            }
            Deadline::Passed(_) => panic!("attempt should still be open"),
        }
    }

    #[test]
    fn test_past_limit_expires() {
        let start = Utc::now();
        let now = start + Duration::minutes(31);
        match check_and_expire(attempt(start), &evaluation(true, 30), now) {
            Deadline::Passed(attempt) => {
                assert_eq!(attempt.status, AttemptStatus::Expired);
                assert_eq!(attempt.time_spent_minutes, Some(31));
                assert!(attempt.completed_at.is_none());
            }
            Deadline::Open { .. } => panic!("attempt should have expired"),
        }
    }

    #[test]
    fn test_untimed_evaluation_never_expires() {
        let start = Utc::now();
        let now = start + Duration::hours(10);
        assert!(matches!(
            check_and_expire(attempt(start), &evaluation(false, 30), now),
            Deadline::Open {
                elapsed_minutes: 600,
                ..
            }
        ));
    }

    #[test]
    fn test_clock_skew_counts_as_zero() {
        let start = Utc::now();
        assert_eq!(elapsed_minutes(start, start - Duration::minutes(5)), 0);
    }
}
