// src/engine/access.rs

use crate::{error::AppError, models::attempt::Attempt};

/// Authenticated caller as seen by the engine.
///
/// The identity provider decides `is_admin`; the engine only asks two questions:
/// does the caller own the attempt, and may the caller inspect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Principal {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    pub fn owns(&self, attempt: &Attempt) -> bool {
        attempt.user_id == self.user_id
    }

    /// Owner or admin.
    pub fn can_inspect(&self, attempt: &Attempt) -> bool {
        self.owns(attempt) || self.is_admin
    }

    /// First-person actions (answering, submitting, updating). Admins get no override.
    pub fn require_owner(&self, attempt: &Attempt, action: &str) -> Result<(), AppError> {
        if self.owns(attempt) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "You do not have permission to {} this attempt",
                action
            )))
        }
    }

    pub fn require_inspect(&self, attempt: &Attempt) -> Result<(), AppError> {
        if self.can_inspect(attempt) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to access this attempt".to_string(),
            ))
        }
    }

    /// Listing a user's attempts: that user or an admin.
    pub fn require_self_or_admin(&self, user_id: i64) -> Result<(), AppError> {
        if self.user_id == user_id || self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to view these attempts".to_string(),
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::AttemptStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn attempt_of(user_id: i64) -> Attempt {
        Attempt {
            id: 1,
            user_id,
            evaluation_id: 1,
            attempt_number: 1,
            status: AttemptStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            time_spent_minutes: None,
            score: 0,
            max_score: 0,
            percentage: Decimal::ZERO,
            passed: false,
            certified: false,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_owner_can_act_and_inspect() {
        let attempt = attempt_of(7);
        let owner = Principal::user(7);
        assert!(owner.require_owner(&attempt, "answer").is_ok());
        assert!(owner.require_inspect(&attempt).is_ok());
    }

    #[test]
    fn test_admin_inspects_but_cannot_act() {
        let attempt = attempt_of(7);
        let admin = Principal::admin(1);
        assert!(admin.require_inspect(&attempt).is_ok());
        assert!(matches!(
            admin.require_owner(&attempt, "answer"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_stranger_is_forbidden() {
        let attempt = attempt_of(7);
        let stranger = Principal::user(8);
        assert!(!stranger.can_inspect(&attempt));
        assert!(stranger.require_self_or_admin(7).is_err());
        assert!(stranger.require_admin().is_err());
    }
}
