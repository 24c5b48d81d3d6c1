// src/engine/certificate.rs

use chrono::{DateTime, Utc};

use crate::models::attempt::Attempt;

/// Produces certificate codes. Uniqueness of the code is this collaborator's contract.
pub trait CertificateIssuer: Send + Sync {
    fn issue_code(&self, attempt: &Attempt, issued_at: DateTime<Utc>) -> String;
}

/// `CERT-<unix millis>-<8 upper hex>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator;

impl CertificateIssuer for CodeGenerator {
    fn issue_code(&self, _attempt: &Attempt, issued_at: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "CERT-{}-{}",
            issued_at.timestamp_millis(),
            suffix[..8].to_ascii_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::AttemptStatus;
    use rust_decimal::Decimal;

    #[test]
    fn test_code_shape() {
        let attempt = Attempt {
            id: 3,
            user_id: 1,
            evaluation_id: 2,
            attempt_number: 1,
            status: AttemptStatus::Completed,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            time_spent_minutes: Some(4),
            score: 20,
            max_score: 20,
            percentage: Decimal::new(10000, 2),
            passed: true,
            certified: true,
            ip_address: None,
            user_agent: None,
        };
        let issued_at = Utc::now();

        let code = CodeGenerator.issue_code(&attempt, issued_at);
        let parts: Vec<&str> = code.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CERT");
        assert_eq!(parts[1], issued_at.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(code, CodeGenerator.issue_code(&attempt, issued_at));
    }
}
