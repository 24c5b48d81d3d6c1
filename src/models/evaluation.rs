// src/models/evaluation.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "evaluation_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "question_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    OpenText,
}

impl QuestionType {
    /// Choice questions are graded from the selected option.
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::TrueFalse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionType::TrueFalse => "TRUE_FALSE",
            QuestionType::OpenText => "OPEN_TEXT",
        }
    }
}

/// Represents the 'evaluations' table: an exam template.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,

    /// Percentage threshold (0-100) an attempt must reach to pass.
    pub passing_score: i32,
    pub max_attempts: i32,
    pub time_limit_enabled: bool,
    pub status: EvaluationStatus,

    /// Evaluation that must be passed before this one may be started.
    pub prerequisite_evaluation_id: Option<i64>,
    pub show_results_immediately: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'questions' table. Belongs to exactly one evaluation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub evaluation_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub explanation: Option<String>,
}

/// Represents the 'question_options' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
    pub order_index: i32,
}

/// Question together with its options in display order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    pub questions: Vec<QuestionDetail>,
}

/// DTO for creating an evaluation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvaluationRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: i32,
    #[validate(range(min = 1))]
    pub max_attempts: i32,
    #[serde(default = "default_true")]
    pub time_limit_enabled: bool,
    pub status: Option<EvaluationStatus>,
    pub prerequisite_evaluation_id: Option<i64>,
    #[serde(default = "default_true")]
    pub show_results_immediately: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
    pub order_index: Option<i32>,
}

/// DTO for adding a question to an evaluation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    pub question_type: QuestionType,
    #[validate(range(min = 1, max = 1000))]
    pub points: i32,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub options: Vec<CreateOptionRequest>,
}

impl CreateQuestionRequest {
    /// Checks that the option list fits the question type.
    pub fn check_options(&self) -> Result<(), String> {
        match self.question_type {
            QuestionType::OpenText if !self.options.is_empty() => {
                Err("Open text questions cannot have options".to_string())
            }
            QuestionType::OpenText => Ok(()),
            QuestionType::TrueFalse if self.options.len() != 2 => {
                Err("True/false questions need exactly two options".to_string())
            }
            _ if self.options.len() < 2 => {
                Err("Choice questions need at least two options".to_string())
            }
            _ if self.options.iter().filter(|o| o.is_correct).count() != 1 => {
                Err("Choice questions need exactly one correct option".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> CreateOptionRequest {
        CreateOptionRequest {
            option_text: text.to_string(),
            is_correct,
            order_index: None,
        }
    }

    fn request(question_type: QuestionType, options: Vec<CreateOptionRequest>) -> CreateQuestionRequest {
        CreateQuestionRequest {
            question_text: "Q".to_string(),
            question_type,
            points: 1,
            explanation: None,
            options,
        }
    }

    #[test]
    fn test_open_text_rejects_options() {
        let req = request(QuestionType::OpenText, vec![option("a", true)]);
        assert!(req.check_options().is_err());
        assert!(request(QuestionType::OpenText, vec![]).check_options().is_ok());
    }

    #[test]
    fn test_choice_needs_single_correct_option() {
        let none_correct = request(
            QuestionType::MultipleChoice,
            vec![option("a", false), option("b", false)],
        );
        assert!(none_correct.check_options().is_err());

        let ok = request(
            QuestionType::MultipleChoice,
            vec![option("a", false), option("b", true), option("c", false)],
        );
        assert!(ok.check_options().is_ok());
    }

    #[test]
    fn test_true_false_needs_two_options() {
        let three = request(
            QuestionType::TrueFalse,
            vec![option("a", true), option("b", false), option("c", false)],
        );
        assert!(three.check_options().is_err());
    }
}
