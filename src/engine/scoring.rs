// src/engine/scoring.rs

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::evaluation::{Question, QuestionOption, QuestionType};

/// Correctness and points recorded for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub is_correct: bool,
    pub points_earned: i32,
}

impl Grade {
    const ZERO: Grade = Grade {
        is_correct: false,
        points_earned: 0,
    };
}

/// Grades an answer.
///
/// Choice questions take correctness from the selected option: full points or none.
/// Open text is always stored as incorrect with zero points until reviewed by a person.
/// The caller has already checked that `selected` belongs to `question`.
pub fn grade(question: &Question, selected: Option<&QuestionOption>) -> Grade {
    match (question.question_type, selected) {
        (QuestionType::OpenText, _) => Grade::ZERO,
        (_, Some(option)) if option.is_correct => Grade {
            is_correct: true,
            points_earned: question.points,
        },
        _ => Grade::ZERO,
    }
}

/// `score / max_score * 100`, the ratio rounded half-up to 4 places first,
/// then the percentage to 2 places. Zero when `max_score` is zero.
pub fn percentage(score: i64, max_score: i64) -> Decimal {
    if max_score <= 0 {
        return Decimal::new(0, 2);
    }

    let ratio = (Decimal::from(score) / Decimal::from(max_score))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    let mut percentage = (ratio * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    // Exact ratios such as 1/2 come back with fewer places; pad to two.
    percentage.rescale(2);
    percentage
}

/// Ties pass.
pub fn is_passing(percentage: Decimal, passing_score: i32) -> bool {
    percentage >= Decimal::from(passing_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType, points: i32) -> Question {
        Question {
            id: 1,
            evaluation_id: 1,
            question_text: "Q".to_string(),
            question_type,
            points,
            explanation: None,
        }
    }

    fn option(is_correct: bool) -> QuestionOption {
        QuestionOption {
            id: 10,
            question_id: 1,
            option_text: "A".to_string(),
            is_correct,
            order_index: 0,
        }
    }

    #[test]
    fn test_grade_correct_option_earns_full_points() {
        let q = question(QuestionType::MultipleChoice, 10);
        assert_eq!(
            grade(&q, Some(&option(true))),
            Grade {
                is_correct: true,
                points_earned: 10
            }
        );
    }

    #[test]
    fn test_grade_wrong_or_missing_option_earns_nothing() {
        let q = question(QuestionType::TrueFalse, 5);
        assert_eq!(grade(&q, Some(&option(false))), Grade::ZERO);
        assert_eq!(grade(&q, None), Grade::ZERO);
    }

    #[test]
    fn test_grade_open_text_is_deferred() {
        let q = question(QuestionType::OpenText, 5);
        assert_eq!(grade(&q, Some(&option(true))), Grade::ZERO);
    }

    #[test]
    fn test_percentage_half() {
        let p = percentage(10, 20);
        assert_eq!(p, Decimal::new(5000, 2));
        assert_eq!(p.to_string(), "50.00");
    }

    #[test]
    fn test_percentage_perfect() {
        assert_eq!(percentage(20, 20).to_string(), "100.00");
    }

    #[test]
    fn test_percentage_thirds_use_four_place_ratio() {
        assert_eq!(percentage(1, 3).to_string(), "33.33");
        assert_eq!(percentage(2, 3).to_string(), "66.67");
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 1/8 = 0.125 exactly; 1/16 = 0.0625 exactly.
        assert_eq!(percentage(1, 8).to_string(), "12.50");
        assert_eq!(percentage(1, 16).to_string(), "6.25");
        // 1/32 = 0.03125 -> 0.0313 at four places.
        assert_eq!(percentage(1, 32).to_string(), "3.13");
    }

    #[test]
    fn test_percentage_zero_max_score() {
        assert_eq!(percentage(0, 0), Decimal::ZERO);
        assert_eq!(percentage(5, 0).to_string(), "0.00");
    }

    #[test]
    fn test_pass_threshold_is_inclusive() {
        assert!(is_passing(Decimal::new(7000, 2), 70));
        assert!(!is_passing(Decimal::new(6999, 2), 70));
        assert!(is_passing(Decimal::new(10000, 2), 100));
    }
}
