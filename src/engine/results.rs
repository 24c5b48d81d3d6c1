// src/engine/results.rs

//! Per-question breakdown of a finished attempt. Reads only.

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, UserAnswer},
        evaluation::{Question, QuestionOption},
        result::{AttemptResult, OptionResult, QuestionResult},
    },
    store::StoreTx,
};

/// An answer joined with its question and the question's options.
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub answer: UserAnswer,
    pub question: Question,
    pub options: Vec<QuestionOption>,
}

/// Loads everything the breakdown needs and assembles it.
pub async fn build_attempt_result(
    tx: &mut dyn StoreTx,
    attempt: &Attempt,
) -> Result<AttemptResult, AppError> {
    let evaluation = tx
        .find_evaluation(attempt.evaluation_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Evaluation {} not found", attempt.evaluation_id))
        })?;

    let certificate_code = tx
        .find_certificate_by_attempt(attempt.id)
        .await?
        .map(|c| c.certificate_code);

    let answers = tx.list_answers(attempt.id).await?;
    let mut answered = Vec::with_capacity(answers.len());
    for answer in answers {
        let question = tx
            .find_question(answer.question_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Question {} not found", answer.question_id)))?;
        let options = tx.list_options(question.id).await?;
        answered.push(AnsweredQuestion {
            answer,
            question,
            options,
        });
    }

    Ok(assemble(attempt, &evaluation.title, certificate_code, answered))
}

pub fn assemble(
    attempt: &Attempt,
    evaluation_title: &str,
    certificate_code: Option<String>,
    answered: Vec<AnsweredQuestion>,
) -> AttemptResult {
    let total_questions = answered.len();
    let correct_answers = answered.iter().filter(|a| a.answer.is_correct).count();

    AttemptResult {
        attempt_id: attempt.id,
        evaluation_title: evaluation_title.to_string(),
        attempt_number: attempt.attempt_number,
        started_at: attempt.started_at,
        completed_at: attempt.completed_at,
        time_spent_minutes: attempt.time_spent_minutes,
        score: attempt.score,
        max_score: attempt.max_score,
        percentage: attempt.percentage,
        passed: attempt.passed,
        certified: attempt.certified,
        certificate_code,
        total_questions,
        correct_answers,
        incorrect_answers: total_questions - correct_answers,
        question_results: answered.into_iter().map(question_result).collect(),
    }
}

fn question_result(item: AnsweredQuestion) -> QuestionResult {
    let AnsweredQuestion {
        answer,
        question,
        mut options,
    } = item;
    options.sort_by_key(|o| (o.order_index, o.id));

    let selected = answer
        .selected_option_id
        .and_then(|id| options.iter().find(|o| o.id == id));
    let user_answer = match selected {
        Some(option) => Some(option.option_text.clone()),
        None => answer.text_answer.clone(),
    };

    let correct_answer = options
        .iter()
        .find(|o| o.is_correct)
        .map(|o| o.option_text.clone())
        .unwrap_or_default();

    let options = options
        .into_iter()
        .map(|o| OptionResult {
            was_selected: answer.selected_option_id == Some(o.id),
            option_id: o.id,
            option_text: o.option_text,
            is_correct: o.is_correct,
        })
        .collect();

    QuestionResult {
        question_id: question.id,
        question_text: question.question_text,
        question_type: question.question_type,
        points: question.points,
        is_correct: answer.is_correct,
        points_earned: answer.points_earned,
        user_answer,
        correct_answer,
        explanation: question.explanation,
        options,
    }
}
