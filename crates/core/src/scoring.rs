//! Deterministic scoring of a finished attempt against its question bank.
//!
//! Scoring is a pure fold over the bank: identical inputs always produce
//! identical reports, which is what makes submission retries safe.

use serde::{Deserialize, Serialize};

use crate::model::{Attempt, QuestionBank, QuestionId, RawAnswer};
use crate::normalizer;

//
// ─── REPORT ────────────────────────────────────────────────────────────────────
//

/// Correctness of a single question within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub correct: bool,
    /// Whether the learner submitted anything for this question.
    pub answered: bool,
}

/// Correct/attempted subtotal for one section of a partitioned assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: String,
    pub correct: u32,
    pub attempted: u32,
    pub total: u32,
}

/// Scored result of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub correct_count: u32,
    pub total_questions: u32,
    /// `round(correct / total × 100)`; zero questions score 0 without error.
    pub percentage: u32,
    /// Point-weighted totals for display; the percentage counts questions,
    /// not points.
    pub points_earned: u32,
    pub points_possible: u32,
    /// Whether the percentage met the test's mastery threshold. Tracked
    /// separately from completion and never consulted for unlocking.
    pub mastered: bool,
    pub sections: Vec<SectionScore>,
    pub outcomes: Vec<QuestionOutcome>,
}

impl ScoreReport {
    /// Report for an attempt with no questions (valid, scores 0%).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            correct_count: 0,
            total_questions: 0,
            percentage: 0,
            points_earned: 0,
            points_possible: 0,
            mastered: false,
            sections: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Correctness recorded for a question, if it was in scope.
    #[must_use]
    pub fn correctness_of(&self, question_id: QuestionId) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|o| o.question_id == question_id)
            .map(|o| o.correct)
    }

    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.total_questions > 0 && self.correct_count == self.total_questions
    }
}

//
// ─── SCORING ───────────────────────────────────────────────────────────────────
//

/// Scores an attempt against its question bank.
///
/// Every question in the bank is in scope; an absent answer counts as
/// unanswered and incorrect. `mastery_threshold` is the test's minimum
/// percentage for the mastered flag.
#[must_use]
pub fn score(attempt: &Attempt, bank: &QuestionBank, mastery_threshold: u32) -> ScoreReport {
    let mut correct_count = 0u32;
    let mut points_earned = 0u32;
    let mut points_possible = 0u32;
    let mut outcomes = Vec::with_capacity(bank.len());
    let mut sections: Vec<SectionScore> = Vec::new();

    for question in bank.questions() {
        let submitted = attempt.answer_for(question.id);
        // Attemptedness follows the canonical form: whitespace or an empty
        // payload is no answer.
        let answered = submitted.is_some_and(|a| !normalizer::normalize(a).is_empty());
        let correct = submitted
            .is_some_and(|answer| normalizer::matches(answer, &question.correct_answer));
        points_possible += question.points;
        if correct {
            correct_count += 1;
            points_earned += question.points;
        }
        outcomes.push(QuestionOutcome {
            question_id: question.id,
            correct,
            answered,
        });

        if let Some(name) = &question.section {
            let idx = match sections.iter().position(|s| &s.section == name) {
                Some(idx) => idx,
                None => {
                    sections.push(SectionScore {
                        section: name.clone(),
                        correct: 0,
                        attempted: 0,
                        total: 0,
                    });
                    sections.len() - 1
                }
            };
            let entry = &mut sections[idx];
            entry.total += 1;
            if answered {
                entry.attempted += 1;
            }
            if correct {
                entry.correct += 1;
            }
        }
    }

    let total_questions = bank.len() as u32;
    let percentage = percentage(correct_count, total_questions);

    ScoreReport {
        correct_count,
        total_questions,
        percentage,
        points_earned,
        points_possible,
        mastered: total_questions > 0 && percentage >= mastery_threshold,
        sections,
        outcomes,
    }
}

/// Rounded percentage with a zero-total guard.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        ((f64::from(correct) * 100.0) / f64::from(total)).round() as u32
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
