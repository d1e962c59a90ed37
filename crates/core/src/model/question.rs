use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{QuestionId, TestId};

//
// ─── GRADE ─────────────────────────────────────────────────────────────────────
//

/// Grade/track an assessment sequence belongs to (0 = kindergarten).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grade(u8);

impl Grade {
    #[must_use]
    pub fn new(grade: u8) -> Self {
        Self(grade)
    }

    #[must_use]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── RAW ANSWERS ───────────────────────────────────────────────────────────────
//

/// Heterogeneous answer payload as submitted by clients.
///
/// Clients send whatever their widget produced: a letter, an option label,
/// a number, a one-element list, or nothing at all. The normalizer reduces
/// all of these to one comparable canonical string.
///
/// Serialized untagged so a JSON payload of `"b"`, `2`, `["b"]` or `null`
/// all deserialize without a wrapper object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum RawAnswer {
    Number(f64),
    Text(String),
    List(Vec<RawAnswer>),
    #[default]
    Empty,
}

impl RawAnswer {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// One question as provided by the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// Canonical correct answer as authored (letter, phrase, or numeral).
    pub correct_answer: String,
    /// Section the question belongs to when the assessment is partitioned.
    pub section: Option<String>,
    pub points: u32,
}

impl Question {
    #[must_use]
    pub fn new(id: QuestionId, correct_answer: impl Into<String>) -> Self {
        Self {
            id,
            correct_answer: correct_answer.into(),
            section: None,
            points: 1,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }
}

/// The full set of questions for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    test_id: TestId,
    questions: Vec<Question>,
}

impl QuestionBank {
    #[must_use]
    pub fn new(test_id: TestId, questions: Vec<Question>) -> Self {
        Self { test_id, questions }
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

//
// ─── TEST METADATA ─────────────────────────────────────────────────────────────
//

/// Per-assessment metadata from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMeta {
    pub test_id: TestId,
    pub grade: Grade,
    /// Category/subject bucket used for analytics rollups.
    pub category: String,
    /// Minimum percentage for the test to count as "mastered".
    ///
    /// Mastery is tracked on the score report only; it does not gate
    /// unlocking the next test in the sequence.
    pub mastery_threshold: u32,
}

impl TestMeta {
    #[must_use]
    pub fn new(test_id: TestId, grade: Grade, category: impl Into<String>) -> Self {
        Self {
            test_id,
            grade,
            category: category.into(),
            mastery_threshold: 80,
        }
    }

    #[must_use]
    pub fn with_mastery_threshold(mut self, threshold: u32) -> Self {
        self.mastery_threshold = threshold;
        self
    }
}

//
// ─── PROGRESSION SEQUENCE ──────────────────────────────────────────────────────
//

/// Ordered chain of assessments within a grade/track controlling unlock order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSequence {
    grade: Grade,
    test_ids: Vec<TestId>,
}

impl ProgressionSequence {
    #[must_use]
    pub fn new(grade: Grade, test_ids: Vec<TestId>) -> Self {
        Self { grade, test_ids }
    }

    #[must_use]
    pub fn grade(&self) -> Grade {
        self.grade
    }

    #[must_use]
    pub fn test_ids(&self) -> &[TestId] {
        &self.test_ids
    }

    /// Zero-based position of a test within the sequence.
    #[must_use]
    pub fn position_of(&self, test_id: TestId) -> Option<usize> {
        self.test_ids.iter().position(|&t| t == test_id)
    }

    /// Immediate predecessor in unlock order, `None` for the first test.
    #[must_use]
    pub fn predecessor_of(&self, test_id: TestId) -> Option<TestId> {
        match self.position_of(test_id) {
            Some(0) | None => None,
            Some(idx) => Some(self.test_ids[idx - 1]),
        }
    }

    /// Immediate successor in unlock order, `None` for the last test.
    #[must_use]
    pub fn successor_of(&self, test_id: TestId) -> Option<TestId> {
        let idx = self.position_of(test_id)?;
        self.test_ids.get(idx + 1).copied()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
