//! Canonicalizes heterogeneous raw answer payloads for comparison.
//!
//! Clients submit answers as letters, option phrases, numerals, numbers, or
//! one-element lists depending on the widget that produced them. Scoring
//! compares everything through [`normalize`] and [`matches`] so the rest of
//! the engine never sees the raw shapes.

use crate::model::RawAnswer;

/// Absolute tolerance for free-response numeric answers.
const NUMERIC_TOLERANCE: f64 = 0.001;

/// Reduces a raw answer to its canonical comparable string.
///
/// - absent answers become the empty string;
/// - lists contribute only their first element;
/// - text is trimmed and lowercased;
/// - a single embedded letter a-d (as in "option a") reduces to that letter;
/// - a bare numeral 0-3 maps to the corresponding letter (0→a … 3→d).
#[must_use]
pub fn normalize(raw: &RawAnswer) -> String {
    match raw {
        RawAnswer::Empty => String::new(),
        RawAnswer::List(items) => items.first().map_or_else(String::new, normalize),
        RawAnswer::Number(n) => normalize_text(&render_number(*n)),
        RawAnswer::Text(s) => normalize_text(s),
    }
}

/// Compares a learner's answer against the authored correct answer.
///
/// Normalized forms are compared first; on mismatch both sides are given a
/// numeric interpretation and accepted within an absolute tolerance of
/// 0.001. No other equivalence rule is applied.
#[must_use]
pub fn matches(user: &RawAnswer, correct: &str) -> bool {
    let user_norm = normalize(user);
    let correct_norm = normalize_text(correct);
    if user_norm == correct_norm {
        return true;
    }
    match (user_norm.parse::<f64>(), correct_norm.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() <= NUMERIC_TOLERANCE,
        _ => false,
    }
}

fn normalize_text(s: &str) -> String {
    let cleaned = s.trim().to_lowercase();
    if cleaned.is_empty() {
        return cleaned;
    }

    if let Some(letter) = as_choice_letter(&cleaned) {
        return letter.to_string();
    }

    // Bare numeral 0-3 follows the multiple-choice index convention.
    if let Ok(index) = cleaned.parse::<u32>() {
        if let Some(letter) = index_to_letter(index) {
            return letter.to_string();
        }
    }

    // A single letter embedded in a phrase ("option a", "answer: c").
    for token in cleaned.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if let Some(letter) = as_choice_letter(token) {
            return letter.to_string();
        }
    }

    cleaned
}

fn as_choice_letter(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'a'..='d'), None) => Some(c),
        _ => None,
    }
}

fn index_to_letter(index: u32) -> Option<char> {
    match index {
        0 => Some('a'),
        1 => Some('b'),
        2 => Some('c'),
        3 => Some('d'),
        _ => None,
    }
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
