//! Fuzzy subsequence matching for the pod picker.
//!
//! Scores are "lower is better". A query matches a label when its characters
//! appear in the label in order. Contiguous runs and runs starting on a word
//! boundary pull the score down; gaps and a late start push it up.

use std::cmp::Ordering;

const BOUNDARY_BONUS: f64 = 8.0;
const CONSECUTIVE_BONUS: f64 = 12.0;
const GAP_OPEN_PENALTY: f64 = 3.0;
const GAP_CHAR_PENALTY: f64 = 1.0;
const LEADING_CHAR_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    pub matches: bool,
    pub score: f64,
}

impl FuzzyMatch {
    const MISS: Self = Self {
        matches: false,
        score: 0.0,
    };
}

/// Case-insensitive unless the query carries an uppercase character.
///
/// Scores the best alignment of the query over the text, not the leftmost
/// one. A contiguous run always beats the same characters scattered across
/// word boundaries.
pub fn fuzzy_match(query: &str, text: &str) -> FuzzyMatch {
    let case_sensitive = query.chars().any(char::is_uppercase);
    let (query, text) = if case_sensitive {
        (query.to_string(), text.to_string())
    } else {
        (query.to_lowercase(), text.to_lowercase())
    };

    if query.is_empty() {
        return FuzzyMatch {
            matches: true,
            score: 0.0,
        };
    }

    let text_chars: Vec<char> = text.chars().collect();
    let query_chars: Vec<char> = query.chars().collect();
    if query_chars.len() > text_chars.len() {
        return FuzzyMatch::MISS;
    }

    // best[i]: lowest score with the current query char matched at text[i].
    let mut best = vec![f64::INFINITY; text_chars.len()];
    for (i, ch) in text_chars.iter().enumerate() {
        if *ch == query_chars[0] {
            best[i] = (i as f64) * LEADING_CHAR_PENALTY - boundary_bonus(&text_chars, i);
        }
    }

    for query_char in &query_chars[1..] {
        let mut next = vec![f64::INFINITY; text_chars.len()];
        for (i, ch) in text_chars.iter().enumerate() {
            if ch != query_char {
                continue;
            }
            for (last, previous) in best.iter().enumerate().take(i) {
                if !previous.is_finite() {
                    continue;
                }
                let step = if last + 1 == i {
                    -CONSECUTIVE_BONUS
                } else {
                    GAP_OPEN_PENALTY + ((i - last - 1) as f64) * GAP_CHAR_PENALTY
                        - boundary_bonus(&text_chars, i)
                };
                next[i] = next[i].min(previous + step);
            }
        }
        best = next;
    }

    let score = best.into_iter().fold(f64::INFINITY, f64::min);
    if !score.is_finite() {
        return FuzzyMatch::MISS;
    }

    FuzzyMatch {
        matches: true,
        score,
    }
}

fn boundary_bonus(text: &[char], index: usize) -> f64 {
    if index == 0 || is_separator(text[index - 1]) {
        BOUNDARY_BONUS
    } else {
        0.0
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '-' | '_' | '.' | '/' | ':')
}

/// Ranks `labels` against `query` and returns the indices of matching labels,
/// best first. Every whitespace-separated token must match; token scores add
/// up. Equal scores keep their original order, so the result depends only on
/// the inputs.
pub fn rank<S>(labels: &[S], query: &str) -> Vec<usize>
where
    S: AsRef<str>,
{
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return (0..labels.len()).collect();
    }

    let mut scored: Vec<(usize, f64)> = Vec::new();
    for (index, label) in labels.iter().enumerate() {
        let mut total_score = 0.0f64;
        let mut all_match = true;

        for token in &tokens {
            let matched = fuzzy_match(token, label.as_ref());
            if !matched.matches {
                all_match = false;
                break;
            }
            total_score += matched.score;
        }

        if all_match {
            scored.push((index, total_score));
        }
    }

    scored.sort_by(|left, right| {
        left.1
            .partial_cmp(&right.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.0.cmp(&right.0))
    });
    scored.into_iter().map(|(index, _)| index).collect()
}
