//! Conflict diagnostics and solution classification.
//!
//! A [`Conflict`] is derived fresh from each build attempt's raw diagnostics
//! and never survives across grammar generations. Classification compares
//! each proposed solution's token sequence against the conflict's input
//! trace to decide whether it describes left- or right-associative handling.

use crate::build::{ConflictOp, ConflictReport};

/// The parser's position marker inside input traces and solutions.
pub const MARKER: &str = "·";

/// The trailing marker denoting an unbounded continuation of the input trace.
pub const CONTINUATION: &str = "…";

#[derive(Debug)]
pub struct Conflict {
    pub ops: [ConflictOp; 2],
    pub solutions: [Solution; 2],
    pub input_tokens: Vec<String>,
    pub origin: String,
    pub position: Option<usize>,
}

#[derive(Debug)]
pub struct Solution {
    pub op: ConflictOp,
    /// Left-hand side rule name of the proposed reduction.
    pub source: String,
    /// Right-hand side tokens, including a possible `·` marker.
    pub tokens: Vec<String>,
    pub left_overlap: usize,
    pub right_overlap: usize,
    pub is_left: bool,
    pub is_right: bool,
    /// Empty production. Degenerate solutions skip classification entirely.
    pub is_empty: bool,
    /// Canonical parenthesized form, compared against the oracle's output.
    /// `None` when classification was inconclusive.
    pub result_text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("malformed conflict solution (missing `->'): {}", raw)]
    MalformedSolution { raw: String },

    #[error("conflict input trace lost its continuation marker: {}", input)]
    MissingContinuation { input: String },

    #[error("both solutions of a conflict are empty productions: {} / {}", _0, _1)]
    BothSolutionsEmpty(String, String),
}

impl Conflict {
    /// Parse one raw diagnostic. Returns `None` for conflicts the engine
    /// does not support (input trace starting at the position marker).
    pub fn from_report(report: &ConflictReport) -> Result<Option<Self>, ConflictError> {
        let mut input_tokens: Vec<String> = report
            .input
            .trim()
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        // A trace that starts at the marker gives the classifier no prefix
        // to work with; skip rather than mis-classify.
        if input_tokens.first().map(String::as_str) == Some(MARKER) {
            tracing::debug!("skipping conflict with input trace starting at {}", MARKER);
            return Ok(None);
        }

        let mut solutions = Vec::with_capacity(2);
        for (raw, op) in report.solutions.iter().zip(report.ops) {
            solutions.push(Solution::parse(raw, op, &mut input_tokens)?);
        }
        let solutions: [Solution; 2] = match solutions.try_into() {
            Ok(s) => s,
            Err(_) => unreachable!("a conflict report always carries two solutions"),
        };

        if solutions.iter().all(|s| s.is_empty) {
            return Err(ConflictError::BothSolutionsEmpty(
                report.solutions[0].clone(),
                report.solutions[1].clone(),
            ));
        }

        Ok(Some(Self {
            ops: report.ops,
            solutions,
            input_tokens,
            origin: report.origin.clone(),
            position: report.position,
        }))
    }

    pub fn empty_solution_idx(&self) -> Option<usize> {
        self.solutions.iter().position(|s| s.is_empty)
    }
}

impl Solution {
    /// Parse and classify one solution against the current input trace.
    ///
    /// A successful right-side match rewrites the trace's trailing `…` into
    /// the solution's concrete tokens, so classification of the second
    /// solution (and later derivation sampling) sees real tokens.
    fn parse(
        raw: &str,
        op: ConflictOp,
        input_tokens: &mut Vec<String>,
    ) -> Result<Self, ConflictError> {
        let mut tokens: Vec<String> = raw.trim().split_whitespace().map(str::to_owned).collect();
        if tokens.len() < 2 || tokens[1] != "->" {
            return Err(ConflictError::MalformedSolution { raw: raw.into() });
        }
        let source = tokens.remove(0);
        tokens.remove(0); // the arrow

        if tokens.is_empty() {
            return Ok(Self {
                op,
                source,
                tokens,
                left_overlap: 0,
                right_overlap: 0,
                is_left: false,
                is_right: false,
                is_empty: true,
                result_text: None,
            });
        }

        let left_overlap = tokens
            .iter()
            .zip(input_tokens.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let is_left = left_overlap == tokens.len();

        // Right side: the trailing input token is always the unbounded
        // continuation, so slide the solution tail across increasing offsets
        // until 4 consecutive tokens align (3 real ones plus the `·`). This
        // is a heuristic: for long solutions the window can give up without
        // a verdict, in which case the oracle decides.
        let mut right_overlap = 1;
        let mut matched_skip = 0;
        for skip in 1..tokens.len().saturating_sub(1) {
            right_overlap = 1;
            let right_offset =
                input_tokens.len() as isize - tokens.len() as isize - 1 + skip as isize;
            for i in (0..=tokens.len() - 1 - skip).rev() {
                let j = right_offset + i as isize;
                let aligned = j >= 0
                    && (j as usize) < input_tokens.len()
                    && tokens[i] == input_tokens[j as usize];
                if !aligned {
                    break;
                }
                right_overlap += 1;
            }
            if right_overlap == 4 {
                matched_skip = skip;
                break;
            }
        }
        let is_right = right_overlap == 4;

        if is_right {
            if input_tokens.last().map(String::as_str) != Some(CONTINUATION) {
                return Err(ConflictError::MissingContinuation {
                    input: input_tokens.join(" "),
                });
            }
            input_tokens.pop();
            input_tokens.extend(tokens[tokens.len() - matched_skip..].iter().cloned());
        }

        let result_text = match (is_left, is_right) {
            (true, false) => {
                // `(matched tokens) remainder`, the +1 skips the marker.
                let remainder = input_tokens
                    .iter()
                    .skip(tokens.len() + 1)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(format!("({}) {}", tokens.join(" "), remainder))
            }
            (false, true) if tokens.get(1).map(String::as_str) == Some(MARKER) => {
                let prefix = input_tokens[..input_tokens.len().saturating_sub(tokens.len())]
                    .join(" ");
                let mut inner = vec![tokens[0].as_str()];
                inner.extend(tokens[2..].iter().map(String::as_str));
                Some(format!("{} ({})", prefix, inner.join(" ")))
            }
            // Both or neither: inconclusive, escalate to the oracle.
            _ => {
                tracing::debug!(
                    "inconclusive classification (left_overlap={}, right_overlap={}): {}",
                    left_overlap,
                    right_overlap,
                    raw,
                );
                None
            }
        };

        Ok(Self {
            op,
            source,
            tokens,
            left_overlap,
            right_overlap,
            is_left,
            is_right,
            is_empty: false,
            result_text,
        })
    }
}
