//! Random sentence generation from reduced rule expressions.
//!
//! The fuzzer owns every random draw in the engine (repeat lengths, choice
//! branches, code points) behind the [`Randomness`] trait, so tests can
//! substitute a scripted sequence and assert exact outputs. There is no
//! seed-replay contract: callers that need reproducibility capture the
//! emitted string.

use crate::{
    ast::{CharSet, GrammarAst, RepeatKind, Resolved, RuleExpr},
    reduce::ReducedExpr,
};
use rand::{rngs::SmallRng, Rng as _, SeedableRng as _};

/// Upper bound for random repeat expansion. Larger values raise the risk of
/// samples the reference parser rejects; smaller ones under-exercise
/// repetition.
pub const MAX_REPEAT: usize = 2;

/// Source of uniform draws.
pub trait Randomness {
    /// A uniform draw in `0..bound`. `bound` is always at least 1.
    fn pick(&mut self, bound: usize) -> usize;
}

impl<R: Randomness + ?Sized> Randomness for &mut R {
    fn pick(&mut self, bound: usize) -> usize {
        (**self).pick(bound)
    }
}

/// The default source, seeded from OS entropy.
#[derive(Debug)]
pub struct Entropy {
    rng: SmallRng,
}

impl Entropy {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Default for Entropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Randomness for Entropy {
    fn pick(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound)
    }
}

/// A deterministic sequence of draws, for tests. Each draw is taken modulo
/// the requested bound; an exhausted script keeps yielding 0.
#[derive(Debug, Default)]
pub struct Scripted {
    draws: std::collections::VecDeque<usize>,
}

impl Scripted {
    pub fn new(draws: impl IntoIterator<Item = usize>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
        }
    }
}

impl Randomness for Scripted {
    fn pick(&mut self, bound: usize) -> usize {
        self.draws.pop_front().map_or(0, |d| d % bound)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("not found rule or token by name `{}'\n{}", name, known)]
    Unresolved { name: String, known: String },

    #[error("cannot sample an empty character set")]
    EmptyCharSet,
}

/// Generate one concrete sentence from a fully reduced expression.
pub fn sentence(
    grammar: &GrammarAst,
    reduced: &ReducedExpr,
    rng: &mut dyn Randomness,
) -> Result<String, FuzzError> {
    let mut out = String::new();
    gen_reduced(grammar, reduced, rng, &mut out)?;
    Ok(out)
}

fn gen_reduced(
    grammar: &GrammarAst,
    reduced: &ReducedExpr,
    rng: &mut dyn Randomness,
    out: &mut String,
) -> Result<(), FuzzError> {
    match reduced {
        ReducedExpr::Literal(text) => out.push_str(text),
        ReducedExpr::CharSet(set) => out.push(sample_char(set, rng)?),
        ReducedExpr::Token { body, .. } => {
            // whitespace keeps adjacent tokens lexically separated
            out.push(' ');
            gen_expr(grammar, body, rng, out)?;
            out.push(' ');
        }
        ReducedExpr::Sequence(items) => {
            for item in items {
                gen_reduced(grammar, item, rng, out)?;
            }
        }
    }
    Ok(())
}

/// Generate from an *unreduced* expression, resolving names on the fly.
/// Token bodies stay unreduced (see [`ReducedExpr::Token`]), so this walks
/// the full expression grammar.
pub fn gen_expr(
    grammar: &GrammarAst,
    expr: &RuleExpr,
    rng: &mut dyn Randomness,
    out: &mut String,
) -> Result<(), FuzzError> {
    match expr {
        RuleExpr::Literal(text) => out.push_str(text),
        RuleExpr::CharSet(set) => out.push(sample_char(set, rng)?),
        RuleExpr::Sequence(items) => {
            for item in items {
                gen_expr(grammar, item, rng, out)?;
            }
        }
        RuleExpr::Choice(items) => {
            let idx = rng.pick(items.len().max(1));
            if let Some(item) = items.get(idx) {
                gen_expr(grammar, item, rng, out)?;
            }
        }
        RuleExpr::Repeat { expr, kind } => {
            let length = repeat_length(*kind, rng);
            for _ in 0..length {
                gen_expr(grammar, expr, rng, out)?;
            }
        }
        RuleExpr::Name(name) => match grammar.resolve(name) {
            Some(Resolved::Rule(body)) => gen_expr(grammar, body, rng, out)?,
            Some(Resolved::Token(body)) => {
                out.push(' ');
                gen_expr(grammar, body, rng, out)?;
                out.push(' ');
            }
            None => {
                return Err(FuzzError::Unresolved {
                    name: name.clone(),
                    known: grammar.known_names(),
                })
            }
        },
    }
    Ok(())
}

pub(crate) fn repeat_length(kind: RepeatKind, rng: &mut dyn Randomness) -> usize {
    match kind {
        RepeatKind::Optional => rng.pick(2),
        RepeatKind::ZeroOrMore => rng.pick(MAX_REPEAT + 1),
        RepeatKind::OneOrMore => 1 + rng.pick(MAX_REPEAT),
    }
}

fn sample_char(set: &CharSet, rng: &mut dyn Randomness) -> Result<char, FuzzError> {
    let ranges = set.sample_ranges();
    if ranges.is_empty() {
        return Err(FuzzError::EmptyCharSet);
    }
    let (lo, hi) = ranges[rng.pick(ranges.len())];
    debug_assert!(hi > lo);
    // upper bound is exclusive
    let code = lo + rng.pick((hi - lo) as usize) as u32;
    Ok(char::from_u32(code).unwrap_or('\u{FFFD}'))
}
