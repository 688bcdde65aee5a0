//! Rule expression reduction.
//!
//! Collapses a named rule's expression tree into one built only from
//! terminal-shaped nodes, so the fuzzer never resolves rule names at
//! generation time. Reduction runs under an increasing depth budget to
//! guarantee termination on recursive rules: each attempt starts from the
//! immutable input tree and produces a fresh reduced copy, so repeated
//! reductions of the same rule never interfere.

use crate::{
    ast::{CharSet, GrammarAst, Resolved, RuleExpr},
    fuzz::{repeat_length, Randomness},
};

/// Retry ceiling for the depth budget. Reaching it means the rule cannot be
/// grounded in terminals (or the grammar is degenerate), which is fatal.
pub const DEPTH_CEILING: usize = 100;

/// A fully reduced expression. Token bodies are kept unreduced on purpose:
/// the fuzzer samples them lazily, resolving names as it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducedExpr {
    Literal(String),
    CharSet(CharSet),
    Token { name: String, body: RuleExpr },
    Sequence(Vec<ReducedExpr>),
}

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("not found rule or token by name `{}'\n{}", name, known)]
    Unresolved { name: String, known: String },

    #[error(
        "rule tree not reduced within depth {}:\n{}",
        DEPTH_CEILING,
        dump
    )]
    DepthCeiling { dump: String },
}

// attempt-internal failure: out of depth budget, retry with a larger one
struct OutOfDepth;

enum AttemptError {
    Depth(OutOfDepth),
    Fatal(ReduceError),
}

impl From<OutOfDepth> for AttemptError {
    fn from(v: OutOfDepth) -> Self {
        Self::Depth(v)
    }
}

/// Reduce the body of the named rule or token.
pub fn reduce_rule(
    grammar: &GrammarAst,
    name: &str,
    rng: &mut dyn Randomness,
) -> Result<ReducedExpr, ReduceError> {
    let expr = match grammar.resolve(name) {
        Some(Resolved::Rule(expr)) | Some(Resolved::Token(expr)) => expr,
        None => {
            return Err(ReduceError::Unresolved {
                name: name.into(),
                known: grammar.known_names(),
            })
        }
    };
    reduce_expr(grammar, expr, rng)
}

/// Reduce an expression under an increasing depth budget.
///
/// Repeat nodes expand into a random number of copies per attempt, so two
/// attempts over the same input can legitimately differ in shape.
pub fn reduce_expr(
    grammar: &GrammarAst,
    expr: &RuleExpr,
    rng: &mut dyn Randomness,
) -> Result<ReducedExpr, ReduceError> {
    for max_depth in 1..=DEPTH_CEILING {
        match attempt(grammar, expr, 0, max_depth, rng) {
            Ok(reduced) => {
                tracing::trace!("reduced rule tree within depth {}", max_depth);
                return Ok(reduced);
            }
            Err(AttemptError::Depth(OutOfDepth)) => continue,
            Err(AttemptError::Fatal(err)) => return Err(err),
        }
    }
    Err(ReduceError::DepthCeiling {
        dump: expr.display_tree().to_string(),
    })
}

fn attempt(
    grammar: &GrammarAst,
    expr: &RuleExpr,
    depth: usize,
    max_depth: usize,
    rng: &mut dyn Randomness,
) -> Result<ReducedExpr, AttemptError> {
    match expr {
        RuleExpr::Literal(text) => Ok(ReducedExpr::Literal(text.clone())),
        RuleExpr::CharSet(set) => Ok(ReducedExpr::CharSet(set.clone())),

        RuleExpr::Name(name) => {
            if depth >= max_depth {
                return Err(OutOfDepth.into());
            }
            match grammar.resolve(name) {
                // rules take priority over same-named tokens
                Some(Resolved::Rule(body)) => attempt(grammar, body, depth + 1, max_depth, rng),
                Some(Resolved::Token(body)) => Ok(ReducedExpr::Token {
                    name: name.clone(),
                    body: body.clone(),
                }),
                None => Err(AttemptError::Fatal(ReduceError::Unresolved {
                    name: name.clone(),
                    known: grammar.known_names(),
                })),
            }
        }

        RuleExpr::Choice(items) => {
            if depth >= max_depth {
                return Err(OutOfDepth.into());
            }
            // fixed choice: the first branch that grounds out wins; the
            // fuzzer reintroduces randomness separately
            for item in items {
                match attempt(grammar, item, depth + 1, max_depth, rng) {
                    Ok(reduced) => return Ok(reduced),
                    Err(AttemptError::Depth(OutOfDepth)) => continue,
                    Err(fatal @ AttemptError::Fatal(_)) => return Err(fatal),
                }
            }
            Err(OutOfDepth.into())
        }

        RuleExpr::Sequence(items) => {
            if depth >= max_depth {
                return Err(OutOfDepth.into());
            }
            let mut reduced = Vec::with_capacity(items.len());
            for item in items {
                reduced.push(attempt(grammar, item, depth + 1, max_depth, rng)?);
            }
            Ok(ReducedExpr::Sequence(reduced))
        }

        RuleExpr::Repeat { expr, kind } => {
            if depth >= max_depth {
                return Err(OutOfDepth.into());
            }
            let length = repeat_length(*kind, rng);
            let mut reduced = Vec::with_capacity(length);
            for _ in 0..length {
                reduced.push(attempt(grammar, expr, depth + 1, max_depth, rng)?);
            }
            Ok(ReducedExpr::Sequence(reduced))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RepeatKind;
    use crate::fuzz::Scripted;

    #[test]
    fn literal_reduces_to_itself() {
        let g = GrammarAst::default();
        let reduced =
            reduce_expr(&g, &RuleExpr::literal("x"), &mut Scripted::default()).unwrap();
        assert_eq!(reduced, ReducedExpr::Literal("x".into()));
    }

    #[test]
    fn recursive_choice_grounds_out_on_terminal_branch() {
        let mut g = GrammarAst::default();
        g.add_token("INT", RuleExpr::CharSet(CharSet::new(vec![(48, 58)])))
            .unwrap();
        g.add_rule(
            "expr",
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::name("expr"),
                    RuleExpr::literal("+"),
                    RuleExpr::name("expr"),
                ]),
                RuleExpr::name("INT"),
            ]),
        )
        .unwrap();

        let reduced = reduce_rule(&g, "expr", &mut Scripted::default()).unwrap();
        assert!(matches!(reduced, ReducedExpr::Token { ref name, .. } if name == "INT"));
    }

    #[test]
    fn self_referential_rule_hits_the_ceiling() {
        let mut g = GrammarAst::default();
        g.add_rule("a", RuleExpr::name("a")).unwrap();
        let err = reduce_rule(&g, "a", &mut Scripted::default()).unwrap_err();
        assert!(matches!(err, ReduceError::DepthCeiling { .. }));
        assert!(err.to_string().contains("Name a"));
    }

    #[test]
    fn unresolved_reference_is_fatal_and_lists_names() {
        let mut g = GrammarAst::default();
        g.add_rule("expr", RuleExpr::name("nothere")).unwrap();
        g.add_token("INT", RuleExpr::literal("0")).unwrap();
        let err = reduce_rule(&g, "expr", &mut Scripted::default()).unwrap_err();
        match err {
            ReduceError::Unresolved { name, known } => {
                assert_eq!(name, "nothere");
                assert!(known.contains("expr"));
                assert!(known.contains("INT"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn repeat_expands_to_scripted_length() {
        let g = GrammarAst::default();
        let expr = RuleExpr::repeat(RuleExpr::literal("x"), RepeatKind::ZeroOrMore);
        let reduced = reduce_expr(&g, &expr, &mut Scripted::new([2])).unwrap();
        assert_eq!(
            reduced,
            ReducedExpr::Sequence(vec![
                ReducedExpr::Literal("x".into()),
                ReducedExpr::Literal("x".into()),
            ])
        );
    }

    #[test]
    fn rules_take_priority_over_tokens() {
        let mut g = GrammarAst::default();
        g.add_token("word", RuleExpr::literal("t")).unwrap();
        g.add_rule("word", RuleExpr::literal("r")).unwrap();
        let reduced = reduce_rule(&g, "word", &mut Scripted::default()).unwrap();
        assert_eq!(reduced, ReducedExpr::Literal("r".into()));
    }
}
