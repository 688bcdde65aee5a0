//! Sampling-based oracle comparison.
//!
//! The derivation trees reconstructed from a conflict's origin trace are
//! turned into concrete sample inputs, parsed with the reference engine, and
//! the canonicalized reference tree is matched against the classified
//! solutions. The derivation tree itself may encode the wrong associativity;
//! that is fine, because only the flattened token text is sampled from it;
//! the tree *shape* ground truth comes from the reference parse.

use crate::{
    ast::GrammarAst,
    conflict::{Conflict, Solution},
    engine::{EngineError, OracleNode, ReferenceEngine},
    fuzz::{self, FuzzError, Randomness},
    origin::DerivationNode,
    reduce::{self, ReduceError},
};

/// Samples attempted per derivation tree before giving up. The reference
/// parser may reject individual samples (fuzzer imprecision); that is
/// tolerated, not fatal.
pub const MAX_SAMPLES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    Fuzz(#[from] FuzzError),

    #[error("unreadable literal in derivation leaf: {}", name)]
    BadLiteral { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Produce one concrete input exercising the derivation: every leaf is
/// replaced by a freshly fuzzed sample for its rule/token name (or by the
/// literal itself), and the pieces are concatenated.
pub fn sample(
    grammar: &GrammarAst,
    node: &DerivationNode,
    rng: &mut dyn Randomness,
) -> Result<String, SampleError> {
    if !node.children.is_empty() {
        let mut out = String::new();
        for child in &node.children {
            out.push_str(&sample(grammar, child, rng)?);
        }
        return Ok(out);
    }

    if node.name.starts_with('"') {
        return unquote(&node.name).ok_or_else(|| SampleError::BadLiteral {
            name: node.name.clone(),
        });
    }

    // leaf names may carry a quantifier, e.g. `specialCharacter+`
    let name = node
        .name
        .strip_suffix(&['+', '*', '?'][..])
        .unwrap_or(&node.name);
    let reduced = reduce::reduce_rule(grammar, name, rng)?;
    Ok(fuzz::sentence(grammar, &reduced, rng)?)
}

fn unquote(name: &str) -> Option<String> {
    let inner = name.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Canonicalize a reference parse tree into a flat parenthesized string.
/// Rule nodes with exactly one terminal child fold to just the rule name;
/// the root carries no parens; terminal text renders quoted.
pub fn canonical(node: &OracleNode) -> String {
    fmt_node(node, false)
}

fn fmt_node(node: &OracleNode, in_tree: bool) -> String {
    match node {
        OracleNode::Rule { name, children } => {
            let name = name.strip_suffix("Context").unwrap_or(name);
            match &children[..] {
                [] => name.to_owned(),
                [OracleNode::Token { .. }] => name.to_owned(),
                children => {
                    let body = children
                        .iter()
                        .map(|child| fmt_node(child, true))
                        .collect::<Vec<_>>()
                        .join(" ");
                    if in_tree {
                        format!("({})", body)
                    } else {
                        body
                    }
                }
            }
        }
        OracleNode::Token { text } => format!("{:?}", text),
    }
}

/// Match a canonical reference string against the classified solutions.
/// Case-insensitive; the reference text must be a prefix of the solution's
/// canonical form, or equal it after wrapping with the end-of-input
/// sentinel.
pub fn match_solution(solutions: &[Solution; 2], expected: &str) -> Option<usize> {
    let expected = expected.to_lowercase();
    solutions.iter().position(|solution| {
        solution.result_text.as_ref().is_some_and(|text| {
            let text = text.to_lowercase();
            text.starts_with(&expected) || format!("({}) \"<eof>\"", text) == expected
        })
    })
}

/// Pick the correct solution by example. Returns the matching solution's
/// index, or `None` when no sample of any derivation tree matched (the
/// caller then falls back to brute-force candidate testing).
pub fn resolve_by_example(
    grammar: &GrammarAst,
    conflict: &Conflict,
    trees: &[DerivationNode],
    mut engine: impl ReferenceEngine,
    rng: &mut dyn Randomness,
) -> Result<Option<usize>, OracleError> {
    if trees.len() > 1 {
        tracing::debug!("comparing {} divergent derivation trees", trees.len());
    }
    for tree in trees {
        for attempt in 0..MAX_SAMPLES {
            let sample = sample(grammar, tree, rng)?;
            tracing::debug!("origin sample {}: {:?}", attempt, sample);

            let parsed = match engine.parse_sample(&sample) {
                Ok(tree) => tree,
                Err(EngineError::NoViableAlternative { .. }) => continue,
                Err(err) => return Err(err.into()),
            };

            let expected = canonical(&parsed);
            tracing::debug!(
                "sample {}: expected {:?}, solutions {:?} / {:?}",
                attempt,
                expected,
                conflict.solutions[0].result_text,
                conflict.solutions[1].result_text,
            );
            if let Some(idx) = match_solution(&conflict.solutions, &expected) {
                tracing::debug!("origin sample {}: using solution {}", attempt, idx + 1);
                return Ok(Some(idx));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CharSet, RuleExpr};
    use crate::build::{ConflictOp, ConflictReport};
    use crate::fuzz::Scripted;

    fn rule(name: &str, children: Vec<OracleNode>) -> OracleNode {
        OracleNode::Rule {
            name: name.into(),
            children,
        }
    }

    fn token(text: &str) -> OracleNode {
        OracleNode::Token { text: text.into() }
    }

    #[test]
    fn canonical_folds_trivial_wrappers_and_skips_root_parens() {
        let tree = rule(
            "eContext",
            vec![
                rule("eContext", vec![token("1")]),
                token("="),
                rule(
                    "eContext",
                    vec![
                        rule("eContext", vec![token("2")]),
                        token("="),
                        rule("eContext", vec![token("3")]),
                    ],
                ),
            ],
        );
        assert_eq!(canonical(&tree), "e \"=\" (e \"=\" e)");
    }

    #[test]
    fn match_accepts_prefix_and_eof_sentinel() {
        let conflict = Conflict::from_report(&ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["e -> e \"=\" e".into(), "e -> e · \"=\" e".into()],
            input: "e \"=\" e · \"=\" …".into(),
            origin: String::new(),
            position: Some(0),
        })
        .unwrap()
        .unwrap();

        assert_eq!(
            match_solution(&conflict.solutions, "e \"=\" (e \"=\" e)"),
            Some(1)
        );
        // prefix of the left solution's canonical form
        assert_eq!(match_solution(&conflict.solutions, "(e \"=\" e)"), Some(0));
        assert_eq!(match_solution(&conflict.solutions, "something else"), None);
    }

    #[test]
    fn sample_concatenates_leaves() {
        let mut g = GrammarAst::default();
        g.add_token("INT", RuleExpr::CharSet(CharSet::new(vec![(48, 58)])))
            .unwrap();
        g.add_rule(
            "e",
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::name("e"),
                    RuleExpr::literal("="),
                    RuleExpr::name("e"),
                ]),
                RuleExpr::name("INT"),
            ]),
        )
        .unwrap();

        let tree = DerivationNode {
            name: "e".into(),
            children: vec![
                DerivationNode::new("e"),
                DerivationNode::new("\"=\""),
                DerivationNode::new("e"),
            ],
        };
        let out = sample(&g, &tree, &mut Scripted::default()).unwrap();
        assert_eq!(out, " 0 = 0 ");
    }

    #[test]
    fn quantifier_suffix_is_stripped() {
        let mut g = GrammarAst::default();
        g.add_token("word", RuleExpr::literal("w")).unwrap();
        let out = sample(&g, &DerivationNode::new("word+"), &mut Scripted::default()).unwrap();
        assert_eq!(out, " w ");
    }

    #[test]
    fn unquote_handles_escapes() {
        assert_eq!(unquote("\"<\"").as_deref(), Some("<"));
        assert_eq!(unquote("\"\\\"\"").as_deref(), Some("\""));
        assert_eq!(unquote("\"a\\nb\"").as_deref(), Some("a\nb"));
    }

    struct Fixed(OracleNode);
    impl ReferenceEngine for Fixed {
        fn parse_sample(&mut self, _sample: &str) -> Result<OracleNode, EngineError> {
            Ok(self.0.clone())
        }
    }

    struct Rejecting;
    impl ReferenceEngine for Rejecting {
        fn parse_sample(&mut self, sample: &str) -> Result<OracleNode, EngineError> {
            Err(EngineError::NoViableAlternative {
                sample: sample.into(),
            })
        }
    }

    fn right_assoc_conflict_and_grammar() -> (Conflict, GrammarAst) {
        let conflict = Conflict::from_report(&ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["e -> e \"=\" e".into(), "e -> e · \"=\" e".into()],
            input: "e \"=\" e · \"=\" …".into(),
            origin: String::new(),
            position: Some(0),
        })
        .unwrap()
        .unwrap();

        let mut g = GrammarAst::default();
        g.add_token("INT", RuleExpr::CharSet(CharSet::new(vec![(48, 58)])))
            .unwrap();
        g.add_rule(
            "e",
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::name("e"),
                    RuleExpr::literal("="),
                    RuleExpr::name("e"),
                ]),
                RuleExpr::name("INT"),
            ]),
        )
        .unwrap();
        (conflict, g)
    }

    #[test]
    fn resolves_right_associativity_by_example() {
        let (conflict, g) = right_assoc_conflict_and_grammar();
        let reference = rule(
            "e",
            vec![
                rule("e", vec![token("1")]),
                token("="),
                rule(
                    "e",
                    vec![
                        rule("e", vec![token("2")]),
                        token("="),
                        rule("e", vec![token("3")]),
                    ],
                ),
            ],
        );
        let trees = vec![DerivationNode {
            name: "e".into(),
            children: vec![
                DerivationNode::new("e"),
                DerivationNode::new("\"=\""),
                DerivationNode::new("e"),
            ],
        }];
        let chosen = resolve_by_example(
            &g,
            &conflict,
            &trees,
            Fixed(reference),
            &mut Scripted::default(),
        )
        .unwrap();
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn rejected_samples_exhaust_to_none() {
        let (conflict, g) = right_assoc_conflict_and_grammar();
        let trees = vec![DerivationNode::new("e")];
        let chosen = resolve_by_example(
            &g,
            &conflict,
            &trees,
            Rejecting,
            &mut Scripted::default(),
        )
        .unwrap();
        assert_eq!(chosen, None);
    }
}
