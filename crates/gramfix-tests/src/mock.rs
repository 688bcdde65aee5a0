//! Mock collaborators standing in for the external parser generator and the
//! reference toolchain.

use gramfix::build::{BuildError, BuildOutcome, ConflictOp, ConflictReport, ParserBuilder};
use gramfix::engine::{EngineError, OracleNode, ReferenceEngine};

/// A parser generator that reports one shift/reduce conflict on the `"="`
/// literal until the grammar carries a precedence marker.
#[derive(Debug, Default)]
pub struct AssignBuilder {
    pub builds: usize,
}

impl ParserBuilder for AssignBuilder {
    fn build(&mut self, source: &str) -> Result<BuildOutcome, BuildError> {
        self.builds += 1;
        if source.contains("!prec") {
            return Ok(BuildOutcome::Built);
        }
        Ok(BuildOutcome::Conflicted(vec![ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: [
                "expr -> expr · \"=\" expr".into(),
                "expr -> expr \"=\" expr".into(),
            ],
            input: "expr \"=\" expr · \"=\" …".into(),
            origin: "Program -> · expr\n  via expr -> expr · \"=\" expr".into(),
            position: gramfix::build::resolve_position(source, "expr \"=\" expr · \"=\" …"),
        }]))
    }
}

/// A builder that never reports conflicts.
#[derive(Debug, Default)]
pub struct CleanBuilder;

impl ParserBuilder for CleanBuilder {
    fn build(&mut self, _source: &str) -> Result<BuildOutcome, BuildError> {
        Ok(BuildOutcome::Built)
    }
}

/// A reference engine whose grammar parses `=` right-associatively:
/// `1 = 2 = 3` parses as `1 = (2 = 3)`. Rule names differ in case from the
/// translated grammar on purpose; matching is case-insensitive.
#[derive(Debug, Default)]
pub struct RightAssignEngine;

impl ReferenceEngine for RightAssignEngine {
    fn parse_sample(&mut self, _sample: &str) -> Result<OracleNode, EngineError> {
        fn rule(name: &str, children: Vec<OracleNode>) -> OracleNode {
            OracleNode::Rule {
                name: name.into(),
                children,
            }
        }
        fn leaf(text: &str) -> OracleNode {
            OracleNode::Token { text: text.into() }
        }
        Ok(rule(
            "ExprContext",
            vec![
                rule("ExprContext", vec![leaf("1")]),
                leaf("="),
                rule(
                    "ExprContext",
                    vec![
                        rule("ExprContext", vec![leaf("2")]),
                        leaf("="),
                        rule("ExprContext", vec![leaf("3")]),
                    ],
                ),
            ],
        ))
    }
}

/// A reference engine that rejects every sample.
#[derive(Debug, Default)]
pub struct RejectingEngine;

impl ReferenceEngine for RejectingEngine {
    fn parse_sample(&mut self, sample: &str) -> Result<OracleNode, EngineError> {
        Err(EngineError::NoViableAlternative {
            sample: sample.into(),
        })
    }
}

/// A reference engine that must never be consulted.
#[derive(Debug, Default)]
pub struct UnusedEngine;

impl ReferenceEngine for UnusedEngine {
    fn parse_sample(&mut self, _sample: &str) -> Result<OracleNode, EngineError> {
        panic!("the reference engine must not be consulted");
    }
}
