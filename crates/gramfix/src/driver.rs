//! The fixed-point resolution loop.
//!
//! `Building → Clean (stop) | Conflicted (resolve, patch, rebuild)`. Each
//! iteration is one "grammar generation": conflicts are re-derived from the
//! current text, resolved one at a time in report order, and the patched
//! text feeds the next generation. The loop stops on a clean build or when
//! a generation changes nothing. The latter is a best-effort final result,
//! not an error.

use crate::{
    ast::GrammarAst,
    build::{BuildError, BuildOutcome, ParserBuilder},
    conflict::{Conflict, ConflictError, Solution},
    engine::ReferenceEngine,
    fuzz::Randomness,
    oracle::{self, OracleError},
    origin::{self, OriginError},
    patch::{PatchContext, PatchError, Resolution, TextEdits},
    syntax::{FrontendError, GrammarFrontend},
};

#[derive(Debug)]
pub struct Driver<F, B, E, R> {
    frontend: F,
    builder: B,
    engine: E,
    rng: R,
}

/// The final state of a resolution run.
#[derive(Debug)]
pub struct Outcome {
    /// The (possibly unchanged) final grammar text.
    pub text: String,
    /// Whether `text` differs from the very first generation's input.
    pub changed: bool,
    /// Number of build attempts performed.
    pub generations: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("syntax error in grammar: {}", _0)]
    Frontend(#[from] FrontendError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Origin(#[from] OriginError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("unresolvable conflict: no candidate resolution produced a building parser")]
    Unresolvable,
}

impl<F, B, E, R> Driver<F, B, E, R>
where
    F: GrammarFrontend,
    B: ParserBuilder,
    E: ReferenceEngine,
    R: Randomness,
{
    pub fn new(frontend: F, builder: B, engine: E, rng: R) -> Self {
        Self {
            frontend,
            builder,
            engine,
            rng,
        }
    }

    pub fn run(&mut self, source: &str) -> Result<Outcome, DriverError> {
        let mut text = source.to_owned();
        let mut generations = 0;

        loop {
            tracing::info!("grammar generation {}", generations);
            tracing::debug!("building parser ...");
            let outcome = self.builder.build(&text)?;
            generations += 1;
            let reports = match outcome {
                BuildOutcome::Built => {
                    tracing::info!("no conflicts");
                    break;
                }
                BuildOutcome::Conflicted(reports) => reports,
            };
            tracing::info!("{} conflicts reported", reports.len());

            let grammar = self.frontend.parse(&text)?;
            let mut edits = TextEdits::default();
            let mut ctx = PatchContext::new(&grammar);

            for report in &reports {
                let Some(conflict) = Conflict::from_report(report)? else {
                    continue;
                };
                let resolution = self.resolve(&grammar, &conflict, &text)?;
                ctx.apply(&mut edits, resolution, conflict.position)?;
            }
            ctx.finish(&mut edits);

            let patched = edits.apply(&text);
            if patched == text {
                tracing::info!("no change; stopping the grammar generation loop");
                break;
            }
            text = patched;
        }

        Ok(Outcome {
            changed: text != source,
            text,
            generations,
        })
    }

    fn resolve(
        &mut self,
        grammar: &GrammarAst,
        conflict: &Conflict,
        pristine: &str,
    ) -> Result<Resolution, DriverError> {
        if let Some(empty_idx) = conflict.empty_solution_idx() {
            // An empty production can never be the wrong branch of an
            // associativity choice; take the other side without consulting
            // the oracle.
            let chosen = &conflict.solutions[1 - empty_idx];
            tracing::debug!(
                "solution {} is an empty production; selecting solution {}",
                empty_idx + 1,
                2 - empty_idx,
            );
            if let Some(resolution) = solution_resolution(chosen) {
                return Ok(resolution);
            }
            return self.brute_force(grammar, conflict, pristine);
        }

        let trees = origin::reconstruct(&conflict.origin)?;
        if let Some(idx) = oracle::resolve_by_example(
            grammar,
            conflict,
            &trees,
            &mut self.engine,
            &mut self.rng,
        )? {
            if let Some(resolution) = solution_resolution(&conflict.solutions[idx]) {
                return Ok(resolution);
            }
        }

        tracing::info!("no solution was found; trying solution candidates");
        self.brute_force(grammar, conflict, pristine)
    }

    /// Last resort: trial-patch each candidate onto the generation's
    /// pristine text, rebuild, and accept the first one that builds.
    fn brute_force(
        &mut self,
        grammar: &GrammarAst,
        conflict: &Conflict,
        pristine: &str,
    ) -> Result<Resolution, DriverError> {
        const CANDIDATES: [Resolution; 4] = [
            Resolution::Left,
            Resolution::Right,
            Resolution::Cut,
            Resolution::Ambiguous,
        ];
        for candidate in CANDIDATES {
            let mut edits = TextEdits::default();
            let mut ctx = PatchContext::new(grammar);
            ctx.apply(&mut edits, candidate, conflict.position)?;
            ctx.finish(&mut edits);
            let trial = edits.apply(pristine);

            tracing::debug!("trial building with {:?} ...", candidate);
            if self.builder.build(&trial)?.is_built() {
                tracing::info!("using the first working candidate: {:?}", candidate);
                return Ok(candidate);
            }
        }
        Err(DriverError::Unresolvable)
    }
}

fn solution_resolution(solution: &Solution) -> Option<Resolution> {
    if solution.is_left {
        Some(Resolution::Left)
    } else if solution.is_right {
        Some(Resolution::Right)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleExpr;
    use crate::build::{ConflictOp, ConflictReport};
    use crate::engine::{EngineError, OracleNode};
    use crate::fuzz::Scripted;

    struct EmptyFrontend;
    impl GrammarFrontend for EmptyFrontend {
        fn parse(&mut self, _source: &str) -> Result<GrammarAst, FrontendError> {
            Ok(GrammarAst::default())
        }
    }

    struct LiteralFrontend(&'static [&'static str]);
    impl GrammarFrontend for LiteralFrontend {
        fn parse(&mut self, _source: &str) -> Result<GrammarAst, FrontendError> {
            let mut g = GrammarAst::default();
            for name in self.0 {
                g.add_rule(name, RuleExpr::literal(*name)).unwrap();
            }
            Ok(g)
        }
    }

    struct CleanBuilder;
    impl ParserBuilder for CleanBuilder {
        fn build(&mut self, _source: &str) -> Result<BuildOutcome, BuildError> {
            Ok(BuildOutcome::Built)
        }
    }

    /// Conflicted until the text carries a precedence marker.
    struct MarkerBuilder(ConflictReport);
    impl ParserBuilder for MarkerBuilder {
        fn build(&mut self, source: &str) -> Result<BuildOutcome, BuildError> {
            if source.contains("!prec") {
                Ok(BuildOutcome::Built)
            } else {
                Ok(BuildOutcome::Conflicted(vec![self.0.clone()]))
            }
        }
    }

    struct NoEngine;
    impl ReferenceEngine for NoEngine {
        fn parse_sample(&mut self, _sample: &str) -> Result<OracleNode, EngineError> {
            panic!("the oracle must not be consulted");
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

    #[test]
    fn clean_grammar_is_a_noop() {
        let mut driver = Driver::new(EmptyFrontend, CleanBuilder, NoEngine, Scripted::default());
        let outcome = driver.run("rule { a }").unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.text, "rule { a }");
        assert_eq!(outcome.generations, 1);
    }

    #[test]
    fn degenerate_conflict_skips_the_oracle() {
        let _ = tracing_subscriber::fmt().with_ansi(false).try_init();

        let report = ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["e -> e + e".into(), "opt -> ".into()],
            input: "e + e · + e …".into(),
            origin: String::new(),
            position: Some(5),
        };
        let mut driver = Driver::new(
            EmptyFrontend,
            MarkerBuilder(report),
            NoEngine,
            Scripted::default(),
        );
        let outcome = driver.run("top { e }\n").unwrap();
        assert!(outcome.changed);
        assert!(outcome.text.starts_with("@precedence {\n  prec1 @left\n}\n\n"));
        assert!(outcome.text.contains("!prec1 "));
        assert_eq!(outcome.generations, 2);
    }

    #[test]
    fn unsupported_conflicts_reach_a_quiet_fixed_point() {
        let report = ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["a -> b".into(), "a -> c".into()],
            input: "· b …".into(),
            origin: String::new(),
            position: Some(0),
        };
        struct AlwaysConflicted(ConflictReport);
        impl ParserBuilder for AlwaysConflicted {
            fn build(&mut self, _source: &str) -> Result<BuildOutcome, BuildError> {
                Ok(BuildOutcome::Conflicted(vec![self.0.clone()]))
            }
        }
        let mut driver = Driver::new(
            EmptyFrontend,
            AlwaysConflicted(report),
            NoEngine,
            Scripted::default(),
        );
        let outcome = driver.run("top { a }\n").unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.generations, 1);
    }

    #[test]
    fn falls_back_to_brute_force_candidates() {
        let report = ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["s -> a b c d e f".into(), "s -> a · b".into()],
            input: "x y z · w …".into(),
            origin: "s -> · x".into(),
            position: Some(4),
        };
        let mut driver = Driver::new(
            LiteralFrontend(&["x", "s"]),
            MarkerBuilder(report),
            Rejecting,
            Scripted::default(),
        );
        let outcome = driver.run("top { s }\n").unwrap();
        assert!(outcome.changed);
        // the first candidate that builds is force-left
        assert!(outcome.text.contains("prec1 @left"));
        assert!(outcome.text.contains("!prec1 "));
    }

    #[test]
    fn unresolvable_conflict_is_fatal() {
        let report = ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["s -> a b c d e f".into(), "s -> a · b".into()],
            input: "x y z · w …".into(),
            origin: "s -> · x".into(),
            position: Some(4),
        };
        struct NeverBuilds(ConflictReport);
        impl ParserBuilder for NeverBuilds {
            fn build(&mut self, _source: &str) -> Result<BuildOutcome, BuildError> {
                Ok(BuildOutcome::Conflicted(vec![self.0.clone()]))
            }
        }
        let mut driver = Driver::new(
            LiteralFrontend(&["x", "s"]),
            NeverBuilds(report.clone()),
            Rejecting,
            Scripted::default(),
        );
        let err = driver.run("top { s }\n").unwrap_err();
        assert!(matches!(err, DriverError::Unresolvable));
    }

    #[test]
    fn running_on_fixed_output_terminates_in_one_generation() {
        let report = ConflictReport {
            ops: [ConflictOp::Shift, ConflictOp::Reduce],
            solutions: ["e -> e + e".into(), "opt -> ".into()],
            input: "e + e · + e …".into(),
            origin: String::new(),
            position: Some(5),
        };
        let mut driver = Driver::new(
            EmptyFrontend,
            MarkerBuilder(report.clone()),
            NoEngine,
            Scripted::default(),
        );
        let first = driver.run("top { e }\n").unwrap();
        assert!(first.changed);

        let mut driver = Driver::new(
            EmptyFrontend,
            MarkerBuilder(report),
            NoEngine,
            Scripted::default(),
        );
        let second = driver.run(&first.text).unwrap();
        assert!(!second.changed);
        assert_eq!(second.generations, 1);
        assert_eq!(second.text, first.text);
    }
}
