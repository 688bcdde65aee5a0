//! Grammar AST types.
//!
//! The front-end that produces these values is an external collaborator (see
//! [`crate::syntax`]); everything in here is consumed read-only by the
//! reducer, fuzzer and patcher. Fixes are applied to the grammar *source
//! text*, never to this AST.

use crate::{types::Map, util::display_fn};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RepeatKind {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    Optional,
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroOrMore => f.write_str("*"),
            Self::OneOrMore => f.write_str("+"),
            Self::Optional => f.write_str("?"),
        }
    }
}

/// A character class, e.g. `[a-z]` or `![\n]`.
///
/// Ranges are `(lo, hi)` with `hi` *exclusive*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    pub ranges: Vec<(u32, u32)>,
    pub inverted: bool,
}

impl CharSet {
    pub fn new(ranges: Vec<(u32, u32)>) -> Self {
        Self {
            ranges,
            inverted: false,
        }
    }

    pub fn inverted(ranges: Vec<(u32, u32)>) -> Self {
        Self {
            ranges,
            inverted: true,
        }
    }

    /// The concrete ranges to sample from. Inverted sets are complemented
    /// over the byte range `0..=255` before sampling.
    pub fn sample_ranges(&self) -> Vec<(u32, u32)> {
        if !self.inverted {
            return self.ranges.clone();
        }
        let mut ranges = vec![];
        let mut next = 0u32;
        for &(lo, hi) in &self.ranges {
            if next < lo {
                ranges.push((next, lo));
            }
            next = next.max(hi);
        }
        if next < 256 {
            ranges.push((next, 256));
        }
        ranges
    }
}

/// The body of a grammar rule or token rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    Sequence(Vec<RuleExpr>),
    Choice(Vec<RuleExpr>),
    Repeat {
        expr: Box<RuleExpr>,
        kind: RepeatKind,
    },
    /// Reference to another rule or token by name.
    Name(String),
    Literal(String),
    CharSet(CharSet),
}

impl RuleExpr {
    pub fn repeat(expr: RuleExpr, kind: RepeatKind) -> Self {
        Self::Repeat {
            expr: Box::new(expr),
            kind,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    // indented node dump, used by reduction diagnostics
    pub fn display_tree(&self) -> impl fmt::Display + '_ {
        fn walk(expr: &RuleExpr, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            write!(f, "{}", " ".repeat(depth))?;
            match expr {
                RuleExpr::Sequence(items) => {
                    writeln!(f, "Sequence")?;
                    for item in items {
                        walk(item, f, depth + 1)?;
                    }
                }
                RuleExpr::Choice(items) => {
                    writeln!(f, "Choice")?;
                    for item in items {
                        walk(item, f, depth + 1)?;
                    }
                }
                RuleExpr::Repeat { expr, kind } => {
                    writeln!(f, "Repeat {}", kind)?;
                    walk(expr, f, depth + 1)?;
                }
                RuleExpr::Name(name) => writeln!(f, "Name {}", name)?,
                RuleExpr::Literal(text) => writeln!(f, "Literal {:?}", text)?,
                RuleExpr::CharSet(set) => {
                    writeln!(
                        f,
                        "CharSet {}{:?}",
                        if set.inverted { "!" } else { "" },
                        set.ranges
                    )?;
                }
            }
            Ok(())
        }
        display_fn(move |f| walk(self, f, 0))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    Cut,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Cut => f.write_str("cut"),
        }
    }
}

/// One level inside a `@precedence { .. }` block.
#[derive(Debug, Clone)]
pub struct PrecedenceItem {
    pub name: String,
    pub assoc: Option<Assoc>,
    /// Byte offset just past this item in the grammar source. The patcher
    /// appends new levels after the last item's `end`.
    pub end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PrecedenceBlock {
    pub items: Vec<PrecedenceItem>,
}

/// Token rules of a grammar, held separately because a rule and a token may
/// share a name. Rules take priority during name resolution.
#[derive(Debug, Default)]
pub struct TokenSet {
    pub rules: Map<String, RuleExpr>,
}

/// A name resolved against a [`GrammarAst`].
#[derive(Debug, Copy, Clone)]
pub enum Resolved<'g> {
    Rule(&'g RuleExpr),
    Token(&'g RuleExpr),
}

/// The read-only grammar view consumed by the conflict-resolution engine.
#[derive(Debug, Default)]
pub struct GrammarAst {
    pub rules: Map<String, RuleExpr>,
    pub tokens: TokenSet,
    pub precedences: Option<PrecedenceBlock>,
}

impl GrammarAst {
    /// Declare a grammar rule.
    pub fn add_rule(&mut self, name: &str, expr: RuleExpr) -> Result<(), AstError> {
        if !verify_ident(name) {
            return Err(AstError::BadIdent { name: name.into() });
        }
        if self.rules.contains_key(name) {
            return Err(AstError::Duplicate { name: name.into() });
        }
        self.rules.insert(name.to_owned(), expr);
        Ok(())
    }

    /// Declare a token rule.
    pub fn add_token(&mut self, name: &str, expr: RuleExpr) -> Result<(), AstError> {
        if !verify_ident(name) {
            return Err(AstError::BadIdent { name: name.into() });
        }
        if self.tokens.rules.contains_key(name) {
            return Err(AstError::Duplicate { name: name.into() });
        }
        self.tokens.rules.insert(name.to_owned(), expr);
        Ok(())
    }

    /// Resolve `name` to a rule body, trying grammar rules before tokens.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        if let Some(expr) = self.rules.get(name) {
            return Some(Resolved::Rule(expr));
        }
        self.tokens.rules.get(name).map(Resolved::Token)
    }

    /// All known rule and token names, for diagnostics.
    pub fn known_names(&self) -> String {
        let rules = self
            .rules
            .keys()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let tokens = self
            .tokens
            .rules
            .keys()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        format!("rules: {}\ntokens: {}", rules, tokens)
    }

    pub fn precedence_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.precedences
            .iter()
            .flat_map(|block| block.items.iter().map(|item| item.name.as_str()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AstError {
    #[error("incorrect rule name: `{}'", name)]
    BadIdent { name: String },

    #[error("the rule `{}' has already been declared", name)]
    Duplicate { name: String },
}

fn verify_ident(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if first != '_' && !unicode_ident::is_xid_start(first) {
        return false;
    }
    chars.all(unicode_ident::is_xid_continue)
}
