//! Minimal, position-addressed grammar patching.
//!
//! All edits of one grammar generation are computed against the *pre-edit*
//! source text and flushed in a single pass: an insertion never shifts the
//! offsets recorded for other edits. Precedence bookkeeping lives in
//! [`PatchContext`], owned by the driver and handed in by reference; there
//! is no module-level state.

use crate::{ast::GrammarAst, types::Set};

/// A buffer of insertions addressed by byte offset into the original text.
#[derive(Debug, Default)]
pub struct TextEdits {
    edits: Vec<(usize, String)>,
}

impl TextEdits {
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push((at, text.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all recorded insertions in one pass. Edits at the same offset
    /// keep their recording order.
    pub fn apply(&self, source: &str) -> String {
        let mut order: Vec<usize> = (0..self.edits.len()).collect();
        order.sort_by_key(|&i| self.edits[i].0);

        let extra: usize = self.edits.iter().map(|(_, text)| text.len()).sum();
        let mut out = String::with_capacity(source.len() + extra);
        let mut cursor = 0;
        for i in order {
            let (at, text) = &self.edits[i];
            let at = (*at).min(source.len());
            out.push_str(&source[cursor..at]);
            out.push_str(text);
            cursor = at;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

/// The disambiguation applied to one conflict.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    Left,
    Right,
    /// A cut operator: override other interpretations even before a
    /// conflict is detected.
    Cut,
    /// A bare precedence level with no associativity, marking the conflict
    /// as resolved-by-order only.
    Ambiguous,
}

impl Resolution {
    fn attr(&self) -> &'static str {
        match self {
            Self::Left => " @left",
            Self::Right => " @right",
            Self::Cut => " @cut",
            Self::Ambiguous => "",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("the conflicting symbol has no source position")]
    UnknownPosition,
}

#[derive(Debug)]
enum Block {
    /// The grammar has no precedence block yet; levels accumulate and are
    /// materialized once, prepended at offset 0, when the generation's
    /// edits are flushed.
    Pending { levels: Vec<(String, Resolution)> },
    /// Append new levels right after the last existing one.
    Existing { append_at: usize },
}

/// Per-generation patch state: precedence-name uniqueness and the pending
/// precedence block.
#[derive(Debug)]
pub struct PatchContext {
    used_names: Set<String>,
    next_number: usize,
    block: Block,
}

impl PatchContext {
    pub fn new(grammar: &GrammarAst) -> Self {
        let used_names: Set<String> = grammar.precedence_names().map(str::to_owned).collect();
        let block = match &grammar.precedences {
            Some(block) if !block.items.is_empty() => Block::Existing {
                append_at: block.items.last().expect("nonempty block").end,
            },
            _ => Block::Pending { levels: vec![] },
        };
        Self {
            used_names,
            next_number: 1,
            block,
        }
    }

    fn fresh_name(&mut self) -> String {
        loop {
            let name = format!("prec{}", self.next_number);
            if self.used_names.insert(name.clone()) {
                return name;
            }
            self.next_number += 1;
        }
    }

    /// Record one resolved conflict: a new uniquely-named precedence level
    /// plus a `!name` marker right before the conflicting symbol.
    pub fn apply(
        &mut self,
        edits: &mut TextEdits,
        resolution: Resolution,
        position: Option<usize>,
    ) -> Result<(), PatchError> {
        let position = position.ok_or(PatchError::UnknownPosition)?;
        let name = self.fresh_name();
        match &mut self.block {
            Block::Pending { levels } => levels.push((name.clone(), resolution)),
            Block::Existing { append_at } => {
                edits.insert(*append_at, format!(",\n  {}{}", name, resolution.attr()));
            }
        }
        tracing::debug!("adding precedence marker !{} at position {}", name, position);
        edits.insert(position, format!("!{} ", name));
        Ok(())
    }

    /// Materialize the pending precedence block, if any.
    pub fn finish(&self, edits: &mut TextEdits) {
        let Block::Pending { levels } = &self.block else {
            return;
        };
        if levels.is_empty() {
            return;
        }
        let mut text = String::from("@precedence {\n");
        for (i, (name, resolution)) in levels.iter().enumerate() {
            text.push_str("  ");
            text.push_str(name);
            text.push_str(resolution.attr());
            if i + 1 < levels.len() {
                text.push(',');
            }
            text.push('\n');
        }
        text.push_str("}\n\n");
        edits.insert(0, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Assoc, PrecedenceBlock, PrecedenceItem};

    #[test]
    fn insertions_leave_other_bytes_untouched() {
        let source: String = std::iter::repeat("0123456789").take(10).collect();
        assert_eq!(source.len(), 100);

        let mut edits = TextEdits::default();
        edits.insert(0, "@precedence { prec1 @left }\n");
        edits.insert(42, "!prec1 ");
        let out = edits.apply(&source);

        assert_eq!(
            out,
            format!(
                "@precedence {{ prec1 @left }}\n{}!prec1 {}",
                &source[..42],
                &source[42..]
            )
        );
    }

    #[test]
    fn same_offset_edits_keep_recording_order() {
        let mut edits = TextEdits::default();
        edits.insert(2, "a");
        edits.insert(2, "b");
        assert_eq!(edits.apply("xxxx"), "xxabxx");
    }

    #[test]
    fn offsets_are_against_the_original_text() {
        let mut edits = TextEdits::default();
        // recorded out of order, with an early insertion that must not
        // shift the later offset
        edits.insert(4, "D");
        edits.insert(0, "long-prefix ");
        assert_eq!(edits.apply("abcdef"), "long-prefix abcdDef");
    }

    fn grammar_with_precs(names: &[&str]) -> GrammarAst {
        let mut g = GrammarAst::default();
        if !names.is_empty() {
            g.precedences = Some(PrecedenceBlock {
                items: names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| PrecedenceItem {
                        name: (*name).into(),
                        assoc: Some(Assoc::Left),
                        end: 20 + i,
                    })
                    .collect(),
            });
        }
        g
    }

    #[test]
    fn creates_one_block_for_multiple_conflicts() {
        let g = grammar_with_precs(&[]);
        let mut ctx = PatchContext::new(&g);
        let mut edits = TextEdits::default();
        ctx.apply(&mut edits, Resolution::Left, Some(10)).unwrap();
        ctx.apply(&mut edits, Resolution::Right, Some(20)).unwrap();
        ctx.finish(&mut edits);

        let out = edits.apply(&"x".repeat(30));
        assert!(out.starts_with("@precedence {\n  prec1 @left,\n  prec2 @right\n}\n\n"));
        assert_eq!(out.matches("@precedence").count(), 1);
        assert!(out.contains("!prec1 "));
        assert!(out.contains("!prec2 "));
    }

    #[test]
    fn appends_to_an_existing_block_with_fresh_names() {
        let g = grammar_with_precs(&["prec1", "opPrec"]);
        let mut ctx = PatchContext::new(&g);
        let mut edits = TextEdits::default();
        ctx.apply(&mut edits, Resolution::Left, Some(25)).unwrap();
        ctx.finish(&mut edits);

        let source = "a".repeat(30);
        let out = edits.apply(&source);
        // prec1 is taken, so the new level is prec2, appended after the
        // last existing item (offset 21)
        assert!(out.contains(",\n  prec2 @left"));
        assert!(!out.contains("@precedence {\n"));
        assert!(out.contains("!prec2 "));
    }

    #[test]
    fn missing_position_is_fatal() {
        let g = grammar_with_precs(&[]);
        let mut ctx = PatchContext::new(&g);
        let mut edits = TextEdits::default();
        assert!(matches!(
            ctx.apply(&mut edits, Resolution::Left, None),
            Err(PatchError::UnknownPosition)
        ));
    }
}
