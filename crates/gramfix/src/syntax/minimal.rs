//! A minimal built-in grammar front-end.
//!
//! Covers the subset of the grammar notation the engine needs to see:
//! rule bodies (sequences, choices, repeats, names, literals, character
//! sets), a `@tokens` block, and a `@precedence` block with per-item source
//! offsets. Precedence markers (`!name`) and ambiguity markers (`~name`)
//! inside rule bodies are skipped: they annotate the grammar for the
//! parser generator and carry no sentence structure.

use super::{FrontendError, GrammarFrontend};
use crate::ast::{
    Assoc, CharSet, GrammarAst, PrecedenceBlock, PrecedenceItem, RepeatKind, RuleExpr,
};

#[derive(Debug, Default)]
pub struct MinimalFrontend;

impl GrammarFrontend for MinimalFrontend {
    fn parse(&mut self, source: &str) -> Result<GrammarAst, FrontendError> {
        Parser::new(source).parse_file()
    }
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> FrontendError {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit_once('\n')
            .map_or(consumed, |(_, tail)| tail)
            .chars()
            .count();
        FrontendError::at(message, line, column)
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if let Some(ch) = rest.chars().next() {
                if ch.is_whitespace() {
                    self.pos += ch.len_utf8();
                    continue;
                }
            }
            if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
                continue;
            }
            if rest.starts_with("/*") {
                match rest.find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => self.pos = self.src.len(),
                }
                continue;
            }
            break;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_trivia();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), FrontendError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}'", token)))
        }
    }

    fn ident(&mut self) -> Option<&'s str> {
        self.skip_trivia();
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(i, ch)| {
                if *i == 0 {
                    !(ch.is_alphabetic() || *ch == '_')
                } else {
                    !(ch.is_alphanumeric() || *ch == '_')
                }
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    fn parse_file(mut self) -> Result<GrammarAst, FrontendError> {
        let mut grammar = GrammarAst::default();
        loop {
            self.skip_trivia();
            if self.pos >= self.src.len() {
                break;
            }
            if self.eat("@precedence") {
                let block = self.parse_precedence_block()?;
                grammar.precedences = Some(block);
            } else if self.eat("@tokens") {
                self.parse_tokens_block(&mut grammar)?;
            } else if self.eat("@top") {
                let name = self
                    .ident()
                    .ok_or_else(|| self.error("expected rule name after `@top'"))?
                    .to_owned();
                let expr = self.parse_body()?;
                grammar
                    .add_rule(&name, expr)
                    .map_err(|err| self.error(err.to_string()))?;
            } else if self.eat("@skip") {
                // whitespace/comment skip specification; irrelevant here
                self.parse_body()?;
            } else if self.peek() == Some('@') {
                return Err(self.error("unsupported top-level directive"));
            } else {
                let name = self
                    .ident()
                    .ok_or_else(|| self.error("expected rule name"))?
                    .to_owned();
                self.skip_template_params()?;
                let expr = self.parse_body()?;
                grammar
                    .add_rule(&name, expr)
                    .map_err(|err| self.error(err.to_string()))?;
            }
        }
        Ok(grammar)
    }

    fn parse_precedence_block(&mut self) -> Result<PrecedenceBlock, FrontendError> {
        self.expect("{")?;
        let mut items = vec![];
        loop {
            self.skip_trivia();
            if self.eat("}") {
                break;
            }
            let name = self
                .ident()
                .ok_or_else(|| self.error("expected precedence level name"))?
                .to_owned();
            let mut end = self.pos;
            let assoc = if self.eat("@left") {
                Some(Assoc::Left)
            } else if self.eat("@right") {
                Some(Assoc::Right)
            } else if self.eat("@cut") {
                Some(Assoc::Cut)
            } else {
                None
            };
            if assoc.is_some() {
                end = self.pos;
            }
            items.push(PrecedenceItem { name, assoc, end });
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(PrecedenceBlock { items })
    }

    fn parse_tokens_block(&mut self, grammar: &mut GrammarAst) -> Result<(), FrontendError> {
        self.expect("{")?;
        loop {
            self.skip_trivia();
            if self.eat("}") {
                return Ok(());
            }
            if self.pos >= self.src.len() {
                return Err(self.error("unterminated @tokens block"));
            }
            if self.eat("@precedence") || self.eat("@conflict") {
                self.skip_balanced_braces()?;
                continue;
            }
            let name = self
                .ident()
                .ok_or_else(|| self.error("expected token rule name"))?
                .to_owned();
            self.skip_template_params()?;
            let expr = self.parse_body()?;
            grammar
                .add_token(&name, expr)
                .map_err(|err| self.error(err.to_string()))?;
        }
    }

    fn skip_balanced_braces(&mut self) -> Result<(), FrontendError> {
        self.expect("{")?;
        let mut depth = 1;
        while depth > 0 {
            match self.bump() {
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unbalanced braces")),
            }
        }
        Ok(())
    }

    fn skip_template_params(&mut self) -> Result<(), FrontendError> {
        if !self.eat("<") {
            return Ok(());
        }
        let mut depth = 1;
        while depth > 0 {
            match self.bump() {
                Some('<') => depth += 1,
                Some('>') => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unbalanced template parameters")),
            }
        }
        Ok(())
    }

    fn parse_body(&mut self) -> Result<RuleExpr, FrontendError> {
        self.expect("{")?;
        let expr = self.parse_choice()?;
        self.expect("}")?;
        Ok(expr)
    }

    fn parse_choice(&mut self) -> Result<RuleExpr, FrontendError> {
        let mut branches = vec![self.parse_sequence()?];
        while self.eat("|") {
            branches.push(self.parse_sequence()?);
        }
        Ok(if branches.len() == 1 {
            branches.pop().expect("one branch")
        } else {
            RuleExpr::Choice(branches)
        })
    }

    fn parse_sequence(&mut self) -> Result<RuleExpr, FrontendError> {
        let mut items = vec![];
        while let Some(item) = self.parse_atom()? {
            items.push(item);
        }
        Ok(if items.len() == 1 {
            items.pop().expect("one item")
        } else {
            RuleExpr::Sequence(items)
        })
    }

    /// One postfix-quantified atom, or `None` at a sequence boundary.
    /// Precedence and ambiguity markers are consumed but produce nothing.
    fn parse_atom(&mut self) -> Result<Option<RuleExpr>, FrontendError> {
        loop {
            self.skip_trivia();
            let primary = match self.peek() {
                Some('!') if !self.rest().starts_with("![") => {
                    self.bump();
                    self.ident()
                        .ok_or_else(|| self.error("expected precedence name after `!'"))?;
                    continue;
                }
                Some('~') => {
                    self.bump();
                    self.ident()
                        .ok_or_else(|| self.error("expected ambiguity name after `~'"))?;
                    continue;
                }
                Some('(') => {
                    self.bump();
                    let inner = self.parse_choice()?;
                    self.expect(")")?;
                    inner
                }
                Some('"') | Some('\'') => RuleExpr::Literal(self.parse_literal()?),
                Some('$') if self.rest().starts_with("$[") => {
                    self.bump();
                    RuleExpr::CharSet(self.parse_charset(false)?)
                }
                Some('!') => {
                    self.bump();
                    RuleExpr::CharSet(self.parse_charset(true)?)
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let name = self.ident().expect("ident start").to_owned();
                    self.skip_template_params()?;
                    RuleExpr::Name(name)
                }
                _ => return Ok(None),
            };
            return Ok(Some(self.parse_postfix(primary)));
        }
    }

    fn parse_postfix(&mut self, mut expr: RuleExpr) -> RuleExpr {
        loop {
            expr = if self.eat("*") {
                RuleExpr::repeat(expr, RepeatKind::ZeroOrMore)
            } else if self.eat("+") {
                RuleExpr::repeat(expr, RepeatKind::OneOrMore)
            } else if self.eat("?") {
                RuleExpr::repeat(expr, RepeatKind::Optional)
            } else {
                return expr;
            };
        }
    }

    fn parse_literal(&mut self) -> Result<String, FrontendError> {
        let quote = self.bump().expect("quote char");
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => return Ok(text),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(ch) => text.push(ch),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn parse_charset(&mut self, inverted: bool) -> Result<CharSet, FrontendError> {
        self.expect("[")?;
        let mut ranges = vec![];
        loop {
            let lo = match self.bump() {
                Some(']') => break,
                Some('\\') => self.escaped_char()?,
                Some(ch) => ch,
                None => return Err(self.error("unterminated character set")),
            };
            // `a-z` or a single char
            let hi = if self.rest().starts_with('-') && !self.rest().starts_with("-]") {
                self.bump();
                match self.bump() {
                    Some('\\') => self.escaped_char()?,
                    Some(ch) => ch,
                    None => return Err(self.error("unterminated character set")),
                }
            } else {
                lo
            };
            // upper bound is exclusive
            ranges.push((lo as u32, hi as u32 + 1));
        }
        Ok(if inverted {
            CharSet::inverted(ranges)
        } else {
            CharSet::new(ranges)
        })
    }

    fn escaped_char(&mut self) -> Result<char, FrontendError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some(other) => Ok(other),
            None => Err(self.error("unterminated escape")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Resolved;

    fn parse(source: &str) -> GrammarAst {
        MinimalFrontend.parse(source).unwrap()
    }

    #[test]
    fn parses_rules_tokens_and_precedences() {
        let source = r#"
@precedence {
  mul @left,
  cmp
}

@top Program { expr+ }

expr { expr !mul "*" expr | Number }

@skip { space }

@tokens {
  Number { $[0-9]+ }
  space { " "+ }
}
"#;
        let g = parse(source);
        assert!(g.rules.contains_key("Program"));
        assert!(g.rules.contains_key("expr"));
        assert!(matches!(g.resolve("Number"), Some(Resolved::Token(_))));
        assert!(matches!(g.resolve("space"), Some(Resolved::Token(_))));

        let precs = g.precedences.as_ref().unwrap();
        assert_eq!(precs.items.len(), 2);
        assert_eq!(precs.items[0].name, "mul");
        assert_eq!(precs.items[0].assoc, Some(Assoc::Left));
        assert_eq!(precs.items[1].name, "cmp");
        assert_eq!(precs.items[1].assoc, None);
        // the end offset points just past the item text
        assert!(source[..precs.items[0].end].ends_with("mul @left"));
        assert!(source[..precs.items[1].end].ends_with("cmp"));
    }

    #[test]
    fn precedence_markers_are_skipped_in_bodies() {
        let g = parse(r#"e { e !p "+" e | "x" }"#);
        let expr = g.rules.get("e").unwrap();
        match expr {
            RuleExpr::Choice(branches) => match &branches[0] {
                RuleExpr::Sequence(items) => {
                    assert_eq!(items.len(), 3);
                    assert_eq!(items[0], RuleExpr::name("e"));
                    assert_eq!(items[1], RuleExpr::literal("+"));
                }
                other => panic!("unexpected branch: {:?}", other),
            },
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn charsets_support_ranges_and_inversion() {
        let g = parse("t { $[a-z0] } u { ![\\n] }");
        assert_eq!(
            g.rules.get("t").unwrap(),
            &RuleExpr::CharSet(CharSet::new(vec![(97, 123), (48, 49)]))
        );
        assert_eq!(
            g.rules.get("u").unwrap(),
            &RuleExpr::CharSet(CharSet::inverted(vec![(10, 11)]))
        );
    }

    #[test]
    fn quantifiers_nest_outward() {
        let g = parse("r { \"a\"+? }");
        match g.rules.get("r").unwrap() {
            RuleExpr::Repeat { kind, expr } => {
                assert_eq!(*kind, RepeatKind::Optional);
                assert!(matches!(
                    **expr,
                    RuleExpr::Repeat {
                        kind: RepeatKind::OneOrMore,
                        ..
                    }
                ));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn syntax_error_carries_a_location() {
        let err = MinimalFrontend.parse("rule { \"unterminated").unwrap_err();
        assert!(err.location.is_some());
    }

    #[test]
    fn template_calls_resolve_to_the_template_name() {
        let g = parse("r { kw<\"if\"> }");
        assert_eq!(g.rules.get("r").unwrap(), &RuleExpr::name("kw"));
    }
}
