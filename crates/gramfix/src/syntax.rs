//! The grammar front-end seam.
//!
//! Parsing grammar source text into a [`GrammarAst`] is the job of an
//! external collaborator; the driver only needs something that implements
//! [`GrammarFrontend`]. Syntax errors carry an optional location so callers
//! can render a context excerpt (see [`crate::util::source_context`]).

pub mod minimal;

use crate::ast::GrammarAst;
use std::fmt;

pub trait GrammarFrontend {
    fn parse(&mut self, source: &str) -> Result<GrammarAst, FrontendError>;
}

impl<F: GrammarFrontend + ?Sized> GrammarFrontend for &mut F {
    fn parse(&mut self, source: &str) -> Result<GrammarAst, FrontendError> {
        (**self).parse(source)
    }
}

#[derive(Debug, thiserror::Error)]
pub struct FrontendError {
    pub message: String,
    /// 1-based line and 0-based column of the offending token, if known.
    pub location: Option<(usize, usize)>,
}

impl FrontendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            location: Some((line, column)),
        }
    }
}

impl fmt::Display for FrontendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some((line, column)) => {
                write!(f, "{} (line {}, column {})", self.message, line, column)
            }
            None => f.write_str(&self.message),
        }
    }
}
