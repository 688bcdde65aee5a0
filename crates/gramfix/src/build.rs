//! The parser-generator build seam.
//!
//! Building the translated grammar is delegated to the target ecosystem's
//! parser generator. The driver only observes the typed outcome: either a
//! parser was built, or the generator rejected the grammar and reported one
//! conflict diagnostic per ambiguity.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConflictOp {
    Shift,
    Reduce,
}

impl std::fmt::Display for ConflictOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shift => f.write_str("shift"),
            Self::Reduce => f.write_str("reduce"),
        }
    }
}

/// One raw conflict diagnostic, fields already separated by the generator's
/// error object.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub ops: [ConflictOp; 2],
    /// Two competing resolutions, each of the form `<rule> -> <rhs tokens>`.
    pub solutions: [String; 2],
    /// Whitespace-separated input trace with a `·` position marker and an
    /// optional trailing `…` continuation marker.
    pub input: String,
    /// Newline-delimited shared-origin derivation trace.
    pub origin: String,
    /// Byte offset of the conflicting symbol in the grammar source, when the
    /// generator was able to attribute one.
    pub position: Option<usize>,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Built,
    Conflicted(Vec<ConflictReport>),
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The generator failed for a reason other than grammar conflicts.
    #[error("parser generator error: {}", _0)]
    Generator(String),
}

pub trait ParserBuilder {
    fn build(&mut self, source: &str) -> Result<BuildOutcome, BuildError>;
}

impl<B: ParserBuilder + ?Sized> ParserBuilder for &mut B {
    fn build(&mut self, source: &str) -> Result<BuildOutcome, BuildError> {
        (**self).build(source)
    }
}

impl ConflictOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "shift" => Some(Self::Shift),
            "reduce" => Some(Self::Reduce),
            _ => None,
        }
    }
}

/// Parse a parser generator's textual conflict log into raw reports.
///
/// The expected shape per conflict:
///
/// ```text
/// shift/reduce conflict between
///   e -> e · "+" e
/// and
///   e -> e "+" e
/// With input:
///   e "+" e · "+" …
/// Shared origin: s -> · e
///   via e -> e · "+" e
/// ```
///
/// Reports are separated by blank lines; anything else in the log is
/// ignored. Positions are filled in separately (see [`resolve_position`]).
pub fn parse_conflict_log(log: &str) -> Result<Vec<ConflictReport>, BuildError> {
    let mut reports = vec![];
    let mut lines = log.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(ops_part) = line.trim_end().strip_suffix(" conflict between") else {
            continue;
        };
        let Some((op1, op2)) = ops_part.split_once('/') else {
            continue;
        };
        let (Some(op1), Some(op2)) = (ConflictOp::parse(op1), ConflictOp::parse(op2)) else {
            continue;
        };

        let mut take = |expect_literal: Option<&str>| -> Result<String, BuildError> {
            let line = lines.next().ok_or_else(|| {
                BuildError::Generator(format!("truncated conflict report: {}", log.trim_end()))
            })?;
            if let Some(literal) = expect_literal {
                if line.trim() != literal {
                    return Err(BuildError::Generator(format!(
                        "unexpected line in conflict report: {}",
                        line
                    )));
                }
            }
            Ok(line.trim().to_owned())
        };

        let solution1 = take(None)?;
        take(Some("and"))?;
        let solution2 = take(None)?;
        take(Some("With input:"))?;
        let input = take(None)?;

        let origin_head = take(None)?;
        let Some(origin_head) = origin_head.strip_prefix("Shared origin: ") else {
            return Err(BuildError::Generator(format!(
                "missing shared origin in conflict report: {}",
                origin_head
            )));
        };
        let mut origin = origin_head.to_owned();
        while let Some(next) = lines.peek() {
            if next.starts_with(' ') && !next.trim().is_empty() {
                origin.push('\n');
                origin.push_str(lines.next().expect("peeked"));
            } else {
                break;
            }
        }

        reports.push(ConflictReport {
            ops: [op1, op2],
            solutions: [solution1, solution2],
            input,
            origin,
            position: None,
        });
    }

    Ok(reports)
}

/// Best-effort source position of the conflicting symbol: the first
/// occurrence of the token right after the `·` marker. Quoted literal
/// tokens are searched verbatim (the grammar quotes them the same way);
/// names are matched on word boundaries.
pub fn resolve_position(source: &str, input: &str) -> Option<usize> {
    let mut tokens = input.split_whitespace();
    tokens.find(|token| *token == crate::conflict::MARKER)?;
    let symbol = tokens.next()?;
    if symbol == crate::conflict::CONTINUATION {
        return None;
    }

    if symbol.starts_with('"') {
        return source.find(symbol);
    }
    let is_word = |ch: char| ch.is_alphanumeric() || ch == '_';
    source.match_indices(symbol).find_map(|(at, _)| {
        let before_ok = source[..at].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = source[at + symbol.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word(c));
        (before_ok && after_ok).then_some(at)
    })
}

/// [`ParserBuilder`] backed by an external generator command. The grammar
/// text is staged to a scratch file, the command is run against it, and
/// conflicts are recovered from the command's standard error.
#[derive(Debug)]
pub struct CommandBuilder {
    command: String,
    scratch: std::path::PathBuf,
    runs: usize,
}

impl CommandBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            scratch: std::env::temp_dir(),
            runs: 0,
        }
    }

    pub fn scratch_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.scratch = dir.into();
        self
    }
}

impl ParserBuilder for CommandBuilder {
    fn build(&mut self, source: &str) -> Result<BuildOutcome, BuildError> {
        self.runs += 1;
        let file = self.scratch.join(format!(
            "gramfix-build-{}-{}.grammar",
            std::process::id(),
            self.runs
        ));
        std::fs::write(&file, source)
            .map_err(|err| BuildError::Generator(format!("cannot stage grammar: {}", err)))?;

        tracing::debug!("{} {}", self.command, file.display());
        let output = std::process::Command::new(&self.command)
            .arg(&file)
            .output()
            .map_err(|err| BuildError::Generator(format!("{}: {}", self.command, err)))?;
        let _ = std::fs::remove_file(&file);

        if output.status.success() {
            return Ok(BuildOutcome::Built);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut reports = parse_conflict_log(&stderr)?;
        if reports.is_empty() {
            return Err(BuildError::Generator(stderr.into_owned()));
        }
        for report in &mut reports {
            report.position = resolve_position(source, &report.input);
        }
        Ok(BuildOutcome::Conflicted(reports))
    }
}
