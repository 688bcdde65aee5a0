//! The reference grammar engine.
//!
//! Ground truth for ambiguous inputs comes from the *original* grammar's own
//! toolchain. [`ToolchainEngine`] drives it through two external commands: a
//! code generator that is invoked (and blocked on) once when the generated
//! parser modules are missing, and a runner that parses one sample from
//! stdin and prints the parse tree in parenthesized form.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// A node of the reference parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleNode {
    Rule {
        name: String,
        children: Vec<OracleNode>,
    },
    Token {
        text: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The reference parser rejected this particular sample. Recoverable:
    /// the fuzzer simply tries another one.
    #[error("reference parser rejected the sample: {}", sample)]
    NoViableAlternative { sample: String },

    #[error("no such command: {}", command)]
    MissingTool { command: String },

    #[error("command {} failed with status {}", command, status)]
    ToolFailed { command: String, status: i32 },

    #[error("unreadable parse tree from the reference parser: {}", output)]
    MalformedTree { output: String },

    #[error("I/O error while driving the reference toolchain: {}", _0)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Exit code to propagate from the CLI, mirroring the toolchain's own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::MissingTool { .. } => Some(127),
            Self::ToolFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub trait ReferenceEngine {
    fn parse_sample(&mut self, sample: &str) -> Result<OracleNode, EngineError>;
}

impl<E: ReferenceEngine + ?Sized> ReferenceEngine for &mut E {
    fn parse_sample(&mut self, sample: &str) -> Result<OracleNode, EngineError> {
        (**self).parse_sample(sample)
    }
}

/// Reference engine backed by the original grammar's external toolchain.
#[derive(Debug)]
pub struct ToolchainEngine {
    definition: PathBuf,
    lexer: Option<PathBuf>,
    start_rule: Option<String>,
    generate_command: String,
    parse_command: String,
    prepared: bool,
}

impl ToolchainEngine {
    pub fn new(definition: impl Into<PathBuf>, lexer: Option<PathBuf>) -> Self {
        Self {
            definition: definition.into(),
            lexer,
            start_rule: None,
            generate_command: "antlr4".into(),
            parse_command: "antlr4-parse".into(),
            prepared: false,
        }
    }

    pub fn start_rule(mut self, name: impl Into<String>) -> Self {
        self.start_rule = Some(name.into());
        self
    }

    pub fn commands(mut self, generate: impl Into<String>, parse: impl Into<String>) -> Self {
        self.generate_command = generate.into();
        self.parse_command = parse.into();
        self
    }

    /// Generate the reference parser modules if they are not present yet.
    /// Blocking; a missing generator executable or a nonzero exit status is
    /// fatal for the whole run.
    pub fn prepare(&mut self) -> Result<(), EngineError> {
        if self.prepared || self.modules_present() {
            self.prepared = true;
            return Ok(());
        }

        let mut files = vec![self.definition.clone()];
        files.extend(self.lexer.clone());
        for file in files {
            tracing::info!(
                "{} -Dlanguage=JavaScript {}",
                self.generate_command,
                file.display()
            );
            let status = Command::new(&self.generate_command)
                .arg("-Dlanguage=JavaScript")
                .arg(&file)
                .status()
                .map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        EngineError::MissingTool {
                            command: self.generate_command.clone(),
                        }
                    } else {
                        EngineError::Io(err)
                    }
                })?;
            if !status.success() {
                return Err(EngineError::ToolFailed {
                    command: self.generate_command.clone(),
                    status: status.code().unwrap_or(1),
                });
            }
        }
        self.prepared = true;
        Ok(())
    }

    fn modules_present(&self) -> bool {
        let base = base_path(&self.definition);
        let lexer = PathBuf::from(format!("{}Lexer.js", base.display()));
        let parser = PathBuf::from(format!("{}Parser.js", base.display()));
        lexer.exists() && parser.exists()
    }
}

/// Strip an optional `Lexer` suffix and the extension from a definition
/// path, yielding the base the generated modules are named after.
fn base_path(definition: &Path) -> PathBuf {
    let stem = definition
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let stem = stem.strip_suffix("Lexer").unwrap_or(stem);
    definition.with_file_name(stem)
}

impl ReferenceEngine for ToolchainEngine {
    fn parse_sample(&mut self, sample: &str) -> Result<OracleNode, EngineError> {
        self.prepare()?;

        let mut cmd = Command::new(&self.parse_command);
        cmd.arg(&self.definition);
        if let Some(lexer) = &self.lexer {
            cmd.arg(lexer);
        }
        if let Some(start) = &self.start_rule {
            cmd.arg(start);
        }
        cmd.arg("-tree");

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    EngineError::MissingTool {
                        command: self.parse_command.clone(),
                    }
                } else {
                    EngineError::Io(err)
                }
            })?;
        child
            .stdin
            .take()
            .expect("stdin is piped")
            .write_all(sample.as_bytes())?;
        let output = child.wait_with_output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no viable alternative") || stderr.contains("mismatched input") {
            return Err(EngineError::NoViableAlternative {
                sample: sample.into(),
            });
        }
        if !output.status.success() {
            return Err(EngineError::ToolFailed {
                command: self.parse_command.clone(),
                status: output.status.code().unwrap_or(1),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        read_tree(stdout.trim())
    }
}

/// Read a parenthesized parse tree, e.g. `(expr (expr 1) + (expr 2))`.
pub fn read_tree(text: &str) -> Result<OracleNode, EngineError> {
    let mut tokens = tokenize(text).into_iter().peekable();
    let node = read_node(&mut tokens, text)?;
    if tokens.next().is_some() {
        return Err(EngineError::MalformedTree {
            output: text.into(),
        });
    }
    Ok(node)
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn read_node(
    tokens: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
    source: &str,
) -> Result<OracleNode, EngineError> {
    let malformed = || EngineError::MalformedTree {
        output: source.into(),
    };
    match tokens.next().ok_or_else(malformed)?.as_str() {
        "(" => {
            let name = match tokens.next() {
                Some(tok) if tok != "(" && tok != ")" => tok,
                _ => return Err(malformed()),
            };
            let mut children = vec![];
            loop {
                match tokens.peek().map(String::as_str) {
                    Some(")") => {
                        tokens.next();
                        break;
                    }
                    Some(_) => children.push(read_node(tokens, source)?),
                    None => return Err(malformed()),
                }
            }
            Ok(OracleNode::Rule { name, children })
        }
        ")" => Err(malformed()),
        atom => Ok(OracleNode::Token { text: atom.into() }),
    }
}
