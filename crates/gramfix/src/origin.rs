//! Derivation reconstruction from shared-origin traces.
//!
//! The parser generator reports, for every conflict, a free-text trace of
//! the partial derivations that reach the ambiguous position. This module
//! rebuilds approximate parse-tree skeletons from that trace; their leaves
//! are rule/token names the oracle later replaces with fuzzed samples.

use crate::conflict::MARKER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationNode {
    pub name: String,
    pub children: Vec<DerivationNode>,
}

impl DerivationNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: vec![],
        }
    }

    fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut DerivationNode> {
        let mut node = self;
        for &idx in path {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("empty origin trace")]
    Empty,

    #[error("missing `->' in origin line: {}", line)]
    MissingArrow { line: String },

    #[error("expected exactly one `·' in origin line: {}", line)]
    MarkerCount { line: String },

    #[error("unexpected indentation step in origin line: {}", line)]
    IndentStep { line: String },

    #[error("derivation continues past a dangling marker at origin line: {}", line)]
    DanglingMarker { line: String },
}

/// Rebuild the derivation trees encoded in a shared-origin trace.
///
/// An indentation decrease starts a new tree: the trace walked deeper along
/// one alternative, then backtracked to a 2-space level to record a second
/// alternative diverging from the same root. All trees share the root-level
/// rule; the divergent tree re-enters at the child index marked by the
/// first line.
pub fn reconstruct(origin: &str) -> Result<Vec<DerivationNode>, OriginError> {
    let lines: Vec<&str> = origin
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect();
    let first = lines.first().ok_or(OriginError::Empty)?;

    let root_name = first
        .trim()
        .split_whitespace()
        .next()
        .ok_or(OriginError::Empty)?;

    let mut trees = vec![DerivationNode::new(root_name)];
    // Path from the current tree's root to the node the next line expands.
    let mut path: Vec<usize> = vec![];
    let mut last_indent = 0;
    let mut first_line_next_parent: Option<usize> = None;

    for line in lines {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let rest = line.trim_start_matches(' ');

        if indent < last_indent {
            // Backtrack in the trace: start a new tree that shares the root
            // and its direct children (names only), then re-enter at the
            // child the first line marked.
            if indent != 2 {
                return Err(OriginError::IndentStep { line: line.into() });
            }
            let next_parent =
                first_line_next_parent.ok_or_else(|| OriginError::DanglingMarker {
                    line: line.into(),
                })?;
            let root = &trees[0];
            let fork = DerivationNode {
                name: root.name.clone(),
                children: root
                    .children
                    .iter()
                    .map(|child| DerivationNode::new(child.name.clone()))
                    .collect(),
            };
            if next_parent >= fork.children.len() {
                return Err(OriginError::DanglingMarker { line: line.into() });
            }
            trees.push(fork);
            path = vec![next_parent];
        }

        let mut tokens = rest.split_whitespace().peekable();
        if tokens.peek() == Some(&"via") {
            tokens.next();
        }
        tokens.next(); // rule name
        if tokens.next() != Some("->") {
            return Err(OriginError::MissingArrow { line: line.into() });
        }

        let tree = trees.last_mut().expect("at least one tree");
        let node = tree
            .at_path_mut(&path)
            .ok_or_else(|| OriginError::DanglingMarker { line: line.into() })?;

        let mut next_parent = None;
        for token in tokens {
            if token == MARKER {
                if next_parent.is_some() {
                    return Err(OriginError::MarkerCount { line: line.into() });
                }
                next_parent = Some(node.children.len());
                if first_line_next_parent.is_none() {
                    first_line_next_parent = next_parent;
                }
                continue;
            }
            node.children.push(DerivationNode::new(token));
        }
        let next_parent = next_parent.ok_or_else(|| OriginError::MarkerCount {
            line: line.into(),
        })?;

        path.push(next_parent);
        last_indent = indent;
    }

    Ok(trees)
}
