//! Nevod syntax tree.
//!
//! Nodes live in a per-package arena and are addressed by `NodeId`. Lexemes are
//! stored once per package; the children of a node (its sub-nodes interleaved
//! with the lexemes between them) are materialized on demand.

pub mod lexer;
pub mod linker;
pub mod parser;

pub use lexer::{Lexeme, TokenId};
pub use parser::{join_name, parse};

use std::ops::Range as IndexRange;

/// Half-open byte range `start..end` into a document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn overlaps(&self, other: TextRange) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of a linked package inside a syntax info table.
pub type FileId = usize;

/// Identity of a node across the linked package forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(file: FileId, node: NodeId) -> Self {
        Self { file, node }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Package,
    RequiredPackage,
    Pattern,
    Field,
    PatternReference,
    FieldReference,
    Extraction,
    ExtractionFromField,
    Sequence,
    WordSequence,
    Conjunction,
    Variation,
    Span,
    Repetition,
    AnySpan,
    WordSpan,
    Inside,
    Outside,
    Having,
    Optionality,
    Exception,
    Token,
    Text,
    PatternSearchTarget,
    NamespaceSearchTarget,
}

impl SyntaxKind {
    pub fn is_search_target(self) -> bool {
        matches!(
            self,
            SyntaxKind::PatternSearchTarget | SyntaxKind::NamespaceSearchTarget
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,
    Punct,
    Symbol,
    Space,
    LineBreak,
    Start,
    End,
    Alpha,
    Num,
    AlphaNum,
    NumAlpha,
}

impl TokenKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "Word" => TokenKind::Word,
            "Punct" => TokenKind::Punct,
            "Symbol" => TokenKind::Symbol,
            "Space" => TokenKind::Space,
            "LineBreak" => TokenKind::LineBreak,
            "Start" => TokenKind::Start,
            "End" => TokenKind::End,
            "Alpha" => TokenKind::Alpha,
            "Num" => TokenKind::Num,
            "AlphaNum" => TokenKind::AlphaNum,
            "NumAlpha" => TokenKind::NumAlpha,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternData {
    pub name: Option<String>,
    /// Qualified name. For an unnamed pattern this is the prefix its nested
    /// patterns are named under.
    pub full_name: String,
    pub namespace: String,
    pub is_search_target: bool,
    pub fields: Vec<NodeId>,
    pub body: Option<NodeId>,
    pub nested: Vec<NodeId>,
    pub master: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Package {
        required_packages: Vec<NodeId>,
        patterns: Vec<NodeId>,
        search_targets: Vec<NodeId>,
    },
    RequiredPackage {
        relative_path: String,
    },
    Pattern(PatternData),
    Field {
        name: String,
        is_internal: bool,
    },
    PatternReference {
        name: String,
        extractions: Vec<NodeId>,
    },
    FieldReference {
        name: String,
    },
    Extraction {
        field_name: String,
    },
    ExtractionFromField {
        field_name: String,
        from_field_name: Option<String>,
    },
    Token {
        kind: TokenKind,
    },
    PatternSearchTarget {
        namespace: String,
        reference: NodeId,
    },
    NamespaceSearchTarget {
        namespace: String,
        target: String,
    },
    None,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: SyntaxKind,
    pub range: TextRange,
    pub parent: Option<NodeId>,
    /// Direct sub-nodes in source order.
    pub subnodes: Vec<NodeId>,
    pub data: NodeData,
    lexemes: IndexRange<usize>,
}

/// One element of a materialized child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Lexeme(usize),
    Node(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub range: TextRange,
    pub message: String,
}

impl SyntaxError {
    pub fn new(range: TextRange, message: impl Into<String>) -> Self {
        Self {
            range,
            message: message.into(),
        }
    }
}

/// Parsed contents of one `.np` file.
#[derive(Debug, Clone)]
pub struct Package {
    pub lexemes: Vec<Lexeme>,
    nodes: Vec<Node>,
    root: NodeId,
    pub errors: Vec<SyntaxError>,
}

impl Package {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> SyntaxKind {
        self.node(id).kind
    }

    pub fn range(&self, id: NodeId) -> TextRange {
        self.node(id).range
    }

    pub fn lexeme(&self, index: usize) -> &Lexeme {
        &self.lexemes[index]
    }

    /// Start of the first lexeme, the end of the text if there is none.
    pub fn first_lexeme_start(&self) -> usize {
        self.lexemes
            .first()
            .map_or(self.range(self.root).end, |lexeme| lexeme.range.start)
    }

    pub fn lexeme_indices(&self, id: NodeId) -> IndexRange<usize> {
        self.node(id).lexemes.clone()
    }

    /// Node range without the trivia trailing its last lexeme.
    pub fn token_range(&self, id: NodeId) -> TextRange {
        let node = self.node(id);
        match node.lexemes.clone().last() {
            Some(last) => TextRange::new(node.range.start, self.lexemes[last].token_end),
            None => node.range,
        }
    }

    pub fn range_of_child(&self, child: Child) -> TextRange {
        match child {
            Child::Lexeme(index) => self.lexemes[index].range,
            Child::Node(id) => self.range(id),
        }
    }

    fn package_lists(&self) -> (&[NodeId], &[NodeId], &[NodeId]) {
        match &self.node(self.root).data {
            NodeData::Package {
                required_packages,
                patterns,
                search_targets,
            } => (required_packages, patterns, search_targets),
            _ => (&[], &[], &[]),
        }
    }

    pub fn required_packages(&self) -> &[NodeId] {
        self.package_lists().0
    }

    /// Top level patterns, including the ones declared inside namespaces.
    pub fn patterns(&self) -> &[NodeId] {
        self.package_lists().1
    }

    pub fn search_targets(&self) -> &[NodeId] {
        self.package_lists().2
    }

    pub fn pattern(&self, id: NodeId) -> Option<&PatternData> {
        match &self.node(id).data {
            NodeData::Pattern(data) => Some(data),
            _ => None,
        }
    }

    pub fn field_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Field { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Sub-nodes interleaved with the lexemes not covered by them.
    pub fn children(&self, id: NodeId) -> Vec<Child> {
        let node = self.node(id);
        let mut children = Vec::new();
        let mut next = node.lexemes.start;
        for &sub in &node.subnodes {
            let sub_lexemes = &self.node(sub).lexemes;
            while next < sub_lexemes.start {
                children.push(Child::Lexeme(next));
                next += 1;
            }
            children.push(Child::Node(sub));
            next = next.max(sub_lexemes.end);
        }
        while next < node.lexemes.end {
            children.push(Child::Lexeme(next));
            next += 1;
        }
        children
    }

    /// All lexemes of a node, ignoring its sub-node structure.
    pub fn leaf_children(&self, id: NodeId) -> Vec<Child> {
        self.node(id).lexemes.clone().map(Child::Lexeme).collect()
    }

    /// A variation synthesized from a system pattern name such as `Any`.
    pub fn is_system_pattern(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.kind == SyntaxKind::Variation
            && node
                .subnodes
                .first()
                .is_some_and(|&first| self.range(first).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_range_contains_is_half_open() {
        let range = TextRange::new(2, 4);
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(TextRange::new(3, 3).is_empty());
    }

    #[test]
    fn test_children_interleave_lexemes_and_nodes() {
        let package = parse("P = A + B;");
        let pattern = package.patterns()[0];
        let children = package.children(pattern);
        // P, =, <body>, ;
        assert_eq!(children.len(), 4);
        assert!(matches!(children[0], Child::Lexeme(_)));
        assert!(matches!(children[2], Child::Node(_)));
        if let Child::Node(body) = children[2] {
            assert_eq!(package.kind(body), SyntaxKind::Sequence);
            assert_eq!(package.children(body).len(), 3);
        }
    }

    #[test]
    fn test_system_pattern_is_desugared() {
        let package = parse("P = Any;");
        let pattern = package.pattern(package.patterns()[0]).unwrap();
        let body = pattern.body.unwrap();
        assert!(package.is_system_pattern(body));
        assert_eq!(package.leaf_children(body).len(), 1);
    }
}
