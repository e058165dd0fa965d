//! Code completion.
//!
//! The lexeme under the cursor and the node owning it decide which candidate
//! sources apply. Keyword completions are appended to every result except
//! when the cursor is inside a string literal; inside a comment there are no
//! completions at all.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tower_lsp::lsp_types::{Location, Position, TextEdit, Url};
use tracing::debug;

use crate::analysis::{range_contains, range_contains_excluding_edges, Analysis, PointedLexeme};
use crate::error::Result;
use crate::info_table::normalize_path;
use crate::resolver;
use crate::syntax::{Child, FileId, NodeData, NodeId, NodeRef, Package, PatternData, SyntaxKind, TextRange, TokenId, TokenKind};
use crate::trivia;
use crate::types::{Completion, CompletionKind};

const KEYWORDS: &[&str] = &[
    "@require",
    "@namespace",
    "@pattern",
    "@search",
    "@inside",
    "@outside",
    "@having",
    "@where",
];

const WORD_ATTRIBUTES: &[&str] = &["Lowercase", "Uppercase", "TitleCase"];

const TEXT_ATTRIBUTES: &[&str] = &[
    "Alpha",
    "Num",
    "AlphaNum",
    "NumAlpha",
    "Lowercase",
    "Uppercase",
    "TitleCase",
];

const TOKENS: &[&str] = &[
    "Word",
    "Punct",
    "Symbol",
    "Space",
    "LineBreak",
    "Start",
    "End",
    "Alpha",
    "Num",
    "AlphaNum",
    "NumAlpha",
    "Blank",
    "WordBreak",
    "Any",
];

fn fixed(kind: CompletionKind, names: &[&str]) -> Vec<Completion> {
    names.iter().map(|name| Completion::new(kind, *name)).collect()
}

/// Completions at `position`, or `None` inside comments and string literals.
pub fn completions(analysis: &Analysis, uri: &Url, position: Position) -> Result<Option<Vec<Completion>>> {
    let pointed = analysis.pointed_lexeme(uri, position, true, true)?;
    if is_position_in_comment(analysis, uri, position, pointed)? {
        return Ok(None);
    }
    let (found, add_keywords) = match pointed {
        Some(pointed) => CompletionContext::new(*analysis, position, pointed).complete()?,
        None => (None, true),
    };
    if !add_keywords {
        return Ok(found);
    }
    let mut completions = found.unwrap_or_default();
    completions.extend(fixed(CompletionKind::Keyword, KEYWORDS));
    Ok(Some(completions))
}

fn is_position_in_comment(
    analysis: &Analysis,
    uri: &Url,
    position: Position,
    pointed: Option<PointedLexeme>,
) -> Result<bool> {
    let document = analysis.document(uri)?;
    let offset = document.offset_at(position)?;
    let range = match pointed {
        Some(pointed) => analysis.syntax(pointed.file).lexeme(pointed.lexeme).range,
        None => {
            let package = analysis.syntax(analysis.file_id(uri)?);
            let start = package.first_lexeme_start();
            if offset < start {
                TextRange::new(0, start)
            } else {
                TextRange::new(0, 0)
            }
        }
    };
    trivia::is_offset_in_comment(offset, document.text(), range)
}

struct CompletionContext<'a> {
    analysis: Analysis<'a>,
    position: Position,
    pointed: PointedLexeme,
    package: &'a Package,
}

/// Candidates found for a context and whether keywords should follow them.
type Found = (Option<Vec<Completion>>, bool);

impl<'a> CompletionContext<'a> {
    fn new(analysis: Analysis<'a>, position: Position, pointed: PointedLexeme) -> Self {
        Self {
            analysis,
            position,
            pointed,
            package: analysis.syntax(pointed.file),
        }
    }

    fn token(&self) -> TokenId {
        self.package.lexeme(self.pointed.lexeme).token
    }

    fn parent(&self) -> NodeRef {
        self.pointed.parent_ref()
    }

    fn lexeme_location(&self) -> Result<Location> {
        self.analysis.lexeme_location(self.pointed.file, self.pointed.lexeme)
    }

    fn cursor_touches_lexeme(&self) -> Result<bool> {
        Ok(range_contains(&self.lexeme_location()?.range, self.position))
    }

    fn cursor_inside_lexeme(&self) -> Result<bool> {
        Ok(range_contains_excluding_edges(&self.lexeme_location()?.range, self.position))
    }

    fn is_first_child(&self) -> bool {
        self.package.children(self.pointed.parent).first() == Some(&Child::Lexeme(self.pointed.lexeme))
    }

    fn child_index(&self) -> Option<usize> {
        self.package
            .children(self.pointed.parent)
            .iter()
            .position(|&child| child == Child::Lexeme(self.pointed.lexeme))
    }

    /// Pattern enclosing the pointed lexeme.
    fn enclosing_pattern(&self) -> Option<NodeId> {
        let parent = self.pointed.parent;
        if self.package.kind(parent) == SyntaxKind::Pattern {
            Some(parent)
        } else {
            resolver::find_parent_pattern(self.package, parent)
        }
    }

    fn complete(&self) -> Result<Found> {
        let found = match self.package.kind(self.pointed.parent) {
            SyntaxKind::Extraction => (self.extraction()?, true),
            SyntaxKind::FieldReference => (self.field_reference()?, true),
            SyntaxKind::ExtractionFromField => (self.extraction_from_field()?, true),
            SyntaxKind::PatternReference => (self.pattern_reference()?, true),
            SyntaxKind::PatternSearchTarget | SyntaxKind::NamespaceSearchTarget => (self.search_target()?, true),
            SyntaxKind::Text => self.text()?,
            SyntaxKind::Token => (self.token_node()?, true),
            SyntaxKind::RequiredPackage => self.required_package()?,
            _ => (self.identifier_if_allowed(), true),
        };
        Ok(found)
    }

    fn extraction(&self) -> Result<Option<Vec<Completion>>> {
        match self.token() {
            TokenId::Identifier if self.cursor_touches_lexeme()? => Ok(self
                .analysis
                .info_pattern(self.parent())
                .map(|pattern| field_completions(self.analysis, pattern))),
            TokenId::Colon => Ok(self.pattern_candidates("").map(with_tokens)),
            _ => Ok(None),
        }
    }

    fn field_reference(&self) -> Result<Option<Vec<Completion>>> {
        if self.token() == TokenId::Identifier && self.cursor_touches_lexeme()? {
            return Ok(self
                .analysis
                .info_pattern(self.parent())
                .map(|pattern| field_completions(self.analysis, pattern)));
        }
        Ok(None)
    }

    fn extraction_from_field(&self) -> Result<Option<Vec<Completion>>> {
        let table = self.analysis.table;
        let referenced = table
            .info(self.parent())
            .and_then(|info| info.pattern_reference)
            .and_then(|reference| table.referenced_pattern(reference));
        let Some(referenced) = referenced.filter(|&pattern| has_fields(self.analysis, pattern)) else {
            return Ok(None);
        };
        match self.token() {
            TokenId::Colon => Ok(Some(field_completions(self.analysis, referenced))),
            TokenId::Identifier => {
                let Some(parent_pattern) = self.enclosing_pattern() else {
                    return Ok(None);
                };
                if !self.cursor_touches_lexeme()? {
                    return Ok(None);
                }
                let source = if self.is_first_child() {
                    NodeRef::new(self.pointed.file, parent_pattern)
                } else {
                    referenced
                };
                Ok(Some(field_completions(self.analysis, source)))
            }
            _ => Ok(None),
        }
    }

    fn pattern_reference(&self) -> Result<Option<Vec<Completion>>> {
        let reference = self.pointed.parent;
        let enclosing = resolver::find_parent_syntax(self.package, reference);
        if let Some(search_target) = enclosing.filter(|&node| self.package.kind(node).is_search_target()) {
            if matches!(self.token(), TokenId::Identifier | TokenId::Period) && self.cursor_touches_lexeme()? {
                let input = self.identifier_before_cursor(&self.package.children(reference), false)?;
                let namespace = search_target_namespace(self.package, search_target);
                return Ok(Some(search_target_completions(
                    self.analysis,
                    self.pointed.file,
                    namespace,
                    &input,
                )));
            }
            return Ok(None);
        }

        let Some(parent_pattern) = self.enclosing_pattern() else {
            return Ok(None);
        };
        match self.token() {
            TokenId::OpenParenthesis | TokenId::Comma => {
                let referenced = self.analysis.table.referenced_pattern(self.parent());
                if referenced.is_some_and(|pattern| has_fields(self.analysis, pattern)) {
                    return Ok(Some(field_completions(
                        self.analysis,
                        NodeRef::new(self.pointed.file, parent_pattern),
                    )));
                }
                Ok(None)
            }
            TokenId::Identifier | TokenId::Period if self.cursor_touches_lexeme()? => {
                let input = self.identifier_before_cursor(&self.package.children(reference), false)?;
                Ok(Some(with_tokens(pattern_completions(
                    self.analysis,
                    self.pointed.file,
                    parent_pattern,
                    &input,
                ))))
            }
            _ => Ok(None),
        }
    }

    fn search_target(&self) -> Result<Option<Vec<Completion>>> {
        let target = self.pointed.parent;
        let namespace = search_target_namespace(self.package, target);
        match self.token() {
            TokenId::SearchKeyword if !self.cursor_touches_lexeme()? => Ok(Some(search_target_completions(
                self.analysis,
                self.pointed.file,
                namespace,
                "",
            ))),
            // `Ns.*` targets keep their name parts as lexemes of the target itself.
            TokenId::Identifier | TokenId::Period if self.cursor_touches_lexeme()? => {
                let input = self.identifier_before_cursor(&self.package.children(target), true)?;
                Ok(Some(search_target_completions(
                    self.analysis,
                    self.pointed.file,
                    namespace,
                    &input,
                )))
            }
            _ => Ok(None),
        }
    }

    fn text(&self) -> Result<Found> {
        match self.token() {
            TokenId::StringLiteral | TokenId::UnterminatedStringLiteral => {
                let inside = self.cursor_inside_lexeme()?;
                Ok((None, !inside))
            }
            TokenId::CloseParenthesis => Ok((None, true)),
            _ => {
                // Attributes follow the string literal and the open parenthesis.
                let after_literal = self.child_index().is_some_and(|index| index >= 1);
                let found = after_literal.then(|| fixed(CompletionKind::TextAttribute, TEXT_ATTRIBUTES));
                Ok((found, true))
            }
        }
    }

    fn token_node(&self) -> Result<Option<Vec<Completion>>> {
        if self.token() == TokenId::Identifier && self.is_first_child() {
            if self.cursor_touches_lexeme()? {
                return Ok(Some(fixed(CompletionKind::Token, TOKENS)));
            }
            return Ok(None);
        }
        let is_word = matches!(
            self.package.node(self.pointed.parent).data,
            NodeData::Token { kind: TokenKind::Word }
        );
        if self.token() != TokenId::CloseParenthesis && is_word && self.child_index().is_some_and(|index| index >= 1) {
            return Ok(Some(fixed(CompletionKind::TextAttribute, WORD_ATTRIBUTES)));
        }
        Ok(None)
    }

    fn required_package(&self) -> Result<Found> {
        if self.token() != TokenId::StringLiteral {
            return Ok((None, true));
        }
        let inside = self.cursor_inside_lexeme()?;
        let text_location = self
            .analysis
            .string_literal_location_without_quotes(self.pointed.file, self.pointed.lexeme)?;
        let trimmed = self.analysis.trim_location(&text_location)?;
        if !range_contains(&trimmed.range, self.position) {
            return Ok((None, !inside));
        }
        let NodeData::RequiredPackage { relative_path } = &self.package.node(self.pointed.parent).data else {
            return Ok((None, !inside));
        };
        let Ok(current_file) = text_location.uri.to_file_path() else {
            return Ok((None, !inside));
        };
        let found = current_file
            .parent()
            .map(|base| path_completions(base, relative_path, &current_file, &text_location));
        Ok((found, !inside))
    }

    fn identifier_if_allowed(&self) -> Option<Vec<Completion>> {
        let parent_is_pattern = self.package.kind(self.pointed.parent) == SyntaxKind::Pattern;
        let allowed = match self.token() {
            TokenId::OpenSquareBracket
            | TokenId::Plus
            | TokenId::Ampersand
            | TokenId::Question
            | TokenId::Equal
            | TokenId::Underscore
            | TokenId::DoublePeriod
            | TokenId::Ellipsis
            | TokenId::InsideKeyword
            | TokenId::OutsideKeyword
            | TokenId::HavingKeyword => true,
            // Not inside a field list or right after `@where {`.
            TokenId::OpenParenthesis | TokenId::Comma | TokenId::OpenCurlyBrace => !parent_is_pattern,
            _ => false,
        };
        if !allowed {
            return None;
        }
        self.pattern_candidates("").map(with_tokens)
    }

    fn pattern_candidates(&self, input: &str) -> Option<Vec<Completion>> {
        self.enclosing_pattern()
            .map(|pattern| pattern_completions(self.analysis, self.pointed.file, pattern, input))
    }

    /// Dotted name typed in `children` up to the cursor.
    fn identifier_before_cursor(&self, children: &[Child], skip_keywords: bool) -> Result<String> {
        let document = self.analysis.document_of(self.pointed.file)?;
        let text = document.text();
        let offset = document.offset_at(self.position)?;
        let mut parts = children.iter().copied().peekable();
        if skip_keywords {
            while let Some(Child::Lexeme(index)) = parts.peek().copied() {
                let token = self.package.lexeme(index).token;
                if token != TokenId::SearchKeyword && token != TokenId::PatternKeyword {
                    break;
                }
                parts.next();
            }
        }
        let mut identifier = String::new();
        for child in parts {
            let mut range = self.package.range_of_child(child);
            if offset <= range.start {
                break;
            }
            let Child::Lexeme(index) = child else {
                break;
            };
            if offset < range.end {
                range = TextRange::new(range.start, offset);
            }
            match self.package.lexeme(index).token {
                TokenId::Identifier => {
                    let trimmed = trivia::trim_end_trivia(text, range)?;
                    identifier.push_str(&text[trimmed.start..trimmed.end]);
                }
                TokenId::Period => identifier.push('.'),
                TokenId::Asterisk => identifier.push('*'),
                _ => break,
            }
        }
        Ok(identifier)
    }
}

fn with_tokens(mut completions: Vec<Completion>) -> Vec<Completion> {
    completions.extend(fixed(CompletionKind::Token, TOKENS));
    completions
}

fn has_fields(analysis: Analysis, pattern: NodeRef) -> bool {
    analysis
        .syntax(pattern.file)
        .pattern(pattern.node)
        .is_some_and(|data| !data.fields.is_empty())
}

fn field_completions(analysis: Analysis, pattern: NodeRef) -> Vec<Completion> {
    let package = analysis.syntax(pattern.file);
    package
        .pattern(pattern.node)
        .map(|data| {
            data.fields
                .iter()
                .filter_map(|&field| package.field_name(field))
                .map(|name| Completion::new(CompletionKind::Field, name))
                .collect()
        })
        .unwrap_or_default()
}

fn search_target_namespace(package: &Package, target: NodeId) -> &str {
    match &package.node(target).data {
        NodeData::PatternSearchTarget { namespace, .. } | NodeData::NamespaceSearchTarget { namespace, .. } => namespace,
        _ => "",
    }
}

// ============================================================================
// Candidate collection
// ============================================================================

/// Candidates in the order they were found, deduplicated by spelling.
struct Candidates<'i> {
    input: &'i str,
    fields: Vec<String>,
    patterns: Vec<Completion>,
    spellings: HashSet<String>,
    namespaces: Vec<String>,
}

impl<'i> Candidates<'i> {
    fn new(input: &'i str) -> Self {
        Self {
            input,
            fields: Vec::new(),
            patterns: Vec::new(),
            spellings: HashSet::new(),
            namespaces: Vec::new(),
        }
    }

    fn add_field(&mut self, name: &str) {
        if !self.fields.iter().any(|field| field == name) {
            self.fields.push(name.to_string());
        }
    }

    fn add_namespace(&mut self, namespace: &str) {
        if !namespace.is_empty() && !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
    }

    /// Adds the first usable spelling of pattern `name`. A spelling is usable
    /// when it is not taken yet and either it or the short name starts with
    /// the typed text.
    fn add_pattern(&mut self, name: &str, spellings: &[Option<String>]) {
        for spelling in spellings.iter().flatten() {
            if self.spellings.contains(spelling) || self.fields.contains(spelling) {
                continue;
            }
            if !name.starts_with(self.input) && !spelling.starts_with(self.input) {
                continue;
            }
            if spelling.len() == name.len() {
                self.spellings.insert(name.to_string());
                self.patterns.push(Completion::new(CompletionKind::Pattern, name));
                return;
            }
            let qualifier = spelling
                .strip_suffix(name)
                .and_then(|rest| rest.strip_suffix('.'))
                .filter(|qualifier| !qualifier.is_empty());
            if let Some(qualifier) = qualifier {
                self.spellings.insert(spelling.clone());
                self.patterns.push(Completion::with_insert_text(
                    CompletionKind::Pattern,
                    name,
                    Some(qualifier.to_string()),
                    spelling.as_str(),
                ));
                return;
            }
        }
    }

    /// Fields, then patterns, then namespaces relative to `base_namespace`.
    fn finish(self, base_namespace: &str) -> Vec<Completion> {
        let namespaces = namespace_completions(&self.namespaces, base_namespace, self.input);
        self.fields
            .iter()
            .map(|field| Completion::new(CompletionKind::Field, field.as_str()))
            .chain(self.patterns)
            .chain(namespaces)
            .collect()
    }
}

/// Namespaces under `base` that start with the typed text. The part already
/// typed up to the last period is left out of the label.
fn namespace_completions(namespaces: &[String], base: &str, input: &str) -> Vec<Completion> {
    let scope_len = input.rfind('.').map_or(0, |index| index + 1);
    namespaces
        .iter()
        .filter_map(|namespace| {
            if base.is_empty() {
                Some(namespace.as_str())
            } else {
                namespace.strip_prefix(base).and_then(|rest| rest.strip_prefix('.'))
            }
        })
        .filter(|relative| relative.starts_with(input) && relative.len() > scope_len)
        .map(|relative| {
            if scope_len == 0 {
                Completion::new(CompletionKind::Namespace, relative)
            } else {
                Completion::with_insert_text(
                    CompletionKind::Namespace,
                    &relative[scope_len..],
                    Some(relative[..scope_len - 1].to_string()),
                    relative,
                )
            }
        })
        .collect()
}

/// Calls `visit` for every pattern in `roots` and, while `visit` returns
/// true, for its nested patterns.
fn walk_patterns(package: &Package, roots: &[NodeId], visit: &mut dyn FnMut(NodeId, &PatternData) -> bool) {
    for &root in roots {
        if let Some(data) = package.pattern(root) {
            if visit(root, data) {
                walk_patterns(package, &data.nested, visit);
            }
        }
    }
}

/// Name of `full_name` below `prefix`.
fn relative_name<'n>(full_name: &'n str, prefix: &str) -> &'n str {
    match full_name.strip_prefix(prefix) {
        Some(rest) => rest.strip_prefix('.').unwrap_or(rest),
        None => full_name,
    }
}

fn name_without_common_namespace(pattern: &PatternData, namespace: &str) -> Option<String> {
    let shares_namespace = pattern.namespace == namespace
        || pattern
            .namespace
            .strip_prefix(namespace)
            .is_some_and(|rest| rest.starts_with('.'));
    let usable = !namespace.is_empty()
        && !pattern.namespace.is_empty()
        && shares_namespace
        && pattern.full_name.len() >= namespace.len() + 2;
    usable.then(|| pattern.full_name[namespace.len() + 1..].to_string())
}

/// Files required by `file`, directly or through other required files.
fn required_files(analysis: Analysis, file: FileId) -> Vec<FileId> {
    let mut seen = HashSet::from([file]);
    let mut queue = VecDeque::from([file]);
    let mut result = Vec::new();
    while let Some(current) = queue.pop_front() {
        for next in analysis.table.package(current).required_files() {
            if seen.insert(next) {
                result.push(next);
                queue.push_back(next);
            }
        }
    }
    result
}

/// Fields, patterns and namespaces visible from `pattern`.
fn pattern_completions(analysis: Analysis, file: FileId, pattern: NodeId, input: &str) -> Vec<Completion> {
    let package = analysis.syntax(file);
    let Some(data) = package.pattern(pattern) else {
        return Vec::new();
    };
    let mut candidates = Candidates::new(input);
    for &field in &data.fields {
        if let Some(name) = package.field_name(field) {
            candidates.add_field(name);
        }
    }

    walk_patterns(package, &data.nested, &mut |_, nested| {
        candidates.add_namespace(&nested.namespace);
        if let Some(name) = &nested.name {
            let short_name = relative_name(&nested.full_name, &data.full_name);
            let with_master = data.name.as_ref().map(|own| format!("{}.{}", own, short_name));
            candidates.add_pattern(
                name,
                &[
                    Some(short_name.to_string()),
                    with_master,
                    name_without_common_namespace(nested, &data.namespace),
                    Some(nested.full_name.clone()),
                ],
            );
        }
        true
    });

    if let Some(master) = data.master.and_then(|master| package.pattern(master)) {
        walk_patterns(package, &master.nested, &mut |node, neighbour| {
            candidates.add_namespace(&neighbour.namespace);
            if let Some(name) = &neighbour.name {
                let short_name = relative_name(&neighbour.full_name, &master.full_name);
                candidates.add_pattern(
                    name,
                    &[
                        Some(short_name.to_string()),
                        name_without_common_namespace(neighbour, &data.namespace),
                        Some(neighbour.full_name.clone()),
                    ],
                );
            }
            node != pattern
        });
    }

    let mut add_package_pattern = |node: NodeId, other: &PatternData| {
        candidates.add_namespace(&other.namespace);
        if let Some(name) = &other.name {
            candidates.add_pattern(
                name,
                &[
                    name_without_common_namespace(other, &data.namespace),
                    Some(other.full_name.clone()),
                ],
            );
        }
        node != pattern && Some(node) != data.master
    };
    walk_patterns(package, package.patterns(), &mut |node, other| add_package_pattern(node, other));
    for required in required_files(analysis, file) {
        let required_package = analysis.syntax(required);
        walk_patterns(required_package, required_package.patterns(), &mut |_, other| {
            add_package_pattern(NodeId(u32::MAX), other)
        });
    }

    candidates.finish("")
}

/// Patterns and namespaces for a `@search` target declared in `namespace`.
fn search_target_completions(analysis: Analysis, file: FileId, namespace: &str, input: &str) -> Vec<Completion> {
    let mut candidates = Candidates::new(input);
    let files = std::iter::once(file).chain(required_files(analysis, file));
    for current in files {
        let package = analysis.syntax(current);
        walk_patterns(package, package.patterns(), &mut |_, pattern| {
            candidates.add_namespace(&pattern.namespace);
            if let Some(name) = &pattern.name {
                let spelling = if namespace.is_empty() {
                    Some(pattern.full_name.as_str())
                } else {
                    pattern
                        .full_name
                        .strip_prefix(namespace)
                        .and_then(|rest| rest.strip_prefix('.'))
                };
                if let Some(spelling) = spelling {
                    candidates.add_pattern(name, &[Some(spelling.to_string())]);
                }
            }
            true
        });
    }
    candidates.finish(namespace)
}

// ============================================================================
// Paths
// ============================================================================

fn is_file_system_case_insensitive() -> bool {
    static CASE_INSENSITIVE: OnceLock<bool> = OnceLock::new();
    *CASE_INSENSITIVE.get_or_init(|| {
        let Some(directory) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        else {
            return false;
        };
        let text = directory.to_string_lossy();
        Path::new(&text.to_uppercase()).is_dir() && Path::new(&text.to_lowercase()).is_dir()
    })
}

fn comparable_path(path: &Path) -> String {
    let text = normalize_path(path).to_string_lossy().into_owned();
    if is_file_system_case_insensitive() {
        text.to_lowercase()
    } else {
        text
    }
}

/// `.np` files and directories matching the path typed in a `@require`
/// string. Each completion replaces the whole typed path.
fn path_completions(base_directory: &Path, input: &str, current_file: &Path, text_location: &Location) -> Vec<Completion> {
    let typed = input.trim_matches(' ');
    let has_no_file_name = typed.is_empty() || typed.ends_with(['/', '\\']);
    let combine = |name: &str| -> String {
        if has_no_file_name {
            return format!("{}{}", typed, name);
        }
        match typed.rfind(['/', '\\']) {
            Some(index) => format!("{}{}", &typed[..=index], name),
            None => name.to_string(),
        }
    };

    let typed_path = Path::new(typed);
    let path = if typed_path.is_absolute() {
        typed_path.to_path_buf()
    } else {
        base_directory.join(typed_path)
    };
    let directory: Option<PathBuf> = if has_no_file_name {
        Some(path)
    } else {
        path.parent().map(Path::to_path_buf)
    };
    let Some(directory) = directory.filter(|directory| directory.is_dir()) else {
        return Vec::new();
    };
    let entries = match std::fs::read_dir(&directory) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list {}: {}", directory.display(), e);
            return Vec::new();
        }
    };

    let current = comparable_path(current_file);
    let mut files = Vec::new();
    let mut directories = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            continue;
        };
        if path.is_dir() {
            directories.push(name);
        } else if path.extension().is_some_and(|extension| extension == "np") && comparable_path(&path) != current {
            files.push(name);
        }
    }
    files.sort();
    directories.sort();

    let completion = |kind: CompletionKind, name: &str| {
        let insert_path = combine(name);
        let edit = TextEdit::new(text_location.range, insert_path.clone());
        Completion::with_text_edit(kind, name, edit, insert_path)
    };
    files
        .iter()
        .map(|name| completion(CompletionKind::FilePath, name))
        .chain(directories.iter().map(|name| completion(CompletionKind::DirectoryPath, name)))
        .collect()
}
