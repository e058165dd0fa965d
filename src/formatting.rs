//! Whitespace formatting of Nevod packages.
//!
//! Every pair of adjacent lexemes is matched against an ordered rule list;
//! the first matching rule decides whether the gap between them becomes a
//! single space, nothing, or a line break. Lines that start with a lexeme are
//! re-indented by nesting depth. Only whitespace is ever changed.

use std::sync::OnceLock;

use tower_lsp::lsp_types::Position;
use tracing::trace;

use crate::config::{FormattingConfiguration, FormattingOptions};
use crate::document::Document;
use crate::error::Result;
use crate::syntax::{Child, NodeId, Package, SyntaxKind, TextRange, TokenId};
use crate::trivia::{self, LexemeTriviaInfo, Trivia, TriviaKind};
use crate::types::SourceEdit;

const BINARY_OPERATORS: &[TokenId] = &[
    TokenId::Plus,
    TokenId::Underscore,
    TokenId::Ellipsis,
    TokenId::DoublePeriod,
    TokenId::Equal,
    TokenId::Ampersand,
    TokenId::InsideKeyword,
    TokenId::OutsideKeyword,
    TokenId::HavingKeyword,
];

const UNARY_OPERATORS: &[TokenId] = &[TokenId::Question, TokenId::Tilde, TokenId::HashSign];

const OPEN_BRACES: &[TokenId] = &[
    TokenId::OpenParenthesis,
    TokenId::OpenCurlyBrace,
    TokenId::OpenSquareBracket,
];

const CLOSE_BRACES: &[TokenId] = &[
    TokenId::CloseParenthesis,
    TokenId::CloseCurlyBrace,
    TokenId::CloseSquareBracket,
];

const ATTRIBUTE_TOKENS: &[TokenId] = &[
    TokenId::Identifier,
    TokenId::IntegerLiteral,
    TokenId::Plus,
    TokenId::Minus,
];

const NUMERIC_RANGE_TOKENS: &[TokenId] = &[TokenId::IntegerLiteral, TokenId::Plus, TokenId::Minus];

const IDENTIFIER_PARTS: &[TokenId] = &[TokenId::Identifier, TokenId::Asterisk];

const PERIOD: &[TokenId] = &[TokenId::Period];

const NON_OPERATOR_KEYWORDS: &[TokenId] = &[
    TokenId::PatternKeyword,
    TokenId::SearchKeyword,
    TokenId::RequireKeyword,
    TokenId::NamespaceKeyword,
    TokenId::WhereKeyword,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormattingAction {
    AddWhitespace,
    DeleteWhitespace,
    AddNewLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewLineAction {
    None,
    Delete,
    Add,
}

#[derive(Debug, Clone, Copy)]
enum TokenMatch {
    Any,
    One(TokenId),
    Set(&'static [TokenId]),
}

impl TokenMatch {
    fn matches(self, token: TokenId) -> bool {
        match self {
            TokenMatch::Any => true,
            TokenMatch::One(expected) => expected == token,
            TokenMatch::Set(tokens) => tokens.contains(&token),
        }
    }
}

/// The two lexemes around a gap and the innermost node containing both.
#[derive(Debug, Clone, Copy)]
struct FormattingContext {
    left_token: TokenId,
    left_parent: SyntaxKind,
    right_token: TokenId,
    right_parent: SyntaxKind,
    common: SyntaxKind,
}

#[derive(Debug, Clone, Copy)]
struct FormattingRule {
    name: &'static str,
    action: FormattingAction,
    can_delete_new_line: bool,
    left: TokenMatch,
    left_parent: Option<SyntaxKind>,
    right: TokenMatch,
    right_parent: Option<SyntaxKind>,
    check: Option<fn(&FormattingContext) -> bool>,
}

impl FormattingRule {
    fn new(name: &'static str, action: FormattingAction, left: TokenMatch, right: TokenMatch) -> Self {
        Self {
            name,
            action,
            can_delete_new_line: false,
            left,
            left_parent: None,
            right,
            right_parent: None,
            check: None,
        }
    }

    fn deleting_new_line(mut self) -> Self {
        self.can_delete_new_line = true;
        self
    }

    fn parents(mut self, left: Option<SyntaxKind>, right: Option<SyntaxKind>) -> Self {
        self.left_parent = left;
        self.right_parent = right;
        self
    }

    fn when(mut self, check: fn(&FormattingContext) -> bool) -> Self {
        self.check = Some(check);
        self
    }

    fn applies(&self, context: &FormattingContext) -> bool {
        self.left.matches(context.left_token)
            && self.left_parent.map_or(true, |kind| kind == context.left_parent)
            && self.right.matches(context.right_token)
            && self.right_parent.map_or(true, |kind| kind == context.right_parent)
            && self.check.map_or(true, |check| check(context))
    }
}

fn is_binary_operator_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Sequence
            | SyntaxKind::WordSequence
            | SyntaxKind::AnySpan
            | SyntaxKind::WordSpan
            | SyntaxKind::Conjunction
            | SyntaxKind::Inside
            | SyntaxKind::Outside
            | SyntaxKind::Having
            // `=` of a pattern
            | SyntaxKind::Pattern
    )
}

fn is_unary_operator_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Optionality | SyntaxKind::Exception | SyntaxKind::Field
    )
}

fn is_brace_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Variation
            | SyntaxKind::Span
            | SyntaxKind::PatternReference
            | SyntaxKind::WordSpan
            | SyntaxKind::Pattern
            | SyntaxKind::Token
            | SyntaxKind::Text
    )
}

fn is_comma_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Variation
            | SyntaxKind::Span
            | SyntaxKind::PatternReference
            | SyntaxKind::Pattern
            | SyntaxKind::Token
            | SyntaxKind::Text
    )
}

fn is_field_list_or_attributes_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Pattern | SyntaxKind::PatternReference | SyntaxKind::Token | SyntaxKind::Text
    )
}

fn is_attributes_context(context: &FormattingContext) -> bool {
    matches!(context.common, SyntaxKind::Token | SyntaxKind::Text)
}

fn is_numeric_range_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Repetition | SyntaxKind::WordSpan | SyntaxKind::Token | SyntaxKind::Text
    )
}

fn is_after_numeric_range_in_repetition(context: &FormattingContext) -> bool {
    NUMERIC_RANGE_TOKENS.contains(&context.left_token) && context.common == SyntaxKind::Repetition
}

fn is_extraction_context(context: &FormattingContext) -> bool {
    matches!(
        context.common,
        SyntaxKind::Extraction | SyntaxKind::ExtractionFromField | SyntaxKind::WordSpan
    )
}

fn is_multipart_identifier_context(context: &FormattingContext) -> bool {
    matches!(context.common, SyntaxKind::PatternReference | SyntaxKind::Pattern)
}

fn is_statement_context(context: &FormattingContext) -> bool {
    matches!(context.common, SyntaxKind::Pattern | SyntaxKind::RequiredPackage)
}

/// Rules in priority order; the first one that applies wins.
fn formatting_rules(configuration: &FormattingConfiguration) -> Vec<FormattingRule> {
    use FormattingAction::*;
    use TokenMatch::{Any, One, Set};

    let pattern = Some(SyntaxKind::Pattern);
    let mut rules = Vec::new();
    if configuration.place_open_brace_on_new_line {
        rules.push(
            FormattingRule::new(
                "NewLineAfterWhereKeywordInPattern",
                AddNewLine,
                One(TokenId::WhereKeyword),
                One(TokenId::OpenCurlyBrace),
            )
            .parents(pattern, pattern),
        );
    } else {
        rules.push(
            FormattingRule::new(
                "WhitespaceBetweenWhereKeywordAndOpenCurlyBrace",
                AddWhitespace,
                One(TokenId::WhereKeyword),
                One(TokenId::OpenCurlyBrace),
            )
            .parents(pattern, pattern)
            .deleting_new_line(),
        );
    }
    rules.extend([
        FormattingRule::new(
            "NewLineAfterOpenCurlyBraceInPattern",
            AddNewLine,
            One(TokenId::OpenCurlyBrace),
            Any,
        )
        .parents(pattern, None),
        FormattingRule::new(
            "NewLineBeforeCloseCurlyBraceInPattern",
            AddNewLine,
            Any,
            One(TokenId::CloseCurlyBrace),
        )
        .parents(None, pattern),
        FormattingRule::new("WhitespaceBeforeWhereKeyword", AddWhitespace, Any, One(TokenId::WhereKeyword))
            .parents(None, pattern),
        FormattingRule::new("WhitespaceBeforeBinaryOperator", AddWhitespace, Any, Set(BINARY_OPERATORS))
            .when(is_binary_operator_context),
        FormattingRule::new("WhitespaceAfterBinaryOperator", AddWhitespace, Set(BINARY_OPERATORS), Any)
            .when(is_binary_operator_context),
        FormattingRule::new("WhitespaceAfterKeyword", AddWhitespace, Set(NON_OPERATOR_KEYWORDS), Any),
        FormattingRule::new("NoWhitespaceAfterUnaryOperator", DeleteWhitespace, Set(UNARY_OPERATORS), Any)
            .when(is_unary_operator_context),
        FormattingRule::new("NoWhitespaceAfterOpenBrace", DeleteWhitespace, Set(OPEN_BRACES), Any)
            .when(is_brace_context),
        FormattingRule::new("NoWhitespaceBeforeCloseBrace", DeleteWhitespace, Any, Set(CLOSE_BRACES))
            .when(is_brace_context),
        FormattingRule::new("WhitespaceAfterComma", AddWhitespace, One(TokenId::Comma), Any).when(is_comma_context),
        FormattingRule::new("NoWhitespaceBeforeComma", DeleteWhitespace, Any, One(TokenId::Comma))
            .when(is_comma_context),
        FormattingRule::new(
            "NoWhitespaceBeforeOpenParenthesisInFieldsOrAttributes",
            DeleteWhitespace,
            Any,
            One(TokenId::OpenParenthesis),
        )
        .when(is_field_list_or_attributes_context),
        // Must precede WhitespaceBetweenAttributes so `1-3` inside attributes stays tight.
        FormattingRule::new(
            "NoWhitespaceInNumericRange",
            DeleteWhitespace,
            Set(NUMERIC_RANGE_TOKENS),
            Set(NUMERIC_RANGE_TOKENS),
        )
        .when(is_numeric_range_context),
        FormattingRule::new(
            "WhitespaceBetweenAttributes",
            AddWhitespace,
            Set(ATTRIBUTE_TOKENS),
            Set(ATTRIBUTE_TOKENS),
        )
        .when(is_attributes_context),
        FormattingRule::new(
            "WhitespaceAfterNumericRangeInRepetition",
            AddWhitespace,
            Set(NUMERIC_RANGE_TOKENS),
            Any,
        )
        .when(is_after_numeric_range_in_repetition),
        FormattingRule::new(
            "NoWhitespaceBeforeColonInExtraction",
            DeleteWhitespace,
            Any,
            One(TokenId::Colon),
        )
        .when(is_extraction_context),
        FormattingRule::new("WhitespaceAfterColonInExtraction", AddWhitespace, One(TokenId::Colon), Any)
            .when(is_extraction_context),
        FormattingRule::new(
            "NoWhitespaceBeforePeriodInMultipartIdentifier",
            DeleteWhitespace,
            Set(IDENTIFIER_PARTS),
            Set(PERIOD),
        )
        .when(is_multipart_identifier_context),
        FormattingRule::new(
            "NoWhitespaceAfterPeriodInMultipartIdentifier",
            DeleteWhitespace,
            Set(PERIOD),
            Set(IDENTIFIER_PARTS),
        )
        .when(is_multipart_identifier_context),
        FormattingRule::new(
            "WhitespaceAfterWordSpanRange",
            AddWhitespace,
            One(TokenId::CloseSquareBracket),
            Any,
        )
        .parents(Some(SyntaxKind::WordSpan), None),
        FormattingRule::new("NoWhitespaceBeforeSemicolon", DeleteWhitespace, Any, One(TokenId::Semicolon))
            .when(is_statement_context)
            .deleting_new_line(),
        FormattingRule::new(
            "NoWhitespaceAfterHashSignInPatternName",
            DeleteWhitespace,
            One(TokenId::HashSign),
            One(TokenId::Identifier),
        )
        .parents(pattern, pattern)
        .deleting_new_line(),
        // A parenthesized expression has no node of its own, so these come last.
        FormattingRule::new(
            "NoWhitespaceAfterOpenParenthesis",
            DeleteWhitespace,
            One(TokenId::OpenParenthesis),
            Any,
        ),
        FormattingRule::new(
            "NoWhitespaceBeforeCloseParenthesis",
            DeleteWhitespace,
            Any,
            One(TokenId::CloseParenthesis),
        ),
    ]);
    rules
}

/// Formatting rules built for the current configuration.
#[derive(Debug, Default)]
pub struct Formatter {
    configuration: FormattingConfiguration,
    rules: OnceLock<Vec<FormattingRule>>,
}

impl Formatter {
    pub fn new(configuration: FormattingConfiguration) -> Self {
        Self {
            configuration,
            rules: OnceLock::new(),
        }
    }

    /// Replaces the configuration; rules are rebuilt on next use.
    pub fn update_configuration(&mut self, configuration: FormattingConfiguration) {
        self.configuration = configuration;
        self.rules = OnceLock::new();
    }

    fn rules(&self) -> &[FormattingRule] {
        self.rules.get_or_init(|| formatting_rules(&self.configuration))
    }

    pub fn format_document(&self, document: &Document, options: &FormattingOptions) -> Result<Vec<SourceEdit>> {
        let range = TextRange::new(0, document.text().len());
        self.format_range(document, range, options)
    }

    /// Edits for lexemes overlapping `range`. Lexemes outside it are still
    /// visited so spacing and indentation at the range edges are known.
    pub fn format_range(&self, document: &Document, range: TextRange, options: &FormattingOptions) -> Result<Vec<SourceEdit>> {
        let package = document.package();
        let text = document.text();
        let new_line = match &options.new_line {
            Some(new_line) => new_line.clone(),
            None => detect_new_line(text).to_string(),
        };
        let leading = trivia::lexeme_trivia_info(text, TextRange::new(0, package.first_lexeme_start()))?;
        let mut visitor = FormattingVisitor {
            document,
            package: &package,
            text,
            rules: self.rules(),
            options,
            new_line,
            range,
            edits: Vec::new(),
            indentation: 0,
            is_last_trivia_new_line: is_whitespace_or_new_line_only(&leading.trivia)
                || is_last_trivia_new_line(&leading.trivia),
            context: None,
            previous: None,
            previous_trivia: leading,
        };
        visitor.visit_node(package.root(), None, 0)?;
        Ok(visitor.edits)
    }
}

/// `\r\n` when the text already uses it, `\n` otherwise.
/// Text without any line break gets `\n` rather than the platform default.
pub fn detect_new_line(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn is_whitespace_or_new_line_only(trivia: &[Trivia]) -> bool {
    trivia
        .iter()
        .all(|t| matches!(t.kind, TriviaKind::Whitespaces | TriviaKind::NewLine))
}

fn is_last_trivia_new_line(trivia: &[Trivia]) -> bool {
    match trivia {
        [.., last] if last.kind == TriviaKind::NewLine => true,
        [.., before, last] => last.kind == TriviaKind::Whitespaces && before.kind == TriviaKind::NewLine,
        _ => false,
    }
}

struct FormattingVisitor<'a> {
    document: &'a Document,
    package: &'a Package,
    text: &'a str,
    rules: &'a [FormattingRule],
    options: &'a FormattingOptions,
    new_line: String,
    range: TextRange,
    edits: Vec<SourceEdit>,
    indentation: u32,
    is_last_trivia_new_line: bool,
    /// Innermost node holding both the previous and the current lexeme.
    context: Option<SyntaxKind>,
    previous: Option<(TokenId, SyntaxKind)>,
    previous_trivia: LexemeTriviaInfo,
}

impl<'a> FormattingVisitor<'a> {
    fn overlaps(&self, range: TextRange) -> bool {
        self.range.overlaps(range)
    }

    /// System patterns such as `Any` are formatted as plain tokens.
    fn kind(&self, node: NodeId) -> SyntaxKind {
        if self.package.is_system_pattern(node) {
            SyntaxKind::Token
        } else {
            self.package.kind(node)
        }
    }

    fn children(&self, node: NodeId) -> Vec<Child> {
        if self.package.is_system_pattern(node) {
            self.package.leaf_children(node)
        } else {
            self.package.children(node)
        }
    }

    fn line(&self, offset: usize) -> Result<u32> {
        Ok(self.document.position_at(offset)?.line)
    }

    fn visit_node(&mut self, node: NodeId, parent: Option<NodeId>, parent_indentation: u32) -> Result<()> {
        let range = self.package.range(node);
        if !self.overlaps(range) {
            return self.visit_rightmost_lexeme(node);
        }
        let kind = self.kind(node);
        let node_line = self.line(range.start)?;
        for child in self.children(node) {
            match child {
                Child::Lexeme(index) => self.visit_lexeme(index, node, parent, parent_indentation)?,
                Child::Node(sub) => {
                    let saved = self.indentation;
                    let child_line = self.line(self.package.range(sub).start)?;
                    if node_line != child_line && kind != SyntaxKind::Package {
                        self.indentation = saved + self.options.tab_size;
                    }
                    self.visit_node(sub, Some(node), saved)?;
                    self.indentation = saved;
                }
            }
            self.context = Some(kind);
        }
        Ok(())
    }

    fn visit_rightmost_lexeme(&mut self, mut node: NodeId) -> Result<()> {
        loop {
            match self.children(node).last() {
                Some(&Child::Lexeme(index)) => return self.visit_lexeme(index, node, None, 0),
                Some(&Child::Node(sub)) => node = sub,
                None => return Ok(()),
            }
        }
    }

    fn visit_lexeme(
        &mut self,
        index: usize,
        parent: NodeId,
        grandparent: Option<NodeId>,
        grandparent_indentation: u32,
    ) -> Result<()> {
        let lexeme = *self.package.lexeme(index);
        let info = trivia::lexeme_trivia_info(self.text, lexeme.range)?;
        if self.overlaps(info.trimmed_range) {
            let action = self.apply_suitable_rule(lexeme.token, lexeme.range.start, parent)?;
            let parent_range = self.package.range(parent);
            let starts_parent = lexeme.range.start == parent_range.start;
            let grandparent_indents = grandparent.is_some_and(|g| self.kind(g) != SyntaxKind::Package);
            if starts_parent && grandparent_indents {
                match action {
                    NewLineAction::Add => self.indentation = grandparent_indentation + self.options.tab_size,
                    NewLineAction::Delete => self.indentation = grandparent_indentation,
                    NewLineAction::None => {}
                }
            }
            if (self.is_last_trivia_new_line && action != NewLineAction::Delete) || action == NewLineAction::Add {
                let parent_line = self.line(parent_range.start)?;
                let lexeme_line = self.line(lexeme.range.start)?;
                let add_delta = lexeme_line != parent_line && self.should_add_delta(lexeme.token, parent);
                let indentation = if add_delta {
                    self.indentation + self.options.tab_size
                } else {
                    self.indentation
                };
                let previous_trivia = std::mem::take(&mut self.previous_trivia.trivia);
                self.indent_single_line_comments(&previous_trivia, indentation)?;
                self.add_indentation_if_required(lexeme.range, action == NewLineAction::Add, indentation)?;
            }
        }
        self.is_last_trivia_new_line = is_last_trivia_new_line(&info.trivia);
        self.previous = Some((lexeme.token, self.kind(parent)));
        self.previous_trivia = info;
        Ok(())
    }

    fn should_add_delta(&self, token: TokenId, parent: NodeId) -> bool {
        if self.kind(parent) == SyntaxKind::Package {
            return false;
        }
        !matches!(
            token,
            TokenId::OpenCurlyBrace
                | TokenId::CloseCurlyBrace
                | TokenId::OpenSquareBracket
                | TokenId::CloseSquareBracket
                | TokenId::OpenParenthesis
                | TokenId::CloseParenthesis
                | TokenId::WhereKeyword
        )
    }

    fn apply_suitable_rule(&mut self, token: TokenId, start: usize, parent: NodeId) -> Result<NewLineAction> {
        let (Some((left_token, left_parent)), Some(common)) = (self.previous, self.context) else {
            return Ok(NewLineAction::None);
        };
        if !is_whitespace_or_new_line_only(&self.previous_trivia.trivia) {
            return Ok(NewLineAction::None);
        }
        let context = FormattingContext {
            left_token,
            left_parent,
            right_token: token,
            right_parent: self.kind(parent),
            common,
        };
        let rules = self.rules;
        let Some(rule) = rules.iter().find(|rule| rule.applies(&context)) else {
            return Ok(NewLineAction::None);
        };
        trace!("formatting rule {} at offset {}", rule.name, start);
        let trivia = &self.previous_trivia.trivia;
        let on_different_lines = trivia.iter().any(|t| t.kind == TriviaKind::NewLine);
        let gap_start = self.previous_trivia.trimmed_range.end;
        let gap_end = start;
        match rule.action {
            FormattingAction::AddWhitespace => {
                if on_different_lines && !rule.can_delete_new_line {
                    return Ok(NewLineAction::None);
                }
                if &self.text[gap_start..gap_end] != " " {
                    self.add_edit(gap_start, gap_end, " ")?;
                    if on_different_lines {
                        return Ok(NewLineAction::Delete);
                    }
                }
                Ok(NewLineAction::None)
            }
            FormattingAction::DeleteWhitespace => {
                if on_different_lines && !rule.can_delete_new_line {
                    return Ok(NewLineAction::None);
                }
                if gap_start != gap_end {
                    self.add_edit(gap_start, gap_end, "")?;
                    if on_different_lines {
                        return Ok(NewLineAction::Delete);
                    }
                }
                Ok(NewLineAction::None)
            }
            FormattingAction::AddNewLine => {
                if on_different_lines {
                    return Ok(NewLineAction::None);
                }
                let new_line_start = match trivia.last() {
                    Some(last) if last.kind == TriviaKind::Whitespaces => last.range.start,
                    _ => start,
                };
                let new_line = self.new_line.clone();
                self.add_edit(new_line_start, gap_end, &new_line)?;
                Ok(NewLineAction::Add)
            }
        }
    }

    /// Aligns single-line comments that start their own line.
    fn indent_single_line_comments(&mut self, trivia: &[Trivia], indentation: u32) -> Result<()> {
        let mut should_indent = trivia.first().is_some_and(|t| t.range.start == 0);
        for item in trivia {
            match item.kind {
                TriviaKind::NewLine => should_indent = true,
                TriviaKind::MultiLineComment => should_indent = false,
                TriviaKind::SingleLineComment => {
                    if should_indent && self.overlaps(item.range) {
                        self.add_indentation_if_required(item.range, false, indentation)?;
                    }
                    should_indent = false;
                }
                TriviaKind::Whitespaces => {}
            }
        }
        Ok(())
    }

    fn add_indentation_if_required(&mut self, range: TextRange, is_line_added: bool, indentation: u32) -> Result<()> {
        let indent = self.indentation_string(indentation);
        if is_line_added {
            if indentation != 0 {
                self.add_edit(range.start, range.start, &indent)?;
            }
            return Ok(());
        }
        let Position { line, .. } = self.document.position_at(range.start)?;
        let line_start = self.document.line_start(line)?;
        if self.text[line_start..range.start] != indent {
            self.add_edit(line_start, range.start, &indent)?;
        }
        Ok(())
    }

    fn indentation_string(&self, indentation: u32) -> String {
        if self.options.insert_spaces {
            " ".repeat(indentation as usize)
        } else {
            let tabs = indentation.checked_div(self.options.tab_size).unwrap_or(0);
            "\t".repeat(tabs as usize)
        }
    }

    fn add_edit(&mut self, start: usize, end: usize, new_text: &str) -> Result<()> {
        let location = self.document.location_of(start, end)?;
        self.edits.push(SourceEdit::new(location, new_text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{TextEdit, Url};

    fn document(text: &str) -> Document {
        Document::new(Url::parse("file:///test/Main.np").unwrap(), text.to_string(), true)
    }

    fn apply(document: &mut Document, edits: &[SourceEdit]) {
        let edits: Vec<TextEdit> = edits
            .iter()
            .map(|edit| TextEdit::new(edit.location.range, edit.new_text.clone()))
            .collect();
        document.apply_edits(&edits).unwrap();
    }

    fn format(text: &str) -> String {
        let formatter = Formatter::default();
        let mut document = document(text);
        let edits = formatter.format_document(&document, &FormattingOptions::default()).unwrap();
        apply(&mut document, &edits);
        document.text().to_string()
    }

    fn assert_stable(text: &str) {
        let formatter = Formatter::default();
        let document = document(text);
        let edits = formatter.format_document(&document, &FormattingOptions::default()).unwrap();
        assert!(edits.is_empty(), "unexpected edits for {:?}: {:?}", text, edits);
    }

    #[test]
    fn test_detect_new_line() {
        assert_eq!(detect_new_line("P = Word;\r\nQ = Num;"), "\r\n");
        assert_eq!(detect_new_line("P = Word;\nQ = Num;"), "\n");
        assert_eq!(detect_new_line("P = Word;"), "\n");
    }

    #[test]
    fn test_format_nested_patterns() {
        let formatted = format("Pattern=Word@where{Inner=Num;};");
        assert_eq!(formatted, "Pattern = Word @where {\n    Inner = Num;\n};");
        assert_stable(&formatted);
    }

    #[test]
    fn test_format_operators_and_braces() {
        let formatted = format("P(X,Y)=X:Word+ ?Y :Num  _ { 'a' , Space } ;");
        assert_eq!(formatted, "P(X, Y) = X: Word + ?Y: Num _ {'a', Space};");
        assert_stable(&formatted);
    }

    #[test]
    fn test_format_references_and_attributes() {
        let formatted = format("P = N . Q( X : Y ) + Word ( 1 - 3 , Lowercase ) + [ 1+ Num ];");
        assert_eq!(formatted, "P = N.Q(X: Y) + Word(1-3, Lowercase) + [1+ Num];");
        assert_stable(&formatted);
    }

    #[test]
    fn test_line_breaks_are_kept() {
        let text = "P = Word\n    + Num;\n";
        assert_stable(text);
    }

    #[test]
    fn test_continuation_line_is_indented() {
        let formatted = format("P = Word\n+ Num;\n");
        assert_eq!(formatted, "P = Word\n    + Num;\n");
    }

    #[test]
    fn test_comments_are_indented_with_code() {
        let formatted = format("P = Word @where {\n// inner\nQ = Num;\n};\n");
        assert_eq!(formatted, "P = Word @where {\n    // inner\n    Q = Num;\n};\n");
        assert_stable(&formatted);
    }

    #[test]
    fn test_leading_indentation_is_removed() {
        assert_eq!(format("   P = Word;"), "P = Word;");
    }

    #[test]
    fn test_open_brace_on_new_line() {
        let formatter = Formatter::new(FormattingConfiguration {
            place_open_brace_on_new_line: true,
        });
        let mut document = document("P = Word @where { Q = Num; };");
        let edits = formatter.format_document(&document, &FormattingOptions::default()).unwrap();
        apply(&mut document, &edits);
        assert_eq!(document.text(), "P = Word @where\n{\n    Q = Num;\n};");
    }

    #[test]
    fn test_update_configuration_rebuilds_rules() {
        let mut formatter = Formatter::default();
        let document = document("P = Word @where { Q = Num; };");
        let options = FormattingOptions::default();
        let default_edits = formatter.format_document(&document, &options).unwrap();
        formatter.update_configuration(FormattingConfiguration {
            place_open_brace_on_new_line: true,
        });
        let edits = formatter.format_document(&document, &options).unwrap();
        assert_ne!(default_edits, edits);
    }

    #[test]
    fn test_format_range_only_touches_range() {
        let text = "A=Word;\nB=Num;\n";
        let formatter = Formatter::default();
        let mut document = document(text);
        let second_line = TextRange::new(8, text.len());
        let edits = formatter
            .format_range(&document, second_line, &FormattingOptions::default())
            .unwrap();
        apply(&mut document, &edits);
        assert_eq!(document.text(), "A=Word;\nB = Num;\n");
    }

    #[test]
    fn test_new_line_follows_document() {
        let formatted = format("A = Word;\r\nP = Word @where { Q = Num; };");
        assert_eq!(formatted, "A = Word;\r\nP = Word @where {\r\n    Q = Num;\r\n};");
    }

    #[test]
    fn test_tabs_for_indentation() {
        let formatter = Formatter::default();
        let mut document = document("P = Word @where { Q = Num; };");
        let options = FormattingOptions {
            tab_size: 4,
            insert_spaces: false,
            new_line: Some("\n".to_string()),
        };
        let edits = formatter.format_document(&document, &options).unwrap();
        apply(&mut document, &edits);
        assert_eq!(document.text(), "P = Word @where {\n\tQ = Num;\n};");
    }
}
