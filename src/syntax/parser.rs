use std::ops::Range as IndexRange;

use super::lexer::{tokenize, Lexeme, TokenId};
use super::{Node, NodeData, NodeId, Package, PatternData, SyntaxError, SyntaxKind, TextRange, TokenKind};

/// System patterns that expand into a variation of tokens.
const SYSTEM_PATTERNS: &[(&str, &[TokenKind])] = &[
    (
        "Any",
        &[
            TokenKind::Word,
            TokenKind::Punct,
            TokenKind::Symbol,
            TokenKind::Space,
            TokenKind::LineBreak,
        ],
    ),
    ("Blank", &[TokenKind::Space, TokenKind::LineBreak]),
    (
        "WordBreak",
        &[
            TokenKind::Space,
            TokenKind::LineBreak,
            TokenKind::Punct,
            TokenKind::Symbol,
            TokenKind::Start,
            TokenKind::End,
        ],
    ),
];

pub fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Parses package text. Never fails; problems are collected in `Package::errors`.
pub fn parse(text: &str) -> Package {
    let (lexemes, errors) = tokenize(text);
    let mut parser = Parser {
        text,
        lexemes,
        pos: 0,
        nodes: Vec::new(),
        errors,
        namespace: String::new(),
        name_prefix: String::new(),
        fields: Vec::new(),
        top_level: Vec::new(),
        required_packages: Vec::new(),
        patterns: Vec::new(),
        search_targets: Vec::new(),
    };
    parser.statements(false);
    parser.finish_package()
}

struct Parser<'a> {
    text: &'a str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    nodes: Vec<Node>,
    errors: Vec<SyntaxError>,
    namespace: String,
    name_prefix: String,
    fields: Vec<String>,
    top_level: Vec<NodeId>,
    required_packages: Vec<NodeId>,
    patterns: Vec<NodeId>,
    search_targets: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    // ==== Token helpers ====

    fn peek(&self) -> Option<TokenId> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<TokenId> {
        self.lexemes.get(self.pos + n).map(|l| l.token)
    }

    fn at(&self, token: TokenId) -> bool {
        self.peek() == Some(token)
    }

    fn bump(&mut self) -> usize {
        let index = self.pos;
        self.pos += 1;
        index
    }

    fn eat(&mut self, token: TokenId) -> bool {
        if self.at(token) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: TokenId, message: &str) -> bool {
        if self.eat(token) {
            true
        } else {
            self.error_here(message);
            false
        }
    }

    fn token_text(&self, index: usize) -> &'a str {
        let text: &'a str = self.text;
        let lexeme = &self.lexemes[index];
        &text[lexeme.range.start..lexeme.token_end]
    }

    fn error_here(&mut self, message: &str) {
        let range = match self.lexemes.get(self.pos) {
            Some(lexeme) => lexeme.token_range(),
            None => TextRange::new(self.text.len(), self.text.len()),
        };
        self.errors.push(SyntaxError::new(range, message));
    }

    fn current_offset(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .map_or(self.text.len(), |l| l.range.start)
    }

    // ==== Node construction ====

    fn push_node(
        &mut self,
        kind: SyntaxKind,
        lexemes: IndexRange<usize>,
        range: TextRange,
        subnodes: Vec<NodeId>,
        data: NodeData,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for sub in &subnodes {
            self.nodes[sub.0 as usize].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            range,
            parent: None,
            subnodes,
            data,
            lexemes,
        });
        id
    }

    fn finish(&mut self, kind: SyntaxKind, start: usize, subnodes: Vec<NodeId>, data: NodeData) -> NodeId {
        let range = if start < self.pos {
            TextRange::new(
                self.lexemes[start].range.start,
                self.lexemes[self.pos - 1].range.end,
            )
        } else {
            let offset = self.current_offset();
            TextRange::new(offset, offset)
        };
        self.push_node(kind, start..self.pos, range, subnodes, data)
    }

    fn finish_package(mut self) -> Package {
        let range = TextRange::new(0, self.text.len());
        let subnodes = std::mem::take(&mut self.top_level);
        let data = NodeData::Package {
            required_packages: std::mem::take(&mut self.required_packages),
            patterns: std::mem::take(&mut self.patterns),
            search_targets: std::mem::take(&mut self.search_targets),
        };
        let lexemes = 0..self.lexemes.len();
        let root = self.push_node(SyntaxKind::Package, lexemes, range, subnodes, data);
        Package {
            lexemes: self.lexemes,
            nodes: self.nodes,
            root,
            errors: self.errors,
        }
    }

    // ==== Statements ====

    fn statements(&mut self, inside_namespace: bool) {
        loop {
            let before = self.pos;
            match self.peek() {
                None => break,
                Some(TokenId::CloseCurlyBrace) if inside_namespace => break,
                Some(TokenId::RequireKeyword) => {
                    let node = self.required_package();
                    self.required_packages.push(node);
                    self.top_level.push(node);
                }
                Some(TokenId::NamespaceKeyword) => self.namespace(),
                Some(TokenId::SearchKeyword) => {
                    let (node, is_pattern) = self.search();
                    if is_pattern {
                        self.patterns.push(node);
                    } else {
                        self.search_targets.push(node);
                    }
                    self.top_level.push(node);
                }
                Some(_) => {
                    let start = self.pos;
                    if let Some(node) = self.pattern_statement(start, false) {
                        self.patterns.push(node);
                        self.top_level.push(node);
                    }
                }
            }
            if self.pos == before {
                self.error_here("Unexpected token");
                self.bump();
            }
        }
    }

    fn required_package(&mut self) -> NodeId {
        let start = self.bump();
        let mut relative_path = String::new();
        if self.at(TokenId::StringLiteral) {
            let index = self.bump();
            relative_path = string_value(self.token_text(index));
        } else {
            self.error_here("File path expected");
        }
        self.expect_statement_end();
        self.finish(
            SyntaxKind::RequiredPackage,
            start,
            Vec::new(),
            NodeData::RequiredPackage { relative_path },
        )
    }

    fn namespace(&mut self) {
        self.bump();
        let name = self.multipart_name().unwrap_or_default();
        let saved = std::mem::take(&mut self.namespace);
        self.namespace = join_name(&saved, &name);
        if self.expect(TokenId::OpenCurlyBrace, "'{' expected") {
            self.statements(true);
            self.expect(TokenId::CloseCurlyBrace, "'}' expected");
        }
        self.namespace = saved;
    }

    /// Returns the created node and whether it is a pattern definition.
    fn search(&mut self) -> (NodeId, bool) {
        let start = self.bump();
        if self.at(TokenId::PatternKeyword) || self.at(TokenId::HashSign) || self.is_pattern_definition_ahead() {
            if let Some(pattern) = self.pattern_statement(start, true) {
                return (pattern, true);
            }
        }
        let mut parts = 0;
        while self.peek_at(parts * 2) == Some(TokenId::Identifier)
            && self.peek_at(parts * 2 + 1) == Some(TokenId::Period)
        {
            parts += 1;
        }
        if parts > 0 && self.peek_at(parts * 2) == Some(TokenId::Asterisk) {
            let mut names = Vec::new();
            for _ in 0..parts {
                let index = self.bump();
                names.push(self.token_text(index));
                self.bump();
            }
            self.bump();
            self.expect_statement_end();
            let node = self.finish(
                SyntaxKind::NamespaceSearchTarget,
                start,
                Vec::new(),
                NodeData::NamespaceSearchTarget {
                    namespace: self.namespace.clone(),
                    target: names.join("."),
                },
            );
            return (node, false);
        }
        let reference = if self.at(TokenId::Identifier) {
            Some(self.pattern_reference())
        } else {
            self.error_here("Pattern name expected");
            None
        };
        self.expect_statement_end();
        let subnodes: Vec<NodeId> = reference.into_iter().collect();
        let data = match subnodes.first() {
            Some(&reference) => NodeData::PatternSearchTarget {
                namespace: self.namespace.clone(),
                reference,
            },
            None => NodeData::None,
        };
        let node = self.finish(SyntaxKind::PatternSearchTarget, start, subnodes, data);
        (node, false)
    }

    fn is_pattern_definition_ahead(&self) -> bool {
        let mut n = 0;
        if self.peek_at(n) != Some(TokenId::Identifier) {
            return false;
        }
        n += 1;
        while self.peek_at(n) == Some(TokenId::Period) && self.peek_at(n + 1) == Some(TokenId::Identifier) {
            n += 2;
        }
        if self.peek_at(n) == Some(TokenId::OpenParenthesis) {
            while let Some(token) = self.peek_at(n) {
                n += 1;
                if token == TokenId::CloseParenthesis {
                    break;
                }
            }
        }
        self.peek_at(n) == Some(TokenId::Equal)
    }

    fn pattern_statement(&mut self, start: usize, is_search_target: bool) -> Option<NodeId> {
        let is_named = self.at(TokenId::PatternKeyword)
            || self.at(TokenId::HashSign)
            || self.is_pattern_definition_ahead();
        if is_named {
            return Some(self.pattern(start, is_search_target));
        }
        let body = self.expression()?;
        self.expect_statement_end();
        let data = PatternData {
            name: None,
            full_name: self.name_prefix_or_namespace(),
            namespace: self.namespace.clone(),
            is_search_target,
            fields: Vec::new(),
            body: Some(body),
            nested: Vec::new(),
            master: None,
        };
        Some(self.finish(SyntaxKind::Pattern, start, vec![body], NodeData::Pattern(data)))
    }

    fn name_prefix_or_namespace(&self) -> String {
        if self.name_prefix.is_empty() {
            self.namespace.clone()
        } else {
            self.name_prefix.clone()
        }
    }

    fn pattern(&mut self, start: usize, is_search_target: bool) -> NodeId {
        self.eat(TokenId::PatternKeyword);
        self.eat(TokenId::HashSign);
        let name = self.multipart_name();
        if name.is_none() {
            self.error_here("Pattern name expected");
        }
        let full_name = join_name(&self.name_prefix_or_namespace(), name.as_deref().unwrap_or(""));

        let mut subnodes = Vec::new();
        let mut fields = Vec::new();
        if self.eat(TokenId::OpenParenthesis) {
            while !self.at(TokenId::CloseParenthesis) && self.peek().is_some() {
                let field_start = self.pos;
                let is_internal = self.eat(TokenId::Tilde);
                if !self.at(TokenId::Identifier) {
                    self.error_here("Field name expected");
                    break;
                }
                let index = self.bump();
                let field_name = self.token_text(index).to_string();
                let field = self.finish(
                    SyntaxKind::Field,
                    field_start,
                    Vec::new(),
                    NodeData::Field {
                        name: field_name,
                        is_internal,
                    },
                );
                fields.push(field);
                if !self.eat(TokenId::Comma) {
                    break;
                }
            }
            self.expect(TokenId::CloseParenthesis, "')' expected");
        }
        subnodes.extend(&fields);

        let field_names: Vec<String> = fields
            .iter()
            .filter_map(|&f| match &self.nodes[f.0 as usize].data {
                NodeData::Field { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        let saved_fields = std::mem::replace(&mut self.fields, field_names);

        let mut body = None;
        if self.expect(TokenId::Equal, "'=' expected") {
            body = self.expression();
        }
        subnodes.extend(body);

        let mut nested = Vec::new();
        if self.eat(TokenId::WhereKeyword) && self.expect(TokenId::OpenCurlyBrace, "'{' expected") {
            let saved_prefix = std::mem::replace(&mut self.name_prefix, full_name.clone());
            while !self.at(TokenId::CloseCurlyBrace) && self.peek().is_some() {
                let before = self.pos;
                let nested_start = self.pos;
                if let Some(pattern) = self.pattern_statement(nested_start, false) {
                    nested.push(pattern);
                }
                if self.pos == before {
                    self.error_here("Pattern expected");
                    self.bump();
                }
            }
            self.expect(TokenId::CloseCurlyBrace, "'}' expected");
            self.name_prefix = saved_prefix;
        }
        subnodes.extend(&nested);
        self.fields = saved_fields;
        self.expect_statement_end();

        let data = PatternData {
            name,
            full_name,
            namespace: self.namespace.clone(),
            is_search_target,
            fields,
            body,
            nested: nested.clone(),
            master: None,
        };
        let id = self.finish(SyntaxKind::Pattern, start, subnodes, NodeData::Pattern(data));
        for child in nested {
            if let NodeData::Pattern(data) = &mut self.nodes[child.0 as usize].data {
                data.master = Some(id);
            }
        }
        id
    }

    fn expect_statement_end(&mut self) {
        if self.eat(TokenId::Semicolon) {
            return;
        }
        self.error_here("';' expected");
        while let Some(token) = self.peek() {
            match token {
                TokenId::Semicolon => {
                    self.bump();
                    return;
                }
                TokenId::CloseCurlyBrace
                | TokenId::RequireKeyword
                | TokenId::NamespaceKeyword
                | TokenId::SearchKeyword
                | TokenId::PatternKeyword => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn multipart_name(&mut self) -> Option<String> {
        if !self.at(TokenId::Identifier) {
            return None;
        }
        let index = self.bump();
        let mut name = self.token_text(index).to_string();
        while self.at(TokenId::Period) && self.peek_at(1) == Some(TokenId::Identifier) {
            self.bump();
            let index = self.bump();
            name.push('.');
            name.push_str(self.token_text(index));
        }
        Some(name)
    }

    // ==== Expressions ====

    fn expression(&mut self) -> Option<NodeId> {
        let start = self.pos;
        let mut left = self.conjunction()?;
        loop {
            let kind = match self.peek() {
                Some(TokenId::InsideKeyword) => SyntaxKind::Inside,
                Some(TokenId::OutsideKeyword) => SyntaxKind::Outside,
                Some(TokenId::HavingKeyword) => SyntaxKind::Having,
                _ => break,
            };
            self.bump();
            let mut subnodes = vec![left];
            subnodes.extend(self.conjunction());
            left = self.finish(kind, start, subnodes, NodeData::None);
        }
        Some(left)
    }

    fn n_ary(
        &mut self,
        operator: TokenId,
        kind: SyntaxKind,
        operand: fn(&mut Self) -> Option<NodeId>,
    ) -> Option<NodeId> {
        let start = self.pos;
        let first = operand(self)?;
        if !self.at(operator) {
            return Some(first);
        }
        let mut elements = vec![first];
        while self.eat(operator) {
            elements.extend(operand(self));
        }
        Some(self.finish(kind, start, elements, NodeData::None))
    }

    fn conjunction(&mut self) -> Option<NodeId> {
        self.n_ary(TokenId::Ampersand, SyntaxKind::Conjunction, Self::sequence)
    }

    fn sequence(&mut self) -> Option<NodeId> {
        self.n_ary(TokenId::Plus, SyntaxKind::Sequence, Self::word_sequence)
    }

    fn word_sequence(&mut self) -> Option<NodeId> {
        self.n_ary(TokenId::Underscore, SyntaxKind::WordSequence, Self::span)
    }

    fn span(&mut self) -> Option<NodeId> {
        let start = self.pos;
        let mut left = self.unary()?;
        loop {
            if self.eat(TokenId::Ellipsis) {
                let mut subnodes = vec![left];
                subnodes.extend(self.unary());
                left = self.finish(SyntaxKind::AnySpan, start, subnodes, NodeData::None);
            } else if self.eat(TokenId::DoublePeriod) {
                let mut subnodes = vec![left];
                if self.at(TokenId::Identifier) && self.peek_at(1) == Some(TokenId::Colon) {
                    self.bump();
                    self.bump();
                }
                if self.expect(TokenId::OpenSquareBracket, "'[' expected") {
                    self.numeric_range();
                    self.expect(TokenId::CloseSquareBracket, "']' expected");
                }
                if self.eat(TokenId::Tilde) {
                    subnodes.extend(self.unary());
                }
                self.expect(TokenId::DoublePeriod, "'..' expected");
                subnodes.extend(self.unary());
                left = self.finish(SyntaxKind::WordSpan, start, subnodes, NodeData::None);
            } else {
                break;
            }
        }
        Some(left)
    }

    fn numeric_range(&mut self) {
        if !self.eat(TokenId::IntegerLiteral) {
            self.error_here("Number expected");
            return;
        }
        if self.eat(TokenId::Minus) {
            self.expect(TokenId::IntegerLiteral, "Number expected");
        } else {
            self.eat(TokenId::Plus);
        }
    }

    fn unary(&mut self) -> Option<NodeId> {
        let kind = match self.peek() {
            Some(TokenId::Question) => SyntaxKind::Optionality,
            Some(TokenId::Tilde) => SyntaxKind::Exception,
            _ => return self.primary(),
        };
        let start = self.bump();
        let operand: Vec<NodeId> = self.unary().into_iter().collect();
        Some(self.finish(kind, start, operand, NodeData::None))
    }

    fn primary(&mut self) -> Option<NodeId> {
        let start = self.pos;
        match self.peek() {
            Some(TokenId::OpenParenthesis) => {
                self.bump();
                let inner = self.expression();
                self.expect(TokenId::CloseParenthesis, "')' expected");
                inner
            }
            Some(TokenId::OpenCurlyBrace) => {
                self.bump();
                let mut elements = Vec::new();
                while !self.at(TokenId::CloseCurlyBrace) && self.peek().is_some() {
                    elements.extend(self.expression());
                    if !self.eat(TokenId::Comma) {
                        break;
                    }
                }
                self.expect(TokenId::CloseCurlyBrace, "'}' expected");
                Some(self.finish(SyntaxKind::Variation, start, elements, NodeData::None))
            }
            Some(TokenId::OpenSquareBracket) => {
                self.bump();
                let mut elements = Vec::new();
                while !self.at(TokenId::CloseSquareBracket) && self.peek().is_some() {
                    elements.extend(self.span_element());
                    if !self.eat(TokenId::Comma) {
                        break;
                    }
                }
                self.expect(TokenId::CloseSquareBracket, "']' expected");
                Some(self.finish(SyntaxKind::Span, start, elements, NodeData::None))
            }
            Some(TokenId::StringLiteral) | Some(TokenId::UnterminatedStringLiteral) => {
                self.bump();
                self.attributes();
                Some(self.finish(SyntaxKind::Text, start, Vec::new(), NodeData::None))
            }
            Some(TokenId::Identifier) => Some(self.identifier_expression()),
            _ => {
                self.error_here("Expression expected");
                None
            }
        }
    }

    fn span_element(&mut self) -> Option<NodeId> {
        if !self.at(TokenId::IntegerLiteral) {
            return self.expression();
        }
        let start = self.pos;
        self.numeric_range();
        let body: Vec<NodeId> = self.expression().into_iter().collect();
        Some(self.finish(SyntaxKind::Repetition, start, body, NodeData::None))
    }

    fn attributes(&mut self) {
        if !self.eat(TokenId::OpenParenthesis) {
            return;
        }
        while matches!(
            self.peek(),
            Some(TokenId::Identifier)
                | Some(TokenId::IntegerLiteral)
                | Some(TokenId::Plus)
                | Some(TokenId::Minus)
                | Some(TokenId::Comma)
        ) {
            self.bump();
        }
        self.expect(TokenId::CloseParenthesis, "')' expected");
    }

    fn identifier_expression(&mut self) -> NodeId {
        let start = self.pos;
        let name = self.token_text(start);

        if self.peek_at(1) == Some(TokenId::Colon) {
            self.bump();
            self.bump();
            let body: Vec<NodeId> = self.unary().into_iter().collect();
            return self.finish(
                SyntaxKind::Extraction,
                start,
                body,
                NodeData::Extraction {
                    field_name: name.to_string(),
                },
            );
        }

        if let Some(kind) = TokenKind::from_name(name) {
            self.bump();
            self.attributes();
            return self.finish(SyntaxKind::Token, start, Vec::new(), NodeData::Token { kind });
        }

        if let Some((_, kinds)) = SYSTEM_PATTERNS.iter().find(|(n, _)| *n == name) {
            let offset = self.lexemes[start].range.start;
            let elements: Vec<NodeId> = kinds
                .iter()
                .map(|&kind| {
                    self.push_node(
                        SyntaxKind::Token,
                        start..start,
                        TextRange::new(offset, offset),
                        Vec::new(),
                        NodeData::Token { kind },
                    )
                })
                .collect();
            self.bump();
            return self.finish(SyntaxKind::Variation, start, elements, NodeData::None);
        }

        if self.peek_at(1) != Some(TokenId::Period) && self.fields.iter().any(|f| f == name) {
            self.bump();
            return self.finish(
                SyntaxKind::FieldReference,
                start,
                Vec::new(),
                NodeData::FieldReference {
                    name: name.to_string(),
                },
            );
        }

        self.pattern_reference()
    }

    fn pattern_reference(&mut self) -> NodeId {
        let start = self.bump();
        let mut name = self.token_text(start).to_string();
        while self.at(TokenId::Period) {
            if self.peek_at(1) == Some(TokenId::Asterisk) {
                break;
            }
            self.bump();
            name.push('.');
            if !self.at(TokenId::Identifier) {
                self.error_here("Identifier expected");
                break;
            }
            let index = self.bump();
            name.push_str(self.token_text(index));
        }

        let mut extractions = Vec::new();
        if self.eat(TokenId::OpenParenthesis) {
            while !self.at(TokenId::CloseParenthesis) && self.peek().is_some() {
                let field_start = self.pos;
                if !self.at(TokenId::Identifier) {
                    self.error_here("Field name expected");
                    break;
                }
                let index = self.bump();
                let field_name = self.token_text(index).to_string();
                let mut from_field_name = None;
                if self.eat(TokenId::Colon) {
                    if self.at(TokenId::Identifier) {
                        let index = self.bump();
                        from_field_name = Some(self.token_text(index).to_string());
                    } else {
                        self.error_here("Field name expected");
                    }
                }
                let extraction = self.finish(
                    SyntaxKind::ExtractionFromField,
                    field_start,
                    Vec::new(),
                    NodeData::ExtractionFromField {
                        field_name,
                        from_field_name,
                    },
                );
                extractions.push(extraction);
                if !self.eat(TokenId::Comma) {
                    break;
                }
            }
            self.expect(TokenId::CloseParenthesis, "')' expected");
        }
        self.finish(
            SyntaxKind::PatternReference,
            start,
            extractions.clone(),
            NodeData::PatternReference { name, extractions },
        )
    }
}

/// Text of a string literal without quotes and modifiers.
fn string_value(literal: &str) -> String {
    let trimmed = literal.trim_end_matches(['!', '*']);
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = chars.as_str();
            let inner = inner.strip_suffix(quote).unwrap_or(inner);
            inner.replace(&format!("{0}{0}", quote), &quote.to_string())
        }
        _ => trimmed.to_string(),
    }
}
