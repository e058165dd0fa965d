//! Shared queries over the syntax info table: source locations of names and
//! the lexeme under a cursor.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::document::Document;
use crate::error::{Result, ServiceError};
use crate::info_table::SyntaxInfoTable;
use crate::resolver;
use crate::syntax::{Child, FileId, NodeData, NodeId, NodeRef, Package, TextRange, TokenId};
use crate::trivia;

/// The lexeme under a cursor and the node that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointedLexeme {
    pub file: FileId,
    pub lexeme: usize,
    pub parent: NodeId,
}

impl PointedLexeme {
    pub fn parent_ref(&self) -> NodeRef {
        NodeRef::new(self.file, self.parent)
    }
}

#[derive(Clone, Copy)]
pub struct Analysis<'a> {
    pub table: &'a SyntaxInfoTable,
    pub documents: &'a HashMap<Url, Document>,
}

impl<'a> Analysis<'a> {
    pub fn new(table: &'a SyntaxInfoTable, documents: &'a HashMap<Url, Document>) -> Self {
        Self { table, documents }
    }

    pub fn document(&self, uri: &Url) -> Result<&'a Document> {
        self.documents
            .get(uri)
            .ok_or_else(|| ServiceError::UnknownDocument(uri.clone()))
    }

    pub fn document_of(&self, file: FileId) -> Result<&'a Document> {
        self.document(&self.table.package(file).uri)
    }

    pub fn file_id(&self, uri: &Url) -> Result<FileId> {
        self.table
            .file_id(uri)
            .ok_or_else(|| ServiceError::UnknownDocument(uri.clone()))
    }

    pub fn syntax(&self, file: FileId) -> &'a Package {
        &self.table.package(file).syntax
    }

    /// Linked packages of every document, in a stable order.
    pub fn all_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self
            .documents
            .keys()
            .filter_map(|uri| self.table.file_id(uri))
            .collect();
        files.sort_unstable();
        files
    }

    pub fn text_range_location(&self, file: FileId, range: TextRange) -> Result<Location> {
        self.document_of(file)?.location_of(range.start, range.end)
    }

    pub fn trim_location(&self, location: &Location) -> Result<Location> {
        let document = self.document(&location.uri)?;
        let start = document.offset_at(location.range.start)?;
        let end = document.offset_at(location.range.end)?;
        let range = trivia::trim_start_trivia(document.text(), TextRange::new(start, end))?;
        let range = trivia::trim_end_trivia(document.text(), range)?;
        document.location_of(range.start, range.end)
    }

    /// Node range without surrounding trivia.
    pub fn trimmed_node_location(&self, node: NodeRef) -> Result<Location> {
        let document = self.document_of(node.file)?;
        let range = self.syntax(node.file).range(node.node);
        let range = trivia::trim_start_trivia(document.text(), range)?;
        let range = trivia::trim_end_trivia(document.text(), range)?;
        document.location_of(range.start, range.end)
    }

    /// Location of the name of a pattern, `None` for an unnamed pattern.
    pub fn pattern_name_location(&self, pattern: NodeRef) -> Result<Option<Location>> {
        let package = self.syntax(pattern.file);
        if package.pattern(pattern.node).and_then(|p| p.name.as_ref()).is_none() {
            return Ok(None);
        }
        let document = self.document_of(pattern.file)?;
        let text = document.text();
        let mut range = trivia::trim_start_keywords(text, package.range(pattern.node))?;
        if text[range.start..range.end].starts_with('#') {
            range = trivia::trim_start_trivia(text, TextRange::new(range.start + 1, range.end))?;
        }
        let name = trivia::multipart_identifier_range(text, range)?;
        document.location_of(name.start, name.end).map(Some)
    }

    pub fn pattern_reference_name_location(&self, reference: NodeRef) -> Result<Location> {
        let document = self.document_of(reference.file)?;
        let range = self.syntax(reference.file).range(reference.node);
        let name = trivia::multipart_identifier_range(document.text(), range)?;
        document.location_of(name.start, name.end)
    }

    /// Location of the field name that starts an extraction or an extraction
    /// from field.
    pub fn extraction_location(&self, extraction: NodeRef) -> Result<Location> {
        let package = self.syntax(extraction.file);
        let field_name = match &package.node(extraction.node).data {
            NodeData::Extraction { field_name } | NodeData::ExtractionFromField { field_name, .. } => {
                field_name.as_str()
            }
            _ => "",
        };
        let start = package.range(extraction.node).start;
        self.document_of(extraction.file)?
            .location_of(start, start + field_name.len())
    }

    /// Location of `Y` in `X: Y` inside a pattern reference.
    pub fn from_field_location(&self, extraction: NodeRef) -> Result<Option<Location>> {
        let package = self.syntax(extraction.file);
        let NodeData::ExtractionFromField {
            field_name,
            from_field_name: Some(from_field_name),
        } = &package.node(extraction.node).data
        else {
            return Ok(None);
        };
        let document = self.document_of(extraction.file)?;
        let text = document.text();
        let node_range = package.range(extraction.node);
        let range = TextRange::new(node_range.start + field_name.len(), node_range.end);
        let range = trivia::trim_start_trivia(text, range)?;
        let after_colon = (range.start + 1).min(range.end);
        let range = trivia::trim_start_trivia(text, TextRange::new(after_colon, range.end))?;
        document
            .location_of(range.start, range.start + from_field_name.len())
            .map(Some)
    }

    pub fn field_reference_location(&self, reference: NodeRef) -> Result<Location> {
        self.trimmed_node_location(reference)
    }

    /// Location of a field name in a pattern header, without the `~` marker.
    pub fn field_location(&self, field: NodeRef) -> Result<Location> {
        let package = self.syntax(field.file);
        let document = self.document_of(field.file)?;
        let text = document.text();
        let range = trivia::trim_start_trivia(text, package.range(field.node))?;
        let range = if text[range.start..range.end].starts_with('~') {
            trivia::trim_start_trivia(text, TextRange::new(range.start + 1, range.end))?
        } else {
            range
        };
        let name_len = package.field_name(field.node).map_or(0, str::len);
        document.location_of(range.start, range.start + name_len)
    }

    pub fn lexeme_location(&self, file: FileId, lexeme: usize) -> Result<Location> {
        let range = self.syntax(file).lexeme(lexeme).token_range();
        self.text_range_location(file, range)
    }

    /// Location of a string literal lexeme without its quotes and modifiers.
    pub fn string_literal_location_without_quotes(&self, file: FileId, lexeme: usize) -> Result<Location> {
        let document = self.document_of(file)?;
        let token = self.syntax(file).lexeme(lexeme).token_range();
        let literal = &document.text()[token.start..token.end];
        let inner_len = literal
            .trim_start_matches(['\'', '"'])
            .trim_end_matches(['*', '!'])
            .trim_end_matches(['\'', '"'])
            .len();
        let start = (token.start + 1).min(token.end);
        document.location_of(start, start + inner_len)
    }

    /// Finds the lexeme at `position`.
    ///
    /// When the cursor sits right at the start of a non-identifier lexeme the
    /// lexeme just before the cursor wins, so `P.|` resolves to the period.
    /// With `previous_if_eof` a cursor at the very end of the text points at
    /// the last character.
    pub fn pointed_lexeme(
        &self,
        uri: &Url,
        position: Position,
        check_previous: bool,
        previous_if_eof: bool,
    ) -> Result<Option<PointedLexeme>> {
        let document = self.document(uri)?;
        let offset = document.offset_at(position)?;
        let (offset, check_previous) = if previous_if_eof && offset == document.text().len() && offset > 0 {
            (offset - 1, false)
        } else {
            (offset, check_previous)
        };
        self.pointed_lexeme_at(uri, offset, check_previous)
    }

    fn pointed_lexeme_at(&self, uri: &Url, offset: usize, check_previous: bool) -> Result<Option<PointedLexeme>> {
        let file = self.file_id(uri)?;
        let package = self.syntax(file);
        let Some(parent) = resolver::resolve(package, offset) else {
            return Ok(None);
        };
        let children = package.children(parent);
        let Some(Child::Lexeme(lexeme)) = resolver::resolve_from_children(package, &children, offset) else {
            return Ok(None);
        };
        let found = package.lexeme(lexeme);
        if check_previous && found.token != TokenId::Identifier && found.range.start == offset && offset > 0 {
            return self.pointed_lexeme_at(uri, offset - 1, false);
        }
        Ok(Some(PointedLexeme { file, lexeme, parent }))
    }

    /// Field named `name` declared by `pattern`.
    pub fn field_definition(&self, pattern: NodeRef, name: &str) -> Option<NodeRef> {
        let package = self.syntax(pattern.file);
        package
            .pattern(pattern.node)?
            .fields
            .iter()
            .find(|&&field| package.field_name(field) == Some(name))
            .map(|&field| NodeRef::new(pattern.file, field))
    }

    /// Enclosing pattern recorded for `node` while the table was built.
    pub fn info_pattern(&self, node: NodeRef) -> Option<NodeRef> {
        self.table.info(node).and_then(|info| info.pattern)
    }

    /// Enclosing pattern of `node` found by position, excluding `node` itself.
    pub fn parent_pattern(&self, node: NodeRef) -> Option<NodeRef> {
        resolver::find_parent_pattern(self.syntax(node.file), node.node).map(|p| NodeRef::new(node.file, p))
    }
}

/// Inclusive containment, so a cursor right after a name still touches it.
pub fn range_contains(range: &Range, position: Position) -> bool {
    range.start <= position && position <= range.end
}

pub fn range_contains_excluding_edges(range: &Range, position: Position) -> bool {
    range.start < position && position < range.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(text: &str) -> (HashMap<Url, Document>, SyntaxInfoTable, Url) {
        let uri = Url::parse("file:///test/Main.np").unwrap();
        let mut documents = HashMap::new();
        documents.insert(uri.clone(), Document::new(uri.clone(), text.to_string(), true));
        let table = SyntaxInfoTable::build(&mut documents);
        (documents, table, uri)
    }

    fn range(start: (u32, u32), end: (u32, u32)) -> Range {
        Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1))
    }

    #[test]
    fn test_pattern_name_location() {
        let (documents, table, uri) = setup("@search @pattern #N.P(X) = X: Word;");
        let analysis = Analysis::new(&table, &documents);
        let file = analysis.file_id(&uri).unwrap();
        let pattern = NodeRef::new(file, analysis.syntax(file).patterns()[0]);
        let location = analysis.pattern_name_location(pattern).unwrap().unwrap();
        assert_eq!(location.range, range((0, 18), (0, 21)));
    }

    #[test]
    fn test_field_and_extraction_locations() {
        let (documents, table, uri) = setup("P(~X, Y) = X: Word + Y: Num;\nQ(Z) = P(Z: Y);");
        let analysis = Analysis::new(&table, &documents);
        let file = analysis.file_id(&uri).unwrap();
        let package = analysis.syntax(file);
        let p = package.pattern(package.patterns()[0]).unwrap();
        let internal = NodeRef::new(file, p.fields[0]);
        assert_eq!(analysis.field_location(internal).unwrap().range, range((0, 3), (0, 4)));

        let q = package.pattern(package.patterns()[1]).unwrap();
        let reference = q.body.unwrap();
        let extraction = NodeRef::new(file, package.node(reference).subnodes[0]);
        assert_eq!(analysis.extraction_location(extraction).unwrap().range, range((1, 9), (1, 10)));
        assert_eq!(
            analysis.from_field_location(extraction).unwrap().unwrap().range,
            range((1, 12), (1, 13))
        );
    }

    #[test]
    fn test_pointed_lexeme_prefers_previous_lexeme() {
        let (documents, table, uri) = setup("P = A.B;");
        let analysis = Analysis::new(&table, &documents);
        let package = analysis.syntax(0);

        // Cursor between `A` and `.` points at `A`.
        let pointed = analysis.pointed_lexeme(&uri, Position::new(0, 5), true, false).unwrap().unwrap();
        assert_eq!(package.lexeme(pointed.lexeme).token, TokenId::Identifier);
        assert_eq!(pointed.lexeme, 2);

        // Cursor right after `=` with a space: the space belongs to `=`.
        let pointed = analysis.pointed_lexeme(&uri, Position::new(0, 3), true, false).unwrap().unwrap();
        assert_eq!(package.lexeme(pointed.lexeme).token, TokenId::Equal);
    }

    #[test]
    fn test_pointed_lexeme_at_end_of_file() {
        let (documents, table, uri) = setup("P = Word");
        let analysis = Analysis::new(&table, &documents);
        assert_eq!(analysis.pointed_lexeme(&uri, Position::new(0, 8), true, false).unwrap(), None);
        let pointed = analysis.pointed_lexeme(&uri, Position::new(0, 8), true, true).unwrap().unwrap();
        assert_eq!(pointed.lexeme, 2);
    }

    #[test]
    fn test_string_literal_location_without_quotes() {
        let (documents, table, uri) = setup("@require 'Lib.np';");
        let analysis = Analysis::new(&table, &documents);
        let file = analysis.file_id(&uri).unwrap();
        let location = analysis.string_literal_location_without_quotes(file, 1).unwrap();
        assert_eq!(location.range, range((0, 10), (0, 16)));
    }

    #[test]
    fn test_position_outside_document_fails() {
        let (documents, table, uri) = setup("P = Word;");
        let analysis = Analysis::new(&table, &documents);
        assert!(analysis.pointed_lexeme(&uri, Position::new(3, 0), true, false).is_err());
    }
}
