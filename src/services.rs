//! Language services over a set of Nevod documents.
//!
//! `Services` owns the documents, the syntax info table built over them and
//! the caches derived from the table. Every change to the document set
//! rebuilds the table from scratch, clears the caches and publishes fresh
//! diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;

use tower_lsp::lsp_types::{Location, Position, Range, TextDocumentContentChangeEvent, Url};
use tracing::{debug, info, warn};

use crate::analysis::{range_contains, Analysis, PointedLexeme};
use crate::completion;
use crate::config::{Configuration, FormattingOptions};
use crate::diagnostics::{package_diagnostics, DiagnosticsPublisher, PublishDiagnostics};
use crate::document::Document;
use crate::error::{Result, ServiceError};
use crate::finders::{find_field_references, find_pattern_references, find_patterns, find_symbols};
use crate::formatting::Formatter;
use crate::info_table::SyntaxInfoTable;
use crate::rename;
use crate::syntax::{Child, FileId, NodeData, NodeRef, TextRange, TokenId};
use crate::types::{CodeLensInfo, Completion, RenameInfo, SourceEdit, Symbol};

/// How documents enter and leave the tracked set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicesMode {
    /// Only documents opened by the client are tracked.
    SingleFile,
    /// Every `.np` file under `root` is tracked, open or not.
    Workspace { root: PathBuf },
}

pub struct Services {
    mode: ServicesMode,
    documents: HashMap<Url, Document>,
    table: SyntaxInfoTable,
    formatter: Formatter,
    publisher: Option<DiagnosticsPublisher>,
    // Derived from `table`, cleared on every rebuild.
    symbols: HashMap<Url, Vec<Symbol>>,
    code_lens: HashMap<Url, Vec<CodeLensInfo>>,
    references: HashMap<(FileId, usize), Vec<Location>>,
}

impl Services {
    pub fn new(mode: ServicesMode) -> Self {
        Self {
            mode,
            documents: HashMap::new(),
            table: SyntaxInfoTable::default(),
            formatter: Formatter::default(),
            publisher: None,
            symbols: HashMap::new(),
            code_lens: HashMap::new(),
            references: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &ServicesMode {
        &self.mode
    }

    pub fn document(&self, uri: &Url) -> Option<&Document> {
        self.documents.get(uri).filter(|document| document.is_tracked)
    }

    /// Uris of the tracked documents, sorted.
    pub fn tracked_documents(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self
            .documents
            .values()
            .filter(|document| document.is_tracked)
            .map(|document| document.uri.clone())
            .collect();
        uris.sort();
        uris
    }

    fn analysis(&self) -> Analysis<'_> {
        Analysis::new(&self.table, &self.documents)
    }

    // ========================================================================
    // Document lifecycle
    // ========================================================================

    /// Registers the diagnostics callback and publishes the current state.
    pub fn subscribe_diagnostics(&mut self, publisher: DiagnosticsPublisher) {
        self.publisher = Some(publisher);
        self.publish_diagnostics();
    }

    pub fn open_document(&mut self, uri: Url, text: String) {
        info!("open document {}", uri);
        self.insert_document(uri, text);
        self.rebuild();
    }

    /// Adds many documents with a single rebuild.
    pub fn load_documents(&mut self, documents: Vec<(Url, String)>) {
        for (uri, text) in documents {
            self.insert_document(uri, text);
        }
        self.rebuild();
    }

    fn insert_document(&mut self, uri: Url, text: String) {
        match self.documents.get_mut(&uri) {
            Some(document) => {
                document.update(text);
                document.is_tracked = true;
            }
            None => {
                self.documents.insert(uri.clone(), Document::new(uri, text, true));
            }
        }
    }

    /// Applies client content changes in order. A batch with a change that
    /// does not fit the text is rejected as a whole.
    pub fn update_document(&mut self, uri: &Url, changes: Vec<TextDocumentContentChangeEvent>) -> Result<()> {
        let document = self
            .documents
            .get_mut(uri)
            .filter(|document| document.is_tracked)
            .ok_or_else(|| ServiceError::UnknownDocument(uri.clone()))?;
        debug!("update document {} ({} changes)", uri, changes.len());
        let previous = document.text().to_string();
        if let Err(e) = document.apply_content_changes(changes) {
            warn!("rejected changes to {}: {}", uri, e);
            document.update(previous);
            return Err(e);
        }
        self.rebuild();
        Ok(())
    }

    /// In workspace mode documents under the root stay tracked after the
    /// client closes them.
    pub fn close_document(&mut self, uri: &Url) {
        if let ServicesMode::Workspace { root } = &self.mode {
            if uri.to_file_path().is_ok_and(|path| path.starts_with(root)) {
                debug!("close document {}: kept in workspace", uri);
                return;
            }
        }
        info!("close document {}", uri);
        self.remove_document(uri);
    }

    pub fn delete_document(&mut self, uri: &Url) {
        if self.documents.contains_key(uri) {
            info!("delete document {}", uri);
            self.remove_document(uri);
        }
    }

    fn remove_document(&mut self, uri: &Url) {
        let was_tracked = self.documents.remove(uri).is_some_and(|document| document.is_tracked);
        self.rebuild();
        if was_tracked {
            self.publish(PublishDiagnostics {
                uri: uri.clone(),
                diagnostics: Vec::new(),
            });
        }
    }

    pub fn update_configuration(&mut self, configuration: Configuration) {
        debug!("update configuration: {:?}", configuration);
        self.formatter.update_configuration(configuration.formatting);
    }

    fn rebuild(&mut self) {
        self.symbols.clear();
        self.code_lens.clear();
        self.references.clear();
        self.documents.retain(|_, document| document.is_tracked);
        let tracked = self.documents.len();
        self.table = SyntaxInfoTable::build(&mut self.documents);
        info!(
            "rebuilt syntax info: {} tracked documents, {} packages",
            tracked,
            self.table.packages().len()
        );
        self.publish_diagnostics();
    }

    fn publish_diagnostics(&self) {
        if self.publisher.is_none() {
            return;
        }
        for uri in self.tracked_documents() {
            let (Some(document), Some(package)) = (self.documents.get(&uri), self.table.linked_package(&uri)) else {
                continue;
            };
            match package_diagnostics(document, package) {
                Ok(published) => self.publish(published),
                Err(e) => warn!("cannot collect diagnostics for {}: {}", uri, e),
            }
        }
    }

    fn publish(&self, published: PublishDiagnostics) {
        if let Some(publisher) = &self.publisher {
            publisher(published);
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Lexeme under the cursor, only if the cursor actually touches it.
    fn touched_lexeme(&self, uri: &Url, position: Position, previous_if_eof: bool) -> Result<Option<PointedLexeme>> {
        let analysis = self.analysis();
        let Some(pointed) = analysis.pointed_lexeme(uri, position, true, previous_if_eof)? else {
            return Ok(None);
        };
        let location = analysis.lexeme_location(pointed.file, pointed.lexeme)?;
        Ok(range_contains(&location.range, position).then_some(pointed))
    }

    /// Definition of the pattern, field or required package under the cursor.
    /// A cursor at the very end of the text has no definition.
    pub fn definition(&self, uri: &Url, position: Position) -> Result<Option<Location>> {
        let Some(pointed) = self.touched_lexeme(uri, position, false)? else {
            return Ok(None);
        };
        let analysis = self.analysis();
        let package = analysis.syntax(pointed.file);
        let token = package.lexeme(pointed.lexeme).token;
        let parent = pointed.parent_ref();
        let field_location = |pattern: Option<NodeRef>, name: &str| -> Result<Option<Location>> {
            match pattern.and_then(|pattern| analysis.field_definition(pattern, name)) {
                Some(field) => analysis.field_location(field).map(Some),
                None => Ok(None),
            }
        };

        match &package.node(pointed.parent).data {
            NodeData::PatternReference { .. } if token == TokenId::Identifier => {
                match self.table.referenced_pattern(parent) {
                    Some(target) => analysis.pattern_name_location(target),
                    None => Ok(None),
                }
            }
            NodeData::Extraction { field_name: name } | NodeData::FieldReference { name }
                if token == TokenId::Identifier =>
            {
                field_location(analysis.info_pattern(parent), name)
            }
            NodeData::ExtractionFromField {
                field_name,
                from_field_name,
            } if token == TokenId::Identifier => {
                let info = self.table.info(parent);
                if package.children(pointed.parent).first() == Some(&Child::Lexeme(pointed.lexeme)) {
                    field_location(info.and_then(|i| i.pattern), field_name)
                } else {
                    let referenced = info
                        .and_then(|i| i.pattern_reference)
                        .and_then(|reference| self.table.referenced_pattern(reference));
                    match from_field_name {
                        Some(from_field_name) => field_location(referenced, from_field_name),
                        None => Ok(None),
                    }
                }
            }
            NodeData::RequiredPackage { .. } if token == TokenId::StringLiteral => {
                let target = self.table.package(pointed.file).required.get(&pointed.parent).copied();
                Ok(target.map(|file| Location::new(self.table.package(file).uri.clone(), Range::default())))
            }
            _ => Ok(None),
        }
    }

    /// References to the pattern or field whose definition is under the
    /// cursor. Other positions have no references.
    pub fn references(&mut self, uri: &Url, position: Position) -> Result<Option<Vec<Location>>> {
        let Some(pointed) = self.touched_lexeme(uri, position, true)? else {
            return Ok(None);
        };
        let key = (pointed.file, pointed.lexeme);
        if let Some(cached) = self.references.get(&key) {
            return Ok(Some(cached.clone()));
        }
        let analysis = Analysis::new(&self.table, &self.documents);
        let package = analysis.syntax(pointed.file);
        if package.lexeme(pointed.lexeme).token != TokenId::Identifier {
            return Ok(None);
        }
        let files = analysis.all_files();
        let references = match &package.node(pointed.parent).data {
            NodeData::Pattern(data) if data.name.is_some() => {
                find_pattern_references(&analysis, pointed.parent_ref(), &files)?
            }
            NodeData::Field { .. } => find_field_references(&analysis, pointed.parent_ref(), &files)?,
            _ => return Ok(None),
        };
        debug!("found {} references in {} files", references.len(), files.len());
        self.references.insert(key, references.clone());
        Ok(Some(references))
    }

    pub fn document_symbols(&mut self, uri: &Url) -> Result<Vec<Symbol>> {
        if let Some(cached) = self.symbols.get(uri) {
            return Ok(cached.clone());
        }
        let analysis = Analysis::new(&self.table, &self.documents);
        let symbols = find_symbols(&analysis, analysis.file_id(uri)?)?;
        self.symbols.insert(uri.clone(), symbols.clone());
        Ok(symbols)
    }

    /// Symbols of every tracked document whose name contains `query`,
    /// ignoring case. Nested symbols are listed on their own.
    pub fn filtered_symbols(&mut self, query: &str) -> Result<Vec<Symbol>> {
        fn flatten(symbols: Vec<Symbol>, out: &mut Vec<Symbol>) {
            for mut symbol in symbols {
                let children = std::mem::take(&mut symbol.children);
                out.push(symbol);
                flatten(children, out);
            }
        }

        let query = query.to_lowercase();
        let mut symbols = Vec::new();
        for uri in self.tracked_documents() {
            flatten(self.document_symbols(&uri)?, &mut symbols);
        }
        symbols.retain(|symbol| symbol.name.to_lowercase().contains(&query));
        Ok(symbols)
    }

    /// One lens per named pattern, nested ones included.
    pub fn code_lens(&mut self, uri: &Url) -> Result<Vec<CodeLensInfo>> {
        if let Some(cached) = self.code_lens.get(uri) {
            return Ok(cached.clone());
        }
        let analysis = Analysis::new(&self.table, &self.documents);
        let file = analysis.file_id(uri)?;
        let mut lenses = Vec::new();
        for pattern in find_patterns(analysis.syntax(file)) {
            let pattern = NodeRef::new(file, pattern);
            if let Some(name) = analysis.pattern_name_location(pattern)? {
                lenses.push(CodeLensInfo {
                    range: analysis.trimmed_node_location(pattern)?.range,
                    active_range: name.range,
                });
            }
        }
        self.code_lens.insert(uri.clone(), lenses.clone());
        Ok(lenses)
    }

    // ========================================================================
    // Editing
    // ========================================================================

    pub fn rename_info(&self, uri: &Url, position: Position) -> Result<Option<RenameInfo>> {
        rename::rename_info(&self.analysis(), uri, position)
    }

    pub fn rename(&self, uri: &Url, position: Position, new_name: &str) -> Result<Option<Vec<SourceEdit>>> {
        rename::rename(&self.analysis(), uri, position, new_name)
    }

    pub fn completions(&self, uri: &Url, position: Position) -> Result<Option<Vec<Completion>>> {
        completion::completions(&self.analysis(), uri, position)
    }

    pub fn format_document(&self, uri: &Url, options: &FormattingOptions) -> Result<Vec<SourceEdit>> {
        let document = self.analysis().document(uri)?;
        self.formatter.format_document(document, options)
    }

    pub fn format_range(&self, uri: &Url, range: Range, options: &FormattingOptions) -> Result<Vec<SourceEdit>> {
        let document = self.analysis().document(uri)?;
        let range = TextRange::new(document.offset_at(range.start)?, document.offset_at(range.end)?);
        self.formatter.format_range(document, range, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn uri(dir: &TempDir, name: &str) -> Url {
        Url::from_file_path(dir.path().join(name)).unwrap()
    }

    fn single_file(dir: &TempDir, name: &str, text: &str) -> (Services, Url) {
        let mut services = Services::new(ServicesMode::SingleFile);
        let uri = uri(dir, name);
        services.open_document(uri.clone(), text.to_string());
        (services, uri)
    }

    fn range(start: (u32, u32), end: (u32, u32)) -> Range {
        Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1))
    }

    fn record_diagnostics(services: &mut Services) -> Arc<Mutex<Vec<PublishDiagnostics>>> {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        services.subscribe_diagnostics(Box::new(move |batch: PublishDiagnostics| sink.lock().unwrap().push(batch)));
        published
    }

    #[test]
    fn test_definition_of_pattern_reference() {
        let dir = TempDir::new().unwrap();
        let (services, uri) = single_file(&dir, "Main.np", "P1 = Word;\nP2 = P1 + Num;");

        let definition = services.definition(&uri, Position::new(1, 6)).unwrap().unwrap();

        assert_eq!(definition.uri, uri);
        assert_eq!(definition.range, range((0, 0), (0, 2)));
        assert_eq!(services.definition(&uri, Position::new(1, 11)).unwrap(), None);
    }

    #[test]
    fn test_no_definition_at_end_of_file() {
        let dir = TempDir::new().unwrap();
        let (services, uri) = single_file(&dir, "Main.np", "P1 = Word;\nP2 = P1");

        assert_eq!(services.definition(&uri, Position::new(1, 7)).unwrap(), None);
        let definition = services.definition(&uri, Position::new(1, 6)).unwrap().unwrap();
        assert_eq!(definition.range, range((0, 0), (0, 2)));
    }

    #[test]
    fn test_definition_of_fields() {
        let dir = TempDir::new().unwrap();
        let text = "P(X, ~Y) = X: Word + Y: Num;\nR(Z) = P(Z: X);";
        let (services, uri) = single_file(&dir, "Main.np", text);

        // `X` in `X: Word`
        let from_extraction = services.definition(&uri, Position::new(0, 11)).unwrap().unwrap();
        assert_eq!(from_extraction.range, range((0, 2), (0, 3)));
        // `Y` in `Y: Num`, the marker is not part of the field name
        let internal = services.definition(&uri, Position::new(0, 21)).unwrap().unwrap();
        assert_eq!(internal.range, range((0, 6), (0, 7)));
        // `Z` in `P(Z: X)`
        let extraction_field = services.definition(&uri, Position::new(1, 9)).unwrap().unwrap();
        assert_eq!(extraction_field.range, range((1, 2), (1, 3)));
        // `X` in `P(Z: X)`
        let from_field = services.definition(&uri, Position::new(1, 12)).unwrap().unwrap();
        assert_eq!(from_field.range, range((0, 2), (0, 3)));
    }

    #[test]
    fn test_definition_of_required_package() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Lib.np"), "Digit = Num;").unwrap();
        let (services, uri) = single_file(&dir, "Main.np", "@require 'Lib.np';\nP = Digit;");

        let path = services.definition(&uri, Position::new(0, 12)).unwrap().unwrap();
        assert_eq!(path.uri, self::uri(&dir, "Lib.np"));
        assert_eq!(path.range, Range::default());

        let pattern = services.definition(&uri, Position::new(1, 5)).unwrap().unwrap();
        assert_eq!(pattern.uri, self::uri(&dir, "Lib.np"));
        assert_eq!(pattern.range, range((0, 0), (0, 5)));
    }

    #[test]
    fn test_references_and_definitions_agree() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P1 = Word;\nP2 = P1 + P1;\nP3 = [1+ P1];");

        let references = services.references(&uri, Position::new(0, 1)).unwrap().unwrap();

        assert_eq!(references.len(), 3);
        for reference in &references {
            let definition = services.definition(&uri, reference.range.start).unwrap().unwrap();
            assert_eq!(definition.range, range((0, 0), (0, 2)));
        }
        assert_eq!(services.references(&uri, Position::new(0, 3)).unwrap(), None);
    }

    #[test]
    fn test_field_references() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P(X) = X: Word + X;\nR(Z) = P(Z: X);");

        let references = services.references(&uri, Position::new(0, 2)).unwrap().unwrap();

        let ranges: Vec<Range> = references.iter().map(|location| location.range).collect();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.contains(&range((0, 7), (0, 8))));
        assert!(ranges.contains(&range((0, 17), (0, 18))));
        assert!(ranges.contains(&range((1, 12), (1, 13))));
    }

    #[test]
    fn test_document_symbols_and_filtering() {
        let dir = TempDir::new().unwrap();
        let mut services = Services::new(ServicesMode::SingleFile);
        let main = uri(&dir, "Main.np");
        let other = uri(&dir, "Other.np");
        services.open_document(main.clone(), "Greeting = 'hello' @where { Name = Word; };".to_string());
        services.open_document(other.clone(), "@namespace N { Farewell = 'bye'; }".to_string());

        let symbols = services.document_symbols(&main).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "Greeting");
        assert_eq!(symbols[0].children[0].detail, "Greeting.Name");

        let filtered = services.filtered_symbols("FARE").unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].detail, "N.Farewell");
        let all: Vec<String> = services
            .filtered_symbols("")
            .unwrap()
            .into_iter()
            .map(|symbol| symbol.detail)
            .collect();
        assert_eq!(all, vec!["Greeting", "Greeting.Name", "N.Farewell"]);
    }

    #[test]
    fn test_code_lens_for_named_patterns() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P = Word @where { Q = Num; };\nWord + Space;");

        let lenses = services.code_lens(&uri).unwrap();

        assert_eq!(lenses.len(), 2);
        assert_eq!(lenses[0].range, range((0, 0), (0, 29)));
        assert_eq!(lenses[0].active_range, range((0, 0), (0, 1)));
        assert_eq!(lenses[1].active_range, range((0, 18), (0, 19)));
    }

    #[test]
    fn test_update_invalidates_caches() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P = Word;");
        assert_eq!(services.document_symbols(&uri).unwrap().len(), 1);

        services
            .update_document(
                &uri,
                vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: "P = Word;\nQ = P;".to_string(),
                }],
            )
            .unwrap();

        assert_eq!(services.document_symbols(&uri).unwrap().len(), 2);
        assert_eq!(services.references(&uri, Position::new(0, 0)).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_update_keeps_previous_text() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P = Word;");

        let result = services.update_document(
            &uri,
            vec![
                TextDocumentContentChangeEvent {
                    range: Some(range((0, 4), (0, 8))),
                    range_length: None,
                    text: "Num".to_string(),
                },
                TextDocumentContentChangeEvent {
                    range: Some(range((5, 0), (5, 1))),
                    range_length: None,
                    text: "Q".to_string(),
                },
            ],
        );

        assert!(matches!(result, Err(ServiceError::PositionOutOfRange { .. })));
        assert_eq!(services.document(&uri).unwrap().text(), "P = Word;");
        assert_eq!(services.document_symbols(&uri).unwrap().len(), 1);
    }

    #[test]
    fn test_update_of_unknown_document_fails() {
        let mut services = Services::new(ServicesMode::SingleFile);
        let uri = Url::parse("file:///missing/Main.np").unwrap();
        let result = services.update_document(&uri, Vec::new());
        assert!(matches!(result, Err(ServiceError::UnknownDocument(_))));
    }

    #[test]
    fn test_diagnostics_are_published_after_rebuild() {
        let dir = TempDir::new().unwrap();
        let mut services = Services::new(ServicesMode::SingleFile);
        let published = record_diagnostics(&mut services);
        let uri = uri(&dir, "Main.np");

        services.open_document(uri.clone(), "P = Missing;".to_string());
        {
            let published = published.lock().unwrap();
            let last = published.last().unwrap();
            assert_eq!(last.uri, uri);
            assert_eq!(last.diagnostics.len(), 1);
        }

        services.close_document(&uri);
        let published = published.lock().unwrap();
        let last = published.last().unwrap();
        assert_eq!(last.uri, uri);
        assert!(last.diagnostics.is_empty());
        assert!(services.document(&uri).is_none());
    }

    #[test]
    fn test_subscribe_publishes_current_state() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P = ;");

        let published = record_diagnostics(&mut services);

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].uri, uri);
        assert!(!published[0].diagnostics.is_empty());
    }

    #[test]
    fn test_workspace_keeps_closed_documents() {
        let dir = TempDir::new().unwrap();
        let mut services = Services::new(ServicesMode::Workspace {
            root: dir.path().to_path_buf(),
        });
        let inside = uri(&dir, "Main.np");
        let outside = Url::parse("file:///elsewhere/Other.np").unwrap();
        services.open_document(inside.clone(), "P = Word;".to_string());
        services.open_document(outside.clone(), "Q = Num;".to_string());

        services.close_document(&inside);
        services.close_document(&outside);

        assert_eq!(services.tracked_documents(), vec![inside.clone()]);
        services.delete_document(&inside);
        assert!(services.tracked_documents().is_empty());
    }

    #[test]
    fn test_required_packages_are_not_tracked() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Lib.np"), "Digit = Num;").unwrap();
        let (services, uri) = single_file(&dir, "Main.np", "@require 'Lib.np';\nP = Digit;");

        assert_eq!(services.tracked_documents(), vec![uri]);
        assert!(services.document(&self::uri(&dir, "Lib.np")).is_none());
    }

    #[test]
    fn test_rename_through_services() {
        let dir = TempDir::new().unwrap();
        let (services, uri) = single_file(&dir, "Main.np", "P1 = Word;\nP2 = P1;");

        let info = services.rename_info(&uri, Position::new(1, 5)).unwrap().unwrap();
        assert_eq!(info.text, "P1");
        let edits = services.rename(&uri, Position::new(1, 5), "Q").unwrap().unwrap();
        let ranges: Vec<Range> = edits.iter().map(|edit| edit.location.range).collect();
        assert_eq!(ranges, vec![range((1, 5), (1, 7)), range((0, 0), (0, 2))]);
    }

    #[test]
    fn test_formatting_follows_configuration() {
        let dir = TempDir::new().unwrap();
        let (mut services, uri) = single_file(&dir, "Main.np", "P = Word @where {\n    Q = Num;\n};");
        let options = FormattingOptions::default();
        assert!(services.format_document(&uri, &options).unwrap().is_empty());

        services.update_configuration(Configuration::from_settings(&serde_json::json!({
            "nevod": { "formatting": { "placeOpenBraceOnNewLine": true } }
        })));

        let edits = services.format_document(&uri, &options).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "\n");
        let in_second_line = services.format_range(&uri, range((1, 0), (1, 12)), &options).unwrap();
        assert!(in_second_line.is_empty());
    }
}
