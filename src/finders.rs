//! Tree walks that collect patterns, references and outline symbols.

use tower_lsp::lsp_types::Location;

use crate::analysis::Analysis;
use crate::error::Result;
use crate::syntax::{FileId, NodeData, NodeId, NodeRef, Package, SyntaxKind};
use crate::types::Symbol;

/// All patterns of a package in pre-order, nested ones included.
pub fn find_patterns(package: &Package) -> Vec<NodeId> {
    fn collect(package: &Package, ids: &[NodeId], out: &mut Vec<NodeId>) {
        for &id in ids {
            if let Some(data) = package.pattern(id) {
                out.push(id);
                collect(package, &data.nested, out);
            }
        }
    }
    let mut out = Vec::new();
    collect(package, package.patterns(), &mut out);
    out
}

/// Locations of every reference to `pattern` in `files`. The definition
/// itself is not included.
pub fn find_pattern_references(analysis: &Analysis, pattern: NodeRef, files: &[FileId]) -> Result<Vec<Location>> {
    let mut references = Vec::new();
    for &file in files {
        let package = analysis.syntax(file);
        for reference in pattern_references_in(package, package.root()) {
            let reference = NodeRef::new(file, reference);
            if analysis.table.referenced_pattern(reference) == Some(pattern) {
                references.push(analysis.pattern_reference_name_location(reference)?);
            }
        }
    }
    Ok(references)
}

/// Pattern reference nodes under `root` in source order.
pub fn pattern_references_in(package: &Package, root: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = package.node(id);
        if node.kind == SyntaxKind::PatternReference {
            result.push(id);
        }
        stack.extend(node.subnodes.iter().rev());
    }
    result
}

// ============================================================================
// Field occurrences
// ============================================================================

/// Callbacks for the places a field name occurs outside of its definition.
///
/// Each hook receives the occurrence node. The default hooks ignore it.
pub trait FieldOccurrenceHandler {
    /// `X: ...` inside the pattern that declares `X`.
    fn on_extraction(&mut self, _extraction: NodeRef) -> Result<()> {
        Ok(())
    }

    /// `P(X: Y)` inside the pattern that declares `X`.
    fn on_extraction_field(&mut self, _extraction: NodeRef) -> Result<()> {
        Ok(())
    }

    /// `P(Z: X)` where `P` declares `X`.
    fn on_extracted_field(&mut self, _extraction: NodeRef) -> Result<()> {
        Ok(())
    }

    /// A bare use of `X` inside the pattern that declares `X`.
    fn on_field_reference(&mut self, _reference: NodeRef) -> Result<()> {
        Ok(())
    }
}

/// Walks `files` and reports every occurrence of `field` to `handler`.
pub fn visit_field_occurrences(
    analysis: &Analysis,
    field: NodeRef,
    files: &[FileId],
    handler: &mut dyn FieldOccurrenceHandler,
) -> Result<()> {
    let Some(field_name) = analysis.syntax(field.file).field_name(field.node) else {
        return Ok(());
    };
    let mut visitor = FieldVisitor {
        analysis,
        field,
        field_name,
        handler,
    };
    for &file in files {
        let package = analysis.syntax(file);
        for &pattern in package.patterns().iter().chain(package.search_targets()) {
            visitor.visit(file, pattern, false)?;
        }
    }
    Ok(())
}

struct FieldVisitor<'a, 'h> {
    analysis: &'a Analysis<'a>,
    field: NodeRef,
    field_name: &'a str,
    handler: &'h mut dyn FieldOccurrenceHandler,
}

impl<'a, 'h> FieldVisitor<'a, 'h> {
    fn declares_field(&self, pattern: NodeRef) -> bool {
        pattern.file == self.field.file
            && self
                .analysis
                .syntax(pattern.file)
                .pattern(pattern.node)
                .is_some_and(|data| data.fields.contains(&self.field.node))
    }

    fn visit(&mut self, file: FileId, id: NodeId, in_field_pattern: bool) -> Result<()> {
        let package = self.analysis.syntax(file);
        let node = package.node(id);
        if node.range.is_empty() {
            return Ok(());
        }
        let current = NodeRef::new(file, id);
        match &node.data {
            NodeData::Pattern(data) => {
                if self.declares_field(current) {
                    if let Some(body) = data.body {
                        self.visit(file, body, true)?;
                    }
                    return Ok(());
                }
            }
            NodeData::PatternReference { extractions, .. } => {
                let target = self.analysis.table.referenced_pattern(current);
                if target.is_some_and(|target| self.declares_field(target)) {
                    let extracted = extractions.iter().copied().find(|&e| {
                        matches!(&package.node(e).data,
                            NodeData::ExtractionFromField { from_field_name: Some(from), .. } if from == self.field_name)
                    });
                    if let Some(extraction) = extracted {
                        self.handler.on_extracted_field(NodeRef::new(file, extraction))?;
                    }
                } else if in_field_pattern {
                    let extraction = extractions.iter().copied().find(|&e| {
                        matches!(&package.node(e).data,
                            NodeData::ExtractionFromField { field_name, .. } if field_name == self.field_name)
                    });
                    if let Some(extraction) = extraction {
                        self.handler.on_extraction_field(NodeRef::new(file, extraction))?;
                    }
                }
                return Ok(());
            }
            NodeData::FieldReference { name } => {
                if in_field_pattern && name == self.field_name {
                    self.handler.on_field_reference(current)?;
                }
                return Ok(());
            }
            NodeData::Extraction { field_name } => {
                if in_field_pattern && field_name == self.field_name {
                    self.handler.on_extraction(current)?;
                }
            }
            _ => {}
        }
        for &sub in &node.subnodes {
            self.visit(file, sub, in_field_pattern)?;
        }
        Ok(())
    }
}

struct FieldReferenceCollector<'a> {
    analysis: &'a Analysis<'a>,
    references: Vec<Location>,
}

impl<'a> FieldOccurrenceHandler for FieldReferenceCollector<'a> {
    fn on_extraction(&mut self, extraction: NodeRef) -> Result<()> {
        self.references.push(self.analysis.extraction_location(extraction)?);
        Ok(())
    }

    fn on_extraction_field(&mut self, extraction: NodeRef) -> Result<()> {
        self.references.push(self.analysis.extraction_location(extraction)?);
        Ok(())
    }

    fn on_extracted_field(&mut self, extraction: NodeRef) -> Result<()> {
        if let Some(location) = self.analysis.from_field_location(extraction)? {
            self.references.push(location);
        }
        Ok(())
    }

    fn on_field_reference(&mut self, reference: NodeRef) -> Result<()> {
        self.references.push(self.analysis.field_reference_location(reference)?);
        Ok(())
    }
}

/// Locations of every use of `field` in `files`, without the definition.
pub fn find_field_references(analysis: &Analysis, field: NodeRef, files: &[FileId]) -> Result<Vec<Location>> {
    let mut collector = FieldReferenceCollector {
        analysis,
        references: Vec::new(),
    };
    visit_field_occurrences(analysis, field, files, &mut collector)?;
    Ok(collector.references)
}

// ============================================================================
// Symbols
// ============================================================================

/// Outline of a package. Unnamed patterns contribute their nested patterns
/// to the enclosing level.
pub fn find_symbols(analysis: &Analysis, file: FileId) -> Result<Vec<Symbol>> {
    let package = analysis.syntax(file);
    let mut symbols = Vec::new();
    for &pattern in package.patterns() {
        collect_symbols(analysis, file, pattern, &mut symbols)?;
    }
    Ok(symbols)
}

fn collect_symbols(analysis: &Analysis, file: FileId, pattern: NodeId, out: &mut Vec<Symbol>) -> Result<()> {
    let package = analysis.syntax(file);
    let Some(data) = package.pattern(pattern) else {
        return Ok(());
    };
    let mut children = Vec::new();
    for &nested in &data.nested {
        collect_symbols(analysis, file, nested, &mut children)?;
    }
    let node = NodeRef::new(file, pattern);
    match (&data.name, analysis.pattern_name_location(node)?) {
        (Some(name), Some(name_location)) => out.push(Symbol {
            name: name.clone(),
            detail: data.full_name.clone(),
            children,
            location: analysis.trimmed_node_location(node)?,
            name_location,
        }),
        _ => out.extend(children),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::info_table::SyntaxInfoTable;
    use std::collections::HashMap;
    use tower_lsp::lsp_types::{Position, Range, Url};

    fn setup(files: &[(&str, &str)]) -> (HashMap<Url, Document>, SyntaxInfoTable) {
        let mut documents = HashMap::new();
        for (name, text) in files {
            let uri = Url::parse(&format!("file:///project/{}", name)).unwrap();
            documents.insert(uri.clone(), Document::new(uri, text.to_string(), true));
        }
        let table = SyntaxInfoTable::build(&mut documents);
        (documents, table)
    }

    fn ranges(locations: &[Location]) -> Vec<((u32, u32), (u32, u32))> {
        locations
            .iter()
            .map(|l| ((l.range.start.line, l.range.start.character), (l.range.end.line, l.range.end.character)))
            .collect()
    }

    #[test]
    fn test_find_patterns_preorder() {
        let package = crate::syntax::parse("A = B @where { B = C @where { C = Word; }; }; D = Any;");
        let names: Vec<String> = find_patterns(&package)
            .into_iter()
            .map(|id| package.pattern(id).unwrap().full_name.clone())
            .collect();
        assert_eq!(names, vec!["A", "A.B", "A.B.C", "D"]);
    }

    #[test]
    fn test_pattern_references_across_files() {
        let (documents, table) = setup(&[
            ("Lib.np", "@namespace Lib { Digit = Num; }"),
            ("Main.np", "@require 'Lib.np';\nP = Lib.Digit + Lib.Digit;\n@search Lib.Digit;"),
        ]);
        let analysis = Analysis::new(&table, &documents);
        let lib = analysis.file_id(&Url::parse("file:///project/Lib.np").unwrap()).unwrap();
        let digit = NodeRef::new(lib, analysis.syntax(lib).patterns()[0]);

        let references = find_pattern_references(&analysis, digit, &analysis.all_files()).unwrap();

        assert_eq!(
            ranges(&references),
            vec![((1, 4), (1, 13)), ((1, 16), (1, 25)), ((2, 8), (2, 17))]
        );
        assert!(references.iter().all(|l| l.uri.path().ends_with("Main.np")));
    }

    #[test]
    fn test_field_references() {
        let (documents, table) = setup(&[(
            "Main.np",
            "P(X) = X: Word + [1+ X];\nQ(Y) = P(Y: X) + P(X);\nR(X) = P(X: X);",
        )]);
        let analysis = Analysis::new(&table, &documents);
        let package = analysis.syntax(0);
        let p = package.pattern(package.patterns()[0]).unwrap();
        let field = NodeRef::new(0, p.fields[0]);

        let references = find_field_references(&analysis, field, &analysis.all_files()).unwrap();

        // Extraction and field reference in P, extracted fields in Q and R.
        // `P(X)` in Q names Q's own (undeclared) field and is not a use.
        assert_eq!(
            ranges(&references),
            vec![((0, 7), (0, 8)), ((0, 21), (0, 22)), ((1, 12), (1, 13)), ((2, 12), (2, 13))]
        );
    }

    #[test]
    fn test_symbols_flatten_unnamed_patterns() {
        let (documents, table) = setup(&[("Main.np", "@namespace N { P = Q @where { Q = Word; }; }\nWord + Num;")]);
        let analysis = Analysis::new(&table, &documents);
        let symbols = find_symbols(&analysis, 0).unwrap();
        assert_eq!(symbols.len(), 1);
        let p = &symbols[0];
        assert_eq!(p.name, "P");
        assert_eq!(p.detail, "N.P");
        assert_eq!(p.children.len(), 1);
        assert_eq!(p.children[0].detail, "N.P.Q");
        assert_eq!(
            p.name_location.range,
            Range::new(Position::new(0, 15), Position::new(0, 16))
        );
        assert_eq!(
            p.location.range,
            Range::new(Position::new(0, 15), Position::new(0, 42))
        );
    }
}
