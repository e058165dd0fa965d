use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tower_lsp::lsp_types::{Location, Url};
use tracing::{debug, warn};

use crate::document::Document;
use crate::syntax::linker;
use crate::syntax::{FileId, NodeData, NodeId, NodeRef, Package, SyntaxError, SyntaxKind};

/// One package after its `@require` directives were resolved.
#[derive(Debug)]
pub struct LinkedPackage {
    pub uri: Url,
    pub syntax: Arc<Package>,
    /// Target file of each resolved `@require` node. Unresolved ones are absent.
    pub required: HashMap<NodeId, FileId>,
    /// Resolved target of each pattern reference.
    pub references: HashMap<NodeId, NodeRef>,
    /// Parser and linker errors together.
    pub errors: Vec<SyntaxError>,
}

impl LinkedPackage {
    /// Required packages in directive order.
    pub fn required_files(&self) -> Vec<FileId> {
        self.syntax
            .required_packages()
            .iter()
            .filter_map(|id| self.required.get(id).copied())
            .collect()
    }
}

/// Location of a node plus the context it was found in.
#[derive(Debug, Clone)]
pub struct SyntaxInfo {
    pub location: Location,
    /// Enclosing pattern. For a pattern entry this is its master pattern.
    pub pattern: Option<NodeRef>,
    /// Enclosing pattern reference, set for extractions from fields.
    pub pattern_reference: Option<NodeRef>,
}

#[derive(Debug, Default)]
pub struct SyntaxInfoTable {
    packages: Vec<LinkedPackage>,
    by_uri: HashMap<Url, FileId>,
    items: HashMap<NodeRef, SyntaxInfo>,
}

impl SyntaxInfoTable {
    pub fn package(&self, file: FileId) -> &LinkedPackage {
        &self.packages[file]
    }

    pub fn packages(&self) -> &[LinkedPackage] {
        &self.packages
    }

    pub fn file_id(&self, uri: &Url) -> Option<FileId> {
        self.by_uri.get(uri).copied()
    }

    pub fn linked_package(&self, uri: &Url) -> Option<&LinkedPackage> {
        self.file_id(uri).map(|file| &self.packages[file])
    }

    pub fn info(&self, node: NodeRef) -> Option<&SyntaxInfo> {
        self.items.get(&node)
    }

    pub fn syntax(&self, node: NodeRef) -> &Package {
        &self.packages[node.file].syntax
    }

    /// Pattern a reference node resolves to.
    pub fn referenced_pattern(&self, reference: NodeRef) -> Option<NodeRef> {
        self.packages[reference.file]
            .references
            .get(&reference.node)
            .copied()
    }

    /// Builds the table over `documents`. Required packages that are not in
    /// the map are read from disk and added as untracked documents.
    pub fn build(documents: &mut HashMap<Url, Document>) -> Self {
        let mut builder = SyntaxInfoTableBuilder {
            documents,
            table: SyntaxInfoTable::default(),
        };
        let mut uris: Vec<Url> = builder.documents.keys().cloned().collect();
        uris.sort();
        for uri in uris {
            builder.load(&uri);
        }
        for file in 0..builder.table.packages.len() {
            builder.link(file);
        }
        debug!(
            "built syntax info table: {} packages, {} items",
            builder.table.packages.len(),
            builder.table.items.len()
        );
        builder.table
    }
}

struct SyntaxInfoTableBuilder<'d> {
    documents: &'d mut HashMap<Url, Document>,
    table: SyntaxInfoTable,
}

impl<'d> SyntaxInfoTableBuilder<'d> {
    /// Registers the package of `uri` and, recursively, every package it
    /// requires. Linking waits until all requirement edges are known.
    fn load(&mut self, uri: &Url) -> Option<FileId> {
        if let Some(file) = self.table.file_id(uri) {
            return Some(file);
        }
        if !self.documents.contains_key(uri) {
            let path = uri.to_file_path().ok()?;
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!("loaded required package {}", path.display());
                    self.documents
                        .insert(uri.clone(), Document::new(uri.clone(), text, false));
                }
                Err(e) => {
                    warn!("failed to read required package {}: {}", path.display(), e);
                    return None;
                }
            }
        }
        let package = self.documents.get(uri)?.package();

        let file = self.table.packages.len();
        self.table.packages.push(LinkedPackage {
            uri: uri.clone(),
            syntax: package.clone(),
            required: HashMap::new(),
            references: HashMap::new(),
            errors: package.errors.clone(),
        });
        self.table.by_uri.insert(uri.clone(), file);

        let base_directory = uri
            .to_file_path()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        let mut required = HashMap::new();
        let mut errors = Vec::new();
        for &node in package.required_packages() {
            let NodeData::RequiredPackage { relative_path } = &package.node(node).data else {
                continue;
            };
            let target = base_directory
                .as_ref()
                .and_then(|base| Url::from_file_path(normalize_path(&base.join(relative_path))).ok());
            match target.and_then(|target| self.load(&target)) {
                Some(target_file) => {
                    required.insert(node, target_file);
                }
                None => errors.push(SyntaxError::new(
                    package.token_range(node),
                    format!("Cannot read required package '{}'", relative_path),
                )),
            }
        }
        let entry = &mut self.table.packages[file];
        entry.required = required;
        entry.errors.extend(errors);
        Some(file)
    }

    fn link(&mut self, file: FileId) {
        let package = self.table.packages[file].syntax.clone();
        let transitive = self.transitive_requirements(file);
        let required_packages: Vec<(FileId, &Package)> = transitive
            .iter()
            .map(|&f| (f, self.table.packages[f].syntax.as_ref()))
            .collect();
        let linked = linker::link(file, &package, &required_packages);

        let entry = &mut self.table.packages[file];
        entry.references = linked.references;
        entry.errors.extend(linked.errors);

        if let Some(document) = self.documents.get(&entry.uri) {
            let mut collector = InfoCollector {
                file,
                package: &package,
                document,
                items: &mut self.table.items,
            };
            collector.visit(package.root(), None, None);
        }
    }

    fn transitive_requirements(&self, file: FileId) -> Vec<FileId> {
        let mut visited = HashSet::from([file]);
        let mut stack = vec![file];
        let mut result = Vec::new();
        while let Some(current) = stack.pop() {
            for &next in self.table.packages[current].required.values() {
                if visited.insert(next) {
                    result.push(next);
                    stack.push(next);
                }
            }
        }
        result.sort_unstable();
        result
    }
}

struct InfoCollector<'a> {
    file: FileId,
    package: &'a Package,
    document: &'a Document,
    items: &'a mut HashMap<NodeRef, SyntaxInfo>,
}

impl<'a> InfoCollector<'a> {
    fn add(&mut self, id: NodeId, pattern: Option<NodeId>, pattern_reference: Option<NodeId>) {
        let range = self.package.range(id);
        let Ok(location) = self.document.location_of(range.start, range.end) else {
            return;
        };
        self.items.insert(
            NodeRef::new(self.file, id),
            SyntaxInfo {
                location,
                pattern: pattern.map(|p| NodeRef::new(self.file, p)),
                pattern_reference: pattern_reference.map(|r| NodeRef::new(self.file, r)),
            },
        );
    }

    fn visit(&mut self, id: NodeId, pattern: Option<NodeId>, reference: Option<NodeId>) {
        let node = self.package.node(id);
        if node.range.is_empty() && node.kind != SyntaxKind::Package {
            return;
        }
        match node.kind {
            SyntaxKind::Pattern => {
                self.add(id, pattern, None);
                for &sub in &node.subnodes {
                    self.visit(sub, Some(id), None);
                }
            }
            SyntaxKind::PatternReference => {
                self.add(id, pattern, None);
                for &sub in &node.subnodes {
                    self.visit(sub, pattern, Some(id));
                }
            }
            SyntaxKind::ExtractionFromField => self.add(id, pattern, reference),
            SyntaxKind::Field | SyntaxKind::FieldReference => self.add(id, pattern, None),
            SyntaxKind::Extraction => {
                self.add(id, pattern, None);
                for &sub in &node.subnodes {
                    self.visit(sub, pattern, None);
                }
            }
            _ => {
                for &sub in &node.subnodes {
                    self.visit(sub, pattern, None);
                }
            }
        }
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(documents: &mut HashMap<Url, Document>, path: &Path, text: &str) -> Url {
        let uri = Url::from_file_path(path).unwrap();
        documents.insert(uri.clone(), Document::new(uri.clone(), text.to_string(), true));
        uri
    }

    #[test]
    fn test_required_package_is_loaded_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/Basic.np"), "Digit = Num;").unwrap();
        let mut documents = HashMap::new();
        let main = open(
            &mut documents,
            &dir.path().join("Main.np"),
            "@require 'lib/Basic.np';\nP = Digit;",
        );

        let table = SyntaxInfoTable::build(&mut documents);

        assert_eq!(documents.len(), 2);
        let library = Url::from_file_path(dir.path().join("lib/Basic.np")).unwrap();
        assert!(!documents[&library].is_tracked);
        let linked = table.linked_package(&main).unwrap();
        assert!(linked.errors.is_empty(), "{:?}", linked.errors);
        assert_eq!(linked.required_files(), vec![table.file_id(&library).unwrap()]);
        let target = linked.references.values().next().unwrap();
        assert_eq!(table.package(target.file).uri, library);
    }

    #[test]
    fn test_missing_required_package_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut documents = HashMap::new();
        let main = open(&mut documents, &dir.path().join("Main.np"), "@require 'Missing.np';\nP = Word;");

        let table = SyntaxInfoTable::build(&mut documents);

        let linked = table.linked_package(&main).unwrap();
        assert!(linked.required.is_empty());
        assert_eq!(linked.errors.len(), 1);
        assert!(linked.errors[0].message.contains("Missing.np"));
    }

    #[test]
    fn test_cyclic_requirements_terminate() {
        let dir = TempDir::new().unwrap();
        let mut documents = HashMap::new();
        let a = open(&mut documents, &dir.path().join("A.np"), "@require 'B.np';\nA = B;");
        open(&mut documents, &dir.path().join("B.np"), "@require 'A.np';\nB = Word;");

        let table = SyntaxInfoTable::build(&mut documents);

        assert_eq!(table.packages().len(), 2);
        assert!(table.linked_package(&a).unwrap().errors.is_empty());
    }

    #[test]
    fn test_requirement_cycle_sees_every_package() {
        let dir = TempDir::new().unwrap();
        let mut documents = HashMap::new();
        let a = open(&mut documents, &dir.path().join("A.np"), "@require 'B.np';\nPa = Word;");
        let b = open(&mut documents, &dir.path().join("B.np"), "@require 'C.np';\nPb = Num;");
        let c = open(&mut documents, &dir.path().join("C.np"), "@require 'A.np';\nPc = Pa + Pb;");

        let table = SyntaxInfoTable::build(&mut documents);

        for uri in [&a, &b, &c] {
            let linked = table.linked_package(uri).unwrap();
            assert!(linked.errors.is_empty(), "{}: {:?}", uri, linked.errors);
        }
        let linked = table.linked_package(&c).unwrap();
        let mut targets: Vec<Url> = linked
            .references
            .values()
            .map(|target| table.package(target.file).uri.clone())
            .collect();
        targets.sort();
        assert_eq!(targets, vec![a, b]);
    }

    #[test]
    fn test_info_context() {
        let dir = TempDir::new().unwrap();
        let mut documents = HashMap::new();
        let uri = open(
            &mut documents,
            &dir.path().join("Main.np"),
            "P(X) = X: Word @where { Q = Any; };\nR(Y) = P(Y: X);",
        );
        let table = SyntaxInfoTable::build(&mut documents);
        let file = table.file_id(&uri).unwrap();
        let package = table.syntax(NodeRef::new(file, NodeId(0)));
        let p = package.patterns()[0];
        let q = package.pattern(p).unwrap().nested[0];
        let q_info = table.info(NodeRef::new(file, q)).unwrap();
        assert_eq!(q_info.pattern, Some(NodeRef::new(file, p)));

        let r = package.patterns()[1];
        let reference = package.pattern(r).unwrap().body.unwrap();
        let extraction = package.node(reference).subnodes[0];
        let info = table.info(NodeRef::new(file, extraction)).unwrap();
        assert_eq!(info.pattern, Some(NodeRef::new(file, r)));
        assert_eq!(info.pattern_reference, Some(NodeRef::new(file, reference)));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.np")),
            PathBuf::from("/a/c/d.np")
        );
    }
}
