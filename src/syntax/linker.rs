use std::collections::HashMap;

use super::parser::join_name;
use super::{FileId, NodeData, NodeId, NodeRef, Package, SyntaxError, SyntaxKind};

/// Result of linking one package against the packages it requires.
#[derive(Debug, Default, Clone)]
pub struct Linked {
    /// Resolved target pattern for every pattern reference that resolved.
    pub references: HashMap<NodeId, NodeRef>,
    pub errors: Vec<SyntaxError>,
}

/// Named patterns of a package in declaration order, nested ones included.
pub fn declared_patterns(package: &Package) -> Vec<NodeId> {
    fn collect(package: &Package, ids: &[NodeId], out: &mut Vec<NodeId>) {
        for &id in ids {
            if let Some(data) = package.pattern(id) {
                if data.name.is_some() {
                    out.push(id);
                }
                collect(package, &data.nested, out);
            }
        }
    }
    let mut out = Vec::new();
    collect(package, package.patterns(), &mut out);
    out
}

/// Candidate full names for `name` referenced from the given scopes,
/// innermost scope first.
fn candidates(scopes: &[String], namespace: &str, name: &str) -> Vec<String> {
    let mut result: Vec<String> = scopes.iter().map(|s| join_name(s, name)).collect();
    let mut namespace = namespace;
    loop {
        result.push(join_name(namespace, name));
        if namespace.is_empty() {
            break;
        }
        namespace = namespace.rfind('.').map_or("", |i| &namespace[..i]);
    }
    result.dedup();
    result
}

/// Links `package` (registered as `file`) against `required`, which must
/// contain every transitively required package.
pub fn link(file: FileId, package: &Package, required: &[(FileId, &Package)]) -> Linked {
    let mut linker = Linker {
        packages: HashMap::new(),
        visible: HashMap::new(),
        linked: Linked::default(),
        scopes: Vec::new(),
        enclosing: Vec::new(),
    };
    linker.packages.insert(file, package);
    for &(required_file, required_package) in required {
        linker.packages.insert(required_file, required_package);
    }

    for id in declared_patterns(package) {
        let Some(data) = package.pattern(id) else { continue };
        if linker.visible.contains_key(&data.full_name) {
            linker.linked.errors.push(SyntaxError::new(
                package.token_range(id),
                format!("Pattern '{}' is already defined", data.full_name),
            ));
        } else {
            linker.visible.insert(data.full_name.clone(), NodeRef::new(file, id));
        }
    }
    for &(required_file, required_package) in required {
        for id in declared_patterns(required_package) {
            if let Some(data) = required_package.pattern(id) {
                linker
                    .visible
                    .entry(data.full_name.clone())
                    .or_insert(NodeRef::new(required_file, id));
            }
        }
    }

    linker.visit(package, package.root());
    linker.linked
}

struct Linker<'p> {
    packages: HashMap<FileId, &'p Package>,
    visible: HashMap<String, NodeRef>,
    linked: Linked,
    scopes: Vec<String>,
    enclosing: Vec<NodeId>,
}

impl<'p> Linker<'p> {
    fn visit(&mut self, package: &Package, id: NodeId) {
        let node = package.node(id);
        if node.range.is_empty() && node.kind != SyntaxKind::Package {
            return;
        }
        match &node.data {
            NodeData::Pattern(data) => {
                self.scopes.insert(0, data.full_name.clone());
                self.enclosing.push(id);
                for &sub in &node.subnodes {
                    self.visit(package, sub);
                }
                self.enclosing.pop();
                self.scopes.remove(0);
            }
            NodeData::PatternReference { name, extractions } => {
                let namespace = self.current_namespace(package);
                let target = self.resolve(package, id, name, &namespace);
                for &extraction in extractions {
                    self.check_extraction_from_field(package, extraction, target);
                }
            }
            NodeData::PatternSearchTarget {
                namespace,
                reference,
            } => {
                if let NodeData::PatternReference { name, .. } = &package.node(*reference).data {
                    let saved = std::mem::take(&mut self.scopes);
                    self.resolve(package, *reference, name, namespace);
                    self.scopes = saved;
                }
            }
            NodeData::Extraction { field_name } => {
                if !self.enclosing_has_field(package, field_name) {
                    self.linked.errors.push(SyntaxError::new(
                        package.token_range(id),
                        format!("Field '{}' is not defined", field_name),
                    ));
                }
                for &sub in &node.subnodes {
                    self.visit(package, sub);
                }
            }
            _ => {
                for &sub in &node.subnodes {
                    self.visit(package, sub);
                }
            }
        }
    }

    fn current_namespace(&self, package: &Package) -> String {
        self.enclosing
            .first()
            .and_then(|&id| package.pattern(id))
            .map(|data| data.namespace.clone())
            .unwrap_or_default()
    }

    fn resolve(&mut self, package: &Package, id: NodeId, name: &str, namespace: &str) -> Option<NodeRef> {
        let target = candidates(&self.scopes, namespace, name)
            .into_iter()
            .find_map(|candidate| self.visible.get(&candidate).copied());
        match target {
            Some(target) => {
                self.linked.references.insert(id, target);
            }
            None => self.linked.errors.push(SyntaxError::new(
                package.token_range(id),
                format!("Pattern '{}' is not defined", name),
            )),
        }
        target
    }

    fn enclosing_has_field(&self, package: &Package, field_name: &str) -> bool {
        self.enclosing
            .last()
            .is_some_and(|&pattern| has_field(package, pattern, field_name))
    }

    fn check_extraction_from_field(&mut self, package: &Package, id: NodeId, target: Option<NodeRef>) {
        let NodeData::ExtractionFromField {
            field_name,
            from_field_name,
        } = &package.node(id).data
        else {
            return;
        };
        if !self.enclosing_has_field(package, field_name) {
            self.linked.errors.push(SyntaxError::new(
                package.token_range(id),
                format!("Field '{}' is not defined", field_name),
            ));
        }
        let Some(target) = target else { return };
        let source = from_field_name.as_deref().unwrap_or(field_name);
        let defined = self
            .packages
            .get(&target.file)
            .is_some_and(|target_package| has_field(target_package, target.node, source));
        if !defined {
            self.linked.errors.push(SyntaxError::new(
                package.token_range(id),
                format!("Field '{}' is not defined in the referenced pattern", source),
            ));
        }
    }
}

fn has_field(package: &Package, pattern: NodeId, field_name: &str) -> bool {
    package.pattern(pattern).is_some_and(|data| {
        data.fields
            .iter()
            .any(|&field| package.field_name(field) == Some(field_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn messages(linked: &Linked) -> Vec<String> {
        linked.errors.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_resolve_nested_then_namespace() {
        let package = parse(
            "@namespace N { P = Inner @where { Inner = Word; }; Q = P; }\nR = N.Q;",
        );
        let linked = link(0, &package, &[]);
        assert!(linked.errors.is_empty(), "{:?}", messages(&linked));
        assert_eq!(linked.references.len(), 3);
    }

    #[test]
    fn test_undefined_and_duplicate_patterns() {
        let package = parse("P = Missing;\nP = Word;");
        let linked = link(0, &package, &[]);
        assert_eq!(
            messages(&linked),
            vec![
                "Pattern 'P' is already defined".to_string(),
                "Pattern 'Missing' is not defined".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_from_required_package() {
        let library = parse("@namespace Lib { Digit = Num; }");
        let package = parse("P = Lib.Digit;");
        let linked = link(0, &package, &[(1, &library)]);
        assert!(linked.errors.is_empty());
        let target = linked.references.values().next().unwrap();
        assert_eq!(target.file, 1);
    }

    #[test]
    fn test_field_checks() {
        let package = parse("P(X) = X: Word + Y: Num;\nQ(Z) = P(Z: X) + P(Z: W);");
        let linked = link(0, &package, &[]);
        assert_eq!(
            messages(&linked),
            vec![
                "Field 'Y' is not defined".to_string(),
                "Field 'W' is not defined in the referenced pattern".to_string(),
            ]
        );
    }
}
