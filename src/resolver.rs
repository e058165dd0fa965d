//! Offset to node resolution over a package tree.

use crate::syntax::{Child, NodeId, Package, SyntaxKind};

/// Deepest node whose range contains `offset`.
pub fn resolve(package: &Package, offset: usize) -> Option<NodeId> {
    let root = package.root();
    if !package.range(root).contains(offset) {
        return None;
    }
    Some(descend(package, root, offset, None).0)
}

/// First child whose range contains `offset`.
pub fn resolve_from_children(package: &Package, children: &[Child], offset: usize) -> Option<Child> {
    children
        .iter()
        .copied()
        .find(|&child| package.range_of_child(child).contains(offset))
}

/// Innermost pattern enclosing `node`, not counting `node` itself.
pub fn find_parent_pattern(package: &Package, node: NodeId) -> Option<NodeId> {
    parent_path(package, node).1
}

/// Innermost node enclosing the start of `node`, not counting `node` itself.
pub fn find_parent_syntax(package: &Package, node: NodeId) -> Option<NodeId> {
    parent_path(package, node).0
}

fn parent_path(package: &Package, node: NodeId) -> (Option<NodeId>, Option<NodeId>) {
    let root = package.root();
    let offset = package.range(node).start;
    if root == node || !package.range(root).contains(offset) {
        return (None, None);
    }
    let (deepest, pattern) = descend(package, root, offset, Some(node));
    (Some(deepest), pattern)
}

/// Walks down from `from` while some sub-node contains `offset`, never
/// entering `excluded`. Returns the deepest node reached and the innermost
/// pattern on the way.
fn descend(package: &Package, from: NodeId, offset: usize, excluded: Option<NodeId>) -> (NodeId, Option<NodeId>) {
    let mut current = from;
    let mut pattern = None;
    loop {
        if package.kind(current) == SyntaxKind::Pattern {
            pattern = Some(current);
        }
        let next = package
            .node(current)
            .subnodes
            .iter()
            .copied()
            .find(|&sub| Some(sub) != excluded && package.range(sub).contains(offset));
        match next {
            Some(sub) => current = sub,
            None => return (current, pattern),
        }
    }
}
