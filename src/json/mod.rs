//! Arena-backed JSON tree model: a closed tagged variant over
//! object/array/primitive with per-container expand state, addressed by
//! integer node references.

mod render;

pub use render::{
    matching_bracket, JsonRenderer, RenderConfig, StyleKind, StyleRun, StyledText,
};

use serde_json::{Number, Value};
use thiserror::Error;

/// Arena index identifying one node of its owning tree. Identity comparison
/// is index equality; refs are only minted by the tree that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

impl NodeRef {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object { entries: Vec<(String, NodeRef)>, expanded: bool },
    Array { items: Vec<NodeRef>, expanded: bool },
    Primitive(Primitive),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeRef>,
}

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Exclusively owned tree for one inspected payload. Object keys are sorted
/// at construction time so re-rendering never re-sorts.
#[derive(Debug, Clone)]
pub struct JsonTree {
    nodes: Vec<Node>,
    root: NodeRef,
    focus: NodeRef,
}

impl JsonTree {
    /// Parse a payload. Returns an error, never a partially-built tree.
    pub fn parse(input: &str) -> Result<Self, JsonError> {
        let value: Value = serde_json::from_str(input)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let mut nodes = Vec::new();
        let root = build(&mut nodes, value, None);
        Self { nodes, root, focus: root }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// The node currently treated as the root of rendering.
    pub fn focus_root(&self) -> NodeRef {
        self.focus
    }

    pub fn kind(&self, node: NodeRef) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    pub fn is_container(&self, node: NodeRef) -> bool {
        matches!(self.kind(node), NodeKind::Object { .. } | NodeKind::Array { .. })
    }

    pub fn expanded(&self, node: NodeRef) -> Option<bool> {
        match self.kind(node) {
            NodeKind::Object { expanded, .. } | NodeKind::Array { expanded, .. } => Some(*expanded),
            NodeKind::Primitive(_) => None,
        }
    }

    /// Steps from `ancestor` down to `node`; `None` when `node` is not in
    /// that subtree.
    pub fn depth_below(&self, ancestor: NodeRef, node: NodeRef) -> Option<usize> {
        let mut depth = 0;
        let mut current = node;
        while current != ancestor {
            current = self.parent(current)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Flip the expand state of exactly this node; descendants keep theirs.
    /// Returns the new state, or `None` for a primitive.
    pub fn toggle(&mut self, node: NodeRef) -> Option<bool> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Object { expanded, .. } | NodeKind::Array { expanded, .. } => {
                *expanded = !*expanded;
                Some(*expanded)
            }
            NodeKind::Primitive(_) => None,
        }
    }

    pub fn set_expanded(&mut self, node: NodeRef, expanded: bool) {
        match &mut self.nodes[node.0].kind {
            NodeKind::Object { expanded: slot, .. } | NodeKind::Array { expanded: slot, .. } => {
                *slot = expanded;
            }
            NodeKind::Primitive(_) => {}
        }
    }

    /// Recursively apply an expand state to a whole subtree.
    pub fn set_all_expanded(&mut self, node: NodeRef, expanded: bool) {
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            match &mut self.nodes[current.0].kind {
                NodeKind::Object { entries, expanded: slot } => {
                    *slot = expanded;
                    pending.extend(entries.iter().map(|(_, child)| *child));
                }
                NodeKind::Array { items, expanded: slot } => {
                    *slot = expanded;
                    pending.extend(items.iter().copied());
                }
                NodeKind::Primitive(_) => {}
            }
        }
    }

    /// Treat a subtree as the root of rendering without mutating the tree.
    pub fn focus(&mut self, node: NodeRef) {
        self.focus = node;
    }

    pub fn reset_focus(&mut self) {
        self.focus = self.root;
    }
}

fn build(nodes: &mut Vec<Node>, value: &Value, parent: Option<NodeRef>) -> NodeRef {
    // Reserve the slot first so children can point back at it.
    let slot = NodeRef(nodes.len());
    nodes.push(Node { kind: NodeKind::Primitive(Primitive::Null), parent });

    let kind = match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let entries = pairs
                .into_iter()
                .map(|(key, child)| (key.clone(), build(nodes, child, Some(slot))))
                .collect();
            NodeKind::Object { entries, expanded: true }
        }
        Value::Array(items) => NodeKind::Array {
            items: items.iter().map(|child| build(nodes, child, Some(slot))).collect(),
            expanded: true,
        },
        Value::String(value) => NodeKind::Primitive(Primitive::String(value.clone())),
        Value::Number(value) => NodeKind::Primitive(Primitive::Number(value.clone())),
        Value::Bool(value) => NodeKind::Primitive(Primitive::Bool(*value)),
        Value::Null => NodeKind::Primitive(Primitive::Null),
    };
    nodes[slot.0].kind = kind;
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_entries(tree: &JsonTree, node: NodeRef) -> Vec<String> {
        match tree.kind(node) {
            NodeKind::Object { entries, .. } => {
                entries.iter().map(|(key, _)| key.clone()).collect()
            }
            _ => panic!("expected object node"),
        }
    }

    #[test]
    fn object_keys_are_sorted_at_construction() {
        let tree = JsonTree::from_value(&json!({"b": 1, "a": 2, "c": 3}));
        assert_eq!(object_entries(&tree, tree.root()), vec!["a", "b", "c"]);
    }

    #[test]
    fn array_order_is_preserved_from_source() {
        let tree = JsonTree::from_value(&json!([3, 1, 2]));
        match tree.kind(tree.root()) {
            NodeKind::Array { items, .. } => assert_eq!(items.len(), 3),
            _ => panic!("expected array node"),
        }
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        assert!(matches!(JsonTree::parse("{not json"), Err(JsonError::Parse(_))));
        assert!(JsonTree::parse(r#"{"ok": true}"#).is_ok());
    }

    #[test]
    fn toggle_flips_only_the_target_node() {
        let mut tree = JsonTree::from_value(&json!({"outer": {"inner": [1, 2]}}));
        let outer = match tree.kind(tree.root()) {
            NodeKind::Object { entries, .. } => entries[0].1,
            _ => panic!("expected object"),
        };
        let inner = match tree.kind(outer) {
            NodeKind::Object { entries, .. } => entries[0].1,
            _ => panic!("expected object"),
        };

        assert_eq!(tree.toggle(outer), Some(false));
        assert_eq!(tree.expanded(outer), Some(false));
        assert_eq!(tree.expanded(inner), Some(true));
        assert_eq!(tree.toggle(outer), Some(true));
    }

    #[test]
    fn set_all_expanded_cascades() {
        let mut tree = JsonTree::from_value(&json!({"a": {"b": {"c": [1]}}}));
        tree.set_all_expanded(tree.root(), false);
        let mut collapsed = 0;
        for index in 0..tree.len() {
            if tree.expanded(NodeRef(index)) == Some(false) {
                collapsed += 1;
            }
        }
        assert_eq!(collapsed, 4); // root, a, b, c

        tree.set_all_expanded(tree.root(), true);
        assert_eq!(tree.expanded(tree.root()), Some(true));
    }

    #[test]
    fn focus_changes_the_render_root_without_mutating_the_tree() {
        let mut tree = JsonTree::from_value(&json!({"a": {"b": 1}}));
        let a = match tree.kind(tree.root()) {
            NodeKind::Object { entries, .. } => entries[0].1,
            _ => panic!("expected object"),
        };

        tree.focus(a);
        assert_eq!(tree.focus_root(), a);
        assert_eq!(tree.depth_below(tree.root(), a), Some(1));

        tree.reset_focus();
        assert_eq!(tree.focus_root(), tree.root());
    }

    #[test]
    fn primitives_have_no_expand_state() {
        let mut tree = JsonTree::from_value(&json!(42));
        assert_eq!(tree.expanded(tree.root()), None);
        assert_eq!(tree.toggle(tree.root()), None);
    }
}
