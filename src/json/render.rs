//! Styled-text rendering for the JSON tree: fully expanded subtrees,
//! bounded previews for collapsed containers, and localized re-rendering
//! that splices one node's byte range without reflowing the document.

use std::collections::HashSet;
use std::ops::Range;

use super::{JsonTree, NodeKind, NodeRef, Primitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Key,
    Str,
    Number,
    Bool,
    Null,
    Bracket,
    Ellipsis,
}

/// One styled span. The node tag correlates the span back to tree state for
/// click-to-toggle and bracket highlighting; key spans carry the child node
/// they introduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRun {
    pub range: Range<usize>,
    pub kind: StyleKind,
    pub node: NodeRef,
}

/// Byte-range-addressable styled document. Runs are sorted by start offset
/// and never overlap; text between runs is plain (indentation, separators).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledText {
    text: String,
    runs: Vec<StyleRun>,
}

impl StyledText {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn runs(&self) -> &[StyleRun] {
        &self.runs
    }

    pub fn run_at(&self, offset: usize) -> Option<&StyleRun> {
        self.run_index_at(offset).map(|index| &self.runs[index])
    }

    fn run_index_at(&self, offset: usize) -> Option<usize> {
        let index = self.runs.partition_point(|run| run.range.end <= offset);
        let run = self.runs.get(index)?;
        (run.range.start <= offset && offset < run.range.end).then_some(index)
    }

    /// Splice a replacement into `range`, shifting every later run by the
    /// length delta. Offsets outside the range are otherwise untouched.
    pub fn replace(&mut self, range: Range<usize>, replacement: StyledText) {
        let StyledText { text: new_text, runs: new_runs } = replacement;
        let delta = new_text.len() as isize - (range.end - range.start) as isize;
        self.text.replace_range(range.clone(), &new_text);

        let mut runs = Vec::with_capacity(self.runs.len() + new_runs.len());
        for run in &self.runs {
            if run.range.end <= range.start {
                runs.push(run.clone());
            }
        }
        for run in new_runs {
            runs.push(StyleRun {
                range: run.range.start + range.start..run.range.end + range.start,
                kind: run.kind,
                node: run.node,
            });
        }
        for run in &self.runs {
            if run.range.start >= range.end {
                runs.push(StyleRun {
                    range: shift(run.range.start, delta)..shift(run.range.end, delta),
                    kind: run.kind,
                    node: run.node,
                });
            }
        }
        self.runs = runs;
    }

    fn push(&mut self, text: &str, kind: StyleKind, node: NodeRef) {
        if text.is_empty() {
            return;
        }
        let start = self.text.len();
        self.text.push_str(text);
        self.runs.push(StyleRun { range: start..self.text.len(), kind, node });
    }

    fn push_plain(&mut self, text: &str) {
        self.text.push_str(text);
    }
}

fn shift(offset: usize, delta: isize) -> usize {
    (offset as isize + delta) as usize
}

/// Given a click offset on a bracket character, return the offset of the
/// partner bracket belonging to the same node identity. Nested brackets of
/// the same character never pair up because their node tags differ.
pub fn matching_bracket(doc: &StyledText, offset: usize) -> Option<usize> {
    let position = doc.run_index_at(offset)?;
    let run = &doc.runs[position];
    if run.kind != StyleKind::Bracket {
        return None;
    }

    let forward = doc.runs[position + 1..]
        .iter()
        .find(|candidate| candidate.kind == StyleKind::Bracket && candidate.node == run.node);
    if let Some(partner) = forward {
        return Some(partner.range.start);
    }
    doc.runs[..position]
        .iter()
        .rev()
        .find(|candidate| candidate.kind == StyleKind::Bracket && candidate.node == run.node)
        .map(|partner| partner.range.start)
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub indent_width: usize,
    /// Collapsed previews stop after this many children...
    pub preview_max_children: usize,
    /// ...or after this many characters, whichever is hit first.
    pub preview_max_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { indent_width: 2, preview_max_children: 5, preview_max_chars: 60 }
    }
}

/// Renderer for one tree. Keeps per-node memoized primitive text and the
/// byte range every rendered node occupies in the current document.
#[derive(Debug)]
pub struct JsonRenderer {
    config: RenderConfig,
    primitive_cache: Vec<Option<String>>,
    node_ranges: Vec<Option<Range<usize>>>,
    revision: u64,
}

impl Default for JsonRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl JsonRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config, primitive_cache: Vec::new(), node_ranges: Vec::new(), revision: 0 }
    }

    /// Bumped whenever the document changes; consumers key caches off it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Byte range the node's rendering occupies in the current document,
    /// if it is visible at all.
    pub fn node_range(&self, node: NodeRef) -> Option<Range<usize>> {
        self.node_ranges.get(node.index()).cloned().flatten()
    }

    /// Innermost rendered node covering a byte offset.
    pub fn node_at(&self, offset: usize) -> Option<NodeRef> {
        self.node_ranges
            .iter()
            .enumerate()
            .filter_map(|(index, range)| {
                let range = range.as_ref()?;
                (range.start <= offset && offset < range.end)
                    .then(|| (range.end - range.start, NodeRef(index)))
            })
            .min_by_key(|(len, _)| *len)
            .map(|(_, node)| node)
    }

    /// Render the whole document from the tree's focus root.
    pub fn render(&mut self, tree: &JsonTree) -> StyledText {
        self.primitive_cache.resize(tree.len(), None);
        self.node_ranges = vec![None; tree.len()];
        let mut out = StyledText::default();
        self.render_value(tree, tree.focus_root(), 0, 0, &mut out);
        self.revision += 1;
        out
    }

    /// Re-render exactly one node and splice the result into the document,
    /// leaving every byte outside the node's previous range untouched.
    /// Returns the node's new range, or `None` when the node is not part of
    /// the current document.
    pub fn patch(
        &mut self,
        tree: &JsonTree,
        node: NodeRef,
        doc: &mut StyledText,
    ) -> Option<Range<usize>> {
        let old = self.node_range(node)?;
        let depth = tree.depth_below(tree.focus_root(), node)?;

        let subtree = collect_subtree(tree, node);
        for index in &subtree {
            if let Some(slot) = self.node_ranges.get_mut(*index) {
                *slot = None;
            }
        }

        let mut fresh = StyledText::default();
        self.render_value(tree, node, depth, old.start, &mut fresh);
        let new_len = fresh.len();
        doc.replace(old.clone(), fresh);

        let delta = new_len as isize - (old.end - old.start) as isize;
        for (index, slot) in self.node_ranges.iter_mut().enumerate() {
            if subtree.contains(&index) {
                continue;
            }
            let Some(range) = slot else { continue };
            if range.start >= old.end {
                range.start = shift(range.start, delta);
                range.end = shift(range.end, delta);
            } else if range.start <= old.start && range.end >= old.end {
                // Ancestors stretch around the splice.
                range.end = shift(range.end, delta);
            }
        }

        self.revision += 1;
        Some(old.start..old.start + new_len)
    }

    fn render_value(
        &mut self,
        tree: &JsonTree,
        node: NodeRef,
        depth: usize,
        base: usize,
        out: &mut StyledText,
    ) {
        let start = out.len();
        match tree.kind(node) {
            NodeKind::Primitive(primitive) => self.push_primitive(node, primitive, out),
            NodeKind::Object { entries, expanded } => {
                if *expanded {
                    self.render_object(tree, node, entries, depth, base, out);
                } else {
                    self.render_preview(tree, node, out);
                }
            }
            NodeKind::Array { items, expanded } => {
                if *expanded {
                    self.render_array(tree, node, items, depth, base, out);
                } else {
                    self.render_preview(tree, node, out);
                }
            }
        }
        self.node_ranges[node.index()] = Some(base + start..base + out.len());
    }

    fn render_object(
        &mut self,
        tree: &JsonTree,
        node: NodeRef,
        entries: &[(String, NodeRef)],
        depth: usize,
        base: usize,
        out: &mut StyledText,
    ) {
        out.push("{", StyleKind::Bracket, node);
        if !entries.is_empty() {
            out.push_plain("\n");
            for (index, (key, child)) in entries.iter().enumerate() {
                out.push_plain(&self.indent(depth + 1));
                out.push(&quote_key(key), StyleKind::Key, *child);
                out.push_plain(": ");
                self.render_value(tree, *child, depth + 1, base, out);
                if index + 1 < entries.len() {
                    out.push_plain(",");
                }
                out.push_plain("\n");
            }
            out.push_plain(&self.indent(depth));
        }
        out.push("}", StyleKind::Bracket, node);
    }

    fn render_array(
        &mut self,
        tree: &JsonTree,
        node: NodeRef,
        items: &[NodeRef],
        depth: usize,
        base: usize,
        out: &mut StyledText,
    ) {
        out.push("[", StyleKind::Bracket, node);
        if !items.is_empty() {
            out.push_plain("\n");
            for (index, child) in items.iter().enumerate() {
                out.push_plain(&self.indent(depth + 1));
                self.render_value(tree, *child, depth + 1, base, out);
                if index + 1 < items.len() {
                    out.push_plain(",");
                }
                out.push_plain("\n");
            }
            out.push_plain(&self.indent(depth));
        }
        out.push("]", StyleKind::Bracket, node);
    }

    /// Abbreviated single-line summary of a collapsed container, bounded by
    /// both the child cap and the character budget.
    fn render_preview(&mut self, tree: &JsonTree, node: NodeRef, out: &mut StyledText) {
        match tree.kind(node) {
            NodeKind::Object { entries, .. } => {
                out.push("{", StyleKind::Bracket, node);
                let mut used = 0usize;
                let mut emitted = 0usize;
                let mut truncated = false;
                for (index, (key, child)) in entries.iter().enumerate() {
                    if emitted == self.config.preview_max_children {
                        truncated = true;
                        break;
                    }
                    let quoted = quote_key(key);
                    let stub = self.abbreviated_text(tree, *child);
                    let separator = if index > 0 { 2 } else { 0 };
                    let cost =
                        separator + quoted.chars().count() + 2 + stub.chars().count();
                    if used + cost > self.config.preview_max_chars {
                        truncated = true;
                        break;
                    }
                    if index > 0 {
                        out.push_plain(", ");
                    }
                    out.push(&quoted, StyleKind::Key, *child);
                    out.push_plain(": ");
                    self.push_abbreviated(tree, *child, out);
                    used += cost;
                    emitted += 1;
                }
                if truncated {
                    if emitted > 0 {
                        out.push_plain(", ");
                    }
                    out.push("…", StyleKind::Ellipsis, node);
                }
                out.push("}", StyleKind::Bracket, node);
            }
            NodeKind::Array { items, .. } => {
                out.push("[", StyleKind::Bracket, node);
                let mut used = 0usize;
                let mut emitted = 0usize;
                let mut truncated = false;
                for (index, child) in items.iter().enumerate() {
                    if emitted == self.config.preview_max_children {
                        truncated = true;
                        break;
                    }
                    let stub = self.abbreviated_text(tree, *child);
                    let separator = if index > 0 { 2 } else { 0 };
                    let cost = separator + stub.chars().count();
                    if used + cost > self.config.preview_max_chars {
                        truncated = true;
                        break;
                    }
                    if index > 0 {
                        out.push_plain(", ");
                    }
                    self.push_abbreviated(tree, *child, out);
                    used += cost;
                    emitted += 1;
                }
                if truncated {
                    if emitted > 0 {
                        out.push_plain(", ");
                    }
                    out.push("…", StyleKind::Ellipsis, node);
                }
                out.push("]", StyleKind::Bracket, node);
            }
            NodeKind::Primitive(_) => {}
        }
    }

    fn abbreviated_text(&mut self, tree: &JsonTree, node: NodeRef) -> String {
        match tree.kind(node) {
            NodeKind::Object { .. } => "{…}".to_string(),
            NodeKind::Array { .. } => "[…]".to_string(),
            NodeKind::Primitive(primitive) => self.primitive_text(node, primitive).to_string(),
        }
    }

    fn push_abbreviated(&mut self, tree: &JsonTree, node: NodeRef, out: &mut StyledText) {
        match tree.kind(node) {
            NodeKind::Object { .. } => out.push("{…}", StyleKind::Ellipsis, node),
            NodeKind::Array { .. } => out.push("[…]", StyleKind::Ellipsis, node),
            NodeKind::Primitive(primitive) => self.push_primitive(node, primitive, out),
        }
    }

    fn push_primitive(&mut self, node: NodeRef, primitive: &Primitive, out: &mut StyledText) {
        let kind = match primitive {
            Primitive::String(_) => StyleKind::Str,
            Primitive::Number(_) => StyleKind::Number,
            Primitive::Bool(_) => StyleKind::Bool,
            Primitive::Null => StyleKind::Null,
        };
        let text = self.primitive_text(node, primitive);
        let start = out.text.len();
        out.text.push_str(text);
        out.runs.push(StyleRun { range: start..out.text.len(), kind, node });
    }

    /// Primitive values never change after construction, so their rendered
    /// form is memoized per node.
    fn primitive_text(&mut self, node: NodeRef, primitive: &Primitive) -> &str {
        if node.index() >= self.primitive_cache.len() {
            self.primitive_cache.resize(node.index() + 1, None);
        }
        self.primitive_cache[node.index()].get_or_insert_with(|| format_primitive(primitive))
    }

    fn indent(&self, depth: usize) -> String {
        " ".repeat(depth * self.config.indent_width)
    }
}

fn collect_subtree(tree: &JsonTree, node: NodeRef) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        if !seen.insert(current.index()) {
            continue;
        }
        match tree.kind(current) {
            NodeKind::Object { entries, .. } => {
                pending.extend(entries.iter().map(|(_, child)| *child));
            }
            NodeKind::Array { items, .. } => pending.extend(items.iter().copied()),
            NodeKind::Primitive(_) => {}
        }
    }
    seen
}

fn quote_key(key: &str) -> String {
    serde_json::to_string(key).unwrap_or_else(|_| format!("\"{key}\""))
}

fn format_primitive(primitive: &Primitive) -> String {
    match primitive {
        Primitive::String(value) => {
            serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
        }
        Primitive::Number(value) => value.to_string(),
        Primitive::Bool(value) => value.to_string(),
        Primitive::Null => "null".to_string(),
    }
}
