use std::ops::Range;

use serde::Serialize;

use crate::error::{DecodeError, DiagnosticKind};

/// Current tree export schema version.
pub const TREE_VERSION: u32 = 1;

/// Handle to a node inside a [`DecodedTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// Leaf value carried by a scalar node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    Unsigned(u64),
    Bool(bool),
    Text(String),
    Oid(String),
    /// Opaque bytes, rendered as lowercase hex.
    Bytes(String),
}

impl ScalarValue {
    /// Opaque byte value from a raw slice.
    pub fn bytes(raw: &[u8]) -> Self {
        ScalarValue::Bytes(raw.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

/// Recoverable decode degradation attached to a tree node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub offset: usize,
    pub message: String,
}

#[derive(Debug)]
struct NodeData {
    label: String,
    start: usize,
    len: usize,
    value: Option<ScalarValue>,
    children: Vec<NodeId>,
}

/// Hierarchical output artifact of a single decode pass.
///
/// Nodes are held in an arena and addressed by [`NodeId`], so a
/// composite node can be created before its true length is known and
/// fixed up with [`set_len`](Self::set_len) after its children have
/// been decoded. Building a node never fails; decode failures are
/// attached as [`Diagnostic`]s and the tree stays valid.
///
/// # Examples
/// ```
/// use dissect_core::tree::{DecodedTree, ScalarValue};
///
/// let mut tree = DecodedTree::new("message", 0..4);
/// let root = tree.root();
/// tree.add_scalar(root, "version", 0..1, ScalarValue::Unsigned(1));
/// assert_eq!(tree.children(root).len(), 1);
/// ```
#[derive(Debug)]
pub struct DecodedTree {
    nodes: Vec<NodeData>,
    diagnostics: Vec<(NodeId, Diagnostic)>,
}

impl DecodedTree {
    /// New tree with a composite root covering `range`.
    pub fn new(label: impl Into<String>, range: Range<usize>) -> Self {
        Self {
            nodes: vec![NodeData {
                label: label.into(),
                start: range.start,
                len: range.end - range.start,
                value: None,
                children: Vec::new(),
            }],
            diagnostics: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a scalar leaf under `parent`.
    pub fn add_scalar(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        range: Range<usize>,
        value: ScalarValue,
    ) -> NodeId {
        self.push_node(parent, label.into(), range, Some(value))
    }

    /// Append a composite node under `parent`; children attach to the
    /// returned handle.
    pub fn add_composite(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        range: Range<usize>,
    ) -> NodeId {
        self.push_node(parent, label.into(), range, None)
    }

    /// Fix up a node's length once its real extent is known.
    pub fn set_len(&mut self, node: NodeId, len: usize) {
        self.nodes[node.0].len = len;
    }

    pub fn label(&self, node: NodeId) -> &str {
        &self.nodes[node.0].label
    }

    pub fn range(&self, node: NodeId) -> Range<usize> {
        let data = &self.nodes[node.0];
        data.start..data.start + data.len
    }

    pub fn value(&self, node: NodeId) -> Option<&ScalarValue> {
        self.nodes[node.0].value.as_ref()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// First direct child of `parent` with the given label.
    pub fn find(&self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].label == label)
    }

    /// Attach a decode failure to `node` as a diagnostic.
    pub fn attach(&mut self, node: NodeId, error: &DecodeError) {
        let offset = error.offset().unwrap_or_else(|| self.nodes[node.0].start);
        self.attach_diagnostic(node, error.kind(), offset, error.to_string());
    }

    pub fn attach_diagnostic(
        &mut self,
        node: NodeId,
        kind: DiagnosticKind,
        offset: usize,
        message: impl Into<String>,
    ) {
        self.diagnostics.push((
            node,
            Diagnostic {
                kind,
                offset,
                message: message.into(),
            },
        ));
    }

    /// All diagnostics, in the order they were attached.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().map(|(_, diag)| diag)
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Serializable export of the whole pass.
    pub fn export(&self) -> TreeReport {
        TreeReport {
            tree_version: TREE_VERSION,
            root: self.export_node(self.root()),
            diagnostics: self.diagnostics().cloned().collect(),
        }
    }

    fn export_node(&self, node: NodeId) -> ExportNode {
        let data = &self.nodes[node.0];
        ExportNode {
            label: data.label.clone(),
            start: data.start,
            len: data.len,
            value: data.value.clone(),
            children: data.children.iter().map(|id| self.export_node(*id)).collect(),
            diagnostics: self
                .diagnostics
                .iter()
                .filter(|(id, _)| *id == node)
                .map(|(_, diag)| diag.clone())
                .collect(),
        }
    }

    fn push_node(
        &mut self,
        parent: NodeId,
        label: String,
        range: Range<usize>,
        value: Option<ScalarValue>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            label,
            start: range.start,
            len: range.end - range.start,
            value,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }
}

/// Versioned, serializable form of a [`DecodedTree`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeReport {
    pub tree_version: u32,
    pub root: ExportNode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// One exported node; children appear in decode order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportNode {
    pub label: String,
    pub start: usize,
    pub len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ScalarValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExportNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}
