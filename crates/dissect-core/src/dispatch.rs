use std::collections::HashMap;
use std::fmt;

use crate::context::ContextTable;
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::tree::{DecodedTree, NodeId, ScalarValue};

/// A decoding operation: consume the sub-cursor, append a subtree under
/// `ctx.parent`, return the subtree's root node.
pub type DecoderFn = fn(ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<NodeId, DecodeError>;

/// A registered decoder plus its display name.
#[derive(Clone, Copy)]
pub struct DecoderEntry {
    pub name: &'static str,
    pub decode: DecoderFn,
}

impl fmt::Debug for DecoderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// Built-in fallback: a single opaque-bytes leaf.
pub const OPAQUE: DecoderEntry = DecoderEntry {
    name: "data",
    decode: decode_opaque,
};

fn decode_opaque(
    mut cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let start = cursor.abs_pos();
    let n = cursor.remaining();
    let bytes = cursor.read_bytes(n)?;
    Ok(ctx
        .tree
        .add_scalar(ctx.parent, "data", start..start + n, ScalarValue::bytes(bytes)))
}

/// Everything a decoder needs while appending to the tree.
pub struct DecodeContext<'d> {
    pub tree: &'d mut DecodedTree,
    /// Node new subtrees attach under.
    pub parent: NodeId,
    pub registry: &'d DispatchRegistry,
    /// Session state, for protocols with cross-PDU memory.
    pub contexts: Option<&'d mut ContextTable>,
}

/// Discriminant-to-decoder mapping, populated once at bootstrap.
///
/// Re-registering a discriminant overwrites the prior mapping.
/// [`resolve`](Self::resolve) never fails: an unmapped discriminant
/// falls through to the registered default, or to [`OPAQUE`] when none
/// was registered, so an unknown record degrades to an opaque node
/// instead of aborting the tree.
///
/// # Examples
/// ```
/// use dissect_core::dispatch::{DispatchRegistry, OPAQUE};
///
/// let mut registry = DispatchRegistry::new();
/// registry.register(0x05, OPAQUE);
/// assert_eq!(registry.resolve(0x05).name, "data");
/// assert_eq!(registry.resolve(0xff).name, "data");
/// ```
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    by_discriminant: HashMap<u32, DecoderEntry>,
    default: Option<DecoderEntry>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, discriminant: u32, entry: DecoderEntry) {
        self.by_discriminant.insert(discriminant, entry);
    }

    pub fn register_default(&mut self, entry: DecoderEntry) {
        self.default = Some(entry);
    }

    pub fn resolve(&self, discriminant: u32) -> DecoderEntry {
        self.by_discriminant
            .get(&discriminant)
            .copied()
            .or(self.default)
            .unwrap_or(OPAQUE)
    }

    /// True when the discriminant has its own mapping (not counting the
    /// default).
    pub fn is_registered(&self, discriminant: u32) -> bool {
        self.by_discriminant.contains_key(&discriminant)
    }
}

/// Hand a sub-cursor to the decoder registered for `discriminant`,
/// attaching its subtree under `parent`.
///
/// An unmapped discriminant still decodes (through the default), with
/// an `UnsupportedField` diagnostic on the resulting node.
pub fn delegate(
    ctx: &mut DecodeContext<'_>,
    parent: NodeId,
    cursor: ByteCursor<'_>,
    discriminant: u32,
) -> NodeId {
    let known = ctx.registry.is_registered(discriminant);
    let entry = ctx.registry.resolve(discriminant);
    let node = delegate_to(ctx, parent, cursor, entry);
    if !known {
        ctx.tree.attach(
            node,
            &DecodeError::UnsupportedField {
                at: cursor.window().start,
                discriminant,
            },
        );
    }
    node
}

/// Hand a sub-cursor to an externally supplied decoder.
///
/// A decoder that fails before producing anything still yields a node:
/// a composite covering the window with the failure attached, so the
/// enclosing tree keeps its best-effort shape.
pub fn delegate_to(
    ctx: &mut DecodeContext<'_>,
    parent: NodeId,
    cursor: ByteCursor<'_>,
    entry: DecoderEntry,
) -> NodeId {
    let saved = ctx.parent;
    ctx.parent = parent;
    let result = (entry.decode)(cursor, ctx);
    ctx.parent = saved;
    match result {
        Ok(node) => node,
        Err(err) => {
            let node = ctx.tree.add_composite(parent, entry.name, cursor.window());
            ctx.tree.attach(node, &err);
            node
        }
    }
}
