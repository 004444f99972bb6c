use super::layout;
use crate::context::ContextTable;
use crate::cursor::ByteCursor;
use crate::dispatch::{DecodeContext, DecoderEntry, DispatchRegistry, delegate, delegate_to};
use crate::error::{DecodeError, DiagnosticKind};
use crate::tlv::{decode_constructed, read_tlv_header, unsigned_content};
use crate::tree::{DecodedTree, NodeId, ScalarValue};

/// Decode one buffer of association PDUs against a session's context
/// table.
///
/// A connect-accept PDU registers the negotiated presentation context
/// id against the application context identifier it carries; a
/// data-transfer PDU resolves its payload decoder through that
/// registration and fails closed when the id was never negotiated in
/// this session.
pub fn dissect(
    cursor: ByteCursor<'_>,
    registry: &DispatchRegistry,
    contexts: &mut ContextTable,
) -> DecodedTree {
    let mut tree = DecodedTree::new("association", cursor.window());
    let root = tree.root();
    let mut cursor = cursor;

    if cursor.remaining() == 0 {
        let at = cursor.abs_pos();
        let err = if cursor.reported_remaining() > 0 {
            DecodeError::Incomplete {
                at,
                needed: 2,
                actual: 0,
            }
        } else {
            DecodeError::Truncated {
                at,
                needed: 2,
                actual: 0,
            }
        };
        tree.attach(root, &err);
        return tree;
    }

    let mut ctx = DecodeContext {
        tree: &mut tree,
        parent: root,
        registry,
        contexts: Some(contexts),
    };
    while !cursor.is_at_end() {
        let (tag, len) = match read_tlv_header(&mut cursor) {
            Ok(header) => header,
            Err(err) => {
                ctx.tree.attach(root, &err);
                emit_unparsed(&mut ctx, root, cursor.rest());
                break;
            }
        };
        let tag_mark = cursor.abs_pos();
        if len > cursor.remaining() {
            let err = if len > cursor.reported_remaining() {
                DecodeError::Malformed {
                    at: tag_mark,
                    reason: format!(
                        "declared length {} exceeds {} remaining bytes",
                        len,
                        cursor.reported_remaining()
                    ),
                }
            } else {
                DecodeError::Incomplete {
                    at: tag_mark,
                    needed: len,
                    actual: cursor.remaining(),
                }
            };
            ctx.tree.attach(root, &err);
            emit_unparsed(&mut ctx, root, cursor.rest());
            break;
        }
        let body = match cursor.sub_range(0, len) {
            Ok(body) => body,
            Err(err) => {
                ctx.tree.attach(root, &err);
                break;
            }
        };
        if let Err(err) = cursor.skip(len) {
            ctx.tree.attach(root, &err);
            break;
        }
        delegate(&mut ctx, root, body, tag);
    }
    tree
}

fn emit_unparsed(ctx: &mut DecodeContext<'_>, parent: NodeId, remainder: ByteCursor<'_>) {
    if remainder.remaining() > 0 {
        ctx.tree.add_scalar(
            parent,
            "unparsed data",
            remainder.window(),
            ScalarValue::bytes(remainder.remaining_bytes()),
        );
    }
}

/// PDU decoders wired in by the bootstrap layer.
pub fn default_registry() -> DispatchRegistry {
    let mut registry = DispatchRegistry::new();
    registry.register(
        layout::PDU_CONNECT_REQUEST,
        DecoderEntry {
            name: "connect request",
            decode: decode_connect_request,
        },
    );
    registry.register(
        layout::PDU_CONNECT_ACCEPT,
        DecoderEntry {
            name: "connect accept",
            decode: decode_connect_accept,
        },
    );
    registry.register(
        layout::PDU_DATA_TRANSFER,
        DecoderEntry {
            name: "data transfer",
            decode: decode_data_transfer,
        },
    );
    registry
}

fn decode_connect_request(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let node = ctx
        .tree
        .add_composite(ctx.parent, "connect request", cursor.window());
    decode_constructed(cursor, layout::CONNECT_REQUEST_FIELDS, ctx.tree, node);
    Ok(node)
}

fn decode_connect_accept(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let node = ctx
        .tree
        .add_composite(ctx.parent, "connect accept", cursor.window());
    decode_constructed(cursor, layout::CONNECT_ACCEPT_FIELDS, ctx.tree, node);

    // remember which protocol the negotiated context id stands for
    let context_id = ctx
        .tree
        .find(node, "presentation context id")
        .and_then(|id| match ctx.tree.value(id) {
            Some(ScalarValue::Unsigned(value)) => u32::try_from(*value).ok(),
            _ => None,
        });
    let protocol = ctx
        .tree
        .find(node, "application context")
        .and_then(|id| match ctx.tree.value(id) {
            Some(ScalarValue::Oid(oid)) => Some(oid.clone()),
            _ => None,
        });
    if let (Some(context_id), Some(protocol), Some(contexts)) =
        (context_id, protocol, ctx.contexts.as_deref_mut())
    {
        contexts.register(context_id, protocol);
    }
    Ok(node)
}

fn decode_data_transfer(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx
        .tree
        .add_composite(ctx.parent, "data transfer", cursor.window());

    let mark = cursor.abs_pos();
    let (tag, len) = match read_tlv_header(&mut cursor) {
        Ok(header) => header,
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    };
    if tag != layout::TAG_CONTEXT_ID {
        ctx.tree.attach(
            node,
            &DecodeError::SchemaViolation {
                at: mark,
                expected: "presentation context id".to_string(),
                found: tag,
            },
        );
        return Ok(node);
    }
    let mut id_body = match cursor.sub_range(0, len) {
        Ok(body) => body,
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    };
    if let Err(err) = cursor.skip(len) {
        ctx.tree.attach(node, &err);
        return Ok(node);
    }
    let raw_id = match unsigned_content(&mut id_body) {
        Ok(value) => value,
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    };
    let context_id = match u32::try_from(raw_id) {
        Ok(id) => id,
        Err(_) => {
            ctx.tree.attach(
                node,
                &DecodeError::Malformed {
                    at: mark,
                    reason: format!("context id {} out of range", raw_id),
                },
            );
            return Ok(node);
        }
    };
    ctx.tree.add_scalar(
        node,
        "presentation context id",
        mark..cursor.abs_pos(),
        ScalarValue::Unsigned(u64::from(context_id)),
    );

    let mark = cursor.abs_pos();
    let (tag, len) = match read_tlv_header(&mut cursor) {
        Ok(header) => header,
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    };
    if tag != layout::TAG_PAYLOAD {
        ctx.tree.attach(
            node,
            &DecodeError::SchemaViolation {
                at: mark,
                expected: "payload".to_string(),
                found: tag,
            },
        );
        return Ok(node);
    }
    let payload = match cursor.sub_range(0, len) {
        Ok(body) => body,
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    };
    if let Err(err) = cursor.skip(len) {
        ctx.tree.attach(node, &err);
        return Ok(node);
    }
    let payload_range = mark..cursor.abs_pos();

    let protocol = ctx
        .contexts
        .as_deref()
        .and_then(|contexts| contexts.lookup(context_id))
        .map(str::to_string);
    match protocol {
        Some(protocol) => match payload_decoder_for(&protocol) {
            Some(entry) => {
                delegate_to(ctx, node, payload, entry);
            }
            None => {
                let leaf = ctx.tree.add_scalar(
                    node,
                    "payload",
                    payload_range.clone(),
                    ScalarValue::bytes(payload.remaining_bytes()),
                );
                ctx.tree.attach_diagnostic(
                    leaf,
                    DiagnosticKind::UnsupportedField,
                    payload_range.start,
                    format!("no decoder registered for {}", protocol),
                );
            }
        },
        None => {
            // fail closed: the context was never negotiated here
            let leaf = ctx.tree.add_scalar(
                node,
                "payload",
                payload_range,
                ScalarValue::Text("decoder is not available".to_string()),
            );
            ctx.tree
                .attach(leaf, &DecodeError::ContextMiss { context_id });
        }
    }
    Ok(node)
}

const PAYLOAD_PROTOCOLS: &[(&str, DecoderEntry)] = &[
    (
        layout::OID_DIAG_TEXT,
        DecoderEntry {
            name: "diagnostic text",
            decode: decode_diag_text,
        },
    ),
    (
        layout::OID_COUNTER_STREAM,
        DecoderEntry {
            name: "counter stream",
            decode: decode_counter_stream,
        },
    ),
];

fn payload_decoder_for(protocol: &str) -> Option<DecoderEntry> {
    PAYLOAD_PROTOCOLS
        .iter()
        .find(|(oid, _)| *oid == protocol)
        .map(|(_, entry)| *entry)
}

fn decode_diag_text(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let text = String::from_utf8_lossy(cursor.remaining_bytes()).to_string();
    Ok(ctx.tree.add_scalar(
        ctx.parent,
        "diagnostic text",
        cursor.window(),
        ScalarValue::Text(text),
    ))
}

fn decode_counter_stream(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx
        .tree
        .add_composite(ctx.parent, "counter stream", cursor.window());
    while cursor.remaining() >= 4 {
        let mark = cursor.abs_pos();
        match cursor.read_u32_be() {
            Ok(value) => {
                ctx.tree.add_scalar(
                    node,
                    "counter",
                    cursor.span_from(mark),
                    ScalarValue::Unsigned(u64::from(value)),
                );
            }
            Err(err) => {
                ctx.tree.attach(node, &err);
                break;
            }
        }
    }
    if cursor.remaining() > 0 {
        ctx.tree.attach_diagnostic(
            node,
            DiagnosticKind::Malformed,
            cursor.abs_pos(),
            format!("{} trailing bytes after last counter", cursor.remaining()),
        );
    }
    Ok(node)
}
