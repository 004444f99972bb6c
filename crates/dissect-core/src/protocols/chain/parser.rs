use super::layout;
use crate::cursor::ByteCursor;
use crate::dispatch::{DecodeContext, DecoderEntry, DispatchRegistry, OPAQUE, delegate};
use crate::error::DecodeError;
use crate::tree::{DecodedTree, NodeId, ScalarValue};
use crate::walk::{Discriminant, HeaderFormat, LengthEncoding, RecordWalker, WalkEnd, WalkStep};

/// Decode a key-management message: a fixed common header followed by a
/// "next payload" chain terminated by the reserved last-payload value.
pub fn dissect(cursor: ByteCursor<'_>, registry: &DispatchRegistry) -> DecodedTree {
    let mut tree = DecodedTree::new("message", cursor.window());
    let root = tree.root();
    let mut cursor = cursor;
    let base = cursor.abs_pos();

    let (msg_type, first_payload, session_id) = match read_header(&mut cursor) {
        Ok(header) => header,
        Err(err) => {
            tree.attach(root, &err);
            return tree;
        }
    };

    let header_node = tree.add_composite(root, "header", base..base + layout::HEADER_LEN);
    tree.add_scalar(
        header_node,
        "message type",
        base + layout::MSG_TYPE_OFFSET..base + layout::MSG_TYPE_OFFSET + 1,
        ScalarValue::Unsigned(u64::from(msg_type)),
    );
    tree.add_scalar(
        header_node,
        "next payload",
        base + layout::NEXT_PAYLOAD_OFFSET..base + layout::NEXT_PAYLOAD_OFFSET + 1,
        ScalarValue::Unsigned(u64::from(first_payload)),
    );
    tree.add_scalar(
        header_node,
        "session id",
        base + layout::SESSION_ID_RANGE.start..base + layout::SESSION_ID_RANGE.end,
        ScalarValue::Unsigned(u64::from(session_id)),
    );

    let payloads_start = cursor.abs_pos();
    let payloads = tree.add_composite(root, "payloads", payloads_start..payloads_start);
    let mut ctx = DecodeContext {
        tree: &mut tree,
        parent: payloads,
        registry,
        contexts: None,
    };

    let mut walker = RecordWalker::new(
        cursor.rest(),
        HeaderFormat {
            discriminant: Discriminant::Chained {
                initial: u32::from(first_payload),
            },
            length: LengthEncoding::ExplicitBytes {
                width: 2,
                big_endian: true,
                includes_header: true,
            },
            sentinel: Some(layout::LAST_PAYLOAD),
        },
    );

    let payloads_end;
    loop {
        match walker.next_record() {
            WalkStep::Record(record) => {
                let record_range = record.header.start..record.body.window().end;
                let payload_node =
                    ctx.tree
                        .add_composite(payloads, "payload", record_range.clone());
                let next = walker.pending_discriminant().unwrap_or(layout::LAST_PAYLOAD);
                ctx.tree.add_scalar(
                    payload_node,
                    "next payload",
                    record.header.start..record.header.start + 1,
                    ScalarValue::Unsigned(u64::from(next)),
                );
                ctx.tree.add_scalar(
                    payload_node,
                    "length",
                    record.header.start + 1..record.header.end,
                    ScalarValue::Unsigned((record_range.end - record_range.start) as u64),
                );
                delegate(&mut ctx, payload_node, record.body, record.discriminant);
            }
            WalkStep::Done(WalkEnd::Sentinel(_)) | WalkStep::Done(WalkEnd::Exhausted) => {
                payloads_end = walker.remainder().abs_pos();
                break;
            }
            WalkStep::Done(WalkEnd::Failed(err)) => {
                ctx.tree.attach(payloads, &err);
                let remainder = walker.remainder();
                if remainder.remaining() > 0 {
                    ctx.tree.add_scalar(
                        payloads,
                        "unparsed data",
                        remainder.window(),
                        ScalarValue::bytes(remainder.remaining_bytes()),
                    );
                }
                payloads_end = remainder.window().end;
                break;
            }
        }
    }
    tree.set_len(payloads, payloads_end - payloads_start);
    tree
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<(u8, u8, u32), DecodeError> {
    let msg_type = cursor.read_u8()?;
    let next_payload = cursor.read_u8()?;
    let session_id = cursor.read_u32_be()?;
    Ok((msg_type, next_payload, session_id))
}

/// Payload decoders wired in by the bootstrap layer.
pub fn default_registry() -> DispatchRegistry {
    let mut registry = DispatchRegistry::new();
    registry.register(
        layout::PAYLOAD_TIMESTAMP,
        DecoderEntry {
            name: "timestamp",
            decode: decode_timestamp,
        },
    );
    registry.register(
        layout::PAYLOAD_RAND,
        DecoderEntry {
            name: "rand",
            decode: decode_rand,
        },
    );
    registry.register(
        layout::PAYLOAD_KEY_DATA,
        DecoderEntry {
            name: "key data",
            decode: decode_key_data,
        },
    );
    registry.register_default(OPAQUE);
    registry
}

fn decode_timestamp(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx
        .tree
        .add_composite(ctx.parent, "timestamp", cursor.window());
    let mark = cursor.abs_pos();
    match cursor.read_u8() {
        Ok(kind) => {
            ctx.tree.add_scalar(
                node,
                "ts type",
                cursor.span_from(mark),
                ScalarValue::Unsigned(u64::from(kind)),
            );
        }
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    }
    let mark = cursor.abs_pos();
    match cursor.read_u64_be() {
        Ok(value) => {
            ctx.tree.add_scalar(
                node,
                "ts value",
                cursor.span_from(mark),
                ScalarValue::Unsigned(value),
            );
        }
        Err(err) => ctx.tree.attach(node, &err),
    }
    Ok(node)
}

fn decode_rand(cursor: ByteCursor<'_>, ctx: &mut DecodeContext<'_>) -> Result<NodeId, DecodeError> {
    Ok(ctx.tree.add_scalar(
        ctx.parent,
        "rand",
        cursor.window(),
        ScalarValue::bytes(cursor.remaining_bytes()),
    ))
}

fn decode_key_data(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx
        .tree
        .add_composite(ctx.parent, "key data", cursor.window());
    let mark = cursor.abs_pos();
    match cursor.read_u8() {
        Ok(kind) => {
            ctx.tree.add_scalar(
                node,
                "key type",
                cursor.span_from(mark),
                ScalarValue::Unsigned(u64::from(kind)),
            );
        }
        Err(err) => {
            ctx.tree.attach(node, &err);
            return Ok(node);
        }
    }
    // the key itself is opaque ciphertext, passed through undecoded
    ctx.tree.add_scalar(
        node,
        "key",
        cursor.abs_pos()..cursor.window().end,
        ScalarValue::bytes(cursor.remaining_bytes()),
    );
    Ok(node)
}
