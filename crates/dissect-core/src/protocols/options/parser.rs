use super::layout;
use crate::cursor::ByteCursor;
use crate::dispatch::{DecodeContext, DecoderEntry, DispatchRegistry, OPAQUE, delegate};
use crate::error::DecodeError;
use crate::tree::{DecodedTree, NodeId, ScalarValue};
use crate::walk::{Discriminant, HeaderFormat, LengthEncoding, RecordWalker, WalkEnd, WalkStep};

/// Decode a neighbor-discovery style option list: type, length in
/// 8-byte blocks covering the whole option, body. An empty list is
/// valid; a zero length ends the walk as malformed.
pub fn dissect(cursor: ByteCursor<'_>, registry: &DispatchRegistry) -> DecodedTree {
    let mut tree = DecodedTree::new("options", cursor.window());
    let root = tree.root();
    let mut ctx = DecodeContext {
        tree: &mut tree,
        parent: root,
        registry,
        contexts: None,
    };

    let mut walker = RecordWalker::new(
        cursor,
        HeaderFormat {
            discriminant: Discriminant::Leading {
                width: 1,
                big_endian: true,
            },
            length: LengthEncoding::FixedUnits {
                width: 1,
                big_endian: true,
                unit: layout::OPTION_UNIT,
                includes_header: true,
            },
            sentinel: None,
        },
    );

    loop {
        match walker.next_record() {
            WalkStep::Record(record) => {
                let record_range = record.header.start..record.body.window().end;
                let option_node = ctx.tree.add_composite(root, "option", record_range.clone());
                ctx.tree.add_scalar(
                    option_node,
                    "type",
                    record.header.start..record.header.start + 1,
                    ScalarValue::Unsigned(u64::from(record.discriminant)),
                );
                let units = (record_range.end - record_range.start) / layout::OPTION_UNIT;
                ctx.tree.add_scalar(
                    option_node,
                    "length",
                    record.header.start + 1..record.header.end,
                    ScalarValue::Unsigned(units as u64),
                );
                delegate(&mut ctx, option_node, record.body, record.discriminant);
            }
            WalkStep::Done(WalkEnd::Exhausted) | WalkStep::Done(WalkEnd::Sentinel(_)) => break,
            WalkStep::Done(WalkEnd::Failed(err)) => {
                ctx.tree.attach(root, &err);
                let remainder = walker.remainder();
                if remainder.remaining() > 0 {
                    ctx.tree.add_scalar(
                        root,
                        "unparsed data",
                        remainder.window(),
                        ScalarValue::bytes(remainder.remaining_bytes()),
                    );
                }
                break;
            }
        }
    }
    tree
}

/// Option decoders wired in by the bootstrap layer.
pub fn default_registry() -> DispatchRegistry {
    let mut registry = DispatchRegistry::new();
    registry.register(
        layout::OPT_SOURCE_LINK_ADDR,
        DecoderEntry {
            name: "source link address",
            decode: decode_link_addr,
        },
    );
    registry.register(
        layout::OPT_PREFIX_INFO,
        DecoderEntry {
            name: "prefix information",
            decode: decode_prefix_info,
        },
    );
    registry.register(
        layout::OPT_MTU,
        DecoderEntry {
            name: "mtu",
            decode: decode_mtu,
        },
    );
    registry.register_default(OPAQUE);
    registry
}

fn decode_link_addr(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let mark = cursor.abs_pos();
    let octets = cursor.read_bytes(layout::LINK_ADDR_LEN)?;
    let formatted = octets
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":");
    Ok(ctx.tree.add_scalar(
        ctx.parent,
        "link address",
        cursor.span_from(mark),
        ScalarValue::Text(formatted),
    ))
}

fn decode_prefix_info(
    cursor: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx
        .tree
        .add_composite(ctx.parent, "prefix information", cursor.window());

    let result = (|| -> Result<(), DecodeError> {
        let mark = cursor.abs_pos();
        let prefix_len = cursor.read_u8()?;
        ctx.tree.add_scalar(
            node,
            "prefix length",
            cursor.span_from(mark),
            ScalarValue::Unsigned(u64::from(prefix_len)),
        );

        let mark = cursor.abs_pos();
        let flags = cursor.read_u8()?;
        ctx.tree.add_scalar(
            node,
            "flags",
            cursor.span_from(mark),
            ScalarValue::Unsigned(u64::from(flags)),
        );

        let mark = cursor.abs_pos();
        let valid = cursor.read_u32_be()?;
        ctx.tree.add_scalar(
            node,
            "valid lifetime",
            cursor.span_from(mark),
            ScalarValue::Unsigned(u64::from(valid)),
        );

        let mark = cursor.abs_pos();
        let preferred = cursor.read_u32_be()?;
        ctx.tree.add_scalar(
            node,
            "preferred lifetime",
            cursor.span_from(mark),
            ScalarValue::Unsigned(u64::from(preferred)),
        );

        cursor.skip(4)?; // reserved

        let mark = cursor.abs_pos();
        let prefix = cursor.read_bytes(layout::PREFIX_LEN)?;
        ctx.tree.add_scalar(
            node,
            "prefix",
            cursor.span_from(mark),
            ScalarValue::bytes(prefix),
        );
        Ok(())
    })();
    if let Err(err) = result {
        ctx.tree.attach(node, &err);
    }
    Ok(node)
}

fn decode_mtu(cursor: ByteCursor<'_>, ctx: &mut DecodeContext<'_>) -> Result<NodeId, DecodeError> {
    let mut cursor = cursor;
    let node = ctx.tree.add_composite(ctx.parent, "mtu", cursor.window());
    let result = (|| -> Result<(), DecodeError> {
        cursor.skip(2)?; // reserved
        let mark = cursor.abs_pos();
        let mtu = cursor.read_u32_be()?;
        ctx.tree.add_scalar(
            node,
            "mtu",
            cursor.span_from(mark),
            ScalarValue::Unsigned(u64::from(mtu)),
        );
        Ok(())
    })();
    if let Err(err) = result {
        ctx.tree.attach(node, &err);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::{default_registry, dissect};
    use crate::cursor::ByteCursor;
    use crate::error::DiagnosticKind;
    use crate::protocols::options::layout;
    use crate::tree::ScalarValue;

    fn link_addr_option() -> Vec<u8> {
        vec![
            layout::OPT_SOURCE_LINK_ADDR as u8,
            0x01,
            0x02,
            0x04,
            0x06,
            0x08,
            0x0a,
            0x0c,
        ]
    }

    fn mtu_option(mtu: u32) -> Vec<u8> {
        let mut buf = vec![layout::OPT_MTU as u8, 0x01, 0x00, 0x00];
        buf.extend_from_slice(&mtu.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_known_options() {
        let mut buf = link_addr_option();
        buf.extend_from_slice(&mtu_option(1500));

        let tree = dissect(ByteCursor::new(&buf), &default_registry());
        assert!(!tree.has_diagnostics());

        let root = tree.root();
        let children = tree.children(root);
        assert_eq!(children.len(), 2);

        let addr = tree.find(children[0], "link address").unwrap();
        assert_eq!(
            tree.value(addr),
            Some(&ScalarValue::Text("02:04:06:08:0a:0c".to_string()))
        );

        let mtu_node = tree.find(children[1], "mtu").unwrap();
        let mtu_value = tree.find(mtu_node, "mtu").unwrap();
        assert_eq!(tree.value(mtu_value), Some(&ScalarValue::Unsigned(1500)));
    }

    #[test]
    fn empty_option_list_is_valid() {
        let tree = dissect(ByteCursor::new(&[]), &default_registry());
        assert!(!tree.has_diagnostics());
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn zero_length_option_is_malformed() {
        let mut buf = link_addr_option();
        buf.extend_from_slice(&[layout::OPT_MTU as u8, 0x00, 0xaa, 0xbb]);

        let tree = dissect(ByteCursor::new(&buf), &default_registry());
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Malformed);
        // the first option survives; the malformed tail is preserved raw
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 2);
        let unparsed = tree.find(root, "unparsed data").unwrap();
        assert_eq!(tree.range(unparsed), 10..12);
    }

    #[test]
    fn unknown_option_type_is_reported_and_kept() {
        let buf = [0x7f, 0x01, 0, 0, 0, 0, 0, 0];
        let tree = dissect(ByteCursor::new(&buf), &default_registry());
        let option = tree.children(tree.root())[0];
        assert!(tree.find(option, "data").is_some());
        assert!(
            tree.diagnostics()
                .any(|d| d.kind == DiagnosticKind::UnsupportedField)
        );
    }

    #[test]
    fn option_longer_than_buffer_is_malformed() {
        let buf = [layout::OPT_MTU as u8, 0x04, 0x00, 0x00];
        let tree = dissect(ByteCursor::new(&buf), &default_registry());
        assert!(
            tree.diagnostics()
                .any(|d| d.kind == DiagnosticKind::Malformed)
        );
    }

    #[test]
    fn prefix_option_decodes_lifetimes() {
        let mut buf = vec![layout::OPT_PREFIX_INFO as u8, 0x04, 64, 0xc0];
        buf.extend_from_slice(&3600u32.to_be_bytes());
        buf.extend_from_slice(&1800u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(buf.len(), 32);

        let tree = dissect(ByteCursor::new(&buf), &default_registry());
        assert!(!tree.has_diagnostics());
        let option = tree.children(tree.root())[0];
        let info = tree.find(option, "prefix information").unwrap();
        let valid = tree.find(info, "valid lifetime").unwrap();
        assert_eq!(tree.value(valid), Some(&ScalarValue::Unsigned(3600)));
    }
}
