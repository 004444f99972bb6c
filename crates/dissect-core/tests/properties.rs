use dissect_core::cursor::ByteCursor;
use dissect_core::error::DiagnosticKind;
use dissect_core::protocols::{assoc, chain, options};
use dissect_core::tlv::{FieldDecode, ScalarKind, TlvFieldSpec, decode_constructed};
use dissect_core::tree::{DecodedTree, ExportNode, ScalarValue};
use dissect_core::{ContextTable, DispatchRegistry};

fn assert_ranges_within(node: &ExportNode, parent_start: usize, parent_end: usize) {
    let end = node.start + node.len;
    assert!(
        node.start >= parent_start && end <= parent_end,
        "node '{}' range {}..{} escapes {}..{}",
        node.label,
        node.start,
        end,
        parent_start,
        parent_end
    );
    for child in &node.children {
        assert_ranges_within(child, node.start, end);
    }
}

fn assert_tree_bounded(tree: &DecodedTree, buf_len: usize) {
    let export = tree.export();
    assert_ranges_within(&export.root, 0, buf_len);
}

#[test]
fn context_table_round_trip() {
    let mut contexts = ContextTable::new();
    contexts.register(5, "1.2.3");
    assert_eq!(contexts.lookup(5), Some("1.2.3"));
    contexts.register(5, "9.9.9");
    assert_eq!(contexts.lookup(5), Some("9.9.9"));
    assert_eq!(contexts.lookup(6), None);
}

#[test]
fn optional_field_skipping_does_not_misalign() {
    const TAG_A: u32 = 0x80;
    const TAG_B: u32 = 0x81;
    const TAG_C: u32 = 0x82;
    const SPECS: &[TlvFieldSpec] = &[
        TlvFieldSpec::required("a", TAG_A, FieldDecode::Scalar(ScalarKind::Unsigned)),
        TlvFieldSpec::optional("b", TAG_B, FieldDecode::Scalar(ScalarKind::Unsigned)),
        TlvFieldSpec::required("c", TAG_C, FieldDecode::Scalar(ScalarKind::Unsigned)),
    ];

    let buf = [TAG_A as u8, 1, 1, TAG_C as u8, 1, 3];
    let mut tree = DecodedTree::new("value", 0..buf.len());
    let root = tree.root();
    decode_constructed(ByteCursor::new(&buf), SPECS, &mut tree, root);

    assert!(!tree.has_diagnostics());
    assert!(tree.find(root, "b").is_none());
    let c = tree.find(root, "c").unwrap();
    assert_eq!(tree.value(c), Some(&ScalarValue::Unsigned(3)));
}

#[test]
fn partial_tree_survives_a_malformed_second_record() {
    // first option is valid; the second declares more blocks than exist
    let mut buf = vec![1u8, 1, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    buf.extend_from_slice(&[5u8, 0x40, 0, 0]);

    let registry = options::default_registry();
    let tree = options::dissect(ByteCursor::new(&buf), &registry);

    let root = tree.root();
    let first = tree.children(root)[0];
    assert_eq!(tree.label(first), "option");
    assert!(tree.find(first, "link address").is_some());
    assert!(
        tree.diagnostics()
            .any(|d| d.kind == DiagnosticKind::Malformed)
    );
    assert_tree_bounded(&tree, buf.len());
}

#[test]
fn chain_scenario_one_node_per_payload_in_wire_order() {
    // 12-byte message: header, then a single payload closing the chain
    let buf = [
        0x01, 0x0b, 0x11, 0x22, 0x33, 0x44, 0x00, 0x00, 0x06, 0xde, 0xad, 0xbe,
    ];
    let registry = chain::default_registry();
    let tree = chain::dissect(ByteCursor::new(&buf), &registry);
    assert!(!tree.has_diagnostics());

    let payloads = tree.find(tree.root(), "payloads").unwrap();
    let children = tree.children(payloads);
    assert_eq!(children.len(), 1);
    assert!(tree.find(children[0], "rand").is_some());
    assert_tree_bounded(&tree, buf.len());
}

#[test]
fn truncated_captures_degrade_to_incomplete() {
    // wire said 20 bytes, the capture holds 8: mid-payload cut
    let buf = [0x01, 0x0b, 0x11, 0x22, 0x33, 0x44, 0x00, 0x00];
    let registry = chain::default_registry();
    let tree = chain::dissect(ByteCursor::with_reported_len(&buf, 20), &registry);
    assert!(
        tree.diagnostics()
            .any(|d| d.kind == DiagnosticKind::Incomplete)
    );
    assert_tree_bounded(&tree, buf.len());
}

#[test]
fn every_protocol_survives_truncation_at_every_offset() {
    let chain_buf = [
        0x01, 0x0b, 0x11, 0x22, 0x33, 0x44, 0x05, 0x00, 0x07, 0xaa, 0xbb, 0xcc, 0xdd, 0x00, 0x00,
        0x0c, 0x01, 0, 0, 0, 0, 0, 0, 0, 42,
    ];
    let options_buf = [
        1u8, 1, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 5, 1, 0, 0, 0, 0, 5, 0xdc,
    ];

    let chain_registry = chain::default_registry();
    let options_registry = options::default_registry();
    for cut in 0..chain_buf.len() {
        let tree = chain::dissect(ByteCursor::new(&chain_buf[..cut]), &chain_registry);
        assert_tree_bounded(&tree, cut);
    }
    for cut in 0..options_buf.len() {
        let tree = options::dissect(ByteCursor::new(&options_buf[..cut]), &options_registry);
        assert_tree_bounded(&tree, cut);
    }
}

#[test]
fn sessions_do_not_share_context_state() {
    let accept = assoc_accept_pdu(5);
    let data = assoc_data_pdu(5, b"hot");
    let registry = assoc::default_registry();

    let mut first_session = ContextTable::new();
    let tree = assoc::dissect(ByteCursor::new(&accept), &registry, &mut first_session);
    assert!(!tree.has_diagnostics());

    // a different conversation reusing id 5 must not see the binding
    let mut second_session = ContextTable::new();
    let tree = assoc::dissect(ByteCursor::new(&data), &registry, &mut second_session);
    assert!(
        tree.diagnostics()
            .any(|d| d.kind == DiagnosticKind::ContextMiss)
    );

    // while the negotiating session decodes the same PDU fine
    let tree = assoc::dissect(ByteCursor::new(&data), &registry, &mut first_session);
    assert!(!tree.has_diagnostics());
}

#[test]
fn dispatch_default_applies_without_aborting() {
    let registry = DispatchRegistry::new();
    let entry = registry.resolve(0xdead);
    assert_eq!(entry.name, "data");
}

fn assoc_accept_pdu(context_id: u8) -> Vec<u8> {
    // result 0, context id, application context 1.3.6.1.4.1.28954.1
    let oid = [0x2b, 0x06, 0x01, 0x04, 0x01, 0x81, 0xe2, 0x1a, 0x01];
    let mut body = vec![0x80, 1, 0, 0x81, 1, context_id, 0x06, oid.len() as u8];
    body.extend_from_slice(&oid);
    let mut pdu = vec![0x61, body.len() as u8];
    pdu.extend_from_slice(&body);
    pdu
}

fn assoc_data_pdu(context_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0x81, 1, context_id, 0x04, payload.len() as u8];
    body.extend_from_slice(payload);
    let mut pdu = vec![0x62, body.len() as u8];
    pdu.extend_from_slice(&body);
    pdu
}
