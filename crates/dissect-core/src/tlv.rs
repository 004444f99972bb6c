//! Schema-driven decoding of tag-length-value constructed values.
//!
//! One generic engine replaces the per-structure decode functions that
//! TLV-heavy protocols otherwise accumulate: a constructed value is
//! described by an ordered table of [`TlvFieldSpec`]s and decoded by
//! [`decode_constructed`], which matches records against the table,
//! skips absent optional fields without misaligning later ones, and
//! degrades to diagnostics instead of failing the enclosing tree.

use crate::cursor::ByteCursor;
use crate::error::{DecodeError, DiagnosticKind};
use crate::tree::{DecodedTree, NodeId, ScalarValue};

/// Tag pattern a field spec accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    Exact(u32),
    Any,
}

impl TagMatch {
    pub fn matches(&self, tag: u32) -> bool {
        match self {
            TagMatch::Exact(expected) => *expected == tag,
            TagMatch::Any => true,
        }
    }
}

/// How often a field may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Exactly one record.
    One,
    /// Zero or one record; an absent field is skipped, not an error.
    Optional,
    /// Zero or more records with the same tag, consumed until the tag
    /// stops matching.
    Many,
}

/// Primitive content interpretations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Big-endian unsigned integer, 1 to 8 content bytes.
    Unsigned,
    /// Single-byte boolean.
    Boolean,
    /// UTF-8 text (invalid sequences replaced).
    Utf8,
    /// Object identifier, rendered in dotted-decimal form.
    Oid,
    /// Opaque bytes.
    Bytes,
}

/// How a matched record's body is decoded.
#[derive(Debug, Clone, Copy)]
pub enum FieldDecode {
    Scalar(ScalarKind),
    /// Constructed value decoded against its own spec table.
    Nested(&'static [TlvFieldSpec]),
    Opaque,
}

/// One entry of a constructed value's schema, consumed in order.
#[derive(Debug, Clone, Copy)]
pub struct TlvFieldSpec {
    pub label: &'static str,
    pub tag: TagMatch,
    pub repeat: Repeat,
    pub decode: FieldDecode,
}

impl TlvFieldSpec {
    pub const fn required(label: &'static str, tag: u32, decode: FieldDecode) -> Self {
        Self {
            label,
            tag: TagMatch::Exact(tag),
            repeat: Repeat::One,
            decode,
        }
    }

    pub const fn optional(label: &'static str, tag: u32, decode: FieldDecode) -> Self {
        Self {
            label,
            tag: TagMatch::Exact(tag),
            repeat: Repeat::Optional,
            decode,
        }
    }

    pub const fn many(label: &'static str, tag: u32, decode: FieldDecode) -> Self {
        Self {
            label,
            tag: TagMatch::Exact(tag),
            repeat: Repeat::Many,
            decode,
        }
    }
}

/// Read one BER tag and definite length.
///
/// Single-byte tags only; the indefinite form and lengths wider than
/// four octets are malformed.
pub fn read_tlv_header(cursor: &mut ByteCursor<'_>) -> Result<(u32, usize), DecodeError> {
    let at = cursor.abs_pos();
    let tag = u32::from(cursor.read_u8()?);
    if tag & 0x1f == 0x1f {
        return Err(DecodeError::Malformed {
            at,
            reason: "high tag number form is not supported".to_string(),
        });
    }
    let first = cursor.read_u8()?;
    if first < 0x80 {
        return Ok((tag, usize::from(first)));
    }
    if first == 0x80 {
        return Err(DecodeError::Malformed {
            at: cursor.abs_pos() - 1,
            reason: "indefinite length".to_string(),
        });
    }
    let count = usize::from(first & 0x7f);
    if count > 4 {
        return Err(DecodeError::Malformed {
            at: cursor.abs_pos() - 1,
            reason: format!("length field of {} octets is too wide", count),
        });
    }
    let bytes = cursor.read_bytes(count)?;
    let mut len = 0usize;
    for byte in bytes {
        len = (len << 8) | usize::from(*byte);
    }
    Ok((tag, len))
}

/// Decode one constructed value against an ordered spec table,
/// appending field nodes under `parent`.
///
/// Best effort: a mismatch against a required spec attaches a
/// `SchemaViolation` and abandons the remaining records of this value
/// only; records left over once the table is exhausted become opaque
/// nodes with `UnsupportedField` diagnostics. The caller's tree is
/// always left valid.
pub fn decode_constructed(
    cursor: ByteCursor<'_>,
    specs: &[TlvFieldSpec],
    tree: &mut DecodedTree,
    parent: NodeId,
) {
    let mut cursor = cursor;
    let mut spec_idx = 0usize;

    'records: while !cursor.is_at_end() {
        let mark = cursor.abs_pos();
        let (tag, len) = match read_tlv_header(&mut cursor) {
            Ok(header) => header,
            Err(err) => {
                tree.attach(parent, &err);
                return;
            }
        };
        if len > cursor.remaining() {
            let at = cursor.abs_pos();
            if len > cursor.reported_remaining() {
                tree.attach(
                    parent,
                    &DecodeError::Malformed {
                        at,
                        reason: format!(
                            "declared length {} exceeds {} remaining bytes",
                            len,
                            cursor.reported_remaining()
                        ),
                    },
                );
            } else {
                tree.attach(
                    parent,
                    &DecodeError::Incomplete {
                        at,
                        needed: len,
                        actual: cursor.remaining(),
                    },
                );
            }
            return;
        }
        let body = match cursor.sub_range(0, len) {
            Ok(body) => body,
            Err(err) => {
                tree.attach(parent, &err);
                return;
            }
        };
        if let Err(err) = cursor.skip(len) {
            tree.attach(parent, &err);
            return;
        }
        let record_range = mark..cursor.abs_pos();

        let mut idx = spec_idx;
        loop {
            let Some(spec) = specs.get(idx) else {
                // record beyond the schema: report, keep walking
                let node = tree.add_scalar(
                    parent,
                    "unknown",
                    record_range.clone(),
                    ScalarValue::bytes(body.remaining_bytes()),
                );
                tree.attach(
                    node,
                    &DecodeError::UnsupportedField {
                        at: mark,
                        discriminant: tag,
                    },
                );
                continue 'records;
            };
            if spec.tag.matches(tag) {
                decode_field(spec, record_range, body, tree, parent);
                spec_idx = match spec.repeat {
                    Repeat::Many => idx,
                    Repeat::One | Repeat::Optional => idx + 1,
                };
                continue 'records;
            }
            match spec.repeat {
                Repeat::One => {
                    tree.attach(
                        parent,
                        &DecodeError::SchemaViolation {
                            at: mark,
                            expected: spec.label.to_string(),
                            found: tag,
                        },
                    );
                    return;
                }
                Repeat::Optional | Repeat::Many => idx += 1,
            }
        }
    }

    for spec in &specs[spec_idx..] {
        if spec.repeat == Repeat::One {
            tree.attach_diagnostic(
                parent,
                DiagnosticKind::SchemaViolation,
                cursor.abs_pos(),
                format!("missing required field {}", spec.label),
            );
            return;
        }
    }
}

fn decode_field(
    spec: &TlvFieldSpec,
    record_range: std::ops::Range<usize>,
    body: ByteCursor<'_>,
    tree: &mut DecodedTree,
    parent: NodeId,
) {
    match spec.decode {
        FieldDecode::Scalar(kind) => {
            let mut content = body;
            match decode_scalar(kind, &mut content) {
                Ok(value) => {
                    tree.add_scalar(parent, spec.label, record_range, value);
                }
                Err(err) => {
                    let node = tree.add_scalar(
                        parent,
                        spec.label,
                        record_range,
                        ScalarValue::bytes(body.remaining_bytes()),
                    );
                    tree.attach(node, &err);
                }
            }
        }
        FieldDecode::Nested(child_specs) => {
            let node = tree.add_composite(parent, spec.label, record_range);
            decode_constructed(body, child_specs, tree, node);
        }
        FieldDecode::Opaque => {
            tree.add_scalar(
                parent,
                spec.label,
                record_range,
                ScalarValue::bytes(body.remaining_bytes()),
            );
        }
    }
}

pub(crate) fn decode_scalar(
    kind: ScalarKind,
    body: &mut ByteCursor<'_>,
) -> Result<ScalarValue, DecodeError> {
    let at = body.abs_pos();
    let n = body.remaining();
    match kind {
        ScalarKind::Unsigned => Ok(ScalarValue::Unsigned(unsigned_content(body)?)),
        ScalarKind::Boolean => {
            if n != 1 {
                return Err(DecodeError::Malformed {
                    at,
                    reason: format!("boolean of {} bytes", n),
                });
            }
            Ok(ScalarValue::Bool(body.read_u8()? != 0))
        }
        ScalarKind::Utf8 => {
            let bytes = body.read_bytes(n)?;
            Ok(ScalarValue::Text(String::from_utf8_lossy(bytes).to_string()))
        }
        ScalarKind::Oid => {
            let bytes = body.read_bytes(n)?;
            match oid_to_string(bytes) {
                Some(oid) => Ok(ScalarValue::Oid(oid)),
                None => Err(DecodeError::Malformed {
                    at,
                    reason: "invalid object identifier encoding".to_string(),
                }),
            }
        }
        ScalarKind::Bytes => {
            let bytes = body.read_bytes(n)?;
            Ok(ScalarValue::bytes(bytes))
        }
    }
}

/// Whole-content big-endian unsigned integer, 1 to 8 bytes.
pub(crate) fn unsigned_content(body: &mut ByteCursor<'_>) -> Result<u64, DecodeError> {
    let at = body.abs_pos();
    let n = body.remaining();
    if n == 0 || n > 8 {
        return Err(DecodeError::Malformed {
            at,
            reason: format!("unsigned integer of {} bytes", n),
        });
    }
    let bytes = body.read_bytes(n)?;
    let mut value = 0u64;
    for byte in bytes {
        value = (value << 8) | u64::from(*byte);
    }
    Ok(value)
}

/// Dotted-decimal rendering of an encoded object identifier.
///
/// Returns `None` for an empty value, an unterminated subidentifier,
/// or an arc that overflows 64 bits.
pub fn oid_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mut subids: Vec<u64> = Vec::new();
    let mut value = 0u64;
    let mut in_progress = false;
    for &byte in bytes {
        if value > (u64::MAX >> 7) {
            return None;
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        in_progress = byte & 0x80 != 0;
        if !in_progress {
            subids.push(value);
            value = 0;
        }
    }
    if in_progress {
        return None;
    }

    let first = subids[0];
    let mut arcs = Vec::with_capacity(subids.len() + 1);
    if first < 40 {
        arcs.push(0);
        arcs.push(first);
    } else if first < 80 {
        arcs.push(1);
        arcs.push(first - 40);
    } else {
        arcs.push(2);
        arcs.push(first - 80);
    }
    arcs.extend_from_slice(&subids[1..]);
    Some(
        arcs.iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("."),
    )
}

#[cfg(test)]
mod tests {
    use super::{
        FieldDecode, ScalarKind, TlvFieldSpec, decode_constructed, oid_to_string, read_tlv_header,
    };
    use crate::cursor::ByteCursor;
    use crate::error::DiagnosticKind;
    use crate::tree::{DecodedTree, ScalarValue};

    const TAG_A: u32 = 0x80;
    const TAG_B: u32 = 0x81;
    const TAG_C: u32 = 0x82;

    fn abc_specs() -> &'static [TlvFieldSpec] {
        const SPECS: &[TlvFieldSpec] = &[
            TlvFieldSpec::required("alpha", TAG_A, FieldDecode::Scalar(ScalarKind::Unsigned)),
            TlvFieldSpec::optional("beta", TAG_B, FieldDecode::Scalar(ScalarKind::Unsigned)),
            TlvFieldSpec::required("gamma", TAG_C, FieldDecode::Scalar(ScalarKind::Unsigned)),
        ];
        SPECS
    }

    fn decode(buf: &[u8], specs: &[TlvFieldSpec]) -> DecodedTree {
        let mut tree = DecodedTree::new("value", 0..buf.len());
        let root = tree.root();
        decode_constructed(ByteCursor::new(buf), specs, &mut tree, root);
        tree
    }

    #[test]
    fn short_form_header() {
        let mut cursor = ByteCursor::new(&[0x30, 0x03, 0xaa, 0xbb, 0xcc]);
        assert_eq!(read_tlv_header(&mut cursor).unwrap(), (0x30, 3));
    }

    #[test]
    fn long_form_header() {
        let mut cursor = ByteCursor::new(&[0x04, 0x82, 0x01, 0x00]);
        assert_eq!(read_tlv_header(&mut cursor).unwrap(), (0x04, 256));
    }

    #[test]
    fn indefinite_length_is_malformed() {
        let mut cursor = ByteCursor::new(&[0x30, 0x80, 0x00, 0x00]);
        let err = read_tlv_header(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("indefinite"));
    }

    #[test]
    fn oversized_length_field_is_malformed() {
        let mut cursor = ByteCursor::new(&[0x04, 0x85, 0x01, 0x01, 0x01, 0x01, 0x01]);
        assert!(read_tlv_header(&mut cursor).is_err());
    }

    #[test]
    fn all_fields_present() {
        let buf = [TAG_A as u8, 1, 7, TAG_B as u8, 1, 8, TAG_C as u8, 1, 9];
        let tree = decode(&buf, abc_specs());
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 3);
        assert!(!tree.has_diagnostics());
        let beta = tree.find(root, "beta").unwrap();
        assert_eq!(tree.value(beta), Some(&ScalarValue::Unsigned(8)));
    }

    #[test]
    fn absent_optional_field_does_not_misalign() {
        let buf = [TAG_A as u8, 1, 7, TAG_C as u8, 1, 9];
        let tree = decode(&buf, abc_specs());
        let root = tree.root();
        assert!(!tree.has_diagnostics());
        assert!(tree.find(root, "beta").is_none());
        let gamma = tree.find(root, "gamma").unwrap();
        assert_eq!(tree.value(gamma), Some(&ScalarValue::Unsigned(9)));
    }

    #[test]
    fn required_mismatch_abandons_this_value_only() {
        // gamma's slot holds an unexpected tag
        let buf = [TAG_A as u8, 1, 7, 0x8f, 1, 9];
        let tree = decode(&buf, abc_specs());
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 1);
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::SchemaViolation);
        assert!(diag.message.contains("gamma"));
    }

    #[test]
    fn missing_required_field_is_reported() {
        let buf = [TAG_A as u8, 1, 7];
        let tree = decode(&buf, abc_specs());
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::SchemaViolation);
        assert!(diag.message.contains("missing required field gamma"));
    }

    #[test]
    fn many_consumes_repeats_until_tag_changes() {
        const SPECS: &[TlvFieldSpec] = &[
            TlvFieldSpec::many("item", TAG_A, FieldDecode::Scalar(ScalarKind::Unsigned)),
            TlvFieldSpec::required("tail", TAG_C, FieldDecode::Scalar(ScalarKind::Unsigned)),
        ];
        let buf = [
            TAG_A as u8, 1, 1, TAG_A as u8, 1, 2, TAG_A as u8, 1, 3, TAG_C as u8, 1, 9,
        ];
        let tree = decode(&buf, SPECS);
        let root = tree.root();
        assert!(!tree.has_diagnostics());
        assert_eq!(tree.children(root).len(), 4);
        assert_eq!(tree.label(tree.children(root)[2]), "item");
        assert_eq!(tree.label(tree.children(root)[3]), "tail");
    }

    #[test]
    fn leftover_records_become_unknown_nodes() {
        const SPECS: &[TlvFieldSpec] = &[TlvFieldSpec::required(
            "alpha",
            TAG_A,
            FieldDecode::Scalar(ScalarKind::Unsigned),
        )];
        let buf = [TAG_A as u8, 1, 7, 0x44, 2, 0xde, 0xad];
        let tree = decode(&buf, SPECS);
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 2);
        let unknown = tree.find(root, "unknown").unwrap();
        assert_eq!(
            tree.value(unknown),
            Some(&ScalarValue::Bytes("dead".to_string()))
        );
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::UnsupportedField);
    }

    #[test]
    fn nested_specs_recurse() {
        const INNER: &[TlvFieldSpec] = &[TlvFieldSpec::required(
            "name",
            0x0c,
            FieldDecode::Scalar(ScalarKind::Utf8),
        )];
        const OUTER: &[TlvFieldSpec] = &[TlvFieldSpec::required(
            "entry",
            0x30,
            FieldDecode::Nested(INNER),
        )];
        let buf = [0x30, 4, 0x0c, 2, b'h', b'i'];
        let tree = decode(&buf, OUTER);
        let root = tree.root();
        let entry = tree.find(root, "entry").unwrap();
        let name = tree.find(entry, "name").unwrap();
        assert_eq!(tree.value(name), Some(&ScalarValue::Text("hi".to_string())));
        assert_eq!(tree.range(name), 2..6);
    }

    #[test]
    fn nested_violation_degrades_only_the_inner_node() {
        const INNER: &[TlvFieldSpec] = &[TlvFieldSpec::required(
            "name",
            0x0c,
            FieldDecode::Scalar(ScalarKind::Utf8),
        )];
        const OUTER: &[TlvFieldSpec] = &[
            TlvFieldSpec::required("entry", 0x30, FieldDecode::Nested(INNER)),
            TlvFieldSpec::required("serial", TAG_A, FieldDecode::Scalar(ScalarKind::Unsigned)),
        ];
        // inner record carries the wrong tag; the outer serial still decodes
        let buf = [0x30, 3, 0x04, 1, 0xff, TAG_A as u8, 1, 5];
        let tree = decode(&buf, OUTER);
        let root = tree.root();
        let serial = tree.find(root, "serial").unwrap();
        assert_eq!(tree.value(serial), Some(&ScalarValue::Unsigned(5)));
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::SchemaViolation);
    }

    #[test]
    fn declared_length_past_buffer_is_malformed() {
        let buf = [TAG_A as u8, 0x20, 1];
        let tree = decode(&buf, abc_specs());
        let diag = tree.diagnostics().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Malformed);
    }

    #[test]
    fn decodes_known_oid() {
        // 1.2.840.113549
        assert_eq!(
            oid_to_string(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d]).as_deref(),
            Some("1.2.840.113549")
        );
    }

    #[test]
    fn rejects_unterminated_oid() {
        assert_eq!(oid_to_string(&[0x2a, 0x86]), None);
        assert_eq!(oid_to_string(&[]), None);
    }
}
