use crate::tlv::{FieldDecode, ScalarKind, TlvFieldSpec};

// outer PDU tags
pub const PDU_CONNECT_REQUEST: u32 = 0x60;
pub const PDU_CONNECT_ACCEPT: u32 = 0x61;
pub const PDU_DATA_TRANSFER: u32 = 0x62;

// field tags
pub const TAG_PROTOCOL_VERSION: u32 = 0x80;
pub const TAG_RESULT: u32 = 0x80;
pub const TAG_CONTEXT_ID: u32 = 0x81;
pub const TAG_CALLING_ID: u32 = 0x82;
pub const TAG_APPLICATION_CONTEXT: u32 = 0x06;
pub const TAG_PAYLOAD: u32 = 0x04;

// payload protocols negotiable through the application context
pub const OID_DIAG_TEXT: &str = "1.3.6.1.4.1.28954.1";
pub const OID_COUNTER_STREAM: &str = "1.3.6.1.4.1.28954.2";

pub const CONNECT_REQUEST_FIELDS: &[TlvFieldSpec] = &[
    TlvFieldSpec::optional(
        "protocol version",
        TAG_PROTOCOL_VERSION,
        FieldDecode::Scalar(ScalarKind::Unsigned),
    ),
    TlvFieldSpec::required(
        "application context",
        TAG_APPLICATION_CONTEXT,
        FieldDecode::Scalar(ScalarKind::Oid),
    ),
    TlvFieldSpec::optional(
        "calling identifier",
        TAG_CALLING_ID,
        FieldDecode::Scalar(ScalarKind::Utf8),
    ),
];

pub const CONNECT_ACCEPT_FIELDS: &[TlvFieldSpec] = &[
    TlvFieldSpec::required(
        "result",
        TAG_RESULT,
        FieldDecode::Scalar(ScalarKind::Unsigned),
    ),
    TlvFieldSpec::required(
        "presentation context id",
        TAG_CONTEXT_ID,
        FieldDecode::Scalar(ScalarKind::Unsigned),
    ),
    TlvFieldSpec::required(
        "application context",
        TAG_APPLICATION_CONTEXT,
        FieldDecode::Scalar(ScalarKind::Oid),
    ),
];
