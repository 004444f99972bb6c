pub const MSG_TYPE_OFFSET: usize = 0;
pub const NEXT_PAYLOAD_OFFSET: usize = 1;
pub const SESSION_ID_RANGE: std::ops::Range<usize> = 2..6;
pub const HEADER_LEN: usize = 6;

/// "No further payloads" terminator.
pub const LAST_PAYLOAD: u32 = 0x00;

pub const PAYLOAD_TIMESTAMP: u32 = 0x05;
pub const PAYLOAD_RAND: u32 = 0x0b;
pub const PAYLOAD_KEY_DATA: u32 = 0x14;
