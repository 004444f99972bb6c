/// Option lengths count 8-byte blocks, header included.
pub const OPTION_UNIT: usize = 8;

pub const OPT_SOURCE_LINK_ADDR: u32 = 1;
pub const OPT_PREFIX_INFO: u32 = 3;
pub const OPT_MTU: u32 = 5;

pub const LINK_ADDR_LEN: usize = 6;
pub const PREFIX_LEN: usize = 16;
