use std::ops::Range;

use crate::cursor::ByteCursor;
use crate::error::DecodeError;

/// Where a record's discriminant comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminant {
    /// The record leads with its own discriminant. `width` is 1, 2, or
    /// 4 bytes.
    Leading { width: u8, big_endian: bool },
    /// Each record's first byte names the *next* record's discriminant;
    /// the first record's is supplied out of band ("next payload"
    /// chains).
    Chained { initial: u32 },
}

/// How a record declares its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// Explicit byte count. With `includes_header` the count covers the
    /// record header as well as the body.
    ExplicitBytes {
        width: u8,
        big_endian: bool,
        includes_header: bool,
    },
    /// Explicit count of fixed-size units (e.g. option lengths counted
    /// in 8-byte blocks).
    FixedUnits {
        width: u8,
        big_endian: bool,
        unit: usize,
        includes_header: bool,
    },
    /// No length field: the body runs to the end of the buffer.
    RestOfBuffer,
}

/// Record header layout driving a [`RecordWalker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFormat {
    pub discriminant: Discriminant,
    pub length: LengthEncoding,
    /// Terminal discriminant ending the walk ("no further records").
    pub sentinel: Option<u32>,
}

/// One successfully bounded record.
#[derive(Debug)]
pub struct Record<'a> {
    pub discriminant: u32,
    /// Declared body length; `None` for rest-of-buffer records.
    pub declared_len: Option<usize>,
    /// Absolute range of the record header.
    pub header: Range<usize>,
    /// Sub-cursor scoped to the record body.
    pub body: ByteCursor<'a>,
}

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEnd {
    /// Every byte was consumed.
    Exhausted,
    /// The terminal discriminant was observed.
    Sentinel(u32),
    /// The walk stopped early; the error says why. The caller decides
    /// whether to still emit a raw node for the remainder.
    Failed(DecodeError),
}

/// One step of a walk.
#[derive(Debug)]
pub enum WalkStep<'a> {
    Record(Record<'a>),
    Done(WalkEnd),
}

/// Forward-only loop over a sequence of self-describing records.
///
/// Every yielded record advances the position by at least one byte, so
/// a walk over a buffer of length N performs at most N iterations no
/// matter what the length fields claim; a length that cannot be
/// satisfied ends the walk with a [`WalkEnd::Failed`] event instead of
/// being dispatched.
///
/// # Examples
/// ```
/// use dissect_core::cursor::ByteCursor;
/// use dissect_core::walk::{
///     Discriminant, HeaderFormat, LengthEncoding, RecordWalker, WalkStep,
/// };
///
/// // [tag, len, body...] records: tag 1 with 2 body bytes, tag 2 empty.
/// let buf = [0x01, 0x02, 0xaa, 0xbb, 0x02, 0x00];
/// let format = HeaderFormat {
///     discriminant: Discriminant::Leading { width: 1, big_endian: true },
///     length: LengthEncoding::ExplicitBytes {
///         width: 1,
///         big_endian: true,
///         includes_header: false,
///     },
///     sentinel: None,
/// };
/// let mut walker = RecordWalker::new(ByteCursor::new(&buf), format);
/// let mut tags = Vec::new();
/// while let WalkStep::Record(record) = walker.next_record() {
///     tags.push(record.discriminant);
/// }
/// assert_eq!(tags, [1, 2]);
/// ```
#[derive(Debug)]
pub struct RecordWalker<'a> {
    cursor: ByteCursor<'a>,
    format: HeaderFormat,
    pending: u32,
    end: Option<WalkEnd>,
}

impl<'a> RecordWalker<'a> {
    pub fn new(cursor: ByteCursor<'a>, format: HeaderFormat) -> Self {
        let pending = match format.discriminant {
            Discriminant::Chained { initial } => initial,
            Discriminant::Leading { .. } => 0,
        };
        Self {
            cursor,
            format,
            pending,
            end: None,
        }
    }

    /// Discriminant the chain promises next; `None` for leading
    /// formats.
    pub fn pending_discriminant(&self) -> Option<u32> {
        match self.format.discriminant {
            Discriminant::Chained { .. } => Some(self.pending),
            Discriminant::Leading { .. } => None,
        }
    }

    /// Unconsumed tail of the buffer.
    pub fn remainder(&self) -> ByteCursor<'a> {
        self.cursor.rest()
    }

    pub fn next_record(&mut self) -> WalkStep<'a> {
        if let Some(end) = &self.end {
            return WalkStep::Done(end.clone());
        }

        // A chained terminator is carried by the previous record's
        // header, so it ends the walk even at the end of the buffer.
        if let Discriminant::Chained { .. } = self.format.discriminant {
            if self.format.sentinel == Some(self.pending) {
                return self.finish(WalkEnd::Sentinel(self.pending));
            }
        }

        if self.cursor.remaining() == 0 {
            let at = self.cursor.abs_pos();
            if self.cursor.reported_remaining() > 0 {
                return self.finish(WalkEnd::Failed(DecodeError::Incomplete {
                    at,
                    needed: 1,
                    actual: 0,
                }));
            }
            if let Discriminant::Chained { .. } = self.format.discriminant {
                // the chain promised another record
                return self.finish(WalkEnd::Failed(DecodeError::Truncated {
                    at,
                    needed: 1,
                    actual: 0,
                }));
            }
            return self.finish(WalkEnd::Exhausted);
        }

        let header_mark = self.cursor.abs_pos();

        let discriminant = match self.format.discriminant {
            Discriminant::Leading { width, big_endian } => {
                match read_uint(&mut self.cursor, width, big_endian) {
                    Ok(value) => value,
                    Err(err) => return self.finish(WalkEnd::Failed(err)),
                }
            }
            Discriminant::Chained { .. } => self.pending,
        };

        match self.format.discriminant {
            Discriminant::Leading { .. } => {
                if self.format.sentinel == Some(discriminant) {
                    return self.finish(WalkEnd::Sentinel(discriminant));
                }
            }
            Discriminant::Chained { .. } => match self.cursor.read_u8() {
                Ok(next) => self.pending = u32::from(next),
                Err(err) => return self.finish(WalkEnd::Failed(err)),
            },
        }

        let (declared_len, body_len) = match self.format.length {
            LengthEncoding::ExplicitBytes {
                width,
                big_endian,
                includes_header,
            } => {
                let raw = match read_uint(&mut self.cursor, width, big_endian) {
                    Ok(value) => value as usize,
                    Err(err) => return self.finish(WalkEnd::Failed(err)),
                };
                match body_len_of(raw, includes_header, self.cursor.abs_pos() - header_mark) {
                    Ok(body_len) => (Some(body_len), body_len),
                    Err(reason) => {
                        return self.finish(WalkEnd::Failed(DecodeError::Malformed {
                            at: header_mark,
                            reason,
                        }));
                    }
                }
            }
            LengthEncoding::FixedUnits {
                width,
                big_endian,
                unit,
                includes_header,
            } => {
                let raw = match read_uint(&mut self.cursor, width, big_endian) {
                    Ok(value) => value as usize,
                    Err(err) => return self.finish(WalkEnd::Failed(err)),
                };
                let total = match raw.checked_mul(unit) {
                    Some(total) => total,
                    None => {
                        return self.finish(WalkEnd::Failed(DecodeError::Malformed {
                            at: header_mark,
                            reason: format!("length of {} units of {} bytes overflows", raw, unit),
                        }));
                    }
                };
                match body_len_of(total, includes_header, self.cursor.abs_pos() - header_mark) {
                    Ok(body_len) => (Some(body_len), body_len),
                    Err(reason) => {
                        return self.finish(WalkEnd::Failed(DecodeError::Malformed {
                            at: header_mark,
                            reason,
                        }));
                    }
                }
            }
            LengthEncoding::RestOfBuffer => (None, self.cursor.remaining()),
        };

        let at = self.cursor.abs_pos();
        if body_len > self.cursor.reported_remaining() {
            return self.finish(WalkEnd::Failed(DecodeError::Malformed {
                at,
                reason: format!(
                    "declared length {} exceeds {} remaining bytes",
                    body_len,
                    self.cursor.reported_remaining()
                ),
            }));
        }
        if body_len > self.cursor.remaining() {
            return self.finish(WalkEnd::Failed(DecodeError::Incomplete {
                at,
                needed: body_len,
                actual: self.cursor.remaining(),
            }));
        }

        let body = match self.cursor.sub_range(0, body_len) {
            Ok(body) => body,
            Err(err) => return self.finish(WalkEnd::Failed(err)),
        };
        if let Err(err) = self.cursor.skip(body_len) {
            return self.finish(WalkEnd::Failed(err));
        }

        WalkStep::Record(Record {
            discriminant,
            declared_len,
            header: header_mark..at,
            body,
        })
    }

    fn finish(&mut self, end: WalkEnd) -> WalkStep<'a> {
        self.end = Some(end.clone());
        WalkStep::Done(end)
    }
}

fn body_len_of(raw: usize, includes_header: bool, header_len: usize) -> Result<usize, String> {
    if !includes_header {
        return Ok(raw);
    }
    if raw < header_len {
        return Err(format!(
            "declared length {} smaller than the {} byte record header",
            raw, header_len
        ));
    }
    Ok(raw - header_len)
}

fn read_uint(cursor: &mut ByteCursor<'_>, width: u8, big_endian: bool) -> Result<u32, DecodeError> {
    debug_assert!(matches!(width, 1 | 2 | 4));
    let bytes = cursor.read_bytes(width as usize)?;
    let mut value = 0u32;
    if big_endian {
        for byte in bytes {
            value = (value << 8) | u32::from(*byte);
        }
    } else {
        for byte in bytes.iter().rev() {
            value = (value << 8) | u32::from(*byte);
        }
    }
    Ok(value)
}
