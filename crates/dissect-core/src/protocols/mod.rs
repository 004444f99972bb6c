//! Demonstration protocol dissectors.
//!
//! Each protocol follows a layered structure:
//! - `layout`: discriminant values, offsets, and schema tables (source
//!   of truth)
//! - `parser`: domain-level decoding built on the core (no direct byte
//!   indexing)
//!
//! Parsers are pure and contain no I/O; the caller acquires the buffer
//! and owns the session state. One module exists per record-walking
//! shape the core supports: a "next payload" chain, a unit-length
//! option list, and a TLV association protocol with cross-PDU context.

pub mod assoc;
pub mod chain;
pub mod options;
