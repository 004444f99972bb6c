//! Core decoding substrate for protocol dissectors.
//!
//! This crate implements the machinery shared by byte-level protocol
//! decoders: a bounds-checked cursor over an immutable buffer, a
//! generic record-walking loop, a schema-driven TLV engine, a
//! tag-to-decoder dispatch registry, session-scoped cross-PDU context
//! state, and the decoded-tree output artifact. Protocol field
//! catalogues stay out; the demonstration dissectors under `protocols`
//! exist to exercise each shape end to end.
//!
//! Invariants:
//! - No read ever crosses the captured or reported buffer bounds; all
//!   bounds violations are typed errors, never panics.
//! - Record walks are forward-only and bounded by the buffer length,
//!   so adversarial length fields cannot loop the decoder.
//! - Decoding is best effort: failures degrade the nearest enclosing
//!   tree node via diagnostics instead of aborting the pass.
//! - A decode pass is a pure function of (buffer, session state); all
//!   I/O belongs to the caller.
//!
//! Version française (résumé):
//! Cette crate fournit le socle commun des dissecteurs de protocoles :
//! curseur borné -> parcours d'enregistrements -> décodage TLV par
//! tables -> arbre décoré de diagnostics. Les lectures sont toujours
//! vérifiées, le parcours termine sur toute entrée, et l'état de
//! session est passé explicitement. Aucune E/S dans le cœur.
//!
//! # Examples
//! ```
//! use dissect_core::cursor::ByteCursor;
//! use dissect_core::protocols::chain;
//!
//! // a message whose header opens an empty payload chain
//! let buf = [0x01, 0x00, 0x12, 0x34, 0x56, 0x78];
//! let registry = chain::default_registry();
//! let tree = chain::dissect(ByteCursor::new(&buf), &registry);
//! assert!(!tree.has_diagnostics());
//! println!("{}", serde_json::to_string(&tree.export()).unwrap());
//! ```

pub mod context;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod protocols;
pub mod tlv;
pub mod tree;
pub mod walk;

pub use context::ContextTable;
pub use cursor::ByteCursor;
pub use dispatch::{DecodeContext, DecoderEntry, DispatchRegistry};
pub use error::{DecodeError, DiagnosticKind};
pub use tlv::{FieldDecode, Repeat, ScalarKind, TagMatch, TlvFieldSpec};
pub use tree::{DecodedTree, Diagnostic, ExportNode, NodeId, ScalarValue, TREE_VERSION, TreeReport};
pub use walk::{Discriminant, HeaderFormat, LengthEncoding, Record, RecordWalker, WalkEnd, WalkStep};
