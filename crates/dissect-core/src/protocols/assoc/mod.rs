//! Association protocol decoding with cross-PDU context memory.
//!
//! Connect PDUs are constructed TLV values decoded against declarative
//! schema tables. A connect-accept binds the negotiated presentation
//! context id to the application context identifier it names; a later
//! data-transfer PDU resolves its payload decoder through that binding
//! and reports "decoder is not available" on a miss instead of
//! guessing. The context table is owned by the session and passed in
//! explicitly, so unrelated conversations reusing the same small id
//! never collide.
//!
//! Version française (résumé):
//! Les PDU de connexion sont décodées par tables de schémas TLV. Un
//! connect-accept enregistre (context id -> identifiant de protocole);
//! un transfert de données ultérieur retrouve son décodeur via cette
//! table, et échoue proprement si le contexte n'a jamais été négocié.

pub mod layout;
pub mod parser;

pub use parser::{default_registry, dissect};
