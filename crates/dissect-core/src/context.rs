use std::collections::HashMap;

/// Cross-PDU memory for one decoding session.
///
/// A negotiation PDU registers which protocol a small integer context
/// identifier stands for; later data PDUs look the identifier up to
/// pick a payload decoder. The table is an owned value created per
/// session/conversation and passed by mutable reference into entry
/// points — two sessions reusing the same small identifier never
/// collide because they never share a table. Registration always
/// overwrites; nothing removes a single entry short of
/// [`clear`](Self::clear) at session teardown.
///
/// # Examples
/// ```
/// use dissect_core::context::ContextTable;
///
/// let mut contexts = ContextTable::new();
/// contexts.register(5, "1.0.9506.2.1");
/// assert_eq!(contexts.lookup(5), Some("1.0.9506.2.1"));
/// assert_eq!(contexts.lookup(6), None);
/// ```
#[derive(Debug, Default, Clone)]
pub struct ContextTable {
    entries: HashMap<u32, String>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `context_id` to a protocol identifier, replacing any prior
    /// binding wholesale.
    pub fn register(&mut self, context_id: u32, protocol_id: impl Into<String>) {
        self.entries.insert(context_id, protocol_id.into());
    }

    /// Protocol identifier previously registered for `context_id`.
    pub fn lookup(&self, context_id: u32) -> Option<&str> {
        self.entries.get(&context_id).map(String::as_str)
    }

    /// Session teardown: drop every binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
