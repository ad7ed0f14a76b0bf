use std::collections::HashMap;

/// Attribute key carrying governance upgrade announcements.
pub const UPGRADE_ACTION: &str = "upgrade.action";

/// Events delivered by the chain listener, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Transaction(TxEvent),
    Header(BlockHeader),
}

/// A transaction's events flattened to `"<type>.<key>" -> values`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEvent {
    pub attributes: HashMap<String, Vec<String>>,
}

impl TxEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Builds an event carrying a single upgrade announcement.
    pub fn upgrade_action(payload: impl Into<String>) -> Self {
        let mut event = Self::new();
        event.push(UPGRADE_ACTION, payload);
        event
    }

    /// Returns the announcement payload when the event carries exactly one.
    pub fn upgrade_payload(&self) -> Option<&str> {
        match self.attributes.get(UPGRADE_ACTION).map(Vec::as_slice) {
            Some([payload]) => Some(payload.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
}
