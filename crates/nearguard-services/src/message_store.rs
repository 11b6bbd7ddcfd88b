use nearguard_core::{ChatMessage, Endpoint};

/// The single ordered message stream, inbound and locally sent.
///
/// Entries are never reordered or deduplicated; `seq` is assigned in
/// append order.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    next_seq: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message from `sender` and return the stored entry.
    pub fn append(&mut self, sender: Endpoint, text: String) -> ChatMessage {
        let message = ChatMessage::new(self.next_seq, sender, text);
        self.next_seq += 1;
        self.messages.push(message.clone());
        message
    }

    /// Messages with `seq >= since`
    pub fn since(&self, since: u64) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.seq >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
