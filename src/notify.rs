// Push channel for newly inserted messages
use tokio::sync::broadcast;

use crate::db::models::Message;

const DEFAULT_CAPACITY: usize = 256;

/// Fans out every new message to all current subscribers.
///
/// Slow subscribers lose the oldest messages rather than blocking senders.
#[derive(Clone)]
pub struct MessageHub {
    sender: broadcast::Sender<Message>,
}

impl MessageHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many subscribers received the message
    pub fn publish(&self, message: Message) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
