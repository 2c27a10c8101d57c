//! In-process memory port (SPEC_FULL §4.6 supplement (a)).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use agentcore_domain::message::Message;

use crate::error::Result;
use crate::port::MemoryPort;

/// Backed by one mutex guarding the whole map, matching the teacher's
/// per-store-not-per-key granularity — acceptable here since an append is
/// just a `Vec::extend`, never I/O.
#[derive(Default)]
pub struct InMemoryMemoryPort {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryMemoryPort {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryPort for InMemoryMemoryPort {
    async fn append(&self, conversation_id: &str, messages: &[Message]) -> Result<()> {
        self.conversations
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self.conversations.lock().get(conversation_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.conversations.lock().remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_preserves_insertion_order() {
        let port = InMemoryMemoryPort::new();
        port.append("c1", &[Message::user("first")]).await.unwrap();
        port.append("c1", &[Message::user("second")]).await.unwrap();

        let messages = port.get("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content.as_text(), "first");
        assert_eq!(messages[1].content.as_text(), "second");
    }

    #[tokio::test]
    async fn get_on_unknown_conversation_returns_empty() {
        let port = InMemoryMemoryPort::new();
        assert!(port.get("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_removes_all_messages_for_key() {
        let port = InMemoryMemoryPort::new();
        port.append("c1", &[Message::user("hi")]).await.unwrap();
        port.clear("c1").await.unwrap();
        assert!(port.get("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversations_are_independent() {
        let port = InMemoryMemoryPort::new();
        port.append("c1", &[Message::user("a")]).await.unwrap();
        port.append("c2", &[Message::user("b")]).await.unwrap();
        assert_eq!(port.get("c1").await.unwrap().len(), 1);
        assert_eq!(port.get("c2").await.unwrap().len(), 1);
    }
}
