//! The memory port: a keyed append-only message log (SPEC_FULL §4.6).
//!
//! Grounded in the teacher's `SessionStore` shape (a keyed map guarded by a
//! lock, with an explicit flush step) generalized to the narrower contract
//! SPEC_FULL names: `append`, `get`, `clear`, nothing else. The teacher's
//! session bookkeeping (token counters, origin metadata, SerialMemory ids)
//! is product surface this core doesn't carry.

use async_trait::async_trait;

use agentcore_domain::message::Message;

use crate::error::Result;

/// Append-only, per-conversation message log. Ordering is insertion order;
/// writes for a given key are serialized by the implementation.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn append(&self, conversation_id: &str, messages: &[Message]) -> Result<()>;

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;
}
