//! Batch tool-approval gate (SPEC_FULL §4.5, §6).
//!
//! Grounded in the teacher's `gateway::runtime::approval`: a pending
//! approval is parked behind a `oneshot` channel until a human decides,
//! with a timeout that auto-denies so a turn can never hang forever on an
//! unanswered prompt. Generalized from the teacher's single-command
//! approve/deny to a whole-batch decision, since a turn can request
//! several tool calls in one assistant message and the host UI naturally
//! wants to approve/deny/edit them together.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, RwLock};
use uuid::Uuid;

use agentcore_domain::tool::ToolInvocation;

/// What a human (or an auto-approval policy) decided about a batch of
/// pending tool calls.
#[derive(Debug, Clone)]
pub enum ApprovalDecision {
    ApproveAll,
    /// Approve only the named call ids; the rest are treated as denied.
    ApproveSubset(Vec<String>),
    DenyAll,
    /// Replace one or more calls' arguments before execution, then run
    /// every call (edited or original) as approved.
    Edit(HashMap<String, serde_json::Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalInfo {
    pub id: Uuid,
    pub session_key: String,
    pub invocations: Vec<ToolInvocation>,
    pub created_at: DateTime<Utc>,
}

struct PendingApproval {
    info: ApprovalInfo,
    respond: oneshot::Sender<ApprovalDecision>,
}

pub struct ApprovalStore {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    timeout: Duration,
}

impl ApprovalStore {
    pub fn new(timeout: Duration) -> Self {
        Self { pending: RwLock::new(HashMap::new()), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a batch awaiting approval and return a receiver that
    /// resolves with the decision, or `RecvError` if the entry is removed
    /// without ever being answered (e.g. on shutdown).
    pub async fn insert(
        &self,
        session_key: impl Into<String>,
        invocations: Vec<ToolInvocation>,
    ) -> (Uuid, oneshot::Receiver<ApprovalDecision>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let info = ApprovalInfo {
            id,
            session_key: session_key.into(),
            invocations,
            created_at: Utc::now(),
        };
        self.pending.write().await.insert(id, PendingApproval { info, respond: tx });
        (id, rx)
    }

    pub async fn approve(&self, id: Uuid, decision: ApprovalDecision) -> bool {
        if let Some(entry) = self.pending.write().await.remove(&id) {
            let _ = entry.respond.send(decision);
            true
        } else {
            false
        }
    }

    pub async fn deny(&self, id: Uuid) -> bool {
        self.approve(id, ApprovalDecision::DenyAll).await
    }

    /// Auto-deny and remove any entry older than `timeout`. Intended to
    /// be called on a ticking interval by the host.
    pub async fn remove_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.write().await;
        let expired: Vec<Uuid> = pending
            .iter()
            .filter(|(_, p)| now.signed_duration_since(p.info.created_at).to_std().unwrap_or_default() >= self.timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = pending.remove(id) {
                let _ = entry.respond.send(ApprovalDecision::DenyAll);
            }
        }
        expired.len()
    }

    pub async fn list_pending(&self) -> Vec<ApprovalInfo> {
        self.pending.read().await.values().map(|p| p.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(id: &str) -> ToolInvocation {
        ToolInvocation { id: id.into(), name: "exec".into(), arguments_json: "{}".into() }
    }

    #[tokio::test]
    async fn approve_resolves_the_waiting_receiver() {
        let store = ApprovalStore::new(Duration::from_secs(30));
        let (id, rx) = store.insert("sess-1", vec![invocation("t1")]).await;
        assert!(store.approve(id, ApprovalDecision::ApproveAll).await);
        let decision = rx.await.unwrap();
        assert!(matches!(decision, ApprovalDecision::ApproveAll));
    }

    #[tokio::test]
    async fn deny_unknown_id_returns_false() {
        let store = ApprovalStore::new(Duration::from_secs(30));
        assert!(!store.deny(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn expired_entries_are_auto_denied() {
        let store = ApprovalStore::new(Duration::from_millis(0));
        let (_, rx) = store.insert("sess-1", vec![invocation("t1")]).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = store.remove_expired().await;
        assert_eq!(removed, 1);
        assert!(matches!(rx.await.unwrap(), ApprovalDecision::DenyAll));
    }

    #[tokio::test]
    async fn list_pending_reflects_open_entries() {
        let store = ApprovalStore::new(Duration::from_secs(30));
        let (id, _rx) = store.insert("sess-1", vec![invocation("t1")]).await;
        assert_eq!(store.list_pending().await.len(), 1);
        store.approve(id, ApprovalDecision::DenyAll).await;
        assert!(store.list_pending().await.is_empty());
    }
}
