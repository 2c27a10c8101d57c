//! Cooperative cancellation with cascading fan-out across delegation depth
//! (SPEC_FULL §4.1 cancellation, §4.7 supplement, §5, P7).
//!
//! Adapted near-verbatim from the teacher's `CancelMap`: every running
//! turn gets a [`CancelToken`]; a parent turn that spawns a child via
//! delegation registers the child in its group before the child's turn
//! starts, so cancelling the parent cascades to every still-running
//! descendant.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token polled by the turn loop at its suspension points.
/// Cancellation is idempotent and observable from every clone.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Tracks the active cancel token per conversation, plus group membership
/// for cascading parent→child cancellation across delegation depth.
#[derive(Default)]
pub struct CancelGroup {
    tokens: Mutex<HashMap<String, CancelToken>>,
    /// parent conversation id → set of child conversation ids.
    children: Mutex<HashMap<String, HashSet<String>>>,
}

impl CancelGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conversation_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(conversation_id.to_string(), token.clone());
        token
    }

    /// Cancel the turn for `conversation_id` and cascade to every child
    /// registered under it, transitively.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(conversation_id) {
            token.cancel();
            true
        } else {
            false
        };

        let child_ids: Vec<String> = self
            .children
            .lock()
            .get(conversation_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        for child in &child_ids {
            self.cancel(child);
        }

        found
    }

    pub fn remove(&self, conversation_id: &str) {
        self.tokens.lock().remove(conversation_id);
        self.children.lock().remove(conversation_id);
    }

    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.tokens.lock().contains_key(conversation_id)
    }

    pub fn add_child(&self, parent_id: &str, child_id: &str) {
        self.children.lock().entry(parent_id.to_string()).or_default().insert(child_id.to_string());
    }

    pub fn remove_child(&self, parent_id: &str, child_id: &str) {
        let mut children = self.children.lock();
        if let Some(set) = children.get_mut(parent_id) {
            set.remove(child_id);
            if set.is_empty() {
                children.remove(parent_id);
            }
        }
    }
}
