//! Bounded concurrent tool dispatch (SPEC_FULL §4.5).
//!
//! Grounded in the teacher's `gateway::runtime::turn` tool-dispatch stage:
//! every call in a batch runs concurrently and results are collected back
//! in the original order so event sequencing stays deterministic. The
//! teacher does this with a bare `join_all` over every pending call,
//! unbounded; this version gates each call behind a [`Semaphore`] permit
//! so a turn that requests twenty tool calls doesn't open twenty sockets
//! or processes at once — `join_all` still preserves per-call ordering
//! in its result vector regardless of which permit-holder finishes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agentcore_domain::tool::{ToolExecutionResult, ToolInvocation};
use tokio::sync::Semaphore;

use crate::registry::CompositeToolRegistry;

/// Run every invocation in `batch` against `registry`, at most
/// `max_concurrency` at a time, each bounded by `per_call_timeout`.
/// Returns results in the same order as `batch`.
pub async fn dispatch_batch(
    registry: &CompositeToolRegistry,
    batch: Vec<ToolInvocation>,
    max_concurrency: usize,
    per_call_timeout: Duration,
) -> Vec<ToolExecutionResult> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let futures = batch.into_iter().map(|invocation| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire().await.expect("tool dispatch semaphore never closes");
            dispatch_one(registry, invocation, per_call_timeout).await
        }
    });

    futures_util::future::join_all(futures).await
}

async fn dispatch_one(
    registry: &CompositeToolRegistry,
    invocation: ToolInvocation,
    timeout: Duration,
) -> ToolExecutionResult {
    let started = Instant::now();
    let result = registry.dispatch(&invocation, timeout).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => ToolExecutionResult {
            id: invocation.id,
            name: invocation.name,
            status: agentcore_domain::tool::ToolResultStatus::Success,
            kind: outcome.kind,
            body: outcome.body,
            metadata: outcome.metadata,
            duration_ms,
            error_reason: None,
        },
        Err(e) => {
            tracing::debug!(tool = %invocation.name, error = %e, "tool call failed");
            ToolExecutionResult::error(invocation.id, invocation.name, e.reason(), e.to_string(), duration_ms)
        }
    }
}
