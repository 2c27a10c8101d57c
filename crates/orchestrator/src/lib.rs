//! The reason→act→observe orchestration engine (SPEC_FULL §2, §4.1).
//!
//! [`core::AgentCore`] is the crate's top-level entry point: a host builds
//! one via [`core::AgentCoreBuilder`] and asks it for a [`turn::Orchestrator`]
//! per conversation via `orchestrator_for`.

pub mod cancel;
pub mod core;
pub mod delegation;
pub mod error;
pub mod events;
pub mod metrics;
pub mod resolve;
pub mod turn;

#[cfg(test)]
mod testutil;

pub use core::{AgentCore, AgentCoreBuilder};
pub use delegation::{AgentTemplate, AssignTaskTool, DelegationService};
pub use error::{OrchestratorError, Result};
pub use events::{Event, EventPayload, EventSink, TracingEventSink};
pub use metrics::{MetricEvent, MetricsSink, TracingMetricsSink};
pub use turn::Orchestrator;
