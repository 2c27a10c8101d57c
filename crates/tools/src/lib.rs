//! Tool registry, approval gate, and bounded dispatch (SPEC_FULL §4.5).

pub mod approval;
pub mod error;
pub mod executor;
pub mod registry;

pub use approval::{ApprovalDecision, ApprovalInfo, ApprovalStore};
pub use error::{Result, ToolError};
pub use executor::dispatch_batch;
pub use registry::{CompositeToolRegistry, LocalTool, ToolOutcome};
