//! System-prompt assembly and reminder injection (SPEC_FULL §4.2).

pub mod builder;

pub use builder::{ContextBuilder, ContextReport, CurrentTurnHint, Reminder};
