//! The memory port and its two reference implementations (SPEC_FULL §4.6).

pub mod error;
pub mod file;
pub mod in_memory;
pub mod port;

pub use error::{MemoryError, Result};
pub use file::FileMemoryPort;
pub use in_memory::InMemoryMemoryPort;
pub use port::MemoryPort;
