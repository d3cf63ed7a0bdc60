//! Test doubles for the foreman kernel: a complete in-memory store and a
//! few builders for common inputs.

pub mod builders;
pub mod memory;

pub use builders::{gate, intent, task};
pub use memory::MemoryStore;
