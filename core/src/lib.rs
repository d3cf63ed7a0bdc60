//! foreman-core: the coordination kernel for multi-agent work on a
//! shared source tree.
//!
//! The kernel mediates four interlocking concerns: declared intent before
//! file changes, time-bounded advisory claims on file paths, evidence
//! capture, and compliance verification that behavior matched intent.
//! Around them sits a small kanban task model whose status transitions
//! are gated by the same primitives.
//!
//! [`coordinator::Coordinator`] is the single public facade; it composes
//! the claim engine, task graph, gate evaluator, journals, compliance
//! checker and event bus over any [`store::Store`] implementation.

pub mod claims;
pub mod clock;
pub mod compliance;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod gates;
pub mod journal;
pub mod models;
pub mod store;
pub mod tasks;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, StatusSummary};
pub use error::{CoordError, Result};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use models::*;
pub use store::{ClaimStore, CollabStore, GateStore, JournalStore, Store, TaskStore};
pub use validation::Validate;
