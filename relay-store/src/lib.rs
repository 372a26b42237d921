//! Durable SQLite store for the relay session layer.
//!
//! Three record kinds share one pooled database:
//! - processed-event markers (webhook dedup)
//! - chat-handle to conversation-id mappings
//! - ordered, budget-bounded conversation message logs
//!
//! All SQL runs on the blocking thread pool behind a fixed-size
//! connection pool configured for write concurrency (WAL, relaxed
//! sync, bounded busy wait).

pub mod context;
pub mod dedup;
pub mod pool;
pub mod types;

pub use context::ContextStore;
pub use dedup::DedupStore;
pub use pool::StorePool;
pub use types::{ConversationContext, ConversationMessage, MessageRole};
