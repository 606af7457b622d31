pub mod embedding;
pub mod engine;
pub mod event_log;
pub mod port_adapter;
pub mod schema;
pub mod scorer;
pub mod store;

pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use engine::{MemoryEngine, MemoryEngineConfig};
pub use port_adapter::MemoryPortAdapter;
pub use schema::{MemoryEntry, MemoryLayer};
