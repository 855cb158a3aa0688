//! Store implementations for the embedding pipeline.
//!
//! [`LanceStore`] reads records from and writes embeddings to LanceDB tables;
//! [`InMemoryStore`] implements the same traits in process.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceStore;
pub use memory::InMemoryStore;
