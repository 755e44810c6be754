//! Port implementations for development and tests.

mod memory;

pub use memory::InMemoryStore;
