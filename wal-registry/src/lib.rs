pub mod registry;
pub mod store;

pub use registry::NamespaceRegistry;
pub use store::{InMemoryNamespaceStore, NamespaceStore, PostgresNamespaceStore, StoreError};
