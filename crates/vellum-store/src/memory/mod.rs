mod store;
mod transaction;

pub use store::MemoryStore;
pub use transaction::{MemoryCf, MemorySavepoint, MemoryTransaction};

#[cfg(test)]
mod tests;
