mod database;
mod local;
mod memory;
pub mod scanner;
mod source;
pub mod wire;

pub use database::Database;
pub use local::LocalRepository;
pub use memory::MemoryRepository;
pub use scanner::GraphScanner;
pub use source::{IndexedBlob, RepositorySource, SnapshotInfo};

// Re-export the schema version for callers who need it
pub const SCHEMA_VERSION: &str = "1";
