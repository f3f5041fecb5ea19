// Library crate exposing modules for the binary, integration tests and benches

pub mod config;
pub mod error;
pub mod model;
pub mod repository;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use sync::{SyncSummary, Synchronizer, VerifyReport};
