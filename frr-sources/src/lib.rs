//! Race payload sources
//!
//! Each source knows how to locate and transfer the raw JSON export for a
//! race. Decoding, caching, and fallback ordering live in the server's
//! loader.

pub mod demo;
pub mod directory;
pub mod fallback;
mod http;
pub mod storage;

pub use demo::{generate_race, DemoConfig, DemoSource};
pub use directory::DirectorySource;
pub use fallback::LocalApiSource;
pub use storage::{ObjectStorageSource, StorageLayout};
