//! Object store: `store://bucket/key` addressing with filesystem and
//! in-memory backends.

pub mod domain;
pub mod memory;
pub mod repo_fs;

pub use domain::{ObjectMeta, ObjectStore, StorePath};
pub use memory::InMemoryObjectStore;
pub use repo_fs::FsObjectStore;
