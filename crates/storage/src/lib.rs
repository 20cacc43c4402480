//! Storage abstraction and implementations for closeman.
//!
//! This crate provides the injected task store used by every engine
//! invocation, with an in-memory and a JSON-file implementation.

#![warn(missing_docs)]

pub mod json_storage;
pub mod memory;
pub mod trait_;

pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
pub use trait_::{Result, StorageError, TaskStore};
