//! Storage abstraction and implementations for Stagehand.
//!
//! This crate provides the object storage interface used while packaging,
//! a directory-backed and an in-memory implementation, and loaders for the
//! answers and module manifest files.

#![warn(missing_docs)]

pub mod trait_;
pub mod fs_store;
pub mod memory;
pub mod config;

pub use trait_::{payload_from_bytes, ObjectStore, Payload, Result, StorageError};
pub use fs_store::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use config::{load_answers, load_manifest};
