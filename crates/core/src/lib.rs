//! Stagehand core data models.
//!
//! This crate defines the structures shared by the packaging orchestrator:
//! modules and their packaging capability, run answers, task units and the
//! events emitted while a run walks its layers.

#![warn(missing_docs)]

// Core identities
mod id;

// Run configuration
mod answers;
mod manifest;
mod tags;

// Modules and work
mod module;
mod task;
mod event;

// Re-exports
pub use id::*;

pub use answers::{Answers, ModuleAnswers, S3Answers};
pub use manifest::{ModuleManifest, ModuleSpec};
pub use tags::{Tag, TagError, TagsList, MAX_KEY_CHARS, MAX_VALUE_CHARS};

pub use module::{FnProvider, Module, PackageProvider, Packaging};
pub use task::{PackageOutcome, StepFuture, SubTask, TaskUnit};
pub use event::{RunEvent, RunEventKind};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
