//! Storage interface for report containers.
//!
//! This crate defines the writer abstraction the recording runtime flushes
//! into, along with the shared types both the in-memory backend and any
//! file-format backend need.
//!
//! # Design
//!
//! The container format is an implementation detail of the backend, not of
//! the recording pipeline. The runtime only ever talks to a [`Writer`]:
//! group/dataset creation, attribute configuration, typed 1-D writes and
//! appending 2-D writes. A report's populations all share one container, so
//! writers are handed out as cloneable [`SharedWriter`] handles.

#![warn(missing_docs)]

mod error;
mod writer;

pub use error::{Result, StorageError};
pub use writer::{DatasetValues, SharedWriter, TimeTriple, Writer};
