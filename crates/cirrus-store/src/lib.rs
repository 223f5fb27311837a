//! Base blob store for cirrus.
//!
//! [`BaseStore`] is the only component that talks to a backend. It validates
//! object references, ensures containers exist, runs every backend call
//! through a [`RetryPolicy`], and wraps backend failures into the
//! [`StoreError`] taxonomy. Chunked and versioned stores are built on top of
//! it in `cirrus-sdk`.
//!
//! # Backends
//!
//! All backends implement the [`BlobBackend`] trait:
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding;
//!   also records calls and injects failures
//! - [`LocalFsBackend`] -- directories and atomically renamed files on disk
//!
//! A backend is selected by a connection string (see [`connection`]),
//! usually resolved through a [`ConfigProvider`].
//!
//! # Design Rules
//!
//! 1. Validation runs before any backend call; invalid input costs nothing.
//! 2. Backend failures are wrapped exactly once, keeping the cause.
//! 3. Only transient failures are retried, and every retry starts from the
//!    state the operation began with.
//! 4. A block commit never proceeds over a gap in the chunk sequence.
//! 5. The store holds no per-call state; callers own their payloads.

pub mod backend;
pub mod base;
pub mod config;
pub mod connection;
pub mod error;
pub mod fs;
pub mod memory;
pub mod retry;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{
    BackendError, BackendErrorKind, BackendResult, BlobBackend, BlobListing, ContainerAccess,
};
pub use base::BaseStore;
pub use config::{
    resolve_connection_string, ConfigProvider, EnvConfig, FileConfig, CONNECTION_STRING_KEY,
};
pub use connection::{BackendKind, ConnectionString};
pub use error::{ErrorKind, StoreError, StoreOp, StoreResult};
pub use fs::LocalFsBackend;
pub use memory::{BackendOp, InMemoryBackend};
pub use retry::RetryPolicy;
