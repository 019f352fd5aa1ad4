//! Foundation types for the SDS client.
//!
//! Every other SDS crate depends on `sds-types`. It holds the values the
//! data-plane reads from object descriptors and the single error type shared
//! by the transport and the upload orchestrator.
//!
//! # Key Types
//!
//! - [`Position`] — Ordered `(meta, sub)` chunk slot within an object
//! - [`ObjectInfo`] — Object descriptor: metadata plus its chunk targets
//! - [`ChunkInfo`] — One replica target; receives size and hash after upload
//! - [`SdsError`] — Error value carrying an [`ErrorKind`] and an optional cause

pub mod constants;
pub mod error;
pub mod object;
pub mod position;

pub use error::{ErrorKind, SdsError, SdsResult};
pub use object::{ChunkInfo, ObjectInfo, ObjectUrl};
pub use position::Position;
