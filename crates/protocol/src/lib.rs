//! Wire types for the media endpoint protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! session-supervision core and a remote media-catalog endpoint. These types
//! represent the "protocol layer" - the shapes of data as they cross the
//! client boundary.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond construction and accessors
//! - **Schema-free**: Tag *definitions* (names, namespaces) belong to the
//!   embedding application; the protocol only moves numbers and strings
//! - **Stable**: Changes only when the client boundary changes
//!
//! Higher-level supervision and caching APIs are built on top of these types
//! in `mc-rs`.

pub mod query;
pub mod snapshot;
pub mod types;

pub use query::*;
pub use snapshot::*;
pub use types::*;
