//! mc: session supervision and identity caching for remote media catalogs.
//!
//! This crate is the coordination layer between many concurrent logical
//! browse clients and a single remote media-catalog endpoint:
//!
//! - [`IdCache`]: a shared bounded cache deduplicating metadata-by-id
//!   fetches across arbitrarily many named sessions, with global LRU
//!   eviction
//! - [`Supervisor`]: owner of a pool of browsing [`Session`]s over one
//!   [`MediaClient`], serialized on a single dispatch thread, with
//!   compositional cancellation - disposing a session or cancelling the
//!   supervisor abandons in-flight remote calls without their completion
//!   callbacks ever firing
//! - [`Snapshot`]: immutable query result descriptors, paged with
//!   tail-clamped fragment reads
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use mc::testing::MockClient;
//! use mc::{Supervisor, runtime::Dispatcher};
//!
//! let dispatcher = Arc::new(Dispatcher::new("media-dispatch"));
//! let supervisor = Arc::new(Supervisor::new(Arc::new(MockClient::new(100))));
//!
//! let owner = Arc::clone(&supervisor);
//! dispatcher.execute(move || {
//!     owner.create_session(|session| {
//!         let session = session.expect("create failed");
//!         session
//!             .browse(None, move |snapshot| {
//!                 let snapshot = snapshot.expect("browse failed");
//!                 snapshot
//!                     .read(0, 20, |fragment| {
//!                         println!("{} items", fragment.expect("read failed").len());
//!                     })
//!                     .expect("session closed");
//!             })
//!             .expect("session closed");
//!     });
//! });
//! ```
//!
//! [`MediaClient`]: mc_runtime::MediaClient

pub mod cache;
pub mod error;
pub mod supervisor;
pub mod testing;

// Re-export key types at crate root
pub use cache::{IdCache, IdCacheEntry, IdCacheSession};
pub use error::{Error, Result};
pub use supervisor::{Session, Snapshot, Supervisor};

// The protocol and runtime layers travel with the core API.
pub use mc_protocol as protocol;
pub use mc_runtime as runtime;
