//! Media client runtime - dispatch thread, cancellation, and the client
//! boundary.
//!
//! This crate provides the low-level infrastructure the supervision core in
//! `mc-rs` runs on:
//!
//! - **Dispatcher**: the shared single-threaded executor; every supervisor,
//!   session, and cache continuation runs here, one at a time
//! - **Cancellation**: latching cancellation sources/tokens and the derived
//!   two-source link used to tear down in-flight remote calls
//! - **Client boundary**: the [`MediaClient`] trait a remote media-catalog
//!   endpoint is driven through, and its error type
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    mc-rs    │  IdCache, Supervisor, Session, Snapshot
//! └──────┬──────┘
//!        │ drives a MediaClient
//! ┌──────▼──────┐
//! │  mc-runtime │  This crate
//! │  ┌────────┐ │
//! │  │ Dispat │ │  Single-threaded job queue + local tasks
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Cancel │ │  Sources, tokens, two-source links
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Client │ │  Remote endpoint trait
//! │  └────────┘ │
//! └─────────────┘
//! ```
//!
//! # Decoupling via MediaClient
//!
//! The supervision core never talks to a transport directly; it drives the
//! [`MediaClient`] trait. Real endpoints (UPnP proxies, HTTP gateways) and
//! test mocks implement it, which keeps mc-runtime independent of any
//! particular device stack.

pub mod cancellation;
pub mod client;
pub mod dispatcher;
pub mod error;

// Re-export key types at crate root
pub use cancellation::{
    CancelRegistration, CancellationSource, CancellationToken, Cancelled, LinkedCancellation,
};
pub use client::MediaClient;
pub use dispatcher::Dispatcher;
pub use error::{ClientError, Result};
