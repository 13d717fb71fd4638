//! Request coordination
//!
//! Admission control between the executor and the connector: a start-up
//! barrier, a concurrency policy and an irreversible stop.

pub mod coordinator;
pub mod types;

pub use coordinator::*;
pub use types::*;
