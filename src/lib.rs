//! Syncstore: Versioned Record Channels
//!
//! Named channels of records with CRUD and a version-addressed change log,
//! in-memory projections kept in step with them (a keyed dictionary and a
//! parent/child tree), and hierarchical access control resolved over the
//! node tree.

pub mod access;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod server;
pub mod sync;
pub mod tooling;
pub mod types;
