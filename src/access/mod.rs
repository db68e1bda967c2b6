//! Access control
//!
//! Hierarchical rights resolution over the node tree, plus the static table
//! mapping resolved rights to coarse read/write capabilities.

pub mod grant;
pub mod model;
pub mod validator;

pub use grant::{AccessTable, Capability, Grant};
pub use model::{NodeAccess, UserGroupMembership};
pub use validator::NodeAccessValidator;
