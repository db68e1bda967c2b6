//! Capability grants
//!
//! Maps resolved right ids to the coarse capabilities channel operations
//! require.

use crate::error::ApiError;
use crate::types::RightId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Coarse capability guarding channel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// ids, read, version and changes
    Read,
    /// create, update and delete
    Write,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => f.write_str("read"),
            Capability::Write => f.write_str("write"),
        }
    }
}

/// Static `rightId -> [capability]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessTable {
    rights: BTreeMap<RightId, Vec<Capability>>,
}

impl AccessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, right: &str, capabilities: &[Capability]) -> Self {
        self.rights.insert(right.to_string(), capabilities.to_vec());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rights.is_empty()
    }

    /// Right ids the table knows about
    pub fn rights(&self) -> impl Iterator<Item = &str> {
        self.rights.keys().map(String::as_str)
    }

    /// Capabilities conferred by holding `rights`; unknown rights confer nothing
    pub fn capabilities_for(&self, rights: &[RightId]) -> BTreeSet<Capability> {
        rights
            .iter()
            .filter_map(|right| self.rights.get(right))
            .flatten()
            .copied()
            .collect()
    }

    pub fn grant(&self, rights: Vec<RightId>) -> Grant {
        let capabilities = self.capabilities_for(&rights);
        Grant {
            rights,
            capabilities,
        }
    }
}

/// Rights held at a node together with the capabilities they confer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    rights: Vec<RightId>,
    capabilities: BTreeSet<Capability>,
}

impl Grant {
    /// Grant used when no access control is configured
    pub fn unrestricted() -> Self {
        Self {
            rights: Vec::new(),
            capabilities: [Capability::Read, Capability::Write].into_iter().collect(),
        }
    }

    pub fn rights(&self) -> &[RightId] {
        &self.rights
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn can_read(&self) -> bool {
        self.can(Capability::Read)
    }

    pub fn can_write(&self) -> bool {
        self.can(Capability::Write)
    }

    pub fn verify(&self, capability: Capability) -> Result<(), ApiError> {
        if !self.can(capability) {
            return Err(ApiError::AccessDenied { capability });
        }
        Ok(())
    }

    pub fn verify_read(&self) -> Result<(), ApiError> {
        self.verify(Capability::Read)
    }

    pub fn verify_write(&self) -> Result<(), ApiError> {
        self.verify(Capability::Write)
    }
}
