//! Bidirectional block-id mapping table
//!
//! Numeric block ids are session-scoped: the server assigns them (or
//! loads them from world metadata) and pushes the table to clients over
//! the control channel before any chunk payload is interpreted. The
//! table is an explicit per-world object, never process-global.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{BlockId, Result};

/// String id reserved for air; always numeric id 0
pub const AIR_NAME: &str = "air";

/// Bidirectional string-id <-> numeric-id table
#[derive(Debug, Clone)]
pub struct BlockTable {
    by_name: HashMap<String, BlockId>,
    by_id: Vec<String>,
}

impl Default for BlockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTable {
    /// Create a table containing only air at id 0
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(AIR_NAME.to_string(), 0);
        Self {
            by_name,
            by_id: vec![AIR_NAME.to_string()],
        }
    }

    /// Number of registered blocks, air included; never zero
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Always false: air is registered at construction
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Register a block name, returning its numeric id.
    ///
    /// Registering an existing name returns the id it already has.
    pub fn register(&mut self, name: &str) -> Result<BlockId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if self.by_id.len() > BlockId::MAX as usize {
            return Err(Error::BlockTable("block id space exhausted".into()));
        }
        let id = self.by_id.len() as BlockId;
        self.by_name.insert(name.to_string(), id);
        self.by_id.push(name.to_string());
        Ok(id)
    }

    /// Numeric id for a block name
    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Block name for a numeric id
    pub fn name_of(&self, id: BlockId) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    /// Export as an ordered name list for metadata / control-channel sync
    pub fn export(&self) -> BlockTableExport {
        BlockTableExport {
            names: self.by_id.clone(),
        }
    }

    /// Rebuild a table from an export.
    ///
    /// The export must have air at index 0; anything else means the
    /// metadata or control message is corrupt.
    pub fn import(export: &BlockTableExport) -> Result<Self> {
        if export.names.first().map(String::as_str) != Some(AIR_NAME) {
            return Err(Error::BlockTable(
                "block table export missing air at id 0".into(),
            ));
        }
        let mut by_name = HashMap::with_capacity(export.names.len());
        for (id, name) in export.names.iter().enumerate() {
            if by_name.insert(name.clone(), id as BlockId).is_some() {
                return Err(Error::BlockTable(format!(
                    "duplicate block name in export: {}",
                    name
                )));
            }
        }
        Ok(Self {
            by_name,
            by_id: export.names.clone(),
        })
    }
}

/// Serializable form of the block table; index == numeric id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTableExport {
    pub names: Vec<String>,
}
