//! Persistence and reliability features for R-Tree storage.
//!
//! This module provides:
//! - Index metadata captured at checkpoint and used to reload a tree
//! - Integrity reports produced by walking a tree

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::page_store::AllocatorState;
use super::rtree_constants::{MAGIC, VERSION};
use super::rtree_types::{SpatialError, SpatialResult};

// ============================================================================
// Index Metadata
// ============================================================================

/// Everything needed to reattach a tree to its page stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub magic: u32,
    pub version: u32,
    /// Raw encoded root pointer
    pub root: u64,
    pub max_node_capacity: u64,
    pub min_node_capacity: u64,
    pub entry_count: u64,
    pub branch_allocator: AllocatorState,
    pub leaf_allocator: AllocatorState,
}

impl IndexMetadata {
    pub fn to_bytes(&self) -> SpatialResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| SpatialError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> SpatialResult<Self> {
        let metadata: IndexMetadata =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
                .map(|(metadata, _)| metadata)
                .map_err(|e| SpatialError::Serialization(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::Corrupted(
                "Invalid metadata format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(SpatialError::Corrupted(format!(
                "Unsupported metadata version {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Writes the metadata next to the page files. The write goes to a
    /// sibling temp file first and is renamed into place.
    pub fn write_to(&self, path: impl AsRef<Path>) -> SpatialResult<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> SpatialResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// Integrity Checking
// ============================================================================

/// Result of integrity check operation
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total pages visited
    pub pages_checked: u64,
    /// Rows found in leaves
    pub entries_checked: u64,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            pages_checked: 0,
            entries_checked: 0,
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}
