//! Core types and data structures for the paged R-Tree implementation.
//!
//! This module defines the fundamental types used throughout the R-Tree:
//! - Error types and result types
//! - Node pointers and their persisted 64-bit encoding
//! - Entries and their fixed-size on-page encoding
//! - Statistics and diagnostic structures

use std::io;
use thiserror::Error;

use crate::bounds::Bounds;

use super::rtree_constants::ENTRY_SIZE;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted page: {0}")]
    Corrupted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Not implemented: {0}")]
    Unsupported(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Row identifier stored in leaf entries
pub type RowId = i64;

// ============================================================================
// Pointers
// ============================================================================

const TAG_SHIFT: u32 = 56;
const PAYLOAD_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

const TAG_UNSET: u64 = 0;
const TAG_ROW_ID: u64 = 1;
const TAG_LEAF_PAGE: u64 = 2;
const TAG_BRANCH_PAGE: u64 = 3;

/// Smallest row id representable in a pointer payload
pub const MIN_ROW_ID: RowId = -(1 << 55);

/// Largest row id representable in a pointer payload
pub const MAX_ROW_ID: RowId = (1 << 55) - 1;

/// Page-store relative address of a node page. Only the low 56 bits are
/// usable since the pointer tag occupies the top byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageHandle(u64);

impl PageHandle {
    pub const MAX: u64 = PAYLOAD_MASK;

    pub fn new(raw: u64) -> SpatialResult<Self> {
        if raw > Self::MAX {
            return Err(SpatialError::Integrity(format!(
                "page handle {} does not fit in 56 bits",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// The two page pools a tree draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Leaf,
    Branch,
}

/// A pointer known to address a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub kind: PageKind,
    pub handle: PageHandle,
}

impl PageRef {
    pub fn new(kind: PageKind, handle: PageHandle) -> Self {
        Self { kind, handle }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == PageKind::Leaf
    }
}

/// Target of an entry: nothing, a table row, or a child page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodePointer {
    #[default]
    Unset,
    RowId(RowId),
    Page(PageRef),
}

impl NodePointer {
    pub fn row_id(row_id: RowId) -> Self {
        NodePointer::RowId(row_id)
    }

    pub fn leaf(handle: PageHandle) -> Self {
        NodePointer::Page(PageRef::new(PageKind::Leaf, handle))
    }

    pub fn branch(handle: PageHandle) -> Self {
        NodePointer::Page(PageRef::new(PageKind::Branch, handle))
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, NodePointer::Unset)
    }

    pub fn as_page(&self) -> Option<PageRef> {
        match self {
            NodePointer::Page(page) => Some(*page),
            _ => None,
        }
    }

    pub fn as_row_id(&self) -> Option<RowId> {
        match self {
            NodePointer::RowId(row_id) => Some(*row_id),
            _ => None,
        }
    }

    /// Dereference guard: a row id or unset pointer can never address a page.
    pub fn expect_page(&self) -> SpatialResult<PageRef> {
        self.as_page().ok_or_else(|| {
            SpatialError::Integrity(format!("cannot dereference non-page pointer {:?}", self))
        })
    }

    /// Persisted encoding: tag in the top 8 bits, payload in the low 56.
    pub fn to_raw(&self) -> u64 {
        match self {
            NodePointer::Unset => 0,
            NodePointer::RowId(row_id) => (TAG_ROW_ID << TAG_SHIFT) | (*row_id as u64 & PAYLOAD_MASK),
            NodePointer::Page(page) => {
                let tag = match page.kind {
                    PageKind::Leaf => TAG_LEAF_PAGE,
                    PageKind::Branch => TAG_BRANCH_PAGE,
                };
                (tag << TAG_SHIFT) | page.handle.get()
            }
        }
    }

    pub fn from_raw(raw: u64) -> SpatialResult<Self> {
        let payload = raw & PAYLOAD_MASK;
        match raw >> TAG_SHIFT {
            TAG_UNSET if payload == 0 => Ok(NodePointer::Unset),
            // sign-extend the 56-bit payload
            TAG_ROW_ID => Ok(NodePointer::RowId(((payload << 8) as i64) >> 8)),
            TAG_LEAF_PAGE => Ok(NodePointer::leaf(PageHandle(payload))),
            TAG_BRANCH_PAGE => Ok(NodePointer::branch(PageHandle(payload))),
            _ => Err(SpatialError::Integrity(format!(
                "invalid node pointer encoding {:#018x}",
                raw
            ))),
        }
    }
}

// ============================================================================
// Entries
// ============================================================================

/// A (pointer, bounds) pair stored in a node.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Entry {
    pub pointer: NodePointer,
    pub bounds: Bounds,
}

impl Entry {
    pub fn new(pointer: NodePointer, bounds: Bounds) -> Self {
        Self { pointer, bounds }
    }

    pub fn row(bounds: Bounds, row_id: RowId) -> Self {
        Self::new(NodePointer::RowId(row_id), bounds)
    }

    pub fn is_set(&self) -> bool {
        self.pointer.is_set()
    }

    /// Writes the 24-byte little-endian record into `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ENTRY_SIZE);
        buf[0..8].copy_from_slice(&self.pointer.to_raw().to_le_bytes());
        buf[8..12].copy_from_slice(&self.bounds.min.x.to_le_bytes());
        buf[12..16].copy_from_slice(&self.bounds.min.y.to_le_bytes());
        buf[16..20].copy_from_slice(&self.bounds.max.x.to_le_bytes());
        buf[20..24].copy_from_slice(&self.bounds.max.y.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> SpatialResult<Self> {
        if buf.len() < ENTRY_SIZE {
            return Err(SpatialError::Corrupted(format!(
                "entry record truncated to {} bytes",
                buf.len()
            )));
        }
        let word = |at: usize| [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[0..8]);
        let pointer = NodePointer::from_raw(u64::from_le_bytes(raw))?;
        let bounds = Bounds::new(
            f32::from_le_bytes(word(8)),
            f32::from_le_bytes(word(12)),
            f32::from_le_bytes(word(16)),
            f32::from_le_bytes(word(20)),
        );
        Ok(Self { pointer, bounds })
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Shape of a tree, gathered by walking every reachable page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RTreeStats {
    pub entry_count: u64,
    pub leaf_pages: u64,
    pub branch_pages: u64,
    /// Number of page levels, 0 for an empty tree
    pub height: u32,
    pub in_memory_size: usize,
}

/// Counters kept by file-backed page stores
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageStoreStats {
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// One row of an index dump: every visited entry with its depth.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpRow {
    pub level: usize,
    pub bounds: Bounds,
    /// Set only for leaf entries
    pub row_id: Option<RowId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_raw_tags() {
        assert_eq!(NodePointer::Unset.to_raw(), 0);
        assert_eq!(NodePointer::row_id(5).to_raw() >> 56, 1);
        let leaf = NodePointer::leaf(PageHandle::new(7).unwrap());
        assert_eq!(leaf.to_raw(), (2u64 << 56) | 7);
        let branch = NodePointer::branch(PageHandle::new(9).unwrap());
        assert_eq!(branch.to_raw(), (3u64 << 56) | 9);
    }

    #[test]
    fn test_pointer_raw_decode() {
        for pointer in [
            NodePointer::Unset,
            NodePointer::row_id(0),
            NodePointer::row_id(42),
            NodePointer::row_id(-1),
            NodePointer::row_id(MIN_ROW_ID),
            NodePointer::row_id(MAX_ROW_ID),
            NodePointer::leaf(PageHandle::new(PageHandle::MAX).unwrap()),
            NodePointer::branch(PageHandle::new(0).unwrap()),
        ] {
            assert_eq!(NodePointer::from_raw(pointer.to_raw()).unwrap(), pointer);
        }
    }

    #[test]
    fn test_pointer_invalid_tag_rejected() {
        assert!(matches!(
            NodePointer::from_raw(4u64 << 56),
            Err(SpatialError::Integrity(_))
        ));
        assert!(NodePointer::from_raw(12).is_err());
    }

    #[test]
    fn test_page_handle_range() {
        assert!(PageHandle::new(PageHandle::MAX).is_ok());
        assert!(PageHandle::new(PageHandle::MAX + 1).is_err());
    }

    #[test]
    fn test_expect_page() {
        assert!(NodePointer::row_id(1).expect_page().is_err());
        assert!(NodePointer::Unset.expect_page().is_err());
        let page = NodePointer::leaf(PageHandle::new(3).unwrap())
            .expect_page()
            .unwrap();
        assert!(page.is_leaf());
    }

    #[test]
    fn test_entry_encoding_layout() {
        let entry = Entry::row(Bounds::new(1.0, 2.0, 3.0, 4.0), 77);
        let mut buf = [0u8; ENTRY_SIZE];
        entry.encode(&mut buf);
        assert_eq!(&buf[0..8], &((1u64 << 56) | 77).to_le_bytes());
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&buf[20..24], &4.0f32.to_le_bytes());
        assert_eq!(Entry::decode(&buf).unwrap(), entry);
    }

    #[test]
    fn test_zeroed_record_is_unset() {
        let entry = Entry::decode(&[0u8; ENTRY_SIZE]).unwrap();
        assert!(!entry.is_set());
    }
}
