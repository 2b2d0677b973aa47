//! Constants for the paged R-Tree implementation.

/// Default maximum number of entries per node
pub const DEFAULT_MAX_NODE_CAPACITY: usize = 64;

/// Smallest permitted `max_node_capacity`
pub const MIN_ALLOWED_NODE_CAPACITY: usize = 4;

/// Largest permitted `max_node_capacity`
pub const MAX_ALLOWED_NODE_CAPACITY: usize = 255;

/// Default minimum fill as a fraction of the maximum capacity (40%)
pub const DEFAULT_MIN_FILL_RATIO: f64 = 0.4;

/// Serialized size of one entry: pointer (8) + four f32 coordinates (16)
pub const ENTRY_SIZE: usize = 24;

/// Node page header: entry count (u32) + CRC32 of the entry region (u32)
pub const NODE_HEADER_SIZE: usize = 8;

/// Size of the fixed header at the start of a page file
pub const FILE_HEADER_SIZE: usize = 64;

/// Default cache size in number of pages for file-backed stores
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Magic number for page file identification
pub const MAGIC: u32 = 0x53525450; // "SRTP" - spatial R-Tree pages

/// Page file and metadata format version
pub const VERSION: u32 = 1;

/// Default number of output rows produced per scan call
pub const DEFAULT_SCAN_BATCH: usize = 2048;

/// Entries a spill collection keeps in memory before writing to its temp file
pub const DEFAULT_SPILL_MEMORY_ENTRIES: usize = 64 * 1024;

/// File names used by directory-backed indexes
pub const BRANCH_PAGES_FILE: &str = "branch.pages";
pub const LEAF_PAGES_FILE: &str = "leaf.pages";
pub const METADATA_FILE: &str = "index.meta";
