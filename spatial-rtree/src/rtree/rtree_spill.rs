//! Append-only entry sequence that overflows to an anonymous temp file.
//!
//! Bulk loading writes one entry per sealed page of a layer and reads the
//! layer back in order to build the next one. Small layers never touch the
//! disk; large ones keep their first `memory_limit` entries in memory and
//! append the rest as fixed 24-byte records.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use super::rtree_constants::{DEFAULT_SPILL_MEMORY_ENTRIES, ENTRY_SIZE};
use super::rtree_types::{Entry, SpatialResult};

/// Records buffered before they are written to the spill file
const WRITE_BATCH: usize = 256;

/// Read position of a scan over a [`SpillCollection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SpillScanState {
    position: u64,
}

#[derive(Debug)]
pub struct SpillCollection {
    memory_limit: usize,
    memory: Vec<Entry>,
    file: Option<File>,
    /// Encoded records not yet written to `file`
    pending: Vec<u8>,
    spilled: u64,
}

impl Default for SpillCollection {
    fn default() -> Self {
        Self::new(DEFAULT_SPILL_MEMORY_ENTRIES)
    }
}

impl SpillCollection {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            memory: Vec::new(),
            file: None,
            pending: Vec::new(),
            spilled: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.memory.len() as u64 + self.spilled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries stored in the temp file
    pub fn spilled(&self) -> u64 {
        self.spilled
    }

    pub fn append(&mut self, entry: Entry) -> SpatialResult<()> {
        if self.spilled == 0 && self.memory.len() < self.memory_limit {
            self.memory.push(entry);
            return Ok(());
        }

        let offset = self.pending.len();
        self.pending.resize(offset + ENTRY_SIZE, 0);
        entry.encode(&mut self.pending[offset..]);
        self.spilled += 1;
        if self.pending.len() >= WRITE_BATCH * ENTRY_SIZE {
            self.write_pending()?;
        }
        Ok(())
    }

    /// Appends up to `max` entries following `state` to `output` and returns
    /// how many were read. Fewer than `max` means the end was reached.
    pub fn scan(
        &mut self,
        state: &mut SpillScanState,
        output: &mut Vec<Entry>,
        max: usize,
    ) -> SpatialResult<usize> {
        let mut read = 0;

        let in_memory = self.memory.len() as u64;
        if state.position < in_memory {
            let start = state.position as usize;
            let end = (start + max).min(self.memory.len());
            output.extend_from_slice(&self.memory[start..end]);
            read = end - start;
            state.position += read as u64;
        }

        let wanted = (max - read) as u64;
        let available = self.len().saturating_sub(state.position);
        let count = wanted.min(available) as usize;
        if count == 0 {
            return Ok(read);
        }

        self.write_pending()?;
        let Some(file) = self.file.as_mut() else {
            return Ok(read);
        };
        let record = (state.position - in_memory) * ENTRY_SIZE as u64;
        file.seek(SeekFrom::Start(record))?;
        let mut buf = vec![0u8; count * ENTRY_SIZE];
        file.read_exact(&mut buf)?;
        for chunk in buf.chunks_exact(ENTRY_SIZE) {
            output.push(Entry::decode(chunk)?);
        }
        state.position += count as u64;
        Ok(read + count)
    }

    /// Drops every entry. The temp file is truncated and kept for reuse.
    pub fn clear(&mut self) -> SpatialResult<()> {
        self.memory.clear();
        self.pending.clear();
        self.spilled = 0;
        if let Some(file) = self.file.as_mut() {
            file.set_len(0)?;
        }
        Ok(())
    }

    fn write_pending(&mut self) -> SpatialResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                log::trace!("Spilling bulk load entries to a temp file");
                self.file.insert(tempfile::tempfile()?)
            }
        };
        file.seek(SeekFrom::End(0))?;
        file.write_all(&self.pending)?;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::rtree::rtree_types::NodePointer;

    fn row(id: i64) -> Entry {
        let x = id as f32;
        Entry::row(Bounds::new(x, -x, x + 1.0, -x + 1.0), id)
    }

    fn drain(collection: &mut SpillCollection, batch: usize) -> Vec<Entry> {
        let mut state = SpillScanState::default();
        let mut out = Vec::new();
        loop {
            let n = collection.scan(&mut state, &mut out, batch).unwrap();
            if n < batch {
                return out;
            }
        }
    }

    #[test]
    fn test_in_memory_only() {
        let mut collection = SpillCollection::new(100);
        for id in 0..50 {
            collection.append(row(id)).unwrap();
        }
        assert_eq!(collection.len(), 50);
        assert_eq!(collection.spilled(), 0);
        let entries = drain(&mut collection, 7);
        assert_eq!(entries, (0..50).map(row).collect::<Vec<_>>());
    }

    #[test]
    fn test_spills_past_memory_limit() {
        let mut collection = SpillCollection::new(10);
        for id in 0..1000 {
            collection.append(row(id)).unwrap();
        }
        assert_eq!(collection.len(), 1000);
        assert_eq!(collection.spilled(), 990);

        let entries = drain(&mut collection, 64);
        assert_eq!(entries.len(), 1000);
        for (id, entry) in entries.iter().enumerate() {
            assert_eq!(entry.pointer, NodePointer::row_id(id as i64));
            assert_eq!(*entry, row(id as i64));
        }
    }

    #[test]
    fn test_scan_across_boundary() {
        let mut collection = SpillCollection::new(3);
        for id in 0..6 {
            collection.append(row(id)).unwrap();
        }
        let mut state = SpillScanState::default();
        let mut out = Vec::new();
        assert_eq!(collection.scan(&mut state, &mut out, 4).unwrap(), 4);
        assert_eq!(collection.scan(&mut state, &mut out, 4).unwrap(), 2);
        assert_eq!(collection.scan(&mut state, &mut out, 4).unwrap(), 0);
        assert_eq!(out, (0..6).map(row).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut collection = SpillCollection::new(2);
        for id in 0..20 {
            collection.append(row(id)).unwrap();
        }
        drain(&mut collection, 5);
        collection.clear().unwrap();
        assert!(collection.is_empty());

        for id in 100..105 {
            collection.append(row(id)).unwrap();
        }
        assert_eq!(drain(&mut collection, 3), (100..105).map(row).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_memory_limit() {
        let mut collection = SpillCollection::new(0);
        collection.append(row(1)).unwrap();
        assert_eq!(collection.spilled(), 1);
        assert_eq!(drain(&mut collection, 4), vec![row(1)]);
    }
}
