//! Resumable depth-first traversal.
//!
//! The scanner keeps an explicit stack of `(pointer, next entry)` frames so a
//! traversal can stop after any entry and pick up exactly where it left off,
//! which is how range queries hand back results one output batch at a time.

use super::page_store::PageStore;
use super::rtree_impl::RTree;
use super::rtree_types::{Entry, NodePointer, SpatialResult};

/// What the visitor wants to happen after seeing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    /// Keep going (descend into branch entries)
    Continue,
    /// Do not descend into this branch entry
    Skip,
    /// Suspend the scan; the next `scan` call resumes after this entry
    Yield,
}

#[derive(Debug, Clone, Copy)]
struct ScanFrame {
    pointer: NodePointer,
    entry_idx: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RTreeScanner {
    stack: Vec<ScanFrame>,
}

impl RTreeScanner {
    /// Starts a traversal at `root`. An unset root yields an exhausted scanner.
    pub fn new(root: &Entry) -> Self {
        let mut scanner = Self::default();
        scanner.reset(root);
        scanner
    }

    pub fn reset(&mut self, root: &Entry) {
        self.stack.clear();
        if root.pointer.is_set() {
            self.stack.push(ScanFrame {
                pointer: root.pointer,
                entry_idx: 0,
            });
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs the traversal until `visit` yields or every entry has been seen.
    ///
    /// `visit` receives each entry together with the depth of the node that
    /// holds it (0 for the root's entries).
    pub fn scan<S, F>(&mut self, tree: &mut RTree<S>, mut visit: F) -> SpatialResult<()>
    where
        S: PageStore,
        F: FnMut(&Entry, usize) -> ScanAction,
    {
        while let Some(frame) = self.stack.last().copied() {
            let depth = self.stack.len() - 1;
            let page = frame.pointer.expect_page()?;
            let node = tree.node(page)?;

            if frame.entry_idx >= node.len() {
                self.stack.pop();
                continue;
            }

            if page.is_leaf() {
                let mut idx = frame.entry_idx;
                let mut yielded = false;
                while idx < node.len() {
                    let entry = node.entry(idx);
                    idx += 1;
                    if visit(&entry, depth) == ScanAction::Yield {
                        yielded = true;
                        break;
                    }
                }
                if let Some(top) = self.stack.last_mut() {
                    top.entry_idx = idx;
                }
                if yielded {
                    return Ok(());
                }
            } else {
                let entry = node.entry(frame.entry_idx);
                if let Some(top) = self.stack.last_mut() {
                    top.entry_idx += 1;
                }
                match visit(&entry, depth) {
                    ScanAction::Skip => {}
                    action => {
                        self.stack.push(ScanFrame {
                            pointer: entry.pointer,
                            entry_idx: 0,
                        });
                        if action == ScanAction::Yield {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::rtree::rtree_config::RTreeConfig;

    fn small_tree(rows: i64) -> RTree<crate::rtree::page_store::MemoryPageStore> {
        let mut tree = RTree::in_memory(RTreeConfig::new(4)).unwrap();
        for id in 0..rows {
            let x = id as f32;
            tree.insert(Bounds::new(x, x, x + 0.5, x + 0.5), id).unwrap();
        }
        tree
    }

    #[test]
    fn test_scan_empty_tree() {
        let mut tree = small_tree(0);
        let mut scanner = RTreeScanner::new(tree.root());
        assert!(scanner.is_exhausted());
        let mut visited = 0;
        scanner
            .scan(&mut tree, |_, _| {
                visited += 1;
                ScanAction::Continue
            })
            .unwrap();
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_scan_visits_every_row() {
        let mut tree = small_tree(30);
        let mut scanner = RTreeScanner::new(tree.root());
        let mut rows = Vec::new();
        scanner
            .scan(&mut tree, |entry, _| {
                if let NodePointer::RowId(id) = entry.pointer {
                    rows.push(id);
                }
                ScanAction::Continue
            })
            .unwrap();
        rows.sort_unstable();
        assert_eq!(rows, (0..30).collect::<Vec<_>>());
        assert!(scanner.is_exhausted());
    }

    #[test]
    fn test_scan_yield_resumes() {
        let mut tree = small_tree(30);
        let mut scanner = RTreeScanner::new(tree.root());
        let mut rows = Vec::new();
        let mut calls = 0;
        while !scanner.is_exhausted() {
            calls += 1;
            scanner
                .scan(&mut tree, |entry, _| match entry.pointer {
                    NodePointer::RowId(id) => {
                        rows.push(id);
                        ScanAction::Yield
                    }
                    _ => ScanAction::Continue,
                })
                .unwrap();
        }
        rows.sort_unstable();
        assert_eq!(rows, (0..30).collect::<Vec<_>>());
        assert!(calls >= 30);
    }

    #[test]
    fn test_scan_skip_prunes_subtrees() {
        let mut tree = small_tree(30);
        let mut scanner = RTreeScanner::new(tree.root());
        let mut rows = 0;
        scanner
            .scan(&mut tree, |entry, _| match entry.pointer {
                NodePointer::RowId(_) => {
                    rows += 1;
                    ScanAction::Continue
                }
                _ => ScanAction::Skip,
            })
            .unwrap();
        assert_eq!(rows, 0, "root is a branch, skipping it hides every row");
    }

    #[test]
    fn test_scan_reports_depth() {
        let mut tree = small_tree(30);
        let height = tree.stats().unwrap().height as usize;
        let mut scanner = RTreeScanner::new(tree.root());
        let mut max_depth = 0;
        scanner
            .scan(&mut tree, |entry, depth| {
                if entry.pointer.as_row_id().is_some() {
                    assert_eq!(depth, height - 1);
                }
                max_depth = max_depth.max(depth);
                ScanAction::Continue
            })
            .unwrap();
        assert_eq!(max_depth, height - 1);
    }
}
