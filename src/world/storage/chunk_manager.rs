use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::world::core::ColumnPos;
use crate::world::storage::ChunkColumn;

/// Owner of all loaded columns, with an insertion-order LRU bound.
///
/// The order list is a linked-hash style companion to the map: keys are
/// reinserted at the back on access, so the front is always the least
/// recently used column. No back-pointers, no cyclic structure.
#[derive(Debug)]
pub struct ChunkManager {
    columns: FxHashMap<ColumnPos, ChunkColumn>,
    order: VecDeque<ColumnPos>,
    max_loaded_columns: usize,
}

impl ChunkManager {
    pub fn new(max_loaded_columns: usize) -> Self {
        Self {
            columns: FxHashMap::default(),
            order: VecDeque::new(),
            max_loaded_columns: max_loaded_columns.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn max_loaded_columns(&self) -> usize {
        self.max_loaded_columns
    }

    pub fn contains(&self, pos: ColumnPos) -> bool {
        self.columns.contains_key(&pos)
    }

    /// Read access without touching LRU order.
    pub fn get(&self, pos: ColumnPos) -> Option<&ChunkColumn> {
        self.columns.get(&pos)
    }

    /// Mutable access; counts as a use for LRU purposes.
    pub fn get_mut(&mut self, pos: ColumnPos) -> Option<&mut ChunkColumn> {
        if self.columns.contains_key(&pos) {
            self.touch(pos);
        }
        self.columns.get_mut(&pos)
    }

    /// Move a key to the most-recently-used end.
    pub fn touch(&mut self, pos: ColumnPos) {
        if let Some(idx) = self.order.iter().position(|&p| p == pos) {
            self.order.remove(idx);
            self.order.push_back(pos);
        }
    }

    /// Column at `pos`, created if absent. Returns the columns evicted to
    /// stay within the LRU cap; the caller must purge their keys from every
    /// scheduler and cache and may persist them best-effort.
    pub fn load_column(&mut self, pos: ColumnPos) -> (&mut ChunkColumn, Vec<ChunkColumn>) {
        let mut evicted = Vec::new();
        if !self.columns.contains_key(&pos) {
            while self.columns.len() >= self.max_loaded_columns {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                if let Some(col) = self.columns.remove(&oldest) {
                    log::debug!(
                        "[ChunkManager::load_column] evicting column ({}, {})",
                        oldest.x,
                        oldest.z
                    );
                    evicted.push(col);
                }
            }
            self.columns.insert(pos, ChunkColumn::new(pos));
            self.order.push_back(pos);
        } else {
            self.touch(pos);
        }
        let col = self
            .columns
            .get_mut(&pos)
            .expect("column inserted or present above");
        (col, evicted)
    }

    /// Remove a column outright (distance unload).
    pub fn remove(&mut self, pos: ColumnPos) -> Option<ChunkColumn> {
        if let Some(idx) = self.order.iter().position(|&p| p == pos) {
            self.order.remove(idx);
        }
        self.columns.remove(&pos)
    }

    pub fn positions(&self) -> Vec<ColumnPos> {
        self.order.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnPos, &ChunkColumn)> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ColumnPos, &mut ChunkColumn)> {
        self.columns.iter_mut()
    }

    /// Drop every column, disposing sub-chunks.
    pub fn clear(&mut self) -> Vec<ChunkColumn> {
        self.order.clear();
        let mut out: Vec<ChunkColumn> = self.columns.drain().map(|(_, c)| c).collect();
        for col in out.iter_mut() {
            col.dispose();
        }
        out
    }
}
