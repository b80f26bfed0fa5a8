//! Terminal position table.
//!
//! Maps a terminal id — assigned when a word is created and stable across
//! compaction — to the current position of its trie node, plus the heads of
//! the word's bigram and shortcut lists. Keeping the list heads here means a
//! node can move (split, promotion, GC) without touching its side-tables,
//! and side entries can reference words by id instead of volatile position.

use serde::{Deserialize, Serialize};

use crate::buffer::{Position, NO_POSITION};

pub type TerminalId = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalEntry {
    pub node_pos: Position,
    pub bigram_head: Position,
    pub shortcut_head: Position,
}

#[derive(Debug, Clone, Default)]
pub struct TerminalTable {
    entries: Vec<TerminalEntry>,
    /// Ids whose entry is a hole (`node_pos == NO_POSITION`), reusable by
    /// the next allocation. Rebuilt wholesale by compaction.
    free: Vec<TerminalId>,
}

impl TerminalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, node_pos: Position) -> TerminalId {
        debug_assert_ne!(node_pos, NO_POSITION);
        if let Some(id) = self.free.pop() {
            self.entries[id as usize] = TerminalEntry {
                node_pos,
                ..Default::default()
            };
            return id;
        }
        let id = self.entries.len() as TerminalId;
        self.entries.push(TerminalEntry {
            node_pos,
            ..Default::default()
        });
        id
    }

    pub fn get(&self, id: TerminalId) -> Option<&TerminalEntry> {
        self.entries
            .get(id as usize)
            .filter(|e| e.node_pos != NO_POSITION)
    }

    pub fn node_pos(&self, id: TerminalId) -> Option<Position> {
        self.get(id).map(|e| e.node_pos)
    }

    pub fn set_node_pos(&mut self, id: TerminalId, node_pos: Position) {
        debug_assert_ne!(node_pos, NO_POSITION);
        self.entries[id as usize].node_pos = node_pos;
    }

    pub fn bigram_head(&self, id: TerminalId) -> Position {
        self.get(id).map_or(NO_POSITION, |e| e.bigram_head)
    }

    pub fn set_bigram_head(&mut self, id: TerminalId, head: Position) {
        self.entries[id as usize].bigram_head = head;
    }

    pub fn shortcut_head(&self, id: TerminalId) -> Position {
        self.get(id).map_or(NO_POSITION, |e| e.shortcut_head)
    }

    pub fn set_shortcut_head(&mut self, id: TerminalId, head: Position) {
        self.entries[id as usize].shortcut_head = head;
    }

    /// Replace the contents from a compacted entry vector, recomputing the
    /// free list. Trailing holes are truncated so released ids at the end do
    /// not grow the table forever.
    pub fn replace(&mut self, mut entries: Vec<TerminalEntry>) {
        while entries
            .last()
            .is_some_and(|e| e.node_pos == NO_POSITION)
        {
            entries.pop();
        }
        let free = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.node_pos == NO_POSITION)
            .map(|(i, _)| i as TerminalId)
            .collect();
        self.entries = entries;
        self.free = free;
    }

    /// Number of id slots, holes included. The compacted table is rebuilt
    /// with the same width so ids keep their meaning.
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[TerminalEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut t = TerminalTable::new();
        assert_eq!(t.allocate(10), 0);
        assert_eq!(t.allocate(20), 1);
        assert_eq!(t.node_pos(1), Some(20));
    }

    #[test]
    fn test_replace_reuses_holes() {
        let mut t = TerminalTable::new();
        t.allocate(10);
        t.allocate(20);
        t.allocate(30);
        let mut entries = t.entries().to_vec();
        entries[1] = TerminalEntry::default(); // id 1 released by compaction
        t.replace(entries);
        assert!(t.get(1).is_none());
        assert_eq!(t.allocate(40), 1);
        assert_eq!(t.node_pos(1), Some(40));
    }

    #[test]
    fn test_replace_truncates_trailing_holes() {
        let mut t = TerminalTable::new();
        t.allocate(10);
        t.allocate(20);
        let mut entries = t.entries().to_vec();
        entries[1] = TerminalEntry::default();
        t.replace(entries);
        assert_eq!(t.slot_count(), 1);
    }
}
