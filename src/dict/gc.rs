//! Writing helper: tombstone accounting and mark-and-compact.
//!
//! Removal only flags records, so the buffers accumulate dead bytes until a
//! compacting flush. `compact` walks the live trie depth-first and rewrites
//! every surviving node into fresh buffers, merging the forward-link chains
//! left behind by sibling appends back into single arrays. Terminal ids do
//! not change, so bigram and shortcut cross-references keyed by id stay
//! valid; only the terminal table's positions are remapped.

use tracing::{debug, debug_span};

use crate::buffer::{ExtendableBuffer, Position, NO_POSITION};
use crate::settings::settings;

use super::node::{self, NodeSpec, PtNode, HAS_BIGRAMS, HAS_SHORTCUTS};
use super::terminals::{TerminalEntry, TerminalId, TerminalTable};
use super::{bigram, shortcut, DictError, MAX_WORD_LENGTH, ROOT_ARRAY_POSITION};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrieStats {
    pub total_nodes: usize,
    pub dead_nodes: usize,
}

impl TrieStats {
    pub fn dead_ratio(&self) -> f64 {
        if self.total_nodes == 0 {
            0.0
        } else {
            self.dead_nodes as f64 / self.total_nodes as f64
        }
    }
}

/// Depth bound for whole-tree walks: no path may carry more code points
/// than the longest storable word. Backward child links are legal (a split
/// writes the child array before its prefix node), so a crafted buffer can
/// tie a child field into a cycle; the depth bound is what catches it.
fn descend_depth(n: &PtNode, depth: usize) -> Result<usize, DictError> {
    let depth = depth + n.code_points.len();
    if depth > MAX_WORD_LENGTH {
        return Err(DictError::BadRecord {
            position: n.position,
        });
    }
    Ok(depth)
}

/// Count live and dead node records reachable from the root. Moved records
/// stay on their array chains until compaction, so this sees every record.
pub fn scan_stats(trie: &ExtendableBuffer) -> Result<TrieStats, DictError> {
    let mut stats = TrieStats::default();
    scan_array(trie, ROOT_ARRAY_POSITION, 0, &mut stats)?;
    Ok(stats)
}

fn scan_array(
    trie: &ExtendableBuffer,
    array_pos: Position,
    depth: usize,
    stats: &mut TrieStats,
) -> Result<(), DictError> {
    for n in node::read_array(trie, array_pos)?.nodes {
        stats.total_nodes += 1;
        if n.is_moved() || (n.terminal.is_some() && n.is_deleted()) {
            stats.dead_nodes += 1;
        }
        // A moved record's children belong to its replacement; counting them
        // through the stale record would double-count.
        if !n.is_moved() && n.has_children() {
            scan_array(trie, n.children_pos, descend_depth(&n, depth)?, stats)?;
        }
    }
    Ok(())
}

/// Whether a compacting flush should run before more dynamic operations.
///
/// Near the configured maximum size (and past the minimum worth compacting),
/// GC is required regardless. A caller that does not mind the blocking pass
/// (`minds_block_by_gc == false`) also gets GC once the tombstone density
/// crosses the configured ratio.
pub fn needs_gc(
    trie: &ExtendableBuffer,
    max_trie_size: u32,
    minds_block_by_gc: bool,
) -> Result<bool, DictError> {
    let s = settings();
    let tail = trie.tail_position();
    if tail >= s.capacity.min_dict_size_to_refuse_dynamic_operations
        && tail.saturating_add(s.capacity.margin_to_refuse_dynamic_operations) >= max_trie_size
    {
        return Ok(true);
    }
    if !minds_block_by_gc {
        let stats = scan_stats(trie)?;
        if stats.dead_ratio() > s.gc.dead_ratio_threshold {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Result of a compaction pass, ready to swap into the dictionary.
pub struct CompactedBuffers {
    pub trie: ExtendableBuffer,
    pub bigrams: ExtendableBuffer,
    pub shortcuts: ExtendableBuffer,
    pub terminal_entries: Vec<TerminalEntry>,
    pub unigram_count: u32,
    pub bigram_count: u32,
}

/// Rewrite the live trie and its auxiliary lists into fresh buffers.
pub fn compact(
    trie: &ExtendableBuffer,
    bigrams: &ExtendableBuffer,
    shortcuts: &ExtendableBuffer,
    terminals: &TerminalTable,
) -> Result<CompactedBuffers, DictError> {
    let _span = debug_span!("compact").entered();

    let mut new_trie = ExtendableBuffer::new();
    let mut entries = vec![TerminalEntry::default(); terminals.slot_count()];
    let mut live_ids: Vec<TerminalId> = Vec::new();

    let root = copy_array(trie, ROOT_ARRAY_POSITION, 0, &mut new_trie, &mut entries, &mut live_ids)?;
    if root.is_none() {
        node::init_root_array(&mut new_trie);
    }

    // Auxiliary entries survive only if live themselves and, for bigrams,
    // only if their target word still exists.
    let mut new_bigrams = ExtendableBuffer::new();
    new_bigrams.append_u8(0);
    let mut new_shortcuts = ExtendableBuffer::new();
    new_shortcuts.append_u8(0);
    let mut bigram_count = 0u32;

    for &id in &live_ids {
        let kept: Vec<(TerminalId, u8)> = bigram::entries(bigrams, terminals.bigram_head(id))?
            .into_iter()
            .filter(|e| {
                !e.is_deleted()
                    && entries
                        .get(e.target as usize)
                        .is_some_and(|t| t.node_pos != NO_POSITION)
            })
            .map(|e| (e.target, e.probability))
            .collect();
        bigram_count += kept.len() as u32;
        entries[id as usize].bigram_head = bigram::write_list(&mut new_bigrams, &kept);

        let kept: Vec<(Vec<u32>, u8, bool)> =
            shortcut::entries(shortcuts, terminals.shortcut_head(id))?
                .into_iter()
                .filter(|e| !e.is_deleted())
                .map(|e| (e.code_points, e.probability, e.flags & shortcut::IS_WHITELIST != 0))
                .collect();
        entries[id as usize].shortcut_head = shortcut::write_list(&mut new_shortcuts, &kept)?;
    }

    debug!(
        unigrams = live_ids.len(),
        bigrams = bigram_count,
        trie_bytes = new_trie.tail_position(),
        "compaction complete"
    );

    Ok(CompactedBuffers {
        trie: new_trie,
        bigrams: new_bigrams,
        shortcuts: new_shortcuts,
        terminal_entries: entries,
        unigram_count: live_ids.len() as u32,
        bigram_count,
    })
}

/// A node survives if it still ends a live word or leads to one. `depth` is
/// the code-point count of the path up to (not including) `n`.
fn subtree_is_live(
    trie: &ExtendableBuffer,
    n: &PtNode,
    depth: usize,
) -> Result<bool, DictError> {
    if n.is_live_terminal() {
        return Ok(true);
    }
    if !n.has_children() {
        return Ok(false);
    }
    let depth = descend_depth(n, depth)?;
    for child in node::read_array(trie, n.children_pos)?.nodes {
        if !child.is_moved() && subtree_is_live(trie, &child, depth)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Copy one logical array (chain merged into a single chunk) into the new
/// buffer. Parent arrays are written before their children so the root lands
/// at position 0; child positions are patched after recursion.
fn copy_array(
    old: &ExtendableBuffer,
    array_pos: Position,
    depth: usize,
    new: &mut ExtendableBuffer,
    entries: &mut [TerminalEntry],
    live_ids: &mut Vec<TerminalId>,
) -> Result<Option<Position>, DictError> {
    struct Kept {
        old_node: PtNode,
        keep_terminal: bool,
        children_live: bool,
    }

    let mut kept: Vec<Kept> = Vec::new();
    for n in node::read_array(old, array_pos)?.nodes {
        if n.is_moved() {
            continue;
        }
        let keep_terminal = n.is_live_terminal();
        let mut children_live = false;
        if n.has_children() {
            let below = descend_depth(&n, depth)?;
            for child in node::read_array(old, n.children_pos)?.nodes {
                if !child.is_moved() && subtree_is_live(old, &child, below)? {
                    children_live = true;
                    break;
                }
            }
        }
        if keep_terminal || children_live {
            kept.push(Kept {
                old_node: n,
                keep_terminal,
                children_live,
            });
        }
    }
    if kept.is_empty() {
        return Ok(None);
    }

    let new_array_pos = new.append_u16(kept.len() as u16);
    let mut positions = Vec::with_capacity(kept.len());
    for k in &kept {
        let terminal = if k.keep_terminal {
            k.old_node.terminal
        } else {
            None
        };
        let aux_flags = if k.keep_terminal {
            k.old_node.flags & (HAS_BIGRAMS | HAS_SHORTCUTS)
        } else {
            0
        };
        let pos = node::append_node(
            new,
            &NodeSpec {
                code_points: &k.old_node.code_points,
                children_pos: NO_POSITION, // patched below
                terminal,
                aux_flags,
            },
        )?;
        if let (true, Some((_, id))) = (k.keep_terminal, k.old_node.terminal) {
            entries[id as usize].node_pos = pos;
            live_ids.push(id);
        }
        positions.push(pos);
    }
    new.append_u32(NO_POSITION);

    for (k, &pos) in kept.iter().zip(&positions) {
        if !k.children_live {
            continue;
        }
        if let Some(child_array) = copy_array(
            old,
            k.old_node.children_pos,
            descend_depth(&k.old_node, depth)?,
            new,
            entries,
            live_ids,
        )? {
            let written = node::read_node(new, pos)?;
            node::write_children_pos(new, &written, child_array);
        }
    }

    Ok(Some(new_array_pos))
}
