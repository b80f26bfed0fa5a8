//! Dynamic insert/split helper.
//!
//! Adds a code-point sequence into the compressed trie while preserving the
//! patricia invariant: no two live siblings in one array share a first code
//! point. Records never change size in place — a node that must grow (an
//! edge promoted to terminal, or split mid-sequence) gets a replacement
//! appended to the same array chain and the old record is flagged
//! `IS_DELETED | IS_MOVED`. The terminal table is the authority for where a
//! word's node currently lives.

use tracing::{debug, debug_span};

use crate::buffer::{ExtendableBuffer, Position};

use super::node::{
    self, NodeSpec, PtNode, HAS_BIGRAMS, HAS_SHORTCUTS, IS_DELETED, IS_MOVED,
};
use super::terminals::{TerminalId, TerminalTable};
use super::{DictError, ROOT_ARRAY_POSITION};

/// Temporary node position used between id allocation and record write.
const PENDING: Position = u32::MAX;

pub enum AddOutcome {
    /// A live word came into existence (new terminal, or a tombstone
    /// resurrected). The unigram count grows.
    Added(TerminalId),
    /// An existing live word's probability was overwritten.
    Updated(TerminalId),
}

/// Read-only descent. Returns the node whose edge ends exactly at the end of
/// `word`, terminal or not; callers check `is_live_terminal()`.
pub fn find_node(
    trie: &ExtendableBuffer,
    word: &[u32],
) -> Result<Option<PtNode>, DictError> {
    if word.is_empty() {
        return Ok(None);
    }
    let mut array_pos = ROOT_ARRAY_POSITION;
    let mut rest = word;
    loop {
        let array = node::read_array(trie, array_pos)?;
        let Some(n) = array
            .nodes
            .into_iter()
            .find(|n| !n.is_moved() && n.code_points[0] == rest[0])
        else {
            return Ok(None);
        };
        let common = common_prefix(&n.code_points, rest);
        if common < n.code_points.len() {
            // Diverges (or exhausts) inside a merged edge: not stored.
            return Ok(None);
        }
        if common == rest.len() {
            return Ok(Some(n));
        }
        rest = &rest[common..];
        if !n.has_children() {
            return Ok(None);
        }
        array_pos = n.children_pos;
    }
}

/// Insert `word`, splitting edges as needed. Duplicate insertion is an
/// update, not an error.
pub fn add_word(
    trie: &mut ExtendableBuffer,
    terminals: &mut TerminalTable,
    word: &[u32],
    probability: u8,
) -> Result<AddOutcome, DictError> {
    debug_assert!(!word.is_empty());
    let _span = debug_span!("add_word", len = word.len()).entered();

    let mut array_pos = ROOT_ARRAY_POSITION;
    let mut rest = word;
    loop {
        let array = node::read_array(trie, array_pos)?;
        let matched = array
            .nodes
            .iter()
            .find(|n| !n.is_moved() && n.code_points[0] == rest[0])
            .cloned();

        let Some(n) = matched else {
            // No sibling shares the first code point: append the remainder
            // as a fresh terminal.
            let id = terminals.allocate(PENDING);
            let pos = node::append_sibling(
                trie,
                array.last_forward_field,
                &NodeSpec::leaf(rest, Some((probability, id))),
            )?;
            terminals.set_node_pos(id, pos);
            return Ok(AddOutcome::Added(id));
        };

        let common = common_prefix(&n.code_points, rest);
        if common == n.code_points.len() {
            if common == rest.len() {
                return end_of_edge(trie, terminals, array.last_forward_field, &n, probability);
            }
            // Strict prefix of the input: descend, creating the child array
            // on first use.
            rest = &rest[common..];
            if n.has_children() {
                array_pos = n.children_pos;
                continue;
            }
            let id = terminals.allocate(PENDING);
            let (child_array, positions) =
                node::append_array(trie, &[NodeSpec::leaf(rest, Some((probability, id)))])?;
            terminals.set_node_pos(id, positions[0]);
            node::write_children_pos(trie, &n, child_array);
            return Ok(AddOutcome::Added(id));
        }

        // Shared proper prefix, diverging (or exhausting) mid-edge: split.
        return split(trie, terminals, array.last_forward_field, &n, common, rest, probability);
    }
}

/// The input ends exactly at this node's edge boundary.
fn end_of_edge(
    trie: &mut ExtendableBuffer,
    terminals: &mut TerminalTable,
    last_forward_field: Position,
    n: &PtNode,
    probability: u8,
) -> Result<AddOutcome, DictError> {
    if let Some((_, id)) = n.terminal {
        if n.is_deleted() {
            // Resurrect the tombstoned word under its original id.
            node::clear_flag_bits(trie, n, IS_DELETED);
            node::write_probability(trie, n, probability);
            debug!(id, "tombstoned word resurrected");
            return Ok(AddOutcome::Added(id));
        }
        node::write_probability(trie, n, probability);
        return Ok(AddOutcome::Updated(id));
    }

    // Promote a pure prefix node to terminal. The record grows, so a
    // replacement is appended to the chain and the old one is retired.
    let id = terminals.allocate(PENDING);
    let pos = node::append_sibling(
        trie,
        last_forward_field,
        &NodeSpec {
            code_points: &n.code_points,
            children_pos: n.children_pos,
            terminal: Some((probability, id)),
            aux_flags: n.flags & (HAS_BIGRAMS | HAS_SHORTCUTS),
        },
    )?;
    terminals.set_node_pos(id, pos);
    node::set_flag_bits(trie, n, IS_DELETED | IS_MOVED);
    debug!(id, "prefix node promoted to terminal");
    Ok(AddOutcome::Added(id))
}

/// Split `n` into a shortened prefix node plus a child array holding the
/// original tail and, when the input diverges, a new remainder terminal.
fn split(
    trie: &mut ExtendableBuffer,
    terminals: &mut TerminalTable,
    last_forward_field: Position,
    n: &PtNode,
    common: usize,
    rest: &[u32],
    probability: u8,
) -> Result<AddOutcome, DictError> {
    debug_assert!(common > 0 && common < n.code_points.len());

    let tail_cps = &n.code_points[common..];
    let tail_spec = NodeSpec {
        code_points: tail_cps,
        children_pos: n.children_pos,
        terminal: n.terminal,
        // A tombstoned terminal stays tombstoned on its relocated tail.
        aux_flags: n.flags & (HAS_BIGRAMS | HAS_SHORTCUTS | IS_DELETED),
    };

    let new_id = terminals.allocate(PENDING);
    let (child_array, positions) = if common == rest.len() {
        // Input exhausted inside the edge: the prefix itself becomes the new
        // terminal; the child array holds only the tail.
        node::append_array(trie, &[tail_spec])?
    } else {
        let remainder = NodeSpec::leaf(&rest[common..], Some((probability, new_id)));
        node::append_array(trie, &[tail_spec, remainder])?
    };

    if let Some((_, old_id)) = n.terminal {
        terminals.set_node_pos(old_id, positions[0]);
    }

    let prefix_terminal = if common == rest.len() {
        Some((probability, new_id))
    } else {
        terminals.set_node_pos(new_id, positions[1]);
        None
    };
    let prefix_pos = node::append_sibling(
        trie,
        last_forward_field,
        &NodeSpec {
            code_points: &n.code_points[..common],
            children_pos: child_array,
            terminal: prefix_terminal,
            aux_flags: 0,
        },
    )?;
    if prefix_terminal.is_some() {
        terminals.set_node_pos(new_id, prefix_pos);
    }
    node::set_flag_bits(trie, n, IS_DELETED | IS_MOVED);
    debug!(new_id, common, "edge split");
    Ok(AddOutcome::Added(new_id))
}

/// Tombstone a word. Returns its terminal id, or `None` when the word is not
/// stored. Physical removal happens only at compaction.
pub fn remove_word(
    trie: &mut ExtendableBuffer,
    word: &[u32],
) -> Result<Option<TerminalId>, DictError> {
    let Some(n) = find_node(trie, word)? else {
        return Ok(None);
    };
    if !n.is_live_terminal() {
        return Ok(None);
    }
    let Some((_, id)) = n.terminal else {
        return Ok(None);
    };
    node::set_flag_bits(trie, &n, IS_DELETED);
    debug!(id, "word tombstoned");
    Ok(Some(id))
}

fn common_prefix(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
