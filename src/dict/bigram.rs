//! Bigram list policy.
//!
//! Each terminal owns a singly linked list of bigram entries in the bigram
//! buffer: "this word is plausibly followed by target with probability P".
//! The list head lives in the terminal table; entries reference their target
//! by terminal id, so neither end of the link cares where the trie nodes
//! physically live. Entry layout:
//!
//! ```text
//! flags: u8        (HAS_NEXT, IS_DELETED)
//! target id: u32
//! probability: u8
//! next: u32        (0 = end of list; always present so tail append can link)
//! ```

use tracing::debug;

use crate::buffer::{ExtendableBuffer, Position, NO_POSITION};

use super::terminals::{TerminalId, TerminalTable};
use super::DictError;

pub const HAS_NEXT: u8 = 0x80;
pub const IS_DELETED: u8 = 0x40;

const NEXT_FIELD_OFFSET: Position = 6;

#[derive(Debug, Clone)]
pub struct BigramEntry {
    pub position: Position,
    pub flags: u8,
    pub target: TerminalId,
    pub probability: u8,
    pub next: Position,
}

impl BigramEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & IS_DELETED != 0
    }
}

pub fn read_entry(buf: &ExtendableBuffer, pos: Position) -> Result<BigramEntry, DictError> {
    let flags = buf.read_u8(pos)?;
    let target = buf.read_u32(pos + 1)?;
    let probability = buf.read_u8(pos + 5)?;
    let next = buf.read_u32(pos + NEXT_FIELD_OFFSET)?;
    // Entries only ever link forward; a backward link is corruption.
    if next != NO_POSITION && next <= pos {
        return Err(DictError::BadRecord { position: pos });
    }
    if (flags & HAS_NEXT != 0) != (next != NO_POSITION) {
        return Err(DictError::BadRecord { position: pos });
    }
    Ok(BigramEntry {
        position: pos,
        flags,
        target,
        probability,
        next,
    })
}

fn append_entry(buf: &mut ExtendableBuffer, target: TerminalId, probability: u8) -> Position {
    let pos = buf.append_u8(0);
    buf.append_u32(target);
    buf.append_u8(probability);
    buf.append_u32(NO_POSITION);
    pos
}

/// Every entry of a list, tombstoned ones included. Used by compaction.
pub fn entries(buf: &ExtendableBuffer, head: Position) -> Result<Vec<BigramEntry>, DictError> {
    let mut out = Vec::new();
    let mut pos = head;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        pos = entry.next;
        out.push(entry);
    }
    Ok(out)
}

/// Visit live entries only, in list order.
pub fn for_each_live(
    buf: &ExtendableBuffer,
    head: Position,
    mut f: impl FnMut(TerminalId, u8),
) -> Result<(), DictError> {
    let mut pos = head;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        if !entry.is_deleted() {
            f(entry.target, entry.probability);
        }
        pos = entry.next;
    }
    Ok(())
}

pub fn find(
    buf: &ExtendableBuffer,
    head: Position,
    target: TerminalId,
) -> Result<Option<BigramEntry>, DictError> {
    let mut pos = head;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        if entry.target == target && !entry.is_deleted() {
            return Ok(Some(entry));
        }
        pos = entry.next;
    }
    Ok(None)
}

/// Probability of `prev → target` if a live entry exists.
pub fn probability(
    buf: &ExtendableBuffer,
    terminals: &TerminalTable,
    prev: TerminalId,
    target: TerminalId,
) -> Result<Option<u8>, DictError> {
    Ok(find(buf, terminals.bigram_head(prev), target)?.map(|e| e.probability))
}

/// Add or update `prev → target`. Returns `true` when a live entry was
/// created (new or resurrected), `false` on an in-place probability update.
pub fn add(
    buf: &mut ExtendableBuffer,
    terminals: &mut TerminalTable,
    prev: TerminalId,
    target: TerminalId,
    probability: u8,
) -> Result<bool, DictError> {
    let head = terminals.bigram_head(prev);
    let mut pos = head;
    let mut tail = NO_POSITION;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        if entry.target == target {
            let resurrected = entry.is_deleted();
            buf.write_u8(entry.position, entry.flags & !IS_DELETED);
            buf.write_u8(entry.position + 5, probability);
            return Ok(resurrected);
        }
        tail = pos;
        pos = entry.next;
    }

    let new_pos = append_entry(buf, target, probability);
    if tail == NO_POSITION {
        terminals.set_bigram_head(prev, new_pos);
    } else {
        let tail_flags = buf.read_u8(tail)?;
        buf.write_u8(tail, tail_flags | HAS_NEXT);
        buf.write_u32(tail + NEXT_FIELD_OFFSET, new_pos);
    }
    debug!(prev, target, probability, "bigram appended");
    Ok(true)
}

/// Write a fresh list of live entries, linking as it goes. Used by
/// compaction when rewriting a terminal's surviving bigrams.
pub(super) fn write_list(
    buf: &mut ExtendableBuffer,
    items: &[(TerminalId, u8)],
) -> Position {
    let mut head = NO_POSITION;
    let mut prev = NO_POSITION;
    for &(target, probability) in items {
        let pos = append_entry(buf, target, probability);
        if prev == NO_POSITION {
            head = pos;
        } else {
            buf.write_u8(prev, HAS_NEXT);
            buf.write_u32(prev + NEXT_FIELD_OFFSET, pos);
        }
        prev = pos;
    }
    head
}

/// Tombstone `prev → target`. Returns `false` when no live entry matches.
pub fn remove(
    buf: &mut ExtendableBuffer,
    terminals: &TerminalTable,
    prev: TerminalId,
    target: TerminalId,
) -> Result<bool, DictError> {
    match find(buf, terminals.bigram_head(prev), target)? {
        Some(entry) => {
            buf.write_u8(entry.position, entry.flags | IS_DELETED);
            debug!(prev, target, "bigram tombstoned");
            Ok(true)
        }
        None => Ok(false),
    }
}
