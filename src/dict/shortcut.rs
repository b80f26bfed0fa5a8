//! Shortcut list policy.
//!
//! A shortcut maps an alternate spelling (a full code-point sequence) onto
//! an existing terminal — the "autocorrect this to that" side-table. Same
//! buffer-and-linked-list lifecycle as bigrams; the list head lives in the
//! terminal table. Entry layout:
//!
//! ```text
//! flags: u8        (HAS_NEXT, IS_DELETED, IS_WHITELIST)
//! probability: u8
//! code points: u8 count, then count × u24
//! next: u32        (0 = end of list)
//! ```

use tracing::debug;

use crate::buffer::{ExtendableBuffer, Position, NO_POSITION};

use super::terminals::{TerminalId, TerminalTable};
use super::DictError;

pub const HAS_NEXT: u8 = 0x80;
pub const IS_DELETED: u8 = 0x40;
pub const IS_WHITELIST: u8 = 0x20;

#[derive(Debug, Clone)]
pub struct ShortcutEntry {
    pub position: Position,
    pub flags: u8,
    pub probability: u8,
    pub code_points: Vec<u32>,
    pub next: Position,
}

impl ShortcutEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & IS_DELETED != 0
    }

    pub fn is_whitelist(&self) -> bool {
        self.flags & IS_WHITELIST != 0
    }

    fn next_field_pos(&self) -> Position {
        self.position + 3 + 3 * self.code_points.len() as Position
    }
}

pub fn read_entry(buf: &ExtendableBuffer, pos: Position) -> Result<ShortcutEntry, DictError> {
    let flags = buf.read_u8(pos)?;
    let probability = buf.read_u8(pos + 1)?;
    let count = buf.read_u8(pos + 2)?;
    if count == 0 {
        return Err(DictError::BadRecord { position: pos });
    }
    let mut code_points = Vec::with_capacity(count as usize);
    let mut p = pos + 3;
    for _ in 0..count {
        code_points.push(buf.read_u24(p)?);
        p += 3;
    }
    let next = buf.read_u32(p)?;
    if next != NO_POSITION && next <= pos {
        return Err(DictError::BadRecord { position: pos });
    }
    if (flags & HAS_NEXT != 0) != (next != NO_POSITION) {
        return Err(DictError::BadRecord { position: pos });
    }
    Ok(ShortcutEntry {
        position: pos,
        flags,
        probability,
        code_points,
        next,
    })
}

fn append_entry(
    buf: &mut ExtendableBuffer,
    code_points: &[u32],
    probability: u8,
    whitelist: bool,
) -> Position {
    let flags = if whitelist { IS_WHITELIST } else { 0 };
    let pos = buf.append_u8(flags);
    buf.append_u8(probability);
    buf.append_u8(code_points.len() as u8);
    for &cp in code_points {
        buf.append_u24(cp);
    }
    buf.append_u32(NO_POSITION);
    pos
}

/// Every entry of a list, tombstoned ones included. Used by compaction.
pub fn entries(buf: &ExtendableBuffer, head: Position) -> Result<Vec<ShortcutEntry>, DictError> {
    let mut out = Vec::new();
    let mut pos = head;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        pos = entry.next;
        out.push(entry);
    }
    Ok(out)
}

/// Live shortcuts of a terminal, in list order.
pub fn live_entries(
    buf: &ExtendableBuffer,
    terminals: &TerminalTable,
    id: TerminalId,
) -> Result<Vec<ShortcutEntry>, DictError> {
    let mut out = entries(buf, terminals.shortcut_head(id))?;
    out.retain(|e| !e.is_deleted());
    Ok(out)
}

/// Add or update a shortcut spelling for `id`. Returns `true` when a live
/// entry was created, `false` on an in-place update.
pub fn add(
    buf: &mut ExtendableBuffer,
    terminals: &mut TerminalTable,
    id: TerminalId,
    code_points: &[u32],
    probability: u8,
    whitelist: bool,
) -> Result<bool, DictError> {
    let head = terminals.shortcut_head(id);
    let mut pos = head;
    let mut tail = NO_POSITION;
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        if entry.code_points == code_points {
            let resurrected = entry.is_deleted();
            let mut flags = entry.flags & !IS_DELETED & !IS_WHITELIST;
            if whitelist {
                flags |= IS_WHITELIST;
            }
            buf.write_u8(entry.position, flags);
            buf.write_u8(entry.position + 1, probability);
            return Ok(resurrected);
        }
        tail = pos;
        pos = entry.next;
    }

    let new_pos = append_entry(buf, code_points, probability, whitelist);
    if tail == NO_POSITION {
        terminals.set_shortcut_head(id, new_pos);
    } else {
        let tail_entry = read_entry(buf, tail)?;
        buf.write_u8(tail, tail_entry.flags | HAS_NEXT);
        buf.write_u32(tail_entry.next_field_pos(), new_pos);
    }
    debug!(id, probability, "shortcut appended");
    Ok(true)
}

/// Write a fresh list of live entries, linking as it goes. Used by
/// compaction when rewriting a terminal's surviving shortcuts.
pub(super) fn write_list(
    buf: &mut ExtendableBuffer,
    items: &[(Vec<u32>, u8, bool)],
) -> Result<Position, DictError> {
    let mut head = NO_POSITION;
    let mut prev = NO_POSITION;
    for (code_points, probability, whitelist) in items {
        let pos = append_entry(buf, code_points, *probability, *whitelist);
        if prev == NO_POSITION {
            head = pos;
        } else {
            let prev_entry = read_entry(buf, prev)?;
            buf.write_u8(prev, prev_entry.flags | HAS_NEXT);
            buf.write_u32(prev_entry.next_field_pos(), pos);
        }
        prev = pos;
    }
    Ok(head)
}

/// Tombstone a shortcut spelling. Returns `false` when no live entry matches.
pub fn remove(
    buf: &mut ExtendableBuffer,
    terminals: &TerminalTable,
    id: TerminalId,
    code_points: &[u32],
) -> Result<bool, DictError> {
    let mut pos = terminals.shortcut_head(id);
    while pos != NO_POSITION {
        let entry = read_entry(buf, pos)?;
        if entry.code_points == code_points && !entry.is_deleted() {
            buf.write_u8(entry.position, entry.flags | IS_DELETED);
            return Ok(true);
        }
        pos = entry.next;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ExtendableBuffer, TerminalTable) {
        let mut buf = ExtendableBuffer::new();
        buf.append_u8(0);
        let mut terminals = TerminalTable::new();
        terminals.allocate(100);
        (buf, terminals)
    }

    #[test]
    fn test_add_list_and_update() {
        let (mut buf, mut terminals) = setup();
        assert!(add(&mut buf, &mut terminals, 0, &[116, 104], 50, false).unwrap());
        assert!(add(&mut buf, &mut terminals, 0, &[116, 101, 104], 60, true).unwrap());
        assert!(!add(&mut buf, &mut terminals, 0, &[116, 104], 70, false).unwrap());

        let live = live_entries(&buf, &terminals, 0).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].code_points, vec![116, 104]);
        assert_eq!(live[0].probability, 70);
        assert!(!live[0].is_whitelist());
        assert!(live[1].is_whitelist());
    }

    #[test]
    fn test_remove_and_resurrect() {
        let (mut buf, mut terminals) = setup();
        add(&mut buf, &mut terminals, 0, &[97], 50, false).unwrap();
        assert!(remove(&mut buf, &terminals, 0, &[97]).unwrap());
        assert!(live_entries(&buf, &terminals, 0).unwrap().is_empty());
        assert!(!remove(&mut buf, &terminals, 0, &[97]).unwrap());

        assert!(add(&mut buf, &mut terminals, 0, &[97], 55, true).unwrap());
        let live = live_entries(&buf, &terminals, 0).unwrap();
        assert_eq!(live.len(), 1);
        assert!(live[0].is_whitelist());
    }
}
