//! Trie node and node-array codec.
//!
//! Node record layout (all integers little-endian):
//!
//! ```text
//! flags: u8
//! code points: u8 count (only when HAS_MULTIPLE_CODE_POINTS), then count × u24
//! child array position: u32 (0 = none; always present so a leaf can gain
//!                            children without relocating the record)
//! probability: u8          (only when IS_TERMINAL)
//! terminal id: u32         (only when IS_TERMINAL)
//! ```
//!
//! A node array is a chain of chunks, each `count: u16` followed by `count`
//! node records and a forward-link u32 to the next chunk (0 = end). Sibling
//! appends add a single-node chunk at the buffer tail and patch the previous
//! forward link, so records never move on insert. Forward links are strictly
//! increasing; a link that points backwards fails validation.

use crate::buffer::{ExtendableBuffer, Position, NO_POSITION};

use super::terminals::TerminalId;
use super::DictError;

pub const IS_DELETED: u8 = 0x80;
pub const IS_MOVED: u8 = 0x40;
pub const IS_TERMINAL: u8 = 0x20;
pub const HAS_CHILDREN: u8 = 0x10;
pub const HAS_BIGRAMS: u8 = 0x08;
pub const HAS_SHORTCUTS: u8 = 0x04;
pub const HAS_MULTIPLE_CODE_POINTS: u8 = 0x02;

const MAX_CODE_POINT: u32 = 0x10ffff;

/// A decoded trie node plus the field offsets needed for in-place patching.
#[derive(Debug, Clone)]
pub struct PtNode {
    pub position: Position,
    pub flags: u8,
    pub code_points: Vec<u32>,
    pub children_pos: Position,
    /// `(probability, terminal id)` when the terminal fields are present.
    pub terminal: Option<(u8, TerminalId)>,
    /// Offset of the child-array field.
    pub child_field_pos: Position,
    /// First byte past this record (the next sibling in the chunk).
    pub end_position: Position,
}

impl PtNode {
    /// Tombstoned word: the record stays live trie structure, but it no
    /// longer represents a stored word.
    pub fn is_deleted(&self) -> bool {
        self.flags & IS_DELETED != 0
    }

    /// Structurally dead record, superseded by a copy later in the same
    /// array chain. Skipped by every traversal.
    pub fn is_moved(&self) -> bool {
        self.flags & IS_MOVED != 0
    }

    /// Live terminal: represents a stored word right now.
    pub fn is_live_terminal(&self) -> bool {
        self.flags & IS_TERMINAL != 0 && !self.is_deleted() && !self.is_moved()
    }

    pub fn has_children(&self) -> bool {
        self.children_pos != NO_POSITION
    }

    /// Offset of the probability byte. Only meaningful when terminal fields
    /// are present.
    pub fn probability_field_pos(&self) -> Position {
        self.child_field_pos + 4
    }
}

/// Expansion candidate returned to the ranking layer.
#[derive(Debug, Clone)]
pub struct ChildNode {
    pub position: Position,
    pub code_points: Vec<u32>,
    pub child_array_pos: Option<Position>,
    /// `Some` when this edge ends a live stored word.
    pub probability: Option<u8>,
}

pub fn read_node(buf: &ExtendableBuffer, pos: Position) -> Result<PtNode, DictError> {
    let flags = buf.read_u8(pos)?;
    let mut p = pos + 1;

    let count = if flags & HAS_MULTIPLE_CODE_POINTS != 0 {
        let c = buf.read_u8(p)?;
        p += 1;
        if c < 2 {
            return Err(DictError::BadRecord { position: pos });
        }
        c as usize
    } else {
        1
    };

    let mut code_points = Vec::with_capacity(count);
    for _ in 0..count {
        let cp = buf.read_u24(p)?;
        p += 3;
        if cp == 0 || cp > MAX_CODE_POINT {
            return Err(DictError::BadRecord { position: pos });
        }
        code_points.push(cp);
    }

    let child_field_pos = p;
    let children_pos = buf.read_u32(p)?;
    p += 4;

    let terminal = if flags & IS_TERMINAL != 0 {
        let probability = buf.read_u8(p)?;
        let terminal_id = buf.read_u32(p + 1)?;
        p += 5;
        Some((probability, terminal_id))
    } else {
        None
    };

    Ok(PtNode {
        position: pos,
        flags,
        code_points,
        children_pos,
        terminal,
        child_field_pos,
        end_position: p,
    })
}

/// A fully read logical node array (every chunk of the chain, in order).
#[derive(Debug)]
pub struct NodeArray {
    pub nodes: Vec<PtNode>,
    /// Forward-link field of the last chunk; patched when a sibling chunk is
    /// appended.
    pub last_forward_field: Position,
}

pub fn read_array(buf: &ExtendableBuffer, array_pos: Position) -> Result<NodeArray, DictError> {
    let mut nodes = Vec::new();
    let mut chunk_pos = array_pos;
    loop {
        let count = buf.read_u16(chunk_pos)?;
        let mut p = chunk_pos + 2;
        for _ in 0..count {
            let node = read_node(buf, p)?;
            p = node.end_position;
            nodes.push(node);
        }
        let forward = buf.read_u32(p)?;
        if forward == NO_POSITION {
            return Ok(NodeArray {
                nodes,
                last_forward_field: p,
            });
        }
        if forward <= p {
            return Err(DictError::BadRecord { position: p });
        }
        chunk_pos = forward;
    }
}

/// What to write for a new node record.
pub struct NodeSpec<'a> {
    pub code_points: &'a [u32],
    pub children_pos: Position,
    pub terminal: Option<(u8, TerminalId)>,
    /// Extra flag bits to carry over when a record is rewritten during a
    /// move or compaction: `HAS_BIGRAMS`, `HAS_SHORTCUTS`, and `IS_DELETED`
    /// for a tombstoned terminal that relocates before GC runs.
    pub aux_flags: u8,
}

impl<'a> NodeSpec<'a> {
    pub fn leaf(code_points: &'a [u32], terminal: Option<(u8, TerminalId)>) -> Self {
        Self {
            code_points,
            children_pos: NO_POSITION,
            terminal,
            aux_flags: 0,
        }
    }
}

fn flags_for(spec: &NodeSpec) -> u8 {
    let mut flags = spec.aux_flags & (HAS_BIGRAMS | HAS_SHORTCUTS | IS_DELETED);
    if spec.code_points.len() > 1 {
        flags |= HAS_MULTIPLE_CODE_POINTS;
    }
    if spec.children_pos != NO_POSITION {
        flags |= HAS_CHILDREN;
    }
    if spec.terminal.is_some() {
        flags |= IS_TERMINAL;
    }
    flags
}

/// Append a single node record at the buffer tail. Returns its position.
pub fn append_node(buf: &mut ExtendableBuffer, spec: &NodeSpec) -> Result<Position, DictError> {
    debug_assert!(!spec.code_points.is_empty());
    if spec.code_points.len() > u8::MAX as usize {
        return Err(DictError::WordTooLong);
    }
    let pos = buf.append_u8(flags_for(spec));
    if spec.code_points.len() > 1 {
        buf.append_u8(spec.code_points.len() as u8);
    }
    for &cp in spec.code_points {
        buf.append_u24(cp);
    }
    buf.append_u32(spec.children_pos);
    if let Some((probability, terminal_id)) = spec.terminal {
        buf.append_u8(probability);
        buf.append_u32(terminal_id);
    }
    Ok(pos)
}

/// Append a fresh array chunk holding `specs`. Returns the array position
/// and the position of each written node.
pub fn append_array(
    buf: &mut ExtendableBuffer,
    specs: &[NodeSpec],
) -> Result<(Position, Vec<Position>), DictError> {
    let array_pos = buf.append_u16(specs.len() as u16);
    let mut node_positions = Vec::with_capacity(specs.len());
    for spec in specs {
        node_positions.push(append_node(buf, spec)?);
    }
    buf.append_u32(NO_POSITION);
    Ok((array_pos, node_positions))
}

/// Append a single-node chunk at the tail and link it from the previous
/// chunk's forward field. Returns the new node's position.
pub fn append_sibling(
    buf: &mut ExtendableBuffer,
    last_forward_field: Position,
    spec: &NodeSpec,
) -> Result<Position, DictError> {
    let chunk_pos = buf.tail_position();
    buf.append_u16(1);
    let node_pos = append_node(buf, spec)?;
    buf.append_u32(NO_POSITION);
    buf.write_u32(last_forward_field, chunk_pos);
    Ok(node_pos)
}

pub fn set_flag_bits(buf: &mut ExtendableBuffer, node: &PtNode, bits: u8) {
    buf.write_u8(node.position, node.flags | bits);
}

pub fn clear_flag_bits(buf: &mut ExtendableBuffer, node: &PtNode, bits: u8) {
    buf.write_u8(node.position, node.flags & !bits);
}

/// Overwrite a terminal's probability in place.
pub fn write_probability(buf: &mut ExtendableBuffer, node: &PtNode, probability: u8) {
    debug_assert!(node.terminal.is_some());
    buf.write_u8(node.probability_field_pos(), probability);
}

/// Attach a child array to a node that had none.
pub fn write_children_pos(buf: &mut ExtendableBuffer, node: &PtNode, children_pos: Position) {
    buf.write_u32(node.child_field_pos, children_pos);
    buf.write_u8(node.position, node.flags | HAS_CHILDREN);
}

/// Write an empty root array (count 0, no forward link) at position 0.
pub fn init_root_array(buf: &mut ExtendableBuffer) {
    debug_assert_eq!(buf.tail_position(), 0);
    buf.append_u16(0);
    buf.append_u32(NO_POSITION);
}
