//! Dynamic patricia-trie dictionary storage.
//!
//! `DynamicDictionary` maps code-point sequences to unigram probabilities and
//! keeps per-word bigram and shortcut side-tables, all addressed by byte
//! offset into extendable buffers. Mutations are online: removal tombstones
//! records in place and a mark-and-compact pass (`flush_with_gc`) reclaims
//! the space later.
//!
//! The engine is single-writer and non-reentrant. Callers that need a
//! consistent view across several calls (find a terminal, then read its
//! probability) must hold their own exclusive section around the sequence;
//! there is no internal locking on the lookup path.

mod bigram;
mod gc;
mod io;
mod node;
mod policy;
mod shortcut;
mod terminals;
#[cfg(test)]
mod tests;
mod updating;

pub use node::ChildNode;
pub use policy::{DynamicDictionary, WordProperty};
pub use terminals::TerminalId;

use crate::buffer::Position;
use std::io as stdio;

/// Longest code-point sequence accepted as a word.
pub const MAX_WORD_LENGTH: usize = 48;

/// Position of the root node array in the trie buffer.
pub const ROOT_ARRAY_POSITION: Position = 0;

/// Unified error type for the dictionary engine.
///
/// Not-found is never an error: lookups report absence through `Option`.
/// `OutOfBounds`/`BadRecord` are internal; the facade converts them into the
/// sticky `Corrupted` state before they reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] stdio::Error),

    #[error("invalid header (too short)")]
    InvalidHeader,

    #[error("invalid magic bytes (expected DYDX)")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("serialization error: {0}")]
    Serialize(bincode::Error),

    #[error("deserialization error: {0}")]
    Deserialize(bincode::Error),

    #[error("position {position} out of buffer bounds")]
    OutOfBounds { position: Position },

    #[error("record at position {position} failed validation")]
    BadRecord { position: Position },

    #[error("dictionary is corrupted; reload from a persisted copy")]
    Corrupted,

    #[error("dictionary is near its maximum size; run a compacting flush")]
    CapacityRefused,

    #[error("word exceeds {MAX_WORD_LENGTH} code points")]
    WordTooLong,

    #[error("iteration token is from a stale generation")]
    StaleToken,
}
