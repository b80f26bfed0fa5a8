//! Dictionary file format and persistence.
//!
//! Single-file layout: a fixed header, then the three raw buffers and the
//! bincode-encoded terminal table back to back. The header carries section
//! lengths, entry counts and a CRC32 over the payload so a torn or bit-rotted
//! file is rejected at open instead of surfacing later as trie corruption.
//!
//! ```text
//! magic: b"DYDX"      version: u8 = 1     reserved: [u8; 3]
//! unigram_count: u32  bigram_count: u32
//! trie_len: u32  bigram_len: u32  shortcut_len: u32  terminals_len: u32
//! payload_crc32: u32
//! ```

use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::buffer::ExtendableBuffer;

use super::policy::DynamicDictionary;
use super::terminals::{TerminalEntry, TerminalTable};
use super::DictError;

pub(super) const MAGIC: &[u8; 4] = b"DYDX";
pub(super) const VERSION: u8 = 1;
pub(super) const HEADER_SIZE: usize = 36;

impl DynamicDictionary {
    pub fn to_bytes(&self) -> Result<Vec<u8>, DictError> {
        let (trie, bigrams, shortcuts, terminals) = self.buffers();
        let trie_data = trie.as_slice();
        let bigram_data = bigrams.as_slice();
        let shortcut_data = shortcuts.as_slice();
        let terminal_data =
            bincode::serialize(terminals.entries()).map_err(DictError::Serialize)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(trie_data);
        crc.update(bigram_data);
        crc.update(shortcut_data);
        crc.update(&terminal_data);

        let total = HEADER_SIZE
            + trie_data.len()
            + bigram_data.len()
            + shortcut_data.len()
            + terminal_data.len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&[0u8; 3]); // reserved
        buf.extend_from_slice(&self.unigram_count().to_ne_bytes());
        buf.extend_from_slice(&self.bigram_count().to_ne_bytes());
        buf.extend_from_slice(&(trie_data.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&(bigram_data.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&(shortcut_data.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&(terminal_data.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&crc.finalize().to_ne_bytes());
        buf.extend_from_slice(trie_data);
        buf.extend_from_slice(bigram_data);
        buf.extend_from_slice(shortcut_data);
        buf.extend_from_slice(&terminal_data);

        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DictError> {
        if data.len() < 5 {
            return Err(DictError::InvalidHeader);
        }
        if &data[..4] != MAGIC {
            return Err(DictError::InvalidMagic);
        }
        if data[4] != VERSION {
            return Err(DictError::UnsupportedVersion(data[4]));
        }
        if data.len() < HEADER_SIZE {
            return Err(DictError::InvalidHeader);
        }

        let read_u32 = |at: usize| u32::from_ne_bytes(data[at..at + 4].try_into().unwrap());
        let unigram_count = read_u32(8);
        let bigram_count = read_u32(12);
        let trie_len = read_u32(16) as usize;
        let bigram_len = read_u32(20) as usize;
        let shortcut_len = read_u32(24) as usize;
        let terminals_len = read_u32(28) as usize;
        let stored_crc = read_u32(32);

        // Exact length: trailing bytes after the declared sections are as
        // suspect as a truncation.
        let expected = HEADER_SIZE + trie_len + bigram_len + shortcut_len + terminals_len;
        if data.len() != expected {
            return Err(DictError::InvalidHeader);
        }

        let trie_start = HEADER_SIZE;
        let bigram_start = trie_start + trie_len;
        let shortcut_start = bigram_start + bigram_len;
        let terminals_start = shortcut_start + shortcut_len;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&data[trie_start..terminals_start + terminals_len]);
        if crc.finalize() != stored_crc {
            return Err(DictError::ChecksumMismatch);
        }

        let entries: Vec<TerminalEntry> =
            bincode::deserialize(&data[terminals_start..terminals_start + terminals_len])
                .map_err(DictError::Deserialize)?;
        let mut terminals = TerminalTable::new();
        terminals.replace(entries);

        Ok(Self::from_parts(
            ExtendableBuffer::from_vec(data[trie_start..trie_start + trie_len].to_vec()),
            ExtendableBuffer::from_vec(data[bigram_start..bigram_start + bigram_len].to_vec()),
            ExtendableBuffer::from_vec(data[shortcut_start..shortcut_start + shortcut_len].to_vec()),
            terminals,
            unigram_count,
            bigram_count,
        ))
    }

    /// Open a dictionary file.
    ///
    /// The file is mapped for validation, then the sections are copied into
    /// owned growable buffers; unlike a static dictionary, this one mutates
    /// in place, so a read-only mapping cannot back it.
    pub fn open(path: &Path) -> Result<Self, DictError> {
        let file = File::open(path)?;
        // SAFETY: The file is opened read-only and the mapping is immutable.
        let mmap = unsafe { Mmap::map(&file)? };
        let dict = Self::from_bytes(&mmap)?;
        debug!(
            path = %path.display(),
            unigrams = dict.unigram_count(),
            bigrams = dict.bigram_count(),
            "dictionary opened"
        );
        Ok(dict)
    }

    /// Write the dictionary to `path` atomically: the bytes land in a
    /// sibling temp file that is renamed over the target, so a crash leaves
    /// either the old file or the new one, never a torn mix.
    pub fn save(&self, path: &Path) -> Result<(), DictError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "dictionary saved");
        Ok(())
    }

    /// Compact, then save. The usual persistence entry point: tombstones and
    /// dead records never reach the file.
    pub fn flush_with_gc(&mut self, path: &Path) -> Result<(), DictError> {
        self.run_gc()?;
        self.save(path)
    }
}
