//! Policy facade: the engine's public contract.
//!
//! Orchestrates the codec, updating helper and side-table policies to answer
//! lookups, mutate entries and persist to storage. This is also the single
//! point that decides whether a failure is benign (not-found, capacity
//! refusal) or fatal: any bounds or format error observed during a traversal
//! flips the instance into a permanent corrupted state, after which mutating
//! calls are refused and reads are unreliable by contract. Recovery means
//! reloading from a known-good persisted copy.

use std::cell::Cell;

use tracing::{debug, debug_span};

use crate::buffer::{ExtendableBuffer, Position};
use crate::settings::settings;

use super::node::{self, ChildNode, HAS_BIGRAMS, HAS_SHORTCUTS};
use super::terminals::{TerminalId, TerminalTable};
use super::updating::{self, AddOutcome};
use super::{bigram, gc, shortcut, DictError, MAX_WORD_LENGTH, ROOT_ARRAY_POSITION};

pub const UNIGRAM_COUNT_QUERY: &str = "UNIGRAM_COUNT";
pub const BIGRAM_COUNT_QUERY: &str = "BIGRAM_COUNT";
pub const MAX_UNIGRAM_COUNT_QUERY: &str = "MAX_UNIGRAM_COUNT";
pub const MAX_BIGRAM_COUNT_QUERY: &str = "MAX_BIGRAM_COUNT";

/// Full record for one stored word, for diagnostics and the learning layer.
#[derive(Debug, Clone)]
pub struct WordProperty {
    pub code_points: Vec<u32>,
    pub probability: u8,
    /// `(target word, probability)` for each live bigram.
    pub bigrams: Vec<(Vec<u32>, u8)>,
    /// `(alternate spelling, probability, is_whitelist)` for each live shortcut.
    pub shortcuts: Vec<(Vec<u32>, u8, bool)>,
}

pub struct DynamicDictionary {
    trie: ExtendableBuffer,
    bigrams: ExtendableBuffer,
    shortcuts: ExtendableBuffer,
    terminals: TerminalTable,
    unigram_count: u32,
    bigram_count: u32,
    max_trie_size: u32,
    /// Bumped by every mutation and GC; invalidates iteration tokens.
    generation: u32,
    /// Stable ordering of live terminal positions, materialized lazily on
    /// first iteration and discarded on any mutation.
    iteration_order: Option<Vec<Position>>,
    /// Sticky per-instance corruption flag. `Cell` because read paths also
    /// detect corruption; the engine is single-writer and not `Sync`.
    corrupted: Cell<bool>,
}

impl Default for DynamicDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicDictionary {
    pub fn new() -> Self {
        Self::with_max_trie_size(settings().capacity.max_trie_buffer_size)
    }

    /// A dictionary with a non-default size ceiling. The ceiling bounds the
    /// trie buffer because positions are fixed-width offsets.
    pub fn with_max_trie_size(max_trie_size: u32) -> Self {
        let mut trie = ExtendableBuffer::new();
        node::init_root_array(&mut trie);
        let mut bigrams = ExtendableBuffer::new();
        bigrams.append_u8(0);
        let mut shortcuts = ExtendableBuffer::new();
        shortcuts.append_u8(0);
        Self {
            trie,
            bigrams,
            shortcuts,
            terminals: TerminalTable::new(),
            unigram_count: 0,
            bigram_count: 0,
            max_trie_size,
            generation: 0,
            iteration_order: None,
            corrupted: Cell::new(false),
        }
    }

    pub(super) fn from_parts(
        trie: ExtendableBuffer,
        bigrams: ExtendableBuffer,
        shortcuts: ExtendableBuffer,
        terminals: TerminalTable,
        unigram_count: u32,
        bigram_count: u32,
    ) -> Self {
        Self {
            trie,
            bigrams,
            shortcuts,
            terminals,
            unigram_count,
            bigram_count,
            max_trie_size: settings().capacity.max_trie_buffer_size,
            generation: 0,
            iteration_order: None,
            corrupted: Cell::new(false),
        }
    }

    pub(super) fn buffers(
        &self,
    ) -> (&ExtendableBuffer, &ExtendableBuffer, &ExtendableBuffer, &TerminalTable) {
        (&self.trie, &self.bigrams, &self.shortcuts, &self.terminals)
    }

    pub fn root_position(&self) -> Position {
        ROOT_ARRAY_POSITION
    }

    pub fn unigram_count(&self) -> u32 {
        self.unigram_count
    }

    pub fn bigram_count(&self) -> u32 {
        self.bigram_count
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.get()
    }

    /// Escalate internal bounds/format failures into the sticky corrupted
    /// state; pass everything else through.
    fn guard<T>(&self, r: Result<T, DictError>) -> Result<T, DictError> {
        match r {
            Err(DictError::OutOfBounds { position }) | Err(DictError::BadRecord { position }) => {
                self.corrupted.set(true);
                debug!(position, "corruption detected");
                Err(DictError::Corrupted)
            }
            other => other,
        }
    }

    fn check_mutable(&self) -> Result<(), DictError> {
        if self.corrupted.get() {
            return Err(DictError::Corrupted);
        }
        Ok(())
    }

    fn check_trie_capacity(&self) -> Result<(), DictError> {
        let margin = settings().capacity.margin_to_refuse_dynamic_operations;
        if self.trie.tail_position().saturating_add(margin) >= self.max_trie_size {
            return Err(DictError::CapacityRefused);
        }
        Ok(())
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.iteration_order = None;
    }

    // --- Lookup ---

    /// Position of the terminal node storing `word`, if any. On a miss with
    /// `force_lower_case`, the lower-cased code points are tried before
    /// giving up.
    pub fn find_word(
        &self,
        word: &[u32],
        force_lower_case: bool,
    ) -> Result<Option<Position>, DictError> {
        let r = updating::find_node(&self.trie, word);
        if let Some(n) = self.guard(r)? {
            if n.is_live_terminal() {
                return Ok(Some(n.position));
            }
        }
        if force_lower_case {
            if let Some(lower) = lower_cased(word) {
                let r = updating::find_node(&self.trie, &lower);
                if let Some(n) = self.guard(r)? {
                    if n.is_live_terminal() {
                        return Ok(Some(n.position));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Reconstruct the code-point sequence and unigram probability of the
    /// terminal at `terminal_pos`. Fails with `WordTooLong` rather than
    /// truncating when the word exceeds `max_code_point_count`.
    pub fn word_and_probability_at(
        &self,
        terminal_pos: Position,
        max_code_point_count: usize,
    ) -> Result<Option<(Vec<u32>, u8)>, DictError> {
        let mut path = Vec::new();
        let r = self.collect_word(ROOT_ARRAY_POSITION, terminal_pos, &mut path, max_code_point_count);
        self.guard(r)
    }

    fn collect_word(
        &self,
        array_pos: Position,
        target: Position,
        path: &mut Vec<u32>,
        max: usize,
    ) -> Result<Option<(Vec<u32>, u8)>, DictError> {
        for n in node::read_array(&self.trie, array_pos)?.nodes {
            if n.is_moved() {
                continue;
            }
            let depth = path.len();
            path.extend_from_slice(&n.code_points);
            // Deeper than any storable word: the only way here is a child
            // field tied into a cycle.
            if path.len() > MAX_WORD_LENGTH {
                return Err(DictError::BadRecord {
                    position: n.position,
                });
            }
            if n.position == target {
                if n.is_live_terminal() {
                    if let Some((probability, _)) = n.terminal {
                        if path.len() > max {
                            return Err(DictError::WordTooLong);
                        }
                        return Ok(Some((path.clone(), probability)));
                    }
                }
                return Ok(None);
            }
            if n.has_children() {
                if let Some(found) = self.collect_word(n.children_pos, target, path, max)? {
                    return Ok(Some(found));
                }
            }
            path.truncate(depth);
        }
        Ok(None)
    }

    /// Immediate children of a node array, as expansion candidates for the
    /// ranking layer. Read-only; pass `root_position()` to expand the root.
    pub fn children_of(&self, array_pos: Position) -> Result<Vec<ChildNode>, DictError> {
        let r = node::read_array(&self.trie, array_pos);
        let array = self.guard(r)?;
        Ok(array
            .nodes
            .into_iter()
            .filter(|n| !n.is_moved())
            .map(|n| ChildNode {
                position: n.position,
                child_array_pos: n.has_children().then_some(n.children_pos),
                probability: if n.is_live_terminal() {
                    n.terminal.map(|(p, _)| p)
                } else {
                    None
                },
                code_points: n.code_points,
            })
            .collect())
    }

    // --- Probability ---

    /// Blend a word's standalone probability with bigram evidence from a
    /// preceding-word context. Bigram evidence dominates via a configured
    /// boost but never demotes a word below its unigram probability.
    pub fn probability(&self, unigram_probability: u8, bigram_probability: Option<u8>) -> u8 {
        match bigram_probability {
            None => unigram_probability,
            Some(b) => {
                let boosted = (b as u32 + settings().probability.bigram_boost).min(255) as u8;
                boosted.max(unigram_probability)
            }
        }
    }

    /// Blended probability of the terminal at `pos` given the terminal at
    /// `prev_pos` as preceding word. `None` when either position is not a
    /// live terminal.
    pub fn probability_between(
        &self,
        prev_pos: Position,
        pos: Position,
    ) -> Result<Option<u8>, DictError> {
        let Some((unigram, id)) = self.terminal_at(pos)? else {
            return Ok(None);
        };
        let Some((_, prev_id)) = self.terminal_at(prev_pos)? else {
            return Ok(None);
        };
        let r = bigram::probability(&self.bigrams, &self.terminals, prev_id, id);
        let bg = self.guard(r)?;
        Ok(Some(self.probability(unigram, bg)))
    }

    fn terminal_at(&self, pos: Position) -> Result<Option<(u8, TerminalId)>, DictError> {
        let r = node::read_node(&self.trie, pos);
        let n = self.guard(r)?;
        if n.is_live_terminal() {
            Ok(n.terminal)
        } else {
            Ok(None)
        }
    }

    /// Visit the live bigram entries of the terminal at `prev_pos`.
    pub fn iterate_bigrams(
        &self,
        prev_pos: Position,
        f: impl FnMut(TerminalId, u8),
    ) -> Result<(), DictError> {
        let Some((_, prev_id)) = self.terminal_at(prev_pos)? else {
            return Ok(());
        };
        let r = bigram::for_each_live(&self.bigrams, self.terminals.bigram_head(prev_id), f);
        self.guard(r)
    }

    // --- Mutation ---

    /// Insert or update a word. Returns `false` for an empty word, which is
    /// not representable.
    pub fn add_word(&mut self, word: &[u32], probability: u8) -> Result<bool, DictError> {
        self.check_mutable()?;
        if word.is_empty() {
            return Ok(false);
        }
        if word.len() > MAX_WORD_LENGTH {
            return Err(DictError::WordTooLong);
        }
        self.check_trie_capacity()?;
        if self.unigram_count >= settings().capacity.max_unigram_count {
            return Err(DictError::CapacityRefused);
        }
        let r = updating::add_word(&mut self.trie, &mut self.terminals, word, probability);
        match self.guard(r)? {
            AddOutcome::Added(_) => self.unigram_count += 1,
            AddOutcome::Updated(_) => {}
        }
        self.bump_generation();
        Ok(true)
    }

    /// Tombstone a word. Lookup misses immediately; storage is reclaimed at
    /// the next compacting flush.
    pub fn remove_word(&mut self, word: &[u32]) -> Result<bool, DictError> {
        self.check_mutable()?;
        let r = updating::remove_word(&mut self.trie, word);
        if self.guard(r)?.is_none() {
            return Ok(false);
        }
        self.unigram_count = self.unigram_count.saturating_sub(1);
        self.bump_generation();
        Ok(true)
    }

    /// Record `prev_word → word` with the given conditional probability.
    /// Returns `false` when either word is not stored.
    pub fn add_bigram(
        &mut self,
        prev_word: &[u32],
        word: &[u32],
        probability: u8,
    ) -> Result<bool, DictError> {
        self.check_mutable()?;
        if self.bigram_count >= settings().capacity.max_bigram_count {
            return Err(DictError::CapacityRefused);
        }
        let Some((prev_pos, prev_id)) = self.live_terminal_of(prev_word)? else {
            return Ok(false);
        };
        let Some((_, id)) = self.live_terminal_of(word)? else {
            return Ok(false);
        };
        let r = bigram::add(&mut self.bigrams, &mut self.terminals, prev_id, id, probability);
        if self.guard(r)? {
            self.bigram_count += 1;
        }
        self.mark_aux_flag(prev_pos, HAS_BIGRAMS)?;
        self.bump_generation();
        Ok(true)
    }

    /// Tombstone `prev_word → word`. Returns `false` when no live entry
    /// exists.
    pub fn remove_bigram(&mut self, prev_word: &[u32], word: &[u32]) -> Result<bool, DictError> {
        self.check_mutable()?;
        let Some((_, prev_id)) = self.live_terminal_of(prev_word)? else {
            return Ok(false);
        };
        let Some((_, id)) = self.live_terminal_of(word)? else {
            return Ok(false);
        };
        let r = bigram::remove(&mut self.bigrams, &self.terminals, prev_id, id);
        if !self.guard(r)? {
            return Ok(false);
        }
        self.bigram_count = self.bigram_count.saturating_sub(1);
        self.bump_generation();
        Ok(true)
    }

    /// Register an alternate spelling for `word`. Returns `false` when the
    /// word is not stored.
    pub fn add_shortcut(
        &mut self,
        word: &[u32],
        shortcut: &[u32],
        probability: u8,
        whitelist: bool,
    ) -> Result<bool, DictError> {
        self.check_mutable()?;
        if shortcut.is_empty() {
            return Ok(false);
        }
        if shortcut.len() > MAX_WORD_LENGTH {
            return Err(DictError::WordTooLong);
        }
        let Some((pos, id)) = self.live_terminal_of(word)? else {
            return Ok(false);
        };
        let r = shortcut::add(
            &mut self.shortcuts,
            &mut self.terminals,
            id,
            shortcut,
            probability,
            whitelist,
        );
        self.guard(r)?;
        self.mark_aux_flag(pos, HAS_SHORTCUTS)?;
        self.bump_generation();
        Ok(true)
    }

    /// Tombstone an alternate spelling of `word`.
    pub fn remove_shortcut(&mut self, word: &[u32], shortcut: &[u32]) -> Result<bool, DictError> {
        self.check_mutable()?;
        let Some((_, id)) = self.live_terminal_of(word)? else {
            return Ok(false);
        };
        let r = shortcut::remove(&mut self.shortcuts, &self.terminals, id, shortcut);
        let removed = self.guard(r)?;
        if removed {
            self.bump_generation();
        }
        Ok(removed)
    }

    fn live_terminal_of(
        &self,
        word: &[u32],
    ) -> Result<Option<(Position, TerminalId)>, DictError> {
        let Some(pos) = self.find_word(word, false)? else {
            return Ok(None);
        };
        Ok(self.terminal_at(pos)?.map(|(_, id)| (pos, id)))
    }

    fn mark_aux_flag(&mut self, pos: Position, flag: u8) -> Result<(), DictError> {
        let r = node::read_node(&self.trie, pos);
        let n = self.guard(r)?;
        node::set_flag_bits(&mut self.trie, &n, flag);
        Ok(())
    }

    // --- Word properties ---

    /// Everything stored about `word`: probability, live bigram successors
    /// (as words) and live shortcuts.
    pub fn word_property(&self, word: &[u32]) -> Result<Option<WordProperty>, DictError> {
        let Some((pos, id)) = self.live_terminal_of(word)? else {
            return Ok(None);
        };
        let Some((probability, _)) = self.terminal_at(pos)? else {
            return Ok(None);
        };

        let mut targets: Vec<(TerminalId, u8)> = Vec::new();
        let r = bigram::for_each_live(&self.bigrams, self.terminals.bigram_head(id), |t, p| {
            targets.push((t, p))
        });
        self.guard(r)?;
        let mut bigrams = Vec::with_capacity(targets.len());
        for (target, p) in targets {
            let Some(target_pos) = self.terminals.node_pos(target) else {
                continue;
            };
            if let Some((cps, _)) = self.word_and_probability_at(target_pos, MAX_WORD_LENGTH)? {
                bigrams.push((cps, p));
            }
        }

        let r = shortcut::live_entries(&self.shortcuts, &self.terminals, id);
        let shortcuts = self
            .guard(r)?
            .into_iter()
            .map(|e| {
                let whitelist = e.is_whitelist();
                (e.code_points, e.probability, whitelist)
            })
            .collect();

        Ok(Some(WordProperty {
            code_points: word.to_vec(),
            probability,
            bigrams,
            shortcuts,
        }))
    }

    // --- Word iteration ---

    /// Restartable iteration over all live words. Pass `0` to start; feed
    /// the returned token back to resume; `Ok(None)` signals exhaustion.
    /// Tokens are invalidated by any mutation or GC, and a stale token fails
    /// with `StaleToken` instead of returning wrong results.
    pub fn next_word(&mut self, token: u64) -> Result<Option<(Vec<u32>, u64)>, DictError> {
        let index = if token == 0 {
            0
        } else {
            let token_gen = token >> 32;
            if token_gen != self.generation as u64 + 1 {
                return Err(DictError::StaleToken);
            }
            (token & 0xffff_ffff) as usize
        };

        if self.iteration_order.is_none() {
            let mut order = Vec::new();
            let r = self.collect_terminal_positions(ROOT_ARRAY_POSITION, 0, &mut order);
            self.guard(r)?;
            self.iteration_order = Some(order);
        }
        let pos = match self.iteration_order.as_ref().and_then(|o| o.get(index)) {
            Some(&pos) => pos,
            None => return Ok(None),
        };
        let Some((code_points, _)) = self.word_and_probability_at(pos, MAX_WORD_LENGTH)? else {
            // The materialized order only holds live terminals; a miss here
            // means the trie changed underneath us.
            self.corrupted.set(true);
            return Err(DictError::Corrupted);
        };
        let next = ((self.generation as u64 + 1) << 32) | (index as u64 + 1);
        Ok(Some((code_points, next)))
    }

    fn collect_terminal_positions(
        &self,
        array_pos: Position,
        depth: usize,
        out: &mut Vec<Position>,
    ) -> Result<(), DictError> {
        for n in node::read_array(&self.trie, array_pos)?.nodes {
            if n.is_moved() {
                continue;
            }
            let depth = depth + n.code_points.len();
            if depth > MAX_WORD_LENGTH {
                return Err(DictError::BadRecord {
                    position: n.position,
                });
            }
            if n.is_live_terminal() {
                out.push(n.position);
            }
            if n.has_children() {
                self.collect_terminal_positions(n.children_pos, depth, out)?;
            }
        }
        Ok(())
    }

    // --- Maintenance ---

    /// Whether a compacting flush should run; see [`gc::needs_gc`].
    pub fn needs_gc(&self, minds_block_by_gc: bool) -> Result<bool, DictError> {
        let r = gc::needs_gc(&self.trie, self.max_trie_size, minds_block_by_gc);
        self.guard(r)
    }

    /// Compact the in-memory buffers, dropping tombstones and dead auxiliary
    /// entries. Terminal ids are preserved.
    pub fn run_gc(&mut self) -> Result<(), DictError> {
        self.check_mutable()?;
        let _span = debug_span!("run_gc").entered();
        let r = gc::compact(&self.trie, &self.bigrams, &self.shortcuts, &self.terminals);
        let compacted = self.guard(r)?;
        self.trie = compacted.trie;
        self.bigrams = compacted.bigrams;
        self.shortcuts = compacted.shortcuts;
        self.terminals.replace(compacted.terminal_entries);
        self.unigram_count = compacted.unigram_count;
        self.bigram_count = compacted.bigram_count;
        self.bump_generation();
        Ok(())
    }

    /// Diagnostic counters for a fixed set of named queries.
    pub fn property(&self, query: &str) -> Option<u32> {
        match query {
            UNIGRAM_COUNT_QUERY => Some(self.unigram_count),
            BIGRAM_COUNT_QUERY => Some(self.bigram_count),
            MAX_UNIGRAM_COUNT_QUERY => Some(settings().capacity.max_unigram_count),
            MAX_BIGRAM_COUNT_QUERY => Some(settings().capacity.max_bigram_count),
            _ => None,
        }
    }
}

/// Lower-cased copy of `word`, or `None` when lowering changes nothing or
/// any value is not a code point. Multi-code-point expansions keep only the
/// first mapping so word length is preserved.
fn lower_cased(word: &[u32]) -> Option<Vec<u32>> {
    let mut out = Vec::with_capacity(word.len());
    for &cp in word {
        let c = char::from_u32(cp)?;
        let lower = c.to_lowercase().next().unwrap_or(c);
        out.push(lower as u32);
    }
    if out == word {
        None
    } else {
        Some(out)
    }
}
