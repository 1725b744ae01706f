//! The FastSS deletion-neighborhood engine.
//!
//! Every stored word is expanded into all its deletion variants of up to
//! [`MAX_DISTANCE`] characters among the first [`LIMIT`] positions. A
//! variant is keyed by its first [`PREFIX_LENGTH`] remaining characters
//! and recorded as a packed `(word-id, deletion-mask)` entry, ordered by
//! the *effective* variant so retrieval is a prefix lookup plus a binary
//! search. Two words within edit distance k share at least one variant of
//! up to k deletions, which is the FastSS recall guarantee.
//!
//! Word ids come from a free-list allocator: `INDEXMAX` is the high-water
//! mark and `INDEXSTACK` the LIFO of reusable ids. Removing a word only
//! deletes its two id mappings and queues its id; the posting entries die
//! at merge time when their list is rewritten.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use heed::{RoTxn, RwTxn};
use smallvec::SmallVec;

use crate::codec::posting;
use crate::error::{CorruptionError, InternalError};
use crate::index::SpellingIndex;
use crate::termlist::{TermList, WordsTermList};
use crate::{keys, PrefixGroup, Result, WordId};

/// The deepest deletion neighborhood stored and probed.
pub const MAX_DISTANCE: u32 = 2;

/// Only the first `LIMIT` characters of a word can be deleted: the
/// posting packing reserves one mask bit per position. Hard invariant, do
/// not widen without a format change; ids only have the remaining 24 bits.
pub const LIMIT: usize = 8;

/// How many remaining characters of a variant make up its posting key.
pub const PREFIX_LENGTH: usize = 4;

type WordChars = SmallVec<[char; 16]>;

/// Deleting more than half of a word stops being discriminating.
fn max_deletions(len: usize) -> u32 {
    MAX_DISTANCE.min(len as u32 / 2)
}

/// Appends the first `count` characters of the variant of `chars` that
/// skips the positions set in `mask`.
fn push_variant_prefix(out: &mut String, chars: &[char], mut mask: u32, count: usize) {
    let mut taken = 0;
    for &c in chars {
        if taken == count {
            break;
        }
        if mask & 1 == 0 {
            out.push(c);
            taken += 1;
        }
        mask >>= 1;
    }
}

/// Three-way comparison of two deletion variants, each one a word with
/// the positions set in its mask skipped, considering at most the first
/// `limit` characters of either word.
fn compare_variants(
    a: &[char],
    mut a_mask: u32,
    b: &[char],
    mut b_mask: u32,
    limit: usize,
) -> Ordering {
    let a_end = a.len().min(limit);
    let b_end = b.len().min(limit);
    let (mut i, mut j) = (0, 0);
    loop {
        while a_mask & 1 == 1 && i < a_end {
            a_mask >>= 1;
            i += 1;
        }
        while b_mask & 1 == 1 && j < b_end {
            b_mask >>= 1;
            j += 1;
        }
        match (i == a_end, j == b_end) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {}
            other => return other,
        }
        i += 1;
        j += 1;
        a_mask >>= 1;
        b_mask >>= 1;
    }
}

fn compare_entries(words: &HashMap<WordId, WordChars>, a: u32, b: u32) -> Ordering {
    let (a_id, a_mask) = posting::unpack_entry(a);
    let (b_id, b_mask) = posting::unpack_entry(b);
    let a_word = words.get(&a_id).map_or(&[] as &[char], |w| w.as_slice());
    let b_word = words.get(&b_id).map_or(&[] as &[char], |w| w.as_slice());
    compare_variants(a_word, a_mask, b_word, b_mask, usize::MAX).then_with(|| a.cmp(&b))
}

struct ToggleEntry {
    group: PrefixGroup,
    word: String,
}

/// The buffered neighborhood toggles of one write batch.
#[derive(Default)]
pub struct FastssBatch {
    /// Words toggled this batch, in call order.
    wordlist: Vec<ToggleEntry>,
    /// Posting key → packed `(batch-index, mask)` entries, remapped to
    /// real word ids at merge time. Removed words contribute entries too
    /// so that every posting list holding them gets rewritten.
    termlist_deltas: BTreeMap<Vec<u8>, Vec<u32>>,
}

impl FastssBatch {
    pub fn toggle_word(&mut self, group: PrefixGroup, word: &str) {
        let chars: WordChars = word.chars().collect();
        let batch_index = self.wordlist.len() as u32;
        debug_assert!(batch_index <= posting::MAX_WORD_ID);
        self.toggle_recursive(group, &chars, batch_index, 0, 0, max_deletions(chars.len()));
        self.wordlist.push(ToggleEntry { group, word: word.to_owned() });
    }

    fn toggle_recursive(
        &mut self,
        group: PrefixGroup,
        chars: &[char],
        batch_index: u32,
        mask: u32,
        start: usize,
        remaining: u32,
    ) {
        self.toggle_term(group, chars, batch_index, mask);
        if remaining != 0 {
            for i in start..chars.len().min(LIMIT) {
                let mask = mask | (1 << i);
                self.toggle_recursive(group, chars, batch_index, mask, i + 1, remaining - 1);
            }
        }
    }

    fn toggle_term(&mut self, group: PrefixGroup, chars: &[char], batch_index: u32, mask: u32) {
        let mut prefix = String::new();
        push_variant_prefix(&mut prefix, chars, mask, PREFIX_LENGTH);
        let key = keys::neighborhood_key(group, &prefix);
        self.termlist_deltas.entry(key).or_default().push(posting::pack_entry(batch_index, mask));
    }

    /// Materializes the buffered toggles.
    ///
    /// A first pass walks the toggles in call order and settles the
    /// allocator: a word already mapped loses both its mappings and its id
    /// goes to the free stack and the remove-set; a new word draws an id
    /// (from the stack first). A second pass rewrites every affected
    /// posting list: surviving entries are kept, delta entries are
    /// remapped from batch indices to the settled ids, sorted by effective
    /// variant and merged in.
    #[tracing::instrument(level = "trace", skip_all, target = "spelling::fastss")]
    pub fn merge_fragment_changes(
        &mut self,
        wtxn: &mut RwTxn<'_>,
        index: &SpellingIndex,
    ) -> Result<()> {
        if self.wordlist.is_empty() {
            return Ok(());
        }

        let mut limit = index.word_id_limit(wtxn)?;
        let mut stack = index.free_word_ids(wtxn)?;
        let mut removed = HashSet::new();
        let wordlist = std::mem::take(&mut self.wordlist);
        let mut resolved: Vec<Option<WordId>> = vec![None; wordlist.len()];
        let mut last_added: HashMap<Vec<u8>, usize> = HashMap::new();

        for (i, entry) in wordlist.iter().enumerate() {
            let forward_key = keys::word_id_key(entry.group, &entry.word);
            let existing = match index.store.get(wtxn, &forward_key)? {
                Some(bytes) => {
                    let bytes = bytes.try_into().map_err(|_| CorruptionError::AllocatorState)?;
                    Some(WordId::from_le_bytes(bytes))
                }
                None => None,
            };
            match existing {
                // The word is live, this toggle removes it. Its posting
                // entries are filtered out in the second pass.
                Some(id) => {
                    index.store.delete(wtxn, &forward_key)?;
                    index.store.delete(wtxn, &keys::id_word_key(id))?;
                    stack.push(id);
                    removed.insert(id);
                    if let Some(j) = last_added.remove(&forward_key) {
                        resolved[j] = None;
                    }
                }
                // First appearance, allocate an id for it.
                None => {
                    let id = match stack.pop() {
                        Some(id) => id,
                        None => {
                            if limit > posting::MAX_WORD_ID {
                                return Err(InternalError::WordIdSpaceExhausted.into());
                            }
                            let id = limit;
                            limit += 1;
                            id
                        }
                    };
                    index.store.put(wtxn, &forward_key, &id.to_le_bytes())?;
                    index.store.put(wtxn, &keys::id_word_key(id), entry.word.as_bytes())?;
                    resolved[i] = Some(id);
                    last_added.insert(forward_key, i);
                }
            }
        }

        let mut words: HashMap<WordId, WordChars> = HashMap::new();
        for (i, entry) in wordlist.iter().enumerate() {
            if let Some(id) = resolved[i] {
                words.insert(id, entry.word.chars().collect());
            }
        }

        for (key, delta) in std::mem::take(&mut self.termlist_deltas) {
            let mut entries = match index.store.get(wtxn, &key)? {
                Some(bytes) => posting::read_u32s(bytes)?,
                None => Vec::new(),
            };
            entries.retain(|&entry| !removed.contains(&posting::word_id(entry)));

            let mut fresh: Vec<u32> = delta
                .iter()
                .filter_map(|&packed| {
                    let (batch_index, mask) = posting::unpack_entry(packed);
                    resolved[batch_index as usize].map(|id| posting::pack_entry(id, mask))
                })
                .collect();

            for &entry in &entries {
                let id = posting::word_id(entry);
                if let Entry::Vacant(vacant) = words.entry(id) {
                    let word = index
                        .word_for_id(wtxn, id)?
                        .ok_or(CorruptionError::MissingWord(id))?;
                    vacant.insert(word.chars().collect());
                }
            }

            fresh.sort_by(|&a, &b| compare_entries(&words, a, b));
            let merged = merge_sorted(&entries, &fresh, &words);

            if merged.is_empty() {
                index.store.delete(wtxn, &key)?;
            } else {
                index.store.put(wtxn, &key, &posting::write_u32s(&merged))?;
            }
        }

        index.store.put(wtxn, keys::INDEXMAX, &limit.to_le_bytes())?;
        index.store.put(wtxn, keys::INDEXSTACK, &posting::write_u32s(&stack))?;
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.wordlist.clear();
        self.termlist_deltas.clear();
    }
}

fn merge_sorted(left: &[u32], right: &[u32], words: &HashMap<WordId, WordChars>) -> Vec<u32> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match compare_entries(words, left[i], right[j]) {
            Ordering::Greater => {
                merged.push(right[j]);
                j += 1;
            }
            _ => {
                merged.push(left[i]);
                i += 1;
            }
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

/// Collects every stored word sharing a deletion variant with the query
/// into a single term list.
pub(crate) fn populate_word(
    index: &SpellingIndex,
    rtxn: &RoTxn<'_>,
    group: PrefixGroup,
    word: &str,
    max_distance: u32,
    results: &mut Vec<TermList>,
) -> Result<()> {
    let chars: WordChars = word.chars().collect();
    let max = max_distance.min(max_deletions(chars.len()));

    let mut search = NeighborhoodSearch {
        index,
        rtxn,
        group,
        query: &chars,
        words: HashMap::new(),
        entries: None,
        ids: HashSet::new(),
    };
    search.populate_recursive(0, 0, 0, max)?;

    let NeighborhoodSearch { mut words, ids, .. } = search;
    let mut matches = Vec::with_capacity(ids.len());
    for id in ids {
        let word = match words.remove(&id) {
            Some(chars) => chars.iter().collect(),
            None => {
                index.word_for_id(rtxn, id)?.ok_or(CorruptionError::MissingWord(id))?
            }
        };
        matches.push(word);
    }
    matches.sort_unstable();
    results.push(TermList::Words(WordsTermList::new(matches)));
    Ok(())
}

struct NeighborhoodSearch<'a, 't> {
    index: &'a SpellingIndex,
    rtxn: &'a RoTxn<'t>,
    group: PrefixGroup,
    query: &'a [char],
    /// Cached id → word resolutions for the binary-search comparator.
    words: HashMap<WordId, WordChars>,
    /// The posting list of the current key, kept across the recursions
    /// whose deletions cannot change the key.
    entries: Option<Vec<u32>>,
    ids: HashSet<WordId>,
}

impl NeighborhoodSearch<'_, '_> {
    fn populate_recursive(
        &mut self,
        mask: u32,
        start: usize,
        distance: u32,
        max: u32,
    ) -> Result<()> {
        // A deletion at or past the key prefix leaves the key unchanged
        // and the loaded posting list is still the right one.
        if start <= PREFIX_LENGTH + distance as usize {
            let mut prefix = String::new();
            push_variant_prefix(&mut prefix, self.query, mask, PREFIX_LENGTH);
            let key = keys::neighborhood_key(self.group, &prefix);
            self.entries = match self.index.store.get(self.rtxn, &key)? {
                Some(bytes) => Some(posting::read_u32s(bytes)?),
                None => None,
            };
        }

        if self.entries.is_some() {
            self.collect_matches(mask)?;
        }

        if distance < max {
            for i in start..self.query.len().min(LIMIT) {
                self.populate_recursive(mask | (1 << i), i + 1, distance + 1, max)?;
            }
        }
        Ok(())
    }

    /// Collects the ids of the entries whose effective variant equals the
    /// query's, over the first [`LIMIT`] characters.
    fn collect_matches(&mut self, mask: u32) -> Result<()> {
        let entries = self.entries.take().unwrap_or_default();
        let lower = self.bound(&entries, mask, 0..entries.len(), true)?;
        let upper = self.bound(&entries, mask, lower..entries.len(), false)?;
        for &entry in &entries[lower..upper] {
            self.ids.insert(posting::word_id(entry));
        }
        self.entries = Some(entries);
        Ok(())
    }

    fn bound(
        &mut self,
        entries: &[u32],
        mask: u32,
        range: Range<usize>,
        lower: bool,
    ) -> Result<usize> {
        let mut start = range.start;
        let mut count = range.end - range.start;
        while count > 0 {
            let step = count / 2;
            let mid = start + step;
            let (id, entry_mask) = posting::unpack_entry(entries[mid]);
            let query = self.query;
            let word = self.word_chars(id)?;
            let ord = compare_variants(word, entry_mask, query, mask, LIMIT);
            if ord == Ordering::Less || (!lower && ord == Ordering::Equal) {
                start = mid + 1;
                count -= step + 1;
            } else {
                count = step;
            }
        }
        Ok(start)
    }

    fn word_chars(&mut self, id: WordId) -> Result<&WordChars> {
        match self.words.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let word = self
                    .index
                    .word_for_id(self.rtxn, id)?
                    .ok_or(CorruptionError::MissingWord(id))?;
                Ok(entry.insert(word.chars().collect()))
            }
        }
    }
}
