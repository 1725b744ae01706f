//! The positional trigram engine.
//!
//! A word of `m` code points yields one fragment per start position in
//! `[-1, m-n+1]`: three characters, the head and tail ones replaced by the
//! `H` placeholder when the window hangs over an edge, keyed under the
//! byte `start + n`. Words short enough to lose all their trigrams to a
//! single error additionally get a *bookend* fragment (position byte 1)
//! holding their first and last characters.
//!
//! Retrieval emits the fragments of the query and probes each of them
//! under the neighboring position bytes too, so an insertion or deletion
//! that shifted the fragment still finds it; queries of up to `n`
//! characters also probe every adjacent transposition.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use heed::{RoTxn, RwTxn};

use crate::codec::word_list;
use crate::index::SpellingIndex;
use crate::termlist::{TermList, WordsTermList};
use crate::{keys, PrefixGroup, Result};

const NGRAM: usize = 3;
const PLACEHOLDER: char = 'H';

/// Builds the fragment body starting at `start`, which hangs over the head
/// of the word when -1 and over its tail when `m - n + 1`.
fn fragment_body(chars: &[char], start: isize) -> String {
    let end = chars.len() as isize - NGRAM as isize + 1;
    let mut body = String::with_capacity(NGRAM * 4);
    for i in start..start + NGRAM as isize {
        if i < 0 || (i == start + NGRAM as isize - 1 && start >= end) {
            body.push(PLACEHOLDER);
        } else {
            body.push(chars[i as usize]);
        }
    }
    body
}

fn bookend_body(chars: &[char]) -> String {
    let mut body = String::with_capacity(NGRAM * 4);
    for _ in 0..NGRAM - 2 {
        body.push(PLACEHOLDER);
    }
    body.push(chars[0]);
    body.push(chars[chars.len() - 1]);
    body
}

/// The buffered fragment toggles of one write batch.
#[derive(Default)]
pub struct TrigramBatch {
    /// For every fragment key, the words whose membership flips at merge.
    /// Toggling a word twice cancels out before anything is written.
    fragment_changes: BTreeMap<Vec<u8>, BTreeSet<String>>,
}

impl TrigramBatch {
    pub fn toggle_word(&mut self, group: PrefixGroup, word: &str) {
        let chars: Vec<char> = word.chars().collect();
        let end = chars.len() as isize - NGRAM as isize + 1;

        // The same fragment can appear at several positions of one word
        // ("aaaa"), only the first occurrence of a key is toggled.
        let mut seen = HashSet::new();

        for start in -1..=end {
            let position = (start + NGRAM as isize) as u8;
            let key = keys::fragment_key(position, group, &fragment_body(&chars, start));
            if seen.insert(key.clone()) {
                self.toggle_fragment(key, word);
            }
        }

        if chars.len() <= NGRAM + 1 {
            let key = keys::fragment_key(1, group, &bookend_body(&chars));
            if seen.insert(key.clone()) {
                self.toggle_fragment(key, word);
            }
        }
    }

    fn toggle_fragment(&mut self, key: Vec<u8>, word: &str) {
        let words = self.fragment_changes.entry(key).or_default();
        if !words.remove(word) {
            words.insert(word.to_owned());
        }
    }

    #[tracing::instrument(level = "trace", skip_all, target = "spelling::trigram")]
    pub fn merge_fragment_changes(
        &mut self,
        wtxn: &mut RwTxn<'_>,
        index: &SpellingIndex,
    ) -> Result<()> {
        for (key, words) in std::mem::take(&mut self.fragment_changes) {
            if words.is_empty() {
                continue;
            }

            let mut list = match index.store.get(wtxn, &key)? {
                Some(bytes) => word_list::decode(bytes)?,
                None => Vec::new(),
            };
            for word in words {
                match list.binary_search_by(|(entry, _)| entry.as_str().cmp(&word)) {
                    Ok(i) => {
                        list.remove(i);
                    }
                    Err(i) => list.insert(i, (word, 1)),
                }
            }

            if list.is_empty() {
                index.store.delete(wtxn, &key)?;
            } else {
                index.store.put(wtxn, &key, &word_list::encode(&list))?;
            }
        }
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.fragment_changes.clear();
    }
}

/// Opens one term list per existing fragment key derived from the query.
pub(crate) fn populate_word(
    index: &SpellingIndex,
    rtxn: &RoTxn<'_>,
    group: PrefixGroup,
    word: &str,
    max_distance: u32,
    results: &mut Vec<TermList>,
) -> Result<()> {
    let mut chars: Vec<char> = word.chars().collect();
    let mut seen = HashSet::new();

    populate_ngram_word(index, rtxn, group, &chars, max_distance, &mut seen, results)?;

    if chars.len() <= NGRAM + 1 {
        let key = keys::fragment_key(1, group, &bookend_body(&chars));
        populate_fragment(index, rtxn, key, &mut seen, results)?;
    }

    // Short words lose every fragment to one transposition, so the swapped
    // variants are probed as well.
    if chars.len() <= NGRAM {
        for i in 0..chars.len() - 1 {
            chars.swap(i, i + 1);
            populate_ngram_word(index, rtxn, group, &chars, max_distance, &mut seen, results)?;
            chars.swap(i, i + 1);
        }
    }

    Ok(())
}

fn populate_ngram_word(
    index: &SpellingIndex,
    rtxn: &RoTxn<'_>,
    group: PrefixGroup,
    chars: &[char],
    max_distance: u32,
    seen: &mut HashSet<Vec<u8>>,
    results: &mut Vec<TermList>,
) -> Result<()> {
    let end = chars.len() as isize - NGRAM as isize + 1;
    for start in -1..=end {
        let body = fragment_body(chars, start);
        // An edit before the fragment shifts its position by up to
        // max_distance, probe the whole window.
        let low = (start - max_distance as isize).max(-1);
        let high = start + max_distance as isize;
        for shifted in low..=high {
            let position = shifted + NGRAM as isize;
            if let Ok(position) = u8::try_from(position) {
                let key = keys::fragment_key(position, group, &body);
                populate_fragment(index, rtxn, key, seen, results)?;
            }
        }
    }
    Ok(())
}

fn populate_fragment(
    index: &SpellingIndex,
    rtxn: &RoTxn<'_>,
    key: Vec<u8>,
    seen: &mut HashSet<Vec<u8>>,
    results: &mut Vec<TermList>,
) -> Result<()> {
    if !seen.insert(key.clone()) {
        return Ok(());
    }
    if let Some(bytes) = index.store.get(rtxn, &key)? {
        let words = word_list::decode(bytes)?.into_iter().map(|(word, _)| word).collect();
        results.push(TermList::Words(WordsTermList::new(words)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments_of(word: &str) -> Vec<Vec<u8>> {
        let mut batch = TrigramBatch::default();
        batch.toggle_word(0, word);
        batch.fragment_changes.into_keys().collect()
    }

    fn body_of(key: &[u8]) -> (u8, &str) {
        (key[0], std::str::from_utf8(&key[5..]).unwrap())
    }

    #[test]
    fn fragments_cover_head_body_and_tail() {
        let keys = fragments_of("hello");
        let bodies: Vec<_> = keys.iter().map(|k| body_of(k)).collect();
        assert_eq!(
            bodies,
            [(2, "Hhe"), (3, "hel"), (4, "ell"), (5, "llo"), (6, "loH")]
        );
    }

    #[test]
    fn short_words_get_a_bookend() {
        let keys = fragments_of("cat");
        let bodies: Vec<_> = keys.iter().map(|k| body_of(k)).collect();
        // Position byte 1 is reserved for the bookend, regular fragments
        // start at 2.
        assert_eq!(bodies, [(1, "Hct"), (2, "Hca"), (3, "cat"), (4, "atH")]);
    }

    #[test]
    fn no_bookend_above_four_characters() {
        let keys = fragments_of("hello");
        assert!(keys.iter().all(|key| key[0] != 1));

        let keys = fragments_of("help");
        assert!(keys.iter().any(|key| key[0] == 1));
    }

    #[test]
    fn repeated_bodies_stay_apart_by_position() {
        let keys = fragments_of("aaaa");
        let bodies: Vec<_> = keys.iter().map(|k| body_of(k)).collect();
        // "aaa" appears at two start positions; the position byte keeps
        // the keys distinct.
        assert_eq!(bodies, [(1, "Haa"), (2, "Haa"), (3, "aaa"), (4, "aaa"), (5, "aaH")]);
    }

    #[test]
    fn double_toggle_cancels_out() {
        let mut batch = TrigramBatch::default();
        batch.toggle_word(0, "hello");
        batch.toggle_word(0, "hello");
        assert!(batch.fragment_changes.values().all(BTreeSet::is_empty));
    }

    #[test]
    fn groups_do_not_share_fragments() {
        let mut batch = TrigramBatch::default();
        batch.toggle_word(0, "hello");
        batch.toggle_word(7, "hello");
        // Same bodies, disjoint keys.
        assert_eq!(batch.fragment_changes.len(), 10);
    }
}
