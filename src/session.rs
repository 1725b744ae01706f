//! The write batch of the spelling table.
//!
//! Frequency changes accumulate in memory and only hit the table on
//! [`SpellingSession::merge_changes`]; the engine buffers a fragment
//! toggle for every frequency that crosses zero, so the fragment index
//! always reflects exactly the set of live words after a merge. The
//! caller owns the transaction boundary and commits the `RwTxn` itself,
//! nothing is visible before that.

use std::collections::BTreeMap;
use std::mem;

use heed::RwTxn;

use crate::codec::varint;
use crate::engine::EngineBatch;
use crate::index::SpellingIndex;
use crate::termlist::TermList;
use crate::{keys, Result, MAX_WORD_LENGTH};

pub struct SpellingSession<'t, 'i> {
    wtxn: &'t mut RwTxn<'i>,
    index: &'i SpellingIndex,
    wordfreq_changes: BTreeMap<Vec<u8>, u32>,
    wordsfreq_changes: BTreeMap<Vec<u8>, u32>,
    engine: EngineBatch,
}

impl<'t, 'i> SpellingSession<'t, 'i> {
    pub fn new(wtxn: &'t mut RwTxn<'i>, index: &'i SpellingIndex) -> SpellingSession<'t, 'i> {
        let engine = EngineBatch::new(index.engine());
        SpellingSession {
            wtxn,
            index,
            wordfreq_changes: BTreeMap::new(),
            wordsfreq_changes: BTreeMap::new(),
            engine,
        }
    }

    /// Counts `freqinc` sightings of `word` as a correct spelling.
    ///
    /// Single-character and overlong words are silently ignored, as are
    /// words under a disabled prefix.
    pub fn add_word(&mut self, word: &str, prefix: &str, freqinc: u32) -> Result<()> {
        if word.chars().take(2).count() <= 1 || word.len() > MAX_WORD_LENGTH {
            return Ok(());
        }
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(());
        };

        let key = keys::word_frequency_key(group, word);
        match self.wordfreq_changes.get(&key).copied() {
            // The word exists and was already touched this batch.
            Some(freq) if freq > 0 => {
                self.wordfreq_changes.insert(key, freq + freqinc);
                return Ok(());
            }
            // The word was removed this batch, re-adding it means its
            // fragments have to come back too.
            Some(_) => {
                self.wordfreq_changes.insert(key, freqinc);
            }
            None => {
                let stored = self.index.stored_frequency(self.wtxn, &key)?;
                if stored != 0 {
                    self.wordfreq_changes.insert(key, stored + freqinc);
                    return Ok(());
                }
                self.wordfreq_changes.insert(key, freqinc);
            }
        }

        // The frequency crossed zero upwards: index the word.
        self.engine.toggle_word(group, word);
        Ok(())
    }

    /// Discounts `freqdec` sightings of `word`, unindexing it when its
    /// frequency reaches zero.
    pub fn remove_word(&mut self, word: &str, prefix: &str, freqdec: u32) -> Result<()> {
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(());
        };

        let key = keys::word_frequency_key(group, word);
        match self.wordfreq_changes.get(&key).copied() {
            // Already removed this batch.
            Some(0) => return Ok(()),
            Some(freq) if freqdec < freq => {
                self.wordfreq_changes.insert(key, freq - freqdec);
                return Ok(());
            }
            Some(_) => {
                self.wordfreq_changes.insert(key, 0);
            }
            None => {
                let stored = self.index.stored_frequency(self.wtxn, &key)?;
                if stored == 0 {
                    return Ok(());
                }
                if freqdec < stored {
                    self.wordfreq_changes.insert(key, stored - freqdec);
                    return Ok(());
                }
                self.wordfreq_changes.insert(key, 0);
            }
        }

        // The frequency crossed zero downwards: unindex the word.
        self.engine.toggle_word(group, word);
        Ok(())
    }

    /// Counts `freqinc` sightings of the unordered pair. An empty side
    /// falls back to the single-word path. Pairs never touch the
    /// fragment index.
    pub fn add_words(
        &mut self,
        first: &str,
        second: &str,
        prefix: &str,
        freqinc: u32,
    ) -> Result<()> {
        if second.is_empty() {
            return self.add_word(first, prefix, freqinc);
        }
        if first.is_empty() {
            return self.add_word(second, prefix, freqinc);
        }
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(());
        };

        let key = keys::words_frequency_key(group, first, second);
        let freq = match self.wordsfreq_changes.get(&key) {
            Some(freq) => *freq,
            None => self.index.stored_frequency(self.wtxn, &key)?,
        };
        self.wordsfreq_changes.insert(key, freq + freqinc);
        Ok(())
    }

    /// Discounts `freqdec` sightings of the unordered pair, clamping at
    /// zero.
    pub fn remove_words(
        &mut self,
        first: &str,
        second: &str,
        prefix: &str,
        freqdec: u32,
    ) -> Result<()> {
        if second.is_empty() {
            return self.remove_word(first, prefix, freqdec);
        }
        if first.is_empty() {
            return self.remove_word(second, prefix, freqdec);
        }
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(());
        };

        let key = keys::words_frequency_key(group, first, second);
        let freq = match self.wordsfreq_changes.get(&key) {
            Some(freq) => *freq,
            None => self.index.stored_frequency(self.wtxn, &key)?,
        };
        self.wordsfreq_changes.insert(key, freq.saturating_sub(freqdec));
        Ok(())
    }

    /// The frequency of a word as this session sees it: pending changes
    /// win over the table.
    pub fn word_frequency(&self, word: &str, prefix: &str) -> Result<u32> {
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(0);
        };
        let key = keys::word_frequency_key(group, word);
        match self.wordfreq_changes.get(&key) {
            Some(freq) => Ok(*freq),
            None => self.index.stored_frequency(self.wtxn, &key),
        }
    }

    /// The frequency of an unordered pair as this session sees it.
    pub fn words_frequency(&self, first: &str, second: &str, prefix: &str) -> Result<u32> {
        if second.is_empty() {
            return self.word_frequency(first, prefix);
        }
        if first.is_empty() {
            return self.word_frequency(second, prefix);
        }
        let Some(group) = self.index.spelling_group(self.wtxn, prefix)? else {
            return Ok(0);
        };
        let key = keys::words_frequency_key(group, first, second);
        match self.wordsfreq_changes.get(&key) {
            Some(freq) => Ok(*freq),
            None => self.index.stored_frequency(self.wtxn, &key),
        }
    }

    /// Opens a term list over the session's view of the table: pending
    /// changes are merged into the transaction first (but stay invisible
    /// to others until the caller commits).
    pub fn open_termlist(
        &mut self,
        word: &str,
        prefix: &str,
        max_edits: u32,
    ) -> Result<Option<TermList>> {
        if !self.wordfreq_changes.is_empty() {
            self.merge_changes()?;
        }
        self.index.open_termlist(self.wtxn, word, prefix, max_edits)
    }

    /// Flushes every buffered delta into the transaction. Calling it
    /// twice in a row is a no-op: all the buffers drain on the first run.
    #[tracing::instrument(level = "trace", skip_all, target = "spelling")]
    pub fn merge_changes(&mut self) -> Result<()> {
        self.engine.merge_fragment_changes(self.wtxn, self.index)?;

        for (key, freq) in mem::take(&mut self.wordfreq_changes) {
            self.set_frequency(&key, freq)?;
        }
        for (key, freq) in mem::take(&mut self.wordsfreq_changes) {
            self.set_frequency(&key, freq)?;
        }
        Ok(())
    }

    fn set_frequency(&mut self, key: &[u8], freq: u32) -> Result<()> {
        if freq != 0 {
            let mut value = Vec::new();
            varint::encode_into(&mut value, u64::from(freq));
            self.index.store.put(self.wtxn, key, &value)?;
        } else {
            self.index.store.delete(self.wtxn, key)?;
        }
        Ok(())
    }

    /// Terminal merge, the update-builder way. The caller still commits
    /// the transaction.
    pub fn execute(mut self) -> Result<()> {
        self.merge_changes()
    }

    /// Drops every buffered delta. Aborting the transaction afterwards is
    /// the caller's call, like committing.
    pub fn cancel(&mut self) {
        self.wordfreq_changes.clear();
        self.wordsfreq_changes.clear();
        self.engine.cancel();
    }
}

#[cfg(test)]
mod tests {
    use big_s::S;

    use crate::engine::SpellingEngine;
    use crate::index::tests::TempSpelling;
    use crate::SpellingSession;

    #[test]
    fn frequencies_accumulate_and_round_trip() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 2).unwrap();
        session.add_word("hello", "", 3).unwrap();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 5);
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "").unwrap(), 5);
        assert_eq!(index.word_frequency(&rtxn, "helo", "").unwrap(), 0);
    }

    #[test]
    fn short_and_overlong_words_are_ignored() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("x", "", 1).unwrap();
        session.add_word("", "", 1).unwrap();
        let overlong = "a".repeat(251);
        session.add_word(&overlong, "", 1).unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "x", "").unwrap(), 0);
        assert_eq!(index.word_frequency(&rtxn, &overlong, "").unwrap(), 0);
        assert_eq!(index.words(&rtxn, "").unwrap().count(), 0);
    }

    #[test]
    fn disabled_prefix_is_a_silent_no_op() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "nowhere", 1).unwrap();
        assert_eq!(session.word_frequency("hello", "nowhere").unwrap(), 0);
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "nowhere").unwrap(), 0);
        assert!(index.open_termlist(&rtxn, "hello", "nowhere", 2).unwrap().is_none());
    }

    #[test]
    fn removal_decrements_then_deletes() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 3).unwrap();
        session.remove_word("hello", "", 1).unwrap();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 2);
        session.remove_word("hello", "", 5).unwrap();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 0);
        // Removing a word that was never there stays quiet.
        session.remove_word("absent", "", 1).unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "").unwrap(), 0);
        assert_eq!(index.words(&rtxn, "").unwrap().count(), 0);
    }

    #[test]
    fn pair_frequencies_are_unordered() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_words("new", "york", "", 1).unwrap();
        session.add_words("york", "new", "", 1).unwrap();
        assert_eq!(session.words_frequency("new", "york", "").unwrap(), 2);
        assert_eq!(session.words_frequency("york", "new", "").unwrap(), 2);
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.words_frequency(&rtxn, "new", "york", "").unwrap(), 2);
        assert_eq!(index.words_frequency(&rtxn, "york", "new", "").unwrap(), 2);
        // Pairs do not create word entries.
        assert_eq!(index.word_frequency(&rtxn, "york", "").unwrap(), 0);
    }

    #[test]
    fn empty_pair_side_falls_back_to_the_word_path() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_words("hello", "", "", 1).unwrap();
        session.add_words("", "hello", "", 1).unwrap();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 2);
        assert_eq!(session.words_frequency("hello", "", "").unwrap(), 2);
        session.execute().unwrap();
    }

    #[test]
    fn cancel_drops_the_pending_deltas() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 1).unwrap();
        session.cancel();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 0);
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "").unwrap(), 0);
        assert_eq!(index.words(&rtxn, "").unwrap().count(), 0);
    }

    #[test]
    fn merge_changes_is_idempotent() {
        let index = TempSpelling::new(SpellingEngine::Fastss);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 1).unwrap();
        session.merge_changes().unwrap();
        session.merge_changes().unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "").unwrap(), 1);
        assert_eq!(index.word_id_limit(&rtxn).unwrap(), 1);
    }

    #[test]
    fn termlist_sees_the_uncommitted_batch() {
        let index = TempSpelling::new(SpellingEngine::Fastss);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 1).unwrap();
        let mut list = session.open_termlist("helo", "", 2).unwrap().unwrap();
        list.next().unwrap();
        assert_eq!(list.get_termname(), "hello");
        session.execute().unwrap();
    }

    #[test]
    fn remove_then_readd_within_a_batch_reindexes() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 1).unwrap();
        session.execute().unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.remove_word("hello", "", 1).unwrap();
        session.add_word("hello", "", 4).unwrap();
        assert_eq!(session.word_frequency("hello", "").unwrap(), 4);
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.word_frequency(&rtxn, "hello", "").unwrap(), 4);
        let mut list = index.open_termlist(&rtxn, "hello", "", 1).unwrap().unwrap();
        list.next().unwrap();
        assert_eq!(list.get_termname(), "hello");
    }

    #[test]
    fn words_walks_one_group_in_order() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "title", None).unwrap();

        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("pear", "", 2).unwrap();
        session.add_word("apple", "", 1).unwrap();
        session.add_word("plum", "title", 7).unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        let words: Vec<_> =
            index.words(&rtxn, "").unwrap().collect::<crate::Result<_>>().unwrap();
        assert_eq!(words, [(S("apple"), 1), (S("pear"), 2)]);
        let words: Vec<_> =
            index.words(&rtxn, "title").unwrap().collect::<crate::Result<_>>().unwrap();
        assert_eq!(words, [(S("plum"), 7)]);
    }
}
