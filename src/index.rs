use std::path::Path;

use heed::types::Bytes;
use heed::{Database, EnvOpenOptions, RoPrefix, RoTxn, RwTxn, WithoutTls};

use crate::codec::{posting, varint};
use crate::engine::{fastss, trigram, SpellingEngine};
use crate::error::{CorruptionError, Error};
use crate::termlist::{self, TermList};
use crate::{keys, PrefixGroup, Result, WordId};

pub mod db_name {
    pub const SPELLING: &str = "spelling";
}

/// The spelling table of the database: word and word-pair frequencies plus
/// the fragment index of whichever engine it was opened with.
#[derive(Clone)]
pub struct SpellingIndex {
    /// The LMDB environment which this spelling table is associated with.
    pub(crate) env: heed::Env<WithoutTls>,

    /// Holds every spelling key, kept apart by their signature bytes.
    pub(crate) store: Database<Bytes, Bytes>,

    engine: SpellingEngine,
}

impl SpellingIndex {
    pub fn new<P: AsRef<Path>>(
        mut options: EnvOpenOptions<WithoutTls>,
        path: P,
        engine: SpellingEngine,
    ) -> Result<SpellingIndex> {
        options.max_dbs(1);

        let env = unsafe { options.open(path) }?;
        let mut wtxn = env.write_txn()?;
        let store = env.create_database(&mut wtxn, Some(db_name::SPELLING))?;
        wtxn.commit()?;

        Ok(SpellingIndex { env, store, engine })
    }

    /// The engine this table was opened with. Mixing engines over the same
    /// table is not supported, open it with the engine that wrote it.
    pub fn engine(&self) -> SpellingEngine {
        self.engine
    }

    /// Create a read transaction to read from this spelling table.
    pub fn read_txn(&self) -> heed::Result<RoTxn<'_, WithoutTls>> {
        self.env.read_txn()
    }

    /// Create a write transaction for a [`crate::SpellingSession`].
    pub fn write_txn(&self) -> heed::Result<RwTxn<'_>> {
        self.env.write_txn()
    }

    /* prefix-group registry */

    /// Enables spelling for an application prefix.
    ///
    /// The empty prefix is always enabled as group 0. When `alias_of`
    /// names an already-enabled prefix, the new prefix joins its group and
    /// the two share all their spelling data; otherwise a fresh group id
    /// is drawn from the `GROUPMAX` counter. Group ids are never reused.
    pub fn enable_spelling(
        &self,
        wtxn: &mut RwTxn<'_>,
        prefix: &str,
        alias_of: Option<&str>,
    ) -> Result<()> {
        if prefix.is_empty() {
            return Ok(());
        }
        let key = keys::group_key(prefix);
        if self.store.get(wtxn, &key)?.is_some() {
            return Ok(());
        }

        let alias_group = match alias_of.filter(|alias| !alias.is_empty()) {
            Some(alias) => match self.store.get(wtxn, &keys::group_key(alias))? {
                Some(bytes) => Some(varint::decode_u32(bytes, "group id")?),
                None => None,
            },
            None => None,
        };
        let group = match alias_group {
            Some(group) => group,
            None => self.allocate_group(wtxn)?,
        };

        let mut value = Vec::new();
        varint::encode_into(&mut value, u64::from(group));
        self.store.put(wtxn, &key, &value)?;
        Ok(())
    }

    fn allocate_group(&self, wtxn: &mut RwTxn<'_>) -> Result<PrefixGroup> {
        let group = match self.store.get(wtxn, keys::GROUPMAX)? {
            Some(bytes) => varint::decode_u32(bytes, "GROUPMAX")?,
            None => 1,
        };
        let mut value = Vec::new();
        varint::encode_into(&mut value, u64::from(group) + 1);
        self.store.put(wtxn, keys::GROUPMAX, &value)?;
        tracing::debug!(group, "allocated a new spelling group");
        Ok(group)
    }

    /// Disables spelling for an application prefix.
    ///
    /// Only the registry entry is deleted: the fragments, ids and
    /// frequencies of the group stay on disk, unreachable until the group
    /// is joined again through an alias.
    pub fn disable_spelling(&self, wtxn: &mut RwTxn<'_>, prefix: &str) -> Result<()> {
        self.store.delete(wtxn, &keys::group_key(prefix))?;
        Ok(())
    }

    pub fn is_spelling_enabled(&self, rtxn: &RoTxn<'_>, prefix: &str) -> Result<bool> {
        Ok(self.spelling_group(rtxn, prefix)?.is_some())
    }

    /// The group of this prefix, or `None` when spelling is disabled for
    /// it. The empty prefix is always group 0.
    pub fn spelling_group(&self, rtxn: &RoTxn<'_>, prefix: &str) -> Result<Option<PrefixGroup>> {
        if prefix.is_empty() {
            return Ok(Some(0));
        }
        match self.store.get(rtxn, &keys::group_key(prefix))? {
            Some(bytes) => Ok(Some(varint::decode_u32(bytes, "group id")?)),
            None => Ok(None),
        }
    }

    /* word and word-pair frequencies */

    /// The persisted frequency of a word, 0 when absent or when spelling
    /// is disabled for the prefix.
    pub fn word_frequency(&self, rtxn: &RoTxn<'_>, word: &str, prefix: &str) -> Result<u32> {
        match self.spelling_group(rtxn, prefix)? {
            Some(group) => self.stored_frequency(rtxn, &keys::word_frequency_key(group, word)),
            None => Ok(0),
        }
    }

    /// The persisted frequency of an unordered pair of words.
    pub fn words_frequency(
        &self,
        rtxn: &RoTxn<'_>,
        first: &str,
        second: &str,
        prefix: &str,
    ) -> Result<u32> {
        if second.is_empty() {
            return self.word_frequency(rtxn, first, prefix);
        }
        if first.is_empty() {
            return self.word_frequency(rtxn, second, prefix);
        }
        match self.spelling_group(rtxn, prefix)? {
            Some(group) => {
                self.stored_frequency(rtxn, &keys::words_frequency_key(group, first, second))
            }
            None => Ok(0),
        }
    }

    pub(crate) fn stored_frequency(&self, rtxn: &RoTxn<'_>, key: &[u8]) -> Result<u32> {
        match self.store.get(rtxn, key)? {
            Some(bytes) => {
                let freq = varint::decode_u32(bytes, "frequency")?;
                if freq == 0 {
                    return Err(CorruptionError::ZeroFrequency.into());
                }
                Ok(freq)
            }
            None => Ok(0),
        }
    }

    /* candidate retrieval */

    /// Opens an iterator over the stored words approximately matching
    /// `word`: the union, through a size-balanced OR-tree, of the posting
    /// lists of every fragment the engine derives from the query.
    ///
    /// `max_edits` bounds the tolerated distance; the length of the word
    /// is the usual permissive default. Returns `None` when there is
    /// nothing to iterate on, notably for a disabled prefix or a
    /// single-character word.
    pub fn open_termlist(
        &self,
        rtxn: &RoTxn<'_>,
        word: &str,
        prefix: &str,
        max_edits: u32,
    ) -> Result<Option<TermList>> {
        if word.chars().take(2).count() <= 1 {
            return Ok(None);
        }
        let Some(group) = self.spelling_group(rtxn, prefix)? else { return Ok(None) };

        let mut lists = Vec::new();
        match self.engine {
            SpellingEngine::Trigram => {
                trigram::populate_word(self, rtxn, group, word, max_edits, &mut lists)?
            }
            SpellingEngine::Fastss => {
                fastss::populate_word(self, rtxn, group, word, max_edits, &mut lists)?
            }
        }
        Ok(termlist::build_or_tree(lists))
    }

    /// Walks every stored word of the prefix with its frequency, in
    /// ascending byte order.
    pub fn words<'t>(&self, rtxn: &'t RoTxn<'_>, prefix: &str) -> Result<SpellingWords<'t>> {
        let iter = match self.spelling_group(rtxn, prefix)? {
            Some(group) => {
                let key_prefix = keys::word_frequency_prefix(group);
                Some(self.store.prefix_iter(rtxn, &key_prefix)?)
            }
            None => None,
        };
        Ok(SpellingWords { iter })
    }

    /* word-id allocator state */

    /// The allocator high-water mark: the next never-used word id.
    pub fn word_id_limit(&self, rtxn: &RoTxn<'_>) -> Result<WordId> {
        match self.store.get(rtxn, keys::INDEXMAX)? {
            Some(bytes) => {
                let bytes = bytes.try_into().map_err(|_| CorruptionError::AllocatorState)?;
                Ok(WordId::from_le_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// The allocator free list, most recently freed id last.
    pub fn free_word_ids(&self, rtxn: &RoTxn<'_>) -> Result<Vec<WordId>> {
        match self.store.get(rtxn, keys::INDEXSTACK)? {
            Some(bytes) => Ok(posting::read_u32s(bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// The word owning this id, `None` when the id is free.
    pub(crate) fn word_for_id(&self, rtxn: &RoTxn<'_>, id: WordId) -> Result<Option<String>> {
        match self.store.get(rtxn, &keys::id_word_key(id))? {
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(word) => Ok(Some(word.to_owned())),
                Err(_) => Err(CorruptionError::BadWordEncoding.into()),
            },
            None => Ok(None),
        }
    }
}

/// Iterator over the `(word, frequency)` entries of one prefix group.
pub struct SpellingWords<'t> {
    iter: Option<RoPrefix<'t, Bytes, Bytes>>,
}

impl Iterator for SpellingWords<'_> {
    type Item = Result<(String, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.iter.as_mut()?.next()?;
        Some(result.map_err(Error::from).and_then(|(key, value)| {
            // The 5 leading bytes are the `W` signature and the group.
            let word = std::str::from_utf8(&key[5..])
                .map_err(|_| Error::from(CorruptionError::BadWordEncoding))?;
            let freq = varint::decode_u32(value, "frequency")?;
            if freq == 0 {
                return Err(CorruptionError::ZeroFrequency.into());
            }
            Ok((word.to_owned(), freq))
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::ops::Deref;

    use heed::EnvOpenOptions;
    use tempfile::TempDir;

    use super::*;

    pub(crate) struct TempSpelling {
        pub inner: SpellingIndex,
        _tempdir: TempDir,
    }

    impl Deref for TempSpelling {
        type Target = SpellingIndex;

        fn deref(&self) -> &Self::Target {
            &self.inner
        }
    }

    impl TempSpelling {
        pub fn new(engine: SpellingEngine) -> TempSpelling {
            let options = EnvOpenOptions::new();
            let mut options = options.read_txn_without_tls();
            options.map_size(4096 * 2000);
            let _tempdir = TempDir::new().unwrap();
            let inner = SpellingIndex::new(options, _tempdir.path(), engine).unwrap();
            TempSpelling { inner, _tempdir }
        }
    }

    #[test]
    fn empty_prefix_is_always_group_zero() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let rtxn = index.read_txn().unwrap();
        assert_eq!(index.spelling_group(&rtxn, "").unwrap(), Some(0));
        assert!(index.is_spelling_enabled(&rtxn, "").unwrap());
    }

    #[test]
    fn groups_are_allocated_sequentially() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "title", None).unwrap();
        index.enable_spelling(&mut wtxn, "body", None).unwrap();

        assert_eq!(index.spelling_group(&wtxn, "title").unwrap(), Some(1));
        assert_eq!(index.spelling_group(&wtxn, "body").unwrap(), Some(2));
        assert_eq!(index.spelling_group(&wtxn, "other").unwrap(), None);
    }

    #[test]
    fn enabling_twice_keeps_the_first_group() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "title", None).unwrap();
        index.enable_spelling(&mut wtxn, "title", None).unwrap();
        assert_eq!(index.spelling_group(&wtxn, "title").unwrap(), Some(1));
    }

    #[test]
    fn aliased_prefixes_share_a_group() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "A", None).unwrap();
        index.enable_spelling(&mut wtxn, "B", Some("A")).unwrap();
        index.enable_spelling(&mut wtxn, "C", None).unwrap();

        assert_eq!(index.spelling_group(&wtxn, "A").unwrap(), Some(1));
        assert_eq!(index.spelling_group(&wtxn, "B").unwrap(), Some(1));
        assert_eq!(index.spelling_group(&wtxn, "C").unwrap(), Some(2));
    }

    #[test]
    fn aliasing_a_disabled_prefix_allocates_a_fresh_group() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "B", Some("A")).unwrap();
        assert_eq!(index.spelling_group(&wtxn, "B").unwrap(), Some(1));
        assert_eq!(index.spelling_group(&wtxn, "A").unwrap(), None);
    }

    #[test]
    fn disabling_removes_only_the_registry_entry() {
        let index = TempSpelling::new(SpellingEngine::Trigram);
        let mut wtxn = index.write_txn().unwrap();
        index.enable_spelling(&mut wtxn, "title", None).unwrap();
        index.disable_spelling(&mut wtxn, "title").unwrap();
        assert_eq!(index.spelling_group(&wtxn, "title").unwrap(), None);

        // Group ids are never reused, even after a disable.
        index.enable_spelling(&mut wtxn, "title", None).unwrap();
        assert_eq!(index.spelling_group(&wtxn, "title").unwrap(), Some(2));
    }
}
