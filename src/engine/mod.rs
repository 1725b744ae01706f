//! The two interchangeable approximate-matching engines.
//!
//! Both expose the same capability set: buffering word toggles, merging
//! the buffered fragment changes into the table, enumerating the posting
//! lists of a query word, and cancelling. The outer session dispatches to
//! whichever variant the index was opened with.

pub mod fastss;
pub mod trigram;

use heed::RwTxn;

use crate::index::SpellingIndex;
use crate::{PrefixGroup, Result};

/// The engine indexing the words of a spelling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellingEngine {
    /// Positional trigram fragments with bookends for short words.
    Trigram,
    /// FastSS deletion neighborhood with a free-list word-id allocator.
    Fastss,
}

/// The per-session write buffer of an engine.
pub(crate) enum EngineBatch {
    Trigram(trigram::TrigramBatch),
    Fastss(fastss::FastssBatch),
}

impl EngineBatch {
    pub fn new(engine: SpellingEngine) -> EngineBatch {
        match engine {
            SpellingEngine::Trigram => EngineBatch::Trigram(trigram::TrigramBatch::default()),
            SpellingEngine::Fastss => EngineBatch::Fastss(fastss::FastssBatch::default()),
        }
    }

    /// Buffers a live/dead transition of `word`: inserted on its first
    /// appearance, removed again on its complete removal.
    pub fn toggle_word(&mut self, group: PrefixGroup, word: &str) {
        match self {
            EngineBatch::Trigram(batch) => batch.toggle_word(group, word),
            EngineBatch::Fastss(batch) => batch.toggle_word(group, word),
        }
    }

    /// Merges every buffered toggle into the table and clears the buffer.
    pub fn merge_fragment_changes(
        &mut self,
        wtxn: &mut RwTxn<'_>,
        index: &SpellingIndex,
    ) -> Result<()> {
        match self {
            EngineBatch::Trigram(batch) => batch.merge_fragment_changes(wtxn, index),
            EngineBatch::Fastss(batch) => batch.merge_fragment_changes(wtxn, index),
        }
    }

    /// Drops every buffered toggle.
    pub fn cancel(&mut self) {
        match self {
            EngineBatch::Trigram(batch) => batch.cancel(),
            EngineBatch::Fastss(batch) => batch.cancel(),
        }
    }
}
