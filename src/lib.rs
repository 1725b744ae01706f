//! A spelling-correction engine persisted in LMDB.
//!
//! Words are counted per *prefix group* (a namespace usually mapping to a
//! field of the enclosing search database) and indexed by one of two
//! interchangeable approximate-matching engines: positional trigrams or a
//! FastSS deletion neighborhood. Candidate retrieval walks the posting
//! lists of the query fragments through a Huffman-balanced OR-tree.

mod codec;
mod engine;
mod error;
mod index;
pub mod keyboard;
mod keys;
mod session;
mod suggestion;
mod termlist;

pub use heed;

pub use self::engine::fastss::{LIMIT, MAX_DISTANCE, PREFIX_LENGTH};
pub use self::engine::SpellingEngine;
pub use self::error::{CorruptionError, Error, InternalError};
pub use self::index::{SpellingIndex, SpellingWords};
pub use self::session::SpellingSession;
pub use self::suggestion::Suggestion;
pub use self::termlist::TermList;

pub type Result<T> = std::result::Result<T, error::Error>;

/// The namespace id allocated to an application prefix.
pub type PrefixGroup = u32;

/// The stable 24-bit identifier the FastSS allocator assigns to a word.
pub type WordId = u32;

/// The maximum length in bytes a word can be to get indexed.
///
/// Longer words would overflow the one-byte length and position fields of
/// the fragment encodings, and make no sense as spelling targets anyway.
pub const MAX_WORD_LENGTH: usize = 250;
