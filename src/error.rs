use std::io;

use thiserror::Error;

use crate::WordId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("internal: {0}.")]
    Internal(#[from] InternalError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Heed(#[from] heed::Error),
}

#[derive(Error, Debug)]
pub enum InternalError {
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    #[error("spelling term lists do not provide {0}")]
    Unimplemented(&'static str),
    #[error("the 24-bit word id space is exhausted")]
    WordIdSpaceExhausted,
}

/// An on-disk spelling entry cannot be decoded. Never retried, always
/// surfaced to the caller.
#[derive(Error, Debug)]
pub enum CorruptionError {
    #[error("invalid varint in the {entry} entry")]
    BadVarint { entry: &'static str },
    #[error("stored spelling frequency is zero")]
    ZeroFrequency,
    #[error("posting list length is not a multiple of 4 bytes")]
    PostingListSize,
    #[error("allocator state entry has an invalid length")]
    AllocatorState,
    #[error("word id {0} is missing from the id to word map")]
    MissingWord(WordId),
    #[error("stored spelling word is not valid UTF-8")]
    BadWordEncoding,
    #[error("prefix-compressed word list is truncated")]
    TruncatedWordList,
}

impl From<CorruptionError> for Error {
    fn from(error: CorruptionError) -> Error {
        Error::Internal(InternalError::Corruption(error))
    }
}
