//! Error taxonomy for the whole crate.
//!
//! Every fallible operation returns [`Result<T>`]. Writer and scanner both
//! treat their first error as sticky: once set, it is cloned and returned
//! from every later call instead of retrying the failed operation.
//! `Error` wraps `io::Error`, which is not `Clone`, so sticky storage holds
//! `Arc<Error>` rather than `Error` itself — see `writer::Writer::err`.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// CRC mismatch or out-of-range payload size on a single chunk.
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// Item-size sum mismatch, truncated varint, index gap, or magic change
    /// mid-block.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    /// Unknown tag, truncated metadata, non-UTF-8 string, or an unreasonable
    /// declared length in the header codec.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A transformer descriptor names a factory the registry does not have.
    #[error("unknown transformer: {0}")]
    UnknownTransformer(String),

    /// A forward or inverse transformer function returned an error.
    #[error("transform failed: {0}")]
    TransformFailure(String),

    /// The application's marshal callback failed.
    #[error("marshal failed: {0}")]
    MarshalFailure(String),

    /// The application's unmarshal callback failed.
    #[error("unmarshal failed: {0}")]
    UnmarshalFailure(String),

    /// The byte source or sink reported an error or a short read/write.
    #[error("io failure: {0}")]
    IoFailure(#[from] io::Error),

    /// An API was called out of the allowed state-machine sequence.
    #[error("bad state: {0}")]
    BadState(String),

    /// `seek`'s item index exceeds the target block's item count.
    #[error("bad location: {0}")]
    BadLocation(String),

    /// Legacy read encountered a record length above the configured cap.
    #[error("oversized record: {0}")]
    OversizedRecord(String),

    /// Invalid shard range, or sharding requested on a legacy file.
    #[error("bad shard: {0}")]
    BadShard(String),
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::CorruptChunk(s) => Error::CorruptChunk(s.clone()),
            Error::CorruptBlock(s) => Error::CorruptBlock(s.clone()),
            Error::CorruptHeader(s) => Error::CorruptHeader(s.clone()),
            Error::UnknownTransformer(s) => Error::UnknownTransformer(s.clone()),
            Error::TransformFailure(s) => Error::TransformFailure(s.clone()),
            Error::MarshalFailure(s) => Error::MarshalFailure(s.clone()),
            Error::UnmarshalFailure(s) => Error::UnmarshalFailure(s.clone()),
            Error::IoFailure(e) => Error::IoFailure(io::Error::new(e.kind(), e.to_string())),
            Error::BadState(s) => Error::BadState(s.clone()),
            Error::BadLocation(s) => Error::BadLocation(s.clone()),
            Error::OversizedRecord(s) => Error::OversizedRecord(s.clone()),
            Error::BadShard(s) => Error::BadShard(s.clone()),
        }
    }
}
