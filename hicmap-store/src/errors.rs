use thiserror::Error;

use hicmap_core::errors::RegionError;
use hicmap_matrix::MatrixError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("edge references region {0}, but only {1} regions exist")]
    NodeIndexOutOfRange(u32, u32),

    #[error("edge schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("regions are frozen once edges have been flushed")]
    RegionsFrozen,

    #[error("store is corrupt: {0}")]
    CorruptStore(String),

    #[error("not a contact map store (class id {0:?})")]
    UnknownClassId(String),

    #[error("invalid partition bin size {0}")]
    InvalidBinSize(u32),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("store metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("region table codec error: {0}")]
    RegionCodec(#[from] bincode::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
