use thiserror::Error;

use hicmap_core::errors::RegionError;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("matrix is {rows}x{cols} but {row_regions} row and {col_regions} col regions were given")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        row_regions: usize,
        col_regions: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
