use std::collections::HashMap;
use std::io;

use ndarray::Array2;

use hicmap_core::models::Region;

use crate::errors::MatrixError;
use crate::region_matrix::RegionMatrix;

///
/// Options for window materialization.
///
#[derive(Debug, Clone)]
pub struct MatrixOpts {
    /// Edge column read into the matrix cells.
    pub score_field: String,
    /// Value of cells no entry lands in.
    pub default_value: f64,
    /// Mask whole rows/columns whose region is marked invalid.
    pub mask_invalid: bool,
}

impl Default for MatrixOpts {
    fn default() -> Self {
        MatrixOpts {
            score_field: "weight".to_string(),
            default_value: 0.0,
            mask_invalid: false,
        }
    }
}

///
/// Materialize a dense window from half-matrix entries.
///
/// Every entry `(source, sink, weight)` is written at its canonical
/// position and mirrored across the diagonal; on the diagonal the two
/// writes coincide. Entries whose endpoints fall outside the window axes
/// are ignored, so callers may stream a covering superset. After filling,
/// each cell is divided by the product of its row and column region
/// biases (`NaN` biases propagate), and invalid regions are masked when
/// requested.
///
pub fn assemble<E>(
    row_regions: Vec<Region>,
    col_regions: Vec<Region>,
    entries: E,
    opts: &MatrixOpts,
) -> Result<RegionMatrix, MatrixError>
where
    E: IntoIterator<Item = io::Result<(u32, u32, f64)>>,
{
    let row_pos: HashMap<u32, usize> = row_regions
        .iter()
        .enumerate()
        .map(|(pos, r)| (r.ix, pos))
        .collect();
    let col_pos: HashMap<u32, usize> = col_regions
        .iter()
        .enumerate()
        .map(|(pos, r)| (r.ix, pos))
        .collect();

    let mut m = Array2::from_elem((row_regions.len(), col_regions.len()), opts.default_value);

    for entry in entries {
        let (source, sink, weight) = entry?;

        if let (Some(&i), Some(&j)) = (row_pos.get(&source), col_pos.get(&sink)) {
            m[[i, j]] = weight;
        }
        if let (Some(&i), Some(&j)) = (row_pos.get(&sink), col_pos.get(&source)) {
            m[[i, j]] = weight;
        }
    }

    // remove matrix biases
    for (i, row_region) in row_regions.iter().enumerate() {
        for (j, col_region) in col_regions.iter().enumerate() {
            m[[i, j]] /= row_region.bias * col_region.bias;
        }
    }

    let mask = if opts.mask_invalid {
        let mut mask = Array2::from_elem(m.dim(), false);
        for (i, row_region) in row_regions.iter().enumerate() {
            if !row_region.valid {
                mask.row_mut(i).fill(true);
            }
        }
        for (j, col_region) in col_regions.iter().enumerate() {
            if !col_region.valid {
                mask.column_mut(j).fill(true);
            }
        }
        Some(mask)
    } else {
        None
    };

    RegionMatrix::with_mask(m, mask, row_regions, col_regions)
}
