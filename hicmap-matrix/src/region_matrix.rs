use std::ops::Range;

use ndarray::{Array2, s};

use hicmap_core::errors::RegionError;
use hicmap_core::models::{GenomeIndex, Region, RegionKey};

use crate::errors::MatrixError;

///
/// A dense row×column window of a contact map, carrying the regions that
/// label each axis. Values are raw or bias-normalized depending on how the
/// window was assembled; an optional boolean mask marks cells belonging to
/// invalid regions.
///
/// Region-keyed access goes through explicit methods ([`sub_matrix`],
/// [`row_slice`], [`col_slice`]) backed by per-axis interval search;
/// positional access uses [`get`] / [`data`].
///
/// [`sub_matrix`]: RegionMatrix::sub_matrix
/// [`row_slice`]: RegionMatrix::row_slice
/// [`col_slice`]: RegionMatrix::col_slice
/// [`get`]: RegionMatrix::get
/// [`data`]: RegionMatrix::data
///
#[derive(Debug, Clone)]
pub struct RegionMatrix {
    data: Array2<f64>,
    mask: Option<Array2<bool>>,
    row_regions: Vec<Region>,
    col_regions: Vec<Region>,
    row_index: GenomeIndex,
    col_index: GenomeIndex,
}

impl RegionMatrix {
    pub fn new(
        data: Array2<f64>,
        row_regions: Vec<Region>,
        col_regions: Vec<Region>,
    ) -> Result<Self, MatrixError> {
        Self::with_mask(data, None, row_regions, col_regions)
    }

    pub fn with_mask(
        data: Array2<f64>,
        mask: Option<Array2<bool>>,
        row_regions: Vec<Region>,
        col_regions: Vec<Region>,
    ) -> Result<Self, MatrixError> {
        let (rows, cols) = data.dim();
        if rows != row_regions.len() || cols != col_regions.len() {
            return Err(MatrixError::ShapeMismatch {
                rows,
                cols,
                row_regions: row_regions.len(),
                col_regions: col_regions.len(),
            });
        }
        if let Some(mask) = &mask
            && mask.dim() != data.dim()
        {
            return Err(MatrixError::ShapeMismatch {
                rows: mask.nrows(),
                cols: mask.ncols(),
                row_regions: row_regions.len(),
                col_regions: col_regions.len(),
            });
        }

        let row_index = GenomeIndex::from_regions(&row_regions);
        let col_index = GenomeIndex::from_regions(&col_regions);
        Ok(RegionMatrix {
            data,
            mask,
            row_regions,
            col_regions,
            row_index,
            col_index,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn row_regions(&self) -> &[Region] {
        &self.row_regions
    }

    pub fn col_regions(&self) -> &[Region] {
        &self.col_regions
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    /// Raw value at a positional cell.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_some_and(|m| m[[row, col]])
    }

    /// Resolve a key to the minimal contiguous slice of row positions.
    pub fn row_slice(&self, key: &RegionKey) -> Result<Range<usize>, RegionError> {
        axis_slice(&self.row_index, self.row_regions.len(), key)
    }

    /// Resolve a key to the minimal contiguous slice of column positions.
    pub fn col_slice(&self, key: &RegionKey) -> Result<Range<usize>, RegionError> {
        axis_slice(&self.col_index, self.col_regions.len(), key)
    }

    ///
    /// Slice a sub-window by a pair of axis keys, carrying over axis
    /// regions and mask.
    ///
    pub fn sub_matrix(
        &self,
        row_key: &RegionKey,
        col_key: &RegionKey,
    ) -> Result<RegionMatrix, MatrixError> {
        let rows = self.row_slice(row_key)?;
        let cols = self.col_slice(col_key)?;

        let data = self
            .data
            .slice(s![rows.start..rows.end, cols.start..cols.end])
            .to_owned();
        let mask = self
            .mask
            .as_ref()
            .map(|m| m.slice(s![rows.start..rows.end, cols.start..cols.end]).to_owned());
        RegionMatrix::with_mask(
            data,
            mask,
            self.row_regions[rows].to_vec(),
            self.col_regions[cols].to_vec(),
        )
    }

    ///
    /// Smallest non-zero, unmasked, non-NaN value; `None` when there is
    /// none.
    ///
    pub fn min_nonzero(&self) -> Option<f64> {
        self.data
            .indexed_iter()
            .filter(|((i, j), v)| !self.is_masked(*i, *j) && **v != 0.0 && !v.is_nan())
            .map(|(_, v)| *v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Largest unmasked, non-NaN value; `None` when there is none.
    pub fn max(&self) -> Option<f64> {
        self.data
            .indexed_iter()
            .filter(|((i, j), v)| !self.is_masked(*i, *j) && !v.is_nan())
            .map(|(_, v)| *v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Check the window for symmetry within a tolerance. Only meaningful
    /// for square windows over identical axes.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        let (rows, cols) = self.shape();
        if rows != cols {
            return false;
        }
        for i in 0..rows {
            for j in i..cols {
                if (self.data[[i, j]] - self.data[[j, i]]).abs() > tol {
                    return false;
                }
            }
        }
        true
    }
}

fn axis_slice(
    index: &GenomeIndex,
    axis_len: usize,
    key: &RegionKey,
) -> Result<Range<usize>, RegionError> {
    match key {
        RegionKey::Index(ix) => {
            let ix = *ix as usize;
            if ix >= axis_len {
                return Err(RegionError::IndexOutOfRange(ix as u32, axis_len as u32));
            }
            Ok(ix..ix + 1)
        }
        RegionKey::Range(a, b) => {
            let a = *a as usize;
            let b = (*b as usize).min(axis_len);
            if a >= b {
                return Err(RegionError::EmptyRange(key.to_string()));
            }
            Ok(a..b)
        }
        RegionKey::Span(span) => index.slice(span),
        RegionKey::List(_) => Err(RegionError::InvalidKey(
            "list keys cannot address a materialized window".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn regions() -> Vec<Region> {
        let mut regions = vec![
            Region::new("chr1", 1, 10),
            Region::new("chr1", 11, 20),
            Region::new("chr2", 1, 10),
        ];
        for (ix, region) in regions.iter_mut().enumerate() {
            region.ix = ix as u32;
        }
        regions
    }

    fn matrix() -> RegionMatrix {
        let data = array![[0.0, 5.0, 1.0], [5.0, 0.0, 3.0], [1.0, 3.0, 0.0]];
        RegionMatrix::new(data, regions(), regions()).unwrap()
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let data = Array2::<f64>::zeros((2, 2));
        assert!(matches!(
            RegionMatrix::new(data, regions(), regions()),
            Err(MatrixError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_sub_matrix_by_span() {
        let m = matrix();
        let sub = m
            .sub_matrix(&"chr1".parse().unwrap(), &"chr1".parse().unwrap())
            .unwrap();
        assert_eq!(sub.shape(), (2, 2));
        assert_eq!(sub.get(0, 1), 5.0);
        assert_eq!(sub.row_regions().len(), 2);
        assert_eq!(sub.row_regions()[1].chromosome, "chr1");
    }

    #[test]
    fn test_sub_matrix_by_positions() {
        let m = matrix();
        let sub = m
            .sub_matrix(&RegionKey::Range(1, 3), &RegionKey::Index(0))
            .unwrap();
        assert_eq!(sub.shape(), (2, 1));
        assert_eq!(sub.get(0, 0), 5.0);
        assert_eq!(sub.get(1, 0), 1.0);
    }

    #[test]
    fn test_unknown_chromosome() {
        let m = matrix();
        let err = m
            .sub_matrix(&"chr9".parse().unwrap(), &"chr1".parse().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            MatrixError::Region(RegionError::UnknownChromosome(_))
        ));
    }

    #[test]
    fn test_min_nonzero_and_max() {
        let m = matrix();
        assert_eq!(m.min_nonzero(), Some(1.0));
        assert_eq!(m.max(), Some(5.0));
    }

    #[test]
    fn test_masked_cells_are_ignored_by_extrema() {
        let data = array![[0.0, 5.0], [5.0, 0.0]];
        let mut mask = Array2::from_elem((2, 2), false);
        mask[[0, 1]] = true;
        mask[[1, 0]] = true;
        let m = RegionMatrix::with_mask(
            data,
            Some(mask),
            regions()[..2].to_vec(),
            regions()[..2].to_vec(),
        )
        .unwrap();
        assert_eq!(m.min_nonzero(), None);
        assert_eq!(m.max(), Some(0.0));
        assert!(m.is_masked(0, 1));
        assert!(!m.is_masked(0, 0));
    }

    #[test]
    fn test_symmetry() {
        assert!(matrix().is_symmetric(1e-10));
    }
}
