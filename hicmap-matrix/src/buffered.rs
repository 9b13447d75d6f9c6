use log::debug;

use hicmap_core::models::{GenomicSpan, RegionKey};

use crate::errors::MatrixError;
use crate::region_matrix::RegionMatrix;

///
/// Capability of materializing dense windows addressed by genomic spans.
/// Implemented by the persistent store and by [`RegionMatrix`] itself (for
/// the already-materialized case), so the [`BufferedMatrix`] overlay works
/// identically over both.
///
pub trait MatrixProvider {
    type Error;

    /// Materialize the window addressed by a pair of spans.
    fn window(
        &mut self,
        rows: &GenomicSpan,
        cols: &GenomicSpan,
    ) -> Result<RegionMatrix, Self::Error>;

    /// Materialize the entire matrix.
    fn full(&mut self) -> Result<RegionMatrix, Self::Error>;
}

impl MatrixProvider for RegionMatrix {
    type Error = MatrixError;

    fn window(
        &mut self,
        rows: &GenomicSpan,
        cols: &GenomicSpan,
    ) -> Result<RegionMatrix, Self::Error> {
        self.sub_matrix(
            &RegionKey::Span(rows.clone()),
            &RegionKey::Span(cols.clone()),
        )
    }

    fn full(&mut self) -> Result<RegionMatrix, Self::Error> {
        Ok(self.clone())
    }
}

///
/// How much of the matrix to prefetch around a requested window.
///
/// - `All` fetches the whole matrix once; later queries always hit.
/// - `Fixed(k)` pads each axis by `k` positions on both sides.
/// - `Relative(k)` pads each axis by `k` times the requested width.
///
/// Padding clamps at position 1 and open-ended span sides are left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferStrategy {
    All,
    Fixed(u32),
    Relative(f64),
}

#[derive(Debug, Clone)]
enum BufferedExtent {
    All,
    Window(GenomicSpan, GenomicSpan),
}

///
/// Prefetching cache over a [`MatrixProvider`]. Repeated queries for
/// nearby windows are served by slicing the cached window instead of
/// re-materializing from the source.
///
#[derive(Debug)]
pub struct BufferedMatrix<P> {
    provider: P,
    strategy: BufferStrategy,
    buffered: Option<(BufferedExtent, RegionMatrix)>,
}

impl<P> BufferedMatrix<P> {
    pub fn new(provider: P, strategy: BufferStrategy) -> Self {
        BufferedMatrix {
            provider,
            strategy,
            buffered: None,
        }
    }

    /// Check whether a window is already covered by the cache.
    pub fn is_buffered(&self, rows: &GenomicSpan, cols: &GenomicSpan) -> bool {
        match &self.buffered {
            None => false,
            Some((BufferedExtent::All, _)) => true,
            Some((BufferedExtent::Window(buf_rows, buf_cols), _)) => {
                buf_rows.contains(rows) && buf_cols.contains(cols)
            }
        }
    }

    /// Smallest non-zero buffered value, `None` when nothing is buffered.
    pub fn buffered_min(&self) -> Option<f64> {
        self.buffered.as_ref().and_then(|(_, m)| m.min_nonzero())
    }

    /// Largest buffered value, `None` when nothing is buffered.
    pub fn buffered_max(&self) -> Option<f64> {
        self.buffered.as_ref().and_then(|(_, m)| m.max())
    }
}

impl<P> BufferedMatrix<P>
where
    P: MatrixProvider,
    P::Error: From<MatrixError>,
{
    ///
    /// Retrieve the window addressed by the two spans, prefetching per the
    /// configured strategy on a cache miss.
    ///
    pub fn get(
        &mut self,
        rows: &GenomicSpan,
        cols: &GenomicSpan,
    ) -> Result<RegionMatrix, P::Error> {
        if self.is_buffered(rows, cols)
            && let Some((_, buffered)) = &self.buffered
        {
            return Ok(buffered
                .sub_matrix(
                    &RegionKey::Span(rows.clone()),
                    &RegionKey::Span(cols.clone()),
                )
                .map_err(P::Error::from)?);
        }

        debug!("buffering matrix for {} x {}", rows, cols);
        let (extent, matrix) = self.fetch(rows, cols)?;
        let window = matrix
            .sub_matrix(
                &RegionKey::Span(rows.clone()),
                &RegionKey::Span(cols.clone()),
            )
            .map_err(P::Error::from)?;
        self.buffered = Some((extent, matrix));
        Ok(window)
    }

    fn fetch(
        &mut self,
        rows: &GenomicSpan,
        cols: &GenomicSpan,
    ) -> Result<(BufferedExtent, RegionMatrix), P::Error> {
        match self.strategy {
            BufferStrategy::All => {
                let matrix = self.provider.full()?;
                Ok((BufferedExtent::All, matrix))
            }
            BufferStrategy::Fixed(pad) => {
                let buf_rows = expand(rows, |_| pad);
                let buf_cols = expand(cols, |_| pad);
                let matrix = self.provider.window(&buf_rows, &buf_cols)?;
                Ok((BufferedExtent::Window(buf_rows, buf_cols), matrix))
            }
            BufferStrategy::Relative(factor) => {
                let buf_rows = expand(rows, |width| (factor * width as f64) as u32);
                let buf_cols = expand(cols, |width| (factor * width as f64) as u32);
                let matrix = self.provider.window(&buf_rows, &buf_cols)?;
                Ok((BufferedExtent::Window(buf_rows, buf_cols), matrix))
            }
        }
    }
}

impl BufferedMatrix<RegionMatrix> {
    ///
    /// Wrap an already-materialized matrix; everything is buffered up
    /// front.
    ///
    pub fn from_matrix(matrix: RegionMatrix) -> Self {
        BufferedMatrix {
            provider: matrix.clone(),
            strategy: BufferStrategy::All,
            buffered: Some((BufferedExtent::All, matrix)),
        }
    }
}

/// Pad a span on each bounded side, clamping the start at position 1. An
/// unbounded side is left unbounded.
fn expand<F: Fn(u32) -> u32>(span: &GenomicSpan, pad_for: F) -> GenomicSpan {
    match (span.start, span.end) {
        (Some(start), Some(end)) => {
            let pad = pad_for(end.saturating_sub(start));
            GenomicSpan::new(
                span.chromosome.clone(),
                Some(start.saturating_sub(pad).max(1)),
                Some(end.saturating_add(pad)),
            )
        }
        _ => span.clone(),
    }
}
