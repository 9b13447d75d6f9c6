use std::fmt::{self, Display};
use std::ops::Range;
use std::str::FromStr;

use crate::errors::RegionError;
use crate::models::region::GenomicSpan;

///
/// A key addressing a subsequence of the region table along one axis.
///
/// - `Index(i)`: a single region by dense index.
/// - `Range(a, b)`: the half-open index window `[a, b)`.
/// - `Span(..)`: a parsed `chr[:start-end]` string, resolved against
///   region coordinates.
/// - `List(..)`: concatenation of the above along the axis.
///
#[derive(Debug, Clone, PartialEq)]
pub enum RegionKey {
    Index(u32),
    Range(u32, u32),
    Span(GenomicSpan),
    List(Vec<RegionKey>),
}

impl RegionKey {
    pub fn parse(s: &str) -> Result<Self, RegionError> {
        Ok(RegionKey::Span(s.parse()?))
    }

    /// True for a plain single-index key.
    pub fn is_index(&self) -> bool {
        matches!(self, RegionKey::Index(_))
    }
}

impl From<u32> for RegionKey {
    fn from(ix: u32) -> Self {
        RegionKey::Index(ix)
    }
}

impl From<Range<u32>> for RegionKey {
    fn from(range: Range<u32>) -> Self {
        RegionKey::Range(range.start, range.end)
    }
}

impl From<GenomicSpan> for RegionKey {
    fn from(span: GenomicSpan) -> Self {
        RegionKey::Span(span)
    }
}

impl FromStr for RegionKey {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegionKey::parse(s)
    }
}

impl Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKey::Index(ix) => write!(f, "{}", ix),
            RegionKey::Range(a, b) => write!(f, "{}..{}", a, b),
            RegionKey::Span(span) => write!(f, "{}", span),
            RegionKey::List(keys) => {
                write!(f, "[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "]")
            }
        }
    }
}

///
/// A two-dimensional window key. A bare region key addresses the same
/// window on both axes; a pair addresses rows and columns independently.
///
#[derive(Debug, Clone, PartialEq)]
pub enum PairKey {
    All,
    Both(RegionKey),
    Window(RegionKey, RegionKey),
}

impl PairKey {
    pub fn parse(s: &str) -> Result<Self, RegionError> {
        Ok(PairKey::Both(RegionKey::parse(s)?))
    }

    /// True when the key is a pair of single indexes, i.e. addresses one
    /// matrix cell.
    pub fn is_scalar(&self) -> bool {
        match self {
            PairKey::Window(row, col) => row.is_index() && col.is_index(),
            _ => false,
        }
    }
}

impl From<RegionKey> for PairKey {
    fn from(key: RegionKey) -> Self {
        PairKey::Both(key)
    }
}

impl From<(RegionKey, RegionKey)> for PairKey {
    fn from((row, col): (RegionKey, RegionKey)) -> Self {
        PairKey::Window(row, col)
    }
}

impl From<u32> for PairKey {
    fn from(ix: u32) -> Self {
        PairKey::Both(RegionKey::Index(ix))
    }
}

impl From<(u32, u32)> for PairKey {
    fn from((row, col): (u32, u32)) -> Self {
        PairKey::Window(RegionKey::Index(row), RegionKey::Index(col))
    }
}

impl From<Range<u32>> for PairKey {
    fn from(range: Range<u32>) -> Self {
        PairKey::Both(range.into())
    }
}

impl From<GenomicSpan> for PairKey {
    fn from(span: GenomicSpan) -> Self {
        PairKey::Both(span.into())
    }
}

impl FromStr for PairKey {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PairKey::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_conversions() {
        assert_eq!(RegionKey::from(3u32), RegionKey::Index(3));
        assert_eq!(RegionKey::from(1..4), RegionKey::Range(1, 4));
        assert_eq!(
            "chr1:1-100".parse::<RegionKey>().unwrap(),
            RegionKey::Span(GenomicSpan::new("chr1", Some(1), Some(100)))
        );
    }

    #[test]
    fn test_pair_key_scalar() {
        assert!(PairKey::from((1u32, 2u32)).is_scalar());
        assert!(!PairKey::from(1u32).is_scalar());
        assert!(!PairKey::All.is_scalar());
        assert!(!PairKey::Window(RegionKey::Index(0), RegionKey::Range(0, 2)).is_scalar());
    }
}
