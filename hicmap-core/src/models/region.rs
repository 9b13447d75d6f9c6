use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RegionError;

///
/// Region struct, one row of the region table. Coordinates are 1-based
/// inclusive genomic positions. `ix` is the dense, 0-based insertion order
/// assigned by the table; `valid` and `bias` are the normalization
/// attributes applied during matrix materialization.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub ix: u32,
    pub chromosome: String,
    pub start: u32,
    pub end: u32,
    pub valid: bool,
    pub bias: f64,
}

impl Region {
    pub fn new<S: Into<String>>(chromosome: S, start: u32, end: u32) -> Self {
        Region {
            ix: 0,
            chromosome: chromosome.into(),
            start,
            end,
            valid: true,
            bias: 1.0,
        }
    }

    ///
    /// Get the width of the region
    ///
    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    ///
    /// The genomic span covered by this region
    ///
    pub fn span(&self) -> GenomicSpan {
        GenomicSpan::new(self.chromosome.clone(), Some(self.start), Some(self.end))
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

///
/// A (possibly open-ended) genomic coordinate range on one chromosome,
/// the parsed form of a `chr:start-end` key string. A `None` side means
/// unbounded on that side.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicSpan {
    pub chromosome: String,
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl GenomicSpan {
    pub fn new<S: Into<String>>(chromosome: S, start: Option<u32>, end: Option<u32>) -> Self {
        GenomicSpan {
            chromosome: chromosome.into(),
            start,
            end,
        }
    }

    /// Span covering a whole chromosome.
    pub fn chromosome<S: Into<String>>(name: S) -> Self {
        GenomicSpan::new(name, None, None)
    }

    /// Width of the span, when both sides are bounded.
    pub fn width(&self) -> Option<u32> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(e.saturating_sub(s)),
            _ => None,
        }
    }

    ///
    /// Element-wise containment: true when `other` lies entirely within
    /// this span. An unbounded side of `self` covers everything on that
    /// side; an unbounded side of `other` is only covered by an unbounded
    /// side of `self`.
    ///
    pub fn contains(&self, other: &GenomicSpan) -> bool {
        if self.chromosome != other.chromosome {
            return false;
        }
        let start_ok = match self.start {
            None => true,
            Some(s) => other.start.is_some_and(|o| s <= o),
        };
        let end_ok = match self.end {
            None => true,
            Some(e) => other.end.is_some_and(|o| e >= o),
        };
        start_ok && end_ok
    }
}

impl FromStr for GenomicSpan {
    type Err = RegionError;

    ///
    /// Parse a `chr` or `chr:start-end` key string.
    ///
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RegionError::InvalidKey(s.to_string()));
        }

        let (chromosome, coords) = match s.split_once(':') {
            None => return Ok(GenomicSpan::chromosome(s)),
            Some((c, rest)) => (c, rest),
        };
        if chromosome.is_empty() {
            return Err(RegionError::InvalidKey(s.to_string()));
        }

        let (start_str, end_str) = coords
            .split_once('-')
            .ok_or_else(|| RegionError::InvalidKey(s.to_string()))?;

        let parse_side = |side: &str| -> Result<Option<u32>, RegionError> {
            if side.is_empty() {
                return Ok(None);
            }
            side.parse::<u32>()
                .map(Some)
                .map_err(|_| RegionError::InvalidKey(s.to_string()))
        };

        let start = parse_side(start_str)?;
        let end = parse_side(end_str)?;
        if let (Some(a), Some(b)) = (start, end)
            && a > b
        {
            return Err(RegionError::InvalidKey(s.to_string()));
        }

        Ok(GenomicSpan::new(chromosome, start, end))
    }
}

impl Display for GenomicSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => write!(f, "{}", self.chromosome),
            (start, end) => write!(
                f,
                "{}:{}-{}",
                self.chromosome,
                start.map_or(String::new(), |v| v.to_string()),
                end.map_or(String::new(), |v| v.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("chr1", "chr1", None, None)]
    #[case("chr1:100-200", "chr1", Some(100), Some(200))]
    #[case("chr1:100-", "chr1", Some(100), None)]
    #[case("chr1:-200", "chr1", None, Some(200))]
    fn test_span_parsing(
        #[case] input: &str,
        #[case] chromosome: &str,
        #[case] start: Option<u32>,
        #[case] end: Option<u32>,
    ) {
        let span: GenomicSpan = input.parse().unwrap();
        assert_eq!(span.chromosome, chromosome);
        assert_eq!(span.start, start);
        assert_eq!(span.end, end);
    }

    #[rstest]
    #[case("")]
    #[case(":100-200")]
    #[case("chr1:abc-200")]
    #[case("chr1:200-100")]
    fn test_span_parsing_rejects(#[case] input: &str) {
        assert!(input.parse::<GenomicSpan>().is_err());
    }

    #[test]
    fn test_span_containment() {
        let outer: GenomicSpan = "chr1:1-300".parse().unwrap();
        assert!(outer.contains(&"chr1:150-180".parse().unwrap()));
        assert!(outer.contains(&"chr1:1-300".parse().unwrap()));
        assert!(!outer.contains(&"chr1:150-400".parse().unwrap()));
        assert!(!outer.contains(&"chr2:150-180".parse().unwrap()));
        assert!(!outer.contains(&GenomicSpan::chromosome("chr1")));
        assert!(GenomicSpan::chromosome("chr1").contains(&outer));
    }

    #[test]
    fn test_region_display() {
        let region = Region::new("chr2", 10, 20);
        assert_eq!(region.to_string(), "chr2:10-20");
        assert_eq!(region.width(), 10);
        assert!(region.valid);
        assert_eq!(region.bias, 1.0);
    }
}
