use serde::{Deserialize, Serialize};

use crate::regions::RegionTable;

///
/// How region indexes are grouped into contiguous partitions for edge
/// sharding.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStrategy {
    /// One partition per chromosome block.
    Chromosome,
    /// Fixed-size bins of the given number of regions.
    Fixed(u32),
}

impl Default for PartitionStrategy {
    fn default() -> Self {
        PartitionStrategy::Chromosome
    }
}

///
/// Sorted partition break indexes over the region table. Partition `p`
/// covers the half-open index range `[breaks[p-1], breaks[p])`, with an
/// implicit `0` before the first break and `|regions|` after the last.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    breaks: Vec<u32>,
    n_regions: u32,
}

impl PartitionMap {
    pub fn from_regions(regions: &RegionTable, strategy: PartitionStrategy) -> Self {
        let mut breaks = Vec::new();
        match strategy {
            PartitionStrategy::Chromosome => {
                let mut previous: Option<&str> = None;
                for (i, region) in regions.iter().enumerate() {
                    if let Some(previous) = previous
                        && previous != region.chromosome
                    {
                        breaks.push(i as u32);
                    }
                    previous = Some(&region.chromosome);
                }
            }
            PartitionStrategy::Fixed(bin_size) => {
                debug_assert!(bin_size >= 1);
                let n = regions.len();
                breaks.extend((bin_size..n).step_by(bin_size.max(1) as usize));
            }
        }
        PartitionMap {
            breaks,
            n_regions: regions.len(),
        }
    }

    /// Rehydrate from persisted break indexes.
    pub fn from_breaks(breaks: Vec<u32>, n_regions: u32) -> Self {
        debug_assert!(breaks.windows(2).all(|w| w[0] < w[1]));
        PartitionMap { breaks, n_regions }
    }

    pub fn breaks(&self) -> &[u32] {
        &self.breaks
    }

    pub fn n_regions(&self) -> u32 {
        self.n_regions
    }

    pub fn n_partitions(&self) -> u32 {
        self.breaks.len() as u32 + 1
    }

    /// Partition holding a region index, in O(log P).
    pub fn partition_of(&self, ix: u32) -> u32 {
        self.breaks.partition_point(|b| *b <= ix) as u32
    }

    /// Half-open region index range `[start, end)` of a partition.
    pub fn bounds(&self, partition: u32) -> (u32, u32) {
        let p = partition as usize;
        let start = if p == 0 { 0 } else { self.breaks[p - 1] };
        let end = self
            .breaks
            .get(p)
            .copied()
            .unwrap_or(self.n_regions);
        (start, end)
    }

    /// Whether the inclusive index range `[lo, hi]` covers the whole
    /// partition.
    pub fn is_covered(&self, partition: u32, lo: u32, hi: u32) -> bool {
        let (start, end) = self.bounds(partition);
        lo <= start && end > 0 && hi >= end - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hicmap_core::models::Region;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn regions() -> RegionTable {
        let mut table = RegionTable::new();
        table.append(Region::new("chr1", 1, 10)).unwrap();
        table.append(Region::new("chr1", 11, 20)).unwrap();
        table.append(Region::new("chr2", 1, 10)).unwrap();
        table
    }

    #[test]
    fn test_chromosome_breaks() {
        let parts = PartitionMap::from_regions(&regions(), PartitionStrategy::Chromosome);
        assert_eq!(parts.breaks(), &[2]);
        assert_eq!(parts.n_partitions(), 2);
        assert_eq!(parts.bounds(0), (0, 2));
        assert_eq!(parts.bounds(1), (2, 3));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(2, 1)]
    fn test_partition_of(#[case] ix: u32, #[case] partition: u32) {
        let parts = PartitionMap::from_regions(&regions(), PartitionStrategy::Chromosome);
        assert_eq!(parts.partition_of(ix), partition);
    }

    #[test]
    fn test_fixed_breaks() {
        let mut table = RegionTable::new();
        for i in 0..7 {
            table
                .append(Region::new("chr1", i * 10 + 1, (i + 1) * 10))
                .unwrap();
        }
        let parts = PartitionMap::from_regions(&table, PartitionStrategy::Fixed(3));
        assert_eq!(parts.breaks(), &[3, 6]);
        assert_eq!(parts.partition_of(2), 0);
        assert_eq!(parts.partition_of(3), 1);
        assert_eq!(parts.partition_of(6), 2);
        assert_eq!(parts.bounds(2), (6, 7));
    }

    #[test]
    fn test_coverage() {
        let parts = PartitionMap::from_regions(&regions(), PartitionStrategy::Chromosome);
        assert!(parts.is_covered(0, 0, 1));
        assert!(parts.is_covered(0, 0, 2));
        assert!(!parts.is_covered(0, 1, 2));
        assert!(parts.is_covered(1, 2, 2));
    }

    #[test]
    fn test_single_chromosome_has_no_breaks() {
        let mut table = RegionTable::new();
        table.append(Region::new("chr1", 1, 10)).unwrap();
        table.append(Region::new("chr1", 11, 20)).unwrap();
        let parts = PartitionMap::from_regions(&table, PartitionStrategy::Chromosome);
        assert!(parts.breaks().is_empty());
        assert_eq!(parts.n_partitions(), 1);
    }
}
