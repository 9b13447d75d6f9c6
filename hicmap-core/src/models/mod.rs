pub mod edge;
pub mod interval;
pub mod key;
pub mod region;

// re-export for cleaner imports
pub use self::edge::{ColumnType, Edge, FieldValue};
pub use self::interval::{ChromIndex, GenomeIndex, Interval};
pub use self::key::{PairKey, RegionKey};
pub use self::region::{GenomicSpan, Region};
