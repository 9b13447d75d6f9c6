//! # hicmap-store
//!
//! The persistent, partitioned storage engine behind hicmap.
//!
//! ## Purpose
//!
//! A [`ContactMap`] couples an ordered region table with a sparse
//! half-matrix of weighted edges between region pairs. Edges shard across
//! one on-disk table per partition pair (a partition being a chromosome
//! block or a fixed-size bin range), ingest through a staging buffer, and
//! stream back out through a window planner that visits only the tables a
//! query touches.
//!
//! ## Main Components
//!
//! - **[`ContactMap`]**: the owning handle for regions, edges, matrices
//! - **[`RegionTable`]**: ordered regions, frozen once edges exist
//! - **[`PartitionMap`]**: region index → partition lookup
//! - **[`EdgeStore`]**: partition-pair tables plus the staging buffer
//! - **[`load`]**: open a store path, dispatching on its class id
//!
//! ## Example
//!
//! ```rust,no_run
//! use hicmap_core::models::Region;
//! use hicmap_store::ContactMap;
//!
//! # fn main() -> Result<(), hicmap_store::StoreError> {
//! let mut map = ContactMap::create("/data/map.hicmap")?;
//! map.add_region(Region::new("chr1", 1, 1000))?;
//! map.add_region(Region::new("chr1", 1001, 2000))?;
//! map.add_edge((0, 1, 12.0))?;
//! map.flush(true)?;
//!
//! let matrix = map.matrix(&"chr1".parse::<hicmap_core::models::PairKey>()?)?;
//! assert_eq!(matrix.shape(), (2, 2));
//! # Ok(())
//! # }
//! ```

pub mod consts;
pub mod contact_map;
pub mod container;
pub mod edges;
pub mod errors;
pub mod partition;
pub mod query;
pub mod regions;
pub mod table;

// re-exports
pub use self::contact_map::{AddEdge, ContactMap, ContactMapBuilder, load};
pub use self::container::{StoreDir, StoreMeta};
pub use self::edges::EdgeStore;
pub use self::errors::StoreError;
pub use self::partition::{PartitionMap, PartitionStrategy};
pub use self::query::WindowScan;
pub use self::regions::RegionTable;
pub use self::table::{ColumnSpec, EdgeRow, EdgeTable, TableSchema};
