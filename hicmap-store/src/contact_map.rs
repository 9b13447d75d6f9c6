use std::io;
use std::path::Path;

use log::debug;

use hicmap_core::models::{ColumnType, Edge, FieldValue, GenomicSpan, PairKey, Region, RegionKey};
use hicmap_matrix::{MatrixOpts, MatrixProvider, RegionMatrix, assemble};

use crate::consts::{CONTACT_MAP_CLASS_ID, DEFAULT_BUFFER_CAPACITY, DEFAULT_SCORE_FIELD};
use crate::container::{StoreDir, StoreMeta};
use crate::edges::{EdgeStore, row_to_edge};
use crate::errors::{Result, StoreError};
use crate::partition::{PartitionMap, PartitionStrategy};
use crate::query::WindowScan;
use crate::regions::RegionTable;
use crate::table::{ColumnSpec, TableSchema};

/// Per-insert options for [`ContactMap::add_edge_opts`].
#[derive(Debug, Clone, Copy)]
pub struct AddEdge {
    /// Verify that both endpoints name existing regions.
    pub check_nodes: bool,
    /// Overwrite an already-stored duplicate contact instead of
    /// accumulating into it.
    pub replace: bool,
}

impl Default for AddEdge {
    fn default() -> Self {
        AddEdge {
            check_nodes: true,
            replace: false,
        }
    }
}

///
/// Builder for constructing a [`ContactMap`] with custom configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use hicmap_core::models::{ColumnType, FieldValue};
/// use hicmap_store::{ContactMap, PartitionStrategy};
///
/// # fn main() -> Result<(), hicmap_store::StoreError> {
/// let map = ContactMap::builder()
///     .partition_strategy(PartitionStrategy::Fixed(1000))
///     .edge_field("reads", ColumnType::I64, FieldValue::I64(0))
///     .buffer_capacity(100_000)
///     .create("/data/map.hicmap")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ContactMapBuilder {
    strategy: PartitionStrategy,
    columns: Vec<ColumnSpec>,
    buffer_capacity: Option<usize>,
    score_field: Option<String>,
}

impl ContactMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how regions group into edge partitions.
    pub fn partition_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Declares an extension edge column.
    pub fn edge_field<S: Into<String>>(
        mut self,
        name: S,
        dtype: ColumnType,
        default: FieldValue,
    ) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            dtype,
            default,
        });
        self
    }

    /// Sets the staged-row count that triggers an automatic flush.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Sets the edge column matrices read by default.
    pub fn score_field<S: Into<String>>(mut self, name: S) -> Self {
        self.score_field = Some(name.into());
        self
    }

    /// Create a fresh store at `path`.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<ContactMap> {
        if let PartitionStrategy::Fixed(bin_size) = self.strategy
            && bin_size == 0
        {
            return Err(StoreError::InvalidBinSize(bin_size));
        }

        let mut schema = TableSchema::with_weight();
        for column in self.columns {
            if matches!(column.name.as_str(), "source" | "sink" | "mask")
                || schema.column_index(&column.name).is_some()
            {
                return Err(StoreError::SchemaMismatch(format!(
                    "column {} is reserved or declared twice",
                    column.name
                )));
            }
            if column.default.dtype() != column.dtype {
                return Err(StoreError::SchemaMismatch(format!(
                    "default for column {} does not match its type",
                    column.name
                )));
            }
            schema.columns.push(column);
        }

        let score_field = self
            .score_field
            .unwrap_or_else(|| DEFAULT_SCORE_FIELD.to_string());
        if schema.column_index(&score_field).is_none() {
            return Err(StoreError::SchemaMismatch(format!(
                "score field {} is not a declared column",
                score_field
            )));
        }

        let dir = StoreDir::create(path)?;
        let meta = StoreMeta {
            class_id: CONTACT_MAP_CLASS_ID.to_string(),
            partition_strategy: self.strategy,
            partition_breaks: None,
            schema: schema.clone(),
            frozen: false,
            default_score_field: score_field,
        };
        dir.write_meta(&meta)?;

        let edges = EdgeStore::create(
            dir.clone(),
            schema,
            self.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
        )?;
        Ok(ContactMap {
            dir,
            meta,
            regions: RegionTable::new(),
            partitions: PartitionMap::from_breaks(Vec::new(), 0),
            edges,
        })
    }
}

///
/// A persistent, partitioned contact map: an ordered region table plus a
/// sparse half-matrix of weighted edges between region pairs, sharded on
/// disk by partition pair.
///
/// Edges buffer in memory and flush in bulk; every read flushes
/// transparently first, so queries always observe completed writes. A
/// single handle owns the store directory; access is not internally
/// synchronized.
///
#[derive(Debug)]
pub struct ContactMap {
    dir: StoreDir,
    meta: StoreMeta,
    regions: RegionTable,
    partitions: PartitionMap,
    edges: EdgeStore,
}

impl ContactMap {
    pub fn builder() -> ContactMapBuilder {
        ContactMapBuilder::new()
    }

    /// Create a store with default configuration.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        ContactMapBuilder::new().create(path)
    }

    /// Open an existing store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = StoreDir::open(path)?;
        let meta = dir.read_meta()?;
        if meta.class_id != CONTACT_MAP_CLASS_ID {
            return Err(StoreError::UnknownClassId(meta.class_id));
        }
        Self::from_dir(dir, meta)
    }

    fn from_dir(dir: StoreDir, mut meta: StoreMeta) -> Result<Self> {
        let regions = if dir.regions_path().is_file() {
            RegionTable::load(dir.regions_path(), meta.frozen)?
        } else if meta.frozen {
            return Err(StoreError::CorruptStore(
                "frozen store without a region table".to_string(),
            ));
        } else {
            RegionTable::new()
        };

        let partitions = match &meta.partition_breaks {
            Some(breaks) => PartitionMap::from_breaks(breaks.clone(), regions.len()),
            None => {
                let partitions =
                    PartitionMap::from_regions(&regions, meta.partition_strategy);
                if meta.frozen {
                    meta.partition_breaks = Some(partitions.breaks().to_vec());
                    dir.write_meta(&meta)?;
                }
                partitions
            }
        };

        let edges = EdgeStore::open(dir.clone(), meta.schema.clone(), DEFAULT_BUFFER_CAPACITY)?;
        Ok(ContactMap {
            dir,
            meta,
            regions,
            partitions,
            edges,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.root()
    }

    pub fn class_id(&self) -> &str {
        &self.meta.class_id
    }

    pub fn schema(&self) -> &TableSchema {
        self.edges.schema()
    }

    pub fn partition_breaks(&self) -> &[u32] {
        self.partitions.breaks()
    }

    pub fn is_frozen(&self) -> bool {
        self.regions.is_frozen()
    }

    // ------------------------------------------------------------------
    // region side
    // ------------------------------------------------------------------

    ///
    /// Append a region, returning its dense index. Fails with
    /// `RegionsFrozen` once any edge has been added.
    ///
    pub fn add_region(&mut self, region: Region) -> Result<u32> {
        self.regions.append(region)
    }

    pub fn add_regions<I>(&mut self, regions: I) -> Result<()>
    where
        I: IntoIterator<Item = Region>,
    {
        for region in regions {
            self.regions.append(region)?;
        }
        Ok(())
    }

    pub fn len_regions(&self) -> u32 {
        self.regions.len()
    }

    pub fn region(&self, ix: u32) -> Result<&Region> {
        Ok(self.regions.get(ix)?)
    }

    /// Resolve a key into owned region records, in key order.
    pub fn regions(&mut self, key: &RegionKey) -> Result<Vec<Region>> {
        Ok(self.regions.resolve_regions(key)?)
    }

    pub fn chromosomes(&self) -> Vec<String> {
        self.regions.chromosomes()
    }

    /// Set the normalization bias of a region. Allowed after freezing.
    pub fn set_bias(&mut self, ix: u32, bias: f64) -> Result<()> {
        self.regions.set_bias(ix, bias)
    }

    /// Mark a region (in)valid for masking. Allowed after freezing.
    pub fn set_valid(&mut self, ix: u32, valid: bool) -> Result<()> {
        self.regions.set_valid(ix, valid)
    }

    // ------------------------------------------------------------------
    // edge side
    // ------------------------------------------------------------------

    /// Add an edge with node checking and additive duplicate handling.
    pub fn add_edge<E: Into<Edge>>(&mut self, edge: E) -> Result<()> {
        self.add_edge_opts(edge.into(), AddEdge::default())
    }

    pub fn add_edge_opts(&mut self, edge: Edge, opts: AddEdge) -> Result<()> {
        let (source, sink) = edge.canonical();
        if opts.check_nodes {
            let n_regions = self.regions.len();
            if sink >= n_regions {
                return Err(StoreError::NodeIndexOutOfRange(sink, n_regions));
            }
        }
        let values = self.edge_values(&edge)?;

        // the partition layout must be final before the row is bucketed
        self.ensure_partitions()?;
        self.edges
            .stage(&self.partitions, source, sink, values, opts.replace)
    }

    /// Bulk-add edges and flush.
    pub fn add_edges<I, E>(&mut self, edges: I) -> Result<()>
    where
        I: IntoIterator<Item = E>,
        E: Into<Edge>,
    {
        for edge in edges {
            self.add_edge(edge)?;
        }
        self.flush(true)
    }

    /// Stored (unmasked) edge count.
    pub fn len_edges(&mut self) -> Result<u64> {
        self.ensure_read_ready()?;
        Ok(self.edges.visible_len())
    }

    /// Iterate all stored edges, tables in key order.
    pub fn edges(&mut self) -> Result<impl Iterator<Item = io::Result<Edge>> + '_> {
        self.ensure_read_ready()?;
        let schema = self.edges.schema().clone();
        Ok(self
            .edges
            .iter_rows()
            .map(move |item| item.map(|row| row_to_edge(&schema, row))))
    }

    ///
    /// Iterate the edges of a window. For list keys the scan covers the
    /// bounding index range of the resolved regions.
    ///
    pub fn edge_subset(
        &mut self,
        key: &PairKey,
    ) -> Result<impl Iterator<Item = io::Result<Edge>> + '_> {
        self.ensure_read_ready()?;
        let (row_regions, col_regions) = self.resolve_pair(key)?;
        let schema = self.edges.schema().clone();
        let scan = self.window_scan(&row_regions, &col_regions)?;
        Ok(scan.map(move |item| item.map(|row| row_to_edge(&schema, row))))
    }

    ///
    /// Force buffered edges to disk and rebuild stale column indexes;
    /// `silent` suppresses progress reporting. A failed flush keeps the
    /// unflushed buffer for retry.
    ///
    pub fn flush(&mut self, silent: bool) -> Result<()> {
        if self.regions.is_dirty() {
            self.regions.save(self.dir.regions_path())?;
        }
        self.edges.flush(silent)
    }

    ///
    /// Hide a stored contact from all scans. Returns whether a row with
    /// the canonical key existed.
    ///
    pub fn mask_edge(&mut self, source: u32, sink: u32) -> Result<bool> {
        self.ensure_read_ready()?;
        let (s, t) = if source <= sink {
            (source, sink)
        } else {
            (sink, source)
        };
        self.edges.mask_edge(&self.partitions, s, t)
    }

    // ------------------------------------------------------------------
    // matrix side
    // ------------------------------------------------------------------

    /// Materialize a dense window with default options.
    pub fn matrix(&mut self, key: &PairKey) -> Result<RegionMatrix> {
        let opts = MatrixOpts {
            score_field: self.meta.default_score_field.clone(),
            ..MatrixOpts::default()
        };
        self.matrix_opts(key, &opts)
    }

    ///
    /// Materialize a dense window: mirror the half-matrix across the
    /// diagonal, divide by the outer product of region biases, and mask
    /// invalid regions when requested.
    ///
    pub fn matrix_opts(&mut self, key: &PairKey, opts: &MatrixOpts) -> Result<RegionMatrix> {
        self.ensure_read_ready()?;
        let score_ix = self
            .edges
            .schema()
            .column_index(&opts.score_field)
            .ok_or_else(|| {
                StoreError::SchemaMismatch(format!(
                    "score field {} is not a declared column",
                    opts.score_field
                ))
            })?;

        let (row_regions, col_regions) = self.resolve_pair(key)?;
        let scan = self.window_scan(&row_regions, &col_regions)?;
        let entries = scan
            .map(|item| item.map(|row| (row.source, row.sink, row.values[score_ix].as_f64())));
        Ok(assemble(row_regions, col_regions, entries, opts)?)
    }

    /// The (bias-normalized) value of one matrix cell.
    pub fn contact(&mut self, row: u32, col: u32) -> Result<f64> {
        let matrix = self.matrix(&PairKey::from((row, col)))?;
        Ok(matrix.get(0, 0))
    }

    /// Stream `(source, sink, score)` entries of a window.
    pub fn matrix_entries(
        &mut self,
        key: &PairKey,
        score_field: &str,
    ) -> Result<impl Iterator<Item = io::Result<(u32, u32, f64)>> + '_> {
        self.ensure_read_ready()?;
        let score_ix = self
            .edges
            .schema()
            .column_index(score_field)
            .ok_or_else(|| {
                StoreError::SchemaMismatch(format!(
                    "score field {} is not a declared column",
                    score_field
                ))
            })?;
        let (row_regions, col_regions) = self.resolve_pair(key)?;
        let scan = self.window_scan(&row_regions, &col_regions)?;
        Ok(scan
            .map(move |item| item.map(|row| (row.source, row.sink, row.values[score_ix].as_f64()))))
    }

    ///
    /// Per-region mappability: true wherever at least one stored edge
    /// references the region.
    ///
    pub fn mappable(&mut self) -> Result<Vec<bool>> {
        self.ensure_read_ready()?;
        debug!("computing mappability");
        let mut mappable = vec![false; self.regions.len() as usize];
        for item in self.edges.iter_rows() {
            let row = item?;
            for ix in [row.source, row.sink] {
                let slot = mappable.get_mut(ix as usize).ok_or_else(|| {
                    StoreError::CorruptStore(format!(
                        "edge references region {} beyond the region table",
                        ix
                    ))
                })?;
                *slot = true;
            }
        }
        Ok(mappable)
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Freeze regions and fix the partition layout before the first edge
    /// enters the buffer.
    fn ensure_partitions(&mut self) -> Result<()> {
        if self.regions.is_frozen() {
            return Ok(());
        }
        self.regions.freeze();
        self.partitions = PartitionMap::from_regions(&self.regions, self.meta.partition_strategy);
        self.regions.save(self.dir.regions_path())?;
        self.meta.frozen = true;
        self.meta.partition_breaks = Some(self.partitions.breaks().to_vec());
        self.dir.write_meta(&self.meta)?;
        debug!(
            "froze {} regions into {} partitions",
            self.regions.len(),
            self.partitions.n_partitions()
        );
        Ok(())
    }

    /// Reads must not observe staged rows or stale indexes. While the
    /// region table is still growing the partition layout tracks it.
    fn ensure_read_ready(&mut self) -> Result<()> {
        if !self.regions.is_frozen() {
            self.partitions =
                PartitionMap::from_regions(&self.regions, self.meta.partition_strategy);
        }
        self.edges.flush(true)
    }

    fn resolve_pair(&mut self, key: &PairKey) -> Result<(Vec<Region>, Vec<Region>)> {
        match key {
            PairKey::All => {
                let all: Vec<Region> = self.regions.iter().cloned().collect();
                Ok((all.clone(), all))
            }
            PairKey::Both(k) => {
                let rows = self.regions.resolve_regions(k)?;
                Ok((rows.clone(), rows))
            }
            PairKey::Window(row_key, col_key) => {
                let rows = self.regions.resolve_regions(row_key)?;
                let cols = self.regions.resolve_regions(col_key)?;
                Ok((rows, cols))
            }
        }
    }

    fn window_scan(
        &mut self,
        row_regions: &[Region],
        col_regions: &[Region],
    ) -> Result<WindowScan<'_>> {
        match (index_bounds(row_regions), index_bounds(col_regions)) {
            (Some(rows), Some(cols)) => self.edges.scan_window(&self.partitions, rows, cols),
            _ => Ok(WindowScan::empty()),
        }
    }

    fn edge_values(&self, edge: &Edge) -> Result<Vec<FieldValue>> {
        let schema = self.edges.schema();
        let mut values = schema.defaults();
        if let Some(ix) = schema.column_index("weight") {
            values[ix] = FieldValue::F64(edge.weight);
        }
        for (name, value) in &edge.fields {
            let ix = schema.column_index(name).ok_or_else(|| {
                StoreError::SchemaMismatch(format!("unknown field {}", name))
            })?;
            if schema.columns[ix].dtype != value.dtype() {
                return Err(StoreError::SchemaMismatch(format!(
                    "field {} expects {:?}",
                    name, schema.columns[ix].dtype
                )));
            }
            values[ix] = *value;
        }
        Ok(values)
    }
}

/// Inclusive `(min, max)` of region indexes, `None` for an empty axis.
fn index_bounds(regions: &[Region]) -> Option<(u32, u32)> {
    let mut bounds: Option<(u32, u32)> = None;
    for region in regions {
        bounds = Some(match bounds {
            None => (region.ix, region.ix),
            Some((lo, hi)) => (lo.min(region.ix), hi.max(region.ix)),
        });
    }
    bounds
}

impl MatrixProvider for ContactMap {
    type Error = StoreError;

    fn window(
        &mut self,
        rows: &GenomicSpan,
        cols: &GenomicSpan,
    ) -> Result<RegionMatrix, Self::Error> {
        self.matrix(&PairKey::Window(
            RegionKey::Span(rows.clone()),
            RegionKey::Span(cols.clone()),
        ))
    }

    fn full(&mut self) -> Result<RegionMatrix, Self::Error> {
        self.matrix(&PairKey::All)
    }
}

///
/// Open a store path, dispatching on the class id recorded in its
/// metadata. Fails with `UnknownClassId` for stores created by another
/// tool.
///
pub fn load<P: AsRef<Path>>(path: P) -> Result<ContactMap> {
    let dir = StoreDir::open(path)?;
    let meta = dir.read_meta()?;
    debug!("detected class id {}", meta.class_id);
    if meta.class_id != CONTACT_MAP_CLASS_ID {
        return Err(StoreError::UnknownClassId(meta.class_id));
    }
    ContactMap::from_dir(dir, meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map");
        (dir, path)
    }

    #[test]
    fn test_builder_rejects_reserved_and_duplicate_columns() {
        let (_dir, path) = scratch();
        let err = ContactMap::builder()
            .edge_field("source", ColumnType::I64, FieldValue::I64(0))
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));

        let err = ContactMap::builder()
            .edge_field("reads", ColumnType::I64, FieldValue::I64(0))
            .edge_field("reads", ColumnType::I64, FieldValue::I64(0))
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[test]
    fn test_builder_rejects_mismatched_default() {
        let (_dir, path) = scratch();
        let err = ContactMap::builder()
            .edge_field("reads", ColumnType::I64, FieldValue::F64(0.0))
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[test]
    fn test_builder_rejects_zero_bin_size() {
        let (_dir, path) = scratch();
        let err = ContactMap::builder()
            .partition_strategy(PartitionStrategy::Fixed(0))
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidBinSize(0)));
    }

    #[test]
    fn test_builder_rejects_undeclared_score_field() {
        let (_dir, path) = scratch();
        let err = ContactMap::builder()
            .score_field("balance")
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[test]
    fn test_load_rejects_foreign_class_id() {
        let (_dir, path) = scratch();
        let map = ContactMap::create(&path).unwrap();
        drop(map);

        let store_dir = StoreDir::open(&path).unwrap();
        let mut meta = store_dir.read_meta().unwrap();
        meta.class_id = "READ_PAIRS".to_string();
        store_dir.write_meta(&meta).unwrap();

        assert!(matches!(
            load(&path),
            Err(StoreError::UnknownClassId(id)) if id == "READ_PAIRS"
        ));
    }

    #[test]
    fn test_unknown_edge_field_is_rejected() {
        let (_dir, path) = scratch();
        let mut map = ContactMap::create(&path).unwrap();
        map.add_region(Region::new("chr1", 1, 10)).unwrap();
        map.add_region(Region::new("chr1", 11, 20)).unwrap();

        let edge = Edge::new(0, 1, 5.0).with_field("balance", FieldValue::F64(1.0));
        assert!(matches!(
            map.add_edge(edge),
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_node_check() {
        let (_dir, path) = scratch();
        let mut map = ContactMap::create(&path).unwrap();
        map.add_region(Region::new("chr1", 1, 10)).unwrap();

        assert!(matches!(
            map.add_edge((0, 5, 1.0)),
            Err(StoreError::NodeIndexOutOfRange(5, 1))
        ));
    }

    #[test]
    fn test_regions_freeze_on_first_edge() {
        let (_dir, path) = scratch();
        let mut map = ContactMap::create(&path).unwrap();
        map.add_region(Region::new("chr1", 1, 10)).unwrap();
        map.add_region(Region::new("chr1", 11, 20)).unwrap();
        assert!(!map.is_frozen());

        map.add_edge((0, 1, 5.0)).unwrap();
        assert!(map.is_frozen());
        assert!(matches!(
            map.add_region(Region::new("chr2", 1, 10)),
            Err(StoreError::RegionsFrozen)
        ));
    }
}
