use std::collections::BTreeMap;
use std::io;

use fxhash::FxHashMap;
use indicatif::ProgressBar;
use log::debug;

use hicmap_core::models::{Edge, FieldValue};

use crate::container::StoreDir;
use crate::errors::Result;
use crate::partition::PartitionMap;
use crate::table::{EdgeRow, EdgeTable, TableScan, TableSchema};

/// A staged edge row awaiting flush.
#[derive(Debug, Clone)]
struct BufferedEdge {
    values: Vec<FieldValue>,
    replace: bool,
}

///
/// The partitioned edge store: one append-only table per partition pair
/// `(i, j)` with `i <= j`, fed through a per-pair staging buffer. The
/// buffer flushes automatically once the staged row count exceeds its
/// capacity, and always before a read.
///
/// Rows staged for the same canonical `(source, sink)` combine in the
/// buffer; at flush, a staged row whose key already exists in its table
/// updates the stored row in place. Duplicate contacts therefore
/// accumulate into a single row.
///
#[derive(Debug)]
pub struct EdgeStore {
    dir: StoreDir,
    schema: TableSchema,
    tables: FxHashMap<(u32, u32), EdgeTable>,
    buffer: BTreeMap<(u32, u32), FxHashMap<(u32, u32), BufferedEdge>>,
    buffered_rows: usize,
    buffer_capacity: usize,
    dirty: bool,
}

impl EdgeStore {
    ///
    /// Set up the edge store of a fresh store directory. The `(0, 0)`
    /// table is created eagerly as the schema template; all other tables
    /// appear lazily.
    ///
    pub fn create(dir: StoreDir, schema: TableSchema, buffer_capacity: usize) -> Result<Self> {
        let mut tables = FxHashMap::default();
        let template = EdgeTable::create(dir.table_path(0, 0), 0, 0, &schema)?;
        tables.insert((0, 0), template);
        Ok(EdgeStore {
            dir,
            schema,
            tables,
            buffer: BTreeMap::new(),
            buffered_rows: 0,
            buffer_capacity,
            dirty: false,
        })
    }

    /// Open the edge tables present in a store directory.
    pub fn open(dir: StoreDir, schema: TableSchema, buffer_capacity: usize) -> Result<Self> {
        let mut tables = FxHashMap::default();
        for (i, j) in dir.list_tables()? {
            let table = EdgeTable::open(dir.table_path(i, j), i, j, &schema)?;
            tables.insert((i, j), table);
        }
        Ok(EdgeStore {
            dir,
            schema,
            tables,
            buffer: BTreeMap::new(),
            buffered_rows: 0,
            buffer_capacity,
            dirty: false,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows
    }

    /// Partition pairs of the tables currently present, in key order.
    pub fn table_keys(&self) -> Vec<(u32, u32)> {
        let mut keys: Vec<(u32, u32)> = self.tables.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn table(&self, key: (u32, u32)) -> Option<&EdgeTable> {
        self.tables.get(&key)
    }

    pub(crate) fn tables_mut(&mut self) -> &mut FxHashMap<(u32, u32), EdgeTable> {
        &mut self.tables
    }

    ///
    /// Stage one canonical edge row. `source <= sink` is required; the
    /// caller resolves the partition pair through `parts`.
    ///
    pub fn stage(
        &mut self,
        parts: &PartitionMap,
        source: u32,
        sink: u32,
        values: Vec<FieldValue>,
        replace: bool,
    ) -> Result<()> {
        debug_assert!(source <= sink);
        let key = (parts.partition_of(source), parts.partition_of(sink));

        let slot = self.buffer.entry(key).or_default();
        match slot.entry((source, sink)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let staged = entry.get_mut();
                if replace {
                    staged.values = values;
                    staged.replace = true;
                } else {
                    for (current, incoming) in staged.values.iter_mut().zip(&values) {
                        current.accumulate(*incoming);
                    }
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(BufferedEdge { values, replace });
                self.buffered_rows += 1;
            }
        }
        self.dirty = true;

        if self.buffered_rows > self.buffer_capacity {
            self.flush_buffer()?;
        }
        Ok(())
    }

    ///
    /// Drain the staging buffer into the tables, in key order. Each slot
    /// is removed only after its table has been written, so a failed
    /// flush keeps the unflushed slots for retry.
    ///
    pub fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        debug!("flushing {} buffered edge rows", self.buffered_rows);

        let keys: Vec<(u32, u32)> = self.buffer.keys().copied().collect();
        for key in keys {
            let Some(slot) = self.buffer.remove(&key) else {
                continue;
            };
            let staged = slot.len();
            if let Err(e) = self.flush_slot(key, &slot) {
                self.buffer.insert(key, slot);
                return Err(e);
            }
            self.buffered_rows -= staged;
        }
        Ok(())
    }

    fn flush_slot(
        &mut self,
        key: (u32, u32),
        slot: &FxHashMap<(u32, u32), BufferedEdge>,
    ) -> Result<()> {
        let table = match self.tables.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(EdgeTable::create(
                self.dir.table_path(key.0, key.1),
                key.0,
                key.1,
                &self.schema,
            )?),
        };

        table.ensure_index(&self.schema)?;

        let mut appends = Vec::new();
        for (&(source, sink), staged) in slot {
            if let Some(row_ix) = table.find_row(source, sink) {
                let mut row = table.read_row(&self.schema, row_ix)?;
                row.combine(&staged.values, staged.replace);
                table.write_row(&self.schema, row_ix, &row)?;
            } else {
                appends.push(EdgeRow {
                    source,
                    sink,
                    masked: false,
                    values: staged.values.clone(),
                });
            }
        }
        appends.sort_unstable_by_key(|row| (row.source, row.sink));
        table.append(&self.schema, &appends)?;
        Ok(())
    }

    ///
    /// Flush staged rows and rebuild the column index of every table whose
    /// index is dirty. With `silent` unset a progress bar reports index
    /// rebuilds.
    ///
    pub fn flush(&mut self, silent: bool) -> Result<()> {
        self.flush_buffer()?;

        let mut stale: Vec<(u32, u32)> = self
            .tables
            .iter()
            .filter(|(_, table)| table.index_dirty())
            .map(|(key, _)| *key)
            .collect();
        stale.sort_unstable();

        let bar = if silent {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(stale.len() as u64)
        };
        for key in stale {
            if let Some(table) = self.tables.get_mut(&key) {
                table.rebuild_index(&self.schema)?;
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        self.dirty = false;
        Ok(())
    }

    /// Stored rows visible to scans. Exact once indexes are clean.
    pub fn visible_len(&self) -> u64 {
        self.tables
            .values()
            .map(|table| table.visible_len().unwrap_or_else(|| table.len()))
            .sum()
    }

    /// Iterate every unmasked row, tables in key order.
    pub fn iter_rows(&self) -> AllRows<'_> {
        let mut tables: Vec<&EdgeTable> = self.tables.values().collect();
        tables.sort_unstable_by_key(|t| (t.source_partition(), t.sink_partition()));
        AllRows {
            schema: &self.schema,
            tables: tables.into_iter(),
            current: None,
        }
    }

    /// Mask the stored row with canonical key `(source, sink)`; returns
    /// whether a row was found. Requires clean indexes.
    pub fn mask_edge(&mut self, parts: &PartitionMap, source: u32, sink: u32) -> Result<bool> {
        debug_assert!(source <= sink);
        let key = (parts.partition_of(source), parts.partition_of(sink));
        let Some(table) = self.tables.get_mut(&key) else {
            return Ok(false);
        };
        table.ensure_index(&self.schema)?;
        match table.find_row(source, sink) {
            Some(row_ix) => {
                table.mask_row(&self.schema, row_ix)?;
                table.rebuild_index(&self.schema)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Convert a stored row into an [`Edge`] record.
pub(crate) fn row_to_edge(schema: &TableSchema, row: EdgeRow) -> Edge {
    let mut weight = 0.0;
    let mut fields = Vec::new();
    for (column, value) in schema.columns.iter().zip(&row.values) {
        if column.name == "weight" {
            weight = value.as_f64();
        } else {
            fields.push((column.name.clone(), *value));
        }
    }
    Edge {
        source: row.source,
        sink: row.sink,
        weight,
        fields,
    }
}

/// Chained sequential scan over every table of the store.
pub struct AllRows<'a> {
    schema: &'a TableSchema,
    tables: std::vec::IntoIter<&'a EdgeTable>,
    current: Option<TableScan<'a>>,
}

impl Iterator for AllRows<'_> {
    type Item = io::Result<EdgeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(scan) = &mut self.current {
                match scan.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            match self.tables.next() {
                Some(table) => match table.scan(self.schema) {
                    Ok(scan) => self.current = Some(scan),
                    Err(e) => {
                        self.tables = Vec::new().into_iter();
                        return Some(Err(e));
                    }
                },
                None => return None,
            }
        }
    }
}
