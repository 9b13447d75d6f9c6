use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use hicmap_core::models::{ColumnType, FieldValue};

use crate::errors::{Result, StoreError};

/// One declared edge column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
    pub default: FieldValue,
}

///
/// The column layout shared by every edge table of a store. The `weight`
/// column is always first; extension columns follow in declaration order.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn with_weight() -> Self {
        TableSchema {
            columns: vec![ColumnSpec {
                name: "weight".to_string(),
                dtype: ColumnType::F64,
                default: FieldValue::F64(0.0),
            }],
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn defaults(&self) -> Vec<FieldValue> {
        self.columns.iter().map(|c| c.default).collect()
    }

    /// On-disk width of one row: source, sink, mask byte, then 8 bytes per
    /// column.
    pub fn row_width(&self) -> usize {
        4 + 4 + 1 + 8 * self.columns.len()
    }
}

/// One stored edge row; `values` parallels the schema columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub source: u32,
    pub sink: u32,
    pub masked: bool,
    pub values: Vec<FieldValue>,
}

impl EdgeRow {
    pub fn value(&self, schema: &TableSchema, name: &str) -> Option<FieldValue> {
        schema.column_index(name).map(|ix| self.values[ix])
    }

    /// Fold another value set into this row, additively or by overwrite.
    pub fn combine(&mut self, values: &[FieldValue], replace: bool) {
        for (current, incoming) in self.values.iter_mut().zip(values) {
            if replace {
                *current = *incoming;
            } else {
                current.accumulate(*incoming);
            }
        }
    }
}

/// Index entry carrying the row key so lookups need no row reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    source: u32,
    sink: u32,
    row: u32,
}

///
/// An append-only fixed-width binary row store for one partition pair,
/// named `part_{i}_{j}.bin` with `i <= j`. Rows append in insertion order;
/// a sorted in-memory index over `(source, sink)` serves range scans and
/// key lookups and is rebuilt on flush when dirty. Masked rows stay in the
/// file but are invisible to the index and to scans.
///
#[derive(Debug)]
pub struct EdgeTable {
    path: PathBuf,
    source_partition: u32,
    sink_partition: u32,
    row_width: usize,
    n_rows: u64,
    index: Option<Vec<IndexEntry>>,
    index_dirty: bool,
}

impl EdgeTable {
    pub fn create(
        path: PathBuf,
        source_partition: u32,
        sink_partition: u32,
        schema: &TableSchema,
    ) -> Result<Self> {
        File::create(&path)?;
        Ok(EdgeTable {
            path,
            source_partition,
            sink_partition,
            row_width: schema.row_width(),
            n_rows: 0,
            index: Some(Vec::new()),
            index_dirty: false,
        })
    }

    pub fn open(
        path: PathBuf,
        source_partition: u32,
        sink_partition: u32,
        schema: &TableSchema,
    ) -> Result<Self> {
        let row_width = schema.row_width();
        let byte_len = path.metadata()?.len();
        if byte_len % row_width as u64 != 0 {
            return Err(StoreError::CorruptStore(format!(
                "table {} holds {} bytes, not a multiple of the {}-byte row",
                path.display(),
                byte_len,
                row_width
            )));
        }
        Ok(EdgeTable {
            path,
            source_partition,
            sink_partition,
            row_width,
            n_rows: byte_len / row_width as u64,
            index: None,
            index_dirty: false,
        })
    }

    pub fn source_partition(&self) -> u32 {
        self.source_partition
    }

    pub fn sink_partition(&self) -> u32 {
        self.sink_partition
    }

    /// All rows on disk, masked included.
    pub fn len(&self) -> u64 {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Unmasked rows; requires a clean index.
    pub fn visible_len(&self) -> Option<u64> {
        match (&self.index, self.index_dirty) {
            (Some(index), false) => Some(index.len() as u64),
            _ => None,
        }
    }

    pub fn index_dirty(&self) -> bool {
        self.index_dirty || self.index.is_none()
    }

    pub fn append(&mut self, schema: &TableSchema, rows: &[EdgeRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            debug_assert!(row.source <= row.sink, "rows must be canonical");
            debug_assert_eq!(row.values.len(), schema.columns.len());
            write_row_into(&mut writer, row)?;
        }
        writer.flush()?;
        self.n_rows += rows.len() as u64;
        self.index_dirty = true;
        Ok(())
    }

    pub fn read_row(&self, schema: &TableSchema, row_ix: u64) -> Result<EdgeRow> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(row_ix * self.row_width as u64))?;
        Ok(read_row_from(&mut file, schema)?)
    }

    /// Overwrite a row in place. The caller must not change `(source,
    /// sink)`, so the index stays valid.
    pub fn write_row(&mut self, schema: &TableSchema, row_ix: u64, row: &EdgeRow) -> Result<()> {
        debug_assert_eq!(row.values.len(), schema.columns.len());
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(row_ix * self.row_width as u64))?;
        write_row_into(&mut file, row)?;
        Ok(())
    }

    /// Mask the row at `row_ix`, hiding it from scans.
    pub fn mask_row(&mut self, schema: &TableSchema, row_ix: u64) -> Result<()> {
        let mut row = self.read_row(schema, row_ix)?;
        if !row.masked {
            row.masked = true;
            self.write_row(schema, row_ix, &row)?;
            self.index_dirty = true;
        }
        Ok(())
    }

    ///
    /// Rebuild the `(source, sink)` index from disk, skipping masked
    /// rows. Also validates the canonical-orientation invariant.
    ///
    pub fn rebuild_index(&mut self, schema: &TableSchema) -> Result<()> {
        let mut entries = Vec::with_capacity(self.n_rows as usize);
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        for row_ix in 0..self.n_rows {
            let row = read_row_from(&mut reader, schema)?;
            if row.source > row.sink {
                return Err(StoreError::CorruptStore(format!(
                    "table {} row {} has source {} > sink {}",
                    self.path.display(),
                    row_ix,
                    row.source,
                    row.sink
                )));
            }
            if !row.masked {
                entries.push(IndexEntry {
                    source: row.source,
                    sink: row.sink,
                    row: row_ix as u32,
                });
            }
        }
        entries.sort_unstable_by_key(|e| (e.source, e.sink, e.row));
        self.index = Some(entries);
        self.index_dirty = false;
        Ok(())
    }

    pub fn ensure_index(&mut self, schema: &TableSchema) -> Result<()> {
        if self.index_dirty() {
            self.rebuild_index(schema)?;
        }
        Ok(())
    }

    /// Row id of the unmasked row with key `(source, sink)`, if present.
    /// Requires a clean index.
    pub fn find_row(&self, source: u32, sink: u32) -> Option<u64> {
        let index = self.index.as_ref()?;
        let at = index.partition_point(|e| (e.source, e.sink) < (source, sink));
        let entry = index.get(at)?;
        if (entry.source, entry.sink) == (source, sink) {
            Some(entry.row as u64)
        } else {
            None
        }
    }

    /// Sequential scan over unmasked rows, in insertion order.
    pub fn scan<'a>(&self, schema: &'a TableSchema) -> std::io::Result<TableScan<'a>> {
        let file = File::open(&self.path)?;
        Ok(TableScan {
            reader: BufReader::new(file),
            schema,
            remaining: self.n_rows,
        })
    }

    ///
    /// Indexed scan over unmasked rows with `source` in `sources` and
    /// `sink` in `sinks` (both inclusive), yielded by ascending `source`.
    /// Requires a clean index.
    ///
    pub fn scan_window<'a>(
        &'a self,
        schema: &'a TableSchema,
        sources: (u32, u32),
        sinks: (u32, u32),
    ) -> Result<WindowRows<'a>> {
        let index = self.index.as_deref().ok_or_else(|| {
            StoreError::CorruptStore(format!(
                "table {} scanned without an index",
                self.path.display()
            ))
        })?;
        let lo = index.partition_point(|e| e.source < sources.0);
        let hi = index.partition_point(|e| e.source <= sources.1);
        let file = File::open(&self.path)?;
        Ok(WindowRows {
            file,
            schema,
            row_width: self.row_width,
            entries: &index[lo..hi],
            pos: 0,
            sinks,
        })
    }
}

/// Sequential full-table scan.
pub struct TableScan<'a> {
    reader: BufReader<File>,
    schema: &'a TableSchema,
    remaining: u64,
}

impl Iterator for TableScan<'_> {
    type Item = std::io::Result<EdgeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            self.remaining -= 1;
            match read_row_from(&mut self.reader, self.schema) {
                Ok(row) if row.masked => continue,
                Ok(row) => return Some(Ok(row)),
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Index-driven window scan.
pub struct WindowRows<'a> {
    file: File,
    schema: &'a TableSchema,
    row_width: usize,
    entries: &'a [IndexEntry],
    pos: usize,
    sinks: (u32, u32),
}

impl Iterator for WindowRows<'_> {
    type Item = std::io::Result<EdgeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.entries.len() {
            let entry = self.entries[self.pos];
            self.pos += 1;
            if entry.sink < self.sinks.0 || entry.sink > self.sinks.1 {
                continue;
            }
            let read = self
                .file
                .seek(SeekFrom::Start(entry.row as u64 * self.row_width as u64))
                .and_then(|_| read_row_from(&mut self.file, self.schema));
            match read {
                Ok(row) => return Some(Ok(row)),
                Err(e) => {
                    self.pos = self.entries.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn write_row_into<W: Write>(writer: &mut W, row: &EdgeRow) -> std::io::Result<()> {
    writer.write_i32::<LittleEndian>(row.source as i32)?;
    writer.write_i32::<LittleEndian>(row.sink as i32)?;
    writer.write_u8(row.masked as u8)?;
    for value in &row.values {
        match *value {
            FieldValue::F64(v) => writer.write_f64::<LittleEndian>(v)?,
            FieldValue::I64(v) => writer.write_i64::<LittleEndian>(v)?,
        }
    }
    Ok(())
}

fn read_row_from<R: Read>(reader: &mut R, schema: &TableSchema) -> std::io::Result<EdgeRow> {
    let source = reader.read_i32::<LittleEndian>()? as u32;
    let sink = reader.read_i32::<LittleEndian>()? as u32;
    let masked = reader.read_u8()? != 0;
    let mut values = Vec::with_capacity(schema.columns.len());
    for column in &schema.columns {
        let value = match column.dtype {
            ColumnType::F64 => FieldValue::F64(reader.read_f64::<LittleEndian>()?),
            ColumnType::I64 => FieldValue::I64(reader.read_i64::<LittleEndian>()?),
        };
        values.push(value);
    }
    Ok(EdgeRow {
        source,
        sink,
        masked,
        values,
    })
}
