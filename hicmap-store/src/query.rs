use std::collections::{BTreeMap, VecDeque};
use std::io;

use crate::edges::EdgeStore;
use crate::errors::Result;
use crate::partition::PartitionMap;
use crate::table::{EdgeRow, TableScan, WindowRows};

///
/// Streaming scan over every stored row of a row×column index window.
///
/// The window visits the partition-pair tables its index ranges touch,
/// each at most once. A table both ranges cover completely streams whole;
/// any other table is scanned twice against the canonical half-matrix:
/// once with the canonical predicate (`source` in rows, `sink` in
/// columns) and once with the mirror predicate (`source` in columns,
/// `sink` in rows). Where the two index ranges overlap, rows lying
/// entirely inside the overlap square match both predicates and are
/// suppressed in the mirror pass.
///
/// Rows are unordered across tables; within one indexed pass they come by
/// ascending `source`.
///
pub struct WindowScan<'a> {
    segments: VecDeque<Segment<'a>>,
}

enum Segment<'a> {
    Full(TableScan<'a>),
    Canonical(WindowRows<'a>),
    Mirror(WindowRows<'a>, Option<(u32, u32)>),
}

impl WindowScan<'_> {
    /// A scan over nothing, for windows with no resolvable regions.
    pub(crate) fn empty() -> Self {
        WindowScan {
            segments: VecDeque::new(),
        }
    }
}

impl Iterator for WindowScan<'_> {
    type Item = io::Result<EdgeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(segment) = self.segments.front_mut() {
            let item = match segment {
                Segment::Full(scan) => scan.next(),
                Segment::Canonical(scan) => scan.next(),
                Segment::Mirror(scan, overlap) => next_unsuppressed(scan, *overlap),
            };
            match item {
                Some(item) => return Some(item),
                None => {
                    self.segments.pop_front();
                }
            }
        }
        None
    }
}

fn next_unsuppressed(
    scan: &mut WindowRows<'_>,
    overlap: Option<(u32, u32)>,
) -> Option<io::Result<EdgeRow>> {
    for item in scan {
        match (&item, overlap) {
            (Ok(row), Some((lo, hi)))
                if lo <= row.source && row.source <= hi && lo <= row.sink && row.sink <= hi =>
            {
                continue;
            }
            _ => return Some(item),
        }
    }
    None
}

/// The overlap square `[max(r0, c0), min(r1, c1)]` of the two inclusive
/// index ranges, if any.
fn range_overlap(rows: (u32, u32), cols: (u32, u32)) -> Option<(u32, u32)> {
    let lo = rows.0.max(cols.0);
    let hi = rows.1.min(cols.1);
    (lo <= hi).then_some((lo, hi))
}

impl EdgeStore {
    ///
    /// Scan all rows landing in the window spanned by two inclusive
    /// region index ranges. Tables touched with a predicate get their
    /// index rebuilt first when dirty.
    ///
    pub fn scan_window(
        &mut self,
        parts: &PartitionMap,
        rows: (u32, u32),
        cols: (u32, u32),
    ) -> Result<WindowScan<'_>> {
        // each table is visited once, as a full stream when any
        // orientation covers both partitions completely
        let mut visits: BTreeMap<(u32, u32), bool> = BTreeMap::new();
        for i in parts.partition_of(rows.0)..=parts.partition_of(rows.1) {
            for j in parts.partition_of(cols.0)..=parts.partition_of(cols.1) {
                let key = (i.min(j), i.max(j));
                let full = parts.is_covered(i, rows.0, rows.1) && parts.is_covered(j, cols.0, cols.1);
                let covered = visits.entry(key).or_insert(false);
                *covered = *covered || full;
            }
        }

        let schema = self.schema().clone();
        for (key, full) in &visits {
            if !*full && let Some(table) = self.tables_mut().get_mut(key) {
                table.ensure_index(&schema)?;
            }
        }

        let overlap = range_overlap(rows, cols);
        let mut segments = VecDeque::new();
        for (key, full) in visits {
            let Some(table) = self.table(key) else {
                continue;
            };
            if full {
                segments.push_back(Segment::Full(table.scan(self.schema())?));
            } else {
                segments.push_back(Segment::Canonical(table.scan_window(
                    self.schema(),
                    rows,
                    cols,
                )?));
                segments.push_back(Segment::Mirror(
                    table.scan_window(self.schema(), cols, rows)?,
                    overlap,
                ));
            }
        }
        Ok(WindowScan { segments })
    }
}
