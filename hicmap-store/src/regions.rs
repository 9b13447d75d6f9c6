use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use hicmap_core::errors::RegionError;
use hicmap_core::models::{GenomeIndex, Region, RegionKey};

use crate::errors::{Result, StoreError};

///
/// The ordered region table. Regions append in bulk while the table is
/// growing; the first edge flush freezes it (further appends fail with
/// `RegionsFrozen`). The normalization attributes `valid` and `bias` stay
/// mutable after freezing. Persisted as a whole on flush.
///
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
    index: Option<GenomeIndex>,
    frozen: bool,
    dirty: bool,
}

impl RegionTable {
    pub fn new() -> Self {
        RegionTable::default()
    }

    /// Load the table from its bincode file.
    pub fn load<P: AsRef<Path>>(path: P, frozen: bool) -> Result<Self> {
        let file = File::open(path)?;
        let regions: Vec<Region> = bincode::deserialize_from(BufReader::new(file))?;
        for (ix, region) in regions.iter().enumerate() {
            if region.ix != ix as u32 {
                return Err(StoreError::CorruptStore(format!(
                    "region at position {} carries index {}",
                    ix, region.ix
                )));
            }
        }
        Ok(RegionTable {
            regions,
            index: None,
            frozen,
            dirty: false,
        })
    }

    /// Write the table to its bincode file.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), &self.regions)?;
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Reject further appends.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    ///
    /// Append a region, assigning its dense index. Fails with
    /// `RegionsFrozen` once edges have been flushed.
    ///
    pub fn append(&mut self, mut region: Region) -> Result<u32> {
        if self.frozen {
            return Err(StoreError::RegionsFrozen);
        }
        let ix = self.regions.len() as u32;
        region.ix = ix;
        self.regions.push(region);
        self.index = None;
        self.dirty = true;
        Ok(ix)
    }

    pub fn len(&self) -> u32 {
        self.regions.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, ix: u32) -> Result<&Region, RegionError> {
        self.regions
            .get(ix as usize)
            .ok_or(RegionError::IndexOutOfRange(ix, self.regions.len() as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Chromosome names in order of first appearance.
    pub fn chromosomes(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for region in &self.regions {
            if !names.contains(&region.chromosome) {
                names.push(region.chromosome.clone());
            }
        }
        names
    }

    pub fn set_bias(&mut self, ix: u32, bias: f64) -> Result<()> {
        let len = self.regions.len() as u32;
        let region = self
            .regions
            .get_mut(ix as usize)
            .ok_or(RegionError::IndexOutOfRange(ix, len))?;
        region.bias = bias;
        self.dirty = true;
        Ok(())
    }

    pub fn set_valid(&mut self, ix: u32, valid: bool) -> Result<()> {
        let len = self.regions.len() as u32;
        let region = self
            .regions
            .get_mut(ix as usize)
            .ok_or(RegionError::IndexOutOfRange(ix, len))?;
        region.valid = valid;
        self.dirty = true;
        Ok(())
    }

    ///
    /// Resolve a key into region indexes, in key order. Span keys resolve
    /// by coordinate overlap, list keys concatenate.
    ///
    pub fn resolve(&mut self, key: &RegionKey) -> Result<Vec<u32>, RegionError> {
        match key {
            RegionKey::Index(ix) => {
                self.get(*ix)?;
                Ok(vec![*ix])
            }
            RegionKey::Range(a, b) => {
                let len = self.regions.len() as u32;
                let b = (*b).min(len);
                if *a >= b {
                    return Err(RegionError::EmptyRange(key.to_string()));
                }
                Ok((*a..b).collect())
            }
            RegionKey::Span(span) => {
                let index = self.genome_index();
                let hits = index.find(span)?;
                Ok(hits.into_iter().map(|pos| pos as u32).collect())
            }
            RegionKey::List(keys) => {
                if keys.is_empty() {
                    return Err(RegionError::EmptyRange(key.to_string()));
                }
                let mut all = Vec::new();
                for key in keys {
                    all.extend(self.resolve(key)?);
                }
                Ok(all)
            }
        }
    }

    /// Resolve a key into owned region records.
    pub fn resolve_regions(&mut self, key: &RegionKey) -> Result<Vec<Region>, RegionError> {
        let indexes = self.resolve(key)?;
        Ok(indexes
            .into_iter()
            .map(|ix| self.regions[ix as usize].clone())
            .collect())
    }

    fn genome_index(&mut self) -> &GenomeIndex {
        self.index
            .get_or_insert_with(|| GenomeIndex::from_regions(&self.regions))
    }
}
