use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::consts::{EDGES_SUBFOLDER, META_FILE, REGIONS_FILE};
use crate::errors::{Result, StoreError};
use crate::partition::PartitionStrategy;
use crate::table::TableSchema;

///
/// Metadata persisted at the store root. `partition_breaks` is `None`
/// until the region table has been frozen; on open a missing value is
/// recomputed from the regions.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub class_id: String,
    pub partition_strategy: PartitionStrategy,
    pub partition_breaks: Option<Vec<u32>>,
    pub schema: TableSchema,
    pub frozen: bool,
    pub default_score_field: String,
}

///
/// A store directory: `meta.json`, `regions.bin`, and an `edges/`
/// sub-directory with one binary table per partition pair. Node names map
/// to paths; node attributes live in the metadata file.
///
#[derive(Debug, Clone)]
pub struct StoreDir {
    root: PathBuf,
}

impl StoreDir {
    ///
    /// Create a fresh store directory. Fails if the location already holds
    /// a store.
    ///
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.join(META_FILE).exists() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("store already exists at {}", root.display()),
            )));
        }
        fs::create_dir_all(root.join(EDGES_SUBFOLDER))?;
        info!("created store at {}", root.display());
        Ok(StoreDir { root })
    }

    /// Open an existing store directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(META_FILE).is_file() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("no store at {}", root.display()),
            )));
        }
        info!("opened store at {}", root.display());
        Ok(StoreDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_meta(&self) -> Result<StoreMeta> {
        let file = File::open(self.root.join(META_FILE))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write_meta(&self, meta: &StoreMeta) -> Result<()> {
        let file = File::create(self.root.join(META_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, meta)?;
        Ok(())
    }

    pub fn regions_path(&self) -> PathBuf {
        self.root.join(REGIONS_FILE)
    }

    pub fn table_path(&self, source_partition: u32, sink_partition: u32) -> PathBuf {
        self.root.join(EDGES_SUBFOLDER).join(format!(
            "part_{}_{}.bin",
            source_partition, sink_partition
        ))
    }

    ///
    /// Partition pairs of all tables present on disk, in key order.
    ///
    pub fn list_tables(&self) -> Result<Vec<(u32, u32)>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(self.root.join(EDGES_SUBFOLDER))? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = parse_table_name(&name) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

fn parse_table_name(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_prefix("part_")?.strip_suffix(".bin")?;
    let (i, j) = stem.split_once('_')?;
    Some((i.parse().ok()?, j.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_name_parsing() {
        assert_eq!(parse_table_name("part_0_0.bin"), Some((0, 0)));
        assert_eq!(parse_table_name("part_3_12.bin"), Some((3, 12)));
        assert_eq!(parse_table_name("part_3.bin"), None);
        assert_eq!(parse_table_name("regions.bin"), None);
        assert_eq!(parse_table_name("part_a_b.bin"), None);
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");

        let store = StoreDir::create(&root).unwrap();
        let meta = StoreMeta {
            class_id: "CONTACT_MAP".to_string(),
            partition_strategy: PartitionStrategy::Chromosome,
            partition_breaks: None,
            schema: TableSchema::with_weight(),
            frozen: false,
            default_score_field: "weight".to_string(),
        };
        store.write_meta(&meta).unwrap();

        let reopened = StoreDir::open(&root).unwrap();
        let read = reopened.read_meta().unwrap();
        assert_eq!(read.class_id, meta.class_id);
        assert_eq!(read.schema, meta.schema);
        assert!(!read.frozen);
    }

    #[test]
    fn test_create_refuses_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let store = StoreDir::create(&root).unwrap();
        store
            .write_meta(&StoreMeta {
                class_id: "CONTACT_MAP".to_string(),
                partition_strategy: PartitionStrategy::Chromosome,
                partition_breaks: None,
                schema: TableSchema::with_weight(),
                frozen: false,
                default_score_field: "weight".to_string(),
            })
            .unwrap();
        assert!(StoreDir::create(&root).is_err());
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StoreDir::open(dir.path().join("nope")).is_err());
    }
}
