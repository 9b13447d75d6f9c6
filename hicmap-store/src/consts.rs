/// File holding store metadata (class id, partition breaks, schema).
pub const META_FILE: &str = "meta.json";

/// File holding the serialized region table.
pub const REGIONS_FILE: &str = "regions.bin";

/// Sub-directory holding one binary table per partition pair.
pub const EDGES_SUBFOLDER: &str = "edges";

/// Class id written by contact map stores.
pub const CONTACT_MAP_CLASS_ID: &str = "CONTACT_MAP";

/// Staged edge rows that trigger an automatic buffer flush.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1_000_000;

/// Edge column read by default during matrix materialization.
pub const DEFAULT_SCORE_FIELD: &str = "weight";
