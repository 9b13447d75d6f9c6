use std::io;
use std::path::PathBuf;

use anyhow::Result;
use pretty_assertions::assert_eq;

use hicmap_core::models::{Edge, GenomicSpan, PairKey, Region, RegionKey};
use hicmap_matrix::{BufferStrategy, BufferedMatrix, MatrixOpts};
use hicmap_store::{AddEdge, ContactMap, StoreError, load};

fn scratch() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.hicmap");
    (dir, path)
}

/// Two chr1 regions and one chr2 region; chromosome partitioning puts the
/// break at index 2.
fn seeded_map(path: &PathBuf) -> Result<ContactMap> {
    let mut map = ContactMap::create(path)?;
    map.add_regions([
        Region::new("chr1", 1, 10),
        Region::new("chr1", 11, 20),
        Region::new("chr2", 1, 10),
    ])?;
    map.add_edges([(0u32, 1u32, 5.0), (1, 2, 3.0), (0, 2, 1.0)])?;
    Ok(map)
}

fn sorted_edges(
    edges: impl Iterator<Item = io::Result<Edge>>,
) -> io::Result<Vec<(u32, u32, f64)>> {
    let mut tuples: Vec<(u32, u32, f64)> = edges
        .map(|e| e.map(|edge| (edge.source, edge.sink, edge.weight)))
        .collect::<io::Result<_>>()?;
    tuples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    Ok(tuples)
}

#[test]
fn partitioning_by_chromosome_shards_edges() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    assert_eq!(map.partition_breaks(), &[2]);

    // (0,1) lives within partition 0; (0,2) and (1,2) cross into partition 1
    let edges_dir = path.join("edges");
    assert!(edges_dir.join("part_0_0.bin").is_file());
    assert!(edges_dir.join("part_0_1.bin").is_file());
    assert!(!edges_dir.join("part_1_1.bin").exists());

    let within = sorted_edges(map.edge_subset(&PairKey::from(0..2))?)?;
    assert_eq!(within, vec![(0, 1, 5.0)]);
    Ok(())
}

#[test]
fn full_matrix_mirrors_the_half_matrix() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let matrix = map.matrix(&PairKey::All)?;
    assert_eq!(matrix.shape(), (3, 3));
    let expected = ndarray::array![[0.0, 5.0, 1.0], [5.0, 0.0, 3.0], [1.0, 3.0, 0.0]];
    assert_eq!(matrix.data(), &expected);
    assert!(matrix.is_symmetric(1e-12));
    Ok(())
}

#[test]
fn biases_divide_cells_by_their_outer_product() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;
    map.set_bias(1, 2.0)?;
    map.set_bias(2, 0.5)?;

    let matrix = map.matrix(&PairKey::All)?;
    assert_eq!(matrix.get(0, 1), 2.5);
    assert_eq!(matrix.get(2, 1), 3.0);

    // normalized result equals the raw matrix divided element-wise
    let (_raw_dir, raw_path) = scratch();
    let mut raw_map = seeded_map(&raw_path)?;
    let raw = raw_map.matrix(&PairKey::All)?;
    let biases = [1.0, 2.0, 0.5];
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(matrix.get(i, j), raw.get(i, j) / (biases[i] * biases[j]));
        }
    }
    Ok(())
}

#[test]
fn chromosome_key_addresses_both_axes() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let matrix = map.matrix(&"chr1".parse::<PairKey>()?)?;
    assert_eq!(matrix.shape(), (2, 2));
    let expected = ndarray::array![[0.0, 5.0], [5.0, 0.0]];
    assert_eq!(matrix.data(), &expected);
    assert_eq!(matrix.row_regions().len(), 2);
    assert_eq!(matrix.col_regions()[1].start, 11);
    Ok(())
}

#[test]
fn duplicate_contacts_accumulate_into_one_row() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    map.add_edge((0u32, 1u32, 7.0))?;
    map.flush(true)?;

    assert_eq!(map.len_edges()?, 3);
    assert_eq!(map.contact(0, 1)?, 12.0);
    Ok(())
}

#[test]
fn mirrored_orientations_combine_within_one_flush() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = ContactMap::create(&path)?;
    map.add_regions([Region::new("chr1", 1, 10), Region::new("chr1", 11, 20)])?;

    map.add_edge((0u32, 1u32, 5.0))?;
    map.add_edge((1u32, 0u32, 7.0))?;
    map.flush(true)?;

    assert_eq!(map.len_edges()?, 1);
    assert_eq!(map.contact(0, 1)?, 12.0);
    Ok(())
}

#[test]
fn replace_overwrites_instead_of_accumulating() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    map.add_edge_opts(
        Edge::new(0, 1, 7.0),
        AddEdge {
            check_nodes: true,
            replace: true,
        },
    )?;
    map.flush(true)?;

    assert_eq!(map.contact(0, 1)?, 7.0);
    Ok(())
}

#[test]
fn mappable_tracks_edge_endpoints_and_masking_hides_regions() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    assert_eq!(map.mappable()?, vec![true, true, true]);

    map.set_valid(2, false)?;
    let opts = MatrixOpts {
        mask_invalid: true,
        ..MatrixOpts::default()
    };
    let matrix = map.matrix_opts(&PairKey::All, &opts)?;
    for k in 0..3 {
        assert!(matrix.is_masked(2, k));
        assert!(matrix.is_masked(k, 2));
    }
    assert!(!matrix.is_masked(0, 1));
    Ok(())
}

#[test]
fn reopen_preserves_the_edge_set() -> Result<()> {
    let (_dir, path) = scratch();
    let before;
    {
        let mut map = seeded_map(&path)?;
        map.flush(true)?;
        before = sorted_edges(map.edges()?)?;
    }

    let mut reopened = ContactMap::open(&path)?;
    assert_eq!(reopened.len_regions(), 3);
    assert_eq!(reopened.partition_breaks(), &[2]);
    assert!(reopened.is_frozen());
    let after = sorted_edges(reopened.edges()?)?;
    assert_eq!(before, after);

    // load() dispatches on the stored class id
    let mut loaded = load(&path)?;
    assert_eq!(loaded.len_edges()?, 3);
    Ok(())
}

#[test]
fn string_key_slices_compose() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let full = map.matrix(&PairKey::All)?;
    let sliced = full.sub_matrix(&"chr1".parse()?, &"chr1".parse()?)?;
    let direct = map.matrix(&"chr1".parse::<PairKey>()?)?;
    assert_eq!(sliced.data(), direct.data());
    Ok(())
}

#[test]
fn empty_store_yields_default_filled_matrix() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = ContactMap::create(&path)?;
    map.add_regions([
        Region::new("chr1", 1, 10),
        Region::new("chr1", 11, 20),
        Region::new("chr2", 1, 10),
    ])?;

    assert_eq!(map.len_edges()?, 0);
    let matrix = map.matrix(&PairKey::All)?;
    assert_eq!(matrix.shape(), (3, 3));
    assert!(matrix.data().iter().all(|v| *v == 0.0));
    Ok(())
}

#[test]
fn scalar_cells_read_through_contact() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    assert_eq!(map.contact(0, 1)?, 5.0);
    assert_eq!(map.contact(1, 0)?, 5.0);
    // no stored contact: the default value
    assert_eq!(map.contact(0, 0)?, 0.0);
    Ok(())
}

#[test]
fn diagonal_cells_are_written_once() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = ContactMap::create(&path)?;
    map.add_regions([Region::new("chr1", 1, 10), Region::new("chr1", 11, 20)])?;
    map.add_edges([(1u32, 1u32, 4.0), (0, 1, 5.0)])?;

    let matrix = map.matrix(&PairKey::All)?;
    assert_eq!(matrix.get(1, 1), 4.0);
    assert_eq!(matrix.get(0, 1), 5.0);
    Ok(())
}

#[test]
fn list_keys_concatenate_axes() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let key = PairKey::Both(RegionKey::List(vec![
        RegionKey::Index(2),
        RegionKey::Index(0),
    ]));
    let matrix = map.matrix(&key)?;
    assert_eq!(matrix.shape(), (2, 2));
    assert_eq!(matrix.get(0, 1), 1.0);
    assert_eq!(matrix.get(1, 0), 1.0);
    assert_eq!(matrix.get(0, 0), 0.0);
    assert_eq!(matrix.row_regions()[0].ix, 2);
    Ok(())
}

#[test]
fn planner_yields_exactly_the_window_edges() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let all = sorted_edges(map.edges()?)?;
    assert_eq!(all.len(), 3);

    // window (rows chr2, cols chr1) must surface mirrored rows, without
    // duplicates
    let window = sorted_edges(map.edge_subset(&PairKey::Window(
        RegionKey::parse("chr2")?,
        RegionKey::parse("chr1")?,
    ))?)?;
    assert_eq!(window, vec![(0, 2, 1.0), (1, 2, 3.0)]);

    // a window touching both partitions visits each table once
    let spanning = sorted_edges(map.edge_subset(&PairKey::from(1..3))?)?;
    assert_eq!(spanning, vec![(1, 2, 3.0)]);
    Ok(())
}

#[test]
fn failed_flush_keeps_the_buffer_for_retry() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = ContactMap::create(&path)?;
    map.add_regions([
        Region::new("chr1", 1, 10),
        Region::new("chr1", 11, 20),
        Region::new("chr2", 1, 10),
    ])?;

    map.add_edge((0u32, 1u32, 5.0))?;
    map.add_edge((0u32, 2u32, 1.0))?;

    // obstruct creation of the (0, 1) table; the (0, 0) slot flushes first
    let blocked = path.join("edges").join("part_0_1.bin");
    std::fs::create_dir(&blocked)?;
    assert!(map.flush(true).is_err());

    // the failed slot is retained and lands after the cause is removed
    std::fs::remove_dir(&blocked)?;
    map.flush(true)?;

    assert_eq!(map.len_edges()?, 2);
    assert_eq!(map.contact(0, 1)?, 5.0);
    assert_eq!(map.contact(0, 2)?, 1.0);
    Ok(())
}

#[test]
fn buffered_overlay_prefetches_and_reuses() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = ContactMap::create(&path)?;
    map.add_regions([
        Region::new("chr1", 1, 100),
        Region::new("chr1", 101, 200),
        Region::new("chr1", 201, 300),
        Region::new("chr1", 301, 400),
    ])?;
    map.add_edges([(0u32, 1u32, 5.0), (1, 2, 3.0), (2, 3, 2.0)])?;

    let mut overlay = BufferedMatrix::new(map, BufferStrategy::Relative(1.0));
    let query: GenomicSpan = "chr1:100-200".parse()?;
    let window = overlay.get(&query, &query)?;
    assert!(window.shape().0 >= 1);

    // the prefetch extends to [1, 300], so a narrower query is buffered
    let narrower: GenomicSpan = "chr1:150-180".parse()?;
    assert!(overlay.is_buffered(&narrower, &narrower));
    overlay.get(&narrower, &narrower)?;

    assert!(overlay.buffered_min().is_some());
    assert!(overlay.buffered_max().is_some());
    Ok(())
}

#[test]
fn masked_edges_disappear_from_scans() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    assert!(map.mask_edge(1, 0)?);
    assert_eq!(map.len_edges()?, 2);
    let edges = sorted_edges(map.edges()?)?;
    assert_eq!(edges, vec![(0, 2, 1.0), (1, 2, 3.0)]);

    let matrix = map.matrix(&PairKey::All)?;
    assert_eq!(matrix.get(0, 1), 0.0);
    Ok(())
}

#[test]
fn matrix_entries_stream_scored_tuples() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;

    let mut entries: Vec<(u32, u32, f64)> = map
        .matrix_entries(&"chr1".parse::<PairKey>()?, "weight")?
        .collect::<io::Result<_>>()?;
    entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    assert_eq!(entries, vec![(0, 1, 5.0)]);

    assert!(matches!(
        map.matrix_entries(&PairKey::All, "balance"),
        Err(StoreError::SchemaMismatch(_))
    ));
    Ok(())
}

#[test]
fn matrix_export_roundtrips() -> Result<()> {
    let (_dir, path) = scratch();
    let mut map = seeded_map(&path)?;
    let matrix = map.matrix(&PairKey::All)?;

    let out = path.parent().unwrap().join("matrix.tsv");
    matrix.write_tsv(&out)?;
    let text = std::fs::read_to_string(&out)?;
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert_eq!(header.split('\t').count(), 4);
    let first_row: Vec<&str> = lines.next().unwrap().split('\t').collect();
    assert_eq!(first_row[0], "chr1:1-10");
    assert_eq!(first_row[2].parse::<f64>()?, 5.0);
    Ok(())
}
