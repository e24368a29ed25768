//! End-to-end reads across time partitions: per-time partition
//! resolution, cross-partition coalescing, lazy partition hydration.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use grib1_collection::{
    CollectionError, Collection, Grib1CollectionReader, Grib1Index, NoPartitionSource,
    OpenOptions, Partition, PartitionLoader, PartitionTimeIndex, PartitionedGroup, Range, Record,
    Result, TimeCoordUnion, TimePartition, VarRef, VariableIndexPartitioned,
};

use common::{
    encode_cell, flat_collection, latlon_hcs, open_log, temperature_meta, time_coord, OpenLog,
    StubCodec, TestTablesFactory, TracingFiles,
};

const VAR: &str = "Temperature_isobaric";

/// One partition's collection: a single local time step whose record
/// sits at the given offset in the partition's own file 0.
fn partition_collection(label: &str, log: OpenLog, pos: i64) -> Collection {
    let provider = Arc::new(TracingFiles::new(label, 1, log));
    flat_collection(4, 3, 1, None, None, vec![Record { fileno: 0, pos }], provider)
}

/// A two-partition index whose global time axis maps index `t` to
/// `time_index[t]`.
fn two_partition_index(
    time_index: Vec<PartitionTimeIndex>,
    partitions: Vec<Partition>,
    partition_var: Vec<Option<VarRef>>,
    loader: Arc<dyn PartitionLoader>,
) -> TimePartition {
    let group = PartitionedGroup {
        name: "grid0".to_string(),
        hcs: latlon_hcs(4, 3),
        time_unions: vec![TimeCoordUnion { coord: time_coord(time_index.len()), index: time_index }],
        vert_coords: Vec::new(),
        ens_coords: Vec::new(),
        variables: vec![VariableIndexPartitioned {
            meta: temperature_meta(),
            group: 0,
            time_idx: 0,
            vert_idx: -1,
            ens_idx: -1,
            nens: 1,
            nverts: 1,
            partition_var,
        }],
    };
    TimePartition::new("test-partition", 7, 0, 2, 81, vec![group], partitions, loader)
}

fn open_reader(tp: TimePartition, codec: StubCodec) -> Grib1CollectionReader {
    Grib1CollectionReader::open(
        Grib1Index::TimePartition(tp),
        &TestTablesFactory,
        Arc::new(codec),
        OpenOptions::default(),
    )
    .expect("open time partition")
}

#[test]
fn interleaves_partitions_in_time_order() -> anyhow::Result<()> {
    let log = open_log();
    let tp = two_partition_index(
        vec![
            PartitionTimeIndex { partno: 0, local_idx: 0 },
            PartitionTimeIndex { partno: 1, local_idx: 0 },
        ],
        vec![
            Partition::with_collection("partA", partition_collection("A", log.clone(), 100)),
            Partition::with_collection("partB", partition_collection("B", log.clone(), 200)),
        ],
        vec![Some(VarRef { group: 0, var: 0 }), Some(VarRef { group: 0, var: 0 })],
        Arc::new(NoPartitionSource),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let ranges = [Range::all(2), Range::all(3), Range::all(4)];
    let out = reader.read(VAR, &ranges)?;

    // exactly two opens, partition A's file before partition B's
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[("A".to_string(), 0), ("B".to_string(), 0)]
    );
    assert_eq!(out.shape(), &[2, 3, 4]);
    assert_eq!(out.get(&[0, 1, 2]), Some(encode_cell(100, 1, 2)));
    assert_eq!(out.get(&[1, 1, 2]), Some(encode_cell(200, 1, 2)));
    Ok(())
}

#[test]
fn partition_order_may_be_non_monotone() -> anyhow::Result<()> {
    // global time 0 lives in partition 1, time 1 in partition 0
    let log = open_log();
    let tp = two_partition_index(
        vec![
            PartitionTimeIndex { partno: 1, local_idx: 0 },
            PartitionTimeIndex { partno: 0, local_idx: 0 },
        ],
        vec![
            Partition::with_collection("partA", partition_collection("A", log.clone(), 100)),
            Partition::with_collection("partB", partition_collection("B", log.clone(), 200)),
        ],
        vec![Some(VarRef { group: 0, var: 0 }), Some(VarRef { group: 0, var: 0 })],
        Arc::new(NoPartitionSource),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let out = reader.read(VAR, &[Range::all(2), Range::all(3), Range::all(4)])?;

    // I/O still sweeps partitions in ascending order
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[("A".to_string(), 0), ("B".to_string(), 0)]
    );
    // but placement follows the global time axis
    assert_eq!(out.get(&[0, 0, 0]), Some(encode_cell(200, 0, 0)));
    assert_eq!(out.get(&[1, 0, 0]), Some(encode_cell(100, 0, 0)));
    Ok(())
}

/// Builds partition collections on demand, counting loads.
struct LazyLoader {
    log: OpenLog,
    calls: Arc<AtomicUsize>,
}

impl PartitionLoader for LazyLoader {
    fn load_partition(&self, partno: usize) -> Result<Collection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = if partno == 0 { "A" } else { "B" };
        Ok(partition_collection(label, self.log.clone(), 100 * (partno as i64 + 1)))
    }
}

#[test]
fn partitions_hydrate_lazily() -> anyhow::Result<()> {
    let log = open_log();
    let calls = Arc::new(AtomicUsize::new(0));
    let tp = two_partition_index(
        vec![
            PartitionTimeIndex { partno: 0, local_idx: 0 },
            PartitionTimeIndex { partno: 1, local_idx: 0 },
        ],
        vec![Partition::new("partA"), Partition::new("partB")],
        vec![Some(VarRef { group: 0, var: 0 }), Some(VarRef { group: 0, var: 0 })],
        Arc::new(LazyLoader { log: log.clone(), calls: calls.clone() }),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    // touching only time 0 hydrates only partition A
    let out = reader.read(VAR, &[Range::single(0), Range::all(3), Range::all(4)])?;
    assert_eq!(out.get(&[0, 0, 0]), Some(encode_cell(100, 0, 0)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.lock().unwrap().as_slice(), &[("A".to_string(), 0)]);

    // the second read touches both, hydrating B exactly once
    reader.read(VAR, &[Range::all(2), Range::all(3), Range::all(4)])?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn concurrent_reads_hydrate_each_partition_once() {
    let log = open_log();
    let calls = Arc::new(AtomicUsize::new(0));
    let tp = two_partition_index(
        vec![
            PartitionTimeIndex { partno: 0, local_idx: 0 },
            PartitionTimeIndex { partno: 1, local_idx: 0 },
        ],
        vec![Partition::new("partA"), Partition::new("partB")],
        vec![Some(VarRef { group: 0, var: 0 }), Some(VarRef { group: 0, var: 0 })],
        Arc::new(LazyLoader { log, calls: calls.clone() }),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let ranges = [Range::all(2), Range::all(3), Range::all(4)];
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                reader.read(VAR, &ranges).unwrap();
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn partition_without_variable_fills_nan() -> anyhow::Result<()> {
    common::init_test_logging();
    let log = open_log();
    let tp = two_partition_index(
        vec![
            PartitionTimeIndex { partno: 0, local_idx: 0 },
            PartitionTimeIndex { partno: 1, local_idx: 0 },
        ],
        vec![
            Partition::with_collection("partA", partition_collection("A", log.clone(), 100)),
            Partition::with_collection("partB", partition_collection("B", log.clone(), 200)),
        ],
        vec![Some(VarRef { group: 0, var: 0 }), None],
        Arc::new(NoPartitionSource),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let out = reader.read(VAR, &[Range::all(2), Range::all(3), Range::all(4)])?;

    assert_eq!(out.get(&[0, 0, 0]), Some(encode_cell(100, 0, 0)));
    assert!(out.data()[12..].iter().all(|v| v.is_nan()));
    // partition B's file is never touched
    assert_eq!(log.lock().unwrap().as_slice(), &[("A".to_string(), 0)]);
    Ok(())
}

#[test]
fn partitioned_vertical_axis_placement() -> anyhow::Result<()> {
    // two levels per partition; local record tables are (1 time, 2 verts)
    let log = open_log();
    let make_part = |label: &str, base: i64| {
        let provider = Arc::new(TracingFiles::new(label, 1, log.clone()));
        flat_collection(
            4,
            3,
            1,
            None,
            Some(2),
            vec![Record { fileno: 0, pos: base }, Record { fileno: 0, pos: base + 8 }],
            provider,
        )
    };

    let group = PartitionedGroup {
        name: "grid0".to_string(),
        hcs: latlon_hcs(4, 3),
        time_unions: vec![TimeCoordUnion {
            coord: time_coord(2),
            index: vec![
                PartitionTimeIndex { partno: 0, local_idx: 0 },
                PartitionTimeIndex { partno: 1, local_idx: 0 },
            ],
        }],
        vert_coords: vec![common::vert_coord(2)],
        ens_coords: Vec::new(),
        variables: vec![VariableIndexPartitioned {
            meta: temperature_meta(),
            group: 0,
            time_idx: 0,
            vert_idx: 0,
            ens_idx: -1,
            nens: 1,
            nverts: 2,
            partition_var: vec![
                Some(VarRef { group: 0, var: 0 }),
                Some(VarRef { group: 0, var: 0 }),
            ],
        }],
    };
    let tp = TimePartition::new(
        "test-partition",
        7,
        0,
        2,
        81,
        vec![group],
        vec![
            Partition::with_collection("partA", make_part("A", 100)),
            Partition::with_collection("partB", make_part("B", 200)),
        ],
        Arc::new(NoPartitionSource),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let out = reader.read(
        VAR,
        &[Range::all(2), Range::all(2), Range::all(3), Range::all(4)],
    )?;

    assert_eq!(out.shape(), &[2, 2, 3, 4]);
    assert_eq!(out.get(&[0, 0, 0, 0]), Some(encode_cell(100, 0, 0)));
    assert_eq!(out.get(&[0, 1, 0, 0]), Some(encode_cell(108, 0, 0)));
    assert_eq!(out.get(&[1, 0, 0, 0]), Some(encode_cell(200, 0, 0)));
    assert_eq!(out.get(&[1, 1, 2, 3]), Some(encode_cell(208, 2, 3)));
    Ok(())
}

#[test]
fn partitioned_rank_mismatch_is_invalid() {
    let log = open_log();
    let tp = two_partition_index(
        vec![PartitionTimeIndex { partno: 0, local_idx: 0 }],
        vec![Partition::with_collection(
            "partA",
            partition_collection("A", log.clone(), 100),
        )],
        vec![Some(VarRef { group: 0, var: 0 })],
        Arc::new(NoPartitionSource),
    );
    let reader = open_reader(tp, StubCodec::new(encode_cell));

    let err = reader.read(VAR, &[Range::all(1), Range::all(3)]).unwrap_err();
    assert!(matches!(err, CollectionError::InvalidRequest(_)));
    assert!(log.lock().unwrap().is_empty());
}
