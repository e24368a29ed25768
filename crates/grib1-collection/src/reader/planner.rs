//! Translation of a hyper-rectangular request into record reads.
//!
//! The planner walks the selected `(t, e, v)` cells, resolves each to a
//! physical record (or the missing sentinel) and binds it to its flat
//! position in the result prefix. It opens no files and decodes
//! nothing; ordering for I/O happens in the executor.

use tracing::warn;

use crate::error::{CollectionError, Result};
use crate::index::partition::TimePartition;
use crate::index::{calc_index, Collection, VarRef};
use crate::range::Range;

/// The request split onto canonical axes. Absent axes carry the unit
/// selection `0..=0`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadRequest {
    pub time: Range,
    pub ens: Range,
    pub vert: Range,
    pub y: Range,
    pub x: Range,
}

impl ReadRequest {
    /// Cells in the `(t, e, v)` prefix of the output.
    pub fn prefix_len(&self) -> usize {
        self.time.len() * self.ens.len() * self.vert.len()
    }

    /// Points per horizontal slab of the output.
    pub fn horiz_len(&self) -> usize {
        self.y.len() * self.x.len()
    }
}

/// One planned read: a source location bound to its flat position in
/// the result prefix. Sorting is ascending `(partno, fileno, pos)`, so
/// a sorted plan sweeps each file once with non-decreasing offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct DataRecord {
    /// Partition index; -1 for flat collections.
    pub partno: i32,
    pub fileno: u32,
    pub pos: i64,
    pub result_index: usize,
}

/// Plan a read against a flat collection variable. Hydrates the record
/// table on first touch.
pub(crate) fn plan_collection(
    collection: &Collection,
    vref: VarRef,
    req: &ReadRequest,
) -> Result<Vec<DataRecord>> {
    let vi = collection
        .variable(vref)
        .ok_or_else(|| CollectionError::index_corrupt("variable ref out of range"))?;
    let records = collection.records(vref)?;

    let ens_len = req.ens.len();
    let vert_len = req.vert.len();
    let mut plan = Vec::with_capacity(req.prefix_len());

    for t in req.time.iter() {
        for e in req.ens.iter() {
            for v in req.vert.iter() {
                let record = records[vi.calc_index(t, e, v)];
                let result_index = (req.time.offset(t) * ens_len + req.ens.offset(e)) * vert_len
                    + req.vert.offset(v);
                plan.push(DataRecord {
                    partno: -1,
                    fileno: record.fileno,
                    pos: record.pos,
                    result_index,
                });
            }
        }
    }

    Ok(plan)
}

/// Plan a read against a partitioned variable. Each selected global
/// time index resolves through the time union to its own partition,
/// hydrating partition indexes and record tables as they are touched.
pub(crate) fn plan_partition(
    tp: &TimePartition,
    vref: VarRef,
    req: &ReadRequest,
) -> Result<Vec<DataRecord>> {
    let group = tp
        .groups
        .get(vref.group)
        .ok_or_else(|| CollectionError::index_corrupt("group ref out of range"))?;
    let vip = group
        .variables
        .get(vref.var)
        .ok_or_else(|| CollectionError::index_corrupt("variable ref out of range"))?;
    let union = group
        .time_unions
        .get(vip.time_idx as usize)
        .ok_or_else(|| CollectionError::index_corrupt("time union ref out of range"))?;

    let ens_len = req.ens.len();
    let vert_len = req.vert.len();
    let mut plan = Vec::with_capacity(req.prefix_len());

    for t in req.time.iter() {
        let pt = union.lookup(t).ok_or_else(|| {
            CollectionError::index_corrupt(format!("time union has no entry for index {}", t))
        })?;
        let t_offset = req.time.offset(t);

        let resolved = tp.vindex_for(vip, pt.partno as usize)?;
        let Some((collection, part_vref, vindex)) = resolved else {
            // partition lacks this variable: the whole time slab is missing
            warn!(
                partition = %tp.partitions()[pt.partno as usize].name,
                time_index = t,
                "variable not present in partition, filling with NaN"
            );
            for e in req.ens.iter() {
                for v in req.vert.iter() {
                    let result_index = (t_offset * ens_len + req.ens.offset(e)) * vert_len
                        + req.vert.offset(v);
                    plan.push(DataRecord {
                        partno: pt.partno as i32,
                        fileno: 0,
                        pos: crate::index::MISSING_RECORD,
                        result_index,
                    });
                }
            }
            continue;
        };

        let records = collection.records(part_vref)?;
        for e in req.ens.iter() {
            for v in req.vert.iter() {
                let record_index =
                    calc_index(pt.local_idx as usize, e, v, vindex.nens, vindex.nverts);
                let record = records.get(record_index).copied().ok_or_else(|| {
                    CollectionError::index_corrupt(format!(
                        "partition {} record index {} out of range",
                        pt.partno, record_index
                    ))
                })?;
                let result_index =
                    (t_offset * ens_len + req.ens.offset(e)) * vert_len + req.vert.offset(v);
                plan.push(DataRecord {
                    partno: pt.partno as i32,
                    fileno: record.fileno,
                    pos: record.pos,
                    result_index,
                });
            }
        }
    }

    Ok(plan)
}
