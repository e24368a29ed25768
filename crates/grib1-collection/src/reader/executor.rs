//! Execution of a planned read: file sweeps, decode, placement.
//!
//! Records are processed in ascending `(partno, fileno, pos)` order
//! with a single open handle and a single scratch grid. Per-record
//! failures (file unavailable, undecodable message) leave the NaN fill
//! in place and the read continues.

use tracing::{trace, warn};

use crate::codec::{Grib1Codec, RandomAccess};
use crate::error::Result;
use crate::index::partition::TimePartition;
use crate::index::{Collection, MISSING_RECORD};
use crate::reader::planner::{DataRecord, ReadRequest};
use crate::reader::CancelToken;
use crate::schema::MISSING_VALUE;

/// Where record files come from: the flat collection, or the partition
/// that scopes each record's file number.
pub(crate) enum RecordSource<'a> {
    Collection(&'a Collection),
    Partition(&'a TimePartition),
}

impl RecordSource<'_> {
    fn open_file(&self, partno: i32, fileno: u32) -> Result<Box<dyn RandomAccess>> {
        match self {
            Self::Collection(collection) => Ok(collection.open_file(fileno)?),
            Self::Partition(tp) => tp.open_file(partno as usize, fileno),
        }
    }

    fn location(&self, partno: i32, fileno: u32) -> String {
        match self {
            Self::Collection(collection) => collection.file_location(fileno),
            Self::Partition(tp) => tp.file_location(partno as usize, fileno),
        }
    }
}

/// Horizontal grid geometry of the group being read.
pub(crate) struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub scan_mode: i32,
}

/// Run a plan to completion, returning the dense output buffer of size
/// `prefix * ySel * xSel`, NaN-prefilled.
pub(crate) fn execute(
    source: &RecordSource<'_>,
    codec: &dyn Grib1Codec,
    shape: &GridShape,
    mut plan: Vec<DataRecord>,
    req: &ReadRequest,
    cancel: &CancelToken,
) -> Result<Vec<f32>> {
    let horiz = req.horiz_len();
    let mut out = vec![MISSING_VALUE; req.prefix_len() * horiz];

    // one sequential sweep per file, seeks non-decreasing within it
    plan.sort_unstable();

    let mut scratch = vec![0.0f32; shape.nx * shape.ny];
    let mut curr_key: Option<(i32, u32)> = None;
    let mut curr_handle: Option<Box<dyn RandomAccess>> = None;

    for record in &plan {
        if cancel.is_cancelled() {
            return Err(crate::error::CollectionError::Cancelled);
        }
        if record.pos == MISSING_RECORD {
            continue;
        }

        if curr_key != Some((record.partno, record.fileno)) {
            curr_handle = None; // close before moving to the next file
            curr_key = Some((record.partno, record.fileno));
            match source.open_file(record.partno, record.fileno) {
                Ok(handle) => curr_handle = Some(handle),
                Err(err) => {
                    warn!(
                        file = %source.location(record.partno, record.fileno),
                        error = %err,
                        "grib file unavailable, filling with NaN"
                    );
                }
            }
        }

        let Some(handle) = curr_handle.as_mut() else {
            continue; // the whole file stays NaN
        };

        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(header) = codec.read_header(handle.as_mut(), record.pos as u64) {
                trace!(
                    file = %source.location(record.partno, record.fileno),
                    pos = record.pos,
                    parameter = header.parameter,
                    reference_time = %header.reference_time,
                    forecast_time = header.forecast_time,
                    interval = ?header.interval,
                    "decoding grib1 record"
                );
            }
        }

        match codec.decode(
            handle.as_mut(),
            record.pos as u64,
            &mut scratch,
            shape.scan_mode,
            shape.nx,
        ) {
            Ok(()) => place(&scratch, record.result_index, req, shape.nx, horiz, &mut out),
            Err(err) => {
                warn!(
                    file = %source.location(record.partno, record.fileno),
                    pos = record.pos,
                    error = %err,
                    "failed to decode grib1 record, filling with NaN"
                );
            }
        }
    }

    Ok(out)
}

/// Copy the selected sub-rectangle of a decoded grid into the output
/// slab owned by this record.
fn place(
    scratch: &[f32],
    result_index: usize,
    req: &ReadRequest,
    nx: usize,
    horiz: usize,
    out: &mut [f32],
) {
    let start = result_index * horiz;
    let mut count = 0;
    for y in req.y.iter() {
        let row = y * nx;
        for x in req.x.iter() {
            out[start + count] = scratch[row + x];
            count += 1;
        }
    }
}
