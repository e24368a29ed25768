//! Open/read/close facade over a decoded collection index.
//!
//! `open` validates the index, projects the schema and builds the side
//! table from projected variable ids to index locations. `read` plans,
//! executes and assembles one slice; reads against the same reader may
//! run in parallel.

mod executor;
mod planner;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::array::FloatArray;
use crate::codec::Grib1Codec;
use crate::config::OpenOptions;
use crate::error::{CollectionError, Result};
use crate::index::partition::TimePartition;
use crate::index::{Collection, VarRef};
use crate::range::Range;
use crate::reader::executor::{execute, GridShape, RecordSource};
use crate::reader::planner::{plan_collection, plan_partition, ReadRequest};
use crate::schema::{project_collection, project_partition, Schema, VariableKind};
use crate::tables::TablesFactory;

/// Cooperative cancellation flag, polled between records during a read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A decoded collection index, as handed over by the external indexer.
pub enum Grib1Index {
    Collection(Collection),
    TimePartition(TimePartition),
}

/// Axis lengths of one variable in canonical order, for request
/// validation.
struct AxisLens {
    time: Option<usize>,
    ens: Option<usize>,
    vert: Option<usize>,
    ny: usize,
    nx: usize,
}

impl AxisLens {
    fn rank(&self) -> usize {
        2 + self.time.is_some() as usize
            + self.ens.is_some() as usize
            + self.vert.is_some() as usize
    }
}

/// Reader over an opened GRIB1 collection.
pub struct Grib1CollectionReader {
    index: Grib1Index,
    codec: Arc<dyn Grib1Codec>,
    schema: Schema,
    /// Projected variable id -> location in the index.
    vars: HashMap<String, VarRef>,
}

impl Grib1CollectionReader {
    /// Open a decoded index: build the parameter tables from the typed
    /// options, validate the index and project the schema.
    pub fn open(
        index: Grib1Index,
        tables_factory: &dyn TablesFactory,
        codec: Arc<dyn Grib1Codec>,
        options: OpenOptions,
    ) -> Result<Self> {
        options
            .validate()
            .map_err(CollectionError::invalid_request)?;
        let tables = tables_factory.create(&options)?;

        let schema = match &index {
            Grib1Index::Collection(collection) => {
                collection.validate()?;
                project_collection(collection, tables.as_ref())
            }
            Grib1Index::TimePartition(tp) => {
                tp.validate()?;
                project_partition(tp, tables.as_ref())
            }
        };

        let mut vars = HashMap::new();
        for (group, variable) in schema.data_variables() {
            if let VariableKind::Data(vref) = variable.kind {
                let id = match &group.name {
                    Some(group_name) => format!("{}/{}", group_name, variable.name),
                    None => variable.name.clone(),
                };
                vars.insert(id, vref);
            }
        }

        let name = match &index {
            Grib1Index::Collection(c) => c.name.as_str(),
            Grib1Index::TimePartition(tp) => tp.name.as_str(),
        };
        debug!(name, variables = vars.len(), "opened grib1 collection");

        Ok(Self { index, codec, schema, vars })
    }

    /// The projected schema: coordinate variables, data variables,
    /// attributes.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read one hyper-rectangular slice of a data variable.
    ///
    /// `ranges` follows the variable's canonical axis order (`time,
    /// ens?, vert?, y, x`) with exactly one range per axis. Cells with
    /// no backing message come back as NaN.
    pub fn read(&self, variable: &str, ranges: &[Range]) -> Result<FloatArray> {
        self.read_cancellable(variable, ranges, &CancelToken::new())
    }

    /// Like [`read`](Self::read), polling `cancel` between records.
    pub fn read_cancellable(
        &self,
        variable: &str,
        ranges: &[Range],
        cancel: &CancelToken,
    ) -> Result<FloatArray> {
        let vref = *self.vars.get(variable).ok_or_else(|| {
            CollectionError::invalid_request(format!("unknown variable {:?}", variable))
        })?;

        let (lens, grid) = self.axis_lens(vref)?;
        let req = build_request(&lens, ranges)?;

        debug!(
            variable,
            cells = req.prefix_len(),
            horiz = req.horiz_len(),
            "planning slice read"
        );

        let (plan, source) = match &self.index {
            Grib1Index::Collection(collection) => (
                plan_collection(collection, vref, &req)?,
                RecordSource::Collection(collection),
            ),
            Grib1Index::TimePartition(tp) => {
                (plan_partition(tp, vref, &req)?, RecordSource::Partition(tp))
            }
        };

        let data = execute(&source, self.codec.as_ref(), &grid, plan, &req, cancel)?;
        let shape = ranges.iter().map(Range::len).collect();
        Ok(FloatArray::from_parts(shape, data))
    }

    /// Diagnostic dump of the index: coordinate sizes, record counts,
    /// partitions. Free-form; not parsed by any consumer.
    pub fn detail_info(&self) -> String {
        let mut out = String::new();
        match &self.index {
            Grib1Index::Collection(collection) => {
                let _ = writeln!(out, "collection {}", collection.name);
                let _ = writeln!(
                    out,
                    "  center {} subcenter {} table {} genProcess {}",
                    collection.center,
                    collection.subcenter,
                    collection.local_table_version,
                    collection.gen_process_id
                );
                for group in &collection.groups {
                    let _ = writeln!(
                        out,
                        "  group {}: {}x{} {}",
                        group.name,
                        group.hcs.nx,
                        group.hcs.ny,
                        if group.hcs.is_latlon() { "latlon" } else { "projected" }
                    );
                    for tc in &group.time_coords {
                        let _ = writeln!(out, "    time {} ({})", tc.name, tc.len());
                    }
                    for vc in &group.vert_coords {
                        let _ = writeln!(out, "    vert {} ({})", vc.name, vc.len());
                    }
                    for (eidx, ec) in group.ens_coords.iter().enumerate() {
                        let _ = writeln!(out, "    ens{} ({})", eidx, ec.len());
                    }
                    for vi in &group.variables {
                        let records = match vi.records() {
                            Some(records) => {
                                let present =
                                    records.iter().filter(|r| !r.is_missing()).count();
                                format!("{}/{} records", present, records.len())
                            }
                            None => "records not hydrated".to_string(),
                        };
                        let _ = writeln!(
                            out,
                            "    var param {} level {} intv {}: {}",
                            vi.meta.parameter, vi.meta.level_type, vi.meta.intv_type, records
                        );
                    }
                }
            }
            Grib1Index::TimePartition(tp) => {
                let _ = writeln!(out, "time partition {}", tp.name);
                let _ = writeln!(
                    out,
                    "  center {} subcenter {} table {} genProcess {}",
                    tp.center, tp.subcenter, tp.local_table_version, tp.gen_process_id
                );
                for group in &tp.groups {
                    let _ = writeln!(
                        out,
                        "  group {}: {}x{} {}",
                        group.name,
                        group.hcs.nx,
                        group.hcs.ny,
                        if group.hcs.is_latlon() { "latlon" } else { "projected" }
                    );
                    for union in &group.time_unions {
                        let _ = writeln!(
                            out,
                            "    time {} ({} over {} partitions)",
                            union.coord.name,
                            union.len(),
                            tp.partitions().len()
                        );
                    }
                    for vip in &group.variables {
                        let _ = writeln!(
                            out,
                            "    var param {} level {} intv {}",
                            vip.meta.parameter, vip.meta.level_type, vip.meta.intv_type
                        );
                    }
                }
                for partition in tp.partitions() {
                    let state = if partition.collection().is_some() {
                        "hydrated"
                    } else {
                        "not hydrated"
                    };
                    let _ = writeln!(out, "  partition {}: {}", partition.name, state);
                }
            }
        }
        out
    }

    /// Release the reader and the index it owns. Open file handles only
    /// live inside individual read calls, so there is nothing else to
    /// tear down.
    pub fn close(self) {
        drop(self);
    }

    fn axis_lens(&self, vref: VarRef) -> Result<(AxisLens, GridShape)> {
        match &self.index {
            Grib1Index::Collection(collection) => {
                let group = collection.groups.get(vref.group).ok_or_else(|| {
                    CollectionError::index_corrupt("variable ref group out of range")
                })?;
                let vi = group.variables.get(vref.var).ok_or_else(|| {
                    CollectionError::index_corrupt("variable ref out of range")
                })?;
                let lens = AxisLens {
                    time: (vi.time_idx >= 0)
                        .then(|| group.time_coords[vi.time_idx as usize].len()),
                    ens: (vi.ens_idx >= 0).then(|| group.ens_coords[vi.ens_idx as usize].len()),
                    vert: (vi.vert_idx >= 0)
                        .then(|| group.vert_coords[vi.vert_idx as usize].len()),
                    ny: group.hcs.ny,
                    nx: group.hcs.nx,
                };
                let grid = GridShape {
                    nx: group.hcs.nx,
                    ny: group.hcs.ny,
                    scan_mode: group.hcs.scan_mode,
                };
                Ok((lens, grid))
            }
            Grib1Index::TimePartition(tp) => {
                let group = tp.groups.get(vref.group).ok_or_else(|| {
                    CollectionError::index_corrupt("variable ref group out of range")
                })?;
                let vip = group.variables.get(vref.var).ok_or_else(|| {
                    CollectionError::index_corrupt("variable ref out of range")
                })?;
                let lens = AxisLens {
                    time: Some(group.time_unions[vip.time_idx as usize].len()),
                    ens: (vip.ens_idx >= 0).then(|| group.ens_coords[vip.ens_idx as usize].len()),
                    vert: (vip.vert_idx >= 0)
                        .then(|| group.vert_coords[vip.vert_idx as usize].len()),
                    ny: group.hcs.ny,
                    nx: group.hcs.nx,
                };
                let grid = GridShape {
                    nx: group.hcs.nx,
                    ny: group.hcs.ny,
                    scan_mode: group.hcs.scan_mode,
                };
                Ok((lens, grid))
            }
        }
    }
}

/// Validate the request rank and bounds, and split the ranges onto the
/// canonical axes. Fails before any file is opened.
fn build_request(lens: &AxisLens, ranges: &[Range]) -> Result<ReadRequest> {
    let rank = lens.rank();
    if ranges.len() != rank {
        return Err(CollectionError::invalid_request(format!(
            "request rank {} does not match variable rank {}",
            ranges.len(),
            rank
        )));
    }

    let mut idx = 0;
    let mut take = |axis_len: Option<usize>, name: &str| -> Result<Range> {
        match axis_len {
            Some(len) => {
                let range = ranges[idx];
                idx += 1;
                ensure_fits(&range, len, name)?;
                Ok(range)
            }
            None => Ok(Range::single(0)),
        }
    };

    let time = take(lens.time, "time")?;
    let ens = take(lens.ens, "ensemble")?;
    let vert = take(lens.vert, "vertical")?;
    let y = take(Some(lens.ny), "y")?;
    let x = take(Some(lens.nx), "x")?;

    Ok(ReadRequest { time, ens, vert, y, x })
}

fn ensure_fits(range: &Range, axis_len: usize, name: &str) -> Result<()> {
    if !range.fits(axis_len) {
        return Err(CollectionError::invalid_request(format!(
            "{} range {}..={} exceeds axis length {}",
            name,
            range.first(),
            range.last(),
            axis_len
        )));
    }
    Ok(())
}
