//! In-memory model of an opened GRIB1 collection index.
//!
//! A collection groups physically distinct GRIB1 records into logical
//! variables keyed by horizontal grid, parameter, level type, time
//! statistic and ensemble. The model is immutable after load; the only
//! mutation is late record hydration, which is one-shot and serialized
//! per variable.
//!
//! Records live in a dense array ordered by
//! `calc_index(t, e, v) = (t * nens + e) * nverts + v`; a `pos` equal to
//! [`MISSING_RECORD`] marks a coordinate cell with no message behind it.

pub mod partition;

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::codec::RandomAccess;
use crate::error::{CollectionError, Result};

/// Sentinel byte offset for "no message at this coordinate cell".
pub const MISSING_RECORD: i64 = -1;

/// Magic prefix of a flat collection index stream.
pub const MAGIC_START: &str = "Grib1CollectionIndex";

/// Magic prefix of a time-partitioned index stream.
pub const MAGIC_START_PARTITION: &str = "Grib1PartitionIndex";

/// Kind of index stream, distinguished by magic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Collection,
    TimePartition,
}

/// Identify an index stream by its magic prefix.
///
/// The decoder for the rest of the stream belongs to the external
/// indexer; only the tag is recognized here.
pub fn sniff_index_kind(stream: &mut dyn RandomAccess) -> Result<IndexKind> {
    let mut buf = [0u8; MAGIC_START.len()];
    stream.seek(SeekFrom::Start(0))?;
    stream.read_exact(&mut buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            CollectionError::index_corrupt("truncated index: magic prefix incomplete")
        } else {
            CollectionError::Io(err)
        }
    })?;

    if buf.starts_with(MAGIC_START_PARTITION.as_bytes()) {
        Ok(IndexKind::TimePartition)
    } else if buf.as_slice() == MAGIC_START.as_bytes() {
        Ok(IndexKind::Collection)
    } else {
        Err(CollectionError::index_corrupt(
            "unrecognized index magic prefix",
        ))
    }
}

/// Pointer to one GRIB1 message: file number within the collection and
/// byte offset of the message start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub fileno: u32,
    pub pos: i64,
}

impl Record {
    /// The missing-cell sentinel record.
    pub fn missing() -> Self {
        Self { fileno: 0, pos: MISSING_RECORD }
    }

    pub fn is_missing(&self) -> bool {
        self.pos == MISSING_RECORD
    }
}

/// Location of a variable within a collection: group position and
/// variable position within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub group: usize,
    pub var: usize,
}

/// Flat position of `(t, e, v)` in a dense record table.
pub fn calc_index(t: usize, e: usize, v: usize, nens: usize, nverts: usize) -> usize {
    (t * nens + e) * nverts + v
}

// ============================================================================
// Coordinate axes
// ============================================================================

/// Horizontal coordinate system shared by all variables of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizCoordSys {
    /// Grid name, also the stem of the grid-mapping variable.
    pub name: String,
    pub nx: usize,
    pub ny: usize,
    pub startx: f64,
    pub starty: f64,
    pub dx: f64,
    pub dy: f64,
    /// GRIB1 scan mode flags, forwarded to the codec.
    pub scan_mode: i32,
    /// Gaussian latitudes, when the grid is gaussian.
    pub gauss_lats: Option<Vec<f32>>,
    /// Projection for non-lat/lon grids; `None` means lat/lon.
    pub projection: Option<Projection>,
}

impl HorizCoordSys {
    pub fn is_latlon(&self) -> bool {
        self.projection.is_none()
    }

    /// Points per decoded grid.
    pub fn npoints(&self) -> usize {
        self.nx * self.ny
    }
}

/// Projection parameters of a non-lat/lon grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub name: String,
    pub parameters: Vec<ProjParam>,
}

/// One named projection parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjParam {
    pub name: String,
    pub value: f64,
}

/// A time axis: forecast offsets, or intervals with bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoord {
    pub name: String,
    /// Udunits-style time units, e.g. "hours since 2012-01-01T00:00Z".
    pub units: String,
    pub values: TimeValues,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeValues {
    Offsets(Vec<i32>),
    Intervals(Vec<TimeInterval>),
}

/// Bounds of one statistical-processing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub bounds1: i32,
    pub bounds2: i32,
}

impl TimeCoord {
    pub fn len(&self) -> usize {
        match &self.values {
            TimeValues::Offsets(v) => v.len(),
            TimeValues::Intervals(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_interval(&self) -> bool {
        matches!(self.values, TimeValues::Intervals(_))
    }
}

/// A vertical axis (GRIB1 code table 3 level type).
#[derive(Debug, Clone, PartialEq)]
pub struct VertCoord {
    pub name: String,
    pub units: String,
    pub level_code: i32,
    /// Bounded layer levels vs single-value levels.
    pub is_layer: bool,
    pub positive_up: bool,
    pub datum: Option<String>,
    pub levels: Vec<Level>,
}

/// One level value; `value2` is meaningful only for layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub value1: f64,
    pub value2: f64,
}

impl VertCoord {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// An ensemble axis: member ids in axis order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsCoord {
    pub members: Vec<i32>,
}

impl EnsCoord {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ============================================================================
// Variables
// ============================================================================

/// GRIB identity fields of a logical variable, shared by flat and
/// partitioned variables.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMeta {
    pub table_version: i32,
    pub parameter: i32,
    /// Level type code; negative when undefined (e.g. satellite data).
    pub level_type: i32,
    pub is_layer: bool,
    /// Statistical-processing code; negative when absent.
    pub intv_type: i32,
    /// Ensemble derived-product code; negative when absent.
    pub ens_derived_type: i32,
    /// Probability product name; `None` for ordinary products.
    pub probability_name: Option<String>,
}

impl VariableMeta {
    pub fn is_probability(&self) -> bool {
        self.probability_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// A logical variable of a flat collection: axis bindings plus the dense
/// record table.
#[derive(Debug)]
pub struct VariableIndex {
    pub meta: VariableMeta,
    /// Owning group, by position in the collection. The group owns the
    /// variable; this back-reference is an index, not a pointer.
    pub group: usize,
    /// Index into the group's time coords; negative when the axis is
    /// absent.
    pub time_idx: i32,
    /// Index into the group's vert coords; negative when absent.
    pub vert_idx: i32,
    /// Index into the group's ens coords; negative when absent.
    pub ens_idx: i32,
    pub nens: usize,
    pub nverts: usize,
    records: OnceCell<Vec<Record>>,
    hydrate: Mutex<()>,
}

impl VariableIndex {
    /// A variable whose records are hydrated later from the auxiliary
    /// record stream.
    pub fn new(
        meta: VariableMeta,
        group: usize,
        time_idx: i32,
        vert_idx: i32,
        ens_idx: i32,
        nens: usize,
        nverts: usize,
    ) -> Self {
        Self {
            meta,
            group,
            time_idx,
            vert_idx,
            ens_idx,
            nens,
            nverts,
            records: OnceCell::new(),
            hydrate: Mutex::new(()),
        }
    }

    /// A variable with its record table already materialized.
    #[allow(clippy::too_many_arguments)]
    pub fn with_records(
        meta: VariableMeta,
        group: usize,
        time_idx: i32,
        vert_idx: i32,
        ens_idx: i32,
        nens: usize,
        nverts: usize,
        records: Vec<Record>,
    ) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(records);
        Self {
            meta,
            group,
            time_idx,
            vert_idx,
            ens_idx,
            nens,
            nverts,
            records: cell,
            hydrate: Mutex::new(()),
        }
    }

    /// Time axis length, or 1 when the axis is absent.
    pub fn nt(&self, group: &Group) -> usize {
        if self.time_idx >= 0 {
            group.time_coords[self.time_idx as usize].len()
        } else {
            1
        }
    }

    /// Expected record table size: `nt * nens * nverts`.
    pub fn record_count(&self, group: &Group) -> usize {
        self.nt(group) * self.nens * self.nverts
    }

    /// Rank of the projected data variable: present axes plus y and x.
    pub fn rank(&self) -> usize {
        let mut rank = 2;
        if self.time_idx >= 0 {
            rank += 1;
        }
        if self.ens_idx >= 0 {
            rank += 1;
        }
        if self.vert_idx >= 0 {
            rank += 1;
        }
        rank
    }

    /// Flat record-table position of `(t, e, v)`.
    pub fn calc_index(&self, t: usize, e: usize, v: usize) -> usize {
        calc_index(t, e, v, self.nens, self.nverts)
    }

    /// The record table, if already hydrated.
    pub fn records(&self) -> Option<&[Record]> {
        self.records.get().map(Vec::as_slice)
    }

    /// One-shot hydration: at most one caller runs `load`; concurrent
    /// callers block on the guard and then observe the populated table.
    pub(crate) fn records_or_hydrate(
        &self,
        expected: usize,
        load: impl FnOnce() -> Result<Vec<Record>>,
    ) -> Result<&[Record]> {
        if let Some(records) = self.records.get() {
            return Ok(records);
        }

        let _guard = self
            .hydrate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(records) = self.records.get() {
            return Ok(records);
        }

        let records = load()?;
        if records.len() != expected {
            return Err(CollectionError::index_corrupt(format!(
                "record table holds {} entries, axes require {}",
                records.len(),
                expected
            )));
        }
        Ok(self.records.get_or_init(|| records).as_slice())
    }
}

// ============================================================================
// Groups and collections
// ============================================================================

/// All variables sharing one horizontal grid, with the coordinate axes
/// they index into.
#[derive(Debug)]
pub struct Group {
    pub name: String,
    pub hcs: HorizCoordSys,
    pub time_coords: Vec<TimeCoord>,
    pub vert_coords: Vec<VertCoord>,
    pub ens_coords: Vec<EnsCoord>,
    pub variables: Vec<VariableIndex>,
}

/// Opens physical data files of a collection by dense file number.
///
/// Implementations must be safe under concurrent calls; each read call
/// holds at most one handle at a time, but parallel reads may each hold
/// their own.
pub trait FileProvider: Send + Sync {
    fn open_file(&self, fileno: u32) -> std::io::Result<Box<dyn RandomAccess>>;

    /// Human-readable location of a file, for log messages.
    fn location(&self, fileno: u32) -> String;
}

/// Loads a variable's record table from the auxiliary index stream.
pub trait RecordLoader: Send + Sync {
    fn load_records(&self, group: usize, var: usize) -> Result<Vec<Record>>;
}

/// File provider over a fixed list of on-disk paths.
pub struct DiskFiles {
    paths: Vec<PathBuf>,
}

impl DiskFiles {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl FileProvider for DiskFiles {
    fn open_file(&self, fileno: u32) -> std::io::Result<Box<dyn RandomAccess>> {
        let path = self.paths.get(fileno as usize).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("collection has no file number {}", fileno),
            )
        })?;
        let file = std::fs::File::open(path)?;
        Ok(Box::new(file))
    }

    fn location(&self, fileno: u32) -> String {
        match self.paths.get(fileno as usize) {
            Some(path) => path.display().to_string(),
            None => format!("fileno {}", fileno),
        }
    }
}

/// Record loader for collections whose tables are fully materialized at
/// decode time; hydration requests mean the index was inconsistent.
pub struct NoRecordSource;

impl RecordLoader for NoRecordSource {
    fn load_records(&self, group: usize, var: usize) -> Result<Vec<Record>> {
        Err(CollectionError::index_corrupt(format!(
            "no auxiliary record stream for group {} variable {}",
            group, var
        )))
    }
}

/// Root of an opened flat collection index.
pub struct Collection {
    pub name: String,
    pub center: i32,
    pub subcenter: i32,
    pub local_table_version: i32,
    pub gen_process_id: i32,
    pub groups: Vec<Group>,
    files: Arc<dyn FileProvider>,
    record_source: Arc<dyn RecordLoader>,
}

impl Collection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        center: i32,
        subcenter: i32,
        local_table_version: i32,
        gen_process_id: i32,
        groups: Vec<Group>,
        files: Arc<dyn FileProvider>,
        record_source: Arc<dyn RecordLoader>,
    ) -> Self {
        Self {
            name: name.into(),
            center,
            subcenter,
            local_table_version,
            gen_process_id,
            groups,
            files,
            record_source,
        }
    }

    /// Open one physical data file of the collection.
    pub fn open_file(&self, fileno: u32) -> std::io::Result<Box<dyn RandomAccess>> {
        self.files.open_file(fileno)
    }

    /// Location string of one physical data file.
    pub fn file_location(&self, fileno: u32) -> String {
        self.files.location(fileno)
    }

    pub fn variable(&self, vref: VarRef) -> Option<&VariableIndex> {
        self.groups.get(vref.group)?.variables.get(vref.var)
    }

    /// The record table of a variable, hydrating it on first access.
    ///
    /// Hydration is at-most-once per variable and validates the table
    /// size against `nt * nens * nverts`.
    pub fn records(&self, vref: VarRef) -> Result<&[Record]> {
        let group = self.groups.get(vref.group).ok_or_else(|| {
            CollectionError::index_corrupt(format!("group {} out of range", vref.group))
        })?;
        let vi = group.variables.get(vref.var).ok_or_else(|| {
            CollectionError::index_corrupt(format!(
                "variable {} out of range in group {}",
                vref.var, vref.group
            ))
        })?;
        let expected = vi.record_count(group);
        vi.records_or_hydrate(expected, || {
            self.record_source.load_records(vref.group, vref.var)
        })
    }

    /// Structural validation of coordinate references and pre-hydrated
    /// record tables. Run once at open.
    pub fn validate(&self) -> Result<()> {
        for (gidx, group) in self.groups.iter().enumerate() {
            if group.hcs.nx == 0 || group.hcs.ny == 0 {
                return Err(CollectionError::index_corrupt(format!(
                    "group {} has a degenerate {}x{} grid",
                    gidx, group.hcs.nx, group.hcs.ny
                )));
            }
            for (cidx, tc) in group.time_coords.iter().enumerate() {
                if tc.is_empty() {
                    return Err(CollectionError::index_corrupt(format!(
                        "group {} time coord {} is empty",
                        gidx, cidx
                    )));
                }
            }
            for (vidx, vi) in group.variables.iter().enumerate() {
                if vi.group != gidx {
                    return Err(CollectionError::index_corrupt(format!(
                        "variable {} of group {} back-references group {}",
                        vidx, gidx, vi.group
                    )));
                }
                validate_axis_binding(gidx, vidx, vi, group)?;
                if let Some(records) = vi.records() {
                    let expected = vi.record_count(group);
                    if records.len() != expected {
                        return Err(CollectionError::index_corrupt(format!(
                            "variable {} of group {} holds {} records, axes require {}",
                            vidx,
                            gidx,
                            records.len(),
                            expected
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Check one variable's coordinate indices and axis sizes against its
/// group. Shared with the partitioned model.
pub(crate) fn validate_axis_binding(
    gidx: usize,
    vidx: usize,
    vi: &dyn AxisBinding,
    group_axes: &dyn GroupAxes,
) -> Result<()> {
    let (time_idx, vert_idx, ens_idx, nens, nverts) = vi.binding();

    if time_idx >= 0 && group_axes.time_len(time_idx as usize).is_none() {
        return Err(CollectionError::index_corrupt(format!(
            "variable {} of group {} references missing time coord {}",
            vidx, gidx, time_idx
        )));
    }

    match vert_idx {
        idx if idx >= 0 => match group_axes.vert_len(idx as usize) {
            Some(len) if len == nverts => {}
            Some(len) => {
                return Err(CollectionError::index_corrupt(format!(
                    "variable {} of group {}: nverts {} disagrees with vert coord size {}",
                    vidx, gidx, nverts, len
                )))
            }
            None => {
                return Err(CollectionError::index_corrupt(format!(
                    "variable {} of group {} references missing vert coord {}",
                    vidx, gidx, idx
                )))
            }
        },
        _ if nverts != 1 => {
            return Err(CollectionError::index_corrupt(format!(
                "variable {} of group {}: nverts {} without a vertical axis",
                vidx, gidx, nverts
            )))
        }
        _ => {}
    }

    match ens_idx {
        idx if idx >= 0 => match group_axes.ens_len(idx as usize) {
            Some(len) if len == nens => {}
            Some(len) => {
                return Err(CollectionError::index_corrupt(format!(
                    "variable {} of group {}: nens {} disagrees with ens coord size {}",
                    vidx, gidx, nens, len
                )))
            }
            None => {
                return Err(CollectionError::index_corrupt(format!(
                    "variable {} of group {} references missing ens coord {}",
                    vidx, gidx, idx
                )))
            }
        },
        _ if nens != 1 => {
            return Err(CollectionError::index_corrupt(format!(
                "variable {} of group {}: nens {} without an ensemble axis",
                vidx, gidx, nens
            )))
        }
        _ => {}
    }

    Ok(())
}

/// Axis bindings of a variable, for validation shared across the flat
/// and partitioned models.
pub(crate) trait AxisBinding {
    /// `(time_idx, vert_idx, ens_idx, nens, nverts)`.
    fn binding(&self) -> (i32, i32, i32, usize, usize);
}

impl AxisBinding for VariableIndex {
    fn binding(&self) -> (i32, i32, i32, usize, usize) {
        (self.time_idx, self.vert_idx, self.ens_idx, self.nens, self.nverts)
    }
}

/// Axis sizes of a group, for validation shared across models.
pub(crate) trait GroupAxes {
    fn time_len(&self, idx: usize) -> Option<usize>;
    fn vert_len(&self, idx: usize) -> Option<usize>;
    fn ens_len(&self, idx: usize) -> Option<usize>;
}

impl GroupAxes for Group {
    fn time_len(&self, idx: usize) -> Option<usize> {
        self.time_coords.get(idx).map(TimeCoord::len)
    }

    fn vert_len(&self, idx: usize) -> Option<usize> {
        self.vert_coords.get(idx).map(VertCoord::len)
    }

    fn ens_len(&self, idx: usize) -> Option<usize> {
        self.ens_coords.get(idx).map(EnsCoord::len)
    }
}
