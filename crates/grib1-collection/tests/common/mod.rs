//! Shared fixtures for collection read tests.
//!
//! Provides a stub codec whose grids encode their record identity, a
//! file provider that records every open, a counting record loader for
//! hydration tests, and small index builders.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::TimeZone;

use grib1_collection::{
    default_stat_type, CollectionError, Collection, EnsCoord, FileProvider, Grib1Codec,
    Grib1ParamTables, Grib1RecordHeader, Group, HorizCoordSys, Level, NoRecordSource,
    ParameterDescriptor, RandomAccess, Record, RecordLoader, Result, StatType, TablesFactory,
    TimeCoord, TimeValues, VariableIndex, VariableMeta, VertCoord, VertUnit,
};

/// Install the test log subscriber; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Parameter tables
// ============================================================================

/// Fixed parameter tables: parameter 11 = Temperature (K), parameter
/// 61 = Total precipitation; everything else unknown.
pub struct TestTables;

impl Grib1ParamTables for TestTables {
    fn parameter(
        &self,
        _center: i32,
        _subcenter: i32,
        _table_version: i32,
        param_number: i32,
    ) -> Option<ParameterDescriptor> {
        match param_number {
            11 => Some(ParameterDescriptor {
                discipline: 0,
                category: 0,
                number: 11,
                name: "TMP".to_string(),
                unit: "K".to_string(),
                abbrev: None,
                description: "Temperature".to_string(),
                id: "7-0-2-11".to_string(),
            }),
            61 => Some(ParameterDescriptor {
                discipline: 0,
                category: 1,
                number: 61,
                name: "A_PCP".to_string(),
                unit: "kg/m^2".to_string(),
                abbrev: None,
                description: "Total precipitation".to_string(),
                id: "7-0-2-61".to_string(),
            }),
            _ => None,
        }
    }

    fn level_short_name(&self, code: i32) -> String {
        match code {
            1 => "surface".to_string(),
            100 => "isobaric".to_string(),
            110 => "layer_between_two_isobaric".to_string(),
            _ => format!("level{}", code),
        }
    }

    fn level_description(&self, code: i32) -> String {
        match code {
            1 => "Ground or water surface".to_string(),
            100 => "Isobaric surface".to_string(),
            _ => format!("Level type {}", code),
        }
    }

    fn level_unit(&self, code: i32) -> Option<VertUnit> {
        match code {
            100 => Some(VertUnit {
                units: "hPa".to_string(),
                datum: None,
                positive_up: false,
            }),
            _ => None,
        }
    }

    fn stat_type(&self, intv_type: i32) -> Option<StatType> {
        default_stat_type(intv_type)
    }
}

pub struct TestTablesFactory;

impl TablesFactory for TestTablesFactory {
    fn create(
        &self,
        _options: &grib1_collection::OpenOptions,
    ) -> Result<Arc<dyn Grib1ParamTables>> {
        Ok(Arc::new(TestTables))
    }
}

// ============================================================================
// Codec stubs
// ============================================================================

/// Shared log of decoded byte offsets, in decode order.
pub type DecodeLog = Arc<Mutex<Vec<i64>>>;

/// Codec stub: each decoded grid is a pure function of `(pos, y, x)`,
/// so output values identify the record they came from.
pub struct StubCodec {
    cell: Box<dyn Fn(i64, usize, usize) -> f32 + Send + Sync>,
    pub decode_log: DecodeLog,
    fail_at: Vec<i64>,
}

impl StubCodec {
    pub fn new(cell: impl Fn(i64, usize, usize) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            cell: Box::new(cell),
            decode_log: Arc::new(Mutex::new(Vec::new())),
            fail_at: Vec::new(),
        }
    }

    /// A stub that fails to decode the messages at the given offsets.
    pub fn failing_at(
        cell: impl Fn(i64, usize, usize) -> f32 + Send + Sync + 'static,
        fail_at: Vec<i64>,
    ) -> Self {
        Self {
            cell: Box::new(cell),
            decode_log: Arc::new(Mutex::new(Vec::new())),
            fail_at,
        }
    }
}

impl Grib1Codec for StubCodec {
    fn is_grib1(&self, _stream: &mut dyn RandomAccess) -> std::io::Result<bool> {
        Ok(false)
    }

    fn decode(
        &self,
        _stream: &mut dyn RandomAccess,
        pos: u64,
        grid: &mut [f32],
        _scan_mode: i32,
        nx: usize,
    ) -> Result<()> {
        self.decode_log.lock().unwrap().push(pos as i64);
        if self.fail_at.contains(&(pos as i64)) {
            return Err(CollectionError::decode(format!("stub failure at {}", pos)));
        }
        for (i, cell) in grid.iter_mut().enumerate() {
            *cell = (self.cell)(pos as i64, i / nx, i % nx);
        }
        Ok(())
    }

    fn read_header(
        &self,
        _stream: &mut dyn RandomAccess,
        _pos: u64,
    ) -> Result<Grib1RecordHeader> {
        Ok(Grib1RecordHeader {
            center: 7,
            subcenter: 0,
            table_version: 2,
            parameter: 11,
            reference_time: chrono::Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
            forecast_time: 0,
            interval: None,
        })
    }
}

/// The identity encoding used by placement tests: a decoded cell is
/// `pos * 10000 + y * 100 + x`, exact in f32 for the sizes used here.
pub fn encode_cell(pos: i64, y: usize, x: usize) -> f32 {
    (pos as f32) * 10000.0 + (y * 100 + x) as f32
}

// ============================================================================
// File providers
// ============================================================================

/// Shared log of `(provider label, fileno)` opens, in open order.
pub type OpenLog = Arc<Mutex<Vec<(String, u32)>>>;

pub fn open_log() -> OpenLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// File provider over empty in-memory streams, recording every open.
pub struct TracingFiles {
    label: String,
    nfiles: u32,
    log: OpenLog,
    fail: Vec<u32>,
}

impl TracingFiles {
    pub fn new(label: &str, nfiles: u32, log: OpenLog) -> Self {
        Self { label: label.to_string(), nfiles, log, fail: Vec::new() }
    }

    /// A provider where opening the given file numbers fails.
    pub fn failing(label: &str, nfiles: u32, log: OpenLog, fail: Vec<u32>) -> Self {
        Self { label: label.to_string(), nfiles, log, fail }
    }
}

impl FileProvider for TracingFiles {
    fn open_file(&self, fileno: u32) -> std::io::Result<Box<dyn RandomAccess>> {
        if self.fail.contains(&fileno) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{}: file {} unavailable", self.label, fileno),
            ));
        }
        if fileno >= self.nfiles {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: no file {}", self.label, fileno),
            ));
        }
        self.log.lock().unwrap().push((self.label.clone(), fileno));
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    fn location(&self, fileno: u32) -> String {
        format!("{}:{}", self.label, fileno)
    }
}

// ============================================================================
// Record loaders
// ============================================================================

/// Record loader handing out a fixed table, counting hydration calls.
pub struct CountingLoader {
    records: Vec<Record>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records, calls: Arc::new(AtomicUsize::new(0)) }
    }
}

impl RecordLoader for CountingLoader {
    fn load_records(&self, _group: usize, _var: usize) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

// ============================================================================
// Index builders
// ============================================================================

pub fn latlon_hcs(nx: usize, ny: usize) -> HorizCoordSys {
    HorizCoordSys {
        name: "latlon0".to_string(),
        nx,
        ny,
        startx: 0.0,
        starty: 90.0,
        dx: 1.0,
        dy: -1.0,
        scan_mode: 0,
        gauss_lats: None,
        projection: None,
    }
}

pub fn time_coord(nt: usize) -> TimeCoord {
    TimeCoord {
        name: "time".to_string(),
        units: "hours since 2012-01-01T00:00Z".to_string(),
        values: TimeValues::Offsets((0..nt as i32).map(|i| i * 6).collect()),
    }
}

pub fn vert_coord(nverts: usize) -> VertCoord {
    VertCoord {
        name: "isobaric".to_string(),
        units: "hPa".to_string(),
        level_code: 100,
        is_layer: false,
        positive_up: false,
        datum: None,
        levels: (0..nverts)
            .map(|i| Level { value1: 1000.0 - 100.0 * i as f64, value2: 0.0 })
            .collect(),
    }
}

pub fn ens_coord(nens: usize) -> EnsCoord {
    EnsCoord { members: (0..nens as i32).collect() }
}

/// Temperature at isobaric level(s), no statistic.
pub fn temperature_meta() -> VariableMeta {
    VariableMeta {
        table_version: 2,
        parameter: 11,
        level_type: 100,
        is_layer: false,
        intv_type: -1,
        ens_derived_type: -1,
        probability_name: None,
    }
}

/// One-group flat collection. The time axis is always present with
/// `nt` steps; ensemble and vertical axes only when `Some`.
pub fn flat_collection(
    nx: usize,
    ny: usize,
    nt: usize,
    nens: Option<usize>,
    nverts: Option<usize>,
    records: Vec<Record>,
    provider: Arc<dyn FileProvider>,
) -> Collection {
    let variable = VariableIndex::with_records(
        temperature_meta(),
        0,
        0,
        nverts.map_or(-1, |_| 0),
        nens.map_or(-1, |_| 0),
        nens.unwrap_or(1),
        nverts.unwrap_or(1),
        records,
    );
    flat_collection_with(nx, ny, nt, nens, nverts, variable, provider, Arc::new(NoRecordSource))
}

/// One-group flat collection whose single variable hydrates through
/// the given loader on first read.
pub fn flat_collection_unhydrated(
    nx: usize,
    ny: usize,
    nt: usize,
    nens: Option<usize>,
    nverts: Option<usize>,
    loader: Arc<dyn RecordLoader>,
    provider: Arc<dyn FileProvider>,
) -> Collection {
    let variable = VariableIndex::new(
        temperature_meta(),
        0,
        0,
        nverts.map_or(-1, |_| 0),
        nens.map_or(-1, |_| 0),
        nens.unwrap_or(1),
        nverts.unwrap_or(1),
    );
    flat_collection_with(nx, ny, nt, nens, nverts, variable, provider, loader)
}

fn flat_collection_with(
    nx: usize,
    ny: usize,
    nt: usize,
    nens: Option<usize>,
    nverts: Option<usize>,
    variable: VariableIndex,
    provider: Arc<dyn FileProvider>,
    loader: Arc<dyn RecordLoader>,
) -> Collection {
    let group = Group {
        name: "grid0".to_string(),
        hcs: latlon_hcs(nx, ny),
        time_coords: vec![time_coord(nt)],
        vert_coords: nverts.map(vert_coord).into_iter().collect(),
        ens_coords: nens.map(ens_coord).into_iter().collect(),
        variables: vec![variable],
    };
    Collection::new("test-collection", 7, 0, 2, 81, vec![group], provider, loader)
}
