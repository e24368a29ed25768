//! Contract with the external GRIB1 message codec.
//!
//! The collection read path never parses raw GRIB1 bytes itself; it
//! hands an open stream and a byte offset to a [`Grib1Codec`]
//! implementation and receives a decoded 2-D grid.

use std::io::{Read, Seek};

use chrono::{DateTime, Utc};

use crate::error::Result;

/// A seekable byte stream over one physical data or index file.
pub trait RandomAccess: Read + Seek + Send {}

impl<T: Read + Seek + Send + ?Sized> RandomAccess for T {}

/// Metadata of one GRIB1 message, used by the diagnostic trace path.
#[derive(Debug, Clone, PartialEq)]
pub struct Grib1RecordHeader {
    pub center: i32,
    pub subcenter: i32,
    pub table_version: i32,
    pub parameter: i32,
    pub reference_time: DateTime<Utc>,
    /// Forecast offset from the reference time, in the message's units.
    pub forecast_time: i32,
    /// Statistical interval bounds, when the product is interval-based.
    pub interval: Option<(i32, i32)>,
}

/// Decoder for raw GRIB1 messages.
pub trait Grib1Codec: Send + Sync {
    /// Whether the stream holds raw GRIB1 messages (as opposed to a
    /// collection index).
    fn is_grib1(&self, stream: &mut dyn RandomAccess) -> std::io::Result<bool>;

    /// Decode the data grid of the message starting at `pos`.
    ///
    /// `grid` has room for the full `nx * ny` points of the message's
    /// horizontal grid; values are written row-major after scan-mode
    /// normalization.
    fn decode(
        &self,
        stream: &mut dyn RandomAccess,
        pos: u64,
        grid: &mut [f32],
        scan_mode: i32,
        nx: usize,
    ) -> Result<()>;

    /// Read the header of the message starting at `pos`. Not on the hot
    /// path; used for trace-level diagnostics only.
    fn read_header(&self, stream: &mut dyn RandomAccess, pos: u64) -> Result<Grib1RecordHeader>;
}
