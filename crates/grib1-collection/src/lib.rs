//! Read path for GRIB1 collection indexes.
//!
//! A collection presents many GRIB1 messages, possibly spanning many
//! physical files and partitioned by forecast time, as one logical
//! multidimensional dataset: named variables, coordinate axes and
//! random-access slicing over the canonical layout
//! `(time, ensemble, vertical, y, x)`.
//!
//! # Architecture
//!
//! ```text
//! Reader::read(variable, ranges)
//!      │
//!      ├─► validate ranges against the variable's axes
//!      │
//!      ├─► slice planner: one DataRecord per (t, e, v) cell
//!      │         │
//!      │         └─► partitioned: time index -> (partition, local index)
//!      │
//!      ├─► sort by (partition, fileno, pos)
//!      │
//!      └─► executor: one file sweep, decode via external codec,
//!          place sub-rectangles, NaN for missing cells
//! ```
//!
//! Message parsing, index building and parameter tables are external
//! collaborators behind the [`codec::Grib1Codec`],
//! [`index::RecordLoader`] / [`index::partition::PartitionLoader`] and
//! [`tables::Grib1ParamTables`] traits.

pub mod array;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod naming;
pub mod range;
pub mod reader;
pub mod schema;
pub mod tables;

// Re-export commonly used types at crate root
pub use array::FloatArray;
pub use codec::{Grib1Codec, Grib1RecordHeader, RandomAccess};
pub use config::{OpenOption, OpenOptions};
pub use error::{CollectionError, Result};
pub use index::partition::{
    NoPartitionSource, Partition, PartitionLoader, PartitionTimeIndex, PartitionedGroup,
    TimeCoordUnion, TimePartition, VariableIndexPartitioned,
};
pub use index::{
    sniff_index_kind, Collection, DiskFiles, EnsCoord, FileProvider, Group, HorizCoordSys,
    IndexKind, Level, NoRecordSource, Projection, ProjParam, Record, RecordLoader, TimeCoord,
    TimeInterval, TimeValues, VarRef, VariableIndex, VariableMeta, VertCoord, MAGIC_START,
    MAGIC_START_PARTITION, MISSING_RECORD,
};
pub use range::Range;
pub use reader::{CancelToken, Grib1CollectionReader, Grib1Index};
pub use schema::{
    project_collection, project_partition, AttrValue, Attribute, CoordValues, Dimension, Schema,
    SchemaGroup, SchemaVariable, VariableKind, MISSING_VALUE,
};
pub use tables::{
    default_stat_type, Grib1ParamTables, ParameterDescriptor, StatType, TablesFactory, VertUnit,
};
