//! GRIB1 parameter and level lookup contracts.
//!
//! Parameter tables are an external service: the collection read path
//! only consumes lookups through the [`Grib1ParamTables`] trait. A
//! [`TablesFactory`] builds the service from the typed open options
//! (user-supplied table and lookup files).

use std::fmt;
use std::sync::Arc;

use crate::config::OpenOptions;
use crate::error::Result;

/// One entry of a GRIB1 parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub discipline: i32,
    pub category: i32,
    pub number: i32,
    /// Short parameter name (e.g. "TMP").
    pub name: String,
    /// Physical unit (e.g. "K"); empty when the table omits it.
    pub unit: String,
    /// Optional abbreviation distinct from the name.
    pub abbrev: Option<String>,
    /// Human-readable description (e.g. "Temperature").
    pub description: String,
    /// Stable identifier of the table entry.
    pub id: String,
}

/// Statistical processing applied over a time interval (GRIB1 code
/// table 5 time range indicators).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatType {
    Average,
    Accumulation,
    Difference,
    Covariance,
    StdDev,
}

impl StatType {
    /// Abbreviation used as a variable-name suffix.
    pub fn abbrev(&self) -> &'static str {
        match self {
            Self::Average => "ave",
            Self::Accumulation => "acc",
            Self::Difference => "dif",
            Self::Covariance => "cov",
            Self::StdDev => "std",
        }
    }

    /// CF cell_methods rendering, when one exists.
    pub fn cell_method(&self) -> Option<&'static str> {
        match self {
            Self::Average => Some("mean"),
            Self::Accumulation => Some("sum"),
            Self::StdDev => Some("standard_deviation"),
            Self::Difference | Self::Covariance => None,
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Average => "Average",
            Self::Accumulation => "Accumulation",
            Self::Difference => "Difference",
            Self::Covariance => "Covariance",
            Self::StdDev => "StandardDeviation",
        };
        write!(f, "{}", word)
    }
}

/// Canonical mapping of GRIB1 time range indicators to statistics.
///
/// Table implementations are free to override this, but most delegate.
pub fn default_stat_type(intv_type: i32) -> Option<StatType> {
    match intv_type {
        3 | 6 | 7 | 113 | 115 | 117 | 123 => Some(StatType::Average),
        4 | 114 | 116 | 124 => Some(StatType::Accumulation),
        5 => Some(StatType::Difference),
        118 => Some(StatType::Covariance),
        119 | 125 => Some(StatType::StdDev),
        _ => None,
    }
}

/// Unit metadata for a vertical level type.
#[derive(Debug, Clone, PartialEq)]
pub struct VertUnit {
    pub units: String,
    pub datum: Option<String>,
    pub positive_up: bool,
}

/// Parameter-table lookups consumed by naming and schema projection.
pub trait Grib1ParamTables: Send + Sync {
    /// Look up a parameter table entry; `None` when the parameter is
    /// unknown to every applicable table.
    fn parameter(
        &self,
        center: i32,
        subcenter: i32,
        table_version: i32,
        param_number: i32,
    ) -> Option<ParameterDescriptor>;

    /// Short name of a level type (GRIB1 code table 3), e.g. "isobaric".
    fn level_short_name(&self, code: i32) -> String;

    /// Human-readable description of a level type.
    fn level_description(&self, code: i32) -> String;

    /// Unit metadata for a level type, when known.
    fn level_unit(&self, code: i32) -> Option<VertUnit>;

    /// Statistical type for a time range indicator, when known.
    fn stat_type(&self, intv_type: i32) -> Option<StatType>;
}

/// Builds the parameter-table service for an open call.
///
/// The open options carry the user-selected table and lookup paths; the
/// factory resolves them against whatever table sources it manages.
pub trait TablesFactory: Send + Sync {
    fn create(&self, options: &OpenOptions) -> Result<Arc<dyn Grib1ParamTables>>;
}
