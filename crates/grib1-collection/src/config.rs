//! Open-time options for GRIB1 collections.
//!
//! The original service-provider interface accepted free-form string
//! messages to select parameter tables. Here the recognized keys form a
//! closed set with typed payloads, applied before `open`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options applied when opening a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Path to a user-supplied GRIB1 parameter table.
    pub parameter_table: Option<PathBuf>,

    /// Path to a lookup file mapping (center, subcenter, version) to
    /// parameter tables.
    pub parameter_table_lookup: Option<PathBuf>,
}

/// The closed set of recognized option keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOption {
    /// `GribParameterTable`: a single parameter table file.
    ParameterTable(PathBuf),
    /// `GribParameterTableLookup`: a table lookup file.
    ParameterTableLookup(PathBuf),
}

impl OpenOptions {
    /// Apply one option, overwriting any previous value for its key.
    pub fn apply(&mut self, option: OpenOption) {
        match option {
            OpenOption::ParameterTable(path) => self.parameter_table = Some(path),
            OpenOption::ParameterTableLookup(path) => self.parameter_table_lookup = Some(path),
        }
    }

    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(val) = std::env::var("GRIB_PARAMETER_TABLE") {
            if !val.is_empty() {
                options.parameter_table = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GRIB_PARAMETER_TABLE_LOOKUP") {
            if !val.is_empty() {
                options.parameter_table_lookup = Some(PathBuf::from(val));
            }
        }

        options
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.parameter_table {
            if path.as_os_str().is_empty() {
                return Err("parameter_table path must not be empty".to_string());
            }
        }

        if let Some(path) = &self.parameter_table_lookup {
            if path.as_os_str().is_empty() {
                return Err("parameter_table_lookup path must not be empty".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overwrites() {
        let mut options = OpenOptions::default();
        options.apply(OpenOption::ParameterTable(PathBuf::from("a.tab")));
        options.apply(OpenOption::ParameterTable(PathBuf::from("b.tab")));
        assert_eq!(options.parameter_table, Some(PathBuf::from("b.tab")));
        assert_eq!(options.parameter_table_lookup, None);
    }

    #[test]
    fn test_validate_empty_path() {
        let mut options = OpenOptions::default();
        assert!(options.validate().is_ok());

        options.parameter_table = Some(PathBuf::new());
        assert!(options.validate().is_err());
    }
}
