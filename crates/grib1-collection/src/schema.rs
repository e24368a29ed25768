//! Projection of a collection index into named variables with
//! coordinate axes.
//!
//! The projector is the ground truth for axis ordering: every data
//! variable is laid out `time, ens?, vert?, y, x` with absent axes
//! elided. Data variables carry a [`VarRef`] back into the index; the
//! reader keeps the mapping from projected names to refs (no hidden
//! per-variable tag objects).

use std::collections::HashMap;

use crate::index::partition::TimePartition;
use crate::index::{
    Collection, EnsCoord, HorizCoordSys, TimeCoord, TimeValues, VarRef, VariableMeta, VertCoord,
};
use crate::naming;
use crate::tables::Grib1ParamTables;

/// Missing-value sentinel documented on every data variable.
pub const MISSING_VALUE: f32 = f32::NAN;

/// Name of the length-2 inner axis backing interval and layer bounds.
pub const BOUNDS_DIM: &str = "bnds";

/// One named attribute on a variable or on the schema root.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

impl Attribute {
    pub fn str(name: &str, value: impl Into<String>) -> Self {
        Self { name: name.to_string(), value: AttrValue::Str(value.into()) }
    }

    pub fn int(name: &str, value: i32) -> Self {
        Self { name: name.to_string(), value: AttrValue::Int(value) }
    }

    pub fn float(name: &str, value: f32) -> Self {
        Self { name: name.to_string(), value: AttrValue::Float(value) }
    }

    pub fn double(name: &str, value: f64) -> Self {
        Self { name: name.to_string(), value: AttrValue::Double(value) }
    }
}

#[derive(Debug, Clone)]
pub enum AttrValue {
    Str(String),
    Int(i32),
    Float(f32),
    Double(f64),
}

// Bit-compare floats so that NaN sentinels (missing_value, _FillValue)
// compare equal and schema equality is total.
impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

/// A named axis length within a schema group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// Cached values of a coordinate variable.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

/// What a schema variable is: a coordinate with cached values, or a
/// data variable backed by index records.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    Coordinate(CoordValues),
    Data(VarRef),
}

/// One projected variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaVariable {
    pub name: String,
    /// Dimension names in order; empty for scalars.
    pub dims: Vec<String>,
    pub kind: VariableKind,
    pub attributes: Vec<Attribute>,
}

impl SchemaVariable {
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }
}

/// All variables sharing one horizontal grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaGroup {
    /// `None` for single-group collections, which project into the root.
    pub name: Option<String>,
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<SchemaVariable>,
}

impl SchemaGroup {
    pub fn variable(&self, name: &str) -> Option<&SchemaVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }
}

/// The projected schema of an opened collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub attributes: Vec<Attribute>,
    pub groups: Vec<SchemaGroup>,
}

impl Schema {
    /// Iterate all data variables with their owning group.
    pub fn data_variables(&self) -> impl Iterator<Item = (&SchemaGroup, &SchemaVariable)> {
        self.groups.iter().flat_map(|group| {
            group
                .variables
                .iter()
                .filter(|v| matches!(v.kind, VariableKind::Data(_)))
                .map(move |v| (group, v))
        })
    }
}

// ============================================================================
// Projection
// ============================================================================

/// Flattened per-variable view shared by the flat and partitioned
/// projections.
struct VarView<'a> {
    meta: &'a VariableMeta,
    time_idx: i32,
    vert_idx: i32,
    ens_idx: i32,
    vref: VarRef,
}

/// Flattened per-group view shared by the flat and partitioned
/// projections.
struct GroupView<'a> {
    name: &'a str,
    hcs: &'a HorizCoordSys,
    time_coords: Vec<&'a TimeCoord>,
    vert_coords: &'a [VertCoord],
    ens_coords: &'a [EnsCoord],
    variables: Vec<VarView<'a>>,
}

/// Project a flat collection into its schema.
pub fn project_collection(collection: &Collection, tables: &dyn Grib1ParamTables) -> Schema {
    let use_groups = collection.groups.len() > 1;
    let groups = collection
        .groups
        .iter()
        .enumerate()
        .map(|(gidx, group)| {
            let view = GroupView {
                name: &group.name,
                hcs: &group.hcs,
                time_coords: group.time_coords.iter().collect(),
                vert_coords: &group.vert_coords,
                ens_coords: &group.ens_coords,
                variables: group
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(vidx, vi)| VarView {
                        meta: &vi.meta,
                        time_idx: vi.time_idx,
                        vert_idx: vi.vert_idx,
                        ens_idx: vi.ens_idx,
                        vref: VarRef { group: gidx, var: vidx },
                    })
                    .collect(),
            };
            project_group(&view, use_groups, collection.center, collection.subcenter, tables)
        })
        .collect();

    Schema {
        attributes: root_attributes(
            collection.center,
            collection.subcenter,
            collection.local_table_version,
            collection.gen_process_id,
        ),
        groups,
    }
}

/// Project a time-partitioned collection into its schema. The global
/// time axes come from the partition time unions.
pub fn project_partition(tp: &TimePartition, tables: &dyn Grib1ParamTables) -> Schema {
    let use_groups = tp.groups.len() > 1;
    let groups = tp
        .groups
        .iter()
        .enumerate()
        .map(|(gidx, group)| {
            let view = GroupView {
                name: &group.name,
                hcs: &group.hcs,
                time_coords: group.time_unions.iter().map(|u| &u.coord).collect(),
                vert_coords: &group.vert_coords,
                ens_coords: &group.ens_coords,
                variables: group
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(vidx, vip)| VarView {
                        meta: &vip.meta,
                        time_idx: vip.time_idx,
                        vert_idx: vip.vert_idx,
                        ens_idx: vip.ens_idx,
                        vref: VarRef { group: gidx, var: vidx },
                    })
                    .collect(),
            };
            project_group(&view, use_groups, tp.center, tp.subcenter, tables)
        })
        .collect();

    Schema {
        attributes: root_attributes(tp.center, tp.subcenter, tp.local_table_version, tp.gen_process_id),
        groups,
    }
}

fn root_attributes(center: i32, subcenter: i32, local: i32, gen_process_id: i32) -> Vec<Attribute> {
    vec![
        Attribute::int("Originating_or_generating_Center", center),
        Attribute::int("Originating_or_generating_Subcenter", subcenter),
        Attribute::int("GRIB_table_version", local),
        Attribute::str("GRIB_table", format!("{}-{}-{}", center, subcenter, local)),
        Attribute::int("Generating_process_or_model", gen_process_id),
        Attribute::str("Conventions", "CF-1.6"),
        Attribute::str("history", "Read using grib1-collection"),
        Attribute::str("featureType", "GRID"),
    ]
}

fn project_group(
    view: &GroupView<'_>,
    use_groups: bool,
    center: i32,
    subcenter: i32,
    tables: &dyn Grib1ParamTables,
) -> SchemaGroup {
    let hcs = view.hcs;
    let mut dimensions = Vec::new();
    let mut variables = Vec::new();

    // horizontal coordinates
    let horiz_dims: [&str; 2] = match &hcs.projection {
        None => {
            dimensions.push(Dimension { name: "lat".to_string(), len: hcs.ny });
            dimensions.push(Dimension { name: "lon".to_string(), len: hcs.nx });

            let lats = match &hcs.gauss_lats {
                Some(gauss) => gauss.clone(),
                None => axis_values(hcs.starty, hcs.dy, hcs.ny),
            };
            variables.push(SchemaVariable {
                name: "lat".to_string(),
                dims: vec!["lat".to_string()],
                kind: VariableKind::Coordinate(CoordValues::Float(lats)),
                attributes: vec![Attribute::str("units", "degrees_north")],
            });
            variables.push(SchemaVariable {
                name: "lon".to_string(),
                dims: vec!["lon".to_string()],
                kind: VariableKind::Coordinate(CoordValues::Float(axis_values(
                    hcs.startx, hcs.dx, hcs.nx,
                ))),
                attributes: vec![Attribute::str("units", "degrees_east")],
            });
            ["lat", "lon"]
        }
        Some(projection) => {
            dimensions.push(Dimension { name: "y".to_string(), len: hcs.ny });
            dimensions.push(Dimension { name: "x".to_string(), len: hcs.nx });

            let mut attributes =
                vec![Attribute::str("grid_mapping_name", projection.name.clone())];
            attributes.extend(
                projection
                    .parameters
                    .iter()
                    .map(|p| Attribute::double(&p.name, p.value)),
            );
            variables.push(SchemaVariable {
                name: grid_mapping_name(hcs),
                dims: Vec::new(),
                kind: VariableKind::Coordinate(CoordValues::Int(Vec::new())),
                attributes,
            });

            variables.push(SchemaVariable {
                name: "x".to_string(),
                dims: vec!["x".to_string()],
                kind: VariableKind::Coordinate(CoordValues::Float(axis_values(
                    hcs.startx, hcs.dx, hcs.nx,
                ))),
                attributes: vec![
                    Attribute::str("standard_name", "projection_x_coordinate"),
                    Attribute::str("units", "km"),
                ],
            });
            variables.push(SchemaVariable {
                name: "y".to_string(),
                dims: vec!["y".to_string()],
                kind: VariableKind::Coordinate(CoordValues::Float(axis_values(
                    hcs.starty, hcs.dy, hcs.ny,
                ))),
                attributes: vec![
                    Attribute::str("standard_name", "projection_y_coordinate"),
                    Attribute::str("units", "km"),
                ],
            });
            ["y", "x"]
        }
    };

    let needs_bounds = view.vert_coords.iter().any(|vc| vc.is_layer)
        || view.time_coords.iter().any(|tc| tc.is_interval());
    if needs_bounds {
        dimensions.push(Dimension { name: BOUNDS_DIM.to_string(), len: 2 });
    }

    // vertical coordinates
    for vc in view.vert_coords {
        dimensions.push(Dimension { name: vc.name.clone(), len: vc.len() });

        let mut attributes = vec![
            Attribute::str("units", vc.units.clone()),
            Attribute::str("long_name", tables.level_description(vc.level_code)),
            Attribute::str("positive", if vc.positive_up { "up" } else { "down" }),
            Attribute::int("GRIB1_level_code", vc.level_code),
        ];
        let datum = vc
            .datum
            .clone()
            .or_else(|| tables.level_unit(vc.level_code).and_then(|u| u.datum));
        if let Some(datum) = datum {
            attributes.push(Attribute::str("datum", datum));
        }

        if vc.is_layer {
            let bounds_name = format!("{}_bounds", vc.name);
            attributes.push(Attribute::str("bounds", bounds_name.clone()));

            let midpoints = vc
                .levels
                .iter()
                .map(|lv| ((lv.value1 + lv.value2) / 2.0) as f32)
                .collect();
            variables.push(SchemaVariable {
                name: vc.name.clone(),
                dims: vec![vc.name.clone()],
                kind: VariableKind::Coordinate(CoordValues::Float(midpoints)),
                attributes,
            });

            let mut bounds = Vec::with_capacity(2 * vc.len());
            for lv in &vc.levels {
                bounds.push(lv.value1 as f32);
                bounds.push(lv.value2 as f32);
            }
            variables.push(SchemaVariable {
                name: bounds_name.clone(),
                dims: vec![vc.name.clone(), BOUNDS_DIM.to_string()],
                kind: VariableKind::Coordinate(CoordValues::Float(bounds)),
                attributes: vec![
                    Attribute::str("units", vc.units.clone()),
                    Attribute::str("long_name", format!("bounds for {}", vc.name)),
                ],
            });
        } else {
            let values = vc.levels.iter().map(|lv| lv.value1 as f32).collect();
            variables.push(SchemaVariable {
                name: vc.name.clone(),
                dims: vec![vc.name.clone()],
                kind: VariableKind::Coordinate(CoordValues::Float(values)),
                attributes,
            });
        }
    }

    // time coordinates
    for tc in &view.time_coords {
        dimensions.push(Dimension { name: tc.name.clone(), len: tc.len() });

        let mut attributes = vec![
            Attribute::str("units", tc.units.clone()),
            Attribute::str("standard_name", "time"),
        ];

        match &tc.values {
            TimeValues::Offsets(offsets) => {
                variables.push(SchemaVariable {
                    name: tc.name.clone(),
                    dims: vec![tc.name.clone()],
                    kind: VariableKind::Coordinate(CoordValues::Int(offsets.clone())),
                    attributes,
                });
            }
            TimeValues::Intervals(intervals) => {
                let bounds_name = format!("{}_bounds", tc.name);
                attributes.push(Attribute::str("bounds", bounds_name.clone()));

                // an interval is reported at its end point
                let ends = intervals.iter().map(|tinv| tinv.bounds2).collect();
                variables.push(SchemaVariable {
                    name: tc.name.clone(),
                    dims: vec![tc.name.clone()],
                    kind: VariableKind::Coordinate(CoordValues::Int(ends)),
                    attributes,
                });

                let mut bounds = Vec::with_capacity(2 * intervals.len());
                for tinv in intervals {
                    bounds.push(tinv.bounds1);
                    bounds.push(tinv.bounds2);
                }
                variables.push(SchemaVariable {
                    name: bounds_name.clone(),
                    dims: vec![tc.name.clone(), BOUNDS_DIM.to_string()],
                    kind: VariableKind::Coordinate(CoordValues::Int(bounds)),
                    attributes: vec![
                        Attribute::str("units", tc.units.clone()),
                        Attribute::str("long_name", format!("bounds for {}", tc.name)),
                    ],
                });
            }
        }
    }

    // ensemble coordinates
    for (eidx, ec) in view.ens_coords.iter().enumerate() {
        let name = format!("ens{}", eidx);
        dimensions.push(Dimension { name: name.clone(), len: ec.len() });
        variables.push(SchemaVariable {
            name: name.clone(),
            dims: vec![name],
            kind: VariableKind::Coordinate(CoordValues::Int(ec.members.clone())),
            attributes: vec![Attribute::str("_CoordinateAxisType", "Ensemble")],
        });
    }

    // data variables, short names disambiguated in encounter order
    let mut used: HashMap<String, usize> = HashMap::new();
    for var in &view.variables {
        let base = naming::make_variable_name(tables, center, subcenter, var.meta);
        let seen = used.entry(base.clone()).or_insert(0);
        *seen += 1;
        let name = if *seen == 1 { base } else { format!("{}_{}", base, *seen - 1) };

        let mut dims = Vec::new();
        let time_name = if var.time_idx >= 0 {
            Some(view.time_coords[var.time_idx as usize].name.as_str())
        } else {
            None
        };
        if let Some(tn) = time_name {
            dims.push(tn.to_string());
        }
        if var.ens_idx >= 0 {
            dims.push(format!("ens{}", var.ens_idx));
        }
        if var.vert_idx >= 0 {
            dims.push(view.vert_coords[var.vert_idx as usize].name.clone());
        }
        dims.push(horiz_dims[0].to_string());
        dims.push(horiz_dims[1].to_string());

        let mut attributes = vec![
            Attribute::str(
                "long_name",
                naming::make_variable_long_name(tables, center, subcenter, var.meta),
            ),
            Attribute::str(
                "units",
                naming::make_variable_units(tables, center, subcenter, var.meta),
            ),
            Attribute::float("missing_value", MISSING_VALUE),
            Attribute::float("_FillValue", MISSING_VALUE),
        ];
        if !hcs.is_latlon() {
            attributes.push(Attribute::str("grid_mapping", grid_mapping_name(hcs)));
        }
        attributes.push(Attribute::int("Grib_Parameter", var.meta.parameter));
        attributes.push(Attribute::int("Grib_Level_Type", var.meta.level_type));
        if var.meta.intv_type >= 0 {
            attributes.push(Attribute::int("Grib_Statistical_Interval_Type", var.meta.intv_type));
            if let (Some(tn), Some(stat)) = (time_name, tables.stat_type(var.meta.intv_type)) {
                if let Some(method) = stat.cell_method() {
                    attributes.push(Attribute::str("cell_methods", format!("{}: {}", tn, method)));
                }
            }
        }
        if var.meta.ens_derived_type >= 0 {
            attributes.push(Attribute::int("Grib_Ensemble_Derived_Type", var.meta.ens_derived_type));
        } else if var.meta.is_probability() {
            attributes.push(Attribute::str(
                "Grib_Probability_Type",
                var.meta.probability_name.clone().unwrap_or_default(),
            ));
        }

        variables.push(SchemaVariable {
            name,
            dims,
            kind: VariableKind::Data(var.vref),
            attributes,
        });
    }

    SchemaGroup {
        name: if use_groups { Some(view.name.to_string()) } else { None },
        dimensions,
        variables,
    }
}

fn grid_mapping_name(hcs: &HorizCoordSys) -> String {
    format!("{}_Projection", hcs.name)
}

/// Arithmetic axis: `start + i * step` as f32.
fn axis_values(start: f64, step: f64, n: usize) -> Vec<f32> {
    (0..n).map(|i| (start + step * i as f64) as f32).collect()
}
