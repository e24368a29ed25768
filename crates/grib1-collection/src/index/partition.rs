//! Time-partitioned collections.
//!
//! A time partition concatenates the time axes of several
//! sub-collections, each backed by its own files. The global time axis
//! maps every index to `(partition, local index)`; everything else
//! (ensemble, vertical, horizontal) is shared across partitions.

use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::codec::RandomAccess;
use crate::error::{CollectionError, Result};
use crate::index::{
    validate_axis_binding, AxisBinding, Collection, EnsCoord, GroupAxes, HorizCoordSys, TimeCoord,
    VarRef, VariableIndex, VariableMeta, VertCoord,
};

/// Position of one global time index inside the partition set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTimeIndex {
    pub partno: u32,
    pub local_idx: u32,
}

/// The global time axis of a partitioned variable: coordinate values
/// plus the per-index partition mapping.
///
/// The axis is monotone in time; `partno` need not be monotone.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoordUnion {
    pub coord: TimeCoord,
    pub index: Vec<PartitionTimeIndex>,
}

impl TimeCoordUnion {
    pub fn len(&self) -> usize {
        self.coord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }

    /// Map a global time index to its partition coordinates.
    pub fn lookup(&self, global_t: usize) -> Option<PartitionTimeIndex> {
        self.index.get(global_t).copied()
    }
}

/// A logical variable of a partitioned collection. Carries the same
/// axis bindings as a flat variable; the record tables live inside each
/// partition's own variable index.
#[derive(Debug)]
pub struct VariableIndexPartitioned {
    pub meta: VariableMeta,
    pub group: usize,
    /// Index into the group's time coord unions. Always present: the
    /// partitioning dimension is time.
    pub time_idx: i32,
    pub vert_idx: i32,
    pub ens_idx: i32,
    pub nens: usize,
    pub nverts: usize,
    /// Per-partition location of this variable inside the partition's
    /// collection; `None` when a partition lacks the variable.
    pub partition_var: Vec<Option<VarRef>>,
}

impl AxisBinding for VariableIndexPartitioned {
    fn binding(&self) -> (i32, i32, i32, usize, usize) {
        (self.time_idx, self.vert_idx, self.ens_idx, self.nens, self.nverts)
    }
}

/// All partitioned variables sharing one horizontal grid.
#[derive(Debug)]
pub struct PartitionedGroup {
    pub name: String,
    pub hcs: HorizCoordSys,
    pub time_unions: Vec<TimeCoordUnion>,
    pub vert_coords: Vec<VertCoord>,
    pub ens_coords: Vec<EnsCoord>,
    pub variables: Vec<VariableIndexPartitioned>,
}

impl GroupAxes for PartitionedGroup {
    fn time_len(&self, idx: usize) -> Option<usize> {
        self.time_unions.get(idx).map(TimeCoordUnion::len)
    }

    fn vert_len(&self, idx: usize) -> Option<usize> {
        self.vert_coords.get(idx).map(VertCoord::len)
    }

    fn ens_len(&self, idx: usize) -> Option<usize> {
        self.ens_coords.get(idx).map(EnsCoord::len)
    }
}

/// Loads a partition's collection index on first touch.
pub trait PartitionLoader: Send + Sync {
    fn load_partition(&self, partno: usize) -> Result<Collection>;
}

/// Partition loader for indexes whose partitions are fully materialized
/// at decode time; load requests mean the index was inconsistent.
pub struct NoPartitionSource;

impl PartitionLoader for NoPartitionSource {
    fn load_partition(&self, partno: usize) -> Result<Collection> {
        Err(CollectionError::index_corrupt(format!(
            "no auxiliary index stream for partition {}",
            partno
        )))
    }
}

/// One sub-collection of a time partition. The collection itself is
/// hydrated at most once, on the first read that touches the partition.
pub struct Partition {
    pub name: String,
    collection: OnceCell<Collection>,
    hydrate: Mutex<()>,
}

impl Partition {
    /// A partition hydrated later through the [`PartitionLoader`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: OnceCell::new(),
            hydrate: Mutex::new(()),
        }
    }

    /// A partition with its collection already loaded.
    pub fn with_collection(name: impl Into<String>, collection: Collection) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(collection);
        Self {
            name: name.into(),
            collection: cell,
            hydrate: Mutex::new(()),
        }
    }

    /// The partition's collection, if already hydrated.
    pub fn collection(&self) -> Option<&Collection> {
        self.collection.get()
    }
}

/// Root of an opened time-partitioned index.
pub struct TimePartition {
    pub name: String,
    pub center: i32,
    pub subcenter: i32,
    pub local_table_version: i32,
    pub gen_process_id: i32,
    pub groups: Vec<PartitionedGroup>,
    partitions: Vec<Partition>,
    loader: Arc<dyn PartitionLoader>,
}

impl TimePartition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        center: i32,
        subcenter: i32,
        local_table_version: i32,
        gen_process_id: i32,
        groups: Vec<PartitionedGroup>,
        partitions: Vec<Partition>,
        loader: Arc<dyn PartitionLoader>,
    ) -> Self {
        Self {
            name: name.into(),
            center,
            subcenter,
            local_table_version,
            gen_process_id,
            groups,
            partitions,
            loader,
        }
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// The collection of one partition, hydrating it on first access.
    ///
    /// Hydration is at-most-once and serialized per partition; the
    /// loaded collection is validated before it becomes visible.
    pub fn partition_collection(&self, partno: usize) -> Result<&Collection> {
        let partition = self.partitions.get(partno).ok_or_else(|| {
            CollectionError::index_corrupt(format!("partition {} out of range", partno))
        })?;

        if let Some(collection) = partition.collection.get() {
            return Ok(collection);
        }

        let _guard = partition
            .hydrate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(collection) = partition.collection.get() {
            return Ok(collection);
        }

        let collection = self.loader.load_partition(partno)?;
        collection.validate()?;
        Ok(partition.collection.get_or_init(|| collection))
    }

    /// Resolve a partitioned variable inside one partition. `Ok(None)`
    /// means the partition does not carry the variable.
    pub fn vindex_for<'a>(
        &'a self,
        vip: &VariableIndexPartitioned,
        partno: usize,
    ) -> Result<Option<(&'a Collection, VarRef, &'a VariableIndex)>> {
        let loc = vip.partition_var.get(partno).ok_or_else(|| {
            CollectionError::index_corrupt(format!(
                "variable has no partition entry for partition {}",
                partno
            ))
        })?;
        let Some(vref) = *loc else {
            return Ok(None);
        };

        let collection = self.partition_collection(partno)?;
        let vindex = collection.variable(vref).ok_or_else(|| {
            CollectionError::index_corrupt(format!(
                "partition {} has no variable at group {} slot {}",
                partno, vref.group, vref.var
            ))
        })?;
        Ok(Some((collection, vref, vindex)))
    }

    /// Open one physical data file of one partition. File numbers are
    /// scoped to the partition.
    pub fn open_file(&self, partno: usize, fileno: u32) -> Result<Box<dyn RandomAccess>> {
        let collection = self.partition_collection(partno)?;
        Ok(collection.open_file(fileno)?)
    }

    /// Location string for one partition file, for log messages.
    pub fn file_location(&self, partno: usize, fileno: u32) -> String {
        match self
            .partitions
            .get(partno)
            .and_then(|p| p.collection.get())
        {
            Some(collection) => {
                format!("{}:{}", self.partitions[partno].name, collection.file_location(fileno))
            }
            None => format!("partition {} fileno {}", partno, fileno),
        }
    }

    /// Structural validation of the partitioned model. Run once at open.
    pub fn validate(&self) -> Result<()> {
        for (gidx, group) in self.groups.iter().enumerate() {
            if group.hcs.nx == 0 || group.hcs.ny == 0 {
                return Err(CollectionError::index_corrupt(format!(
                    "group {} has a degenerate {}x{} grid",
                    gidx, group.hcs.nx, group.hcs.ny
                )));
            }
            for (cidx, union) in group.time_unions.iter().enumerate() {
                if union.coord.len() != union.index.len() {
                    return Err(CollectionError::index_corrupt(format!(
                        "group {} time union {}: {} coordinate values but {} partition entries",
                        gidx,
                        cidx,
                        union.coord.len(),
                        union.index.len()
                    )));
                }
                if union.is_empty() {
                    return Err(CollectionError::index_corrupt(format!(
                        "group {} time union {} is empty",
                        gidx, cidx
                    )));
                }
                for (t, pt) in union.index.iter().enumerate() {
                    if pt.partno as usize >= self.partitions.len() {
                        return Err(CollectionError::index_corrupt(format!(
                            "group {} time union {} index {} references partition {} of {}",
                            gidx,
                            cidx,
                            t,
                            pt.partno,
                            self.partitions.len()
                        )));
                    }
                }
            }
            for (vidx, vip) in group.variables.iter().enumerate() {
                if vip.group != gidx {
                    return Err(CollectionError::index_corrupt(format!(
                        "variable {} of group {} back-references group {}",
                        vidx, gidx, vip.group
                    )));
                }
                if vip.time_idx < 0 {
                    return Err(CollectionError::index_corrupt(format!(
                        "partitioned variable {} of group {} has no time axis",
                        vidx, gidx
                    )));
                }
                validate_axis_binding(gidx, vidx, vip, group)?;
                if vip.partition_var.len() != self.partitions.len() {
                    return Err(CollectionError::index_corrupt(format!(
                        "variable {} of group {} maps {} partitions, collection has {}",
                        vidx,
                        gidx,
                        vip.partition_var.len(),
                        self.partitions.len()
                    )));
                }
            }
        }
        // partitions hydrated before open are validated here; lazily
        // hydrated ones are validated when loaded
        for partition in &self.partitions {
            if let Some(collection) = partition.collection.get() {
                collection.validate()?;
            }
        }
        Ok(())
    }
}
