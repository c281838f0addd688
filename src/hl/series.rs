use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};

use ndarray::ArrayView;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::hl::backend::{backend_by_name, Backend, OpenMode, Target};
use crate::hl::config::Config;
use crate::hl::partition::{explicit_block, Partition};
use crate::hl::pattern::Pattern;
use crate::hl::rank::{Communicator, RankInfo};
use crate::hl::record::{IterationMeta, MeshMeta, SeriesMeta};
use crate::hl::registry::{DatasetState, ShapeRegistry};
use crate::hl::storage::{Buffer, ChunkRecord, Datatype, Element, IterationRecord, Scalar};
use crate::internal_prelude::*;

/// Lifecycle of one iteration of a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotState {
    Open,
    Closed,
}

/// The open iteration of a writing participant.
#[derive(Debug)]
struct Snapshot {
    index: u64,
    registry: ShapeRegistry,
    datatypes: BTreeMap<String, Datatype>,
    meta: IterationMeta,
}

impl Snapshot {
    fn new(index: u64) -> Self {
        Self {
            index,
            registry: ShapeRegistry::new(),
            datatypes: BTreeMap::new(),
            meta: IterationMeta::default(),
        }
    }

    /// Fails with `ShapeConflict` if `name` is declared with a datatype other than `datatype`.
    fn check_datatype(&self, name: &str, datatype: Datatype) -> Result<()> {
        match self.datatypes.get(name) {
            Some(&declared) if declared != datatype => {
                let shape = self.registry.lookup(name)?;
                Err(Error::shape_conflict(
                    name,
                    format!("{shape} {declared}"),
                    format!("{shape} {datatype}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

fn open_snapshot(current: &mut Option<Snapshot>, index: u64) -> Result<&mut Snapshot> {
    match current {
        Some(snapshot) if snapshot.index == index => Ok(snapshot),
        _ => fail!("iteration {} is closed", index),
    }
}

/// Series builder.
#[derive(Default)]
pub struct SeriesBuilder {
    config: Config,
    ranks: RankInfo,
    backend: Option<Box<dyn Backend>>,
    meta: SeriesMeta,
}

impl Debug for SeriesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SeriesBuilder")
            .field("config", &self.config)
            .field("ranks", &self.ranks)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("meta", &self.meta)
            .finish()
    }
}

impl SeriesBuilder {
    /// Creates a new series builder for a single participant and the default backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend configuration. The `"backend"` key selects the backend unless one is
    /// set explicitly; the whole configuration is passed on to the backend.
    pub fn config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    pub fn participants(&mut self, ranks: RankInfo) -> &mut Self {
        self.ranks = ranks;
        self
    }

    /// Takes rank index and count from a coordination layer.
    pub fn communicator<C: Communicator>(&mut self, comm: &C) -> Result<&mut Self> {
        self.ranks = comm.rank_info()?;
        Ok(self)
    }

    pub fn backend<B: Backend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn author(&mut self, author: &str) -> &mut Self {
        self.meta.author = Some(author.to_owned());
        self
    }

    pub fn software(&mut self, software: &str) -> &mut Self {
        self.meta.software = Some(software.to_owned());
        self
    }

    /// Opens an existing series as read-only.
    pub fn open(&mut self, pattern: &str) -> Result<Series> {
        self.open_as(pattern, OpenMode::Read)
    }

    /// Creates a series, replacing existing files.
    pub fn create(&mut self, pattern: &str) -> Result<Series> {
        self.open_as(pattern, OpenMode::Create)
    }

    /// Creates a series, fails if any of its files exist.
    pub fn create_excl(&mut self, pattern: &str) -> Result<Series> {
        self.open_as(pattern, OpenMode::CreateExcl)
    }

    /// Opens a series in a given mode.
    ///
    /// The explicitly set backend is moved into the series, so a builder configured with
    /// [`backend`](Self::backend) opens one series only; later calls fall back to the
    /// configured backend name.
    pub fn open_as(&mut self, pattern: &str, mode: OpenMode) -> Result<Series> {
        let pattern = Pattern::parse(pattern)?;
        let mut backend = match self.backend.take() {
            Some(backend) => {
                if let Some(name) = self.config.backend().filter(|&n| n != backend.name()) {
                    warn!(configured = name, backend = backend.name(), "ignoring backend key");
                }
                backend
            }
            None => backend_by_name(self.config.backend().unwrap_or("json"))?,
        };
        backend.configure(&self.config)?;
        backend.attach(&Target { pattern: &pattern, mode, ranks: self.ranks, meta: &self.meta })?;
        let meta = if mode.is_read_only() { backend.series_meta()? } else { self.meta.clone() };
        info!(
            pattern = %pattern,
            backend = backend.name(),
            ranks = %self.ranks,
            mode = ?mode,
            "opened series"
        );
        Ok(Series {
            pattern,
            mode,
            ranks: self.ranks,
            backend,
            meta,
            current: None,
            closed: BTreeSet::new(),
        })
    }
}

/// A sequence of iterations stored through one backend.
///
/// Iterations are written one at a time: opening another iteration closes the open one, and
/// a closed iteration can never be opened again. Dropping the series closes the open
/// iteration.
pub struct Series {
    pattern: Pattern,
    mode: OpenMode,
    ranks: RankInfo,
    backend: Box<dyn Backend>,
    meta: SeriesMeta,
    current: Option<Snapshot>,
    closed: BTreeSet<u64>,
}

impl Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Series")
            .field("pattern", &self.pattern.as_str())
            .field("mode", &self.mode)
            .field("ranks", &self.ranks)
            .field("backend", &self.backend.name())
            .field("open", &self.current.as_ref().map(|s| s.index))
            .finish()
    }
}

impl Series {
    /// Creates a series for a single participant with the default backend.
    pub fn create(pattern: &str) -> Result<Self> {
        SeriesBuilder::new().create(pattern)
    }

    /// Opens an existing series as read-only with the default backend.
    pub fn open(pattern: &str) -> Result<Self> {
        SeriesBuilder::new().open(pattern)
    }

    pub fn with_options() -> SeriesBuilder {
        SeriesBuilder::new()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn ranks(&self) -> RankInfo {
        self.ranks
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn author(&self) -> Option<&str> {
        self.meta.author.as_deref()
    }

    pub fn software(&self) -> Option<&str> {
        self.meta.software.as_deref()
    }

    /// Opens iteration `index` for writing, or continues it if it is the open one.
    ///
    /// Any other open iteration is closed first. Fails if `index` has already been closed
    /// or the series is read-only.
    pub fn write_iteration(&mut self, index: u64) -> Result<Iteration<'_>> {
        ensure!(!self.mode.is_read_only(), "series {} is open read-only", self.pattern);
        ensure!(
            !self.closed.contains(&index),
            "iteration {} is closed and cannot be reopened",
            index
        );
        let open = self.current.as_ref().map(|s| s.index);
        if open != Some(index) {
            if let Some(open) = open {
                warn!(iteration = open, next = index, "implicitly closing iteration");
                self.close_current()?;
            }
            self.backend.begin_iteration(index)?;
            self.current = Some(Snapshot::new(index));
            info!(iteration = index, rank = self.ranks.rank(), "opened iteration");
        }
        Ok(Iteration { series: self, index })
    }

    /// State of iteration `index` as seen by this participant, `None` if never opened.
    pub fn iteration_state(&self, index: u64) -> Option<SnapshotState> {
        if self.current.as_ref().map_or(false, |s| s.index == index) {
            Some(SnapshotState::Open)
        } else if self.closed.contains(&index) {
            Some(SnapshotState::Closed)
        } else {
            None
        }
    }

    /// Indices of the iterations available for reading, in ascending order.
    pub fn iterations(&self) -> Result<Vec<u64>> {
        self.backend.iterations()
    }

    pub fn read_iteration(&self, index: u64) -> Result<IterationRecord> {
        self.backend.read_iteration(index)
    }

    /// Reads all closed iterations in index order.
    pub fn read_iterations(&self) -> Result<impl Iterator<Item = Result<IterationRecord>> + '_> {
        let indices = self.backend.iterations()?;
        Ok(indices.into_iter().map(move |index| self.backend.read_iteration(index)))
    }

    fn close_current(&mut self) -> Result<()> {
        let snapshot = match self.current.take() {
            Some(snapshot) => snapshot,
            None => return Ok(()),
        };
        let index = snapshot.index;
        self.closed.insert(index);
        let checked = snapshot.meta.meshes.iter().try_for_each(|(name, mesh)| {
            match snapshot.registry.lookup(name) {
                Ok(shape) => mesh.validate(shape.ndim()),
                Err(_) => Ok(()),
            }
        });
        if let Err(err) = checked {
            warn!(iteration = index, error = %err, "dropping iteration with invalid metadata");
            self.backend.abandon_iteration(index)?;
            return Err(err);
        }
        self.backend.finish_iteration(index, &snapshot.meta)?;
        info!(
            iteration = index,
            rank = self.ranks.rank(),
            datasets = snapshot.registry.len(),
            "closed iteration"
        );
        Ok(())
    }

    /// Closes the open iteration, if any, and releases the series.
    pub fn close(mut self) -> Result<()> {
        self.close_current()
    }
}

impl Drop for Series {
    fn drop(&mut self) {
        if let Err(err) = self.close_current() {
            warn!(error = %err, "failed to close iteration on drop");
        }
    }
}

/// Write handle for the open iteration of a series.
pub struct Iteration<'a> {
    series: &'a mut Series,
    index: u64,
}

impl Debug for Iteration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Iteration").field("index", &self.index()).finish()
    }
}

impl<'a> Iteration<'a> {
    fn snapshot(&self) -> Result<&Snapshot> {
        match self.series.current {
            Some(ref snapshot) if snapshot.index == self.index => Ok(snapshot),
            _ => fail!("iteration {} is closed", self.index),
        }
    }

    fn snapshot_mut(&mut self) -> Result<&mut Snapshot> {
        open_snapshot(&mut self.series.current, self.index)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn ranks(&self) -> RankInfo {
        self.series.ranks
    }

    /// Declares the global shape and element type of a dataset.
    ///
    /// Declaring the same shape and type again is a no-op; anything else fails with
    /// `ShapeConflict`.
    pub fn declare<T: Element, D: Dimension>(&mut self, name: &str, shape: D) -> Result<Shape> {
        let index = self.index;
        let series = &mut *self.series;
        let snapshot = open_snapshot(&mut series.current, index)?;
        snapshot.check_datatype(name, T::DATATYPE)?;
        let shape = snapshot.registry.declare(name, shape)?;
        snapshot.datatypes.insert(name.to_owned(), T::DATATYPE);
        series.backend.declare_dataset(snapshot.index, name, &shape, T::DATATYPE)?;
        Ok(shape)
    }

    /// Returns the declared shape of `name` or fails with `UnknownDataset`.
    pub fn lookup(&self, name: &str) -> Result<Shape> {
        self.snapshot()?.registry.lookup(name)
    }

    pub fn state(&self, name: &str) -> DatasetState {
        self.snapshot().map_or(DatasetState::Undeclared, |s| s.registry.state(name))
    }

    /// Names of the datasets declared in this iteration.
    pub fn datasets(&self) -> Vec<String> {
        self.snapshot().map(|s| s.registry.names()).unwrap_or_default()
    }

    /// Writes `arr` at `placement` of a declared dataset.
    ///
    /// The placement must lie within the declared shape and the array shape must equal the
    /// placement extent; an empty placement with an empty array is accepted.
    pub fn store_chunk<'b, A, T, D>(
        &mut self, name: &str, placement: &Placement, arr: A,
    ) -> Result<()>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        D: ndarray::Dimension,
    {
        let view = arr.into();
        let rank = self.series.ranks.rank();
        let index = self.index;
        let series = &mut *self.series;
        let snapshot = open_snapshot(&mut series.current, index)?;
        let shape = snapshot.registry.lookup(name)?;
        snapshot.check_datatype(name, T::DATATYPE)?;
        let placement = explicit_block(&shape, placement.offset(), placement.extent())?;
        ensure!(
            view.shape() == placement.extent(),
            "shape mismatch when storing \"{}\": memory = {:?}, placement = {}",
            name,
            view.shape(),
            placement
        );
        debug!(dataset = name, placement = %placement, rank, "storing chunk");
        let chunk = ChunkRecord::new(placement, rank, Buffer::new(view.to_owned().into_dyn()))?;
        series.backend.store_chunk(snapshot.index, name, chunk)
    }

    /// Writes this participant's local data according to `partition`.
    ///
    /// If the partition yields a single placement, `arr` is the local block. If it yields
    /// several (a chunk grid), `arr` must have the global shape and every owned chunk is cut
    /// out of it. A participant owning no chunk writes nothing. Returns the placements
    /// written.
    pub fn store_local<'b, A, T, D>(
        &mut self, name: &str, arr: A, partition: &Partition,
    ) -> Result<Vec<Placement>>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        D: ndarray::Dimension,
    {
        let view = arr.into().into_dyn();
        let shape = self.lookup(name)?;
        let placements = partition.placements(&shape, self.series.ranks)?;
        match placements.as_slice() {
            [] => {}
            [placement] => self.store_chunk(name, placement, view)?,
            _ => {
                ensure!(
                    view.shape() == &shape[..],
                    "local data of \"{}\" must have the global shape {} to be chunked, got {:?}",
                    name,
                    shape,
                    view.shape()
                );
                for placement in &placements {
                    let info = placement.slice_info()?;
                    self.store_chunk(name, placement, view.slice(&info))?;
                }
            }
        }
        Ok(placements)
    }

    /// Marks every element of a declared dataset as `value`.
    pub fn make_constant<T: Element>(&mut self, name: &str, value: T) -> Result<()> {
        let index = self.index;
        let series = &mut *self.series;
        let snapshot = open_snapshot(&mut series.current, index)?;
        snapshot.registry.lookup(name)?;
        snapshot.check_datatype(name, T::DATATYPE)?;
        debug!(dataset = name, value = ?value, "making dataset constant");
        series.backend.set_constant(snapshot.index, name, Scalar::new(value))
    }

    /// Checks that the placements stored so far for `name` (by all participants sharing the
    /// backend) tile its shape, and marks the dataset as validated.
    pub fn validate(&mut self, name: &str) -> Result<()> {
        let snapshot = self.snapshot()?;
        snapshot.registry.lookup(name)?;
        let placements = self.series.backend.placements(snapshot.index, name)?;
        snapshot.registry.validate(name, &placements)
    }

    pub fn meta(&self) -> Result<&IterationMeta> {
        Ok(&self.snapshot()?.meta)
    }

    pub fn set_time(&mut self, time: f64) -> Result<&mut Self> {
        self.snapshot_mut()?.meta.time = time;
        Ok(self)
    }

    pub fn set_dt(&mut self, dt: f64) -> Result<&mut Self> {
        self.snapshot_mut()?.meta.dt = dt;
        Ok(self)
    }

    pub fn set_time_unit_si(&mut self, unit: f64) -> Result<&mut Self> {
        self.snapshot_mut()?.meta.time_unit_si = unit;
        Ok(self)
    }

    pub fn set_attribute<V: Into<Value>>(&mut self, key: &str, value: V) -> Result<&mut Self> {
        self.snapshot_mut()?.meta.attributes.insert(key.to_owned(), value.into());
        Ok(self)
    }

    /// Metadata of mesh `name`, created on first access with defaults for the declared
    /// dimension count of the dataset of the same name.
    pub fn mesh_mut(&mut self, name: &str) -> Result<&mut MeshMeta> {
        let snapshot = self.snapshot_mut()?;
        let ndim = snapshot.registry.lookup(name).map(|s| s.ndim()).ok();
        Ok(snapshot
            .meta
            .meshes
            .entry(name.to_owned())
            .or_insert_with(|| ndim.map_or_else(MeshMeta::default, MeshMeta::for_ndim)))
    }

    /// Closes the iteration; it cannot be written again.
    pub fn close(self) -> Result<()> {
        self.series.close_current()
    }
}
