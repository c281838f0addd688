//! Storage backends.
//!
//! A backend receives the declarations, chunks and metadata of one participant and persists
//! them per iteration. Two implementations are provided: [`MemoryBackend`], whose clones share
//! one store and so can collect the chunks of several in-process participants, and
//! [`JsonBackend`], which writes each closed iteration as a self-describing JSON document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::hl::config::Config;
use crate::hl::pattern::Pattern;
use crate::hl::rank::RankInfo;
use crate::hl::record::{IterationMeta, SeriesMeta};
use crate::hl::storage::{ChunkRecord, Datatype, IterationRecord, Scalar};
use crate::internal_prelude::*;

/// Series opening mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing series as read-only.
    Read,
    /// Create a series, replacing existing files.
    Create,
    /// Create a series, fail if any of its files exist.
    CreateExcl,
}

impl OpenMode {
    pub fn is_read_only(self) -> bool {
        self == Self::Read
    }
}

/// Where and how a backend is attached.
#[derive(Clone, Debug)]
pub struct Target<'a> {
    pub pattern: &'a Pattern,
    pub mode: OpenMode,
    pub ranks: RankInfo,
    pub meta: &'a SeriesMeta,
}

/// The storage interface used by a series.
///
/// Calls arrive in this order per participant: `configure`, `attach`, then for every written
/// iteration `begin_iteration`, any number of `declare_dataset` / `store_chunk` /
/// `set_constant`, and `finish_iteration`. Shapes, datatypes and bounds are checked by the
/// caller before a call is made; a backend only needs to persist.
pub trait Backend: Debug + Send {
    /// Short name used in configuration (`"json"`, `"memory"`).
    fn name(&self) -> &'static str;

    /// File extension substituted for `%E`.
    fn extension(&self) -> &'static str;

    /// Receives the opaque series configuration.
    fn configure(&mut self, _config: &Config) -> Result<()> {
        Ok(())
    }

    fn attach(&mut self, target: &Target) -> Result<()>;

    /// Series metadata as stored (read mode) or as attached (write mode).
    fn series_meta(&self) -> Result<SeriesMeta>;

    fn begin_iteration(&mut self, index: u64) -> Result<()>;

    fn declare_dataset(
        &mut self, index: u64, name: &str, shape: &Shape, datatype: Datatype,
    ) -> Result<()>;

    fn store_chunk(&mut self, index: u64, name: &str, chunk: ChunkRecord) -> Result<()>;

    fn set_constant(&mut self, index: u64, name: &str, value: Scalar) -> Result<()>;

    /// Placements of `name` stored so far in iteration `index` (open or closed).
    fn placements(&self, index: u64, name: &str) -> Result<Vec<Placement>>;

    fn finish_iteration(&mut self, index: u64, meta: &IterationMeta) -> Result<()>;

    /// Drops the open iteration `index` without persisting it.
    fn abandon_iteration(&mut self, _index: u64) -> Result<()> {
        Ok(())
    }

    /// Indices of closed iterations in ascending order.
    fn iterations(&self) -> Result<Vec<u64>>;

    fn read_iteration(&self, index: u64) -> Result<IterationRecord>;
}

/// Looks up a backend by its configuration name.
pub fn backend_by_name(name: &str) -> Result<Box<dyn Backend>> {
    match name {
        "json" => Ok(Box::new(JsonBackend::new())),
        "memory" => Ok(Box::new(MemoryBackend::new())),
        _ => Err(Error::Backend(format!("unknown backend: \"{name}\""))),
    }
}

fn not_open(index: u64) -> Error {
    format!("iteration {index} is not open").into()
}

#[derive(Debug, Default)]
struct MemoryStore {
    meta: SeriesMeta,
    records: BTreeMap<u64, IterationRecord>,
    closed: BTreeSet<u64>,
}

/// In-memory storage shared by all clones of the backend.
///
/// Every participant of an in-process run attaches its own clone; chunks of all participants
/// end up in the same iteration record. An iteration is listed as closed as soon as one
/// participant finishes it; chunks from other participants are still accepted afterwards.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<MemoryStore>>,
    ranks: RankInfo,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T, F>(&self, index: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut IterationRecord) -> Result<T>,
    {
        let mut store = self.store.lock();
        let record = store.records.get_mut(&index).ok_or_else(|| not_open(index))?;
        f(record)
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn extension(&self) -> &'static str {
        "mem"
    }

    fn attach(&mut self, target: &Target) -> Result<()> {
        self.ranks = target.ranks;
        let mut store = self.store.lock();
        if !target.mode.is_read_only() && target.ranks.is_root() {
            store.meta = target.meta.clone();
        }
        Ok(())
    }

    fn series_meta(&self) -> Result<SeriesMeta> {
        Ok(self.store.lock().meta.clone())
    }

    fn begin_iteration(&mut self, index: u64) -> Result<()> {
        self.store.lock().records.entry(index).or_insert_with(|| IterationRecord::new(index));
        Ok(())
    }

    fn declare_dataset(
        &mut self, index: u64, name: &str, shape: &Shape, datatype: Datatype,
    ) -> Result<()> {
        self.with_record(index, |record| record.declare(name, shape, datatype))
    }

    fn store_chunk(&mut self, index: u64, name: &str, chunk: ChunkRecord) -> Result<()> {
        self.with_record(index, |record| record.store_chunk(name, chunk))
    }

    fn set_constant(&mut self, index: u64, name: &str, value: Scalar) -> Result<()> {
        self.with_record(index, |record| record.set_constant(name, value))
    }

    fn placements(&self, index: u64, name: &str) -> Result<Vec<Placement>> {
        self.with_record(index, |record| record.placements(name))
    }

    fn finish_iteration(&mut self, index: u64, meta: &IterationMeta) -> Result<()> {
        let is_root = self.ranks.is_root();
        let mut store = self.store.lock();
        let record = store.records.get_mut(&index).ok_or_else(|| not_open(index))?;
        if is_root {
            record.meta = meta.clone();
        } else {
            for (name, mesh) in &meta.meshes {
                record.meta.meshes.entry(name.clone()).or_insert_with(|| mesh.clone());
            }
        }
        store.closed.insert(index);
        Ok(())
    }

    fn iterations(&self) -> Result<Vec<u64>> {
        Ok(self.store.lock().closed.iter().copied().collect())
    }

    fn read_iteration(&self, index: u64) -> Result<IterationRecord> {
        let store = self.store.lock();
        match store.records.get(&index) {
            Some(record) if store.closed.contains(&index) => Ok(record.clone()),
            _ => fail!("iteration {} has not been written", index),
        }
    }
}

/// Contents of one JSON series file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SeriesFile {
    #[serde(default)]
    series: SeriesMeta,
    iterations: BTreeMap<u64, IterationRecord>,
}

impl SeriesFile {
    /// Adds the iterations of a file written by a higher rank.
    fn merge(&mut self, other: Self) -> Result<()> {
        for (index, record) in other.iterations {
            match self.iterations.get_mut(&index) {
                Some(existing) => existing.merge(record)?,
                None => {
                    self.iterations.insert(index, record);
                }
            }
        }
        Ok(())
    }
}

/// Directory holding the per-rank files written in place of `path` by a parallel run.
fn parallel_dir(path: &Path) -> PathBuf {
    let mut dir = path.as_os_str().to_owned();
    dir.push(".parallel");
    PathBuf::from(dir)
}

/// Rank files present in the parallel directory of `path`, by rank.
fn rank_files(path: &Path) -> Result<BTreeMap<usize, PathBuf>> {
    let dir = parallel_dir(path);
    let mut files = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let rank = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_prefix("rank_"))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(rank) = rank {
            files.insert(rank, entry.path());
        }
    }
    Ok(files)
}

/// Writes every closed iteration as JSON.
///
/// With `%T` in the series pattern each iteration gets its own file; otherwise one file
/// holds all iterations and is rewritten on every close. Reads `json.pretty` (default
/// `true`) from the configuration.
///
/// With several participants every rank writes its own file into a directory next to the
/// serial file name:
///
/// ```text
/// diags/data_000010.json.parallel/rank_0.json
/// diags/data_000010.json.parallel/rank_1.json
/// ```
///
/// Reading merges the rank files of an iteration in rank order; series and iteration
/// metadata come from the lowest rank.
#[derive(Debug)]
pub struct JsonBackend {
    pattern: Option<Pattern>,
    mode: OpenMode,
    ranks: RankInfo,
    meta: SeriesMeta,
    pretty: bool,
    open: Option<IterationRecord>,
    files: BTreeMap<u64, PathBuf>,
    single: BTreeMap<u64, IterationRecord>,
}

impl Default for JsonBackend {
    fn default() -> Self {
        Self {
            pattern: None,
            mode: OpenMode::Create,
            ranks: RankInfo::serial(),
            meta: SeriesMeta::default(),
            pretty: true,
            open: None,
            files: BTreeMap::new(),
            single: BTreeMap::new(),
        }
    }
}

impl JsonBackend {
    pub const EXTENSION: &'static str = "json";

    pub fn new() -> Self {
        Self::default()
    }

    fn pattern(&self) -> Result<&Pattern> {
        self.pattern.as_ref().ok_or_else(|| Error::from("json backend is not attached"))
    }

    fn open_record(&mut self, index: u64) -> Result<&mut IterationRecord> {
        match self.open {
            Some(ref mut record) if record.index == index => Ok(record),
            _ => Err(not_open(index)),
        }
    }

    /// The file this participant writes in place of `path`.
    fn output_path(&self, path: &Path) -> PathBuf {
        if self.ranks.is_serial() {
            path.to_owned()
        } else {
            parallel_dir(path).join(format!("rank_{}.{}", self.ranks.rank(), Self::EXTENSION))
        }
    }

    fn write_file(&self, path: &Path, file: &SeriesFile) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, file)?;
        } else {
            serde_json::to_writer(&mut writer, file)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!(path = %path.display(), iterations = file.iterations.len(), "wrote series file");
        Ok(())
    }

    fn read_file(path: &Path) -> Result<SeriesFile> {
        let file = File::open(path)
            .map_err(|e| Error::Backend(format!("cannot open {}: {e}", path.display())))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Reads the serial file at `path`, or merges the rank files written in its place.
    fn load(path: &Path) -> Result<SeriesFile> {
        if path.is_file() {
            return Self::read_file(path);
        }
        let mut merged: Option<SeriesFile> = None;
        for rank_file in rank_files(path)?.values() {
            let file = Self::read_file(rank_file)?;
            match merged {
                Some(ref mut acc) => acc.merge(file)?,
                None => merged = Some(file),
            }
        }
        merged.ok_or_else(|| Error::Backend(format!("cannot open {}: not found", path.display())))
    }

    /// Serial file names of a file-based pattern that have been written, by iteration index.
    fn scan(pattern: &Pattern) -> Result<BTreeMap<u64, PathBuf>> {
        let dir = pattern.directory(Self::EXTENSION);
        let mut files = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(files);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            let serial = name.strip_suffix(".parallel").unwrap_or(name);
            if let Some(index) = pattern.match_file_name(serial, Self::EXTENSION) {
                let path = dir.join(serial);
                if path.is_file() || !rank_files(&path)?.is_empty() {
                    files.insert(index, path);
                }
            }
        }
        Ok(files)
    }

    /// Existing files this participant would overwrite: its own rank files and, on the root,
    /// serial files and rank files of ranks beyond the current participant count.
    fn existing_files(pattern: &Pattern, ranks: RankInfo) -> Result<Vec<PathBuf>> {
        let serial: Vec<PathBuf> = if pattern.is_file_based() {
            Self::scan(pattern)?.into_values().collect()
        } else {
            vec![pattern.expand_series(Self::EXTENSION)]
        };
        let mut files = Vec::new();
        for path in serial {
            if ranks.is_root() && path.is_file() {
                files.push(path.clone());
            }
            for (rank, rank_file) in rank_files(&path)? {
                if rank == ranks.rank() || (ranks.is_root() && rank >= ranks.size()) {
                    files.push(rank_file);
                }
            }
        }
        Ok(files)
    }
}

impl Backend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        Self::EXTENSION
    }

    fn configure(&mut self, config: &Config) -> Result<()> {
        if let Some(pretty) = config.get("json.pretty") {
            self.pretty = pretty
                .as_bool()
                .ok_or_else(|| Error::Backend(format!("json.pretty must be a bool: {pretty}")))?;
        }
        Ok(())
    }

    fn attach(&mut self, target: &Target) -> Result<()> {
        let pattern = target.pattern.clone();
        self.mode = target.mode;
        self.ranks = target.ranks;
        self.meta = target.meta.clone();
        match target.mode {
            OpenMode::Read if pattern.is_file_based() => {
                self.files = Self::scan(&pattern)?;
                if let Some(path) = self.files.values().next() {
                    self.meta = Self::load(path)?.series;
                }
            }
            OpenMode::Read => {
                let path = pattern.expand_series(Self::EXTENSION);
                let file = Self::load(&path)?;
                self.meta = file.series;
                self.files = file.iterations.keys().map(|&i| (i, path.clone())).collect();
            }
            OpenMode::CreateExcl => {
                if !Self::existing_files(&pattern, target.ranks)?.is_empty() {
                    return Err(Error::Backend(format!("series {pattern} already exists")));
                }
            }
            OpenMode::Create => {
                for path in Self::existing_files(&pattern, target.ranks)? {
                    fs::remove_file(&path)?;
                    debug!(path = %path.display(), "removed existing series file");
                }
            }
        }
        debug!(
            pattern = %pattern,
            mode = ?target.mode,
            ranks = %target.ranks,
            "attached json backend"
        );
        self.pattern = Some(pattern);
        Ok(())
    }

    fn series_meta(&self) -> Result<SeriesMeta> {
        Ok(self.meta.clone())
    }

    fn begin_iteration(&mut self, index: u64) -> Result<()> {
        ensure!(!self.mode.is_read_only(), "json series is open read-only");
        if let Some(ref record) = self.open {
            ensure!(record.index == index, "iteration {} is still open", record.index);
            return Ok(());
        }
        self.open = Some(IterationRecord::new(index));
        Ok(())
    }

    fn declare_dataset(
        &mut self, index: u64, name: &str, shape: &Shape, datatype: Datatype,
    ) -> Result<()> {
        self.open_record(index)?.declare(name, shape, datatype)
    }

    fn store_chunk(&mut self, index: u64, name: &str, chunk: ChunkRecord) -> Result<()> {
        self.open_record(index)?.store_chunk(name, chunk)
    }

    fn set_constant(&mut self, index: u64, name: &str, value: Scalar) -> Result<()> {
        self.open_record(index)?.set_constant(name, value)
    }

    fn placements(&self, index: u64, name: &str) -> Result<Vec<Placement>> {
        match self.open {
            Some(ref record) if record.index == index => record.placements(name),
            _ => self.read_iteration(index)?.placements(name),
        }
    }

    fn finish_iteration(&mut self, index: u64, meta: &IterationMeta) -> Result<()> {
        let mut record = match self.open.take() {
            Some(record) if record.index == index => record,
            other => {
                self.open = other;
                return Err(not_open(index));
            }
        };
        record.meta = meta.clone();
        let pattern = self.pattern()?.clone();
        let path = pattern.expand(index, Self::EXTENSION);
        let file = if pattern.is_file_based() {
            let mut iterations = BTreeMap::new();
            iterations.insert(index, record);
            SeriesFile { series: self.meta.clone(), iterations }
        } else {
            self.single.insert(index, record);
            SeriesFile { series: self.meta.clone(), iterations: self.single.clone() }
        };
        self.write_file(&self.output_path(&path), &file)?;
        self.files.insert(index, path);
        Ok(())
    }

    fn abandon_iteration(&mut self, index: u64) -> Result<()> {
        if self.open.as_ref().map_or(false, |record| record.index == index) {
            self.open = None;
            debug!(iteration = index, "abandoned iteration");
        }
        Ok(())
    }

    fn iterations(&self) -> Result<Vec<u64>> {
        Ok(self.files.keys().copied().collect())
    }

    fn read_iteration(&self, index: u64) -> Result<IterationRecord> {
        if let Some(record) = self.single.get(&index) {
            return Ok(record.clone());
        }
        let path = match self.files.get(&index) {
            Some(path) => path,
            None => fail!("iteration {} has not been written", index),
        };
        let mut file = Self::load(path)?;
        file.iterations
            .remove(&index)
            .ok_or_else(|| Error::Backend(format!("{} has no iteration {index}", path.display())))
    }
}
