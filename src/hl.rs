pub mod backend;
pub mod config;
pub mod partition;
pub mod pattern;
pub mod placement;
pub mod rank;
pub mod record;
pub mod registry;
pub mod series;
pub mod shape;
pub mod storage;
pub mod tiling;

pub use self::{
    backend::{Backend, JsonBackend, MemoryBackend, OpenMode, Target},
    config::Config,
    partition::Partition,
    pattern::Pattern,
    placement::Placement,
    rank::{Communicator, RankInfo},
    record::{BaseUnit, IterationMeta, MeshMeta, SeriesMeta, UnitDimension},
    registry::{DatasetState, ShapeRegistry},
    series::{Iteration, Series, SeriesBuilder, SnapshotState},
    shape::Shape,
    storage::{Buffer, ChunkRecord, DatasetRecord, Datatype, Element, IterationRecord, Scalar},
    tiling::{TilingError, TilingErrorKind},
};

#[cfg(feature = "mpio")]
pub use self::rank::MpiWorld;
