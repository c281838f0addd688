//! Domain-partitioned structured arrays for particle-mesh simulation snapshots.
//!
//! Every participant of a distributed computation owns one contiguous block of each global
//! dataset. This crate declares the global shapes, computes each participant's placement
//! (offset and extent) inside them, and checks that the placements of all participants tile
//! every shape exactly once. Around that core it provides a series of sequence-numbered
//! iterations written through a pluggable storage backend:
//!
//! - Placement by near-equal blocks along one axis, caller-supplied (possibly empty) blocks,
//!   or a regular chunk grid distributed across participants.
//! - Tiling validation reporting the offending dimension, participant pair and index.
//! - Iteration lifecycle where a closed iteration can never be reopened.
//! - In-memory and JSON storage backends, configured with opaque JSON or TOML text.
//! - Mesh metadata (axis labels, grid spacing, offsets, SI units) and constant datasets.
//!
//! The `mpio` feature provides rank index and count of `MPI_COMM_WORLD` via `mpi-sys`.

#![cfg_attr(feature = "cargo-clippy", warn(clippy::pedantic))]
#![cfg_attr(feature = "cargo-clippy", warn(clippy::nursery))]
#![cfg_attr(feature = "cargo-clippy", warn(clippy::all))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_possible_truncation))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_possible_wrap))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_precision_loss))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::module_name_repetitions))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::missing_errors_doc))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::missing_panics_doc))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::must_use_candidate))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::wildcard_imports))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::return_self_not_must_use))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::missing_const_for_fn))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::option_if_let_else))]
#![cfg_attr(not(test), allow(dead_code))]

mod export {
    pub use crate::{
        dim::{Dimension, Ix},
        error::{Error, Result},
        hl::{
            Backend, BaseUnit, Buffer, ChunkRecord, Communicator, Config, DatasetRecord,
            DatasetState, Datatype, Element, Iteration, IterationMeta, IterationRecord,
            JsonBackend, MemoryBackend, MeshMeta, OpenMode, Partition, Pattern, Placement,
            RankInfo, Scalar, Series, SeriesBuilder, SeriesMeta, Shape, ShapeRegistry,
            SnapshotState, Target, TilingError, TilingErrorKind, UnitDimension,
        },
    };

    #[cfg(feature = "mpio")]
    pub use crate::hl::MpiWorld;

    pub mod partition {
        pub use crate::hl::partition::{
            chunk_grid, compute_block, compute_blocks, distribute_chunks, explicit_block,
            Partition,
        };
    }

    pub mod tiling {
        pub use crate::hl::tiling::{validate, TilingError, TilingErrorKind};
    }

    pub mod backend {
        pub use crate::hl::backend::{
            backend_by_name, Backend, JsonBackend, MemoryBackend, OpenMode, Target,
        };
    }
}

pub use crate::export::*;

#[macro_use]
mod macros;

mod dim;
mod error;
mod hl;

mod internal_prelude {
    pub use crate::{
        dim::{Dimension, Ix},
        error::{Error, Result},
        hl::{placement::Placement, shape::Shape},
    };
}
