use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use ndarray::ShapeError;

use crate::hl::tiling::TilingError;

/// The error type for partitioning, snapshot and storage functions.
///
/// Every variant describes a caller logic defect or a storage failure; none of them is
/// transient, so retrying the same call will fail the same way.
#[derive(Clone, PartialEq)]
pub enum Error {
    /// A dataset was re-declared within a snapshot with a different shape or datatype.
    ShapeConflict { dataset: String, declared: String, requested: String },
    /// A dataset was looked up (or written) before it was declared.
    UnknownDataset(String),
    /// A rank index, rank count, split dimension or explicit block is not usable.
    InvalidPartition(String),
    /// A set of placements does not tile its shape exactly once.
    Tiling(TilingError),
    /// The storage backend or the configuration source failed.
    Backend(String),
    /// A user error occurred in the high-level API (e.g., writing to a closed iteration).
    Internal(String),
}

/// A type for results generated by this crate where the `Err` type is set to
/// `meshpart::Error`.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

impl Error {
    pub(crate) fn shape_conflict<A: fmt::Display, B: fmt::Display>(
        dataset: &str, declared: A, requested: B,
    ) -> Self {
        Self::ShapeConflict {
            dataset: dataset.to_owned(),
            declared: declared.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Returns the tiling report if this is a tiling error.
    pub fn as_tiling(&self) -> Option<&TilingError> {
        match self {
            Self::Tiling(ref err) => Some(err),
            _ => None,
        }
    }

    pub fn is_shape_conflict(&self) -> bool {
        matches!(self, Self::ShapeConflict { .. })
    }

    pub fn is_unknown_dataset(&self) -> bool {
        matches!(self, Self::UnknownDataset(_))
    }

    pub fn is_invalid_partition(&self) -> bool {
        matches!(self, Self::InvalidPartition(_))
    }

    pub fn is_tiling(&self) -> bool {
        matches!(self, Self::Tiling(_))
    }
}

impl From<&str> for Error {
    fn from(desc: &str) -> Self {
        Self::Internal(desc.into())
    }
}

impl From<String> for Error {
    fn from(desc: String) -> Self {
        Self::Internal(desc)
    }
}

impl From<Infallible> for Error {
    fn from(_: Infallible) -> Self {
        unreachable!("Infallible error can never be constructed")
    }
}

impl From<TilingError> for Error {
    fn from(err: TilingError) -> Self {
        Self::Tiling(err)
    }
}

impl From<ShapeError> for Error {
    fn from(err: ShapeError) -> Self {
        format!("shape error: {err}").into()
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Backend(format!("i/o error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("json error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Backend(format!("toml error: {err}"))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::ShapeConflict { ref dataset, ref declared, ref requested } => write!(
                f,
                "shape conflict: dataset \"{dataset}\" is declared as {declared}, got {requested}"
            ),
            Self::UnknownDataset(ref name) => write!(f, "unknown dataset: \"{name}\""),
            Self::InvalidPartition(ref desc) => write!(f, "invalid partition: {desc}"),
            Self::Tiling(ref err) => write!(f, "tiling error: {err}"),
            Self::Backend(ref desc) => write!(f, "backend error: {desc}"),
            Self::Internal(ref desc) => f.write_str(desc),
        }
    }
}

impl StdError for Error {}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        Self::new(io::ErrorKind::Other, err)
    }
}
