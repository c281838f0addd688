//! Typed buffers and the records a backend stores per iteration.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::hl::record::IterationMeta;
use crate::internal_prelude::*;

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    F32,
    F64,
    I32,
    I64,
    U32,
    U64,
}

impl Datatype {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// A scalar type that can be stored in a dataset.
pub trait Element: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const DATATYPE: Datatype;

    fn into_buffer(data: ArrayD<Self>) -> Buffer;

    fn from_buffer(buffer: &Buffer) -> Option<&ArrayD<Self>>;

    fn into_scalar(self) -> Scalar;

    fn from_scalar(scalar: &Scalar) -> Option<Self>;
}

/// A multi-dimensional array of one of the supported element types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "array", rename_all = "lowercase")]
pub enum Buffer {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
}

/// A single value of one of the supported element types.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DATATYPE: Datatype = Datatype::$variant;

            fn into_buffer(data: ArrayD<Self>) -> Buffer {
                Buffer::$variant(data)
            }

            fn from_buffer(buffer: &Buffer) -> Option<&ArrayD<Self>> {
                match buffer {
                    Buffer::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }

            fn from_scalar(scalar: &Scalar) -> Option<Self> {
                match *scalar {
                    Scalar::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u32, U32);
impl_element!(u64, U64);

macro_rules! each_buffer {
    ($buffer:expr, $data:ident => $body:expr) => {
        match $buffer {
            Buffer::F32($data) => $body,
            Buffer::F64($data) => $body,
            Buffer::I32($data) => $body,
            Buffer::I64($data) => $body,
            Buffer::U32($data) => $body,
            Buffer::U64($data) => $body,
        }
    };
}

impl Buffer {
    pub fn new<T: Element>(data: ArrayD<T>) -> Self {
        T::into_buffer(data)
    }

    pub fn datatype(&self) -> Datatype {
        match self {
            Self::F32(_) => Datatype::F32,
            Self::F64(_) => Datatype::F64,
            Self::I32(_) => Datatype::I32,
            Self::I64(_) => Datatype::I64,
            Self::U32(_) => Datatype::U32,
            Self::U64(_) => Datatype::U64,
        }
    }

    pub fn shape(&self) -> &[Ix] {
        each_buffer!(self, data => data.shape())
    }

    pub fn len(&self) -> usize {
        each_buffer!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::from_buffer(self)
    }
}

impl Scalar {
    pub fn new<T: Element>(value: T) -> Self {
        value.into_scalar()
    }

    pub fn datatype(&self) -> Datatype {
        match self {
            Self::F32(_) => Datatype::F32,
            Self::F64(_) => Datatype::F64,
            Self::I32(_) => Datatype::I32,
            Self::I64(_) => Datatype::I64,
            Self::U32(_) => Datatype::U32,
            Self::U64(_) => Datatype::U64,
        }
    }

    pub fn get<T: Element>(&self) -> Option<T> {
        T::from_scalar(self)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
        }
    }
}

/// One stored block of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub placement: Placement,
    /// Rank of the participant that stored the chunk.
    pub rank: usize,
    pub data: Buffer,
}

impl ChunkRecord {
    /// Fails unless the buffer shape equals the placement extent.
    pub fn new(placement: Placement, rank: usize, data: Buffer) -> Result<Self> {
        ensure!(
            data.shape() == placement.extent(),
            "buffer shape {:?} != placement extent {:?}",
            data.shape(),
            placement.extent()
        );
        Ok(Self { placement, rank, data })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub shape: Shape,
    pub datatype: Datatype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Scalar>,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
}

impl DatasetRecord {
    pub fn new(shape: Shape, datatype: Datatype) -> Self {
        Self { shape, datatype, constant: None, chunks: Vec::new() }
    }

    /// Stored placements in storage order.
    pub fn placements(&self) -> Vec<Placement> {
        self.chunks.iter().map(|chunk| chunk.placement.clone()).collect()
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    fn check_datatype(&self, name: &str, datatype: Datatype) -> Result<()> {
        if datatype != self.datatype {
            return Err(Error::shape_conflict(
                name,
                format!("{} {}", self.shape, self.datatype),
                format!("{} {}", self.shape, datatype),
            ));
        }
        Ok(())
    }
}

/// Everything stored for one iteration: metadata and datasets by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u64,
    #[serde(default)]
    pub meta: IterationMeta,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetRecord>,
}

impl IterationRecord {
    pub fn new(index: u64) -> Self {
        Self { index, ..Self::default() }
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetRecord> {
        self.datasets.get(name).ok_or_else(|| Error::UnknownDataset(name.to_owned()))
    }

    fn dataset_mut(&mut self, name: &str) -> Result<&mut DatasetRecord> {
        self.datasets.get_mut(name).ok_or_else(|| Error::UnknownDataset(name.to_owned()))
    }

    /// Adds a dataset; re-declaring with the same shape and datatype is a no-op.
    pub fn declare(&mut self, name: &str, shape: &Shape, datatype: Datatype) -> Result<()> {
        if let Some(dataset) = self.datasets.get(name) {
            if dataset.shape != *shape {
                return Err(Error::shape_conflict(name, &dataset.shape, shape));
            }
            return dataset.check_datatype(name, datatype);
        }
        self.datasets.insert(name.to_owned(), DatasetRecord::new(shape.clone(), datatype));
        Ok(())
    }

    /// Appends a chunk after checking its datatype and bounds against the dataset.
    pub fn store_chunk(&mut self, name: &str, chunk: ChunkRecord) -> Result<()> {
        let dataset = self.dataset_mut(name)?;
        dataset.check_datatype(name, chunk.data.datatype())?;
        if !chunk.placement.fits(&dataset.shape) {
            bad_partition!(
                "block {} does not fit dataset \"{}\" of shape {}",
                chunk.placement,
                name,
                dataset.shape
            );
        }
        ensure!(
            chunk.data.shape() == chunk.placement.extent(),
            "buffer shape {:?} != placement extent {:?}",
            chunk.data.shape(),
            chunk.placement.extent()
        );
        dataset.chunks.push(chunk);
        Ok(())
    }

    pub fn set_constant(&mut self, name: &str, value: Scalar) -> Result<()> {
        let dataset = self.dataset_mut(name)?;
        dataset.check_datatype(name, value.datatype())?;
        dataset.constant = Some(value);
        Ok(())
    }

    /// Adds the datasets of `other`, the same iteration as written by another participant.
    ///
    /// Metadata of `self` is kept; meshes only described by `other` are added. Chunks are
    /// appended after the ones already stored.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        ensure!(
            other.index == self.index,
            "cannot merge iteration {} into iteration {}",
            other.index,
            self.index
        );
        for (name, mesh) in other.meta.meshes {
            self.meta.meshes.entry(name).or_insert(mesh);
        }
        for (name, dataset) in other.datasets {
            self.declare(&name, &dataset.shape, dataset.datatype)?;
            if let Some(value) = dataset.constant {
                self.set_constant(&name, value)?;
            }
            for chunk in dataset.chunks {
                self.store_chunk(&name, chunk)?;
            }
        }
        Ok(())
    }

    /// Stored placements of `name` in storage order.
    pub fn placements(&self, name: &str) -> Result<Vec<Placement>> {
        Ok(self.dataset(name)?.placements())
    }

    /// Builds the global array of `name`. A constant dataset is filled with its value;
    /// otherwise every chunk is copied to its placement over a default-filled array.
    pub fn assemble<T: Element>(&self, name: &str) -> Result<ArrayD<T>> {
        let dataset = self.dataset(name)?;
        ensure!(
            dataset.datatype == T::DATATYPE,
            "dataset \"{}\" has datatype {}, requested {}",
            name,
            dataset.datatype,
            T::DATATYPE
        );
        let dim = IxDyn(&dataset.shape);
        if let Some(ref constant) = dataset.constant {
            let value = T::from_scalar(constant)
                .ok_or_else(|| Error::from(format!("constant {constant} is not {}", T::DATATYPE)))?;
            return Ok(ArrayD::from_elem(dim, value));
        }
        let mut global = ArrayD::from_elem(dim, T::default());
        for chunk in &dataset.chunks {
            let data = T::from_buffer(&chunk.data)
                .ok_or_else(|| Error::from(format!("chunk of \"{name}\" has the wrong datatype")))?;
            if !chunk.placement.fits(&dataset.shape) {
                return Err(Error::Backend(format!(
                    "stored chunk {} of \"{name}\" does not fit shape {}",
                    chunk.placement, dataset.shape
                )));
            }
            if data.shape() != chunk.placement.extent() {
                return Err(Error::Backend(format!(
                    "stored chunk {} of \"{name}\" holds data of shape {:?}",
                    chunk.placement,
                    data.shape()
                )));
            }
            let info = chunk.placement.slice_info()?;
            global.slice_mut(&info).assign(data);
        }
        Ok(global)
    }
}

#[cfg(test)]
pub mod tests {
    use ndarray::{arr1, arr2, ArrayD, IxDyn};

    use super::{Buffer, ChunkRecord, Datatype, Element, IterationRecord, Scalar};
    use crate::internal_prelude::*;

    fn chunk<T: Element>(offset: &[Ix], data: ArrayD<T>) -> ChunkRecord {
        let placement = Placement::new(offset.to_vec(), data.shape().to_vec()).unwrap();
        ChunkRecord::new(placement, 0, Buffer::new(data)).unwrap()
    }

    #[test]
    pub fn test_buffer_scalar() {
        let b = Buffer::new(arr2(&[[1i32, 2], [3, 4]]).into_dyn());
        assert_eq!(b.datatype(), Datatype::I32);
        assert_eq!(b.shape(), &[2, 2]);
        assert_eq!(b.len(), 4);
        assert!(b.as_array::<i32>().is_some());
        assert!(b.as_array::<f64>().is_none());

        let s = Scalar::new(273.15f64);
        assert_eq!(s.datatype(), Datatype::F64);
        assert_eq!(s.get::<f64>(), Some(273.15));
        assert_eq!(s.get::<f32>(), None);
        assert_eq!(s.to_string(), "273.15");
        assert_eq!(Datatype::U64.to_string(), "u64");
        assert_eq!(Datatype::F32.size(), 4);
    }

    #[test]
    pub fn test_chunk_record() {
        let p = Placement::new([0], [3]).unwrap();
        let data = Buffer::new(arr1(&[1.0f32, 2.0]).into_dyn());
        assert_err!(ChunkRecord::new(p, 0, data), "buffer shape [2] != placement extent [3]");
    }

    #[test]
    pub fn test_declare_and_store() {
        let mut it = IterationRecord::new(3);
        let shape = Shape::new([4]).unwrap();
        it.declare("x", &shape, Datatype::F64).unwrap();
        it.declare("x", &shape, Datatype::F64).unwrap();
        let err = it.declare("x", &Shape::new([5]).unwrap(), Datatype::F64).unwrap_err();
        assert!(err.is_shape_conflict());
        assert_err!(it.declare("x", &shape, Datatype::F32), "declared as (4,) f64, got (4,) f32");

        let err = it.store_chunk("y", chunk(&[0], arr1(&[1.0f64]).into_dyn())).unwrap_err();
        assert!(err.is_unknown_dataset());
        let err = it.store_chunk("x", chunk(&[0], arr1(&[1i64]).into_dyn())).unwrap_err();
        assert!(err.is_shape_conflict());
        let err = it.store_chunk("x", chunk(&[3], arr1(&[1.0f64, 2.0]).into_dyn())).unwrap_err();
        assert!(err.is_invalid_partition());

        it.store_chunk("x", chunk(&[2], arr1(&[3.0f64, 4.0]).into_dyn())).unwrap();
        it.store_chunk("x", chunk(&[0], arr1(&[1.0f64, 2.0]).into_dyn())).unwrap();
        assert_eq!(
            it.placements("x").unwrap(),
            vec![Placement::new([2], [2]).unwrap(), Placement::new([0], [2]).unwrap()]
        );
        assert_eq!(it.assemble::<f64>("x").unwrap(), arr1(&[1.0, 2.0, 3.0, 4.0]).into_dyn());
        assert_err!(it.assemble::<f32>("x"), "has datatype f64, requested f32");
    }

    #[test]
    pub fn test_assemble_2d_and_constant() {
        let mut it = IterationRecord::new(0);
        it.declare("rho", &Shape::new([2, 3]).unwrap(), Datatype::I32).unwrap();
        it.store_chunk("rho", chunk(&[0, 0], arr2(&[[1, 2], [4, 5]]).into_dyn())).unwrap();
        it.store_chunk("rho", chunk(&[0, 2], arr2(&[[3], [6]]).into_dyn())).unwrap();
        assert_eq!(it.assemble::<i32>("rho").unwrap(), arr2(&[[1, 2, 3], [4, 5, 6]]).into_dyn());

        it.declare("T", &Shape::new([3, 3]).unwrap(), Datatype::F64).unwrap();
        assert_err!(it.set_constant("T", Scalar::new(1u32)), "shape conflict");
        it.set_constant("T", Scalar::new(273.15f64)).unwrap();
        assert!(it.dataset("T").unwrap().is_constant());
        assert_eq!(
            it.assemble::<f64>("T").unwrap(),
            ArrayD::from_elem(IxDyn(&[3, 3]), 273.15)
        );
    }

    #[test]
    pub fn test_record_json() {
        let mut it = IterationRecord::new(7);
        it.declare("x", &Shape::new([2]).unwrap(), Datatype::U32).unwrap();
        it.store_chunk("x", chunk(&[0], arr1(&[5u32, 6]).into_dyn())).unwrap();
        let text = serde_json::to_string(&it).unwrap();
        assert!(text.contains("\"datatype\":\"u32\""));
        let back: IterationRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, it);
    }

    #[test]
    pub fn test_merge_participants() {
        let shape = Shape::new([4]).unwrap();
        let mut root = IterationRecord::new(2);
        root.meta.time = 1.0;
        root.declare("x", &shape, Datatype::I32).unwrap();
        root.store_chunk("x", chunk(&[0], arr1(&[1, 2]).into_dyn())).unwrap();

        let mut other = IterationRecord::new(2);
        other.meta.time = 9.0;
        other.meta.meshes.insert("x".into(), Default::default());
        other.declare("x", &shape, Datatype::I32).unwrap();
        other.store_chunk("x", chunk(&[2], arr1(&[3, 4]).into_dyn())).unwrap();
        other.declare("c", &shape, Datatype::F32).unwrap();
        other.set_constant("c", Scalar::new(0.5f32)).unwrap();

        root.merge(other.clone()).unwrap();
        assert_eq!(root.meta.time, 1.0);
        assert!(root.meta.meshes.contains_key("x"));
        assert_eq!(root.assemble::<i32>("x").unwrap(), arr1(&[1, 2, 3, 4]).into_dyn());
        assert_eq!(root.assemble::<f32>("c").unwrap(), arr1(&[0.5f32; 4]).into_dyn());

        let mut later = IterationRecord::new(3);
        assert_err!(later.merge(other), "cannot merge iteration 2 into iteration 3");

        let mut conflicting = IterationRecord::new(2);
        conflicting.declare("x", &Shape::new([5]).unwrap(), Datatype::I32).unwrap();
        let mut again = IterationRecord::new(2);
        again.declare("x", &shape, Datatype::I32).unwrap();
        assert!(again.merge(conflicting).unwrap_err().is_shape_conflict());
    }

    #[test]
    pub fn test_assemble_rejects_corrupt_chunks() {
        let chunk = |offset: Ix, data: &str| {
            format!(r#"{{"placement":{{"offset":[{offset}],"extent":[2]}},"rank":0,"data":{data}}}"#)
        };
        let record = |chunk: String| {
            let text = format!(
                r#"{{"index":0,"datasets":{{"x":{{"shape":[3],"datatype":"f64","chunks":[{chunk}]}}}}}}"#
            );
            serde_json::from_str::<IterationRecord>(&text).unwrap()
        };
        let good = Buffer::new(arr1(&[1.0f64, 2.0]).into_dyn());
        let good = serde_json::to_string(&good).unwrap();
        let three = Buffer::new(arr1(&[1.0f64, 2.0, 3.0]).into_dyn());
        let three = serde_json::to_string(&three).unwrap();

        let outside = record(chunk(2, &good));
        let err = outside.assemble::<f64>("x").unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(err.to_string().contains("does not fit shape (3,)"));

        let mismatched = record(chunk(0, &three));
        assert_err!(mismatched.assemble::<f64>("x"), "holds data of shape [3]");

        let fine = record(chunk(1, &good));
        assert_eq!(fine.assemble::<f64>("x").unwrap(), arr1(&[0.0, 1.0, 2.0]).into_dyn());
    }
}
