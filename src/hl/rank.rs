use std::fmt::{self, Display};

use crate::internal_prelude::*;

/// Rank index and rank count of one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RankInfo {
    rank: usize,
    size: usize,
}

impl RankInfo {
    /// Fails with `InvalidPartition` unless `rank < size`.
    pub fn new(rank: usize, size: usize) -> Result<Self> {
        if size == 0 {
            bad_partition!("rank count must be positive");
        }
        if rank >= size {
            bad_partition!("rank index {} is outside [0, {})", rank, size);
        }
        Ok(Self { rank, size })
    }

    /// A single participant.
    pub fn serial() -> Self {
        Self { rank: 0, size: 1 }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    pub fn is_serial(&self) -> bool {
        self.size == 1
    }
}

impl Default for RankInfo {
    fn default() -> Self {
        Self::serial()
    }
}

impl Display for RankInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.rank, self.size)
    }
}

/// Source of the rank index and rank count, e.g. a process coordination layer.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn rank_info(&self) -> Result<RankInfo> {
        RankInfo::new(self.rank(), self.size())
    }
}

impl Communicator for RankInfo {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(feature = "mpio")]
pub use self::mpi::MpiWorld;

#[cfg(feature = "mpio")]
mod mpi {
    use std::os::raw::c_int;
    use std::ptr;

    use mpi_sys::{
        MPI_Barrier, MPI_Comm, MPI_Comm_rank, MPI_Comm_size, MPI_Init, MPI_Initialized,
        RSMPI_COMM_WORLD,
    };

    use super::Communicator;
    use crate::internal_prelude::*;

    /// The `MPI_COMM_WORLD` communicator.
    #[derive(Clone, Copy, Debug)]
    pub struct MpiWorld {
        comm: MPI_Comm,
        rank: usize,
        size: usize,
    }

    impl MpiWorld {
        /// Initializes MPI unless already done and queries rank and size of the world.
        pub fn init() -> Result<Self> {
            let mut initialized: c_int = 1;
            unsafe { MPI_Initialized(&mut initialized) };
            if initialized == 0 {
                unsafe { MPI_Init(ptr::null_mut(), ptr::null_mut()) };
            }
            let comm = unsafe { RSMPI_COMM_WORLD };
            let (mut rank, mut size): (c_int, c_int) = (-1, -1);
            unsafe {
                MPI_Comm_rank(comm, &mut rank);
                MPI_Comm_size(comm, &mut size);
            }
            let rank = usize::try_from(rank)
                .map_err(|_| Error::InvalidPartition(format!("negative MPI rank: {rank}")))?;
            let size = usize::try_from(size)
                .map_err(|_| Error::InvalidPartition(format!("negative MPI size: {size}")))?;
            tracing::debug!(rank, size, "attached to MPI_COMM_WORLD");
            Ok(Self { comm, rank, size })
        }

        /// Blocks until all participants reach the barrier.
        pub fn barrier(&self) {
            unsafe { MPI_Barrier(self.comm) };
        }

        pub fn comm(&self) -> MPI_Comm {
            self.comm
        }
    }

    impl Communicator for MpiWorld {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::{Communicator, RankInfo};

    #[test]
    pub fn test_rank_info() {
        let r = RankInfo::new(2, 4).unwrap();
        assert_eq!((r.rank(), r.size()), (2, 4));
        assert!(!r.is_root() && !r.is_serial());
        assert_eq!(r.to_string(), "2/4");
        assert_eq!(RankInfo::default(), RankInfo::serial());
        assert!(RankInfo::serial().is_root());

        assert!(RankInfo::new(4, 4).unwrap_err().is_invalid_partition());
        assert_err!(RankInfo::new(0, 0), "rank count must be positive");
    }

    #[test]
    pub fn test_communicator() {
        struct Fixed(usize, usize);

        impl Communicator for Fixed {
            fn rank(&self) -> usize {
                self.0
            }

            fn size(&self) -> usize {
                self.1
            }
        }

        assert_eq!(Fixed(1, 3).rank_info().unwrap(), RankInfo::new(1, 3).unwrap());
        assert!(Fixed(3, 3).rank_info().is_err());
        assert_eq!(RankInfo::new(0, 2).unwrap().rank_info().unwrap().size(), 2);
    }
}
