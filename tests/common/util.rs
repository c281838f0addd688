use meshpart::{MemoryBackend, RankInfo, Series};

use super::gen::gen_ascii;

pub fn random_filename() -> String {
    gen_ascii(&mut rand::thread_rng(), 8)
}

/// Opens a memory series as participant `rank` of `size`, sharing storage with `backend`.
pub fn memory_series(backend: &MemoryBackend, rank: usize, size: usize) -> Series {
    Series::with_options()
        .participants(RankInfo::new(rank, size).unwrap())
        .backend(backend.clone())
        .create(&format!("{}_%T", random_filename()))
        .unwrap()
}
