use std::sync::{Arc, Barrier};
use std::thread;

use ndarray::{s, Array2, ArrayD};
use pretty_assertions::assert_eq;
use rand::prelude::{SeedableRng, SmallRng};

use meshpart::partition::compute_block;
use meshpart::{
    tiling, BaseUnit, Config, DatasetState, MemoryBackend, OpenMode, Partition, Placement,
    RankInfo, Series, Shape, SnapshotState, UnitDimension,
};

#[macro_use]
mod common;

use self::common::gen::gen_arr;
use self::common::util::memory_series;

fn heat(shape: (usize, usize), step: u64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(i, j)| (i * shape.1 + j) as f64 + step as f64 * 0.5)
}

#[test]
fn test_parallel_block_write() {
    const RANKS: usize = 4;
    let backend = MemoryBackend::new();
    let barrier = Arc::new(Barrier::new(RANKS));
    let global = heat((23, 5), 0);

    let handles: Vec<_> = (0..RANKS)
        .map(|rank| {
            let (backend, barrier, global) = (backend.clone(), barrier.clone(), global.clone());
            thread::spawn(move || {
                let mut series = memory_series(&backend, rank, RANKS);
                let mut it = series.write_iteration(0).unwrap();
                let shape = it.declare::<f64, _>("heat", [23, 5]).unwrap();
                let block = compute_block(&shape, rank, RANKS, 0).unwrap();
                let local = global.slice(s![block.ranges()[0].clone(), ..]);
                let written = it.store_local("heat", local, &Partition::block(0)).unwrap();
                assert_eq!(written, vec![block]);
                barrier.wait();
                it.validate("heat").unwrap();
                assert_eq!(it.state("heat"), DatasetState::Validated);
                barrier.wait();
                it.close().unwrap();
                assert_eq!(series.iteration_state(0), Some(SnapshotState::Closed));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reader = Series::with_options().backend(backend).open("ignored").unwrap();
    let record = reader.read_iteration(0).unwrap();
    let placements = record.placements("heat").unwrap();
    assert_eq!(placements.len(), RANKS);
    assert_eq!(record.assemble::<f64>("heat").unwrap(), global.into_dyn());
}

#[test]
fn test_parallel_empty_contribution() {
    const RANKS: usize = 5;
    let backend = MemoryBackend::new();
    let barrier = Arc::new(Barrier::new(RANKS));

    let handles: Vec<_> = (0..RANKS)
        .map(|rank| {
            let (backend, barrier) = (backend.clone(), barrier.clone());
            thread::spawn(move || {
                let mut series = memory_series(&backend, rank, RANKS);
                let mut it = series.write_iteration(3).unwrap();
                let shape = it.declare::<i64, _>("ids", [3]).unwrap();
                // more participants than elements: the last two contribute nothing
                let err = compute_block(&shape, rank, RANKS, 0).unwrap_err();
                assert!(err.is_invalid_partition());
                let (offset, extent) = if rank < 3 { (rank, 1) } else { (0, 0) };
                let data = ArrayD::from_elem(vec![extent], rank as i64);
                let placement = Placement::new([offset], [extent]).unwrap();
                let written =
                    it.store_local("ids", &data, &Partition::Explicit(placement)).unwrap();
                assert_eq!(written[0].is_empty(), rank >= 3);
                barrier.wait();
                it.validate("ids").unwrap();
                barrier.wait();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reader = Series::with_options().backend(backend).open("ignored").unwrap();
    assert_eq!(reader.iterations().unwrap(), vec![3]);
    let ids = reader.read_iteration(3).unwrap().assemble::<i64>("ids").unwrap();
    assert_eq!(ids.into_raw_vec(), vec![0, 1, 2]);
}

#[test]
fn test_parallel_json_rank_files() {
    const RANKS: usize = 3;
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/diags/heat_%04T.%E", dir.path().display());
    let global = heat((11, 4), 0);

    let handles: Vec<_> = (0..RANKS)
        .map(|rank| {
            let (pattern, global) = (pattern.clone(), global.clone());
            thread::spawn(move || {
                let mut series = Series::with_options()
                    .participants(RankInfo::new(rank, RANKS).unwrap())
                    .author("heat")
                    .create(&pattern)
                    .unwrap();
                assert_eq!(series.backend_name(), "json");
                for index in [0, 10] {
                    let mut it = series.write_iteration(index).unwrap();
                    it.set_time(index as f64).unwrap();
                    let shape = it.declare::<f64, _>("heat", [11, 4]).unwrap();
                    let block = compute_block(&shape, rank, RANKS, 0).unwrap();
                    let local = global.slice(s![block.ranges()[0].clone(), ..]);
                    it.store_local("heat", local, &Partition::block(0)).unwrap();
                    it.close().unwrap();
                }
                series.close().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let rank_file = dir.path().join("diags/heat_0010.json.parallel/rank_2.json");
    assert!(rank_file.is_file());

    let reader = Series::open(&pattern).unwrap();
    assert_eq!(reader.author(), Some("heat"));
    assert_eq!(reader.iterations().unwrap(), vec![0, 10]);
    let shape = Shape::new([11, 4]).unwrap();
    for record in reader.read_iterations().unwrap() {
        let record = record.unwrap();
        assert_eq!(record.meta.time, record.index as f64);
        let placements = record.placements("heat").unwrap();
        assert_eq!(placements.len(), RANKS);
        tiling::validate(&shape, &placements).unwrap();
        assert_eq!(record.assemble::<f64>("heat").unwrap(), global.clone().into_dyn());
    }
}

#[test]
fn test_parallel_overlap_is_reported() {
    let backend = MemoryBackend::new();
    let mut first = memory_series(&backend, 0, 2);
    let mut second = memory_series(&backend, 1, 2);
    let data = ArrayD::<f32>::zeros(vec![5]);

    let mut it = first.write_iteration(0).unwrap();
    it.declare::<f32, _>("e", [9]).unwrap();
    it.store_chunk("e", &Placement::new([0], [5]).unwrap(), &data).unwrap();
    drop(it);

    let mut it = second.write_iteration(0).unwrap();
    it.declare::<f32, _>("e", [9]).unwrap();
    it.store_chunk("e", &Placement::new([4], [5]).unwrap(), &data).unwrap();
    let err = it.validate("e").unwrap_err();
    let report = err.as_tiling().unwrap();
    assert_eq!(report.participants, (Some(0), Some(1)));
    assert_eq!(report.index, vec![4]);
    assert_eq!(it.state("e"), DatasetState::Declared);
}

#[test]
fn test_closed_iteration_cannot_be_reopened() {
    let backend = MemoryBackend::new();
    let mut series = memory_series(&backend, 0, 1);
    series.write_iteration(0).unwrap().close().unwrap();
    assert_err!(series.write_iteration(0), "cannot be reopened");

    series.write_iteration(1).unwrap();
    series.write_iteration(2).unwrap();
    assert_eq!(series.iteration_state(1), Some(SnapshotState::Closed));
    assert_eq!(series.iteration_state(2), Some(SnapshotState::Open));
    series.close().unwrap();
    let reader = Series::with_options().backend(backend).open("ignored").unwrap();
    assert_eq!(reader.iterations().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = dir.path().join("diags").join("data_%06T.%E");
    let pattern = pattern.to_str().unwrap();
    let mut rng = SmallRng::seed_from_u64(7);
    let shape = Shape::new([6, 4]).unwrap();
    let rho = gen_arr(&mut rng, &shape);

    let mut series = Series::with_options()
        .config(Config::parse("backend = \"json\"\n[json]\npretty = false").unwrap())
        .author("meshpart")
        .create(pattern)
        .unwrap();
    assert_eq!(series.backend_name(), "json");
    for step in 0..3u64 {
        let mut it = series.write_iteration(step * 100).unwrap();
        it.set_time(step as f64 * 0.25).unwrap();
        it.declare::<f64, _>("rho", shape.dims()).unwrap();
        it.store_local("rho", &rho, &Partition::chunks([4, 4])).unwrap();
        it.validate("rho").unwrap();
        it.mesh_mut("rho").unwrap().unit_dimension =
            UnitDimension::new().with(BaseUnit::L, -3.0).with(BaseUnit::M, 1.0);
        it.declare::<u32, _>("species", [2]).unwrap();
        it.make_constant("species", 11u32).unwrap();
        it.close().unwrap();
    }
    series.close().unwrap();
    assert!(dir.path().join("diags").join("data_000200.json").exists());

    let reader = Series::open(pattern).unwrap();
    assert_eq!(reader.mode(), OpenMode::Read);
    assert_eq!(reader.author(), Some("meshpart"));
    assert_eq!(reader.iterations().unwrap(), vec![0, 100, 200]);
    let records: Vec<_> = reader.read_iterations().unwrap().map(|r| r.unwrap()).collect();
    for (step, record) in records.iter().enumerate() {
        assert_eq!(record.meta.time, step as f64 * 0.25);
        assert_eq!(record.assemble::<f64>("rho").unwrap(), rho);
        assert_eq!(record.assemble::<u32>("species").unwrap().into_raw_vec(), vec![11, 11]);
        let unit = &record.meta.meshes["rho"].unit_dimension;
        assert_eq!(unit.to_string(), "m^-3 * kg");
    }
    assert_err!(records[0].assemble::<f32>("rho"), "has datatype f64, requested f32");
    assert_err!(Series::with_options().create_excl(pattern), "already exists");
}
