//! Write particle positions from several participants, each owning one contiguous block.
//!
//! With the `mpio` feature every MPI process is one participant writing its own JSON files,
//! which rank 0 reads back and checks afterwards:
//! ``` ignore
//! cargo build --example write_parallel --features mpio
//! mpirun -np 4 ./target/debug/examples/write_parallel
//! ```
//! Without it, the participants are threads sharing one in-memory backend.
use meshpart::partition::compute_blocks;
use meshpart::{
    tiling, BaseUnit, Communicator, Iteration, Partition, Result, Series, SeriesBuilder,
    UnitDimension,
};
use ndarray::Array1;

const LOCAL_LEN: usize = 10;
const ITERATIONS: u64 = 10;

fn builder<C: Communicator>(comm: &C) -> Result<SeriesBuilder> {
    let mut builder = Series::with_options();
    builder
        .communicator(comm)?
        .author("meshpart demos")
        .software("write_parallel");
    Ok(builder)
}

/// Declares and stores this participant's share of iteration `i`.
fn write_positions(it: &mut Iteration, i: u64) -> Result<()> {
    let ranks = it.ranks();
    let global = [ranks.size() * LOCAL_LEN];
    let start = i as usize * LOCAL_LEN;
    let local = Array1::from_iter((start..start + LOCAL_LEN).map(|v| v as f64));
    for axis in ["x", "y", "z"] {
        let name = format!("e/position/{axis}");
        it.declare::<f64, _>(&name, global)?;
        it.store_local(&name, &local, &Partition::block(0))?;
        let mesh = it.mesh_mut(&name)?;
        mesh.unit_dimension = UnitDimension::new().with(BaseUnit::L, 1.0);
        mesh.attributes.insert("comment".into(), "I'm a comment".into());
    }

    it.declare::<f64, _>("temperature", [3, 3])?;
    it.make_constant("temperature", 273.15)?;
    let mesh = it.mesh_mut("temperature")?;
    mesh.unit_dimension = UnitDimension::new().with(BaseUnit::Theta, 1.0);
    mesh.axis_labels = vec!["x".into(), "y".into()];
    mesh.grid_spacing = vec![1.0, 1.0];
    Ok(())
}

#[cfg(feature = "mpio")]
fn main() -> Result<()> {
    use meshpart::MpiWorld;

    const PATTERN: &str = "diags/simData_%T.%E";
    let world = MpiWorld::init()?;
    // every rank writes its own file per iteration next to the serial file name
    let mut series = builder(&world)?.create(PATTERN)?;
    for i in 0..ITERATIONS {
        let mut it = series.write_iteration(i)?;
        write_positions(&mut it, i)?;
        it.close()?;
    }
    series.close()?;
    world.barrier();

    if world.rank() == 0 {
        let shape = meshpart::Shape::new([world.size() * LOCAL_LEN])?;
        tiling::validate(&shape, &compute_blocks(&shape, world.size(), 0)?)?;
        let reader = Series::open(PATTERN)?;
        for record in reader.read_iterations()? {
            let record = record?;
            tiling::validate(&shape, &record.placements("e/position/x")?)?;
            let x = record.assemble::<f64>("e/position/x")?;
            println!("iteration {}: {} positions, first {}", record.index, x.len(), x[[0]]);
        }
    }
    Ok(())
}

#[cfg(not(feature = "mpio"))]
fn main() -> Result<()> {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use meshpart::{MemoryBackend, RankInfo};

    const RANKS: usize = 4;
    let backend = MemoryBackend::new();
    let barrier = Arc::new(Barrier::new(RANKS));
    let handles: Vec<_> = (0..RANKS)
        .map(|rank| {
            let (backend, barrier) = (backend.clone(), barrier.clone());
            thread::spawn(move || -> Result<()> {
                let ranks = RankInfo::new(rank, RANKS)?;
                let mut series = builder(&ranks)?.backend(backend).create("simData_%T.%E")?;
                for i in 0..ITERATIONS {
                    let mut it = series.write_iteration(i)?;
                    write_positions(&mut it, i)?;
                    barrier.wait();
                    it.validate("e/position/x")?;
                    barrier.wait();
                    it.close()?;
                }
                series.close()
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| "participant thread panicked")??;
    }

    let reader = Series::with_options().backend(backend).open("simData_%T.%E")?;
    for record in reader.read_iterations()? {
        let record = record?;
        let x = record.assemble::<f64>("e/position/x")?;
        println!("iteration {}: {} positions, first {}", record.index, x.len(), x[[0]]);
    }
    let shape = meshpart::Shape::new([RANKS * LOCAL_LEN])?;
    tiling::validate(&shape, &compute_blocks(&shape, RANKS, 0)?)?;
    Ok(())
}
