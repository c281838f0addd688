//! Diffuse heat on a 2D grid and write every few steps to a JSON series.
//!
//! ``` ignore
//! RUST_LOG=meshpart=debug cargo run --example write_heat
//! cargo run --example read_series -- diags/heat_%06T.%E
//! ```
use meshpart::{BaseUnit, Partition, Result, Series, UnitDimension};
use ndarray::{s, Array2, Zip};
use tracing_subscriber::{fmt, EnvFilter};

const NX: usize = 32;
const NY: usize = 24;
const STEPS: u64 = 200;
const OUTPUT_EVERY: u64 = 50;

fn step(t: &Array2<f64>, alpha: f64) -> Array2<f64> {
    let mut next = t.clone();
    Zip::from(next.slice_mut(s![1..-1, 1..-1]))
        .and(t.slice(s![1..-1, 1..-1]))
        .and(t.slice(s![..-2, 1..-1]))
        .and(t.slice(s![2.., 1..-1]))
        .and(t.slice(s![1..-1, ..-2]))
        .and(t.slice(s![1..-1, 2..]))
        .for_each(|n, &c, &up, &down, &left, &right| {
            *n = c + alpha * (up + down + left + right - 4.0 * c);
        });
    next
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut series = Series::with_options()
        .author("meshpart demos")
        .software("write_heat")
        .create("diags/heat_%06T.%E")?;

    // hot left edge, cold elsewhere
    let mut temperature = Array2::<f64>::from_elem((NY, NX), 273.15);
    temperature.column_mut(0).fill(373.15);
    let dt = 0.1;

    for n in 0..=STEPS {
        if n % OUTPUT_EVERY == 0 {
            let mut it = series.write_iteration(n)?;
            it.set_time(n as f64 * dt)?.set_dt(dt)?;
            it.declare::<f64, _>("temperature", [NY, NX])?;
            it.store_local("temperature", &temperature, &Partition::chunks([8, 16]))?;
            it.validate("temperature")?;
            let mesh = it.mesh_mut("temperature")?;
            mesh.unit_dimension = UnitDimension::new().with(BaseUnit::Theta, 1.0);
            mesh.grid_spacing = vec![1.0, 1.0];
            mesh.grid_unit_si = 1e-2;

            it.declare::<f64, _>("conductivity", [NY, NX])?;
            it.make_constant("conductivity", 0.6)?;
            it.close()?;
            let probe = temperature[[NY / 2, 1]];
            println!("wrote iteration {n}, temperature next to the hot edge {probe:.2} K");
        }
        temperature = step(&temperature, 0.2);
    }

    series.close()
}
