//! Print a summary of every iteration of a series.
//!
//! ``` ignore
//! cargo run --example read_series -- diags/heat_%06T.%E
//! ```
use std::env;
use std::process;

use meshpart::{Datatype, DatasetRecord, IterationRecord, Result, Series};

fn summarize<T>(record: &IterationRecord, name: &str) -> Result<String>
where
    T: meshpart::Element + Into<f64>,
{
    let values = record.assemble::<T>(name)?;
    let (min, max) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        let v = v.into();
        (lo.min(v), hi.max(v))
    });
    Ok(format!("min {min:.4}, max {max:.4}"))
}

fn describe(record: &IterationRecord, name: &str, dataset: &DatasetRecord) -> Result<String> {
    if let Some(value) = dataset.constant {
        return Ok(format!("constant {value}"));
    }
    match dataset.datatype {
        Datatype::F32 => summarize::<f32>(record, name),
        Datatype::F64 => summarize::<f64>(record, name),
        Datatype::I32 => summarize::<i32>(record, name),
        Datatype::U32 => summarize::<u32>(record, name),
        Datatype::I64 | Datatype::U64 => Ok(format!("{} chunks", dataset.chunks.len())),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <file-pattern>", args[0]);
        process::exit(1);
    }

    let series = Series::open(&args[1])?;
    if let Some(author) = series.author() {
        println!("author: {author}");
    }
    for record in series.read_iterations()? {
        let record = record?;
        let meta = &record.meta;
        println!("iteration {} (t = {} s)", record.index, meta.time * meta.time_unit_si);
        for (name, dataset) in &record.datasets {
            let unit = meta.meshes.get(name).map(|m| m.unit_dimension.to_string());
            println!(
                "  {name}: {} {} [{}] {}",
                dataset.datatype,
                dataset.shape,
                unit.as_deref().unwrap_or("-"),
                describe(&record, name, dataset)?
            );
            if let Some(mesh) = meta.meshes.get(name) {
                let axes: Vec<String> = (0..dataset.shape.ndim())
                    .map(|axis| {
                        let label = mesh.axis_labels.get(axis).map_or("?", String::as_str);
                        let origin = mesh.origin_si(axis).unwrap_or(0.0);
                        let spacing = mesh.spacing_si(axis).unwrap_or(1.0);
                        format!("{label}: {origin} + {spacing} * i")
                    })
                    .collect();
                println!("    {}", axes.join(", "));
            }
        }
    }
    Ok(())
}
