use std::iter;

use meshpart::{Placement, Shape};
use ndarray::ArrayD;
use rand::distributions::{Alphanumeric, Uniform};
use rand::prelude::{Rng, SliceRandom};

pub fn gen_shape<R: Rng + ?Sized>(rng: &mut R, ndim: usize) -> Shape {
    let dims: Vec<usize> = iter::repeat(()).map(|_| rng.gen_range(1..13)).take(ndim).collect();
    Shape::from_vec(dims).unwrap()
}

pub fn gen_ascii<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    iter::repeat(()).map(|_| rng.sample(Alphanumeric)).map(char::from).take(len).collect()
}

/// Splits `len` at `cuts - 1` random distinct points into consecutive `(start, size)` runs.
fn gen_runs<R: Rng + ?Sized>(rng: &mut R, len: usize, cuts: usize) -> Vec<(usize, usize)> {
    let mut points: Vec<usize> = (1..len).collect();
    points.shuffle(rng);
    points.truncate(cuts.saturating_sub(1).min(len.saturating_sub(1)));
    points.push(0);
    points.push(len);
    points.sort_unstable();
    points.windows(2).map(|w| (w[0], w[1] - w[0])).collect()
}

/// Random box grid that tiles `shape` exactly, in shuffled order.
pub fn gen_tiling<R: Rng + ?Sized>(rng: &mut R, shape: &Shape) -> Vec<Placement> {
    let runs: Vec<Vec<(usize, usize)>> = shape
        .dims()
        .iter()
        .map(|&len| {
            let cuts = rng.gen_range(1..4);
            gen_runs(rng, len, cuts)
        })
        .collect();
    let mut placements = vec![(Vec::new(), Vec::new())];
    for axis_runs in &runs {
        placements = placements
            .into_iter()
            .flat_map(|(offset, extent): (Vec<usize>, Vec<usize>)| {
                axis_runs.iter().map(move |&(start, size)| {
                    let (mut offset, mut extent) = (offset.clone(), extent.clone());
                    offset.push(start);
                    extent.push(size);
                    (offset, extent)
                })
            })
            .collect();
    }
    let mut placements: Vec<Placement> =
        placements.into_iter().map(|(o, e)| Placement::new(o, e).unwrap()).collect();
    placements.shuffle(rng);
    placements
}

pub fn gen_arr<R: Rng + ?Sized>(rng: &mut R, shape: &Shape) -> ArrayD<f64> {
    let dist = Uniform::new(-1.0, 1.0);
    ArrayD::from_shape_simple_fn(shape.dims(), || rng.sample(dist))
}
