use cgmath::{InnerSpace, Vector3, Zero};
use rayon::iter::{
    IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator,
};

use crate::body::Body;

/// Accumulate the softened gravitational acceleration felt by `body`
/// from `other` into `out`.
#[inline]
pub fn acc_towards(body: &Body, other: &Body, g: f64, softening: f64, out: &mut Vector3<f64>) {
    let rel = other.pos - body.pos;
    let dist_sq = rel.magnitude2() + softening * softening;
    let dist = dist_sq.sqrt();
    *out += rel * (g * other.mass / (dist_sq * dist));
}

/// Fill `out` with the acceleration of every body under pairwise
/// gravity. O(n^2); fine for the handful of bodies this engine targets.
/// An excluded body gets zero acceleration but still attracts the rest,
/// since a dragged body keeps its mass.
pub fn accelerations(
    bodies: &[Body],
    g: f64,
    softening: f64,
    excluded: Option<usize>,
    out: &mut [Vector3<f64>],
) {
    debug_assert_eq!(bodies.len(), out.len());
    bodies
        .par_iter()
        .zip(out.par_iter_mut())
        .enumerate()
        .for_each(|(i, (body, out))| {
            *out = Vector3::zero();
            if Some(i) == excluded {
                return;
            }
            for (other_idx, other) in bodies.iter().enumerate() {
                if other_idx == i {
                    continue;
                }
                acc_towards(body, other, g, softening, out);
            }
        });
}
