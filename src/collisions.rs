use cgmath::{EuclideanSpace, InnerSpace, Point3};

use crate::body::Body;
use crate::constants::MERGE_THRESHOLD;

/// Resolve every overlapping pair after integration. Deeply
/// overlapping pairs merge inelastically, shallow ones bounce with the
/// given restitution. Returns the removed (absorbed) indices in
/// descending order, ready to be applied one at a time.
pub fn resolve(bodies: &mut Vec<Body>, excluded: Option<usize>, restitution: f64) -> Vec<usize> {
    let n = bodies.len();
    let mut removed = vec![false; n];

    for i in 0..n {
        if removed[i] || Some(i) == excluded {
            continue;
        }
        for j in (i + 1)..n {
            if removed[i] || removed[j] || Some(j) == excluded {
                continue;
            }

            let collision_dist = bodies[i].radius() + bodies[j].radius();
            let rel = bodies[i].pos - bodies[j].pos;
            let dist = rel.magnitude();
            if dist >= collision_dist {
                continue;
            }

            if dist < collision_dist * MERGE_THRESHOLD {
                merge(bodies, i, j);
                removed[j] = true;
            } else {
                // Unit normal from j towards i. The merge branch above
                // covers dist ~ 0, so this is well defined.
                let normal = rel / dist;
                bounce(bodies, i, j, normal, collision_dist - dist, restitution);
            }
        }
    }

    let mut indices: Vec<usize> = removed
        .iter()
        .enumerate()
        .filter_map(|(i, &r)| r.then_some(i))
        .collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    for &index in &indices {
        bodies.remove(index);
    }
    indices
}

/// Inelastic merge of j into i. Mass-weighted position and velocity
/// conserve momentum and the pair's center of mass by construction.
fn merge(bodies: &mut [Body], i: usize, j: usize) {
    let (a, b) = (bodies[i], bodies[j]);
    let mass = a.mass + b.mass;
    bodies[i] = Body {
        pos: Point3::from_vec((a.pos.to_vec() * a.mass + b.pos.to_vec() * b.mass) / mass),
        vel: (a.vel * a.mass + b.vel * b.mass) / mass,
        mass,
    };
}

/// Restitution impulse plus positional separation. A pair already
/// separating gets no impulse; it still gets pushed apart so it cannot
/// stay interpenetrated.
fn bounce(
    bodies: &mut [Body],
    i: usize,
    j: usize,
    normal: cgmath::Vector3<f64>,
    overlap: f64,
    restitution: f64,
) {
    // Closing speed along the normal; positive while approaching.
    let dvn = (bodies[j].vel - bodies[i].vel).dot(normal);
    if dvn > 0.0 {
        let impulse = -(1.0 + restitution) * dvn / (1.0 / bodies[i].mass + 1.0 / bodies[j].mass);
        let mi = bodies[i].mass;
        let mj = bodies[j].mass;
        bodies[i].vel -= normal * (impulse / mi);
        bodies[j].vel += normal * (impulse / mj);
    }

    let push = normal * (overlap * 0.5);
    bodies[i].pos += push;
    bodies[j].pos -= push;
}

/// Translate an index held from before a step through that step's
/// removals. Returns `None` if the index was itself removed.
pub fn remap_index(index: usize, removed_desc: &[usize]) -> Option<usize> {
    if removed_desc.contains(&index) {
        return None;
    }
    let shift = removed_desc.iter().filter(|&&r| r < index).count();
    Some(index - shift)
}
