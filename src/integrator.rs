use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::forces::accelerations;

/// Time-integration strategy. Both variants share the same contract
/// and both tolerate negative or rescaled `dt` unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    Euler,
    Rk4,
}

/// Advance every non-excluded body by one step of `dt`.
pub fn advance(
    bodies: &mut [Body],
    integrator: Integrator,
    dt: f64,
    g: f64,
    softening: f64,
    excluded: Option<usize>,
) {
    if bodies.is_empty() {
        return;
    }
    match integrator {
        Integrator::Euler => symplectic_euler(bodies, dt, g, softening, excluded),
        Integrator::Rk4 => rk4(bodies, dt, g, softening, excluded),
    }
}

/// Semi-implicit Euler: kick velocity from current accelerations, then
/// drift position with the kicked velocity. One force pass per step.
fn symplectic_euler(bodies: &mut [Body], dt: f64, g: f64, softening: f64, excluded: Option<usize>) {
    let mut acc = vec![Vector3::zero(); bodies.len()];
    accelerations(bodies, g, softening, excluded, &mut acc);

    for (i, (body, a)) in bodies.iter_mut().zip(acc.iter()).enumerate() {
        if Some(i) == excluded {
            continue;
        }
        body.vel += *a * dt;
        body.pos += body.vel * dt;
    }
}

/// Build the staged state `y + k*h` for one RK4 stage. The excluded
/// body is carried over untouched so it never moves, not even inside a
/// stage.
fn staged(
    bodies: &[Body],
    vel: impl Fn(usize) -> Vector3<f64>,
    acc: &[Vector3<f64>],
    h: f64,
    excluded: Option<usize>,
) -> Vec<Body> {
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            if Some(i) == excluded {
                return *body;
            }
            Body {
                pos: body.pos + vel(i) * h,
                vel: body.vel + acc[i] * h,
                mass: body.mass,
            }
        })
        .collect()
}

/// Classical fourth-order Runge-Kutta over the coupled (position,
/// velocity) state. Four force passes per step.
fn rk4(bodies: &mut [Body], dt: f64, g: f64, softening: f64, excluded: Option<usize>) {
    let n = bodies.len();
    let half = dt * 0.5;
    let y0 = bodies.to_vec();

    // k1 at the current state.
    let mut a1 = vec![Vector3::zero(); n];
    accelerations(&y0, g, softening, excluded, &mut a1);

    // k2 at state advanced by k1 * dt/2.
    let s2 = staged(&y0, |i| y0[i].vel, &a1, half, excluded);
    let mut a2 = vec![Vector3::zero(); n];
    accelerations(&s2, g, softening, excluded, &mut a2);

    // k3 at state advanced by k2 * dt/2.
    let s3 = staged(&y0, |i| s2[i].vel, &a2, half, excluded);
    let mut a3 = vec![Vector3::zero(); n];
    accelerations(&s3, g, softening, excluded, &mut a3);

    // k4 at state advanced by k3 * dt.
    let s4 = staged(&y0, |i| s3[i].vel, &a3, dt, excluded);
    let mut a4 = vec![Vector3::zero(); n];
    accelerations(&s4, g, softening, excluded, &mut a4);

    let sixth = dt / 6.0;
    for i in 0..n {
        if Some(i) == excluded {
            continue;
        }
        let dx = (y0[i].vel + s2[i].vel * 2.0 + s3[i].vel * 2.0 + s4[i].vel) * sixth;
        let dv = (a1[i] + a2[i] * 2.0 + a3[i] * 2.0 + a4[i]) * sixth;
        bodies[i].pos += dx;
        bodies[i].vel += dv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Point3};

    fn falling_pair() -> Vec<Body> {
        vec![
            Body::new(Point3::new(-1.0, 0.0, 0.0), Vector3::zero(), 1.0),
            Body::new(Point3::new(1.0, 0.0, 0.0), Vector3::zero(), 1.0),
        ]
    }

    #[test]
    fn euler_pulls_pair_together() {
        let mut bodies = falling_pair();
        advance(&mut bodies, Integrator::Euler, 0.01, 1.0, 0.1, None);
        assert!(bodies[0].pos.x > -1.0);
        assert!(bodies[1].pos.x < 1.0);
        assert!(bodies[0].vel.x > 0.0);
    }

    #[test]
    fn excluded_body_is_frozen_in_every_stage() {
        for integrator in [Integrator::Euler, Integrator::Rk4] {
            let mut bodies = falling_pair();
            let before = bodies[0];
            advance(&mut bodies, integrator, 0.1, 1.0, 0.1, Some(0));
            assert_eq!(bodies[0].pos, before.pos);
            assert_eq!(bodies[0].vel, before.vel);
            // The other body still moved.
            assert!(bodies[1].pos.x < 1.0);
        }
    }

    #[test]
    fn negative_dt_reverses_motion() {
        let mut forward = falling_pair();
        forward[0].vel = Vector3::new(0.0, 0.5, 0.0);
        let mut backward = forward.clone();

        advance(&mut forward, Integrator::Rk4, 0.01, 1.0, 0.1, None);
        advance(&mut backward, Integrator::Rk4, -0.01, 1.0, 0.1, None);

        // Motion along the initial velocity flips sign with dt.
        assert!(forward[0].pos.y > 0.0);
        assert!(backward[0].pos.y < 0.0);
    }

    #[test]
    fn rk4_tracks_circular_orbit_more_tightly_than_euler() {
        // Light body on a circular orbit around a heavy one.
        let orbit = |integrator| {
            let mut bodies = vec![
                Body::new(Point3::new(0.0, 0.0, 0.0), Vector3::zero(), 1000.0),
                Body::new(
                    Point3::new(10.0, 0.0, 0.0),
                    Vector3::new(0.0, 10.0, 0.0),
                    1e-3,
                ),
            ];
            for _ in 0..500 {
                advance(&mut bodies, integrator, 0.01, 1.0, 0.0, None);
            }
            ((bodies[1].pos - bodies[0].pos).magnitude() - 10.0).abs()
        };
        assert!(orbit(Integrator::Rk4) < orbit(Integrator::Euler));
    }
}
