use cgmath::{Point3, Vector3};
use rand::Rng;

use crate::body::Body;

/// The classic Chenciner-Montgomery figure-eight choreography: three
/// unit masses chasing each other along a shared orbit at G = 1.
/// Good integrator stress test since any drift breaks the braid.
pub fn figure_eight() -> Vec<Body> {
    let x = 0.970_004_36;
    let y = 0.243_087_53;
    let vx = 0.466_203_69;
    let vy = 0.432_365_73;
    vec![
        Body::new(Point3::new(x, -y, 0.0), Vector3::new(vx, vy, 0.0), 1.0),
        Body::new(Point3::new(-x, y, 0.0), Vector3::new(vx, vy, 0.0), 1.0),
        Body::new(
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(-2.0 * vx, -2.0 * vy, 0.0),
            1.0,
        ),
    ]
}

/// A light body on a circular orbit around a heavy one.
pub fn two_body() -> Vec<Body> {
    vec![
        Body::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0), 1000.0),
        Body::new(
            Point3::new(10.0, 0.0, 0.0),
            // v = sqrt(G M / r) for G = 1
            Vector3::new(0.0, 10.0, 0.0),
            1.0,
        ),
    ]
}

/// `n` bodies thrown into a box with small random velocities. Plenty
/// of merges once collisions are on.
pub fn random_cloud(n: usize) -> Vec<Body> {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| {
            Body::new(
                Point3::new(
                    rng.random_range(-10.0..10.0),
                    rng.random_range(-10.0..10.0),
                    rng.random_range(-10.0..10.0),
                ),
                Vector3::new(
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                ),
                rng.random_range(0.5..5.0),
            )
        })
        .collect()
}

/// Scenario lookup by name, for the demo binary and snapshot loads.
pub fn by_name(name: &str) -> Option<Vec<Body>> {
    match name {
        "figure-eight" => Some(figure_eight()),
        "two-body" => Some(two_body()),
        "cloud" => Some(random_cloud(8)),
        _ => None,
    }
}
