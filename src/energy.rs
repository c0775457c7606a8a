use cgmath::InnerSpace;

use crate::body::Body;
use crate::constants::PE_DISTANCE_FLOOR;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub time: f64,
    pub ke: f64,
    pub pe: f64,
    pub total: f64,
    /// Percent deviation from the baseline total. `None` until a
    /// baseline exists or when the baseline is zero.
    pub drift_pct: Option<f64>,
}

pub fn kinetic(bodies: &[Body]) -> f64 {
    bodies.iter().map(|b| 0.5 * b.mass * b.vel.magnitude2()).sum()
}

/// Pairwise gravitational potential. Pairs at or below the distance
/// floor contribute nothing, so near-contact pairs cannot blow the sum
/// up.
pub fn potential(bodies: &[Body], g: f64) -> f64 {
    let mut pe = 0.0;
    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let dist = (bodies[j].pos - bodies[i].pos).magnitude();
            if dist > PE_DISTANCE_FLOOR {
                pe -= g * bodies[i].mass * bodies[j].mass / dist;
            }
        }
    }
    pe
}

/// Tracks total energy against the baseline recorded at the first
/// sample. Sampling cadence is the caller's business; this type only
/// answers "sample now".
#[derive(Debug, Default)]
pub struct EnergyAnalyzer {
    baseline: Option<f64>,
}

impl EnergyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, bodies: &[Body], g: f64, time: f64) -> EnergySample {
        let ke = kinetic(bodies);
        let pe = potential(bodies, g);
        let total = ke + pe;

        let baseline = *self.baseline.get_or_insert(total);
        let drift_pct =
            (baseline != 0.0).then(|| (total - baseline) / baseline * 100.0);

        EnergySample {
            time,
            ke,
            pe,
            total,
            drift_pct,
        }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Forget the baseline, e.g. after a scenario reset.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}
