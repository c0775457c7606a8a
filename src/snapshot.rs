//! Import/export of the persisted simulation shape. The core does not
//! persist anything itself; this module only converts between the wire
//! JSON and the live store.
//!
//! Import policy: a snapshot without a bodies array is rejected before
//! the store is touched. A well-formed but incomplete body record is
//! repaired field by field (missing coordinates become 0, missing mass
//! becomes 1, missing color becomes white) rather than rejected; a
//! mass that is present but not positive is an error.

use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::body::{Body, BodyStore, Color};
use crate::integrator::Integrator;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("body {index} has non-positive mass {mass}")]
    NonPositiveMass { index: usize, mass: f64 },
}

fn default_mass() -> f64 {
    1.0
}

fn default_color() -> Color {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyRecord {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    #[serde(default = "default_color")]
    pub color: Color,
}

impl BodyRecord {
    pub fn from_body(body: &Body, color: Color) -> Self {
        Self {
            x: body.pos.x,
            y: body.pos.y,
            z: body.pos.z,
            vx: body.vel.x,
            vy: body.vel.y,
            vz: body.vel.z,
            mass: body.mass,
            color,
        }
    }

    pub fn to_body(self) -> (Body, Color) {
        (
            Body {
                pos: Point3::new(self.x, self.y, self.z),
                vel: Vector3::new(self.vx, self.vy, self.vz),
                mass: self.mass,
            },
            self.color,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub physics_mode: Integrator,
    pub enable_collisions: bool,
    pub sim_speed: f64,
    pub trail_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            physics_mode: Integrator::Euler,
            enable_collisions: true,
            sim_speed: 1.0,
            trail_length: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub scenario: String,
    #[serde(default)]
    pub time: f64,
    pub gravity_g: f64,
    pub bodies: Vec<BodyRecord>,
    #[serde(default)]
    pub settings: Settings,
    /// Opaque caller-supplied timestamp; round-tripped untouched.
    #[serde(default)]
    pub exported_at: String,
}

impl Snapshot {
    /// Capture the live store plus the caller's surrounding settings.
    pub fn capture(
        store: &BodyStore,
        scenario: &str,
        time: f64,
        gravity_g: f64,
        settings: Settings,
        exported_at: &str,
    ) -> Self {
        let bodies = store
            .bodies()
            .iter()
            .zip(store.colors())
            .map(|(body, &color)| BodyRecord::from_body(body, color))
            .collect();
        Self {
            scenario: scenario.to_owned(),
            time,
            gravity_g,
            bodies,
            settings,
            exported_at: exported_at.to_owned(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        for (index, record) in snapshot.bodies.iter().enumerate() {
            if record.mass <= 0.0 {
                return Err(SnapshotError::NonPositiveMass {
                    index,
                    mass: record.mass,
                });
            }
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the store contents with the snapshot's bodies. Only
    /// called on an already-validated snapshot, so the store is never
    /// left half-mutated.
    pub fn apply_to(&self, store: &mut BodyStore) {
        store.reset(self.bodies.iter().map(|r| r.to_body()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::DEFAULT_COLOR;
    use cgmath::Zero;

    #[test]
    fn round_trip_preserves_bodies_and_settings() {
        let mut store = BodyStore::new();
        store.push(
            Body::new(Point3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3), 5.0),
            [0.2, 0.4, 0.6],
        );
        let snapshot = Snapshot::capture(
            &store,
            "two-body",
            4.2,
            1.0,
            Settings::default(),
            "2026-08-30T00:00:00Z",
        );

        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json).unwrap();
        assert_eq!(parsed.scenario, "two-body");
        assert_eq!(parsed.bodies.len(), 1);
        assert_eq!(parsed.bodies[0].mass, 5.0);
        assert_eq!(parsed.bodies[0].color, [0.2, 0.4, 0.6]);
        assert_eq!(parsed.exported_at, "2026-08-30T00:00:00Z");

        let mut restored = BodyStore::new();
        parsed.apply_to(&mut restored);
        assert_eq!(restored.bodies(), store.bodies());
        assert_eq!(restored.colors(), store.colors());
    }

    #[test]
    fn missing_bodies_array_is_rejected() {
        let json = r#"{"scenario": "x", "gravityG": 1.0}"#;
        assert!(matches!(
            Snapshot::from_json(json),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn incomplete_record_is_repaired() {
        let json = r#"{
            "scenario": "x",
            "gravityG": 1.0,
            "bodies": [{"x": 3.0}]
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let (body, color) = snapshot.bodies[0].to_body();
        assert_eq!(body.pos, Point3::new(3.0, 0.0, 0.0));
        assert_eq!(body.vel, Vector3::zero());
        assert_eq!(body.mass, 1.0);
        assert_eq!(color, DEFAULT_COLOR);
    }

    #[test]
    fn explicit_zero_mass_is_an_error() {
        let json = r#"{
            "scenario": "x",
            "gravityG": 1.0,
            "bodies": [{"mass": 0.0}]
        }"#;
        assert!(matches!(
            Snapshot::from_json(json),
            Err(SnapshotError::NonPositiveMass { index: 0, .. })
        ));
    }

    #[test]
    fn physics_mode_uses_lowercase_names() {
        let settings = Settings {
            physics_mode: Integrator::Rk4,
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""physicsMode":"rk4""#));
    }
}
