use cgmath::{InnerSpace, Point3, Vector3};

use crate::constants::{MIN_RESCALE_SPEED, RADIUS_SCALE};

/// Renderer color tag. Carried by the store for round-tripping, never
/// read by the physics itself.
pub type Color = [f32; 3];

pub const DEFAULT_COLOR: Color = [1.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub pos: Point3<f64>,
    pub vel: Vector3<f64>,
    pub mass: f64,
}

impl Body {
    pub fn new(pos: Point3<f64>, vel: Vector3<f64>, mass: f64) -> Self {
        debug_assert!(mass > 0.0);
        Self { pos, vel, mass }
    }

    /// Radius proxy used by the collision resolver.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.mass.cbrt() * RADIUS_SCALE
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.vel.magnitude()
    }

    /// Rescale velocity to the requested magnitude, keeping direction.
    /// A body at rest gets an axis-aligned velocity instead, since its
    /// direction is undefined.
    pub fn set_speed(&mut self, target: f64) {
        let current = self.vel.magnitude();
        if current > MIN_RESCALE_SPEED {
            self.vel *= target / current;
        } else {
            self.vel = Vector3::new(target, 0.0, 0.0);
        }
    }
}

/// Stable handle to a body. Survives merges and removals of other
/// bodies; resolves to `None` once its body is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(u64);

/// Canonical body array plus the id and color bookkeeping that rides
/// along with it. Raw indices into `bodies()` are only valid until the
/// next step commit; anything held across a step goes through
/// [`BodyId`].
#[derive(Debug, Default)]
pub struct BodyStore {
    bodies: Vec<Body>,
    ids: Vec<BodyId>,
    colors: Vec<Color>,
    next_id: u64,
}

impl BodyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bodies(bodies: impl IntoIterator<Item = Body>) -> Self {
        let mut store = Self::new();
        for body in bodies {
            store.push(body, DEFAULT_COLOR);
        }
        store
    }

    pub fn push(&mut self, body: Body, color: Color) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.push(body);
        self.ids.push(id);
        self.colors.push(color);
        id
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn index_of(&self, id: BodyId) -> Option<usize> {
        self.ids.iter().position(|&i| i == id)
    }

    pub fn id_at(&self, index: usize) -> Option<BodyId> {
        self.ids.get(index).copied()
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.index_of(id).map(|i| &self.bodies[i])
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.index_of(id).map(|i| &mut self.bodies[i])
    }

    /// Explicit delete. Shifts the indices of every later body.
    pub fn remove(&mut self, id: BodyId) -> Option<Body> {
        let index = self.index_of(id)?;
        self.ids.remove(index);
        self.colors.remove(index);
        Some(self.bodies.remove(index))
    }

    /// Drop everything and start over, e.g. on scenario load.
    pub fn reset(&mut self, bodies: impl IntoIterator<Item = (Body, Color)>) {
        self.bodies.clear();
        self.ids.clear();
        self.colors.clear();
        for (body, color) in bodies {
            self.push(body, color);
        }
    }

    /// Commit the outcome of one step. `bodies` already has merged
    /// bodies dropped; `removed` lists the dropped pre-step indices in
    /// descending order so earlier removals never shift later ones.
    pub fn commit(&mut self, bodies: Vec<Body>, removed: &[usize]) {
        debug_assert!(removed.windows(2).all(|w| w[0] > w[1]));
        for &index in removed {
            self.ids.remove(index);
            self.colors.remove(index);
        }
        debug_assert_eq!(bodies.len(), self.ids.len());
        self.bodies = bodies;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Vector3, Zero};

    fn body_at(x: f64) -> Body {
        Body::new(Point3::new(x, 0.0, 0.0), Vector3::zero(), 1.0)
    }

    #[test]
    fn ids_survive_removals() {
        let mut store = BodyStore::new();
        let a = store.push(body_at(0.0), DEFAULT_COLOR);
        let b = store.push(body_at(1.0), DEFAULT_COLOR);
        let c = store.push(body_at(2.0), DEFAULT_COLOR);

        store.remove(b);
        assert_eq!(store.index_of(a), Some(0));
        assert_eq!(store.index_of(b), None);
        assert_eq!(store.index_of(c), Some(1));
        assert_eq!(store.get(c).unwrap().pos.x, 2.0);
    }

    #[test]
    fn commit_applies_descending_removals() {
        let mut store = BodyStore::new();
        let ids: Vec<_> = (0..4)
            .map(|i| store.push(body_at(i as f64), DEFAULT_COLOR))
            .collect();

        // Bodies 1 and 3 merged away during the step.
        let survivors = vec![store.bodies()[0], store.bodies()[2]];
        store.commit(survivors, &[3, 1]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.index_of(ids[0]), Some(0));
        assert_eq!(store.index_of(ids[1]), None);
        assert_eq!(store.index_of(ids[2]), Some(1));
        assert_eq!(store.index_of(ids[3]), None);
    }

    #[test]
    fn set_speed_handles_rest() {
        let mut body = body_at(0.0);
        body.set_speed(2.0);
        assert_eq!(body.vel, Vector3::new(2.0, 0.0, 0.0));

        body.vel = Vector3::new(0.0, 1.0, 0.0);
        body.set_speed(3.0);
        assert!((body.speed() - 3.0).abs() < 1e-12);
        assert!(body.vel.y > 0.0);
    }
}
