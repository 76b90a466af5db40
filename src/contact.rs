//! Contact Points and the Collision Pipeline Seam
//!
//! A [`ContactPoint`] is one point of touch between two bodies as produced by
//! the collision pipeline. Contacts are rebuilt every step and are read-only
//! while the operators are assembled and the impulses solved; the stepper
//! only writes the resolved material before assembly and the solved impulse
//! afterwards.
//!
//! Broad phase, narrow phase and geometry live outside this crate. They plug
//! in through the [`CollisionSystem`] trait.

use crate::body::RigidBody;
use crate::material::MaterialPair;
use crate::math::{safe_normalize, tangent_basis, Real, Vec3, Vec4, NORMAL_EPSILON};

/// A single contact between two bodies
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoint {
    /// Solver index of the first body
    pub body_a: usize,
    /// Solver index of the second body
    pub body_b: usize,
    /// Contact position (world frame)
    pub position: Vec3,
    /// Unit normal, pointing from body A to body B
    pub normal: Vec3,
    /// First friction direction (orthogonal to the normal)
    pub tangent_s: Vec3,
    /// Second friction direction (`normal x tangent_s`)
    pub tangent_t: Vec3,
    /// Signed gap (negative = interpenetration)
    pub gap: Real,
    /// Resolved material of the pair
    pub material: MaterialPair,
    /// Material was set by the caller and is not looked up
    pub explicit_material: bool,
    /// Pipeline feature id, matched across steps for warm starting
    pub feature: u32,
    /// Solved impulse (normal, s, t, drilling), filled after the solve
    pub lambda: Vec4,
}

impl ContactPoint {
    /// Create a contact, deriving the friction basis from the normal.
    ///
    /// The normal is stored as given; the assembler deals with degenerate
    /// normals. When the normal cannot be normalized the basis falls back to
    /// the one of the world y axis.
    pub fn new(body_a: usize, body_b: usize, position: Vec3, normal: Vec3, gap: Real) -> Self {
        let unit = safe_normalize(&normal, NORMAL_EPSILON).unwrap_or_else(Vec3::y);
        let (tangent_s, tangent_t) = tangent_basis(&unit);
        Self {
            body_a,
            body_b,
            position,
            normal,
            tangent_s,
            tangent_t,
            gap,
            material: MaterialPair::default(),
            explicit_material: false,
            feature: 0,
            lambda: Vec4::zeros(),
        }
    }

    /// Use an explicit friction basis
    pub fn with_tangents(mut self, tangent_s: Vec3, tangent_t: Vec3) -> Self {
        self.tangent_s = tangent_s;
        self.tangent_t = tangent_t;
        self
    }

    /// Set the pipeline feature id
    pub fn with_feature(mut self, feature: u32) -> Self {
        self.feature = feature;
        self
    }

    /// Set the material explicitly (bypasses the table lookup)
    pub fn with_material(mut self, material: MaterialPair) -> Self {
        self.material = material;
        self.explicit_material = true;
        self
    }

    /// A contact is active when its gap is below the envelope
    #[inline]
    pub fn is_active(&self, envelope: Real) -> bool {
        self.gap < envelope
    }

    /// Normal impulse of the last solve
    #[inline]
    pub fn normal_impulse(&self) -> Real {
        self.lambda[0]
    }
}

/// Collision pipeline seam.
///
/// Called once per step, after re-indexing, with the current kinematic
/// state. Returned body indices must refer to `bodies`.
pub trait CollisionSystem {
    /// Produce the candidate contacts for the current state
    fn contacts(&mut self, bodies: &[RigidBody]) -> Vec<ContactPoint>;
}

/// A collision system returning a fixed list of contacts.
///
/// Useful for tests and for callers that run their own narrow phase and
/// hand the result over verbatim.
#[derive(Clone, Debug, Default)]
pub struct ContactList {
    /// Contacts returned every step
    pub contacts: Vec<ContactPoint>,
}

impl ContactList {
    /// Wrap a contact list
    pub fn new(contacts: Vec<ContactPoint>) -> Self {
        Self { contacts }
    }
}

impl CollisionSystem for ContactList {
    fn contacts(&mut self, _bodies: &[RigidBody]) -> Vec<ContactPoint> {
        self.contacts.clone()
    }
}

/// A collision system that never reports contacts
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCollision;

impl CollisionSystem for NoCollision {
    fn contacts(&mut self, _bodies: &[RigidBody]) -> Vec<ContactPoint> {
        Vec::new()
    }
}

impl<F> CollisionSystem for F
where
    F: FnMut(&[RigidBody]) -> Vec<ContactPoint>,
{
    fn contacts(&mut self, bodies: &[RigidBody]) -> Vec<ContactPoint> {
        self(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_basis() {
        let c = ContactPoint::new(0, 1, Vec3::zeros(), Vec3::new(0.0, 2.0, 0.0), -0.01);
        assert!(c.tangent_s.dot(&Vec3::y()).abs() < 1e-12);
        assert!(c.tangent_t.dot(&Vec3::y()).abs() < 1e-12);
        assert!(c.tangent_s.dot(&c.tangent_t).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_normal_still_has_basis() {
        let c = ContactPoint::new(0, 1, Vec3::zeros(), Vec3::zeros(), 0.0);
        assert!((c.tangent_s.norm() - 1.0).abs() < 1e-12);
        assert!((c.tangent_t.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_envelope() {
        let c = ContactPoint::new(0, 1, Vec3::zeros(), Vec3::y(), 0.02);
        assert!(c.is_active(0.05));
        assert!(!c.is_active(0.01));
    }

    #[test]
    fn test_closure_collision_system() {
        let mut calls = 0;
        let mut system = |bodies: &[RigidBody]| {
            calls += 1;
            vec![ContactPoint::new(0, bodies.len() - 1, Vec3::zeros(), Vec3::y(), 0.0)]
        };
        let bodies = vec![
            RigidBody::new_static(0, Vec3::zeros()),
            RigidBody::new_sphere(1, Vec3::y(), 1.0, 1.0),
        ];
        let contacts = CollisionSystem::contacts(&mut system, &bodies);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].body_b, 1);
        drop(system);
        assert_eq!(calls, 1);
    }
}
