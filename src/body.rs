//! Rigid Body State
//!
//! Passive state container for the bodies taking part in a step. Bodies are
//! owned by the caller; the stepper only mutates them after the contact
//! solve has finished.
//!
//! Every body carries two identifiers:
//!
//! - `id`: stable for the lifetime of the body (warm-start matching)
//! - `index`: contiguous solver index, rewritten by [`reindex_bodies`] before
//!   each step so that body `index` owns block `index` of every velocity
//!   vector

use crate::material::{MaterialId, DEFAULT_MATERIAL};
use crate::math::{angular_part, linear_part, pack6, Mat3, Quat, Real, Vec3, Vec6};

/// Stable body identifier
pub type BodyId = u32;

/// Rigid body state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidBody {
    /// Stable identifier
    pub id: BodyId,
    /// Contiguous solver index (reassigned every step)
    pub index: usize,
    /// Position of the center of mass (world frame)
    pub position: Vec3,
    /// Orientation (body to world)
    pub orientation: Quat,
    /// Linear velocity (world frame)
    pub linear_velocity: Vec3,
    /// Angular velocity (world frame)
    pub angular_velocity: Vec3,
    /// Inverse mass (0 = fixed body)
    pub inv_mass: Real,
    /// Inverse inertia tensor in the body frame
    pub inv_inertia_local: Mat3,
    /// Inverse inertia tensor rotated to the world frame
    pub inv_inertia_world: Mat3,
    /// Material id used for the pair lookup
    pub material: MaterialId,
}

impl RigidBody {
    /// Create a dynamic body from its mass and principal moments of inertia.
    ///
    /// A zero, negative or non-finite mass produces a fixed body; the same
    /// rule applies per axis for the inertia.
    pub fn new_dynamic(id: BodyId, position: Vec3, mass: Real, inertia_diag: Vec3) -> Self {
        let inv = |m: Real| {
            if m.is_finite() && m > 0.0 {
                1.0 / m
            } else {
                0.0
            }
        };
        let inv_inertia_local = Mat3::from_diagonal(&Vec3::new(
            inv(inertia_diag.x),
            inv(inertia_diag.y),
            inv(inertia_diag.z),
        ));
        let mut body = Self {
            id,
            index: 0,
            position,
            orientation: Quat::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            inv_mass: inv(mass),
            inv_inertia_local,
            inv_inertia_world: inv_inertia_local,
            material: DEFAULT_MATERIAL,
        };
        body.update_world_inertia();
        body
    }

    /// Create a solid sphere of uniform density.
    pub fn new_sphere(id: BodyId, position: Vec3, mass: Real, radius: Real) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new_dynamic(id, position, mass, Vec3::new(i, i, i))
    }

    /// Create a fixed (immovable) body.
    pub fn new_static(id: BodyId, position: Vec3) -> Self {
        Self {
            id,
            index: 0,
            position,
            orientation: Quat::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            inv_mass: 0.0,
            inv_inertia_local: Mat3::zeros(),
            inv_inertia_world: Mat3::zeros(),
            material: DEFAULT_MATERIAL,
        }
    }

    /// Set the material id
    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = material;
        self
    }

    /// Set orientation (refreshes the world inertia)
    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self.update_world_inertia();
        self
    }

    /// Set linear and angular velocity
    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// True when the body has no translational or rotational mobility
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia_local.iter().all(|&c| c == 0.0)
    }

    /// Recompute `R * I⁻¹ * Rᵀ` from the current orientation.
    pub fn update_world_inertia(&mut self) {
        let r = self.orientation.to_rotation_matrix();
        let r = r.matrix();
        self.inv_inertia_world = r * self.inv_inertia_local * r.transpose();
    }

    /// Generalized velocity (linear, angular)
    #[inline]
    pub fn velocity(&self) -> Vec6 {
        pack6(&self.linear_velocity, &self.angular_velocity)
    }

    /// Overwrite linear and angular velocity from a generalized velocity
    #[inline]
    pub fn set_velocity(&mut self, v: &Vec6) {
        self.linear_velocity = linear_part(v);
        self.angular_velocity = angular_part(v);
    }

    /// Apply an impulse at a world-space point
    pub fn apply_impulse_at(&mut self, impulse: Vec3, point: Vec3) {
        if self.is_fixed() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        let r = point - self.position;
        self.angular_velocity += self.inv_inertia_world * r.cross(&impulse);
    }
}

/// Assign contiguous solver indices in slice order.
///
/// This is the re-indexing pass run over the active body set before every
/// step: afterwards `bodies[i].index == i`.
pub fn reindex_bodies(bodies: &mut [RigidBody]) {
    for (i, body) in bodies.iter_mut().enumerate() {
        body.index = i;
    }
}
