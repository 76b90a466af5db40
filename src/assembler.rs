//! System Assembler
//!
//! Builds the per-step block operators of the contact problem from the body
//! states and the active contact list:
//!
//! - `J`: one 4x6 block per (contact, body) pair, two per contact
//! - `W`: block-diagonal inverse mass/inertia, one 6x6 block per body
//! - `WJT = W * Jᵀ`: two 6x4 blocks per contact
//! - `b`: contact-space velocity of the free motion, plus the optional
//!   restitution term on the normal row
//!
//! # Layout
//!
//! The Jacobian never materializes as a sparse matrix. Each contact stores
//! the two body indices it touches and the two dense blocks against those
//! bodies. Rows are ordered (normal, tangent s, tangent t, drilling); body
//! A gets the negated rows, body B the positive ones, so that `J * u` is the
//! velocity of B relative to A at the contact point.

use tracing::warn;

use crate::body::RigidBody;
use crate::contact::ContactPoint;
use crate::error::{PhysicsError, Result};
use crate::math::{
    angular_part, linear_part, pack6, safe_normalize, tangent_basis, Mat3, Mat4, Mat4x6, Mat6x4,
    Real, Vec3, Vec4, Vec6, NORMAL_EPSILON,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Assembler configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AssemblerConfig {
    /// Normals shorter than this are replaced by a fallback axis
    pub normal_epsilon: Real,
    /// Fraction of the penetration removed per step through the normal row
    pub gap_stabilization: Real,
    /// Approach speeds below this ignore restitution
    pub restitution_threshold: Real,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            normal_epsilon: 1e-9,
            gap_stabilization: 0.0,
            restitution_threshold: 0.0,
        }
    }
}

impl AssemblerConfig {
    /// Set penetration stabilization
    pub fn with_gap_stabilization(mut self, factor: Real) -> Self {
        self.gap_stabilization = factor;
        self
    }

    /// Set restitution threshold
    pub fn with_restitution_threshold(mut self, threshold: Real) -> Self {
        self.restitution_threshold = threshold;
        self
    }
}

// ============================================================================
// Block operators
// ============================================================================

/// Inverse generalized mass of one body (a 6x6 diagonal block of W)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyInverseMass {
    /// Inverse mass, replicated on the three linear axes
    pub inv_mass: Real,
    /// World-frame inverse inertia
    pub inv_inertia: Mat3,
}

impl BodyInverseMass {
    /// Inverse mass block of a body
    pub fn of(body: &RigidBody) -> Self {
        Self {
            inv_mass: body.inv_mass,
            inv_inertia: body.inv_inertia_world,
        }
    }

    /// `W_b * f`
    #[inline]
    pub fn apply(&self, f: &Vec6) -> Vec6 {
        let lin = linear_part(f) * self.inv_mass;
        let ang = self.inv_inertia * angular_part(f);
        pack6(&lin, &ang)
    }

    /// `W_b * Jᵀ` for one Jacobian block
    fn weight_transpose(&self, j: &Mat4x6) -> Mat6x4 {
        let mut out = Mat6x4::zeros();
        for row in 0..4 {
            let f = j.row(row).transpose();
            out.set_column(row, &self.apply(&f));
        }
        out
    }
}

/// Two-column Jacobian row block of one contact
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactJacobian {
    /// Solver indices of body A and body B
    pub bodies: [usize; 2],
    /// Blocks against body A and body B
    pub blocks: [Mat4x6; 2],
}

/// Per-step contact operators
#[derive(Clone, Debug, Default)]
pub struct SystemOperators {
    /// Number of bodies (velocity blocks)
    pub body_count: usize,
    /// Jacobian row blocks, one per contact
    pub jacobian: Vec<ContactJacobian>,
    /// `W * Jᵀ` blocks, one pair per contact
    pub wjt: Vec<[Mat6x4; 2]>,
    /// W, one block per body
    pub inv_mass: Vec<BodyInverseMass>,
    /// Right-hand side, one 4-vector per contact
    pub b: Vec<Vec4>,
    /// Friction coefficients `[mu_s, mu_t, mu_tau]` per contact
    pub friction: Vec<[Real; 3]>,
}

impl SystemOperators {
    /// Number of contacts
    #[inline]
    pub fn contact_count(&self) -> usize {
        self.jacobian.len()
    }

    /// `W * Jᵀ * λ`, accumulated per body
    pub fn apply_wjt(&self, lambda: &[Vec4]) -> Vec<Vec6> {
        let mut out = vec![Vec6::zeros(); self.body_count];
        for (k, l) in lambda.iter().enumerate() {
            self.accumulate_wjt(k, l, &mut out);
        }
        out
    }

    /// Add `WJT_k * l` into the per-body accumulator
    #[inline]
    pub fn accumulate_wjt(&self, k: usize, l: &Vec4, out: &mut [Vec6]) {
        let [a, b] = self.jacobian[k].bodies;
        let [wa, wb] = &self.wjt[k];
        out[a] += wa * l;
        out[b] += wb * l;
    }

    /// `J * u` for per-body generalized velocities
    pub fn apply_j(&self, u: &[Vec6]) -> Vec<Vec4> {
        (0..self.contact_count())
            .map(|k| self.contact_velocity(k, u))
            .collect()
    }

    /// `J_k * u`, the relative velocity of contact `k`
    #[inline]
    pub fn contact_velocity(&self, k: usize, u: &[Vec6]) -> Vec4 {
        let jac = &self.jacobian[k];
        let [a, b] = jac.bodies;
        jac.blocks[0] * u[a] + jac.blocks[1] * u[b]
    }

    /// `J_k * W * J_kᵀ`
    pub fn delassus_block(&self, k: usize) -> Mat4 {
        let jac = &self.jacobian[k];
        let [wa, wb] = &self.wjt[k];
        jac.blocks[0] * wa + jac.blocks[1] * wb
    }

    /// Diagonal of `J_k * W * J_kᵀ`
    pub fn delassus_diagonal(&self, k: usize) -> Vec4 {
        self.delassus_block(k).diagonal()
    }

    /// `A * λ = J * W * Jᵀ * λ`
    pub fn apply_delassus(&self, lambda: &[Vec4]) -> Vec<Vec4> {
        let w = self.apply_wjt(lambda);
        self.apply_j(&w)
    }
}

/// Counters for anomalies repaired during assembly
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssemblyDiagnostics {
    /// Contacts whose normal was replaced by the fallback axis
    pub degenerate_normals: usize,
    /// Contacts whose friction basis was rebuilt
    pub rebuilt_bases: usize,
}

// ============================================================================
// Assembly
// ============================================================================

/// Jacobian block of one body for one contact.
///
/// `sign` is -1 for body A and +1 for body B.
fn jacobian_block(sign: Real, r: &Vec3, n: &Vec3, s: &Vec3, t: &Vec3) -> Mat4x6 {
    let mut block = Mat4x6::zeros();
    for (row, d) in [n, s, t].into_iter().enumerate() {
        let lin = d * sign;
        let ang = r.cross(d) * sign;
        block.fixed_view_mut::<1, 3>(row, 0).copy_from(&lin.transpose());
        block.fixed_view_mut::<1, 3>(row, 3).copy_from(&ang.transpose());
    }
    let drill = n * sign;
    block.fixed_view_mut::<1, 3>(3, 3).copy_from(&drill.transpose());
    block
}

/// Check the tangents form an orthonormal basis with `n`.
fn basis_is_valid(n: &Vec3, s: &Vec3, t: &Vec3) -> bool {
    const TOL: Real = 1e-6;
    let finite = s.iter().chain(t.iter()).all(|c| c.is_finite());
    finite
        && (s.norm() - 1.0).abs() < TOL
        && (t.norm() - 1.0).abs() < TOL
        && n.dot(s).abs() < TOL
        && n.dot(t).abs() < TOL
        && s.dot(t).abs() < TOL
}

fn check_indices(bodies: &[RigidBody], contacts: &[ContactPoint]) -> Result<()> {
    if bodies.iter().enumerate().any(|(i, b)| b.index != i) {
        return Err(PhysicsError::InvalidConfiguration {
            reason: "bodies are not contiguously indexed",
        });
    }
    let count = bodies.len();
    for (k, c) in contacts.iter().enumerate() {
        for index in [c.body_a, c.body_b] {
            if index >= count {
                return Err(PhysicsError::InvalidBodyIndex {
                    contact: k,
                    index,
                    count,
                });
            }
        }
        if c.body_a == c.body_b {
            return Err(PhysicsError::SelfContact {
                contact: k,
                body: c.body_a,
            });
        }
    }
    Ok(())
}

/// Assemble `J`, `W`, `WJT` and `b`.
///
/// `free_velocities` is the per-body velocity after external forces,
/// `u + W * h * f_ext`; `b = J * free_velocities`. When `restitution` is set
/// the normal row additionally receives `e * v_n` for contacts approaching
/// faster than the configured threshold, where `v_n` is the pre-impact
/// normal velocity computed from the bodies' current velocities.
pub fn assemble(
    bodies: &[RigidBody],
    contacts: &[ContactPoint],
    free_velocities: &[Vec6],
    h: Real,
    restitution: bool,
    config: &AssemblerConfig,
) -> Result<(SystemOperators, AssemblyDiagnostics)> {
    if free_velocities.len() != bodies.len() {
        return Err(PhysicsError::InvalidConfiguration {
            reason: "one free velocity per body is required",
        });
    }
    if !(h.is_finite() && h > 0.0) {
        return Err(PhysicsError::InvalidConfiguration {
            reason: "time step must be positive and finite",
        });
    }
    check_indices(bodies, contacts)?;

    let mut diagnostics = AssemblyDiagnostics::default();
    let inv_mass: Vec<BodyInverseMass> = bodies.iter().map(BodyInverseMass::of).collect();
    let pre_velocities: Vec<Vec6> = bodies.iter().map(RigidBody::velocity).collect();

    let mut ops = SystemOperators {
        body_count: bodies.len(),
        jacobian: Vec::with_capacity(contacts.len()),
        wjt: Vec::with_capacity(contacts.len()),
        inv_mass,
        b: Vec::with_capacity(contacts.len()),
        friction: Vec::with_capacity(contacts.len()),
    };

    for (k, contact) in contacts.iter().enumerate() {
        let n = match safe_normalize(&contact.normal, config.normal_epsilon.max(NORMAL_EPSILON)) {
            Some(n) => n,
            None => {
                warn!(contact = k, "degenerate contact normal, substituting +y");
                diagnostics.degenerate_normals += 1;
                Vec3::y()
            }
        };
        let (s, t) = if basis_is_valid(&n, &contact.tangent_s, &contact.tangent_t) {
            (contact.tangent_s, contact.tangent_t)
        } else {
            diagnostics.rebuilt_bases += 1;
            tangent_basis(&n)
        };

        let a = contact.body_a;
        let b = contact.body_b;
        let ra = contact.position - bodies[a].position;
        let rb = contact.position - bodies[b].position;
        let blocks = [
            jacobian_block(-1.0, &ra, &n, &s, &t),
            jacobian_block(1.0, &rb, &n, &s, &t),
        ];
        let wjt = [
            ops.inv_mass[a].weight_transpose(&blocks[0]),
            ops.inv_mass[b].weight_transpose(&blocks[1]),
        ];

        let mut rhs = blocks[0] * free_velocities[a] + blocks[1] * free_velocities[b];

        if contact.gap > 0.0 {
            // Separated but inside the envelope: allow closing the gap.
            rhs[0] += contact.gap / h;
        } else if config.gap_stabilization > 0.0 {
            rhs[0] += config.gap_stabilization * contact.gap / h;
        }

        if restitution {
            let v_pre = blocks[0] * pre_velocities[a] + blocks[1] * pre_velocities[b];
            let v_n = v_pre[0];
            if v_n < -config.restitution_threshold {
                rhs[0] += contact.material.restitution * v_n;
            }
        }

        ops.jacobian.push(ContactJacobian {
            bodies: [a, b],
            blocks,
        });
        ops.wjt.push(wjt);
        ops.b.push(rhs);
        ops.friction.push(contact.material.mu());
    }

    Ok((ops, diagnostics))
}
