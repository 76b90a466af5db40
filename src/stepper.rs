//! Time Stepper
//!
//! Orchestrates one discrete step of the contact dynamics:
//!
//! 1. Re-index the bodies and refresh their world inertia
//! 2. Query the collision system, keep contacts inside the envelope
//! 3. Resolve pair materials from the table
//! 4. Fold gravity and damping into the free velocity `u + W h f_ext`
//! 5. Assemble `J`, `W`, `b` (restitution for [`StepperKind::Moreau`])
//! 6. Compute R, then solve for λ (optionally warm started)
//! 7. `u_new = u_free + W Jᵀ λ`, then integrate positions and orientations
//!    with `u_new` (semi-implicit Euler)
//!
//! Solver non-convergence never stops stepping: the last λ is applied and
//! the diagnostics are returned in the [`StepReport`].

use crate::assembler::{assemble, AssemblyDiagnostics};
use crate::body::{reindex_bodies, RigidBody};
use crate::config::SimulationConfig;
use crate::contact::{CollisionSystem, ContactPoint};
use crate::error::{PhysicsError, Result};
use crate::material::MaterialTable;
use crate::math::{angular_part, linear_part, pack6, Quat, Real, Vec3, Vec6};
use crate::solver::{solve, SolveStats};
use crate::warm_start::WarmStartCache;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Time-stepping scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StepperKind {
    /// Velocity-level scheme with restitution
    #[default]
    Moreau,
    /// Velocity-level scheme without restitution
    SemiImplicit,
    /// Does nothing
    Empty,
}

impl StepperKind {
    /// Whether the normal row carries the restitution term
    #[inline]
    pub fn uses_restitution(&self) -> bool {
        matches!(self, StepperKind::Moreau)
    }
}

/// Stepper configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StepperConfig {
    /// Time-stepping scheme
    pub kind: StepperKind,
    /// Gravity acceleration
    pub gravity: Vec3,
    /// Linear damping coefficient
    pub linear_damping: Real,
    /// Angular damping coefficient
    pub angular_damping: Real,
    /// Contacts with `gap < envelope` are active
    pub envelope: Real,
    /// Start each solve from the previous step's impulses
    pub warm_start: bool,
    /// Scale applied to cached impulses (0 = cold start, 1 = full)
    pub warm_start_factor: Real,
    /// Steps a cached impulse survives without being refreshed
    pub warm_start_max_age: u32,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            kind: StepperKind::Moreau,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            linear_damping: 0.0,
            angular_damping: 0.0,
            envelope: 0.01,
            warm_start: false,
            warm_start_factor: 1.0,
            warm_start_max_age: 3,
        }
    }
}

impl StepperConfig {
    /// Select the scheme
    pub fn with_kind(mut self, kind: StepperKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set gravity
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set linear and angular damping
    pub fn with_damping(mut self, linear: Real, angular: Real) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set the contact envelope
    pub fn with_envelope(mut self, envelope: Real) -> Self {
        self.envelope = envelope;
        self
    }

    /// Enable or disable warm starting
    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    /// Set the cached impulse scale and lifetime
    pub fn with_warm_start_cache(mut self, factor: Real, max_age: u32) -> Self {
        self.warm_start_factor = factor;
        self.warm_start_max_age = max_age;
        self
    }
}

// ============================================================================
// Report
// ============================================================================

/// Outcome of one step
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    /// Active contacts, annotated with their solved impulse
    pub contacts: Vec<ContactPoint>,
    /// Solver diagnostics (`None` for [`StepperKind::Empty`])
    pub stats: Option<SolveStats>,
    /// Anomalies repaired during assembly
    pub assembly: AssemblyDiagnostics,
    /// Contacts that started from a cached impulse
    pub warm_start_hits: usize,
}

// ============================================================================
// Integration helpers
// ============================================================================

/// `u + W h f_ext` for one body, with `f_ext = m g - damping`
fn free_velocity(body: &RigidBody, h: Real, config: &StepperConfig) -> Vec6 {
    let u = body.velocity();
    if body.is_fixed() {
        return u;
    }
    let v = linear_part(&u);
    let w = angular_part(&u);
    let lin = if body.inv_mass > 0.0 {
        v + (config.gravity - v * config.linear_damping) * h
    } else {
        v
    };
    let ang = w - w * (config.angular_damping * h);
    pack6(&lin, &ang)
}

/// Apply the new velocity and advance the pose over `h`
fn integrate(body: &mut RigidBody, u: &Vec6, h: Real) {
    if body.is_fixed() {
        return;
    }
    body.set_velocity(u);
    body.position += body.linear_velocity * h;
    let spin = Quat::from_scaled_axis(body.angular_velocity * h);
    body.orientation = Quat::new_normalize((spin * body.orientation).into_inner());
    body.update_world_inertia();
}

/// Both bodies fixed: the contact cannot exchange an impulse
fn is_inert(contact: &ContactPoint, bodies: &[RigidBody]) -> bool {
    match (bodies.get(contact.body_a), bodies.get(contact.body_b)) {
        (Some(a), Some(b)) => a.is_fixed() && b.is_fixed(),
        _ => false,
    }
}

// ============================================================================
// Stepper
// ============================================================================

/// Drives the simulation one step at a time
#[derive(Clone, Debug)]
pub struct Stepper {
    config: SimulationConfig,
    cache: WarmStartCache,
    last_stats: Option<SolveStats>,
    step_count: u64,
}

impl Stepper {
    /// Create a stepper. The configuration is validated on every step.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            cache: WarmStartCache::new()
                .with_factor(config.stepper.warm_start_factor)
                .with_max_age(config.stepper.warm_start_max_age),
            last_stats: None,
            step_count: 0,
        }
    }

    /// Configuration in use
    #[inline]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Mutable configuration
    #[inline]
    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    /// Diagnostics of the latest solve
    #[inline]
    pub fn last_stats(&self) -> Option<&SolveStats> {
        self.last_stats.as_ref()
    }

    /// Steps taken so far
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Warm-start cache
    #[inline]
    pub fn warm_start_cache(&self) -> &WarmStartCache {
        &self.cache
    }

    /// Drop all cached impulses
    pub fn reset_warm_start(&mut self) {
        self.cache.clear();
    }

    /// Advance `bodies` by `h`.
    ///
    /// Only configuration errors (invalid settings, bad body indices,
    /// unknown materials) are returned; bodies are left untouched in that
    /// case apart from their solver index.
    pub fn step<C: CollisionSystem + ?Sized>(
        &mut self,
        h: Real,
        bodies: &mut [RigidBody],
        materials: &MaterialTable,
        collision: &mut C,
    ) -> Result<StepReport> {
        self.config.validate()?;
        if !(h.is_finite() && h > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "time step must be positive and finite",
            });
        }

        let stepper = self.config.stepper;
        if stepper.kind == StepperKind::Empty {
            self.step_count += 1;
            return Ok(StepReport::default());
        }

        reindex_bodies(bodies);
        for body in bodies.iter_mut() {
            body.update_world_inertia();
        }

        let mut contacts: Vec<ContactPoint> = collision
            .contacts(bodies)
            .into_iter()
            .filter(|c| c.is_active(stepper.envelope))
            .collect();

        for c in contacts.iter_mut() {
            if c.explicit_material {
                continue;
            }
            if let (Some(a), Some(b)) = (bodies.get(c.body_a), bodies.get(c.body_b)) {
                c.material = materials.pair(a.material, b.material)?;
            }
        }

        let solved: Vec<usize> = (0..contacts.len())
            .filter(|&k| !is_inert(&contacts[k], bodies))
            .collect();
        let active: Vec<ContactPoint> = solved.iter().map(|&k| contacts[k]).collect();

        let free: Vec<Vec6> = bodies
            .iter()
            .map(|b| free_velocity(b, h, &stepper))
            .collect();

        let (ops, assembly) = assemble(
            bodies,
            &active,
            &free,
            h,
            stepper.kind.uses_restitution(),
            &self.config.assembler,
        )?;
        let r = self
            .config
            .r_factor
            .strategy
            .compute(&ops, &self.config.r_factor);

        let mut warm_start_hits = 0;
        let warm = if stepper.warm_start {
            self.cache.factor = stepper.warm_start_factor;
            self.cache.max_age = stepper.warm_start_max_age;
            self.cache.begin_frame();
            let (lambda, hits) = self.cache.gather(&active, bodies);
            warm_start_hits = hits;
            Some(lambda)
        } else {
            None
        };

        let output = solve(&ops, &r, &self.config.solver, warm.as_deref());

        let mut u = free;
        for (body_u, dw) in u.iter_mut().zip(ops.apply_wjt(&output.lambda)) {
            *body_u += dw;
        }

        #[cfg(feature = "parallel")]
        bodies
            .par_iter_mut()
            .zip(u.par_iter())
            .for_each(|(body, u)| integrate(body, u, h));

        #[cfg(not(feature = "parallel"))]
        for (body, u) in bodies.iter_mut().zip(&u) {
            integrate(body, u, h);
        }

        for (&k, lambda) in solved.iter().zip(&output.lambda) {
            contacts[k].lambda = *lambda;
        }

        if stepper.warm_start {
            let solved_contacts: Vec<ContactPoint> = solved.iter().map(|&k| contacts[k]).collect();
            self.cache.scatter(&solved_contacts, bodies);
            self.cache.end_frame();
        }

        self.step_count += 1;
        self.last_stats = Some(output.stats);
        debug!(
            step = self.step_count,
            contacts = active.len(),
            iterations = output.stats.iterations,
            converged = output.stats.converged,
            warm_start_hits,
            "step complete"
        );

        Ok(StepReport {
            contacts,
            stats: Some(output.stats),
            assembly,
            warm_start_hits,
        })
    }
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
